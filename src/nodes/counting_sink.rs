//! Counting consumer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::node::{Node, NodeBase};
use crate::core::pins::StreamReader;
use crate::core::time::Duration;
use crate::Result;

/// Threaded consumer reading its `"in"` pin and counting loop iterations,
/// optionally sleeping between reads to simulate a slow consumer.
///
/// The read result is deliberately ignored: the loop relies on the quit
/// flag, which gets raised when the input closes or disconnects and the node
/// stops itself.
pub struct CountingSink {
    base: Arc<NodeBase>,
    input: Arc<StreamReader<i32>>,
    sleep_after_read: Duration,
    consumed: AtomicUsize,
}

impl CountingSink {
    pub fn new(sleep_after_read: Duration) -> CountingSink {
        let base = NodeBase::threaded();
        let input = StreamReader::new("in", &base);
        CountingSink {
            base,
            input,
            sleep_after_read,
            consumed: AtomicUsize::new(0),
        }
    }

    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn input(&self) -> &Arc<StreamReader<i32>> {
        &self.input
    }
}

impl Node for CountingSink {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn thread_main(&self) -> Result<()> {
        self.consumed.store(0, Ordering::SeqCst);
        while !self.base.thread_must_quit() {
            let _ = self.input.read();
            self.consumed.fetch_add(1, Ordering::SeqCst);
            if self.sleep_after_read != Duration::ZERO {
                self.sleep_after_read.sleep();
            }
        }
        Ok(())
    }
}
