//! Counting test-signal producer

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::core::node::{Node, NodeBase};
use crate::core::stream::{DropPolicy, Stream, DEFAULT_QUEUE_LIMIT};
use crate::core::time::{Duration, Timestamp};
use crate::Result;

/// Threaded producer writing `0, 1, 2, ...` on its `"out"` stream, each
/// sample stamped with the current time, as fast as downstream consumption
/// allows. With a non-zero time limit the node stops by itself once the
/// limit has elapsed.
pub struct CounterSource {
    base: Arc<NodeBase>,
    out: Arc<Stream<i32>>,
    time_limit: Duration,
    sent: AtomicI64,
}

impl CounterSource {
    pub fn new(time_limit: Duration) -> CounterSource {
        Self::with_policy(time_limit, DropPolicy::default(), DEFAULT_QUEUE_LIMIT)
    }

    pub fn with_policy(
        time_limit: Duration,
        policy: DropPolicy,
        queue_limit: usize,
    ) -> CounterSource {
        let base = NodeBase::threaded();
        let out = Stream::new("out", &base, policy, queue_limit);
        CounterSource {
            base,
            out,
            time_limit,
            sent: AtomicI64::new(0),
        }
    }

    /// Number of successful writes since the node last started.
    pub fn sent(&self) -> i64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> &Arc<Stream<i32>> {
        &self.out
    }
}

impl Node for CounterSource {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn thread_main(&self) -> Result<()> {
        self.sent.store(0, Ordering::SeqCst);
        let started_at = Timestamp::now();

        while !self.base.thread_must_quit() {
            // Push as fast as we can; the stream's policy paces us.
            let now = Timestamp::now();
            if self.time_limit != Duration::ZERO && now - started_at > self.time_limit {
                tracing::debug!("[node {}] time limit reached", self.base.name());
                break;
            }
            let value = self.sent.load(Ordering::SeqCst) as i32;
            if !self.out.write(now, value) {
                break;
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pins::StreamReader;
    use crate::core::stream::NamedStream;

    #[test]
    fn stops_by_itself_at_the_time_limit() {
        let source = Arc::new(CounterSource::new(Duration::millis(30.0)));
        CounterSource::bind(&source);
        assert!(source.start());
        source.wait_until_stopped();
        assert!(!source.is_running());
        assert!(source.sent() > 0);
    }

    #[test]
    fn produced_values_count_up() {
        let source = Arc::new(CounterSource::new(Duration::ZERO));
        CounterSource::bind(&source);
        let reader = StreamReader::<i32>::unattached("probe");
        assert!(reader.connect(&(source.output().clone() as Arc<dyn NamedStream>)));
        assert!(source.start());

        let first = reader.read().expect("producer is running");
        let second = reader.read().expect("producer is running");
        assert_eq!(second.value, first.value + 1);
        assert!(second.timestamp >= first.timestamp);

        source.stop();
        assert!(!source.is_running());
    }
}
