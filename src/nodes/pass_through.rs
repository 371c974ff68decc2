//! Pass-through filter

use std::sync::Arc;

use crate::core::message::StreamMessage;
use crate::core::node::{Node, NodeBase};
use crate::core::pins::StreamReader;
use crate::core::stream::{DropPolicy, Stream, DEFAULT_QUEUE_LIMIT};
use crate::Result;

/// Threaded filter copying every sample from its `"in"` pin to its `"out"`
/// stream, preserving timestamps. The node stops when its input closes or
/// disconnects.
pub struct PassThrough<T: StreamMessage> {
    base: Arc<NodeBase>,
    input: Arc<StreamReader<T>>,
    out: Arc<Stream<T>>,
}

impl<T: StreamMessage> PassThrough<T> {
    pub fn new() -> PassThrough<T> {
        let base = NodeBase::threaded();
        let input = StreamReader::new("in", &base);
        let out = Stream::new("out", &base, DropPolicy::default(), DEFAULT_QUEUE_LIMIT);
        PassThrough { base, input, out }
    }

    pub fn input(&self) -> &Arc<StreamReader<T>> {
        &self.input
    }

    pub fn output(&self) -> &Arc<Stream<T>> {
        &self.out
    }
}

impl<T: StreamMessage> Default for PassThrough<T> {
    fn default() -> PassThrough<T> {
        PassThrough::new()
    }
}

impl<T: StreamMessage> Node for PassThrough<T> {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn thread_main(&self) -> Result<()> {
        while !self.base.thread_must_quit() {
            let Some(sample) = self.input.read() else {
                break;
            };
            if !self.out.write(sample.timestamp, sample.value) {
                break;
            }
        }
        Ok(())
    }
}
