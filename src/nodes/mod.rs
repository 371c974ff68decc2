//! Stock nodes
//!
//! Small, reusable nodes for wiring up pipelines and tests: a counting
//! producer, a pass-through filter, and a counting sink. User nodes follow
//! the same pattern: embed a [`NodeBase`](crate::NodeBase), create pins and
//! streams against it, and implement [`Node`](crate::Node).

mod counter_source;
mod counting_sink;
mod pass_through;

pub use counter_source::CounterSource;
pub use counting_sink::CountingSink;
pub use pass_through::PassThrough;
