//! Core building blocks: time, streams, pins, nodes, and the graph.

pub mod error;
pub mod graph;
pub mod introspect;
pub mod message;
pub mod node;
pub mod pins;
pub mod property;
pub mod stream;
pub mod time;
pub mod worker;

pub use error::{MediaGraphError, Result};
pub use graph::Graph;
pub use introspect::{connection_endpoint, visit_graph, GraphVisitor, PropertyOwner};
pub use message::StreamMessage;
pub use node::{Node, NodeBase};
pub use pins::{NamedPin, PinState, StreamReader};
pub use property::{Property, PropertySource, PropertyValue, PropertyVisitor};
pub use stream::{
    DropPolicy, NamedStream, Sample, Stream, StreamSource, DEFAULT_QUEUE_LIMIT,
};
pub use time::{Duration, SequenceId, Timestamp, NO_SEQUENCE};
pub use worker::Worker;
