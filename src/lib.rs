//! # mediagraph - runtime-constructed dataflow graphs
//!
//! A graph of producer, filter, and consumer nodes is assembled at runtime.
//! Each node exposes named, typed output streams and named, typed input pins;
//! edges are created by name, the graph is started, and timestamped samples
//! flow concurrently from producers to any number of consumers.
//!
//! ```text
//! mediagraph
//!   ├─ core/   - streams, pins, nodes, graph, properties
//!   └─ nodes/  - stock nodes (counter source, pass-through, counting sink)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mediagraph::{Graph, nodes::{CounterSource, PassThrough, CountingSink}};
//! use mediagraph::Duration;
//!
//! let graph = Graph::new();
//! let producer = graph.new_node("producer", CounterSource::new(Duration::ZERO));
//! let filter = graph.new_node("filter", PassThrough::<i32>::new());
//! let sink = graph.new_node("sink", CountingSink::new(Duration::ZERO));
//!
//! assert!(graph.connect_by_name("producer", "out", "filter", "in"));
//! assert!(graph.connect_by_name("filter", "out", "sink", "in"));
//! assert!(graph.start());
//! # graph.stop();
//! ```
//!
//! Every stream is a bounded, in-order queue of `(timestamp, value)` samples
//! with one writer and any number of independent reader cursors. Readers
//! progress at their own pace and may seek forward in time; the stream drops
//! entries according to its [`DropPolicy`] once the queue is full or every
//! reader has consumed them.

pub mod core;
pub mod nodes;

pub use self::core::{
    MediaGraphError, Result,
    Timestamp, Duration, SequenceId, NO_SEQUENCE,
    StreamMessage,
    DropPolicy, Sample, Stream, NamedStream, StreamSource, DEFAULT_QUEUE_LIMIT,
    StreamReader, NamedPin, PinState,
    Node, NodeBase,
    Graph,
    PropertyValue, Property, PropertySource, PropertyVisitor,
    GraphVisitor, PropertyOwner, visit_graph, connection_endpoint,
    Worker,
};
