//! The graph supervisor
//!
//! A [`Graph`] owns nodes by unique name, connects named output streams to
//! named input pins, and drives lifecycle for the whole assembly. Nodes can
//! be added and removed at any time, including while data is flowing; a
//! removed node keeps living for as long as external callers hold it.
//!
//! ```no_run
//! # use mediagraph::{Graph, nodes::{CounterSource, CountingSink}, Duration};
//! let graph = Graph::new();
//! let producer = graph.new_node("producer", CounterSource::new(Duration::ZERO));
//! let consumer = graph.new_node("consumer", CountingSink::new(Duration::ZERO));
//! if !graph.connect_by_name("producer", "out", "consumer", "in") || !graph.start() {
//!     // something went wrong
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::node::Node;
use super::pins::NamedPin;
use super::property::{Property, PropertySource, PropertyValue};
use super::stream::NamedStream;

pub struct Graph {
    nodes: Mutex<BTreeMap<String, Arc<dyn Node>>>,
    // Guards against recursion: stopping a node disconnects pins, which
    // stops more nodes, which may reach back into the graph.
    stopping: AtomicBool,
    self_weak: Weak<Graph>,
}

impl Graph {
    pub fn new() -> Arc<Graph> {
        Arc::new_cyclic(|self_weak| Graph {
            nodes: Mutex::new(BTreeMap::new()),
            stopping: AtomicBool::new(false),
            self_weak: self_weak.clone(),
        })
    }

    /// Add a node under `name`. Fails without side effects when the name is
    /// taken or the node already belongs to a graph.
    pub fn add_node(&self, name: &str, node: Arc<dyn Node>) -> bool {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(name) {
            return false;
        }
        if !node
            .base()
            .set_name_and_graph(name, &self.self_weak, Arc::downgrade(&node))
        {
            return false;
        }
        nodes.insert(name.to_string(), node);
        tracing::debug!("[graph] added node {} (total: {})", name, nodes.len());
        true
    }

    /// Wrap `node`, add it under `wanted_name` or, on collision, under
    /// `wanted_name0`, `wanted_name1`, ... and return the shared handle.
    pub fn new_node<N: Node>(&self, wanted_name: &str, node: N) -> Arc<N> {
        let node = Arc::new(node);
        if self.add_node(wanted_name, node.clone()) {
            return node;
        }
        for suffix in 0.. {
            let name = format!("{wanted_name}{suffix}");
            if self.add_node(&name, node.clone()) {
                break;
            }
        }
        node
    }

    /// Remove the node named `name` from the graph and disconnect it from
    /// everything. The handle is returned; the caller decides when the node
    /// is destroyed. The graph mutex is released before the node is torn
    /// down, so removal is safe while the graph is running.
    pub fn remove_node(&self, name: &str) -> Option<Arc<dyn Node>> {
        let node = self.nodes.lock().remove(name)?;
        tracing::debug!("[graph] removing node {}", name);
        node.base().disconnect_all_pins();
        node.base().disconnect_all_streams();
        Some(node)
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.lock().get(name).cloned()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.lock().len()
    }

    /// The node at `index` in name order.
    pub fn node(&self, index: usize) -> Option<Arc<dyn Node>> {
        self.nodes.lock().values().nth(index).cloned()
    }

    /// Connect an output stream to an input pin. Fails on type tag
    /// mismatch; both endpoints may belong to nodes outside this graph.
    pub fn connect(&self, stream: &Arc<dyn NamedStream>, pin: &Arc<dyn NamedPin>) -> bool {
        if stream.type_tag() != pin.type_tag() {
            tracing::debug!(
                "[graph] cannot connect {}:{} to {}:{}",
                stream.stream_name(),
                stream.type_tag(),
                pin.name(),
                pin.type_tag()
            );
            return false;
        }
        pin.connect(stream)
    }

    /// Connect `source`'s stream named `stream_name` to `dest`'s pin named
    /// `pin_name`. Unknown names return false.
    pub fn connect_nodes(
        &self,
        source: &dyn Node,
        stream_name: &str,
        dest: &dyn Node,
        pin_name: &str,
    ) -> bool {
        let Some(stream) = source.base().get_output_stream_by_name(stream_name) else {
            return false;
        };
        let Some(pin) = dest.base().get_input_pin_by_name(pin_name) else {
            return false;
        };
        self.connect(&stream, &pin)
    }

    /// Fully name-based [`Graph::connect_nodes`].
    pub fn connect_by_name(
        &self,
        source_name: &str,
        stream_name: &str,
        dest_name: &str,
        pin_name: &str,
    ) -> bool {
        let Some(source) = self.get_node_by_name(source_name) else {
            return false;
        };
        let Some(dest) = self.get_node_by_name(dest_name) else {
            return false;
        };
        self.connect_nodes(source.as_ref(), stream_name, dest.as_ref(), pin_name)
    }

    /// Start every node, in name order. If one refuses, every node started
    /// so far is stopped again and `start` reports failure.
    pub fn start(&self) -> bool {
        if self.is_started() {
            return true;
        }
        tracing::info!("[graph] starting {} nodes", self.num_nodes());
        let nodes = self.nodes.lock();
        for (name, node) in nodes.iter() {
            if !node.start() {
                tracing::warn!("[graph] node {} refused to start; rolling back", name);
                Self::stop_nodes(&nodes);
                return false;
            }
        }
        true
    }

    /// True iff at least one node is currently running. Derived rather than
    /// cached, so it stays accurate when nodes stop on their own.
    pub fn is_started(&self) -> bool {
        self.nodes.lock().values().any(|node| node.is_running())
    }

    /// Stop every node. Does nothing when a stop is already in progress.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("[graph] stopping");
        {
            let nodes = self.nodes.lock();
            Self::stop_nodes(&nodes);
        }
        self.stopping.store(false, Ordering::SeqCst);
    }

    fn stop_nodes(nodes: &BTreeMap<String, Arc<dyn Node>>) {
        for node in nodes.values() {
            node.base().close_connected_pins();
            node.stop();
        }
    }

    /// Block until every node has stopped, whether through [`Graph::stop`]
    /// or on its own.
    pub fn wait_until_stopped(&self) {
        let nodes: Vec<Arc<dyn Node>> = self.nodes.lock().values().cloned().collect();
        for node in nodes {
            node.wait_until_stopped();
        }
    }

    /// Stop the graph and remove every node.
    pub fn clear(&self) {
        self.stop();
        loop {
            let name = match self.nodes.lock().keys().next() {
                Some(name) => name.clone(),
                None => break,
            };
            let _ = self.remove_node(&name);
        }
    }
}

impl PropertySource for Graph {
    fn properties(&self) -> Vec<Property> {
        let started = self.self_weak.clone();
        let count = self.self_weak.clone();
        vec![
            Property::read_only("Started", move || {
                PropertyValue::Bool(started.upgrade().is_some_and(|g| g.is_started()))
            }),
            Property::read_only("NumNodes", move || {
                PropertyValue::Int(count.upgrade().map_or(0, |g| g.num_nodes() as i32))
            }),
        ]
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.nodes.lock();
        f.debug_struct("Graph")
            .field("nodes", &nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::NodeBase;
    use crate::core::pins::StreamReader;
    use crate::core::stream::{DropPolicy, Stream, DEFAULT_QUEUE_LIMIT};
    use crate::core::time::Timestamp;

    struct Source {
        base: Arc<NodeBase>,
        out: Arc<Stream<i32>>,
    }

    impl Source {
        fn new() -> Source {
            let base = NodeBase::new();
            let out = Stream::new("out", &base, DropPolicy::default(), DEFAULT_QUEUE_LIMIT);
            Source { base, out }
        }
    }

    impl Node for Source {
        fn base(&self) -> &NodeBase {
            &self.base
        }
    }

    struct Sink {
        base: Arc<NodeBase>,
        input: Arc<StreamReader<i32>>,
    }

    impl Sink {
        fn new() -> Sink {
            let base = NodeBase::new();
            let input = StreamReader::new("in", &base);
            Sink { base, input }
        }
    }

    impl Node for Sink {
        fn base(&self) -> &NodeBase {
            &self.base
        }
    }

    struct FloatSink {
        base: Arc<NodeBase>,
        #[allow(dead_code)]
        input: Arc<StreamReader<f64>>,
    }

    impl FloatSink {
        fn new() -> FloatSink {
            let base = NodeBase::new();
            let input = StreamReader::new("in", &base);
            FloatSink { base, input }
        }
    }

    impl Node for FloatSink {
        fn base(&self) -> &NodeBase {
            &self.base
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let graph = Graph::new();
        assert!(graph.add_node("a", Arc::new(Source::new())));
        assert!(!graph.add_node("a", Arc::new(Source::new())));
        assert_eq!(graph.num_nodes(), 1);
    }

    #[test]
    fn new_node_renames_on_collision() {
        let graph = Graph::new();
        let first = graph.new_node("src", Source::new());
        let second = graph.new_node("src", Source::new());
        let third = graph.new_node("src", Source::new());
        assert_eq!(first.name(), "src");
        assert_eq!(second.name(), "src0");
        assert_eq!(third.name(), "src1");
        assert_eq!(graph.num_nodes(), 3);
        assert!(graph.get_node_by_name("src1").is_some());
    }

    #[test]
    fn a_node_joins_one_graph_only() {
        let graph_a = Graph::new();
        let graph_b = Graph::new();
        let node = graph_a.new_node("src", Source::new());
        assert!(!graph_b.add_node("other", node.clone()));
        assert_eq!(node.graph().unwrap().num_nodes(), 1);
        assert!(graph_b.get_node_by_name("other").is_none());
    }

    #[test]
    fn connect_checks_names_and_types() {
        let graph = Graph::new();
        let _src = graph.new_node("src", Source::new());
        let _sink = graph.new_node("sink", Sink::new());
        let _floats = graph.new_node("floats", FloatSink::new());

        assert!(!graph.connect_by_name("missing", "out", "sink", "in"));
        assert!(!graph.connect_by_name("src", "missing", "sink", "in"));
        assert!(!graph.connect_by_name("src", "out", "missing", "in"));
        assert!(!graph.connect_by_name("src", "out", "sink", "missing"));
        // Type tags differ: int stream into double pin.
        assert!(!graph.connect_by_name("src", "out", "floats", "in"));

        assert!(graph.connect_by_name("src", "out", "sink", "in"));
    }

    #[test]
    fn start_rolls_back_when_a_node_refuses() {
        let graph = Graph::new();
        let src = graph.new_node("a_src", Source::new());
        // Never connected: refuses to start. Named so the source starts
        // first and has something to roll back.
        let _sink = graph.new_node("z_sink", Sink::new());

        assert!(!graph.start());
        assert!(!graph.is_started());
        assert!(!src.is_running());
        // Rollback closed the source's stream.
        assert!(!src.out.write(Timestamp::now(), 1));
    }

    #[test]
    fn start_and_stop_round_trip() {
        let graph = Graph::new();
        let src = graph.new_node("src", Source::new());
        let sink = graph.new_node("sink", Sink::new());
        assert!(graph.connect_nodes(src.as_ref(), "out", sink.as_ref(), "in"));

        assert!(graph.start());
        assert!(graph.is_started());
        assert!(src.is_running());
        assert!(sink.is_running());
        // Idempotent while running.
        assert!(graph.start());

        graph.stop();
        assert!(!graph.is_started());
        assert!(!src.is_running());
        assert!(!sink.is_running());
    }

    #[test]
    fn remove_node_disconnects_both_sides() {
        let graph = Graph::new();
        let src = graph.new_node("src", Source::new());
        let sink = graph.new_node("sink", Sink::new());
        assert!(graph.connect_nodes(src.as_ref(), "out", sink.as_ref(), "in"));
        assert_eq!(src.out.num_readers(), 1);

        let removed = graph.remove_node("src").expect("src was present");
        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(src.out.num_readers(), 0);
        assert!(!sink.input.is_connected());
        // The handle survives removal.
        assert_eq!(removed.num_output_streams(), 1);
        assert!(graph.remove_node("src").is_none());
    }

    #[test]
    fn node_enumeration_is_in_name_order() {
        let graph = Graph::new();
        let _b = graph.new_node("b", Source::new());
        let _a = graph.new_node("a", Source::new());
        assert_eq!(graph.node(0).unwrap().name(), "a");
        assert_eq!(graph.node(1).unwrap().name(), "b");
        assert!(graph.node(2).is_none());
    }

    #[test]
    fn clear_empties_the_graph() {
        let graph = Graph::new();
        let src = graph.new_node("src", Source::new());
        let sink = graph.new_node("sink", Sink::new());
        assert!(graph.connect_nodes(src.as_ref(), "out", sink.as_ref(), "in"));
        assert!(graph.start());

        graph.clear();
        assert_eq!(graph.num_nodes(), 0);
        assert!(!graph.is_started());
        assert!(!src.is_running());
    }

    #[test]
    fn detach_removes_the_node_from_its_graph() {
        let graph = Graph::new();
        let src = graph.new_node("src", Source::new());
        src.detach();
        assert_eq!(graph.num_nodes(), 0);
        assert!(src.graph().is_none());
        assert_eq!(src.name(), "");
    }

    #[test]
    fn graph_properties() {
        let graph = Graph::new();
        let _src = graph.new_node("src", Source::new());
        assert_eq!(
            graph.property_by_name("NumNodes").unwrap().get(),
            PropertyValue::Int(1)
        );
        assert_eq!(
            graph.property_by_name("Started").unwrap().get(),
            PropertyValue::Bool(false)
        );
    }
}
