//! Graph introspection
//!
//! A [`GraphVisitor`] walks a graph: every node, each node's output streams
//! and input pins, and every property along the way. The HTTP introspection
//! server renders its UI from exactly this traversal; tools that want a
//! different view implement the trait themselves.

use std::sync::Arc;

use super::graph::Graph;
use super::node::Node;
use super::pins::NamedPin;
use super::property::{Property, PropertySource};
use super::stream::NamedStream;

/// Who a visited property belongs to.
pub enum PropertyOwner<'a> {
    Graph(&'a Graph),
    Node(&'a Arc<dyn Node>),
    Stream(&'a Arc<dyn Node>, &'a Arc<dyn NamedStream>),
    Pin(&'a Arc<dyn Node>, &'a Arc<dyn NamedPin>),
}

/// Callbacks fired while walking a graph with [`visit_graph`].
pub trait GraphVisitor {
    fn on_node(&mut self, _node: &Arc<dyn Node>) {}
    fn on_stream(&mut self, _node: &Arc<dyn Node>, _stream: &Arc<dyn NamedStream>) {}
    fn on_pin(&mut self, _node: &Arc<dyn Node>, _pin: &Arc<dyn NamedPin>) {}
    fn on_property(&mut self, _owner: PropertyOwner<'_>, _property: &Property) {}
}

/// Walk `graph` in node name order, visiting nodes, streams, pins, and all
/// properties.
pub fn visit_graph(graph: &Graph, visitor: &mut dyn GraphVisitor) {
    for property in graph.properties() {
        visitor.on_property(PropertyOwner::Graph(graph), &property);
    }
    for index in 0.. {
        let Some(node) = graph.node(index) else {
            break;
        };
        visitor.on_node(&node);
        for property in node.properties() {
            visitor.on_property(PropertyOwner::Node(&node), &property);
        }
        for stream_index in 0..node.num_output_streams() {
            let Some(stream) = node.output_stream(stream_index) else {
                continue;
            };
            visitor.on_stream(&node, &stream);
            for property in stream.properties() {
                visitor.on_property(PropertyOwner::Stream(&node, &stream), &property);
            }
        }
        for pin_index in 0..node.num_input_pins() {
            let Some(pin) = node.input_pin(pin_index) else {
                continue;
            };
            visitor.on_pin(&node, &pin);
            for property in pin.properties() {
                visitor.on_property(PropertyOwner::Pin(&node, &pin), &property);
            }
        }
    }
}

/// For a connected pin, the `(node_name, stream_name)` endpoint it reads
/// from. `None` when the pin is unconnected or the stream is unattached.
pub fn connection_endpoint(pin: &dyn NamedPin) -> Option<(String, String)> {
    let stream = pin.connected_stream()?;
    let node = stream.node()?;
    Some((node.name(), stream.stream_name().to_string()))
}
