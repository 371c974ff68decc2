//! Graph nodes
//!
//! A node owns its output streams and input pins and participates in a
//! [`Graph`](crate::Graph). Concrete nodes embed a [`NodeBase`] carrying the
//! shared lifecycle state and implement the [`Node`] trait; threaded nodes
//! additionally provide a `thread_main` and get a dedicated worker thread.
//! Plain nodes are driven synchronously by whoever reads their outputs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use super::error::Result;
use super::graph::Graph;
use super::pins::NamedPin;
use super::property::{Property, PropertySource, PropertyValue};
use super::stream::NamedStream;
use super::worker::Worker;

/// Shared state of every node: name, graph membership, lifecycle flags, the
/// two wakeup condition variables, and the fixed pin/stream registries.
pub struct NodeBase {
    name: Mutex<String>,
    graph: Mutex<Weak<Graph>>,
    self_handle: Mutex<Weak<dyn Node>>,
    running: AtomicBool,
    // Guards against recursive stop: a stop disconnects pins, and a pin
    // disconnect stops its node.
    stopping: AtomicBool,
    pin_activity_lock: Mutex<()>,
    pin_activity: Condvar,
    stop_lock: Mutex<()>,
    stop_event: Condvar,
    outputs: Mutex<Vec<Arc<dyn NamedStream>>>,
    inputs: Mutex<Vec<Arc<dyn NamedPin>>>,
    worker: Option<Worker>,
    must_quit: AtomicBool,
}

impl NodeBase {
    /// State for a plain node, driven by its callers.
    pub fn new() -> Arc<NodeBase> {
        Self::build(None)
    }

    /// State for a threaded node owning one worker thread.
    pub fn threaded() -> Arc<NodeBase> {
        Self::build(Some(Worker::new()))
    }

    fn build(worker: Option<Worker>) -> Arc<NodeBase> {
        Arc::new(NodeBase {
            name: Mutex::new(String::new()),
            graph: Mutex::new(Weak::new()),
            self_handle: Mutex::new(Weak::<NeverNode>::new() as Weak<dyn Node>),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            pin_activity_lock: Mutex::new(()),
            pin_activity: Condvar::new(),
            stop_lock: Mutex::new(()),
            stop_event: Condvar::new(),
            outputs: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
            worker,
            must_quit: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn graph(&self) -> Option<Arc<Graph>> {
        self.graph.lock().upgrade()
    }

    /// Register an output stream. Called by stream constructors; the set of
    /// streams is fixed once the node is in use.
    pub fn register_output(&self, stream: Arc<dyn NamedStream>) {
        self.outputs.lock().push(stream);
    }

    /// Register an input pin. Called by pin constructors.
    pub fn register_input(&self, pin: Arc<dyn NamedPin>) {
        self.inputs.lock().push(pin);
    }

    pub(crate) fn set_self_handle(&self, handle: Weak<dyn Node>) {
        *self.self_handle.lock() = handle;
    }

    /// Bind the node to a graph. Called by [`Graph::add_node`] only; fails
    /// if the node already belongs to a graph.
    pub fn set_name_and_graph(
        &self,
        name: &str,
        graph: &Weak<Graph>,
        handle: Weak<dyn Node>,
    ) -> bool {
        let mut current = self.graph.lock();
        if current.upgrade().is_some() {
            return false;
        }
        *current = graph.clone();
        *self.name.lock() = name.to_string();
        self.set_self_handle(handle);
        true
    }

    /// Unplug the node from its graph.
    pub fn detach(&self) {
        let graph = self.graph.lock().upgrade();
        if let Some(graph) = graph {
            let _ = graph.remove_node(&self.name());
        }
        *self.graph.lock() = Weak::new();
        self.name.lock().clear();
    }

    /// Try to start the node: verify every input pin is connected, open all
    /// output streams and all connected input streams, then mark the node
    /// running and, for threaded nodes, spawn the worker.
    pub fn start(&self) -> bool {
        let guard = self.stop_lock.lock();
        if self.running.load(Ordering::SeqCst) {
            return true;
        }
        if !self.all_pins_connected() {
            tracing::debug!("[node {}] cannot start: unconnected input pin", self.name());
            return false;
        }
        self.open_all_streams();
        self.open_connected_pins();
        self.running.store(true, Ordering::SeqCst);

        if let Some(worker) = &self.worker {
            self.must_quit.store(false, Ordering::SeqCst);
            let handle = self.self_handle.lock().upgrade();
            let Some(node) = handle else {
                tracing::warn!(
                    "[node {}] threaded node has no handle; add it to a graph or bind() it",
                    self.name()
                );
                drop(guard);
                self.stop();
                return false;
            };
            let thread_name = match self.name() {
                name if name.is_empty() => "node".to_string(),
                name => name,
            };
            let spawned = worker.start(&thread_name, move || {
                match catch_unwind(AssertUnwindSafe(|| node.thread_main())) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!("[node {}] thread main failed: {}", node.name(), err);
                    }
                    Err(_) => {
                        tracing::error!("[node {}] thread main panicked", node.name());
                    }
                }
                node.stop();
            });
            if !spawned {
                drop(guard);
                self.stop();
                return false;
            }
        }
        tracing::debug!("[node {}] started", self.name());
        true
    }

    /// Stop the node and disconnect all of its pins, so the rest of the
    /// graph can keep running without it. Idempotent and safe to call from
    /// the node's own worker thread.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.running.load(Ordering::SeqCst) {
            self.stopping.store(false, Ordering::SeqCst);
            return;
        }
        tracing::debug!("[node {}] stopping", self.name());

        self.disconnect_all_pins();
        {
            let _guard = self.stop_lock.lock();
            self.running.store(false, Ordering::SeqCst);
            self.stop_event.notify_all();
        }
        self.close_all_streams();
        self.pin_activity.notify_all();
        self.stopping.store(false, Ordering::SeqCst);

        if let Some(worker) = &self.worker {
            self.must_quit.store(true, Ordering::SeqCst);
            // join() is a no-op when the worker stops itself.
            worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        let running = self.running.load(Ordering::SeqCst);
        match &self.worker {
            Some(worker) => running && worker.is_running(),
            None => running,
        }
    }

    /// Cooperative quit flag polled by `thread_main` loops.
    pub fn thread_must_quit(&self) -> bool {
        self.must_quit.load(Ordering::SeqCst)
    }

    /// Block until the node is no longer running. Returns immediately when
    /// called from the node's own worker thread.
    pub fn wait_until_stopped(&self) {
        if let Some(worker) = &self.worker {
            if worker.is_worker_thread() {
                return;
            }
        }
        let mut guard = self.stop_lock.lock();
        while self.running.load(Ordering::SeqCst) {
            self.stop_event.wait(&mut guard);
        }
    }

    /// Wait for any input pin to receive data. To know which one, iterate
    /// and `try_read` all input pins afterwards.
    pub fn wait_for_pin_activity(&self) {
        let pins: Vec<Arc<dyn NamedPin>> = self.inputs.lock().clone();
        for pin in &pins {
            if pin.can_read() {
                return;
            }
        }
        let mut guard = self.pin_activity_lock.lock();
        // Re-check with the lock held to narrow the wakeup race.
        for pin in &pins {
            if pin.can_read() {
                return;
            }
        }
        self.pin_activity.wait(&mut guard);
    }

    /// Called by connected streams when new data arrives for one of this
    /// node's pins.
    pub fn signal_activity(&self) {
        self.pin_activity.notify_all();
    }

    pub fn all_pins_connected(&self) -> bool {
        self.inputs.lock().iter().all(|pin| pin.is_connected())
    }

    pub fn open_connected_pins(&self) {
        for pin in self.inputs.lock().iter() {
            pin.open_connected();
        }
    }

    pub fn close_connected_pins(&self) {
        for pin in self.inputs.lock().iter() {
            pin.close_connected();
        }
    }

    pub fn disconnect_all_pins(&self) {
        let pins: Vec<Arc<dyn NamedPin>> = self.inputs.lock().clone();
        for pin in pins {
            pin.disconnect();
        }
    }

    pub fn disconnect_all_streams(&self) {
        let streams: Vec<Arc<dyn NamedStream>> = self.outputs.lock().clone();
        for stream in streams {
            stream.disconnect_readers();
        }
    }

    pub fn open_all_streams(&self) {
        for stream in self.outputs.lock().iter() {
            stream.open();
        }
    }

    pub fn close_all_streams(&self) {
        for stream in self.outputs.lock().iter() {
            stream.close();
        }
    }

    pub fn num_output_streams(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn output_stream(&self, index: usize) -> Option<Arc<dyn NamedStream>> {
        self.outputs.lock().get(index).cloned()
    }

    pub fn get_output_stream_by_name(&self, name: &str) -> Option<Arc<dyn NamedStream>> {
        self.outputs
            .lock()
            .iter()
            .find(|s| s.stream_name() == name)
            .cloned()
    }

    pub fn num_input_pins(&self) -> usize {
        self.inputs.lock().len()
    }

    pub fn input_pin(&self, index: usize) -> Option<Arc<dyn NamedPin>> {
        self.inputs.lock().get(index).cloned()
    }

    pub fn get_input_pin_by_name(&self, name: &str) -> Option<Arc<dyn NamedPin>> {
        self.inputs
            .lock()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }
}

impl PropertySource for NodeBase {
    fn properties(&self) -> Vec<Property> {
        let handle = self.self_handle.lock().clone();
        vec![Property::read_only("Running", move || {
            PropertyValue::Bool(handle.upgrade().is_some_and(|n| n.is_running()))
        })]
    }
}

impl std::fmt::Debug for NodeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBase")
            .field("name", &self.name())
            .field("running", &self.is_running())
            .field("outputs", &self.num_output_streams())
            .field("inputs", &self.num_input_pins())
            .finish()
    }
}

// Placeholder target for the initial, unbound self handle.
struct NeverNode;
impl Node for NeverNode {
    fn base(&self) -> &NodeBase {
        unreachable!("NeverNode is never instantiated")
    }
}

/// A participant in the graph.
///
/// Implementors provide [`Node::base`] and, for threaded nodes,
/// [`Node::thread_main`]; everything else is provided. The node is shared
/// between the graph and external callers and outlives its removal from the
/// graph.
pub trait Node: Send + Sync + 'static {
    fn base(&self) -> &NodeBase;

    /// Body of the worker thread for threaded nodes, typically a loop of
    /// the form `while !self.base().thread_must_quit() { .. }`. An error
    /// return is logged and treated as normal termination.
    fn thread_main(&self) -> Result<()> {
        Ok(())
    }

    /// Bind the worker handle of an unattached threaded node. Adding a node
    /// to a graph does this implicitly.
    fn bind(node: &Arc<Self>)
    where
        Self: Sized,
    {
        node.base()
            .set_self_handle(Arc::downgrade(node) as Weak<dyn Node>);
    }

    fn name(&self) -> String {
        self.base().name()
    }

    fn graph(&self) -> Option<Arc<Graph>> {
        self.base().graph()
    }

    fn start(&self) -> bool {
        self.base().start()
    }

    fn stop(&self) {
        self.base().stop()
    }

    fn is_running(&self) -> bool {
        self.base().is_running()
    }

    fn wait_until_stopped(&self) {
        self.base().wait_until_stopped()
    }

    fn wait_for_pin_activity(&self) {
        self.base().wait_for_pin_activity()
    }

    fn signal_activity(&self) {
        self.base().signal_activity()
    }

    fn num_output_streams(&self) -> usize {
        self.base().num_output_streams()
    }

    fn output_stream(&self, index: usize) -> Option<Arc<dyn NamedStream>> {
        self.base().output_stream(index)
    }

    fn get_output_stream_by_name(&self, name: &str) -> Option<Arc<dyn NamedStream>> {
        self.base().get_output_stream_by_name(name)
    }

    fn num_input_pins(&self) -> usize {
        self.base().num_input_pins()
    }

    fn input_pin(&self, index: usize) -> Option<Arc<dyn NamedPin>> {
        self.base().input_pin(index)
    }

    fn get_input_pin_by_name(&self, name: &str) -> Option<Arc<dyn NamedPin>> {
        self.base().get_input_pin_by_name(name)
    }

    fn disconnect_all_pins(&self) {
        self.base().disconnect_all_pins()
    }

    fn disconnect_all_streams(&self) {
        self.base().disconnect_all_streams()
    }

    fn detach(&self) {
        self.base().detach()
    }

    fn properties(&self) -> Vec<Property> {
        self.base().properties()
    }
}
