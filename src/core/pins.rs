//! Reader cursors (input pins)
//!
//! A [`StreamReader`] holds one reader's view into a stream: its seek
//! position and the sequence id of the last entry it consumed. A cursor
//! belongs to at most one stream at a time; nodes in the graph read data
//! exclusively through their cursors. If the graph has not connected a
//! cursor, reading fails.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::message::StreamMessage;
use super::node::NodeBase;
use super::property::{Property, PropertySource, PropertyValue};
use super::stream::{NamedStream, Sample, StreamSource};
use super::time::{SequenceId, Timestamp, NO_SEQUENCE};

/// Per-reader state shared between a cursor and the stream it reads.
///
/// Streams mutate the positions under their own mutex while scanning;
/// [`StreamSource`](crate::StreamSource) implementations are the only
/// intended writers.
pub struct PinState {
    seek: AtomicI64,
    last_read: AtomicI64,
    connected: AtomicBool,
    node: Weak<NodeBase>,
}

impl PinState {
    fn new(node: Weak<NodeBase>) -> Arc<PinState> {
        Arc::new(PinState {
            seek: AtomicI64::new(Timestamp::EPOCH.as_micros()),
            last_read: AtomicI64::new(NO_SEQUENCE),
            connected: AtomicBool::new(false),
            node,
        })
    }

    /// Entries at or below this timestamp are not delivered to the reader.
    pub fn seek_position(&self) -> Timestamp {
        Timestamp::from_micros(self.seek.load(Ordering::SeqCst))
    }

    /// Succeeds iff `timestamp` does not move the position backwards.
    pub fn try_seek(&self, timestamp: Timestamp) -> bool {
        let previous = self.seek.fetch_max(timestamp.as_micros(), Ordering::SeqCst);
        timestamp.as_micros() >= previous
    }

    pub fn last_read(&self) -> SequenceId {
        self.last_read.load(Ordering::SeqCst)
    }

    pub fn set_last_read(&self, sequence_id: SequenceId) {
        self.last_read.store(sequence_id, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// The node owning this cursor, if any.
    pub fn node(&self) -> Option<Arc<NodeBase>> {
        self.node.upgrade()
    }

    /// Called by the connected stream when new data may be readable.
    pub fn signal_node_activity(&self) {
        if let Some(node) = self.node.upgrade() {
            node.signal_activity();
        }
    }
}

/// Type-agnostic plug to any stream. Has a name. Object-safe so nodes can
/// enumerate their input pins without compile-time type knowledge.
pub trait NamedPin: PropertySource + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Tag of the element type this pin accepts.
    fn type_tag(&self) -> &'static str;

    /// The node owning this pin, if it is attached to one.
    fn node(&self) -> Option<Arc<NodeBase>>;

    /// Connect to a stream of the same element type. Any previous
    /// connection is dropped first.
    fn connect(&self, stream: &Arc<dyn NamedStream>) -> bool;

    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn connected_stream(&self) -> Option<Arc<dyn NamedStream>>;

    /// Whether a read would deliver an entry right now.
    fn can_read(&self) -> bool;

    fn open_connected(&self);
    fn close_connected(&self);

    /// Downcast support for typed connection.
    fn as_any(&self) -> &dyn Any;
}

/// The typed reader cursor. See the module documentation.
pub struct StreamReader<T: StreamMessage> {
    name: String,
    state: Arc<PinState>,
    stream: Mutex<Option<Arc<dyn StreamSource<T>>>>,
    self_weak: Weak<StreamReader<T>>,
}

impl<T: StreamMessage> StreamReader<T> {
    /// Create a cursor owned by `node` and register it as an input pin.
    pub fn new(name: impl Into<String>, node: &Arc<NodeBase>) -> Arc<StreamReader<T>> {
        let pin = Self::build(name, Arc::downgrade(node));
        node.register_input(pin.clone());
        pin
    }

    /// Create a cursor that does not belong to any node.
    pub fn unattached(name: impl Into<String>) -> Arc<StreamReader<T>> {
        Self::build(name, Weak::new())
    }

    fn build(name: impl Into<String>, node: Weak<NodeBase>) -> Arc<StreamReader<T>> {
        Arc::new_cyclic(|self_weak| StreamReader {
            name: name.into(),
            state: PinState::new(node),
            stream: Mutex::new(None),
            self_weak: self_weak.clone(),
        })
    }

    pub fn connect(&self, stream: &Arc<dyn NamedStream>) -> bool {
        if stream.type_tag() != T::type_tag() {
            tracing::debug!(
                "[pin {}] cannot connect stream {}: type {} != {}",
                self.name,
                stream.stream_name(),
                stream.type_tag(),
                T::type_tag()
            );
            return false;
        }
        Arc::clone(stream).connect_pin(self)
    }

    /// Complete a connection with an already type-checked source. Intended
    /// to be called from [`NamedStream::connect_pin`] implementations.
    pub fn attach(&self, stream: Arc<dyn StreamSource<T>>) -> bool {
        self.disconnect();
        *self.stream.lock() = Some(stream.clone());
        // Registration resets the cursor position and marks it connected.
        stream.register_reader(&self.state, self.self_weak.clone() as Weak<dyn NamedPin>);
        true
    }

    pub fn disconnect(&self) {
        let stream = self.stream.lock().take();
        // Make is_connected() observe false before unregistering, so a
        // blocked read woken by the stream gives up instead of re-waiting.
        self.state.set_connected(false);
        if let Some(stream) = stream {
            stream.unregister_reader(&self.state);
            if let Some(node) = self.state.node() {
                node.stop();
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn connected_stream(&self) -> Option<Arc<dyn NamedStream>> {
        let stream = self.stream.lock().clone()?;
        Some(stream as Arc<dyn NamedStream>)
    }

    /// Blocking read of the next qualifying entry.
    ///
    /// Returns `None` when the cursor is unconnected, disconnected while
    /// waiting, or the stream closed. A close of the connected stream also
    /// disconnects this pin and thereby stops the owning node: a node
    /// autonomously transitions to stopped when any of its inputs closes.
    pub fn read(&self) -> Option<Sample<T>> {
        let stream = self.stream.lock().clone()?;
        match stream.read_blocking(&self.state) {
            Some(sample) => Some(sample),
            None => {
                if self.state.is_connected() {
                    // The stream closed underneath us.
                    self.disconnect();
                }
                None
            }
        }
    }

    /// Non-blocking read: `None` when no qualifying entry is present.
    pub fn try_read(&self) -> Option<Sample<T>> {
        let stream = self.stream.lock().clone()?;
        stream.try_read(&self.state)
    }

    pub fn can_read(&self) -> bool {
        let Some(stream) = self.stream.lock().clone() else {
            return false;
        };
        stream.can_read_from(self.state.last_read(), self.state.seek_position())
    }

    /// Skip entries until `timestamp`: entries with an equal or lower
    /// timestamp are ignored from now on. Rejects (returns false) any seek
    /// that would move backwards.
    pub fn seek(&self, timestamp: Timestamp) -> bool {
        self.state.try_seek(timestamp)
    }

    pub fn seek_position(&self) -> Timestamp {
        self.state.seek_position()
    }

    pub fn last_read_sequence_id(&self) -> SequenceId {
        self.state.last_read()
    }

    pub fn open_connected(&self) {
        if let Some(stream) = self.stream.lock().clone() {
            stream.open();
        }
    }

    pub fn close_connected(&self) {
        if let Some(stream) = self.stream.lock().clone() {
            stream.close();
        }
    }
}

impl<T: StreamMessage> NamedPin for StreamReader<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        T::type_tag()
    }

    fn node(&self) -> Option<Arc<NodeBase>> {
        self.state.node()
    }

    fn connect(&self, stream: &Arc<dyn NamedStream>) -> bool {
        StreamReader::connect(self, stream)
    }

    fn disconnect(&self) {
        StreamReader::disconnect(self);
    }

    fn is_connected(&self) -> bool {
        StreamReader::is_connected(self)
    }

    fn connected_stream(&self) -> Option<Arc<dyn NamedStream>> {
        StreamReader::connected_stream(self)
    }

    fn can_read(&self) -> bool {
        StreamReader::can_read(self)
    }

    fn open_connected(&self) {
        StreamReader::open_connected(self);
    }

    fn close_connected(&self) {
        StreamReader::close_connected(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: StreamMessage> PropertySource for StreamReader<T> {
    fn properties(&self) -> Vec<Property> {
        let connected = Arc::clone(&self.state);
        let last_read = Arc::clone(&self.state);
        let seek = Arc::clone(&self.state);
        vec![
            Property::read_only("Connected", move || {
                PropertyValue::Bool(connected.is_connected())
            }),
            Property::read_only("LastReadSequenceId", move || {
                PropertyValue::Int64(last_read.last_read())
            }),
            Property::read_only("SeekPositionUs", move || {
                PropertyValue::Int64(seek.seek_position().as_micros())
            }),
        ]
    }
}

impl<T: StreamMessage> Drop for StreamReader<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: StreamMessage> std::fmt::Debug for StreamReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("name", &self.name)
            .field("type", &T::type_tag())
            .field("connected", &self.is_connected())
            .field("last_read", &self.last_read_sequence_id())
            .finish()
    }
}
