//! Timestamped multi-reader stream channels
//!
//! A [`Stream`] is a thread-safe bounded FIFO of timestamped values of a
//! single element type, read by any number of independent cursors, each with
//! its own position. One producer writes; each connected
//! [`StreamReader`](crate::StreamReader) consumes at its own pace, possibly
//! seeking ahead to skip old data. Entries are dropped according to the
//! stream's [`DropPolicy`] once the queue is full or every reader has
//! consumed them.
//!
//! The read side is the [`StreamSource`] trait, so a node can also expose a
//! synthesized source (computing samples on demand) to the same reader
//! cursors; `Stream` is the standard buffered implementation.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use super::message::StreamMessage;
use super::node::NodeBase;
use super::pins::{NamedPin, PinState, StreamReader};
use super::property::{Property, PropertySource, PropertyValue};
use super::time::{SequenceId, Timestamp};

/// Queue limit used when none is given.
pub const DEFAULT_QUEUE_LIMIT: usize = 4;

/// What a stream may do with entries when the queue fills up or readers
/// fall behind. Fixed at stream construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Writes never block: when the queue is full, the oldest entries are
    /// dropped until the new one fits.
    NeverBlockDropOldest,
    /// Writes block until every current entry has been read by every
    /// registered (or lost) reader; nothing is ever dropped unread.
    #[default]
    WaitForConsumptionNeverDrop,
    /// Like [`DropPolicy::WaitForConsumptionNeverDrop`], but entries that no
    /// reader has observed at all may be evicted to unblock the writer once
    /// every reader has seek-skipped past them.
    WaitForConsumptionOrDropZeroReads,
}

impl DropPolicy {
    fn drops_any(self) -> bool {
        self == DropPolicy::NeverBlockDropOldest
    }

    fn drops_zero_reads(self) -> bool {
        self == DropPolicy::WaitForConsumptionOrDropZeroReads
    }

    fn drops_read_by_all(self) -> bool {
        !self.drops_any()
    }
}

/// One delivered value with its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub timestamp: Timestamp,
    pub sequence_id: SequenceId,
}

/// Type-agnostic view of a stream: naming, lifecycle, reader bookkeeping,
/// and type-erased connection. Object-safe so nodes can enumerate their
/// outputs without compile-time type knowledge.
pub trait NamedStream: PropertySource + Send + Sync + 'static {
    fn stream_name(&self) -> &str;

    /// Tag of the element type; connection requires exact equality.
    fn type_tag(&self) -> &'static str;

    /// The node owning this stream, if it is attached to one.
    fn node(&self) -> Option<Arc<NodeBase>>;

    fn open(&self);
    fn close(&self);

    fn num_readers(&self) -> usize;
    fn reader(&self, index: usize) -> Option<Arc<dyn NamedPin>>;

    /// Disconnect every reader, one at a time.
    fn disconnect_readers(&self);

    /// Connect `pin` to this stream. Implementations downcast the pin to
    /// their typed reader form; the caller has already compared type tags.
    fn connect_pin(self: Arc<Self>, pin: &dyn NamedPin) -> bool;
}

/// Typed read interface consumed by [`StreamReader`](crate::StreamReader).
///
/// These methods are intended to be called only through a reader cursor,
/// which owns the per-reader state handed in as [`PinState`].
pub trait StreamSource<T: StreamMessage>: NamedStream {
    /// Deliver the oldest qualifying entry, waiting for data if necessary.
    /// Returns `None` once the stream closes or the cursor disconnects.
    fn read_blocking(&self, cursor: &Arc<PinState>) -> Option<Sample<T>>;

    /// Non-blocking variant of [`StreamSource::read_blocking`].
    fn try_read(&self, cursor: &Arc<PinState>) -> Option<Sample<T>>;

    /// Pure query: is there an entry newer than both bounds?
    fn can_read_from(&self, consumed_until: SequenceId, fresher_than: Timestamp) -> bool;

    fn register_reader(&self, cursor: &Arc<PinState>, pin: Weak<dyn NamedPin>);

    /// Returns false (and asserts in debug builds) when the cursor was not
    /// registered.
    fn unregister_reader(&self, cursor: &Arc<PinState>) -> bool;
}

struct Entry<T> {
    timestamp: Timestamp,
    sequence_id: SequenceId,
    value: T,
    // How many cursors have observed this entry, including readers
    // pre-credited at write time. Once it reaches the number of registered
    // plus lost readers, the entry may be discarded.
    num_reads: usize,
}

struct ReaderSlot {
    state: Arc<PinState>,
    pin: Weak<dyn NamedPin>,
}

struct StreamState<T> {
    buffer: VecDeque<Entry<T>>,
    queue_limit: usize,
    closed: bool,
    next_sequence_id: SequenceId,
    last_written_timestamp: Timestamp,
    readers: Vec<ReaderSlot>,
    // Readers that disconnected while the stream was operating. They stay in
    // the read accounting so in-flight entries keep a consistent target.
    lost_readers: usize,
}

/// The standard buffered stream. See the module documentation.
pub struct Stream<T: StreamMessage> {
    name: String,
    node: Weak<NodeBase>,
    policy: DropPolicy,
    state: Mutex<StreamState<T>>,
    data_available: Condvar,
    slot_available: Condvar,
    self_weak: Weak<Stream<T>>,
}

impl<T: StreamMessage> Stream<T> {
    /// Create a stream owned by `node` and register it as an output.
    pub fn new(
        name: impl Into<String>,
        node: &Arc<NodeBase>,
        policy: DropPolicy,
        queue_limit: usize,
    ) -> Arc<Stream<T>> {
        let stream = Self::build(name, Arc::downgrade(node), policy, queue_limit);
        node.register_output(stream.clone());
        stream
    }

    /// Create a stream that does not belong to any node.
    pub fn unattached(
        name: impl Into<String>,
        policy: DropPolicy,
        queue_limit: usize,
    ) -> Arc<Stream<T>> {
        Self::build(name, Weak::new(), policy, queue_limit)
    }

    fn build(
        name: impl Into<String>,
        node: Weak<NodeBase>,
        policy: DropPolicy,
        queue_limit: usize,
    ) -> Arc<Stream<T>> {
        Arc::new_cyclic(|self_weak| Stream {
            name: name.into(),
            node,
            policy,
            state: Mutex::new(StreamState {
                buffer: VecDeque::new(),
                queue_limit,
                closed: false,
                next_sequence_id: 0,
                last_written_timestamp: Timestamp::EPOCH,
                readers: Vec::new(),
                lost_readers: 0,
            }),
            data_available: Condvar::new(),
            slot_available: Condvar::new(),
            self_weak: self_weak.clone(),
        })
    }

    /// Append `(timestamp, value)` as a new entry with the next sequence id.
    ///
    /// Fails when the stream is closed or `timestamp` is older than the last
    /// written one. Depending on the drop policy this may block until a slot
    /// is available; it then fails if the stream closes while waiting. When
    /// every reader has already seek-skipped past `timestamp`, the write is
    /// absorbed (nothing stored) and still reports success.
    pub fn write(&self, timestamp: Timestamp, value: T) -> bool {
        let mut st = self.state.lock();

        // Never go back in time.
        if timestamp < st.last_written_timestamp {
            tracing::debug!(
                "[stream {}] write at {} rejected, last written {}",
                self.name,
                timestamp,
                st.last_written_timestamp
            );
            return false;
        }
        st.last_written_timestamp = timestamp;

        if st.closed {
            return false;
        }

        let sequence_id = st.next_sequence_id;
        st.next_sequence_id += 1;

        self.drop_entries(&mut st);
        while !st.closed && st.buffer.len() >= st.queue_limit {
            debug_assert!(!self.policy.drops_any());
            self.slot_available.wait(&mut st);
            self.drop_entries(&mut st);
        }
        if st.closed {
            return false;
        }

        let mut interested = 0;
        for slot in &st.readers {
            if slot.state.seek_position() < timestamp {
                interested += 1;
                slot.state.signal_node_activity();
            } else {
                // The reader wants fresher data: account the entry as read
                // and discarded by it.
                slot.state.set_last_read(sequence_id);
            }
        }

        if interested > 0 {
            // Lost readers count as not interested.
            let num_reads = st.readers.len() + st.lost_readers - interested;
            st.buffer.push_back(Entry {
                timestamp,
                sequence_id,
                value,
                num_reads,
            });
            self.data_available.notify_all();
        }
        true
    }

    /// Whether a write would proceed without waiting for a slot.
    pub fn can_write(&self) -> bool {
        if self.policy.drops_any() {
            return true;
        }
        let st = self.state.lock();
        st.buffer.len() < st.queue_limit
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.policy
    }

    /// Number of writes accepted since the stream was last opened.
    pub fn num_update_calls(&self) -> i64 {
        self.state.lock().next_sequence_id
    }

    pub fn num_items_in_queue(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn max_queue_size(&self) -> usize {
        self.state.lock().queue_limit
    }

    pub fn set_max_queue_size(&self, size: usize) -> bool {
        if size == 0 {
            return false;
        }
        self.state.lock().queue_limit = size;
        true
    }

    pub fn last_written_timestamp(&self) -> Timestamp {
        self.state.lock().last_written_timestamp
    }

    /// Scan for the oldest entry this cursor has not consumed, advancing the
    /// cursor over everything it scans. Entries skipped because of the seek
    /// position still count as read by this cursor, so they can be dropped
    /// once every other cursor advances.
    fn find_and_read(
        &self,
        st: &mut StreamState<T>,
        cursor: &PinState,
    ) -> Option<Sample<T>> {
        let denominator = st.readers.len() + st.lost_readers;
        let mut found = None;
        for index in 0..st.buffer.len() {
            let sequence_id = st.buffer[index].sequence_id;
            if cursor.last_read() >= sequence_id {
                continue;
            }
            cursor.set_last_read(sequence_id);
            st.buffer[index].num_reads += 1;

            let entry = &st.buffer[index];
            if cursor.seek_position() < entry.timestamp {
                found = Some(Sample {
                    value: entry.value.clone(),
                    timestamp: entry.timestamp,
                    sequence_id,
                });
                if self.policy.drops_read_by_all() && entry.num_reads >= denominator {
                    let _ = st.buffer.remove(index);
                    self.slot_available.notify_one();
                }
                break;
            }
        }
        self.drop_entries(st);
        found
    }

    fn find_entry(
        st: &StreamState<T>,
        consumed_until: SequenceId,
        fresher_than: Timestamp,
    ) -> bool {
        st.buffer
            .iter()
            .any(|e| consumed_until < e.sequence_id && fresher_than < e.timestamp)
    }

    /// Run the eviction rule of this stream's policy once over the buffer.
    fn drop_entries(&self, st: &mut StreamState<T>) {
        if st.buffer.is_empty() {
            return;
        }
        if self.policy.drops_any() {
            while st.buffer.len() >= st.queue_limit {
                st.buffer.pop_front();
            }
            return;
        }
        let denominator = st.readers.len() + st.lost_readers;
        for index in 0..st.buffer.len() {
            let entry = &st.buffer[index];
            if (self.policy.drops_zero_reads() && entry.num_reads == 0)
                || (self.policy.drops_read_by_all() && entry.num_reads >= denominator)
            {
                let _ = st.buffer.remove(index);
                if st.buffer.len() < st.queue_limit {
                    self.slot_available.notify_one();
                }
                break;
            }
        }
    }

    /// Credit entries the departing reader never consumed, as if it had read
    /// and discarded them.
    fn mark_read_after(st: &mut StreamState<T>, seq: SequenceId) {
        for entry in st.buffer.iter_mut() {
            if entry.sequence_id > seq {
                entry.num_reads += 1;
            }
        }
    }
}

impl<T: StreamMessage> NamedStream for Stream<T> {
    fn stream_name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &'static str {
        T::type_tag()
    }

    fn node(&self) -> Option<Arc<NodeBase>> {
        self.node.upgrade()
    }

    /// Cancel a previous [`NamedStream::close`]. Sequence ids restart from
    /// zero, so cursors connected before the close must reconnect to see new
    /// entries.
    fn open(&self) {
        let mut st = self.state.lock();
        if st.closed {
            st.lost_readers = 0;
            st.next_sequence_id = 0;
            st.closed = false;
            tracing::debug!("[stream {}] opened", self.name);
        }
    }

    /// Drain the buffer and wake every waiter; all current and future reads
    /// and writes fail until the stream is opened again.
    fn close(&self) {
        let mut st = self.state.lock();
        st.buffer.clear();
        st.closed = true;
        self.data_available.notify_all();
        self.slot_available.notify_all();
        for slot in &st.readers {
            slot.state.signal_node_activity();
        }
        tracing::debug!("[stream {}] closed", self.name);
    }

    fn num_readers(&self) -> usize {
        self.state.lock().readers.len()
    }

    fn reader(&self, index: usize) -> Option<Arc<dyn NamedPin>> {
        self.state.lock().readers.get(index)?.pin.upgrade()
    }

    fn disconnect_readers(&self) {
        loop {
            let pin = {
                let mut st = self.state.lock();
                let Some(slot) = st.readers.last() else {
                    return;
                };
                match slot.pin.upgrade() {
                    Some(pin) => pin,
                    None => {
                        // The reader object vanished without disconnecting;
                        // account it as lost directly.
                        let last_read = slot.state.last_read();
                        let _ = st.readers.pop();
                        st.lost_readers += 1;
                        Self::mark_read_after(&mut st, last_read);
                        self.drop_entries(&mut st);
                        continue;
                    }
                }
            };
            pin.disconnect();
        }
    }

    fn connect_pin(self: Arc<Self>, pin: &dyn NamedPin) -> bool {
        match pin.as_any().downcast_ref::<StreamReader<T>>() {
            Some(reader) => reader.attach(self),
            None => false,
        }
    }
}

impl<T: StreamMessage> StreamSource<T> for Stream<T> {
    fn read_blocking(&self, cursor: &Arc<PinState>) -> Option<Sample<T>> {
        let mut st = self.state.lock();
        loop {
            if st.closed || !cursor.is_connected() {
                return None;
            }
            if let Some(sample) = self.find_and_read(&mut st, cursor) {
                return Some(sample);
            }
            self.data_available.wait(&mut st);
        }
    }

    fn try_read(&self, cursor: &Arc<PinState>) -> Option<Sample<T>> {
        let mut st = self.state.lock();
        if st.closed || !cursor.is_connected() {
            return None;
        }
        self.find_and_read(&mut st, cursor)
    }

    fn can_read_from(&self, consumed_until: SequenceId, fresher_than: Timestamp) -> bool {
        let st = self.state.lock();
        if st.closed {
            return false;
        }
        Self::find_entry(&st, consumed_until, fresher_than)
    }

    fn register_reader(&self, cursor: &Arc<PinState>, pin: Weak<dyn NamedPin>) {
        let mut st = self.state.lock();
        debug_assert!(
            !st.readers.iter().any(|s| Arc::ptr_eq(&s.state, cursor)),
            "reader registered twice"
        );
        cursor.set_last_read(super::time::NO_SEQUENCE);
        cursor.set_connected(true);
        st.readers.push(ReaderSlot {
            state: Arc::clone(cursor),
            pin,
        });
        tracing::debug!(
            "[stream {}] reader registered (total: {})",
            self.name,
            st.readers.len()
        );
    }

    fn unregister_reader(&self, cursor: &Arc<PinState>) -> bool {
        let mut st = self.state.lock();
        let Some(index) = st
            .readers
            .iter()
            .position(|s| Arc::ptr_eq(&s.state, cursor))
        else {
            debug_assert!(false, "unregistering a reader that is not registered");
            return false;
        };
        let slot = st.readers.remove(index);
        slot.state.set_connected(false);
        st.lost_readers += 1;

        // Entries the departing reader never read can still reach their
        // read target; credit them so the drop rule stays exact.
        Self::mark_read_after(&mut st, slot.state.last_read());
        self.drop_entries(&mut st);

        // The disconnected reader might be blocked waiting on us.
        self.data_available.notify_all();
        slot.state.signal_node_activity();
        tracing::debug!(
            "[stream {}] reader unregistered (remaining: {}, lost: {})",
            self.name,
            st.readers.len(),
            st.lost_readers
        );
        true
    }
}

impl<T: StreamMessage> PropertySource for Stream<T> {
    fn properties(&self) -> Vec<Property> {
        let updates = self.self_weak.clone();
        let items = self.self_weak.clone();
        let max_get = self.self_weak.clone();
        let max_set = self.self_weak.clone();
        vec![
            Property::read_only("NumUpdates", move || {
                PropertyValue::Int64(updates.upgrade().map_or(0, |s| s.num_update_calls()))
            }),
            Property::read_only("NumItemsInQueue", move || {
                PropertyValue::Int(items.upgrade().map_or(0, |s| s.num_items_in_queue() as i32))
            }),
            Property::read_write(
                "MaxQueueSize",
                move || {
                    PropertyValue::Int(max_get.upgrade().map_or(0, |s| s.max_queue_size() as i32))
                },
                move |value| match (max_set.upgrade(), value) {
                    (Some(stream), PropertyValue::Int(size)) if *size > 0 => {
                        stream.set_max_queue_size(*size as usize)
                    }
                    _ => false,
                },
            ),
        ]
    }
}

impl<T: StreamMessage> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Stream")
            .field("name", &self.name)
            .field("type", &T::type_tag())
            .field("policy", &self.policy)
            .field("queued", &st.buffer.len())
            .field("closed", &st.closed)
            .field("readers", &st.readers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pins::StreamReader;
    use crate::core::time::{Duration, NO_SEQUENCE};
    use std::thread;

    fn ts(micros: i64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    fn connected_pair(policy: DropPolicy, limit: usize) -> (Arc<Stream<i32>>, Arc<StreamReader<i32>>) {
        let stream = Stream::<i32>::unattached("out", policy, limit);
        let reader = StreamReader::<i32>::unattached("in");
        assert!(reader.connect(&(stream.clone() as Arc<dyn NamedStream>)));
        (stream, reader)
    }

    #[test]
    fn sequence_ids_start_at_zero_and_increase() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 8);
        for i in 0..5 {
            assert!(stream.write(ts(i + 1), i as i32));
        }
        for expected in 0..5 {
            let sample = reader.try_read().expect("entry available");
            assert_eq!(sample.sequence_id, expected);
            assert_eq!(sample.value, expected as i32);
        }
        assert!(reader.try_read().is_none());
        assert_eq!(stream.num_update_calls(), 5);
    }

    #[test]
    fn write_going_back_in_time_fails_without_effect() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 8);
        assert!(stream.write(ts(100), 1));
        assert!(!stream.write(ts(99), 2));
        assert_eq!(stream.last_written_timestamp(), ts(100));
        // Equal timestamps are allowed.
        assert!(stream.write(ts(100), 3));

        let a = reader.try_read().unwrap();
        let b = reader.try_read().unwrap();
        assert_eq!((a.value, b.value), (1, 3));
        // The rejected write consumed no sequence id.
        assert_eq!(b.sequence_id, a.sequence_id + 1);
    }

    #[test]
    fn write_to_closed_stream_fails() {
        let (stream, _reader) = connected_pair(DropPolicy::default(), 8);
        stream.close();
        assert!(!stream.write(ts(1), 1));
        assert_eq!(stream.num_items_in_queue(), 0);
    }

    #[test]
    fn write_with_no_readers_is_absorbed() {
        let stream = Stream::<i32>::unattached("out", DropPolicy::default(), 2);
        for i in 0..10 {
            // Succeeds and never blocks even though the queue limit is 2.
            assert!(stream.write(ts(i + 1), 0));
        }
        assert_eq!(stream.num_items_in_queue(), 0);
        assert_eq!(stream.num_update_calls(), 10);
    }

    #[test]
    fn write_is_absorbed_when_all_readers_seeked_past() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 2);
        assert!(reader.seek(ts(1000)));
        for i in 0..10 {
            assert!(stream.write(ts(i + 1), i as i32));
        }
        assert_eq!(stream.num_items_in_queue(), 0);
        // The skipped entries are accounted as read.
        assert_eq!(reader.last_read_sequence_id(), 9);
        // A fresh-enough write is stored again.
        assert!(stream.write(ts(2000), 42));
        let sample = reader.try_read().unwrap();
        assert_eq!(sample.value, 42);
        assert!(sample.timestamp > ts(1000));
    }

    #[test]
    fn never_block_drop_oldest_keeps_queue_bounded() {
        let (stream, reader) = connected_pair(DropPolicy::NeverBlockDropOldest, 3);
        for i in 0..20 {
            assert!(stream.can_write());
            assert!(stream.write(ts(i + 1), i as i32));
            assert!(stream.num_items_in_queue() <= 3);
        }
        // The oldest survivors were dropped; reads resume at a later entry.
        let first = reader.try_read().unwrap();
        assert!(first.value > 0);
        let mut last = first;
        while let Some(next) = reader.try_read() {
            assert!(next.sequence_id > last.sequence_id);
            assert!(next.timestamp > last.timestamp);
            last = next;
        }
        assert_eq!(last.value, 19);
    }

    #[test]
    fn wait_policy_blocks_writer_until_consumed() {
        let (stream, reader) = connected_pair(DropPolicy::WaitForConsumptionNeverDrop, 2);
        assert!(stream.write(ts(1), 1));
        assert!(stream.write(ts(2), 2));
        assert!(!stream.can_write());

        let writer_stream = stream.clone();
        let writer = thread::spawn(move || writer_stream.write(ts(3), 3));

        // Give the writer time to block on the full queue.
        Duration::millis(20.0).sleep();
        assert_eq!(stream.num_items_in_queue(), 2);

        assert_eq!(reader.read().unwrap().value, 1);
        assert!(writer.join().unwrap());
        assert_eq!(reader.read().unwrap().value, 2);
        assert_eq!(reader.read().unwrap().value, 3);
    }

    #[test]
    fn zero_reads_policy_unblocks_writer() {
        let (stream, reader) =
            connected_pair(DropPolicy::WaitForConsumptionOrDropZeroReads, 2);
        assert!(stream.write(ts(1), 1));
        assert!(stream.write(ts(2), 2));
        // Both entries have zero reads, so further writes may evict them
        // instead of blocking forever.
        assert!(stream.write(ts(3), 3));
        assert!(stream.write(ts(4), 4));
        let sample = reader.try_read().unwrap();
        assert!(sample.value >= 2);
    }

    #[test]
    fn close_wakes_blocked_reader() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 4);
        let blocked = thread::spawn(move || reader.read());
        Duration::millis(20.0).sleep();
        stream.close();
        assert!(blocked.join().unwrap().is_none());
    }

    #[test]
    fn close_wakes_blocked_writer() {
        let (stream, _reader) = connected_pair(DropPolicy::WaitForConsumptionNeverDrop, 1);
        assert!(stream.write(ts(1), 1));
        let writer_stream = stream.clone();
        let blocked = thread::spawn(move || writer_stream.write(ts(2), 2));
        Duration::millis(20.0).sleep();
        stream.close();
        assert!(!blocked.join().unwrap());
    }

    #[test]
    fn close_drains_and_open_resets_sequence_ids() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 8);
        assert!(stream.write(ts(1), 1));
        assert_eq!(reader.try_read().unwrap().sequence_id, 0);
        stream.close();
        assert_eq!(stream.num_items_in_queue(), 0);
        assert!(reader.try_read().is_none());

        stream.open();
        assert_eq!(stream.num_update_calls(), 0);
        assert!(stream.write(ts(2), 2));
        // A cursor that read before the close is ahead of the restarted
        // sequence counter; it must reconnect to see post-reopen entries.
        assert!(reader.try_read().is_none());
        assert!(reader.connect(&(stream.clone() as Arc<dyn NamedStream>)));
        assert_eq!(reader.last_read_sequence_id(), NO_SEQUENCE);
        assert_eq!(reader.try_read().unwrap().value, 2);
    }

    #[test]
    fn two_readers_progress_independently() {
        let stream = Stream::<i32>::unattached("out", DropPolicy::default(), 8);
        let fast = StreamReader::<i32>::unattached("fast");
        let slow = StreamReader::<i32>::unattached("slow");
        assert!(fast.connect(&(stream.clone() as Arc<dyn NamedStream>)));
        assert!(slow.connect(&(stream.clone() as Arc<dyn NamedStream>)));
        assert_eq!(stream.num_readers(), 2);

        for i in 0..4 {
            assert!(stream.write(ts(i + 1), i as i32));
        }
        // The fast reader consumes everything; entries stay queued for the
        // slow one under the never-drop policy.
        for i in 0..4 {
            assert_eq!(fast.try_read().unwrap().value, i);
        }
        assert_eq!(stream.num_items_in_queue(), 4);
        for i in 0..4 {
            assert_eq!(slow.try_read().unwrap().value, i);
        }
        // Read by all readers: queue drains.
        assert_eq!(stream.num_items_in_queue(), 0);
    }

    #[test]
    fn unregistering_reader_releases_its_entries() {
        let (stream, stayer) = connected_pair(DropPolicy::WaitForConsumptionNeverDrop, 4);
        let leaver = StreamReader::<i32>::unattached("leaver");
        assert!(leaver.connect(&(stream.clone() as Arc<dyn NamedStream>)));

        for i in 0..4 {
            assert!(stream.write(ts(i + 1), i as i32));
        }
        for i in 0..4 {
            assert_eq!(stayer.try_read().unwrap().value, i);
        }
        // Entries wait for the second reader.
        assert_eq!(stream.num_items_in_queue(), 4);
        assert!(!stream.can_write());

        leaver.disconnect();
        assert_eq!(stream.num_readers(), 1);
        // The departing reader's unread entries are credited; the writer can
        // make progress again.
        assert!(stream.write(ts(10), 99));
        assert_eq!(stayer.read().unwrap().value, 99);
    }

    #[test]
    fn disconnect_wakes_blocked_reader() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 4);
        let read_from = reader.clone();
        let blocked = thread::spawn(move || read_from.read());
        Duration::millis(20.0).sleep();
        stream.disconnect_readers();
        assert!(blocked.join().unwrap().is_none());
        assert_eq!(stream.num_readers(), 0);
        assert!(!reader.is_connected());
    }

    #[test]
    fn can_read_reflects_seek_and_consumption() {
        let (stream, reader) = connected_pair(DropPolicy::default(), 8);
        assert!(!reader.can_read());
        assert!(stream.write(ts(10), 1));
        assert!(reader.can_read());
        assert!(reader.seek(ts(10)));
        // The only entry is not fresher than the seek position.
        assert!(!reader.can_read());
        assert!(stream.write(ts(11), 2));
        assert!(reader.can_read());
        assert_eq!(reader.try_read().unwrap().value, 2);
        assert!(!reader.can_read());
    }

    #[test]
    fn max_queue_size_is_adjustable() {
        let (stream, _reader) = connected_pair(DropPolicy::default(), 4);
        assert_eq!(stream.max_queue_size(), 4);
        assert!(stream.set_max_queue_size(2));
        assert_eq!(stream.max_queue_size(), 2);
        assert!(!stream.set_max_queue_size(0));
        assert_eq!(stream.max_queue_size(), 2);
    }

    #[test]
    fn stream_properties_expose_counters() {
        let (stream, _reader) = connected_pair(DropPolicy::default(), 4);
        assert!(stream.write(ts(1), 1));

        let named: Arc<dyn NamedStream> = stream.clone();
        let updates = named.property_by_name("NumUpdates").unwrap();
        assert_eq!(updates.get(), PropertyValue::Int64(1));
        assert!(!updates.is_writable());

        let max = named.property_by_name("MaxQueueSize").unwrap();
        assert!(max.is_writable());
        assert!(max.value_from_string("7"));
        assert_eq!(stream.max_queue_size(), 7);
    }
}
