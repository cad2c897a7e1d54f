//! Sequence lifecycle events.

use std::fmt;

use crate::flow::FlowKey;

/// Notification emitted by a [`Sequencer`](super::Sequencer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// A new sequence was created for `key`.
    SequenceStart {
        key: FlowKey,
        start: u64,
        timestamp_us: i64,
    },
    /// A fragment was admitted.
    NewPacket {
        key: FlowKey,
        frame_number: u64,
        seq_offset: u64,
        seq_len: usize,
    },
    /// An admitted fragment overlaps one admitted earlier. Both are kept;
    /// the later one wins when the unit is assembled.
    FragmentOverlap {
        key: FlowKey,
        frame_number: u64,
        overlapped_frame: u64,
        seq_offset: u64,
        seq_len: usize,
    },
    SequenceComplete {
        key: FlowKey,
        total_len: u64,
        fragments: usize,
    },
    /// Leading bytes that do not begin a unit were dropped.
    BytesSkipped {
        key: FlowKey,
        start: u64,
        len: u64,
    },
    /// The sequence expired and was dropped without a result.
    SequenceTimeout {
        key: FlowKey,
        fragments: usize,
        covered: u64,
    },
}

impl SequenceEvent {
    pub fn key(&self) -> &FlowKey {
        match self {
            SequenceEvent::SequenceStart { key, .. }
            | SequenceEvent::NewPacket { key, .. }
            | SequenceEvent::FragmentOverlap { key, .. }
            | SequenceEvent::SequenceComplete { key, .. }
            | SequenceEvent::BytesSkipped { key, .. }
            | SequenceEvent::SequenceTimeout { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SequenceEvent::SequenceStart { .. } => "start",
            SequenceEvent::NewPacket { .. } => "packet",
            SequenceEvent::FragmentOverlap { .. } => "overlap",
            SequenceEvent::SequenceComplete { .. } => "complete",
            SequenceEvent::BytesSkipped { .. } => "skip",
            SequenceEvent::SequenceTimeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for SequenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceEvent::SequenceStart { start, timestamp_us, .. } => {
                write!(f, "start at {start} (t={timestamp_us})")
            }
            SequenceEvent::NewPacket {
                frame_number,
                seq_offset,
                seq_len,
                ..
            } => write!(f, "frame {frame_number} [{seq_offset}, +{seq_len})"),
            SequenceEvent::FragmentOverlap {
                frame_number,
                overlapped_frame,
                seq_offset,
                seq_len,
                ..
            } => write!(
                f,
                "frame {frame_number} [{seq_offset}, +{seq_len}) overlaps frame {overlapped_frame}"
            ),
            SequenceEvent::SequenceComplete {
                total_len,
                fragments,
                ..
            } => write!(f, "complete, {total_len} bytes in {fragments} fragment(s)"),
            SequenceEvent::BytesSkipped { start, len, .. } => {
                write!(f, "skipped {len} bytes at {start}")
            }
            SequenceEvent::SequenceTimeout {
                fragments, covered, ..
            } => write!(f, "timed out with {covered} bytes in {fragments} fragment(s)"),
        }
    }
}

/// Receives sequence events.
///
/// Listeners run synchronously on the thread driving the sequencer.
pub trait SequenceListener: Send {
    fn on_event(&mut self, event: &SequenceEvent);
}

impl<F> SequenceListener for F
where
    F: FnMut(&SequenceEvent) + Send,
{
    fn on_event(&mut self, event: &SequenceEvent) {
        self(event)
    }
}
