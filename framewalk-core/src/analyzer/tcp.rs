//! TCP streams carrying content-length delimited messages.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::ReassemblyError;
use crate::flow::FlowKey;
use crate::protocol::tcp::{flags, TcpSegment};
use crate::reassembly::{
    Admission, ContentLengthDetector, Fragment, Sequence, SequenceListener, Sequencer,
    SequencerConfig,
};

/// Stream offset given to the first sequence number of a stream whose SYN
/// was not captured. Segments that arrive late but precede it land below.
const MID_STREAM_BASE: u64 = 1 << 32;

/// Per-direction stream position.
#[derive(Debug, Clone, Copy)]
struct StreamCursor {
    /// Sequence number at offset `base`.
    isn: u32,
    base: u64,
    /// Offset up to which messages have been delivered or skipped.
    consumed: u64,
    /// The next message is known to begin at `consumed`: a SYN was seen
    /// or a message boundary found.
    anchored: bool,
    last_seen_us: i64,
}

impl StreamCursor {
    fn offset(&self, seq: u32) -> Option<u64> {
        let delta = seq.wrapping_sub(self.isn) as i32;
        self.base.checked_add_signed(i64::from(delta))
    }
}

/// Maps TCP sequence numbers onto stream offsets and runs one message
/// sequence per direction.
pub(super) struct StreamTracker {
    sequencer: Sequencer,
    cursors: HashMap<FlowKey, StreamCursor>,
    ports: Vec<u16>,
    idle_us: i64,
}

impl StreamTracker {
    pub(super) fn new(config: SequencerConfig, ports: Vec<u16>) -> Self {
        let idle_us = config.timeout_us;
        Self {
            sequencer: Sequencer::new(config).with_detector(ContentLengthDetector::new()),
            cursors: HashMap::new(),
            ports,
            idle_us,
        }
    }

    pub(super) fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub(super) fn add_listener<L: SequenceListener + 'static>(&mut self, listener: L) {
        self.sequencer.add_listener(listener);
    }

    pub(super) fn watches(&self, segment: &TcpSegment) -> bool {
        self.ports.contains(&segment.src_port) || self.ports.contains(&segment.dst_port)
    }

    /// Feed one segment; returns the messages it completed, in stream order.
    pub(super) fn segment(
        &mut self,
        key: FlowKey,
        segment: &TcpSegment,
        payload: Bytes,
        frame_number: u64,
        timestamp_us: i64,
    ) -> Result<Vec<Sequence>, ReassemblyError> {
        let mut completed = Vec::new();

        if segment.has(flags::RST) {
            let reverse = key.reversed();
            for k in [&key, &reverse] {
                self.sequencer.remove(k);
                self.cursors.remove(k);
            }
            trace!(frame_number, "stream reset");
            return Ok(completed);
        }

        if segment.has(flags::SYN) {
            self.cursors.insert(
                key.clone(),
                StreamCursor {
                    isn: segment.seq.wrapping_add(1), // SYN consumes one seq
                    base: 0,
                    consumed: 0,
                    anchored: true,
                    last_seen_us: timestamp_us,
                },
            );
        }

        if !payload.is_empty() {
            let cursor = self.cursors.entry(key.clone()).or_insert(StreamCursor {
                isn: segment.seq,
                base: MID_STREAM_BASE,
                consumed: 0,
                anchored: false,
                last_seen_us: timestamp_us,
            });
            cursor.last_seen_us = timestamp_us;
            let consumed = cursor.consumed;

            match cursor.offset(segment.seq) {
                None => trace!(frame_number, seq = segment.seq, "segment precedes stream start"),
                Some(offset) if offset + payload.len() as u64 <= consumed => {
                    trace!(frame_number, offset, "retransmission of delivered bytes");
                }
                Some(mut offset) => {
                    let mut payload = payload;
                    if offset < consumed {
                        payload = payload.slice((consumed - offset) as usize..);
                        offset = consumed;
                    }
                    let fragment =
                        Fragment::new(offset, payload).with_frame(frame_number, timestamp_us);
                    self.admit(&key, fragment, timestamp_us, &mut completed)?;
                }
            }
        }

        if segment.has(flags::FIN) {
            self.close(&key, timestamp_us, &mut completed)?;
        }

        Ok(completed)
    }

    /// Close every open message at end of capture.
    pub(super) fn finish(&mut self) -> Vec<Sequence> {
        let keys: Vec<FlowKey> = self.sequencer.keys().cloned().collect();
        let mut completed = Vec::new();
        for key in &keys {
            let now_us = self.cursors.get(key).map_or(0, |c| c.last_seen_us);
            if let Err(err) = self.close(key, now_us, &mut completed) {
                debug!(key = ?key, %err, "stream dropped at close");
            }
        }
        completed
    }

    /// Expire stale messages and forget idle streams.
    pub(super) fn sweep(&mut self, now_us: i64) -> usize {
        let expired = self.sequencer.sweep(now_us);
        let sequencer = &self.sequencer;
        let idle_us = self.idle_us;
        self.cursors.retain(|key, cursor| {
            sequencer.get(key).is_some() || now_us - cursor.last_seen_us < idle_us
        });
        expired
    }

    /// Admit `fragment`; each completed message's leftover bytes seed the
    /// next one.
    fn admit(
        &mut self,
        key: &FlowKey,
        fragment: Fragment,
        now_us: i64,
        completed: &mut Vec<Sequence>,
    ) -> Result<(), ReassemblyError> {
        let mut queue = VecDeque::from([fragment]);
        while let Some(fragment) = queue.pop_front() {
            let anchor = self
                .cursors
                .get(key)
                .filter(|cursor| cursor.anchored)
                .map(|cursor| cursor.consumed);
            let admission = match anchor {
                Some(start) => self.sequencer.admit_at(key.clone(), fragment, start, now_us),
                None => self.sequencer.admit(key.clone(), fragment, now_us),
            };
            match admission {
                Ok(Admission::Complete(sequence)) => {
                    let boundary = self.delivered(key, &sequence);
                    queue.extend(sequence.remainder(boundary));
                    completed.push(sequence);
                }
                Ok(Admission::Skipped(sequence)) => {
                    let boundary = self.delivered(key, &sequence);
                    trace!(start = sequence.start(), boundary, "resynced at message head");
                    queue.extend(sequence.remainder(boundary));
                }
                Ok(Admission::Accumulating { .. }) => {}
                Err(err) => {
                    // Drop what cannot be framed so the stream can resync.
                    self.sequencer.remove(key);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// End of stream for `key`: flush what is buffered, message by
    /// message, feeding each one's leftover bytes back in.
    fn close(
        &mut self,
        key: &FlowKey,
        now_us: i64,
        completed: &mut Vec<Sequence>,
    ) -> Result<(), ReassemblyError> {
        loop {
            let (sequence, complete) = match self.sequencer.close(key) {
                Some(Admission::Complete(sequence)) => (sequence, true),
                Some(Admission::Skipped(sequence)) => (sequence, false),
                Some(Admission::Accumulating { .. }) | None => return Ok(()),
            };
            let boundary = self.delivered(key, &sequence);
            let rest = sequence.remainder(boundary);
            if complete {
                completed.push(sequence);
            }
            if rest.is_empty() {
                return Ok(());
            }
            for fragment in rest {
                self.admit(key, fragment, now_us, completed)?;
            }
        }
    }

    /// Record `sequence` as delivered; returns the offset it ended at.
    fn delivered(&mut self, key: &FlowKey, sequence: &Sequence) -> u64 {
        let boundary = sequence.boundary().unwrap_or_else(|| sequence.highest_end());
        if let Some(cursor) = self.cursors.get_mut(key) {
            cursor.consumed = cursor.consumed.max(boundary);
            cursor.anchored = true;
        }
        boundary
    }
}
