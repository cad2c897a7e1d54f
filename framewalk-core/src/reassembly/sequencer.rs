//! Per-flow sequencing state machine.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::ReassemblyError;
use crate::flow::FlowKey;

use super::{
    BoundaryDetector, Decision, Fragment, Sequence, SequenceEvent, SequenceListener,
    SequenceOrigin, SequenceState,
};

/// Default sequence timeout: 60 seconds.
pub const DEFAULT_SEQUENCE_TIMEOUT_US: i64 = 60_000_000;

/// Default bound on a sequence's span: 16 MiB.
pub const DEFAULT_MAX_SEQUENCE_LEN: u64 = 16 * 1024 * 1024;

/// Contiguous bytes up to which the detector runs after every admission.
/// Past it, an undetermined unit is rescanned only once it has doubled.
const DETECT_WINDOW: u64 = 64 * 1024;

/// When a sequence's deadline is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlinePolicy {
    /// Creation time plus timeout; admissions do not extend it.
    #[default]
    FixedFromCreation,
    /// Last admission time plus timeout.
    RenewOnAdmit,
}

/// Configuration for a [`Sequencer`].
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Sequence timeout (microseconds).
    pub timeout_us: i64,
    pub deadline: DeadlinePolicy,
    pub origin: SequenceOrigin,
    /// Maximum distance between a sequence's start and any fragment's end.
    pub max_sequence_len: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            timeout_us: DEFAULT_SEQUENCE_TIMEOUT_US,
            deadline: DeadlinePolicy::default(),
            origin: SequenceOrigin::default(),
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
        }
    }
}

/// Counters kept by a [`Sequencer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub created: u64,
    pub admitted: u64,
    pub overlaps: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub skipped: u64,
    pub discarded: u64,
}

/// Result of feeding the sequencer.
#[derive(Debug)]
pub enum Admission {
    /// The sequence is still waiting for bytes.
    Accumulating { fragments: usize },
    /// The sequence finished and left the active table.
    Complete(Sequence),
    /// The detector found the sequence's leading bytes cannot begin a
    /// unit. It left the active table with `total_len()` covering the
    /// dropped bytes; anything past them is in `remainder`.
    Skipped(Sequence),
}

impl Admission {
    pub fn is_complete(&self) -> bool {
        matches!(self, Admission::Complete(_))
    }

    pub fn into_complete(self) -> Option<Sequence> {
        match self {
            Admission::Complete(sequence) => Some(sequence),
            Admission::Accumulating { .. } | Admission::Skipped(_) => None,
        }
    }
}

/// Table of active sequences keyed by flow.
///
/// Single writer: every mutating operation takes `&mut self`, so two
/// admissions for one flow never interleave. Time is supplied by the
/// caller (capture timestamps), never read from the system clock.
pub struct Sequencer {
    config: SequencerConfig,
    active: HashMap<FlowKey, Sequence>,
    detector: Option<Box<dyn BoundaryDetector>>,
    listeners: Vec<Box<dyn SequenceListener>>,
    scratch: Vec<u8>,
    stats: SequencerStats,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
            detector: None,
            listeners: Vec::new(),
            scratch: Vec::new(),
            stats: SequencerStats::default(),
        }
    }

    /// Run `detector` after every admission.
    pub fn with_detector<D: BoundaryDetector + 'static>(mut self, detector: D) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn add_listener<L: SequenceListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn stats(&self) -> SequencerStats {
        self.stats
    }

    pub fn get(&self, key: &FlowKey) -> Option<&Sequence> {
        self.active.get(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FlowKey> + '_ {
        self.active.keys()
    }

    /// Add `fragment` to the sequence for `key`, creating it if needed.
    ///
    /// Returns the finished sequence once its length is known and every
    /// byte is present.
    pub fn admit(
        &mut self,
        key: FlowKey,
        fragment: Fragment,
        now_us: i64,
    ) -> Result<Admission, ReassemblyError> {
        self.admit_from(key, fragment, None, now_us)
    }

    /// Like [`admit`](Self::admit), but a sequence created by this call
    /// begins at `start` rather than at the lowest offset admitted.
    ///
    /// Used when the caller knows where the unit begins, so bytes that
    /// arrive ahead of its head are held instead of framed.
    pub fn admit_at(
        &mut self,
        key: FlowKey,
        fragment: Fragment,
        start: u64,
        now_us: i64,
    ) -> Result<Admission, ReassemblyError> {
        self.admit_from(key, fragment, Some(start), now_us)
    }

    fn admit_from(
        &mut self,
        key: FlowKey,
        fragment: Fragment,
        anchor: Option<u64>,
        now_us: i64,
    ) -> Result<Admission, ReassemblyError> {
        let limit = self.config.max_sequence_len;
        let existing = self.active.get(&key);
        let start = match (existing, anchor, self.config.origin) {
            (Some(seq), _, SequenceOrigin::Lowest) if !seq.is_anchored() => {
                seq.start().min(fragment.seq_offset)
            }
            (Some(seq), _, _) => seq.start(),
            (None, Some(anchor), _) => anchor,
            (None, None, SequenceOrigin::Lowest) => fragment.seq_offset,
            (None, None, SequenceOrigin::Zero) => 0,
        };
        let highest = existing.map_or(0, |seq| seq.highest_end()).max(fragment.end());
        if highest.saturating_sub(start) > limit {
            return Err(ReassemblyError::FragmentOutOfRange {
                offset: fragment.seq_offset,
                len: fragment.len(),
                limit,
            });
        }

        let sequence = match self.active.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let deadline = now_us.saturating_add(self.config.timeout_us);
                let mut sequence =
                    Sequence::new(entry.key().clone(), self.config.origin, now_us, deadline);
                if let Some(anchor) = anchor {
                    sequence.anchor(anchor);
                }
                self.stats.created += 1;
                debug!(key = ?sequence.key(), start, "sequence started");
                notify(&mut self.listeners, || SequenceEvent::SequenceStart {
                    key: sequence.key().clone(),
                    start,
                    timestamp_us: now_us,
                });
                entry.insert(sequence)
            }
        };

        let (frame_number, seq_offset, seq_len) =
            (fragment.frame_number, fragment.seq_offset, fragment.len());
        let overlapped = sequence.insert(fragment);
        self.stats.admitted += 1;

        for overlapped_frame in overlapped {
            self.stats.overlaps += 1;
            trace!(frame_number, overlapped_frame, seq_offset, "fragment overlap");
            notify(&mut self.listeners, || SequenceEvent::FragmentOverlap {
                key: sequence.key().clone(),
                frame_number,
                overlapped_frame,
                seq_offset,
                seq_len,
            });
        }
        notify(&mut self.listeners, || SequenceEvent::NewPacket {
            key: sequence.key().clone(),
            frame_number,
            seq_offset,
            seq_len,
        });

        if self.config.deadline == DeadlinePolicy::RenewOnAdmit {
            sequence.set_deadline(now_us.saturating_add(self.config.timeout_us));
        }

        let skipped = match self.detector.as_deref() {
            Some(detector) => apply_detector(detector, sequence, &mut self.scratch, limit, false),
            None => None,
        };

        let ready = sequence.is_ready();
        let fragments = sequence.fragment_count();
        if let Some(len) = skipped {
            let key = sequence.key().clone();
            return Ok(self
                .skip(&key, len)
                .map_or(Admission::Accumulating { fragments }, Admission::Skipped));
        }
        if ready {
            let key = sequence.key().clone();
            return Ok(self
                .finish(&key)
                .map_or(Admission::Accumulating { fragments }, Admission::Complete));
        }
        Ok(Admission::Accumulating { fragments })
    }

    /// Declare how many bytes the unit for `key` will contain.
    ///
    /// Returns `None` if no sequence is active for `key`.
    pub fn set_expected_length(&mut self, key: &FlowKey, len: u64) -> Option<Admission> {
        let sequence = self.active.get_mut(key)?;
        sequence.set_expected_len(len);
        Some(self.settle(key))
    }

    /// End-of-stream: no byte beyond those already seen will arrive.
    ///
    /// The detector gets a last look first. A sequence still without a
    /// declared length then takes the highest byte seen as its end. It
    /// completes if gap-free; otherwise it stays until swept.
    pub fn close(&mut self, key: &FlowKey) -> Option<Admission> {
        let limit = self.config.max_sequence_len;
        let sequence = self.active.get_mut(key)?;
        if let Some(detector) = self.detector.as_deref() {
            if let Some(len) = apply_detector(detector, sequence, &mut self.scratch, limit, true) {
                return self.skip(key, len).map(Admission::Skipped);
            }
        }
        if sequence.total_len().is_none() {
            let len = sequence.highest_end() - sequence.start();
            sequence.set_expected_len(len);
        }
        Some(self.settle(key))
    }

    /// Close every active sequence, returning those that completed.
    pub fn close_all(&mut self) -> Vec<Sequence> {
        let keys: Vec<FlowKey> = self.active.keys().cloned().collect();
        keys.iter()
            .filter_map(|key| self.close(key))
            .filter_map(Admission::into_complete)
            .collect()
    }

    /// Drop the sequence for `key` without a result or event.
    pub fn remove(&mut self, key: &FlowKey) -> Option<Sequence> {
        let sequence = self.active.remove(key)?;
        self.stats.discarded += 1;
        trace!(key = ?sequence.key(), "sequence discarded");
        Some(sequence)
    }

    /// Expire every sequence whose deadline is at or before `now_us`.
    ///
    /// Returns the number expired; a second sweep at the same time
    /// expires nothing.
    pub fn sweep(&mut self, now_us: i64) -> usize {
        let expired: Vec<FlowKey> = self
            .active
            .iter()
            .filter(|(_, seq)| seq.deadline_us() <= now_us)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            let Some(mut sequence) = self.active.remove(key) else {
                continue;
            };
            sequence.set_state(SequenceState::TimedOut);
            self.stats.timed_out += 1;
            let covered = sequence.covered(sequence.highest_end());
            debug!(key = ?key, fragments = sequence.fragment_count(), covered, "sequence timed out");
            notify(&mut self.listeners, || SequenceEvent::SequenceTimeout {
                key: key.clone(),
                fragments: sequence.fragment_count(),
                covered,
            });
        }
        expired.len()
    }

    /// Complete the sequence for `key` if it is ready.
    fn settle(&mut self, key: &FlowKey) -> Admission {
        match self.active.get(key) {
            Some(seq) if seq.is_ready() => self
                .finish(key)
                .map_or(Admission::Accumulating { fragments: 0 }, Admission::Complete),
            Some(seq) => Admission::Accumulating {
                fragments: seq.fragment_count(),
            },
            None => Admission::Accumulating { fragments: 0 },
        }
    }

    fn skip(&mut self, key: &FlowKey, len: u64) -> Option<Sequence> {
        let mut sequence = self.active.remove(key)?;
        let start = sequence.start();
        sequence.set_expected_len(len);
        sequence.set_state(SequenceState::Skipped);
        self.stats.skipped += 1;
        debug!(key = ?key, start, len, "leading bytes skipped");
        notify(&mut self.listeners, || SequenceEvent::BytesSkipped {
            key: key.clone(),
            start,
            len,
        });
        Some(sequence)
    }

    fn finish(&mut self, key: &FlowKey) -> Option<Sequence> {
        let mut sequence = self.active.remove(key)?;
        sequence.set_state(SequenceState::Complete);
        self.stats.completed += 1;
        let total_len = sequence.total_len().unwrap_or(0);
        debug!(key = ?key, total_len, fragments = sequence.fragment_count(), "sequence complete");
        notify(&mut self.listeners, || SequenceEvent::SequenceComplete {
            key: key.clone(),
            total_len,
            fragments: sequence.fragment_count(),
        });
        Some(sequence)
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("detector", &self.detector.is_some())
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Build the event only when someone is listening.
fn notify<F>(listeners: &mut [Box<dyn SequenceListener>], event: F)
where
    F: FnOnce() -> SequenceEvent,
{
    if listeners.is_empty() {
        return;
    }
    let event = event();
    for listener in listeners.iter_mut() {
        listener.on_event(&event);
    }
}

/// Let the detector refine the sequence's expected length.
///
/// Returns the number of leading bytes to drop when the detector finds
/// the sequence does not begin at a unit's head. `force` rescans even a
/// large run that has not doubled since the last look.
fn apply_detector(
    detector: &dyn BoundaryDetector,
    sequence: &mut Sequence,
    scratch: &mut Vec<u8>,
    limit: u64,
    force: bool,
) -> Option<u64> {
    if sequence.expected_len().is_some() {
        return None;
    }
    let available = sequence.contiguous_end().saturating_sub(sequence.start());
    if available == 0 || available == sequence.detected() {
        return None;
    }
    if !force && available > DETECT_WINDOW && available < sequence.detected().saturating_mul(2) {
        return None;
    }
    sequence.set_detected(available);

    let available = usize::try_from(available).ok()?;
    scratch.clear();
    scratch.resize(available, 0);
    sequence.copy_into(scratch);

    match detector.decide(scratch, sequence) {
        Decision::CompleteNow(len) if len > 0 => sequence.set_expected_len(len as u64),
        Decision::NeedMoreBytes(more) => {
            match available.checked_add(more).map(|total| total as u64) {
                Some(total) if total <= limit => sequence.set_expected_len(total),
                _ => trace!(available, more, limit, "declared length past sequence limit"),
            }
        }
        Decision::Skip(len) if len > 0 => return Some(len.min(available) as u64),
        Decision::CompleteNow(_) | Decision::Skip(_) | Decision::Indeterminate => {}
    }
    None
}
