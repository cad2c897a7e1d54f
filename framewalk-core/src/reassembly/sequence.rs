//! Accumulating state for one logical unit.

use crate::flow::FlowKey;
use crate::protocol::ProtocolId;

use super::Fragment;

/// Lifecycle of a [`Sequence`].
///
/// `Complete`, `Skipped` and `TimedOut` are final: a sequence in any of
/// them has already been removed from its sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Start,
    Accumulating,
    Complete,
    /// Its leading bytes were found not to begin a unit and were dropped.
    Skipped,
    TimedOut,
}

/// Where a sequence's start offset comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceOrigin {
    /// Units always begin at offset 0 (datagram fragments).
    #[default]
    Zero,
    /// Units begin at the lowest offset admitted so far (stream segments).
    Lowest,
}

#[derive(Debug, Clone)]
struct Slot {
    fragment: Fragment,
    admission: u64,
}

/// Fragments of one unit, ordered by offset, plus what is known about the
/// unit's length.
#[derive(Debug, Clone)]
pub struct Sequence {
    key: FlowKey,
    state: SequenceState,
    origin: SequenceOrigin,
    start: u64,
    /// `start` was fixed by the caller and no longer follows admissions.
    anchored: bool,
    slots: Vec<Slot>,
    admissions: u64,
    /// Length relative to `start`, declared by a boundary detector or caller.
    expected_len: Option<u64>,
    /// End offset given by a fragment flagged `last`.
    final_end: Option<u64>,
    /// Contiguous length the boundary detector last looked at.
    detected: u64,
    created_us: i64,
    deadline_us: i64,
}

impl Sequence {
    pub(crate) fn new(key: FlowKey, origin: SequenceOrigin, now_us: i64, deadline_us: i64) -> Self {
        Self {
            key,
            state: SequenceState::Start,
            origin,
            start: 0,
            anchored: false,
            slots: Vec::new(),
            admissions: 0,
            expected_len: None,
            final_end: None,
            detected: 0,
            created_us: now_us,
            deadline_us,
        }
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Offset of the unit's first byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn created_us(&self) -> i64 {
        self.created_us
    }

    pub fn deadline_us(&self) -> i64 {
        self.deadline_us
    }

    pub fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Fragments ordered by offset; equal offsets in admission order.
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> + '_ {
        self.slots.iter().map(|s| &s.fragment)
    }

    pub fn fragment_count(&self) -> usize {
        self.slots.len()
    }

    /// Entry protocol recorded by the lowest fragment that carries one.
    pub fn entry(&self) -> Option<ProtocolId> {
        self.fragments().find_map(|f| f.entry)
    }

    /// Unit length, if declared or fixed by a `last` fragment.
    pub fn total_len(&self) -> Option<u64> {
        self.expected_len
            .or_else(|| self.final_end.map(|end| end.saturating_sub(self.start)))
    }

    /// Highest end offset seen.
    pub fn highest_end(&self) -> u64 {
        self.slots
            .iter()
            .map(|s| s.fragment.end())
            .max()
            .unwrap_or(self.start)
    }

    /// End of the gap-free run beginning at `start`.
    pub fn contiguous_end(&self) -> u64 {
        let mut end = self.start;
        for slot in &self.slots {
            if slot.fragment.seq_offset > end {
                break;
            }
            end = end.max(slot.fragment.end());
        }
        end
    }

    /// Number of holes in `[start, limit)`.
    pub fn gaps(&self, limit: u64) -> usize {
        let mut gaps = 0;
        let mut end = self.start;
        for slot in &self.slots {
            if end >= limit {
                break;
            }
            if slot.fragment.seq_offset > end {
                gaps += 1;
            }
            end = end.max(slot.fragment.end());
        }
        if end < limit {
            gaps += 1;
        }
        gaps
    }

    /// Bytes of `[start, limit)` covered by at least one fragment.
    pub fn covered(&self, limit: u64) -> u64 {
        let mut covered = 0;
        let mut end = self.start;
        for slot in &self.slots {
            let lo = slot.fragment.seq_offset.max(end);
            let hi = slot.fragment.end().min(limit);
            if hi > lo {
                covered += hi - lo;
            }
            end = end.max(slot.fragment.end());
        }
        covered
    }

    /// Whether the unit's length is known and every byte of it is present.
    pub fn is_ready(&self) -> bool {
        match self.total_len() {
            Some(total) => self.contiguous_end() >= self.start + total,
            None => false,
        }
    }

    /// Copy the unit's bytes into `dst`, which starts at `start`.
    ///
    /// Fragments are applied in admission order so overlapping bytes take
    /// the value of the fragment admitted last. Bytes past `dst` are
    /// ignored.
    pub fn copy_into(&self, dst: &mut [u8]) {
        let limit = self.start + dst.len() as u64;
        let mut order: Vec<&Slot> = self.slots.iter().collect();
        order.sort_by_key(|s| s.admission);

        for slot in order {
            let f = &slot.fragment;
            let lo = f.seq_offset.max(self.start);
            let hi = f.end().min(limit);
            if hi <= lo {
                continue;
            }
            let src = (lo - f.seq_offset) as usize..(hi - f.seq_offset) as usize;
            let at = (lo - self.start) as usize..(hi - self.start) as usize;
            dst[at].copy_from_slice(&f.payload[src]);
        }
    }

    /// Fragment views of every byte at or past `boundary`, in admission
    /// order. Used to seed the next unit of a stream.
    pub fn remainder(&self, boundary: u64) -> Vec<Fragment> {
        let mut order: Vec<&Slot> = self.slots.iter().collect();
        order.sort_by_key(|s| s.admission);
        order
            .into_iter()
            .filter_map(|s| s.fragment.tail_from(boundary))
            .collect()
    }

    /// Insert `fragment`, returning the frame numbers of fragments it
    /// overlaps.
    pub(crate) fn insert(&mut self, fragment: Fragment) -> Vec<u64> {
        let overlapped: Vec<u64> = self
            .slots
            .iter()
            .filter(|s| s.fragment.overlaps(&fragment))
            .map(|s| s.fragment.frame_number)
            .collect();

        if self.origin == SequenceOrigin::Lowest
            && !self.anchored
            && (self.slots.is_empty() || fragment.seq_offset < self.start)
        {
            // A new start invalidates any length measured from the old one.
            if !self.slots.is_empty() {
                self.expected_len = None;
                self.detected = 0;
            }
            self.start = fragment.seq_offset;
        }
        if fragment.last {
            self.final_end = Some(fragment.end());
        }

        let at = self
            .slots
            .partition_point(|s| s.fragment.seq_offset <= fragment.seq_offset);
        self.slots.insert(
            at,
            Slot {
                fragment,
                admission: self.admissions,
            },
        );
        self.admissions += 1;
        self.state = SequenceState::Accumulating;
        overlapped
    }

    /// Pin the unit's first byte at `start`; fragments below it are
    /// ignored when copying.
    pub(crate) fn anchor(&mut self, start: u64) {
        self.start = start;
        self.anchored = true;
    }

    pub(crate) fn detected(&self) -> u64 {
        self.detected
    }

    pub(crate) fn set_detected(&mut self, len: u64) {
        self.detected = len;
    }

    pub(crate) fn set_expected_len(&mut self, len: u64) {
        self.expected_len = Some(len);
    }

    pub(crate) fn set_state(&mut self, state: SequenceState) {
        self.state = state;
    }

    pub(crate) fn set_deadline(&mut self, deadline_us: i64) {
        self.deadline_us = deadline_us;
    }

    /// Offset the next unit would start at if this one were cut at its
    /// known length.
    pub(crate) fn boundary(&self) -> Option<u64> {
        self.total_len().map(|total| self.start + total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(origin: SequenceOrigin) -> Sequence {
        Sequence::new(FlowKey::new().with_single(&[1]), origin, 0, 100)
    }

    fn frag(offset: u64, fill: u8, len: usize) -> Fragment {
        Fragment::new(offset, vec![fill; len])
    }

    #[test]
    fn test_sorted_insert_and_contiguity() {
        let mut s = seq(SequenceOrigin::Zero);
        assert_eq!(s.state(), SequenceState::Start);

        s.insert(frag(20, 3, 10));
        s.insert(frag(0, 1, 10));
        assert_eq!(s.state(), SequenceState::Accumulating);
        assert_eq!(s.contiguous_end(), 10);
        assert_eq!(s.gaps(30), 1);
        assert_eq!(s.covered(30), 20);

        s.insert(frag(10, 2, 10));
        let offsets: Vec<u64> = s.fragments().map(|f| f.seq_offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
        assert_eq!(s.contiguous_end(), 30);
        assert_eq!(s.gaps(30), 0);
    }

    #[test]
    fn test_ready_needs_length() {
        let mut s = seq(SequenceOrigin::Zero);
        s.insert(frag(0, 1, 10));
        assert!(!s.is_ready());

        s.insert(frag(10, 2, 5).with_last(true));
        assert_eq!(s.total_len(), Some(15));
        assert!(s.is_ready());
    }

    #[test]
    fn test_expected_len_beats_last_flag() {
        let mut s = seq(SequenceOrigin::Zero);
        s.insert(frag(0, 1, 10).with_last(true));
        s.set_expected_len(20);
        assert_eq!(s.total_len(), Some(20));
        assert!(!s.is_ready());
    }

    #[test]
    fn test_overlap_reports_frames() {
        let mut s = seq(SequenceOrigin::Zero);
        s.insert(frag(0, 1, 10).with_frame(1, 0));
        let hit = s.insert(frag(5, 2, 10).with_frame(2, 0));
        assert_eq!(hit, vec![1]);
        assert!(s.insert(frag(15, 3, 1).with_frame(3, 0)).is_empty());
    }

    #[test]
    fn test_copy_last_admitted_wins() {
        let mut s = seq(SequenceOrigin::Zero);
        s.insert(frag(5, b'Y', 10));
        s.insert(frag(0, b'X', 10));

        let mut out = [0u8; 15];
        s.copy_into(&mut out);
        // X was admitted after Y, so it owns [5, 10)
        assert_eq!(&out[..10], b"XXXXXXXXXX");
        assert_eq!(&out[10..], b"YYYYY");
    }

    #[test]
    fn test_lowest_origin_moves_start() {
        let mut s = seq(SequenceOrigin::Lowest);
        s.insert(frag(100, 1, 10));
        assert_eq!(s.start(), 100);
        s.set_expected_len(10);

        s.insert(frag(90, 2, 10));
        assert_eq!(s.start(), 90);
        assert_eq!(s.expected_len(), None);
        assert_eq!(s.contiguous_end(), 110);
    }

    #[test]
    fn test_anchored_start_waits_for_head() {
        let mut s = seq(SequenceOrigin::Lowest);
        s.anchor(0);
        s.insert(frag(30, 1, 10));
        assert!(s.is_anchored());
        assert_eq!(s.start(), 0);
        assert_eq!(s.contiguous_end(), 0);

        s.insert(frag(0, 2, 30));
        assert_eq!(s.contiguous_end(), 40);
    }

    #[test]
    fn test_remainder_slices_across_boundary() {
        let mut s = seq(SequenceOrigin::Zero);
        s.insert(Fragment::new(0, &b"abcdef"[..]).with_frame(1, 0));
        s.insert(Fragment::new(6, &b"ghij"[..]).with_frame(2, 0));

        let rest = s.remainder(4);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].seq_offset, 4);
        assert_eq!(&rest[0].payload[..], b"ef");
        assert_eq!(rest[1].seq_offset, 6);
        assert_eq!(&rest[1].payload[..], b"ghij");

        assert!(s.remainder(10).is_empty());
    }
}
