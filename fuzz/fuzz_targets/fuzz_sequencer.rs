//! Fuzz target for the sequencer and assembler.
//!
//! Input bytes are decoded into a stream of operations (admit, declare
//! length, close, sweep) over a handful of keys. Checks that no operation
//! panics and that every completed sequence either assembles to exactly its
//! total length or is refused as incomplete.

#![no_main]

use libfuzzer_sys::fuzz_target;
use framewalk_core::{
    Admission, Assembler, Error, FlowKey, Fragment, ReassemblyError, Sequence, SequenceOrigin,
    Sequencer, SequencerConfig,
};

fn check(assembler: &mut Assembler, sequence: &Sequence) {
    match assembler.assemble(sequence) {
        Ok(result) => assert_eq!(Some(result.len() as u64), sequence.total_len()),
        Err(Error::Reassembly(ReassemblyError::IncompleteSequence { .. })) => {}
        Err(err) => panic!("unexpected assembly error: {err}"),
    }
}

fuzz_target!(|data: &[u8]| {
    let origin = match data.first() {
        Some(b) if b & 1 == 1 => SequenceOrigin::Lowest,
        _ => SequenceOrigin::Zero,
    };
    let mut sequencer = Sequencer::new(SequencerConfig {
        origin,
        timeout_us: 1_000,
        max_sequence_len: 4096,
        ..Default::default()
    });
    let mut assembler = Assembler::default();
    let mut now = 0i64;

    for op in data.get(1..).unwrap_or_default().chunks(4) {
        let [kind, k, a, b] = match op {
            [kind, k, a, b] => [*kind, *k, *a, *b],
            _ => break,
        };
        let key = FlowKey::new().with_single(&[k & 3]);
        now += (kind >> 4) as i64 * 100;

        match kind & 3 {
            0 => {
                let offset = a as u64 * 8;
                let fragment = Fragment::new(offset, vec![k; b as usize % 64])
                    .with_last(kind & 4 != 0);
                if let Ok(Admission::Complete(seq)) = sequencer.admit(key, fragment, now) {
                    check(&mut assembler, &seq);
                }
            }
            1 => {
                if let Some(Admission::Complete(seq)) =
                    sequencer.set_expected_length(&key, u16::from_be_bytes([a, b]) as u64 % 4096)
                {
                    check(&mut assembler, &seq);
                }
            }
            2 => {
                if let Some(Admission::Complete(seq)) = sequencer.close(&key) {
                    check(&mut assembler, &seq);
                }
            }
            _ => {
                sequencer.sweep(now);
                assembler.arena_mut().collect();
            }
        }
    }
});
