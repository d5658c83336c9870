//! Test primitives.
//!
//! Plain write/read/compare loops over a word range. Each returns the number
//! of mismatching reads and reports every mismatch on the sink; none of them
//! ever fails. Callers persist an operation tag before invoking one.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, ReadNorFlash};
use platform::{align_down, FlashArray, RawMemory, ReportSink, WORD_BYTES};

use crate::error::{FlashStage, FlashTestError};
use crate::pattern::{address_pattern, butterfly_pair_pattern, AddressPair};
use crate::report;
use crate::tag::TestKind;

/// Word range `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WordRange {
    /// First address, word-aligned.
    pub start: u32,
    /// Length in bytes.
    pub len: u32,
}

impl WordRange {
    /// Range starting at `start`, trimmed to whole words.
    #[must_use]
    pub const fn new(start: u32, len: u32) -> Self {
        Self {
            start: align_down(start),
            len: align_down(len),
        }
    }

    /// Word addresses spaced `step` bytes apart, ascending.
    pub fn addresses(self, step: u32) -> impl DoubleEndedIterator<Item = u32> {
        let step = align_down(step).max(WORD_BYTES);
        let count = self.len.div_ceil(step);
        (0..count).map(move |i| self.start.wrapping_add(i.wrapping_mul(step)))
    }
}

fn verify<M, S>(mem: &mut M, sink: &mut S, kind: TestKind, addr: u32, expected: u32) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    let read = mem.read_word(addr);
    if read == expected {
        0
    } else {
        report::mismatch(sink, kind, addr, read, expected);
        1
    }
}

/// Write `pattern(addr)` every `step` bytes, then read every word back.
pub fn run_pattern_test<M, S, P>(
    mem: &mut M,
    range: WordRange,
    step: u32,
    kind: TestKind,
    pattern: P,
    sink: &mut S,
) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
    P: Fn(u32) -> u32,
{
    for addr in range.addresses(step) {
        mem.write_word(addr, pattern(addr));
    }
    range.addresses(step).fold(0u32, |errors, addr| {
        errors.saturating_add(verify(mem, sink, kind, addr, pattern(addr)))
    })
}

/// Butterfly test: write `(v, !v)` to each pair, verify, swap, verify.
///
/// `pattern` maps the pair index to its value and complement.
pub fn run_pair_test<M, S, P>(mem: &mut M, pairs: &[AddressPair], pattern: P, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
    P: Fn(u32) -> (u32, u32),
{
    let mut errors = 0u32;
    for (i, &(a, b)) in (0u32..).zip(pairs) {
        let (v, c) = pattern(i);
        for (first, second) in [(v, c), (c, v)] {
            mem.write_word(a, first);
            mem.write_word(b, second);
            errors = errors
                .saturating_add(verify(mem, sink, TestKind::Butterfly, a, first))
                .saturating_add(verify(mem, sink, TestKind::Butterfly, b, second));
        }
    }
    errors
}

/// Address test: one word every `stride` bytes holds [`address_pattern`].
pub fn address_test<M, S>(mem: &mut M, range: WordRange, stride: u32, cycle: u32, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    run_pattern_test(
        mem,
        range,
        stride,
        TestKind::Address,
        |addr| address_pattern(addr, cycle),
        sink,
    )
}

/// Butterfly test over a prepared pair table.
pub fn butterfly_test<M, S>(mem: &mut M, pairs: &[AddressPair], cycle: u32, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    run_pair_test(mem, pairs, |i| butterfly_pair_pattern(i, cycle), sink)
}

/// One checkerboard polarity over every word of `range`.
pub fn checkerboard_test<M, S>(mem: &mut M, range: WordRange, background: u32, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    run_pattern_test(
        mem,
        range,
        WORD_BYTES,
        TestKind::Checkerboard,
        |addr| crate::pattern::checkerboard_pattern(addr, background),
        sink,
    )
}

/// Modified checkerboard over every word of `range`.
pub fn modified_checkerboard_test<M, S>(mem: &mut M, range: WordRange, cycle: u32, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    run_pattern_test(
        mem,
        range,
        WORD_BYTES,
        TestKind::ModifiedCheckerboard,
        |addr| crate::pattern::modified_checkerboard_pattern(addr, cycle),
        sink,
    )
}

/// March C-: `⇕(w0) ⇑(r0,w1) ⇑(r1,w0) ⇓(r0,w1) ⇓(r1,w0) ⇕(r0)` with
/// all-zero and all-one words.
///
/// Finds stuck-at, transition and most coupling faults between cells.
pub fn march_c_test<M, S>(mem: &mut M, range: WordRange, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    const ZERO: u32 = 0;
    const ONE: u32 = u32::MAX;
    let kind = TestKind::MarchC;
    let mut errors = 0u32;

    for addr in range.addresses(WORD_BYTES) {
        mem.write_word(addr, ZERO);
    }
    for (expect, write) in [(ZERO, ONE), (ONE, ZERO)] {
        for addr in range.addresses(WORD_BYTES) {
            errors = errors.saturating_add(verify(mem, sink, kind, addr, expect));
            mem.write_word(addr, write);
        }
    }
    for (expect, write) in [(ZERO, ONE), (ONE, ZERO)] {
        for addr in range.addresses(WORD_BYTES).rev() {
            errors = errors.saturating_add(verify(mem, sink, kind, addr, expect));
            mem.write_word(addr, write);
        }
    }
    for addr in range.addresses(WORD_BYTES) {
        errors = errors.saturating_add(verify(mem, sink, kind, addr, ZERO));
    }
    errors
}

/// Walk a single set bit (or, with `zeros`, a single clear bit) through
/// every position of every word.
pub fn walking_test<M, S>(mem: &mut M, range: WordRange, zeros: bool, sink: &mut S) -> u32
where
    M: RawMemory + ?Sized,
    S: ReportSink + ?Sized,
{
    let mut errors = 0u32;
    for addr in range.addresses(WORD_BYTES) {
        for bit in 0..u32::BITS {
            let one = 1u32.wrapping_shl(bit);
            let value = if zeros { !one } else { one };
            mem.write_word(addr, value);
            errors = errors.saturating_add(verify(mem, sink, TestKind::Walking, addr, value));
        }
    }
    errors
}

/// Mismatches found by one flash program/verify pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashOutcome {
    /// Words wrong on the first read after programming.
    pub before_cache_reset: u32,
    /// Words wrong after the cache was invalidated.
    pub after_cache_reset: u32,
}

impl FlashOutcome {
    /// Every mismatch of the pass.
    #[must_use]
    pub const fn errors(&self) -> u32 {
        self.before_cache_reset.saturating_add(self.after_cache_reset)
    }

    /// Mismatches that went away once the cache was reset.
    #[must_use]
    pub const fn cache_only(&self) -> bool {
        self.before_cache_reset > 0 && self.after_cache_reset == 0
    }
}

/// Erase the page at `page_offset`, program every word with `pattern` of its
/// bus address, read it back, invalidate the flash cache and read it again.
///
/// `page_offset` is relative to the start of the flash array and must be a
/// multiple of the erase size. A failed erase, program or read is returned
/// as an error; data mismatches are counted in the outcome and reported
/// under `kind`.
pub fn flash_pattern_test<F, S, P>(
    flash: &mut F,
    page_offset: u32,
    kind: TestKind,
    pattern: P,
    sink: &mut S,
) -> Result<FlashOutcome, FlashTestError>
where
    F: FlashArray,
    S: ReportSink + ?Sized,
    P: Fn(u32) -> u32,
{
    const CHUNK: u32 = 8;
    let page_len = u32::try_from(F::ERASE_SIZE).unwrap_or(u32::MAX);
    let page_end = page_offset.saturating_add(page_len);
    let bus = |offset: u32| F::BUS_BASE.wrapping_add(offset);
    let fail = |stage, offset: u32, error| FlashTestError {
        stage,
        address: bus(offset),
        kind: error,
    };
    let image = |offset: u32| chunk_bytes(bus(offset), &pattern);

    NorFlash::erase(flash, page_offset, page_end)
        .map_err(|e| fail(FlashStage::Erase, page_offset, e.kind()))?;

    let chunks = (page_offset..page_end).step_by(CHUNK as usize);
    for offset in chunks.clone() {
        NorFlash::write(flash, offset, &image(offset))
            .map_err(|e| fail(FlashStage::Program, offset, e.kind()))?;
    }

    let mut outcome = FlashOutcome::default();
    for pass in 0..2 {
        if pass == 1 {
            flash.reset_cache();
        }
        for offset in chunks.clone() {
            let mut read = [0u8; CHUNK as usize];
            ReadNorFlash::read(flash, offset, &mut read)
                .map_err(|e| fail(FlashStage::Read, offset, e.kind()))?;
            let expected = image(offset);
            let words = read.chunks_exact(4).zip(expected.chunks_exact(4));
            for (word, (got, want)) in (0u32..).zip(words) {
                if got == want {
                    continue;
                }
                let addr = bus(offset).wrapping_add(word.wrapping_mul(WORD_BYTES));
                report::mismatch(sink, kind, addr, le_word(got), le_word(want));
                let slot = if pass == 0 {
                    &mut outcome.before_cache_reset
                } else {
                    &mut outcome.after_cache_reset
                };
                *slot = slot.saturating_add(1);
            }
        }
    }
    Ok(outcome)
}

/// Flash program/cache pass: the complement of the address pattern, so
/// together with an address pass every cell is programmed both ways.
pub fn flash_program_test<F, S>(
    flash: &mut F,
    page_offset: u32,
    cycle: u32,
    sink: &mut S,
) -> Result<FlashOutcome, FlashTestError>
where
    F: FlashArray,
    S: ReportSink + ?Sized,
{
    flash_pattern_test(
        flash,
        page_offset,
        TestKind::FlashProgram,
        |addr| !address_pattern(addr, cycle),
        sink,
    )
}

/// Two pattern words for the double word at bus address `addr`.
fn chunk_bytes<P: Fn(u32) -> u32>(addr: u32, pattern: &P) -> [u8; 8] {
    let [a, b, c, d] = pattern(addr).to_le_bytes();
    let [e, f, g, h] = pattern(addr.wrapping_add(WORD_BYTES)).to_le_bytes();
    [a, b, c, d, e, f, g, h]
}

fn le_word(bytes: &[u8]) -> u32 {
    match bytes {
        [a, b, c, d] => u32::from_le_bytes([*a, *b, *c, *d]),
        _ => 0,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use crate::pattern::{CHECKERBOARD, CHECKERBOARD_INV};
    use platform::mocks::{LineRecorder, MockFlash, SimulatedMemory};

    const BASE: u32 = 0x2001_8000;

    fn mem() -> SimulatedMemory {
        SimulatedMemory::new().with_region(BASE, 0x1000)
    }

    fn range() -> WordRange {
        WordRange::new(BASE + 0x100, 0x200)
    }

    // ── Clean memory ────────────────────────────────────────────────────────

    #[test]
    fn clean_memory_passes_everything() {
        let mut m = mem();
        let mut rec = LineRecorder::new();
        assert_eq!(address_test(&mut m, range(), 16, 3, &mut rec), 0);
        assert_eq!(checkerboard_test(&mut m, range(), CHECKERBOARD, &mut rec), 0);
        assert_eq!(checkerboard_test(&mut m, range(), CHECKERBOARD_INV, &mut rec), 0);
        assert_eq!(march_c_test(&mut m, range(), &mut rec), 0);
        assert_eq!(walking_test(&mut m, range(), false, &mut rec), 0);
        assert_eq!(walking_test(&mut m, range(), true, &mut rec), 0);
        assert_eq!(modified_checkerboard_test(&mut m, range(), 3, &mut rec), 0);
        assert!(rec.lines().is_empty());
        assert_eq!(m.out_of_range(), 0);
    }

    #[test]
    fn writes_stay_inside_range() {
        let mut m = mem();
        let mut rec = LineRecorder::new();
        march_c_test(&mut m, range(), &mut rec);
        assert_eq!(m.write_bounds(), Some((BASE + 0x100, BASE + 0x2FC)));
    }

    #[test]
    fn address_test_honours_stride() {
        let mut m = mem();
        let mut rec = LineRecorder::new();
        address_test(&mut m, range(), 256, 1, &mut rec);
        assert_eq!(m.writes(), 2);
    }

    // ── Injected faults ─────────────────────────────────────────────────────

    #[test]
    fn stuck_bit_is_found_and_reported() {
        let mut m = mem();
        m.inject_stuck_bits(BASE + 0x104, 1 << 7, 0);
        let mut rec = LineRecorder::new();
        let first = checkerboard_test(&mut m, range(), CHECKERBOARD, &mut rec);
        let second = checkerboard_test(&mut m, range(), CHECKERBOARD_INV, &mut rec);
        // Exactly one polarity drives bit 7 high at that word.
        assert_eq!(first.saturating_add(second), 1);
        assert!(rec.contains("Checkerboard Error: addr=0x20018104"));
    }

    #[test]
    fn stuck_bit_is_found_by_march_and_walking() {
        let mut m = mem();
        m.inject_stuck_bits(BASE + 0x180, 1 << 31, 1 << 31);
        let mut rec = LineRecorder::new();
        assert!(march_c_test(&mut m, range(), &mut rec) > 0);
        assert!(walking_test(&mut m, range(), false, &mut rec) > 0);
    }

    #[test]
    fn alias_is_found_by_address_test() {
        let mut m = mem();
        m.inject_alias(BASE + 0x200, BASE + 0x100);
        let mut rec = LineRecorder::new();
        assert!(address_test(&mut m, range(), 4, 9, &mut rec) > 0);
        assert!(rec.contains("Address Error"));
    }

    #[test]
    fn butterfly_round_trip_and_swap() {
        let mut m = mem();
        let mut rec = LineRecorder::new();
        let pairs = [(BASE + 0x100, BASE + 0x180), (BASE + 0x104, BASE + 0x108)];
        assert_eq!(butterfly_test(&mut m, &pairs, 5, &mut rec), 0);
        // After the swap the second address holds the value.
        let (v, c) = butterfly_pair_pattern(0, 5);
        assert_eq!(m.peek(BASE + 0x100), Some(c));
        assert_eq!(m.peek(BASE + 0x180), Some(v));
    }

    #[test]
    fn butterfly_detects_aliased_pair() {
        let mut m = mem();
        m.inject_alias(BASE + 0x180, BASE + 0x100);
        let mut rec = LineRecorder::new();
        let pairs = [(BASE + 0x100, BASE + 0x180)];
        // Writes to both land on one cell, so the first read of each order fails.
        assert_eq!(butterfly_test(&mut m, &pairs, 5, &mut rec), 2);
        assert_eq!(rec.count_containing("Butterfly Error"), 2);
    }

    #[test]
    fn empty_range_touches_nothing() {
        let mut m = mem();
        let mut rec = LineRecorder::new();
        let r = WordRange::new(BASE, 0);
        assert_eq!(march_c_test(&mut m, r, &mut rec), 0);
        assert_eq!(m.writes(), 0);
    }

    // ── Flash ───────────────────────────────────────────────────────────────

    #[test]
    fn flash_pass_is_clean_on_good_flash() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        let mut rec = LineRecorder::new();
        let out = flash_program_test(&mut f, 2048, 4, &mut rec).unwrap();
        assert_eq!(out, FlashOutcome::default());
        assert_eq!(f.erases(), 1);
        assert_eq!(f.cache_resets(), 1);
    }

    #[test]
    fn flash_erase_failure_is_a_transaction_error() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        f.fail_erase(true);
        let mut rec = LineRecorder::new();
        let err = flash_program_test(&mut f, 2048, 4, &mut rec).unwrap_err();
        assert_eq!(err.stage, FlashStage::Erase);
        assert_eq!(err.address, MockFlash::BASE + 2048);
    }

    #[test]
    fn flash_bit_flip_survives_cache_reset() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        f.inject_bit_flip(2048 + 13, 0x10);
        let mut rec = LineRecorder::new();
        let out = flash_program_test(&mut f, 2048, 4, &mut rec).unwrap();
        assert_eq!(out.before_cache_reset, 1);
        assert_eq!(out.after_cache_reset, 1);
        assert!(!out.cache_only());
        assert!(rec.contains("Flash Error: addr=0x0800080C"));
    }

    #[test]
    fn flash_program_writes_the_address_complement() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        let mut rec = LineRecorder::new();
        flash_program_test(&mut f, 2048, 4, &mut rec).unwrap();
        let mut word = [0u8; 4];
        f.read(2048, &mut word).unwrap();
        assert_eq!(u32::from_le_bytes(word), !address_pattern(MockFlash::BASE + 2048, 4));
    }

    #[test]
    fn checkerboard_over_flash_reports_under_its_own_kind() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        f.inject_bit_flip(4096 + 4, 0x01);
        let mut rec = LineRecorder::new();
        let out = flash_pattern_test(
            &mut f,
            4096,
            TestKind::Checkerboard,
            |addr| crate::pattern::checkerboard_pattern(addr, CHECKERBOARD),
            &mut rec,
        )
        .unwrap();
        assert_eq!(out.after_cache_reset, 1);
        assert!(rec.contains("Checkerboard Error: addr=0x08001004"));
    }

    #[test]
    fn stale_cache_is_only_seen_before_reset() {
        let mut f = MockFlash::new(8 * MockFlash::PAGE);
        f.set_stale_cache(true);
        let mut rec = LineRecorder::new();
        let out = flash_program_test(&mut f, 0, 4, &mut rec).unwrap();
        assert!(out.before_cache_reset > 0);
        assert_eq!(out.after_cache_reset, 0);
        assert!(out.cache_only());
    }
}
