//! Per-bank test window planning.
//!
//! Each bank gets a [`WindowPlanner`] that owns the window under test and
//! moves it every cycle. With a stride that does not divide the usable span
//! the offset walks through `span / gcd(stride, span)` distinct positions
//! before repeating, so a small per-cycle budget still covers the whole bank
//! over the device's lifetime.
//!
//! ```text
//! bank.base                                               bank.base + size
//! ├── margin ──┼──────────── usable ─────────────────────┼── margin ──┤
//!              ├─ offset ─▶┌── window.size ──┐
//!              │◀────────────── span ─────────────▶│
//! ```
//!
//! Inconsistent configurations are clamped, never trapped: a tier larger
//! than the bank shrinks to fit and a bank too small for any window gets a
//! zero-sized window that the scheduler skips.

use platform::{align_down, align_up, WORD_BYTES};

use crate::config::{BankCoverage, Rotation};

/// What kind of memory a bank is. Decides which tests can run on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BankKind {
    /// Bus-writable RAM.
    Ram,
    /// Flash, written only through the flash controller.
    Flash,
}

/// A named contiguous memory region. Immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryBank {
    /// Identity, also encoded into operation tags.
    pub id: u8,
    /// Report name.
    pub name: &'static str,
    /// Absolute base address.
    pub base: u32,
    /// Total size in bytes.
    pub size: u32,
    /// Bytes at the bottom and at the top never tested.
    pub safety_margin: u32,
    /// RAM or flash.
    pub kind: BankKind,
}

impl MemoryBank {
    /// Largest window that fits between the two margins.
    ///
    /// One word is held back so the offset span is never empty.
    #[must_use]
    pub const fn max_window(&self) -> u32 {
        align_down(
            self.size
                .saturating_sub(self.safety_margin.saturating_mul(2))
                .saturating_sub(WORD_BYTES),
        )
    }
}

/// The sub-range of a bank tested this cycle.
///
/// Invariant: `offset >= bank.safety_margin` and
/// `offset + size + bank.safety_margin <= bank.size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestWindow {
    /// Bank the window lives in.
    pub bank: MemoryBank,
    /// Bank-relative start.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl TestWindow {
    /// Absolute start address.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.bank.base.wrapping_add(self.offset)
    }

    /// Absolute address one past the end.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start().wrapping_add(self.size)
    }

    /// Bank-relative offset one past the end.
    #[must_use]
    pub const fn end_offset(&self) -> u32 {
        self.offset.wrapping_add(self.size)
    }

    /// `true` when the bank was too small to hold a window.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Bank-relative offset of whole page `step` of the window, wrapping
    /// over the pages the window holds.
    ///
    /// A window holding no whole page yields the page containing its start.
    #[must_use]
    pub fn page(&self, page_len: u32, step: u32) -> u32 {
        let page_len = page_len.max(1);
        let first = self.offset.div_ceil(page_len).saturating_mul(page_len);
        let pages = self
            .end_offset()
            .saturating_sub(first)
            .checked_div(page_len)
            .unwrap_or(0);
        match step.checked_rem(pages) {
            Some(index) => first.saturating_add(index.saturating_mul(page_len)),
            None => self
                .offset
                .saturating_sub(self.offset.checked_rem(page_len).unwrap_or(0)),
        }
    }

    /// Leading `1/divisor` of the window, word-aligned.
    #[must_use]
    pub fn fraction(&self, divisor: u32) -> Self {
        Self {
            size: align_down(self.size.checked_div(divisor).unwrap_or(0)),
            ..*self
        }
    }
}

/// Discrete window size, rotated round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SizeTier {
    /// First tier.
    Small,
    /// Second tier.
    Medium,
    /// Third tier.
    Large,
}

impl SizeTier {
    /// Next tier, wrapping from `Large` to `Small`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Small => Self::Medium,
            Self::Medium => Self::Large,
            Self::Large => Self::Small,
        }
    }

    /// Index into [`BankCoverage::tiers`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Small => 0,
            Self::Medium => 1,
            Self::Large => 2,
        }
    }
}

/// Owns one bank's window and moves it each cycle.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    bank: MemoryBank,
    coverage: BankCoverage,
    tier: SizeTier,
    window: TestWindow,
}

impl WindowPlanner {
    /// Start at the `Small` tier and the configured initial offset, clamped.
    #[must_use]
    pub fn new(bank: MemoryBank, coverage: BankCoverage) -> Self {
        let tier = SizeTier::Small;
        let size = clamp_size(&bank, tier_size(&coverage, tier));
        let offset = clamp_offset(&bank, size, coverage.initial_offset);
        Self {
            bank,
            coverage,
            tier,
            window: TestWindow { bank, offset, size },
        }
    }

    /// The bank this planner covers.
    #[must_use]
    pub const fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    /// Current size tier.
    #[must_use]
    pub const fn tier(&self) -> SizeTier {
        self.tier
    }

    /// Window for the current cycle. Unchanged until the next [`rotate`].
    ///
    /// [`rotate`]: WindowPlanner::rotate
    #[must_use]
    pub const fn window(&self) -> TestWindow {
        self.window
    }

    /// Move the window for `cycle` and return it.
    ///
    /// The size tier changes first (when due), then the offset advances by
    /// the stride modulo the usable span. Disabled rotations only clamp.
    pub fn rotate(&mut self, cycle: u64, rotation: Rotation) -> TestWindow {
        let mut size = self.window.size;
        if rotation.rotate_sizes
            && rotation.size_rotation_period > 0
            && cycle.checked_rem(u64::from(rotation.size_rotation_period)) == Some(0)
        {
            self.tier = self.tier.next();
            size = clamp_size(&self.bank, tier_size(&self.coverage, self.tier));
        }

        let offset = if rotation.rotate_offsets {
            advance_offset(
                &self.bank,
                size,
                self.window.offset,
                align_up(self.coverage.offset_stride),
            )
        } else {
            clamp_offset(&self.bank, size, self.window.offset)
        };

        self.window = TestWindow {
            bank: self.bank,
            offset,
            size,
        };
        self.window
    }
}

fn tier_size(coverage: &BankCoverage, tier: SizeTier) -> u32 {
    coverage.tiers.get(tier.index()).copied().unwrap_or(0)
}

/// Effective window size for a requested tier size.
#[must_use]
pub const fn clamp_size(bank: &MemoryBank, requested: u32) -> u32 {
    let max = bank.max_window();
    let size = if requested < max { requested } else { max };
    let size = align_down(size);
    if size < WORD_BYTES {
        0
    } else {
        size
    }
}

/// Number of valid start positions (in bytes) for a window of `size`.
///
/// Offsets live in `[margin, margin + span)`; the result is a whole number
/// of words and at least one word whenever `size` came from [`clamp_size`].
#[must_use]
pub const fn usable_span(bank: &MemoryBank, size: u32) -> u32 {
    align_down(
        bank.size
            .saturating_sub(size)
            .saturating_sub(bank.safety_margin)
            .saturating_sub(bank.safety_margin),
    )
}

/// Nearest valid offset to `offset` for a window of `size`.
#[must_use]
pub fn clamp_offset(bank: &MemoryBank, size: u32, offset: u32) -> u32 {
    let margin = align_up(bank.safety_margin);
    let span = usable_span(bank, size);
    if span == 0 {
        return margin;
    }
    let last = margin.saturating_add(span).saturating_sub(WORD_BYTES);
    align_down(offset).clamp(margin, last)
}

/// Advance `offset` by `stride` inside the usable span.
///
/// An offset below the margin snaps to the margin first.
///
/// The position wraps modulo the span measured from the margin. This is
/// deliberately not `(offset + stride) mod (bank.size - size - margin)`
/// followed by a snap up to the margin: both agree until the first wrap,
/// after which that form lands every wrapped offset below the margin on
/// the margin itself, while this one keeps walking the span evenly.
#[must_use]
pub fn advance_offset(bank: &MemoryBank, size: u32, offset: u32, stride: u32) -> u32 {
    let margin = align_up(bank.safety_margin);
    let span = usable_span(bank, size);
    if span == 0 {
        return margin;
    }
    let relative = align_down(offset.max(margin).saturating_sub(margin));
    let moved = u64::from(relative)
        .wrapping_add(u64::from(stride))
        .checked_rem(u64::from(span))
        .unwrap_or(0);
    // `moved < span <= u32::MAX`, so the narrowing is lossless.
    margin.saturating_add(u32::try_from(moved).unwrap_or(0))
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

    fn bank(size: u32, margin: u32) -> MemoryBank {
        MemoryBank {
            id: 1,
            name: "TEST",
            base: 0x2000_0000,
            size,
            safety_margin: margin,
            kind: BankKind::Ram,
        }
    }

    fn coverage(tiers: [u32; 3], initial_offset: u32, stride: u32) -> BankCoverage {
        BankCoverage {
            tiers,
            initial_offset,
            offset_stride: stride,
        }
    }

    const OFFSETS_ONLY: Rotation = Rotation {
        rotate_offsets: true,
        rotate_sizes: false,
        size_rotation_period: 5,
    };

    // ── Worked example ──────────────────────────────────────────────────────

    #[test]
    fn one_rotation_moves_by_stride() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x400, 0x1000));
        assert_eq!(p.window().offset, 0x400);
        assert_eq!(p.rotate(1, OFFSETS_ONLY).offset, 0x1400);
    }

    #[test]
    fn offset_never_exceeds_last_position() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x400, 0x1000));
        for cycle in 1..500 {
            let w = p.rotate(cycle, OFFSETS_ONLY);
            assert!(w.offset <= 0x8000 - 0x2000 - 0x400, "cycle {cycle}: {:#x}", w.offset);
            assert!(w.offset >= 0x400);
        }
    }

    #[test]
    fn wrapped_offset_continues_from_margin() {
        // span = 0x8000 - 0x2000 - 2 * 0x400 = 0x5800
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x400, 0x1000));
        let offsets: std::vec::Vec<u32> = (1..=8).map(|c| p.rotate(c, OFFSETS_ONLY).offset).collect();
        assert_eq!(
            offsets,
            [0x1400, 0x2400, 0x3400, 0x4400, 0x5400, 0xC00, 0x1C00, 0x2C00]
        );
    }

    // ── Clamping ────────────────────────────────────────────────────────────

    #[test]
    fn oversized_tier_is_clamped() {
        let b = bank(0x8000, 0x400);
        let p = WindowPlanner::new(b, coverage([0x10_0000; 3], 0, 0x100));
        let w = p.window();
        assert_eq!(w.size, 0x8000 - 0x800 - 4);
        assert_eq!(w.offset, 0x400);
        assert!(w.offset + w.size + 0x400 <= 0x8000);
    }

    #[test]
    fn clamped_window_still_rotates_without_dividing_by_zero() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x10_0000; 3], 0, 0x100));
        for cycle in 1..10 {
            let w = p.rotate(cycle, OFFSETS_ONLY);
            assert_eq!(w.offset, 0x400);
        }
    }

    #[test]
    fn bank_smaller_than_margins_gets_empty_window() {
        let b = bank(0x800, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x100; 3], 0, 0x100));
        assert!(p.window().is_empty());
        assert!(p.rotate(1, OFFSETS_ONLY).is_empty());
    }

    #[test]
    fn offset_below_margin_snaps_up() {
        let b = bank(0x8000, 0x400);
        let p = WindowPlanner::new(b, coverage([0x2000; 3], 0x10, 0x1000));
        assert_eq!(p.window().offset, 0x400);
    }

    #[test]
    fn unaligned_stride_is_rounded_to_word() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x400, 0x101));
        assert_eq!(p.rotate(1, OFFSETS_ONLY).offset, 0x504);
    }

    // ── Size rotation ───────────────────────────────────────────────────────

    #[test]
    fn tiers_advance_round_robin_on_period() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x1000, 0x2000, 0x3000], 0x400, 0x100));
        let rot = Rotation {
            rotate_offsets: false,
            rotate_sizes: true,
            size_rotation_period: 5,
        };
        let sizes: std::vec::Vec<u32> = (1..=15).map(|c| p.rotate(c, rot).size).collect();
        assert_eq!(&sizes[..4], &[0x1000; 4]);
        assert_eq!(&sizes[4..9], &[0x2000; 5]);
        assert_eq!(&sizes[9..14], &[0x3000; 5]);
        assert_eq!(sizes[14], 0x1000);
    }

    #[test]
    fn growing_tier_pulls_offset_back_in_range() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x1000, 0x7000, 0x7000], 0x6000, 0x100));
        let rot = Rotation {
            rotate_offsets: false,
            rotate_sizes: true,
            size_rotation_period: 1,
        };
        let w = p.rotate(1, rot);
        assert_eq!(w.size, 0x7000);
        assert!(w.offset + w.size + 0x400 <= 0x8000);
    }

    #[test]
    fn disabled_rotation_keeps_offset() {
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x1000, 0x100));
        let rot = Rotation {
            rotate_offsets: false,
            rotate_sizes: false,
            size_rotation_period: 5,
        };
        for c in 1..20 {
            assert_eq!(p.rotate(c, rot).offset, 0x1000);
        }
    }

    // ── Coverage ────────────────────────────────────────────────────────────

    #[test]
    fn coprime_stride_visits_every_position() {
        // span = 0x8000 - 0x2000 - 0x800 = 0x5800 bytes = 5632 words,
        // stride = 7 words, gcd(7, 5632) = 1.
        let b = bank(0x8000, 0x400);
        let mut p = WindowPlanner::new(b, coverage([0x2000; 3], 0x400, 4 * 7));
        let mut seen = std::collections::HashSet::new();
        for c in 1..=5632 {
            seen.insert(p.rotate(c, OFFSETS_ONLY).offset);
        }
        assert_eq!(seen.len(), 5632);
    }

    #[test]
    fn fraction_is_word_aligned() {
        let b = bank(0x8000, 0x400);
        let w = TestWindow {
            bank: b,
            offset: 0x400,
            size: 0x2004,
        };
        assert_eq!(w.fraction(8).size, 0x400);
        assert_eq!(w.fraction(0).size, 0);
    }

    #[test]
    fn pages_walk_the_window_and_wrap() {
        let b = bank(0x4_0000, 0x1000);
        let w = TestWindow {
            bank: b,
            offset: 0x1200,
            size: 0x2000,
        };
        // Three whole pages fit in [0x1200, 0x3200).
        assert_eq!(w.page(0x800, 0), 0x1800);
        assert_eq!(w.page(0x800, 1), 0x2000);
        assert_eq!(w.page(0x800, 2), 0x2800);
        assert_eq!(w.page(0x800, 3), 0x1800);
    }

    #[test]
    fn window_smaller_than_a_page_uses_the_page_of_its_start() {
        let b = bank(0x4_0000, 0x1000);
        let w = TestWindow {
            bank: b,
            offset: 0x1A00,
            size: 0x400,
        };
        assert_eq!(w.page(0x800, 0), 0x1800);
        assert_eq!(w.page(0x800, 7), 0x1800);
    }
}
