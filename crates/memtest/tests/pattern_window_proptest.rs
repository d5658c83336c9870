//! Property-based tests for pattern generators and window planning.
//! Verifies invariants hold for ALL inputs, not just fixed examples.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use memtest::config::{BankCoverage, Rotation};
use memtest::pattern::{
    address_pattern, butterfly_pair_pattern, butterfly_pairs, fold_pairs_into_page,
};
use memtest::tag::{OperationTag, TestKind};
use memtest::window::{BankKind, MemoryBank, TestWindow, WindowPlanner};
use proptest::prelude::*;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn bank(size_words: u32, margin_words: u32) -> MemoryBank {
    MemoryBank {
        id: 1,
        name: "PROP",
        base: 0x2000_0000,
        size: size_words * 4,
        safety_margin: margin_words * 4,
        kind: BankKind::Ram,
    }
}

proptest! {
    /// Different cycles always give different values at the same address.
    #[test]
    fn cycle_perturbs_address_pattern(a in any::<u32>(), c1 in any::<u32>(), c2 in any::<u32>()) {
        prop_assume!(c1 != c2);
        prop_assert_ne!(address_pattern(a, c1), address_pattern(a, c2));
    }

    /// Addresses one bit apart never share a value within a cycle.
    #[test]
    fn one_bit_address_difference_is_visible(a in any::<u32>(), bit in 0u32..32, c in any::<u32>()) {
        let b = a ^ (1 << bit);
        let diff = address_pattern(a, c) ^ address_pattern(b, c);
        prop_assert_eq!(diff.count_ones(), 3);
    }

    /// Butterfly halves are exact complements.
    #[test]
    fn butterfly_halves_complement(i in any::<u32>(), c in any::<u32>()) {
        let (v, w) = butterfly_pair_pattern(i, c);
        prop_assert_eq!(v, !w);
    }

    /// Every butterfly address is aligned, inside the window, and distinct
    /// from its partner.
    #[test]
    fn butterfly_pairs_stay_in_window(
        offset_words in 16u32..256,
        size_words in 2u32..1024,
        cycle in any::<u32>(),
        count in 0u32..64,
    ) {
        let b = bank(4096, 16);
        let w = TestWindow { bank: b, offset: offset_words * 4, size: size_words * 4 };
        for (x, y) in butterfly_pairs(&w, cycle, count) {
            prop_assert_ne!(x, y);
            for addr in [x, y] {
                prop_assert_eq!(addr % 4, 0);
                prop_assert!(addr >= w.start() && addr < w.end(), "{:#x} outside window", addr);
            }
        }
    }

    /// The window never leaves the bank's margins, whatever the geometry.
    #[test]
    fn window_respects_margins(
        size_words in 1u32..0x4000,
        margin_words in 0u32..0x400,
        tiers in proptest::array::uniform3(0u32..0x20000),
        initial in any::<u32>(),
        stride in 0u32..0x10000,
        period in 1u32..8,
    ) {
        let b = bank(size_words, margin_words);
        prop_assume!(b.safety_margin * 2 <= b.size);
        let coverage = BankCoverage { tiers, initial_offset: initial, offset_stride: stride };
        let rotation = Rotation { rotate_offsets: true, rotate_sizes: true, size_rotation_period: period };
        let mut planner = WindowPlanner::new(b, coverage);
        for cycle in 1..40u64 {
            let w = planner.rotate(cycle, rotation);
            prop_assert_eq!(w.offset % 4, 0);
            prop_assert_eq!(w.size % 4, 0);
            prop_assert!(w.offset >= b.safety_margin);
            prop_assert!(
                u64::from(w.offset) + u64::from(w.size) + u64::from(b.safety_margin) <= u64::from(b.size),
                "offset {:#x} size {:#x} bank {:#x}", w.offset, w.size, b.size
            );
        }
    }

    /// With a fixed size the offset visits `min(n, span / gcd(stride, span))`
    /// distinct positions in `n` rotations.
    #[test]
    fn offsets_cover_span_before_repeating(
        span_words in 1u32..600,
        stride_words in 1u32..600,
        n in 1u32..700,
    ) {
        let margin = 0x40;
        let size = 0x40;
        let b = MemoryBank {
            size: span_words * 4 + size + 2 * margin,
            safety_margin: margin,
            ..bank(0, 0)
        };
        let coverage = BankCoverage { tiers: [size; 3], initial_offset: margin, offset_stride: stride_words * 4 };
        let rotation = Rotation { rotate_offsets: true, rotate_sizes: false, size_rotation_period: 1 };
        let mut planner = WindowPlanner::new(b, coverage);
        prop_assert_eq!(planner.window().size, size);

        let mut seen = std::collections::BTreeSet::new();
        for cycle in 1..=u64::from(n) {
            seen.insert(planner.rotate(cycle, rotation).offset);
        }
        let period = span_words / gcd(stride_words, span_words);
        prop_assert_eq!(seen.len(), n.min(period) as usize);
    }

    /// The flash page picked for any step is a whole page of the bank, and
    /// lies inside the window whenever the window holds one.
    #[test]
    fn flash_page_is_whole_and_inside_the_window(
        offset_words in 16u32..2048,
        size_words in 1u32..4080,
        step in any::<u32>(),
    ) {
        const PAGE: u32 = 0x800;
        prop_assume!(offset_words + size_words <= 4096 - 16);
        let w = TestWindow { bank: bank(4096, 16), offset: offset_words * 4, size: size_words * 4 };
        let page = w.page(PAGE, step);
        prop_assert_eq!(page % PAGE, 0);
        prop_assert!(page + PAGE <= w.bank.size);
        if w.offset.div_ceil(PAGE) * PAGE + PAGE <= w.end_offset() {
            prop_assert!(page >= w.offset && page + PAGE <= w.end_offset(), "page {:#x}", page);
        }
    }

    /// Butterfly pairs folded onto a page stay aligned, distinct and on it.
    #[test]
    fn folded_butterfly_pairs_stay_on_the_page(
        offset_words in 16u32..256,
        size_words in 2u32..1024,
        cycle in any::<u32>(),
        count in 0u32..64,
    ) {
        let w = TestWindow { bank: bank(4096, 16), offset: offset_words * 4, size: size_words * 4 };
        let page = w.bank.base + 0x800;
        let pairs = butterfly_pairs(&w, cycle, count);
        for (x, y) in fold_pairs_into_page(&pairs, w.start(), page, 0x800) {
            prop_assert_ne!(x, y);
            for addr in [x, y] {
                prop_assert_eq!(addr % 4, 0);
                prop_assert!(addr >= page && addr < page + 0x800, "{:#x} off the page", addr);
            }
        }
    }

    /// Operation tags decode back to what was packed.
    #[test]
    fn operation_tags_round_trip(k in 0usize..7, bank_id in any::<u8>(), variant in any::<u8>()) {
        let kind = TestKind::ALL[k];
        let tag = OperationTag::new(kind, bank_id, variant);
        prop_assert_eq!(tag.decode(), Some((kind, bank_id, variant)));
        prop_assert_eq!(OperationTag::from_raw(tag.raw()), tag);
    }
}
