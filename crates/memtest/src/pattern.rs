//! Test value generators.
//!
//! Pure functions of `(address, cycle)`: a read-back can recompute the
//! expected value instead of storing it, and every cycle writes different
//! values to the same cells so a stuck bit cannot hide behind a lucky match.

use heapless::Vec;
use platform::{align_down, WORD_BYTES};

use crate::window::TestWindow;

/// Odd multiplier spreading the cycle number over all 32 bits.
pub const CYCLE_MULTIPLIER: u32 = 0x1234_567B;

/// Fixed bit-mixing constant for address patterns.
pub const ADDRESS_MIX: u32 = 0xF00F_0FF0;

/// Checkerboard background.
pub const CHECKERBOARD: u32 = 0xAA55_AA55;

/// Inverse checkerboard background.
pub const CHECKERBOARD_INV: u32 = 0x55AA_55AA;

/// Butterfly seed before per-pair and per-cycle mixing.
pub const BUTTERFLY_SEED: u32 = 0xAAAA_AAAA;

/// Most bank-spanning pairs one butterfly pass will use.
pub const MAX_BUTTERFLY_PAIRS: usize = 32;

/// Pairs separated by exact powers of two (4..=64 bytes).
pub const POWER_OF_TWO_PAIRS: usize = 5;

/// Capacity of a butterfly pair table.
pub const PAIR_TABLE_CAPACITY: usize = MAX_BUTTERFLY_PAIRS + POWER_OF_TWO_PAIRS;

/// Smallest window that can hold a pair.
const MIN_PAIR_WINDOW: u32 = 2 * WORD_BYTES;

/// Prime step for the per-cycle rotation of butterfly positions.
const BUTTERFLY_ROTATION: u32 = 19;

/// Two addresses exercised together by the butterfly test.
pub type AddressPair = (u32, u32);

/// Butterfly pair table for one cycle.
pub type PairTable = Vec<AddressPair, PAIR_TABLE_CAPACITY>;

/// Spread each address bit over three value bits.
///
/// XOR of an odd number of rotations is invertible over GF(2)^32, so
/// distinct addresses never map to the same value, and flipping one address
/// bit flips exactly three value bits.
#[must_use]
pub const fn scramble(address: u32) -> u32 {
    address ^ address.rotate_left(11) ^ address.rotate_left(23)
}

/// Expected value of `address` during `cycle`.
#[must_use]
pub const fn address_pattern(address: u32, cycle: u32) -> u32 {
    scramble(address) ^ cycle.wrapping_mul(CYCLE_MULTIPLIER) ^ ADDRESS_MIX
}

/// Value and complement for the two halves of butterfly pair `pair_index`.
#[must_use]
pub const fn butterfly_pair_pattern(pair_index: u32, cycle: u32) -> (u32, u32) {
    let v = BUTTERFLY_SEED ^ pair_index.wrapping_mul(0x1111_1111) ^ cycle;
    (v, !v)
}

/// Checkerboard value for `address`: adjacent words hold opposite phases.
#[must_use]
pub const fn checkerboard_pattern(address: u32, background: u32) -> u32 {
    if (address / WORD_BYTES) & 1 == 0 {
        background
    } else {
        !background
    }
}

/// Modified checkerboard: the phase also flips every row of 32 words, so
/// vertically adjacent cells in the array differ as well as horizontal ones.
#[must_use]
pub const fn modified_checkerboard_pattern(address: u32, cycle: u32) -> u32 {
    let word = address / WORD_BYTES;
    let row = word / 32;
    let base = if (word ^ row) & 1 == 0 {
        CHECKERBOARD
    } else {
        CHECKERBOARD_INV
    };
    base ^ cycle.wrapping_mul(CYCLE_MULTIPLIER)
}

/// Address pairs for the butterfly test on `window` during `cycle`.
///
/// The first `count` pairs (at most [`MAX_BUTTERFLY_PAIRS`]) are spread over
/// the whole bank, the partner half a bank away, starting from a position
/// that rotates with the cycle. Positions outside the window are folded into
/// it. Five more pairs sit exactly 4, 8, 16, 32 and 64 bytes apart to hit
/// individual low address lines.
///
/// A window smaller than two words yields no pairs. When both halves of a
/// pair fold onto the same word, the second moves half a window away.
#[must_use]
pub fn butterfly_pairs(window: &TestWindow, cycle: u32, count: u32) -> PairTable {
    let mut pairs = PairTable::new();
    let bank_size = window.bank.size;
    if window.size < MIN_PAIR_WINDOW || bank_size == 0 {
        return pairs;
    }

    let count = count.min(u32::try_from(MAX_BUTTERFLY_PAIRS).unwrap_or(u32::MAX));
    let rotation = wrap(cycle.wrapping_mul(BUTTERFLY_ROTATION), bank_size);
    let spacing = bank_size.checked_div(count).unwrap_or(0);
    let half = bank_size / 2;

    for i in 0..count {
        let pos = wrap(rotation.wrapping_add(i.wrapping_mul(spacing)), bank_size);
        let partner = wrap(pos.wrapping_add(half), bank_size);
        // Capacity exceeds the loop bound, so push cannot fail.
        let _ = pairs.push(fold_pair(window, pos, partner));
    }

    for bit in (2u32..).take(POWER_OF_TWO_PAIRS) {
        let mut distance = 1u32.wrapping_shl(bit);
        if distance >= bank_size {
            distance = half;
        }
        let partner = wrap(rotation.wrapping_add(distance), bank_size);
        let _ = pairs.push(fold_pair(window, rotation, partner));
    }

    pairs
}

/// Map two bank-relative positions into absolute, distinct, aligned window
/// addresses.
fn fold_pair(window: &TestWindow, a: u32, b: u32) -> AddressPair {
    let first = fold(window, a);
    let mut second = fold(window, b);
    if first == second {
        second = align_down(wrap(first.wrapping_add(window.size / 2), window.size));
    }
    (window.start().wrapping_add(first), window.start().wrapping_add(second))
}

/// Window-relative aligned offset of bank position `pos`.
fn fold(window: &TestWindow, pos: u32) -> u32 {
    let relative = if pos >= window.offset && pos < window.end_offset() {
        pos.wrapping_sub(window.offset)
    } else {
        wrap(pos, window.size)
    };
    align_down(relative)
}

/// `value mod modulus`, 0 for an empty modulus.
const fn wrap(value: u32, modulus: u32) -> u32 {
    match value.checked_rem(modulus) {
        Some(r) => r,
        None => 0,
    }
}

/// Erased NOR flash word.
pub const ERASED_WORD: u32 = u32::MAX;

/// Fold a pair table onto one flash page.
///
/// Every address keeps its distance from `origin` modulo `len` and is
/// rebased onto `page`. Pairs whose halves land on the same word are
/// dropped.
#[must_use]
pub fn fold_pairs_into_page(pairs: &[AddressPair], origin: u32, page: u32, len: u32) -> PairTable {
    let onto = |addr: u32| page.wrapping_add(align_down(wrap(addr.wrapping_sub(origin), len)));
    let mut folded = PairTable::new();
    for &(a, b) in pairs {
        let (a, b) = (onto(a), onto(b));
        // Pairs past the table capacity are dropped.
        if a != b && folded.push((a, b)).is_err() {
            break;
        }
    }
    folded
}

/// Word to program at `address` for a butterfly pass over a page.
///
/// Pair `i` holds `(v, !v)`, or `(!v, v)` when `swapped`. The first pair
/// naming an address wins; words no pair names stay erased.
#[must_use]
pub fn butterfly_page_word(pairs: &[AddressPair], address: u32, cycle: u32, swapped: bool) -> u32 {
    (0u32..)
        .zip(pairs)
        .find_map(|(i, &(a, b))| {
            let (v, c) = butterfly_pair_pattern(i, cycle);
            let (first, second) = if swapped { (c, v) } else { (v, c) };
            if address == a {
                Some(first)
            } else if address == b {
                Some(second)
            } else {
                None
            }
        })
        .unwrap_or(ERASED_WORD)
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
    use crate::window::{BankKind, MemoryBank};

    const BANK: MemoryBank = MemoryBank {
        id: 2,
        name: "SRAM2",
        base: 0x2001_8000,
        size: 0x8000,
        safety_margin: 0x400,
        kind: BankKind::Ram,
    };

    fn window(offset: u32, size: u32) -> TestWindow {
        TestWindow {
            bank: BANK,
            offset,
            size,
        }
    }

    #[test]
    fn address_pattern_depends_on_cycle() {
        let a = 0x2001_8400;
        assert_ne!(address_pattern(a, 1), address_pattern(a, 2));
        assert_ne!(address_pattern(a, 0), address_pattern(a, u32::MAX));
    }

    #[test]
    fn single_bit_address_change_flips_three_bits() {
        for bit in 0..32 {
            let a = 0x2001_8400u32;
            let b = a ^ (1 << bit);
            let diff = address_pattern(a, 37) ^ address_pattern(b, 37);
            assert_eq!(diff.count_ones(), 3, "bit {bit}");
        }
    }

    #[test]
    fn butterfly_values_are_complements() {
        for i in 0..40 {
            let (v, c) = butterfly_pair_pattern(i, 12345);
            assert_eq!(v, !c);
        }
    }

    #[test]
    fn butterfly_complement_uses_inverse_seed() {
        let (_, c) = butterfly_pair_pattern(3, 9);
        assert_eq!(c, 0x5555_5555 ^ 3u32.wrapping_mul(0x1111_1111) ^ 9);
    }

    #[test]
    fn checkerboard_alternates_by_word() {
        assert_eq!(checkerboard_pattern(0x100, CHECKERBOARD), CHECKERBOARD);
        assert_eq!(checkerboard_pattern(0x104, CHECKERBOARD), CHECKERBOARD_INV);
        assert_eq!(checkerboard_pattern(0x108, CHECKERBOARD), CHECKERBOARD);
    }

    #[test]
    fn modified_checkerboard_flips_per_row() {
        let row0 = modified_checkerboard_pattern(0, 0);
        let row1 = modified_checkerboard_pattern(32 * 4, 0);
        assert_eq!(row0, !row1);
        assert_eq!(modified_checkerboard_pattern(4, 0), !row0);
    }

    #[test]
    fn pairs_stay_inside_window_and_aligned() {
        let w = window(0x1400, 0x2000);
        for cycle in 0..200 {
            let pairs = butterfly_pairs(&w, cycle, 16);
            assert_eq!(pairs.len(), 16 + POWER_OF_TWO_PAIRS);
            for &(a, b) in &pairs {
                for addr in [a, b] {
                    assert!(addr >= w.start() && addr < w.end(), "{addr:#x}");
                    assert_eq!(addr % 4, 0);
                }
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn pair_count_is_capped() {
        let w = window(0x400, 0x4000);
        assert_eq!(
            butterfly_pairs(&w, 1, 1000).len(),
            MAX_BUTTERFLY_PAIRS + POWER_OF_TWO_PAIRS
        );
    }

    #[test]
    fn tiny_window_has_no_pairs() {
        assert!(butterfly_pairs(&window(0x400, 4), 1, 16).is_empty());
        assert!(butterfly_pairs(&window(0x400, 0), 1, 16).is_empty());
    }

    #[test]
    fn power_of_two_pairs_keep_their_distance_inside_window() {
        // Cycle 0 rotates to position 0, inside a window at offset 0.
        let w = window(0, 0x2000);
        let pairs = butterfly_pairs(&w, 0, 0);
        let distances: std::vec::Vec<u32> = pairs.iter().map(|(a, b)| b - a).collect();
        assert_eq!(distances, [4, 8, 16, 32, 64]);
    }

    #[test]
    fn pairs_fold_onto_one_page() {
        let w = window(0x1400, 0x2000);
        let page = 0x0804_1000;
        let pairs = butterfly_pairs(&w, 7, 16);
        let folded = fold_pairs_into_page(&pairs, w.start(), page, 0x800);
        assert!(!folded.is_empty());
        for &(a, b) in &folded {
            assert_ne!(a, b);
            for addr in [a, b] {
                assert!((page..page + 0x800).contains(&addr), "{addr:#x}");
                assert_eq!(addr % 4, 0);
            }
        }
    }

    #[test]
    fn butterfly_page_words_swap_and_default_to_erased() {
        let pairs = [(0x100, 0x180)];
        let (v, c) = butterfly_pair_pattern(0, 3);
        assert_eq!(butterfly_page_word(&pairs, 0x100, 3, false), v);
        assert_eq!(butterfly_page_word(&pairs, 0x180, 3, false), c);
        assert_eq!(butterfly_page_word(&pairs, 0x100, 3, true), c);
        assert_eq!(butterfly_page_word(&pairs, 0x104, 3, false), ERASED_WORD);
    }
}
