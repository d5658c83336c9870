//! Raw word access to the memory under test.
//!
//! The diagnostic core never dereferences pointers. Every load and store of a
//! bank under test goes through [`RawMemory`], implemented per target:
//! volatile accesses on hardware, a simulated address space on the host.

/// Size of one test word in bytes.
pub const WORD_BYTES: u32 = 4;

/// Low address bits inside a word.
const WORD_MASK: u32 = WORD_BYTES - 1;

/// Capability to read and write 32-bit words at absolute addresses.
///
/// Implementations must perform the access exactly once per call (no caching,
/// no merging of consecutive writes) so that a write followed by a read
/// really round-trips through the memory cell.
pub trait RawMemory {
    /// Read the word at `addr`. `addr` is word-aligned.
    fn read_word(&mut self, addr: u32) -> u32;

    /// Write `value` to the word at `addr`. `addr` is word-aligned.
    fn write_word(&mut self, addr: u32, value: u32);
}

impl<T: RawMemory + ?Sized> RawMemory for &mut T {
    fn read_word(&mut self, addr: u32) -> u32 {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        (**self).write_word(addr, value);
    }
}

/// Round `value` down to a whole word.
#[must_use]
pub const fn align_down(value: u32) -> u32 {
    value & !WORD_MASK
}

/// Round `value` up to a whole word, saturating at the largest aligned `u32`.
#[must_use]
pub const fn align_up(value: u32) -> u32 {
    align_down(value.saturating_add(WORD_MASK))
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn align_down_clears_low_bits() {
        assert_eq!(align_down(0x1003), 0x1000);
        assert_eq!(align_down(0x1004), 0x1004);
        assert_eq!(align_down(3), 0);
    }

    #[test]
    fn align_up_rounds_to_next_word() {
        assert_eq!(align_up(1), 4);
        assert_eq!(align_up(0x1000), 0x1000);
        assert_eq!(align_up(0x1001), 0x1004);
    }

    #[test]
    fn align_up_saturates_near_max() {
        assert_eq!(align_up(u32::MAX), 0xFFFF_FFFC);
    }
}
