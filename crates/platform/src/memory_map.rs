//! STM32G473CB memory map.
//!
//! ```text
//! 0x0800_0000 ┌──────────────────────┐
//!             │ FLASH bank 1 256 KB  │  firmware image
//! 0x0804_0000 ├──────────────────────┤
//!             │ FLASH bank 2 256 KB  │  program/erase tests, 2 KB pages
//! 0x0808_0000 └──────────────────────┘
//!
//! 0x1000_0000 ┌──────────────────────┐
//!             │ CCM SRAM      32 KB  │  code bus alias, zero wait state
//! 0x1000_8000 └──────────────────────┘
//!
//! 0x2000_0000 ┌──────────────────────┐
//!             │ SRAM1         96 KB  │  firmware .data/.bss/stack at the top
//! 0x2001_8000 ├──────────────────────┤
//!             │ SRAM2         32 KB  │
//! 0x2002_0000 └──────────────────────┘
//! ```
//!
//! The firmware links its own RAM into the top of SRAM1 (see `memory.x`),
//! so the SRAM1 bank carries a safety margin that covers it.

/// Flash base address.
pub const FLASH_BASE: u32 = 0x0800_0000;
/// Flash size (512 KB).
pub const FLASH_SIZE: u32 = 0x0008_0000;
/// Flash page size with the default dual-bank layout.
pub const FLASH_PAGE_SIZE: u32 = 0x800;
/// Smallest programmable unit (one double word).
pub const FLASH_WRITE_SIZE: u32 = 8;
/// Start of flash bank 2. The firmware image is linked into bank 1 only
/// (see `memory.x`), so bank 2 is free for program/erase tests.
pub const FLASH_BANK2_BASE: u32 = 0x0804_0000;
/// Size of one flash bank in dual-bank mode.
pub const FLASH_BANK_SIZE: u32 = 0x0004_0000;

/// SRAM1 base address.
pub const SRAM1_BASE: u32 = 0x2000_0000;
/// SRAM1 size (96 KB).
pub const SRAM1_SIZE: u32 = 0x0001_8000;

/// SRAM2 base address.
pub const SRAM2_BASE: u32 = 0x2001_8000;
/// SRAM2 size (32 KB).
pub const SRAM2_SIZE: u32 = 0x0000_8000;

/// CCM SRAM base address (code bus alias).
pub const CCM_BASE: u32 = 0x1000_0000;
/// CCM SRAM size (32 KB).
pub const CCM_SIZE: u32 = 0x0000_8000;

/// Bytes at both ends of SRAM1 left alone: the firmware's own stack and
/// statics live at the top of this bank.
pub const SRAM1_MARGIN: u32 = 0x4000;
/// Flash bank 2 margin: two pages kept clear at each end.
pub const FLASH_MARGIN: u32 = 0x1000;
/// SRAM2 margin.
pub const SRAM2_MARGIN: u32 = 0x400;
/// CCM margin.
pub const CCM_MARGIN: u32 = 0x400;

/// `true` if `[addr, addr + len)` lies entirely inside `[base, base + size)`.
#[must_use]
pub const fn contains(base: u32, size: u32, addr: u32, len: u32) -> bool {
    let Some(end) = addr.checked_add(len) else {
        return false;
    };
    let Some(limit) = base.checked_add(size) else {
        return false;
    };
    addr >= base && end <= limit
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn sram2_follows_sram1() {
        assert_eq!(SRAM1_BASE + SRAM1_SIZE, SRAM2_BASE);
    }

    #[test]
    fn flash_banks_split_the_array() {
        assert_eq!(FLASH_BANK2_BASE, FLASH_BASE + FLASH_BANK_SIZE);
        assert_eq!(FLASH_BANK_SIZE * 2, FLASH_SIZE);
    }

    #[test]
    fn margins_are_word_aligned() {
        for m in [SRAM1_MARGIN, FLASH_MARGIN, SRAM2_MARGIN, CCM_MARGIN] {
            assert_eq!(m % 4, 0);
        }
    }

    #[test]
    fn contains_rejects_overflow() {
        assert!(contains(SRAM2_BASE, SRAM2_SIZE, SRAM2_BASE, SRAM2_SIZE));
        assert!(!contains(SRAM2_BASE, SRAM2_SIZE, SRAM2_BASE, SRAM2_SIZE + 4));
        assert!(!contains(SRAM2_BASE, SRAM2_SIZE, u32::MAX, 8));
        assert!(!contains(SRAM2_BASE, SRAM2_SIZE, SRAM1_BASE, 4));
    }
}
