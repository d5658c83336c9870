//! Flash array under test.
//!
//! Flash cannot be written through the bus the way RAM can. Programming goes
//! through the flash controller, which `embedded-storage`'s [`NorFlash`]
//! already models; the only extra capability the diagnostics need is
//! invalidating the instruction/data cache so a second read really comes from
//! the array.
//!
//! [`NorFlash`]: embedded_storage::nor_flash::NorFlash

use embedded_storage::nor_flash::NorFlash;

/// Programmable flash with a controllable read cache.
///
/// Offsets passed to the [`NorFlash`] methods are relative to the start of
/// the array; [`FlashArray::BUS_BASE`] maps them onto the address space seen
/// by [`crate::RawMemory`].
pub trait FlashArray: NorFlash {
    /// Absolute bus address of offset 0.
    const BUS_BASE: u32;

    /// Invalidate and re-enable the flash instruction and data caches.
    fn reset_cache(&mut self);
}

/// `FLASH_ECCR.ECCD`: ECC double error detected (not correctable).
pub const ECCR_ECCD: u32 = 1 << 31;
/// `FLASH_ECCR.ECCC`: ECC single error detected and corrected.
pub const ECCR_ECCC: u32 = 1 << 30;
/// `FLASH_ECCR.ECCCIE`: interrupt enable for ECCC.
pub const ECCR_ECCCIE: u32 = 1 << 24;
/// `FLASH_ECCR.BK_ECC`: the failing access was in bank 2.
pub const ECCR_BK_ECC: u32 = 1 << 21;
/// `FLASH_ECCR.ADDR_ECC`: offset of the failing access within its bank.
pub const ECCR_ADDR_MASK: u32 = 0x0007_FFFF;
/// Start of bank 2 relative to the flash base in dual-bank mode.
pub const DUAL_BANK_OFFSET: u32 = 0x0004_0000;

/// Severity of a flash ECC event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EccSeverity {
    /// Single-bit error, corrected on the fly.
    Correctable,
    /// Double-bit error, data returned is wrong.
    Uncorrectable,
}

/// A decoded flash ECC event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EccEvent {
    /// Correctable or not.
    pub severity: EccSeverity,
    /// Absolute bus address of the failing double word.
    pub address: u32,
}

impl EccEvent {
    /// Decode `FLASH_ECCR`. `None` when neither ECC flag is set.
    ///
    /// When both flags are set the uncorrectable event is reported, since it
    /// is the one that corrupted data.
    #[must_use]
    pub fn from_eccr(eccr: u32, flash_base: u32) -> Option<Self> {
        let severity = if eccr & ECCR_ECCD != 0 {
            EccSeverity::Uncorrectable
        } else if eccr & ECCR_ECCC != 0 {
            EccSeverity::Correctable
        } else {
            return None;
        };
        let bank = if eccr & ECCR_BK_ECC != 0 {
            DUAL_BANK_OFFSET
        } else {
            0
        };
        let address = flash_base
            .wrapping_add(bank)
            .wrapping_add(eccr & ECCR_ADDR_MASK);
        Some(Self { severity, address })
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const BASE: u32 = 0x0800_0000;

    #[test]
    fn no_flags_decodes_to_none() {
        assert_eq!(EccEvent::from_eccr(0x0000_1234, BASE), None);
        assert_eq!(EccEvent::from_eccr(ECCR_ECCCIE, BASE), None);
    }

    #[test]
    fn correctable_event_carries_address() {
        let ev = EccEvent::from_eccr(ECCR_ECCC | 0x0000_4008, BASE);
        assert_eq!(
            ev,
            Some(EccEvent {
                severity: EccSeverity::Correctable,
                address: 0x0800_4008,
            })
        );
    }

    #[test]
    fn double_error_wins_over_single() {
        let ev = EccEvent::from_eccr(ECCR_ECCC | ECCR_ECCD | 0x10, BASE);
        assert_eq!(ev.map(|e| e.severity), Some(EccSeverity::Uncorrectable));
    }

    #[test]
    fn status_bits_do_not_leak_into_address() {
        let ev = EccEvent::from_eccr(ECCR_ECCD | ECCR_ECCCIE | 0x20, BASE);
        assert_eq!(ev.map(|e| e.address), Some(0x0800_0020));
    }

    #[test]
    fn bank_two_events_are_offset() {
        let ev = EccEvent::from_eccr(ECCR_ECCC | ECCR_BK_ECC | 0x20, BASE);
        assert_eq!(ev.map(|e| e.address), Some(0x0804_0020));
    }
}
