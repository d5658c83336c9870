//! Operation tags and error codes persisted in the backup slots.
//!
//! An operation tag packs "which test, which bank, which pass" into one word:
//!
//! ```text
//!  31        24 23       16 15        8 7         0
//! ┌────────────┬───────────┬───────────┬───────────┐
//! │  reserved  │  variant  │  bank id  │ kind code │
//! └────────────┴───────────┴───────────┴───────────┘
//! ```
//!
//! Kind codes are ASCII letters so a raw hex dump stays readable: a stored
//! `0x0000_0241` is the address test (`'A'`) on bank 2, variant 0.

use core::fmt;

/// The test primitives the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestKind {
    /// Address-dependent values with a stride.
    Address,
    /// Complementary values on address-line pairs.
    Butterfly,
    /// Alternating checkerboard, one polarity per pass.
    Checkerboard,
    /// March C- element sequence.
    MarchC,
    /// Walking ones or walking zeros.
    Walking,
    /// Checkerboard with per-row phase flip.
    ModifiedCheckerboard,
    /// Flash erase, program, verify and cache reload.
    FlashProgram,
}

impl TestKind {
    /// Every kind, in statistics order.
    pub const ALL: [TestKind; 7] = [
        Self::Address,
        Self::Butterfly,
        Self::Checkerboard,
        Self::MarchC,
        Self::Walking,
        Self::ModifiedCheckerboard,
        Self::FlashProgram,
    ];

    /// ASCII code stored in the low byte of an operation tag.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Address => b'A',
            Self::Butterfly => b'B',
            Self::Checkerboard => b'C',
            Self::MarchC => b'M',
            Self::Walking => b'W',
            Self::ModifiedCheckerboard => b'K',
            Self::FlashProgram => b'F',
        }
    }

    /// Inverse of [`TestKind::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'A' => Some(Self::Address),
            b'B' => Some(Self::Butterfly),
            b'C' => Some(Self::Checkerboard),
            b'M' => Some(Self::MarchC),
            b'W' => Some(Self::Walking),
            b'K' => Some(Self::ModifiedCheckerboard),
            b'F' => Some(Self::FlashProgram),
            _ => None,
        }
    }

    /// Name used as the prefix of mismatch lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Address => "Address",
            Self::Butterfly => "Butterfly",
            Self::Checkerboard => "Checkerboard",
            Self::MarchC => "MarchC",
            Self::Walking => "Walking",
            Self::ModifiedCheckerboard => "ModCheckerboard",
            Self::FlashProgram => "Flash",
        }
    }

    /// Position in [`TestKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Address => 0,
            Self::Butterfly => 1,
            Self::Checkerboard => 2,
            Self::MarchC => 3,
            Self::Walking => 4,
            Self::ModifiedCheckerboard => 5,
            Self::FlashProgram => 6,
        }
    }
}

/// Packed "test, bank, pass" identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OperationTag(u32);

impl OperationTag {
    /// No operation in flight.
    pub const NONE: Self = Self(0);

    /// Tag for `kind` on `bank_id`, pass `variant`.
    #[must_use]
    pub const fn new(kind: TestKind, bank_id: u8, variant: u8) -> Self {
        Self(u32::from_le_bytes([kind.code(), bank_id, variant, 0]))
    }

    /// Wrap a raw persisted word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw word for the backup slot.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Split back into `(kind, bank_id, variant)`.
    ///
    /// `None` for [`OperationTag::NONE`], unknown kind codes, and words with
    /// reserved bits set.
    #[must_use]
    pub const fn decode(self) -> Option<(TestKind, u8, u8)> {
        let [code, bank, variant, reserved] = self.0.to_le_bytes();
        if reserved != 0 {
            return None;
        }
        match TestKind::from_code(code) {
            Some(kind) => Some((kind, bank, variant)),
            None => None,
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some((kind, bank, variant)) => {
                write!(f, "{} bank {} pass {}", kind.label(), bank, variant)
            }
            None if self.0 == 0 => f.write_str("none"),
            None => f.write_str("unknown"),
        }
    }
}

/// Last-error code persisted alongside the operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum ErrorCode {
    /// Nothing recorded.
    None = 0x00,
    /// Flash erase or program failed.
    FlashWrite = 0x01,
    /// Flash read-back mismatch.
    FlashRead = 0x02,
    /// SRAM write fault.
    SramWrite = 0x03,
    /// SRAM read-back mismatch.
    SramRead = 0x04,
    /// Mismatch that disappeared after a cache reset.
    CacheInvalid = 0x05,
    /// Flash ECC single-bit error, corrected.
    EccCorrectable = 0x06,
    /// Flash ECC double-bit error.
    EccUncorrectable = 0x07,
    /// HardFault trap.
    HardFault = 0x0A,
    /// BusFault trap.
    BusFault = 0x0B,
    /// MemManage trap.
    MemManage = 0x0C,
    /// UsageFault trap.
    UsageFault = 0x0D,
    /// Supervisory reset with nothing else recorded.
    Watchdog = 0x0E,
}

impl ErrorCode {
    /// Decode a persisted word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00 => Some(Self::None),
            0x01 => Some(Self::FlashWrite),
            0x02 => Some(Self::FlashRead),
            0x03 => Some(Self::SramWrite),
            0x04 => Some(Self::SramRead),
            0x05 => Some(Self::CacheInvalid),
            0x06 => Some(Self::EccCorrectable),
            0x07 => Some(Self::EccUncorrectable),
            0x0A => Some(Self::HardFault),
            0x0B => Some(Self::BusFault),
            0x0C => Some(Self::MemManage),
            0x0D => Some(Self::UsageFault),
            0x0E => Some(Self::Watchdog),
            _ => None,
        }
    }

    /// Word stored in the backup slot.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Report name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FlashWrite => "flash write",
            Self::FlashRead => "flash read",
            Self::SramWrite => "sram write",
            Self::SramRead => "sram read",
            Self::CacheInvalid => "cache invalid",
            Self::EccCorrectable => "ecc correctable",
            Self::EccUncorrectable => "ecc uncorrectable",
            Self::HardFault => "hard fault",
            Self::BusFault => "bus fault",
            Self::MemManage => "memmanage fault",
            Self::UsageFault => "usage fault",
            Self::Watchdog => "watchdog",
        }
    }
}

/// Report name for a raw persisted error word.
#[must_use]
pub const fn error_name(raw: u32) -> &'static str {
    match ErrorCode::from_raw(raw) {
        Some(code) => code.name(),
        None => "unknown",
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

    #[test]
    fn address_tag_on_bank_zero_is_ascii_a() {
        assert_eq!(OperationTag::new(TestKind::Address, 0, 0).raw(), 0x41);
    }

    #[test]
    fn every_tag_decodes() {
        for kind in TestKind::ALL {
            for bank in [0u8, 3, 255] {
                for variant in [0u8, 1, 200] {
                    let tag = OperationTag::new(kind, bank, variant);
                    assert_eq!(tag.decode(), Some((kind, bank, variant)));
                }
            }
        }
    }

    #[test]
    fn none_and_garbage_do_not_decode() {
        assert_eq!(OperationTag::NONE.decode(), None);
        assert_eq!(OperationTag::from_raw(0x5A).decode(), None);
        assert_eq!(OperationTag::from_raw(0x0100_0041).decode(), None);
    }

    #[test]
    fn tag_display_names_the_test() {
        let tag = OperationTag::new(TestKind::Checkerboard, 2, 1);
        assert_eq!(tag.to_string(), "Checkerboard bank 2 pass 1");
        assert_eq!(OperationTag::NONE.to_string(), "none");
    }

    #[test]
    fn kind_indices_follow_all() {
        for (i, kind) in TestKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn error_codes_round_trip() {
        for raw in 0..=0x0Fu32 {
            if let Some(code) = ErrorCode::from_raw(raw) {
                assert_eq!(code.raw(), raw);
            }
        }
        assert_eq!(ErrorCode::EccCorrectable.raw(), 0x06);
        assert_eq!(ErrorCode::from_raw(0x08), None);
        assert_eq!(error_name(0x06), "ecc correctable");
        assert_eq!(error_name(0x99), "unknown");
    }
}
