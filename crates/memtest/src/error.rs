//! Error types.
//!
//! Only flash operations can fail as operations; RAM mismatches are counted,
//! not returned as errors.

use embedded_storage::nor_flash::NorFlashErrorKind;

/// Flash operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashStage {
    /// Page erase.
    Erase,
    /// Double-word program.
    Program,
    /// Read-back through the driver.
    Read,
}

impl FlashStage {
    /// Report name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Erase => "erase",
            Self::Program => "program",
            Self::Read => "read",
        }
    }
}

/// A flash transaction failure: the operation itself failed, as opposed to
/// completing with wrong data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashTestError {
    /// Which step failed.
    pub stage: FlashStage,
    /// Absolute address of the failing operation.
    pub address: u32,
    /// Driver error category.
    pub kind: NorFlashErrorKind,
}

impl FlashTestError {
    /// Short name of the driver error category.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self.kind {
            NorFlashErrorKind::NotAligned => "not aligned",
            NorFlashErrorKind::OutOfBounds => "out of bounds",
            _ => "controller error",
        }
    }
}

impl core::fmt::Display for FlashTestError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Flash {} failed at 0x{:08X}: {}",
            self.stage.label(),
            self.address,
            self.kind_label()
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashTestError {}

#[cfg(feature = "defmt")]
impl defmt::Format for FlashTestError {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(
            f,
            "flash {} failed at {=u32:#010x}: {}",
            self.stage.label(),
            self.address,
            self.kind_label()
        );
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_address() {
        let e = FlashTestError {
            stage: FlashStage::Erase,
            address: 0x0804_1000,
            kind: NorFlashErrorKind::Other,
        };
        assert_eq!(
            e.to_string(),
            "Flash erase failed at 0x08041000: controller error"
        );
    }

    #[test]
    fn alignment_errors_are_named() {
        let e = FlashTestError {
            stage: FlashStage::Program,
            address: 0x0804_0003,
            kind: NorFlashErrorKind::NotAligned,
        };
        assert_eq!(e.kind_label(), "not aligned");
    }
}
