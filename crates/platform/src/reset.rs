//! Reset-cause classification.
//!
//! The boot-time recovery logic only needs to know which of three situations
//! it is in. The raw hardware flags are decoded here so the decision is a pure,
//! host-testable function.
//!
//! # RCC_CSR reset flags (STM32G4, RM0440 §7.4.29)
//!
//! | Bit | Flag       | Meaning                          |
//! |-----|------------|----------------------------------|
//! | 31  | LPWRRSTF   | Illegal low-power entry          |
//! | 30  | WWDGRSTF   | Window watchdog                  |
//! | 29  | IWDGRSTF   | Independent watchdog             |
//! | 28  | SFTRSTF    | Software (`SYSRESETREQ`)         |
//! | 27  | BORRSTF    | Brown-out / power-on             |
//! | 26  | PINRSTF    | NRST pin                         |
//! | 25  | OBLRSTF    | Option byte loader               |

/// `RCC_CSR.LPWRRSTF`
pub const CSR_LPWRRSTF: u32 = 1 << 31;
/// `RCC_CSR.WWDGRSTF`
pub const CSR_WWDGRSTF: u32 = 1 << 30;
/// `RCC_CSR.IWDGRSTF`
pub const CSR_IWDGRSTF: u32 = 1 << 29;
/// `RCC_CSR.SFTRSTF`
pub const CSR_SFTRSTF: u32 = 1 << 28;
/// `RCC_CSR.BORRSTF`
pub const CSR_BORRSTF: u32 = 1 << 27;
/// `RCC_CSR.PINRSTF`
pub const CSR_PINRSTF: u32 = 1 << 26;
/// `RCC_CSR.OBLRSTF`
pub const CSR_OBLRSTF: u32 = 1 << 25;
/// `RCC_CSR.RMVF`: write 1 to clear every reset flag.
pub const CSR_RMVF: u32 = 1 << 23;

/// Mask of every reset flag bit.
pub const CSR_RESET_FLAGS: u32 = CSR_LPWRRSTF
    | CSR_WWDGRSTF
    | CSR_IWDGRSTF
    | CSR_SFTRSTF
    | CSR_BORRSTF
    | CSR_PINRSTF
    | CSR_OBLRSTF;

/// Why the device restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    /// The supervisory timer (or the window watchdog) forced the restart:
    /// the previous session hung or deliberately halted after a fault trap.
    SupervisoryTimeout,
    /// Power-on, brown-out, or external pin reset with no watchdog involvement.
    Clean,
    /// Any other combination. Carries the raw flag word for reporting.
    Other(u32),
}

impl ResetCause {
    /// Classify the reset flags of `RCC_CSR`.
    ///
    /// Watchdog flags win over everything else: the NRST pin is driven low by
    /// the watchdog reset itself, so PINRSTF is always set alongside IWDGRSTF.
    #[must_use]
    pub const fn from_rcc_csr(csr: u32) -> Self {
        let flags = csr & CSR_RESET_FLAGS;
        if flags & (CSR_IWDGRSTF | CSR_WWDGRSTF) != 0 {
            Self::SupervisoryTimeout
        } else if flags & (CSR_SFTRSTF | CSR_LPWRRSTF | CSR_OBLRSTF) != 0 {
            Self::Other(csr)
        } else if flags & (CSR_PINRSTF | CSR_BORRSTF) != 0 {
            Self::Clean
        } else {
            Self::Other(csr)
        }
    }

    /// Short label used in boot reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SupervisoryTimeout => "supervisory timeout",
            Self::Clean => "clean start",
            Self::Other(_) => "unrecognized",
        }
    }
}

/// Source of the hardware reset-cause indicator.
pub trait ResetCauseSource {
    /// Read the raw indicator and clear it so the next boot sees fresh flags.
    fn take_raw(&mut self) -> u32;

    /// Read, clear and classify.
    fn take_cause(&mut self) -> ResetCause {
        ResetCause::from_rcc_csr(self.take_raw())
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn iwdg_with_pin_is_supervisory() {
        assert_eq!(
            ResetCause::from_rcc_csr(CSR_IWDGRSTF | CSR_PINRSTF),
            ResetCause::SupervisoryTimeout
        );
    }

    #[test]
    fn wwdg_is_supervisory() {
        assert_eq!(
            ResetCause::from_rcc_csr(CSR_WWDGRSTF),
            ResetCause::SupervisoryTimeout
        );
    }

    #[test]
    fn power_on_is_clean() {
        assert_eq!(
            ResetCause::from_rcc_csr(CSR_BORRSTF | CSR_PINRSTF),
            ResetCause::Clean
        );
        assert_eq!(ResetCause::from_rcc_csr(CSR_PINRSTF), ResetCause::Clean);
    }

    #[test]
    fn software_reset_is_reported_raw() {
        let csr = CSR_SFTRSTF | CSR_PINRSTF;
        assert_eq!(ResetCause::from_rcc_csr(csr), ResetCause::Other(csr));
    }

    #[test]
    fn no_flags_is_reported_raw() {
        assert_eq!(ResetCause::from_rcc_csr(0), ResetCause::Other(0));
    }

    #[test]
    fn non_flag_bits_do_not_change_classification() {
        // LSI enable/ready bits live in the low half of RCC_CSR.
        assert_eq!(
            ResetCause::from_rcc_csr(CSR_PINRSTF | 0x0000_0003),
            ResetCause::Clean
        );
    }

    struct FakeCsr(u32);

    impl ResetCauseSource for FakeCsr {
        fn take_raw(&mut self) -> u32 {
            core::mem::take(&mut self.0)
        }
    }

    #[test]
    fn take_cause_clears_the_source() {
        let mut csr = FakeCsr(CSR_IWDGRSTF);
        assert_eq!(csr.take_cause(), ResetCause::SupervisoryTimeout);
        assert_eq!(csr.take_cause(), ResetCause::Other(0));
    }
}
