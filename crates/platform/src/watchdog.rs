//! Supervisory timer abstraction and IWDG timing math.
//!
//! The independent watchdog runs from the ~32 kHz LSI oscillator, so it keeps
//! counting even if the main clock tree is wedged. Once started it cannot be
//! stopped: the test loop must call [`SupervisoryTimer::service`] at least
//! once per timeout window or the MCU resets.

/// Watchdog-like timer that forces a restart when not serviced in time.
pub trait SupervisoryTimer {
    /// Configure the timeout and start the timer. Called once at startup.
    fn configure(&mut self, timeout_ms: u32);

    /// Reload the countdown. Must be called at least once per timeout window.
    fn service(&mut self);
}

impl<T: SupervisoryTimer + ?Sized> SupervisoryTimer for &mut T {
    fn configure(&mut self, timeout_ms: u32) {
        (**self).configure(timeout_ms);
    }

    fn service(&mut self) {
        (**self).service();
    }
}

/// Nominal LSI frequency feeding the IWDG counter.
pub const LSI_HZ: u32 = 32_000;

/// Largest value of the 12-bit IWDG reload register.
pub const IWDG_MAX_RELOAD: u16 = 0x0FFF;

/// Largest IWDG_PR encoding (divider /256).
pub const IWDG_MAX_PRESCALER: u8 = 6;

/// Default supervisory timeout used by the firmware.
///
/// One diagnostic cycle on the reference target takes well under a second
/// with the default window sizes; two seconds leaves room for the large tier.
pub const DEFAULT_TIMEOUT_MS: u32 = 2_000;

/// Register values for the independent watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IwdgTiming {
    /// IWDG_PR encoding: divider is `4 << prescaler`.
    pub prescaler: u8,
    /// IWDG_RLR value (12 bits).
    pub reload: u16,
}

impl IwdgTiming {
    /// Clock divider selected by `prescaler`.
    #[must_use]
    pub const fn divider(self) -> u32 {
        4u32.wrapping_shl(self.prescaler as u32)
    }

    /// Effective timeout in milliseconds at the nominal LSI frequency.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Safety: range-checked against u32::MAX above the cast
    pub const fn timeout_ms(self) -> u32 {
        let ticks = (self.reload as u64).saturating_add(1);
        let ms = ticks
            .saturating_mul(self.divider() as u64)
            .saturating_mul(1_000)
            / LSI_HZ as u64;
        if ms > u32::MAX as u64 {
            u32::MAX
        } else {
            ms as u32
        }
    }
}

/// Compute the smallest prescaler and matching reload that cover `timeout_ms`.
///
/// Requests beyond the hardware maximum (~32.7 s) clamp to `/256` with a full
/// reload; a zero request clamps to the shortest possible timeout.
#[must_use]
pub fn iwdg_timing(timeout_ms: u32) -> IwdgTiming {
    let ticks_per_ms = u64::from(LSI_HZ / 1_000);
    let wanted = u64::from(timeout_ms.max(1)).saturating_mul(ticks_per_ms);

    for prescaler in 0..=IWDG_MAX_PRESCALER {
        let divider = 4u64.wrapping_shl(u32::from(prescaler));
        let ticks = wanted.div_ceil(divider);
        if ticks <= u64::from(IWDG_MAX_RELOAD).saturating_add(1) {
            let reload = ticks.saturating_sub(1).max(1);
            return IwdgTiming {
                prescaler,
                reload: u16::try_from(reload).unwrap_or(IWDG_MAX_RELOAD),
            };
        }
    }

    IwdgTiming {
        prescaler: IWDG_MAX_PRESCALER,
        reload: IWDG_MAX_RELOAD,
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn two_seconds_fits_with_divider_16() {
        let t = iwdg_timing(2_000);
        assert_eq!(t.divider(), 16);
        assert_eq!(t.reload, 3_999);
        assert_eq!(t.timeout_ms(), 2_000);
    }

    #[test]
    fn timeout_never_shorter_than_requested() {
        for ms in [1, 7, 100, 512, 1_000, 2_000, 8_000, 30_000] {
            let t = iwdg_timing(ms);
            assert!(
                t.timeout_ms() >= ms,
                "requested {} ms, got {} ms",
                ms,
                t.timeout_ms()
            );
        }
    }

    #[test]
    fn oversized_request_clamps_to_hardware_maximum() {
        let t = iwdg_timing(60_000);
        assert_eq!(t.prescaler, IWDG_MAX_PRESCALER);
        assert_eq!(t.reload, IWDG_MAX_RELOAD);
        assert_eq!(t.timeout_ms(), 32_768);
    }

    #[test]
    fn zero_request_is_not_zero_reload() {
        let t = iwdg_timing(0);
        assert!(t.reload >= 1);
    }
}
