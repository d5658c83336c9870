//! Property-based tests for the register-level decoding helpers.
//! Verifies invariants hold for ALL register values, not just fixed examples.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use platform::flash::{EccEvent, ECCR_ECCC, ECCR_ECCD};
use platform::reset::{CSR_IWDGRSTF, CSR_WWDGRSTF};
use platform::{align_down, align_up, iwdg_timing, ResetCause};

proptest::proptest! {
    /// Any requested timeout up to the hardware maximum is honoured.
    #[test]
    fn iwdg_timeout_covers_request(ms in 1u32..=32_768u32) {
        let t = iwdg_timing(ms);
        assert!(t.timeout_ms() >= ms, "requested {} ms, got {} ms", ms, t.timeout_ms());
        assert!(t.reload <= 0x0FFF);
        assert!(t.prescaler <= 6);
    }

    /// The chosen prescaler is the smallest that fits, so resolution is best.
    #[test]
    fn iwdg_prescaler_is_minimal(ms in 1u32..=32_768u32) {
        let t = iwdg_timing(ms);
        if t.prescaler > 0 {
            let finer = (u64::from(ms) * 32).div_ceil(u64::from(t.divider() / 2));
            assert!(finer > 0x1000, "{} ms would fit a finer prescaler", ms);
        }
    }

    /// Any word with a watchdog flag set is a supervisory reset.
    #[test]
    fn watchdog_flag_always_supervisory(raw in 0u32..=u32::MAX) {
        let csr = raw | CSR_IWDGRSTF;
        assert_eq!(ResetCause::from_rcc_csr(csr), ResetCause::SupervisoryTimeout);
        let csr = (raw & !CSR_IWDGRSTF) | CSR_WWDGRSTF;
        assert_eq!(ResetCause::from_rcc_csr(csr), ResetCause::SupervisoryTimeout);
    }

    /// ECC addresses are a bounded offset from the flash base.
    #[test]
    fn ecc_address_is_offset_from_base(raw in 0u32..=u32::MAX) {
        if let Some(ev) = EccEvent::from_eccr(raw | ECCR_ECCC, 0x0800_0000) {
            assert!(ev.address >= 0x0800_0000);
            assert!(ev.address <= 0x0800_0000 + 0x0004_0000 + 0x0007_FFFF);
        }
        assert!(EccEvent::from_eccr(raw & !(ECCR_ECCC | ECCR_ECCD), 0x0800_0000).is_none());
    }

    /// Alignment helpers bracket the value within one word.
    #[test]
    fn alignment_brackets_value(v in 0u32..=0xFFFF_FFF0u32) {
        let lo = align_down(v);
        let hi = align_up(v);
        assert!(lo <= v && v <= hi);
        assert!(hi - lo <= 4);
        assert_eq!(lo % 4, 0);
        assert_eq!(hi % 4, 0);
    }
}
