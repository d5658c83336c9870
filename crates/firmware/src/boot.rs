//! Hardware boot sequence for the memory diagnostic firmware.
//!
//! Initialization order (MUST be respected):
//!   1. Configure clocks via `embassy_stm32::init` with the backup domain untouched
//!   2. Open the backup domain (PWR/RTCAPB clocks, DBP)
//!   3. Latch and clear the reset cause from RCC_CSR
//!   4. Arm the independent watchdog
//!   5. Reconcile the persisted session against the reset cause
//!   6. Enable fault traps and the flash ECC interrupt
//!   7. Hand the peripherals to the coverage scheduler
//!
//! Steps 3 to 5 are generic over the [`platform`] traits so they run on the
//! host against the mocks; only the register plumbing is target-specific.

use memtest::{
    BootDiagnosis, CoverageConfig, CrashRecoveryMonitor, FaultDiagnosisStore, TestMode,
};
use platform::watchdog::DEFAULT_TIMEOUT_MS;
use platform::{
    iwdg_timing, BackupRegisters, IwdgTiming, ReportSink, ResetCause, ResetCauseSource,
    SupervisoryTimer,
};

/// Ordered list of boot sequence steps for documentation and testing.
///
/// # Correctness Invariants
///
/// - RCC_CSR must be read before the watchdog is armed, or a watchdog reset
///   during bring-up would be indistinguishable from a clean one.
/// - `embassy_stm32::init` must not reset the backup domain: the RTC clock
///   source stays disabled so the four TAMP slots survive.
/// - The watchdog is armed before reconciliation so a hang while reporting is
///   itself caught.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. Clocks: embassy_stm32::init with RTC clock disabled (backup domain kept)",
    "2. Backup domain: enable PWR + RTCAPB clocks, set PWR_CR1.DBP",
    "3. RCC_CSR: latch and clear the reset cause",
    "4. IWDG: arm the supervisory timer",
    "5. Reconcile: classify the reset, update the TAMP backup slots",
    "6. Traps: enable MemManage/BusFault/UsageFault and the FLASH ECC interrupt",
    "7. Scheduler: run diagnostic cycles forever",
];

/// Supervisory timeout used on the target.
pub const WATCHDOG_TIMEOUT_MS: u32 = DEFAULT_TIMEOUT_MS;

/// Same timeout in microseconds, as `embassy_stm32::wdg` expects.
pub const WATCHDOG_TIMEOUT_US: u32 = WATCHDOG_TIMEOUT_MS.saturating_mul(1_000);

/// Test selection compiled into the firmware image.
pub const TEST_MODE: TestMode = TestMode::Normal;

/// IWDG prescaler and reload that realise [`WATCHDOG_TIMEOUT_MS`].
#[must_use]
pub fn watchdog_timing() -> IwdgTiming {
    iwdg_timing(WATCHDOG_TIMEOUT_MS)
}

/// Coverage configuration the firmware runs with.
#[must_use]
pub fn coverage_config() -> CoverageConfig {
    CoverageConfig::stm32g473().with_mode(TEST_MODE)
}

/// What the boot-time recovery found.
#[derive(Debug)]
pub struct BootOutcome<B> {
    /// Classified reset cause.
    pub cause: ResetCause,
    /// Reconciliation result.
    pub diagnosis: BootDiagnosis,
    /// Store over the backup slots, ready for the scheduler.
    pub store: FaultDiagnosisStore<B>,
}

/// Boot steps 3 to 5: take the reset cause, arm the supervisory timer
/// and reconcile the persisted session.
pub fn recover_session<R, B, T, S>(
    reset: &mut R,
    backup: B,
    timer: &mut T,
    sink: &mut S,
) -> BootOutcome<B>
where
    R: ResetCauseSource + ?Sized,
    B: BackupRegisters,
    T: SupervisoryTimer + ?Sized,
    S: ReportSink + ?Sized,
{
    let cause = reset.take_cause();

    #[cfg(feature = "defmt")]
    defmt::info!("reset cause: {=str}", cause.label());
    #[cfg(feature = "tracing")]
    tracing::info!(cause = cause.label(), "reset cause");

    let monitor = CrashRecoveryMonitor::new(WATCHDOG_TIMEOUT_MS);
    monitor.arm_supervisor(timer);

    #[cfg(feature = "defmt")]
    defmt::info!("IWDG watchdog armed: timeout={=u32}ms", WATCHDOG_TIMEOUT_MS);
    #[cfg(feature = "tracing")]
    tracing::info!(timeout_ms = WATCHDOG_TIMEOUT_MS, "supervisory timer armed");

    let mut store = FaultDiagnosisStore::new(backup);
    let diagnosis = monitor.reconcile(cause, &mut store, sink);

    BootOutcome {
        cause,
        diagnosis,
        store,
    }
}

// ── RCC clock configuration ───────────────────────────────────────────────────

/// Build the `embassy_stm32::Config` for the diagnostic firmware.
///
/// The default G4 clock tree (HSI16, no PLL) is kept: the tests are bound by
/// memory latency, not core speed, and the slower clock keeps one cycle well
/// inside the watchdog window. The RTC clock source is left disabled so
/// `embassy_stm32::init` never resets the backup domain holding the session.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    let mut config = embassy_stm32::Config::default();
    config.rcc.ls = embassy_stm32::rcc::LsConfig::off();
    config
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
    use platform::mocks::{LineRecorder, MockBackupRegisters, MockSupervisor};
    use platform::reset::{CSR_IWDGRSTF, CSR_PINRSTF, CSR_RMVF};

    /// RCC_CSR stand-in: reading clears the flags like RMVF does.
    struct CsrLatch(u32);

    impl ResetCauseSource for CsrLatch {
        fn take_raw(&mut self) -> u32 {
            core::mem::replace(&mut self.0, 0)
        }
    }

    fn position(prefix: &str) -> usize {
        BOOT_SEQUENCE_STEPS
            .iter()
            .position(|s| s.contains(prefix))
            .unwrap()
    }

    #[test]
    fn test_boot_reset_cause_is_read_before_watchdog() {
        assert!(position("RCC_CSR") < position("IWDG"));
        assert!(position("Clocks") < position("RCC_CSR"));
    }

    #[test]
    fn test_boot_watchdog_armed_before_reconcile() {
        assert!(position("IWDG") < position("Reconcile"));
        assert!(position("Backup domain") < position("Reconcile"));
    }

    #[test]
    fn test_boot_sequence_is_numbered_in_order() {
        for (i, step) in BOOT_SEQUENCE_STEPS.iter().enumerate() {
            assert!(step.starts_with(&format!("{}. ", i + 1)), "{step}");
        }
    }

    #[test]
    fn test_watchdog_timing_covers_timeout() {
        let t = watchdog_timing();
        assert!(t.timeout_ms() >= WATCHDOG_TIMEOUT_MS);
        assert!(t.timeout_ms() < WATCHDOG_TIMEOUT_MS * 2);
        assert_eq!(WATCHDOG_TIMEOUT_US, 2_000_000);
    }

    #[test]
    fn test_firmware_config_is_the_reference_layout() {
        let cfg = coverage_config();
        assert_eq!(cfg.mode, TestMode::Normal);
        assert_eq!(cfg.banks.len(), 4);
    }

    #[test]
    fn test_recover_session_after_watchdog_reset() {
        let mut csr = CsrLatch(CSR_IWDGRSTF | CSR_PINRSTF);
        let mut timer = MockSupervisor::new();
        let mut sink = LineRecorder::new();

        let outcome = recover_session(
            &mut csr,
            MockBackupRegisters::with_values(0x0141, 12, 0, 2),
            &mut timer,
            &mut sink,
        );

        assert_eq!(outcome.cause, ResetCause::SupervisoryTimeout);
        assert!(matches!(
            outcome.diagnosis,
            BootDiagnosis::SupervisoryReset { .. }
        ));
        assert_eq!(outcome.store.read_state().reset_count, 3);
        assert_eq!(timer.timeout_ms(), Some(WATCHDOG_TIMEOUT_MS));
        assert_eq!(csr.0, 0, "reset flags must be consumed");
    }

    #[test]
    fn test_recover_session_after_power_on() {
        let mut csr = CsrLatch(CSR_PINRSTF | CSR_RMVF);
        let mut timer = MockSupervisor::new();
        let mut sink = LineRecorder::new();

        let outcome = recover_session(
            &mut csr,
            MockBackupRegisters::with_values(0x0141, 12, 4, 2),
            &mut timer,
            &mut sink,
        );

        assert_eq!(outcome.cause, ResetCause::Clean);
        assert_eq!(outcome.store.into_inner().raw(), [0, 0, 0, 2]);
        assert!(sink.contains("clean start"));
    }
}
