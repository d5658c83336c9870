//! Boot-time reconciliation and fault-context recording.
//!
//! Restart-and-diagnose is the recovery strategy: a hung test is ended by the
//! supervisory timer, a fatal trap halts until the timer fires, and the next
//! boot reads back what was in flight. Nothing here tries to repair memory.

use core::sync::atomic::{AtomicU32, Ordering};

use platform::{BackupRegisters, EccEvent, EccSeverity, ReportSink, ResetCause, SupervisoryTimer};

use crate::report;
use crate::store::{FaultDiagnosisStore, FaultRecord};
use crate::tag::{error_name, ErrorCode};

/// What the boot-time check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDiagnosis {
    /// The previous session was ended by the supervisory timer. `record` is
    /// the persisted state after the reset counter was bumped.
    SupervisoryReset {
        /// Persisted state as reported.
        record: FaultRecord,
    },
    /// Power-on, pin or brown-out reset. Session fields were cleared.
    CleanStart {
        /// Lifetime supervisory resets, unchanged.
        reset_count: u32,
    },
    /// Anything else. Persisted state left alone.
    Unrecognized {
        /// Raw reset-cause register.
        raw: u32,
    },
}

/// Runs once at boot, before the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashRecoveryMonitor {
    timeout_ms: u32,
}

impl CrashRecoveryMonitor {
    /// Monitor that arms the supervisory timer with `timeout_ms`.
    #[must_use]
    pub const fn new(timeout_ms: u32) -> Self {
        Self { timeout_ms }
    }

    /// Configured supervisory timeout.
    #[must_use]
    pub const fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Start the supervisory timer. From here on the loop must service it.
    pub fn arm_supervisor<T: SupervisoryTimer + ?Sized>(&self, timer: &mut T) {
        timer.configure(self.timeout_ms);
    }

    /// Reconcile persisted state with the reason for this boot.
    pub fn reconcile<B, S>(
        &self,
        cause: ResetCause,
        store: &mut FaultDiagnosisStore<B>,
        sink: &mut S,
    ) -> BootDiagnosis
    where
        B: BackupRegisters,
        S: ReportSink + ?Sized,
    {
        match cause {
            ResetCause::SupervisoryTimeout => {
                store.increment_reset_counter();
                let record = store.read_state();
                report_supervisory_reset(sink, &record);
                BootDiagnosis::SupervisoryReset { record }
            }
            ResetCause::Clean => {
                store.clear_session();
                let reset_count = store.read_state().reset_count;
                sink.write_line("clean start");
                report::emit(sink, format_args!("Total resets: {reset_count}"));
                BootDiagnosis::CleanStart { reset_count }
            }
            ResetCause::Other(raw) => {
                report::emit(
                    sink,
                    format_args!("Unrecognized reset cause: RCC_CSR=0x{raw:08X}"),
                );
                BootDiagnosis::Unrecognized { raw }
            }
        }
    }
}

fn report_supervisory_reset<S: ReportSink + ?Sized>(sink: &mut S, record: &FaultRecord) {
    sink.write_line("SUPERVISORY RESET DETECTED");
    report::emit(sink, format_args!("Total resets: {}", record.reset_count));
    report::emit(sink, format_args!("Last cycle: {}", record.cycle));
    report::emit(
        sink,
        format_args!(
            "Last operation: 0x{:08X} ({})",
            record.operation_tag,
            record.operation()
        ),
    );
    report::emit(
        sink,
        format_args!(
            "Last error: 0x{:08X} ({})",
            record.error_code,
            error_name(record.error_code)
        ),
    );
}

// ── Fault traps ─────────────────────────────────────────────────────────────

/// Cortex-M fault exceptions that end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultTrap {
    /// Escalated or unrecoverable fault.
    HardFault,
    /// Bus error on instruction fetch or data access.
    BusFault,
    /// MPU or execute-never violation.
    MemManage,
    /// Undefined instruction, unaligned access, divide by zero.
    UsageFault,
}

impl FaultTrap {
    /// Code persisted for this trap.
    #[must_use]
    pub const fn error_code(self) -> ErrorCode {
        match self {
            Self::HardFault => ErrorCode::HardFault,
            Self::BusFault => ErrorCode::BusFault,
            Self::MemManage => ErrorCode::MemManage,
            Self::UsageFault => ErrorCode::UsageFault,
        }
    }
}

/// What a handler must do after recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrapDisposition {
    /// Spin until the supervisory timer resets the device.
    Halt,
    /// Return to the interrupted code.
    Resume,
}

/// Persist a fault trap and emit one line. Fault-context safe.
///
/// Every trap halts: the core may be in any state once one fires.
pub fn record_fault_trap<B, S>(
    store: &mut FaultDiagnosisStore<B>,
    trap: FaultTrap,
    sink: &mut S,
) -> TrapDisposition
where
    B: BackupRegisters,
    S: ReportSink + ?Sized,
{
    let code = trap.error_code();
    store.record_error(code);
    let record = store.read_state();
    report::emit(
        sink,
        format_args!(
            "FAULT: {} during {} (cycle {})",
            code.name(),
            record.operation(),
            record.cycle
        ),
    );
    TrapDisposition::Halt
}

// ── ECC events ──────────────────────────────────────────────────────────────

/// ECC event counters shared between the flash interrupt and the test loop.
#[derive(Debug, Default)]
pub struct EccCounters {
    correctable: AtomicU32,
    uncorrectable: AtomicU32,
}

/// Point-in-time copy of [`EccCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EccSnapshot {
    /// Single-bit errors corrected by hardware.
    pub correctable: u32,
    /// Double-bit errors.
    pub uncorrectable: u32,
}

impl EccSnapshot {
    /// Events since `earlier`, tolerating counter wrap.
    #[must_use]
    pub const fn since(&self, earlier: &Self) -> Self {
        Self {
            correctable: self.correctable.wrapping_sub(earlier.correctable),
            uncorrectable: self.uncorrectable.wrapping_sub(earlier.uncorrectable),
        }
    }

    /// Both kinds together.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.correctable.saturating_add(self.uncorrectable)
    }
}

impl EccCounters {
    /// Zeroed counters, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            correctable: AtomicU32::new(0),
            uncorrectable: AtomicU32::new(0),
        }
    }

    /// Count one event.
    pub fn bump(&self, severity: EccSeverity) {
        let counter = match severity {
            EccSeverity::Correctable => &self.correctable,
            EccSeverity::Uncorrectable => &self.uncorrectable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> EccSnapshot {
        EccSnapshot {
            correctable: self.correctable.load(Ordering::Relaxed),
            uncorrectable: self.uncorrectable.load(Ordering::Relaxed),
        }
    }
}

/// Count, persist and report one ECC event. Never halts.
pub fn record_ecc_event<B, S>(
    counters: &EccCounters,
    store: &mut FaultDiagnosisStore<B>,
    event: EccEvent,
    sink: &mut S,
) -> TrapDisposition
where
    B: BackupRegisters,
    S: ReportSink + ?Sized,
{
    counters.bump(event.severity);
    let (code, label) = match event.severity {
        EccSeverity::Correctable => (ErrorCode::EccCorrectable, "Correctable"),
        EccSeverity::Uncorrectable => (ErrorCode::EccUncorrectable, "Uncorrectable"),
    };
    store.record_error(code);
    report::emit(
        sink,
        format_args!("Flash ECC {label} Error Detected at 0x{:08X}", event.address),
    );
    TrapDisposition::Resume
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

    fn store(op: u32, cycle: u32, err: u32, resets: u32) -> FaultDiagnosisStore<MockBackupRegisters> {
        FaultDiagnosisStore::new(MockBackupRegisters::with_values(op, cycle, err, resets))
    }

    #[test]
    fn arm_configures_timer() {
        let mut wd = MockSupervisor::new();
        CrashRecoveryMonitor::new(2_000).arm_supervisor(&mut wd);
        assert_eq!(wd.timeout_ms(), Some(2_000));
    }

    #[test]
    fn supervisory_reset_keeps_an_empty_error_slot_empty() {
        let mut s = store(0x0143, 5, 0, 0);
        let mut rec = LineRecorder::new();
        CrashRecoveryMonitor::new(2_000).reconcile(ResetCause::SupervisoryTimeout, &mut s, &mut rec);
        assert!(rec.contains("Last error: 0x00000000 (none)"));
        let r = s.read_state();
        assert_eq!(r.error_code, 0);
        assert_eq!(r.reset_count, 1);
        assert_eq!(r.operation_tag, 0x0143);
    }

    #[test]
    fn unrecognized_cause_leaves_store_alone() {
        let mut s = store(0x41, 37, 6, 2);
        let mut rec = LineRecorder::new();
        let d = CrashRecoveryMonitor::new(2_000).reconcile(ResetCause::Other(0x1000_0000), &mut s, &mut rec);
        assert_eq!(d, BootDiagnosis::Unrecognized { raw: 0x1000_0000 });
        assert_eq!(s.registers().write_count(), 0);
        assert!(rec.contains("RCC_CSR=0x10000000"));
    }

    #[test]
    fn every_trap_halts_and_is_persisted() {
        for trap in [
            FaultTrap::HardFault,
            FaultTrap::BusFault,
            FaultTrap::MemManage,
            FaultTrap::UsageFault,
        ] {
            let mut s = store(0x0241, 8, 0, 0);
            let mut rec = LineRecorder::new();
            assert_eq!(record_fault_trap(&mut s, trap, &mut rec), TrapDisposition::Halt);
            let r = s.read_state();
            assert_eq!(r.error(), Some(trap.error_code()));
            assert_eq!((r.operation_tag, r.cycle), (0x0241, 8));
            assert!(rec.contains("during Address bank 2 pass 0 (cycle 8)"));
        }
    }

    #[test]
    fn ecc_event_is_counted_persisted_and_resumes() {
        static COUNTERS: EccCounters = EccCounters::new();
        let mut s = store(0, 0, 0, 0);
        let mut rec = LineRecorder::new();
        let event = EccEvent {
            severity: EccSeverity::Uncorrectable,
            address: 0x0804_1230,
        };
        assert_eq!(
            record_ecc_event(&COUNTERS, &mut s, event, &mut rec),
            TrapDisposition::Resume
        );
        assert_eq!(COUNTERS.snapshot().uncorrectable, 1);
        assert_eq!(s.read_state().error(), Some(ErrorCode::EccUncorrectable));
        assert!(rec.contains("Flash ECC Uncorrectable Error Detected at 0x08041230"));
    }

    #[test]
    fn snapshot_delta_handles_wrap() {
        let before = EccSnapshot {
            correctable: u32::MAX,
            uncorrectable: 0,
        };
        let after = EccSnapshot {
            correctable: 1,
            uncorrectable: 3,
        };
        assert_eq!(
            after.since(&before),
            EccSnapshot {
                correctable: 2,
                uncorrectable: 3
            }
        );
    }
}
