//! Desktop emulator: the diagnostic engine on simulated memory.
//!
//! Same scheduler, same boot recovery, same configuration as the target.
//! The banks live in a [`SimulatedMemory`], flash in a [`MockFlash`], and
//! report lines go to `tracing` under the `memtest::report` target.

use memtest::{Board, CoverageConfig, CoverageScheduler, FaultDiagnosisStore};
use platform::memory_map as map;
use platform::mocks::{MockBackupRegisters, MockFlash, MockSupervisor, SimulatedMemory};
use platform::{ReportSink, ResetCauseSource};

/// Report lines as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn write_line(&mut self, line: &str) {
        tracing::info!(target: "memtest::report", "{line}");
    }
}

/// Host stand-ins for every role.
pub enum EmulatorBoard {}

impl Board for EmulatorBoard {
    type Memory = SimulatedMemory;
    type Flash = MockFlash;
    type Backup = MockBackupRegisters;
    type Timer = MockSupervisor;
    type Sink = TracingSink;
}

/// A reset-flag word delivered once, as RCC_CSR would after RMVF.
#[derive(Debug, Clone, Copy)]
pub struct LatchedCause(pub u32);

impl ResetCauseSource for LatchedCause {
    fn take_raw(&mut self) -> u32 {
        core::mem::replace(&mut self.0, 0)
    }
}

/// SRAM1, SRAM2 and CCM SRAM of the reference target.
#[must_use]
pub fn simulated_target() -> SimulatedMemory {
    SimulatedMemory::new()
        .with_region(map::SRAM1_BASE, map::SRAM1_SIZE)
        .with_region(map::SRAM2_BASE, map::SRAM2_SIZE)
        .with_region(map::CCM_BASE, map::CCM_SIZE)
}

/// Whole flash array, erased.
#[must_use]
pub fn simulated_flash() -> MockFlash {
    MockFlash::new(usize::try_from(map::FLASH_SIZE).unwrap_or(0))
}

/// Scheduler over fresh simulated memory, continuing the recovered session.
#[must_use]
pub fn build_scheduler(
    config: CoverageConfig,
    memory: SimulatedMemory,
    store: FaultDiagnosisStore<MockBackupRegisters>,
    timer: MockSupervisor,
) -> CoverageScheduler<EmulatorBoard> {
    CoverageScheduler::new(config, memory, simulated_flash(), store, timer, TracingSink)
}

/// Backup slots as they would survive a reset of `scheduler`'s device.
#[must_use]
pub fn surviving_backup(scheduler: &CoverageScheduler<EmulatorBoard>) -> MockBackupRegisters {
    scheduler.store().registers().clone()
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
    use crate::boot::{coverage_config, recover_session, WATCHDOG_TIMEOUT_MS};
    use memtest::{BootDiagnosis, EccSnapshot};
    use platform::reset::{CSR_IWDGRSTF, CSR_PINRSTF};

    #[test]
    fn test_emulated_session_survives_a_hang() {
        let mut timer = MockSupervisor::new();
        let boot = recover_session(
            &mut LatchedCause(CSR_PINRSTF),
            MockBackupRegisters::new(),
            &mut timer,
            &mut TracingSink,
        );
        assert_eq!(timer.timeout_ms(), Some(WATCHDOG_TIMEOUT_MS));

        let mut scheduler =
            build_scheduler(coverage_config(), simulated_target(), boot.store, timer);
        for _ in 0..12 {
            scheduler.run_cycle(0, EccSnapshot::default());
        }
        assert_eq!(scheduler.timer().services(), 12);
        assert_eq!(scheduler.memory().out_of_range(), 0);

        let backup = surviving_backup(&scheduler);
        let mut timer = MockSupervisor::new();
        let reboot = recover_session(
            &mut LatchedCause(CSR_IWDGRSTF | CSR_PINRSTF),
            backup,
            &mut timer,
            &mut TracingSink,
        );

        let BootDiagnosis::SupervisoryReset { record } = reboot.diagnosis else {
            panic!("expected supervisory reset, got {:?}", reboot.diagnosis);
        };
        assert_eq!(record.cycle, 12);
        assert_eq!(record.reset_count, 1);
        assert_eq!(reboot.store.read_state().error_code, 0);
    }

    #[test]
    fn test_latched_cause_reads_once() {
        let mut latch = LatchedCause(CSR_IWDGRSTF);
        assert_eq!(latch.take_raw(), CSR_IWDGRSTF);
        assert_eq!(latch.take_raw(), 0);
    }
}
