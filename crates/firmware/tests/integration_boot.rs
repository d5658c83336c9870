//! Integration test: boot, run, fault, reboot on host mocks.
//!
//! Drives the same entry points the hardware `main` and exception handlers
//! use (`boot::recover_session`, `on_fault_trap`, `on_ecc_status`) through
//! several simulated power cycles, carrying only the backup slots across.
//!
//! Does NOT require physical hardware.
//!
//! Run with: cargo test -p firmware --test integration_boot
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use firmware::boot::{coverage_config, recover_session, WATCHDOG_TIMEOUT_MS};
use firmware::exception_handlers::{on_ecc_status, on_fault_trap};
use memtest::{
    Board, BootDiagnosis, CoverageScheduler, EccCounters, ErrorCode, FaultTrap, OperationTag,
    TestKind, TestMode, TrapDisposition,
};
use platform::flash::{ECCR_BK_ECC, ECCR_ECCC};
use platform::memory_map as map;
use platform::mocks::{
    LineRecorder, MockBackupRegisters, MockFlash, MockSupervisor, SimulatedMemory,
};
use platform::reset::{CSR_BORRSTF, CSR_IWDGRSTF, CSR_PINRSTF};
use platform::ResetCauseSource;

struct Host;

impl Board for Host {
    type Memory = SimulatedMemory;
    type Flash = MockFlash;
    type Backup = MockBackupRegisters;
    type Timer = MockSupervisor;
    type Sink = LineRecorder;
}

struct Csr(u32);

impl ResetCauseSource for Csr {
    fn take_raw(&mut self) -> u32 {
        std::mem::take(&mut self.0)
    }
}

fn target_memory() -> SimulatedMemory {
    SimulatedMemory::new()
        .with_region(map::SRAM1_BASE, map::SRAM1_SIZE)
        .with_region(map::SRAM2_BASE, map::SRAM2_SIZE)
        .with_region(map::CCM_BASE, map::CCM_SIZE)
}

/// One power cycle: boot with `csr`, then run `cycles` cycles.
fn power_cycle(
    csr: u32,
    backup: MockBackupRegisters,
    mode: TestMode,
    cycles: u32,
) -> (BootDiagnosis, LineRecorder, CoverageScheduler<Host>) {
    let mut timer = MockSupervisor::new();
    let mut boot_log = LineRecorder::new();
    let outcome = recover_session(&mut Csr(csr), backup, &mut timer, &mut boot_log);
    assert_eq!(timer.timeout_ms(), Some(WATCHDOG_TIMEOUT_MS));

    let mut scheduler = CoverageScheduler::<Host>::new(
        coverage_config().with_mode(mode),
        target_memory(),
        MockFlash::new(usize::try_from(map::FLASH_SIZE).unwrap()),
        outcome.store,
        timer,
        LineRecorder::new(),
    );
    for _ in 0..cycles {
        scheduler.run_cycle(0, memtest::EccSnapshot::default());
    }
    (outcome.diagnosis, boot_log, scheduler)
}

// ─── Reset sequences ─────────────────────────────────────────────────────────

#[test]
fn power_on_then_two_watchdog_resets_count_up() {
    let (d, _, s) = power_cycle(
        CSR_BORRSTF | CSR_PINRSTF,
        MockBackupRegisters::new(),
        TestMode::SramOnly,
        2,
    );
    assert_eq!(d, BootDiagnosis::CleanStart { reset_count: 0 });

    let (d, log, s) = power_cycle(
        CSR_IWDGRSTF | CSR_PINRSTF,
        s.store().registers().clone(),
        TestMode::SramOnly,
        3,
    );
    let BootDiagnosis::SupervisoryReset { record } = d else {
        panic!("{d:?}");
    };
    assert_eq!(record.cycle, 2);
    assert_eq!(record.reset_count, 1);
    assert!(log.contains("SUPERVISORY RESET DETECTED"));
    assert!(log.contains("Last error: 0x00000000 (none)"));

    // The cycle counter restarts with the session; the reset count does not.
    let (d, _, _) = power_cycle(
        CSR_IWDGRSTF | CSR_PINRSTF,
        s.store().registers().clone(),
        TestMode::SramOnly,
        0,
    );
    let BootDiagnosis::SupervisoryReset { record } = d else {
        panic!("{d:?}");
    };
    assert_eq!(record.cycle, 3);
    assert_eq!(record.reset_count, 2);
}

#[test]
fn clean_start_after_faulty_session_keeps_only_the_counter() {
    let backup = MockBackupRegisters::with_values(0x0141, 99, ErrorCode::BusFault.raw(), 4);
    let (d, log, s) = power_cycle(CSR_PINRSTF, backup, TestMode::SramOnly, 0);
    assert_eq!(d, BootDiagnosis::CleanStart { reset_count: 4 });
    assert!(log.contains("clean start"));
    assert_eq!(s.store().registers().raw(), [0, 0, 0, 4]);
}

// ─── Fault traps ─────────────────────────────────────────────────────────────

#[test]
fn trap_mid_session_is_reported_on_next_boot() {
    // Cycle 4 is a basic-only cycle in sram-only mode.
    let (_, _, mut s) = power_cycle(CSR_PINRSTF, MockBackupRegisters::new(), TestMode::SramOnly, 4);
    let last = s.store().read_state().operation();
    assert_eq!(last, OperationTag::new(TestKind::Checkerboard, 3, 1));

    // A bus fault fires; the handler sees the same backup registers.
    let mut backup = s.store().registers().clone();
    let disposition = on_fault_trap(&mut backup, FaultTrap::BusFault, s.sink_mut());
    assert_eq!(disposition, TrapDisposition::Halt);
    assert!(s
        .sink()
        .contains("FAULT: bus fault during Checkerboard bank 3 pass 1 (cycle 4)"));

    let (d, log, _) = power_cycle(CSR_IWDGRSTF | CSR_PINRSTF, backup, TestMode::SramOnly, 0);
    let BootDiagnosis::SupervisoryReset { record } = d else {
        panic!("{d:?}");
    };
    assert_eq!(record.error(), Some(ErrorCode::BusFault));
    assert_eq!(record.cycle, 4);
    assert!(log.contains("Last error: 0x0000000B (bus fault)"));
}

// ─── ECC ─────────────────────────────────────────────────────────────────────

#[test]
fn ecc_interrupts_feed_the_flash_bank_statistics() {
    let counters = EccCounters::new();
    let (_, _, mut s) =
        power_cycle(CSR_PINRSTF, MockBackupRegisters::new(), TestMode::FlashOnly, 1);

    let mut backup = s.store().registers().clone();
    let mut isr_log = LineRecorder::new();
    for offset in [0x0100u32, 0x0108] {
        let eccr = ECCR_ECCC | ECCR_BK_ECC | offset;
        let d = on_ecc_status(eccr, &counters, &mut backup, &mut isr_log);
        assert_eq!(d, Some(TrapDisposition::Resume));
    }
    assert_eq!(isr_log.count_containing("Flash ECC Correctable Error Detected"), 2);
    assert!(isr_log.contains("at 0x08040108"));

    s.run_cycle(0, counters.snapshot());
    assert_eq!(s.status(0).unwrap().ecc_events, 2);
    s.run_cycle(0, counters.snapshot());
    assert_eq!(s.status(0).unwrap().ecc_events, 2, "deltas, not totals");

    let store = memtest::FaultDiagnosisStore::new(backup);
    assert_eq!(store.read_state().error(), Some(ErrorCode::EccCorrectable));
}
