//! Crash recovery scenarios
//!
//! Simulates the reset path: a session leaves state in the backup slots, the
//! "device" restarts, and the boot-time reconciliation reads it back.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use memtest::{
    record_ecc_event, record_fault_trap, Board, BootDiagnosis, CoverageConfig, CoverageScheduler,
    CrashRecoveryMonitor, EccCounters, EccSnapshot, ErrorCode, FaultDiagnosisStore, FaultRecord,
    FaultTrap, OperationTag, TestKind, TestMode, TrapDisposition,
};
use platform::mocks::{LineRecorder, MockBackupRegisters, MockFlash, MockSupervisor, SimulatedMemory};
use platform::{EccEvent, EccSeverity, ResetCause};

const TIMEOUT_MS: u32 = 2_000;

fn monitor() -> CrashRecoveryMonitor {
    CrashRecoveryMonitor::new(TIMEOUT_MS)
}

// ─── Boot-time reconciliation ────────────────────────────────────────────────

#[test]
fn supervisory_reset_surfaces_persisted_record() {
    let mut store = FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x41, 37, 0x06, 4));
    let mut sink = LineRecorder::new();

    let diagnosis = monitor().reconcile(ResetCause::SupervisoryTimeout, &mut store, &mut sink);

    let expected = FaultRecord {
        operation_tag: 0x41,
        cycle: 37,
        error_code: 0x06,
        reset_count: 5,
    };
    assert_eq!(diagnosis, BootDiagnosis::SupervisoryReset { record: expected });
    assert_eq!(store.read_state(), expected);
    assert!(sink.contains("SUPERVISORY RESET DETECTED"));
    assert!(sink.contains("Total resets: 5"));
    assert!(sink.contains("Last cycle: 37"));
    assert!(sink.contains("Last operation: 0x00000041 (Address bank 0 pass 0)"));
    assert!(sink.contains("Last error: 0x00000006 (ecc correctable)"));
}

#[test]
fn clean_start_zeroes_session_and_keeps_counter() {
    let mut store = FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x41, 37, 0x06, 3));
    let mut sink = LineRecorder::new();

    let diagnosis = monitor().reconcile(ResetCause::Clean, &mut store, &mut sink);

    assert_eq!(diagnosis, BootDiagnosis::CleanStart { reset_count: 3 });
    assert_eq!(store.into_inner().raw(), [0, 0, 0, 3]);
    assert_eq!(sink.lines().first().map(String::as_str), Some("clean start"));
}

#[test]
fn read_state_is_idempotent() {
    let store = FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x0243, 9, 0x04, 1));
    let first = store.read_state();
    let second = store.read_state();
    assert_eq!(first, second);
}

#[test]
fn csr_decoding_drives_reconciliation() {
    use platform::reset::{CSR_BORRSTF, CSR_IWDGRSTF, CSR_PINRSTF, CSR_SFTRSTF};

    let cases = [
        (CSR_IWDGRSTF | CSR_PINRSTF, 1u32),
        (CSR_PINRSTF | CSR_BORRSTF, 0),
        (CSR_SFTRSTF | CSR_PINRSTF, 0),
    ];
    for (csr, resets) in cases {
        let mut store = FaultDiagnosisStore::new(MockBackupRegisters::new());
        let mut sink = LineRecorder::new();
        monitor().reconcile(ResetCause::from_rcc_csr(csr), &mut store, &mut sink);
        assert_eq!(store.read_state().reset_count, resets, "csr {csr:#010x}");
    }
}

// ─── Hang, restart, diagnose ─────────────────────────────────────────────────

struct HostBoard;

impl Board for HostBoard {
    type Memory = SimulatedMemory;
    type Flash = MockFlash;
    type Backup = MockBackupRegisters;
    type Timer = MockSupervisor;
    type Sink = LineRecorder;
}

#[test]
fn hang_after_a_cycle_is_attributable_on_next_boot() {
    let mut config = CoverageConfig::stm32g473().with_mode(TestMode::SramOnly);
    config.banks.retain(|plan| plan.bank.name == "SRAM2");
    let bank = config.banks.first().unwrap().bank;

    // First boot: clean.
    let mut timer = MockSupervisor::new();
    let mut store = FaultDiagnosisStore::new(MockBackupRegisters::new());
    let mut sink = LineRecorder::new();
    monitor().arm_supervisor(&mut timer);
    monitor().reconcile(ResetCause::Clean, &mut store, &mut sink);
    assert_eq!(timer.timeout_ms(), Some(TIMEOUT_MS));

    let mut scheduler = CoverageScheduler::<HostBoard>::new(
        config,
        SimulatedMemory::new().with_region(bank.base, bank.size),
        MockFlash::new(MockFlash::PAGE),
        store,
        timer,
        sink,
    );
    for _ in 0..3 {
        scheduler.run_cycle(0, EccSnapshot::default());
    }

    // The device hangs; only the backup domain survives the reset.
    let survived = scheduler.store().registers().clone();
    drop(scheduler);

    let mut store = FaultDiagnosisStore::new(survived);
    let mut sink = LineRecorder::new();
    let diagnosis = monitor().reconcile(ResetCause::SupervisoryTimeout, &mut store, &mut sink);

    let BootDiagnosis::SupervisoryReset { record } = diagnosis else {
        panic!("expected a supervisory reset, got {diagnosis:?}");
    };
    assert_eq!(record.cycle, 3);
    assert_eq!(record.reset_count, 1);
    assert_eq!(
        record.operation(),
        OperationTag::new(TestKind::Checkerboard, bank.id, 1)
    );
    assert!(sink.contains("Last operation: 0x00010243 (Checkerboard bank 2 pass 1)"));
    // Nothing was recorded before the hang and boot does not invent an error.
    assert_eq!(store.read_state().error_code, 0);
}

// ─── Fault-context paths ─────────────────────────────────────────────────────

#[test]
fn trap_then_restart_reports_the_trap() {
    let mut store = FaultDiagnosisStore::new(MockBackupRegisters::new());
    store.write_state(OperationTag::new(TestKind::MarchC, 1, 0), 120, ErrorCode::None);

    let mut sink = LineRecorder::new();
    assert_eq!(
        record_fault_trap(&mut store, FaultTrap::BusFault, &mut sink),
        TrapDisposition::Halt
    );
    assert!(sink.contains("FAULT: bus fault during MarchC bank 1 pass 0 (cycle 120)"));

    let mut store = FaultDiagnosisStore::new(store.into_inner());
    let mut sink = LineRecorder::new();
    monitor().reconcile(ResetCause::SupervisoryTimeout, &mut store, &mut sink);
    assert!(sink.contains("Last error: 0x0000000B (bus fault)"));
    assert_eq!(store.read_state().error(), Some(ErrorCode::BusFault));
}

#[test]
fn ecc_events_never_halt_and_accumulate() {
    let counters = EccCounters::new();
    let mut store = FaultDiagnosisStore::new(MockBackupRegisters::new());
    let mut sink = LineRecorder::new();

    for i in 0..3u32 {
        let event = EccEvent {
            severity: EccSeverity::Correctable,
            address: 0x0804_0000 + i * 8,
        };
        let disposition = record_ecc_event(&counters, &mut store, event, &mut sink);
        assert_eq!(disposition, TrapDisposition::Resume);
    }

    assert_eq!(
        counters.snapshot(),
        EccSnapshot {
            correctable: 3,
            uncorrectable: 0
        }
    );
    assert_eq!(store.read_state().error(), Some(ErrorCode::EccCorrectable));
    assert_eq!(sink.count_containing("Flash ECC Correctable Error Detected"), 3);
    assert!(sink.contains("at 0x08040010"));
}
