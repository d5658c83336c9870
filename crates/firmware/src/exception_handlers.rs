//! Cortex-M exception handlers for the memory diagnostic firmware.
//!
//! - **HardFault, BusFault, MemManage, UsageFault**: persist the fault code
//!   next to the operation tag the scheduler wrote, emit one line, then spin
//!   until the IWDG resets the device. The next boot reports the record.
//! - **FLASH** (single-bit ECC) and **NMI** (double-bit ECC): count the
//!   event, persist its code, report the failing address and return.
//!
//! # Hardware-only handlers
//!
//! The `#[cortex_m_rt::exception]` / `#[interrupt]` attributes require ARM
//! target intrinsics and are gated behind `#[cfg(feature = "hardware")]`.
//! The recording logic is generic over the platform traits and runs on the
//! host against the mocks.

#![allow(clippy::doc_markdown)] // Exception handler docs use hardware terminology (HardFault, NMI) as plain text

use memtest::{
    record_ecc_event, record_fault_trap, EccCounters, FaultDiagnosisStore, FaultTrap,
    TrapDisposition,
};
use platform::memory_map::FLASH_BASE;
use platform::{BackupRegisters, EccEvent, ReportSink};

/// Marker constant: the fault handlers below are linked into hardware builds.
pub const HARDFAULT_DEFINED: bool = true;

/// Traps that end a session, in the order the handlers are declared.
pub const HANDLED_TRAPS: [FaultTrap; 4] = [
    FaultTrap::HardFault,
    FaultTrap::BusFault,
    FaultTrap::MemManage,
    FaultTrap::UsageFault,
];

/// Persist and report a fault trap on whatever backup registers the handler
/// can reach.
pub fn on_fault_trap<B, S>(backup: B, trap: FaultTrap, sink: &mut S) -> TrapDisposition
where
    B: BackupRegisters,
    S: ReportSink + ?Sized,
{
    let mut store = FaultDiagnosisStore::new(backup);
    record_fault_trap(&mut store, trap, sink)
}

/// Decode FLASH_ECCR and record the event it describes.
///
/// `None` when neither ECC flag is set (spurious interrupt).
pub fn on_ecc_status<B, S>(
    eccr: u32,
    counters: &EccCounters,
    backup: B,
    sink: &mut S,
) -> Option<TrapDisposition>
where
    B: BackupRegisters,
    S: ReportSink + ?Sized,
{
    let event = EccEvent::from_eccr(eccr, FLASH_BASE)?;
    let mut store = FaultDiagnosisStore::new(backup);
    Some(record_ecc_event(counters, &mut store, event, sink))
}

#[cfg(feature = "hardware")]
mod hardware {
    use super::{on_ecc_status, on_fault_trap, FaultTrap, TrapDisposition};
    use crate::hal::registers::{clear_flash_ecc, flash_eccr};
    use crate::hal::{DefmtSink, TampBackupRegisters, ECC_COUNTERS};
    use embassy_stm32::interrupt;

    fn trap(kind: FaultTrap) -> ! {
        // SAFETY: boot unlocked the backup domain before enabling any trap;
        // the main loop is suspended while we run.
        let backup = unsafe { TampBackupRegisters::steal() };
        let disposition = on_fault_trap(backup, kind, &mut DefmtSink);
        debug_assert_eq!(disposition, TrapDisposition::Halt);
        // The IWDG is still running and nothing services it from here.
        loop {
            cortex_m::asm::nop();
        }
    }

    fn ecc() {
        let eccr = flash_eccr();
        // SAFETY: as in `trap`.
        let backup = unsafe { TampBackupRegisters::steal() };
        let _ = on_ecc_status(eccr, &ECC_COUNTERS, backup, &mut DefmtSink);
        clear_flash_ecc(eccr);
    }

    /// HardFault: escalated faults, vector table errors, and any fault taken
    /// while the configurable fault handlers are disabled.
    ///
    /// # Safety
    ///
    /// This function must never return; the `-> !` return type enforces this.
    #[cortex_m_rt::exception]
    #[allow(unsafe_code)]
    unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
        defmt::error!("HardFault: stacked PC={=u32:#010x}", ef.pc());
        trap(FaultTrap::HardFault)
    }

    #[cortex_m_rt::exception]
    fn BusFault() -> ! {
        trap(FaultTrap::BusFault)
    }

    #[cortex_m_rt::exception]
    fn MemoryManagement() -> ! {
        trap(FaultTrap::MemManage)
    }

    #[cortex_m_rt::exception]
    fn UsageFault() -> ! {
        trap(FaultTrap::UsageFault)
    }

    /// Double-bit flash ECC errors raise NMI on the G4.
    #[cortex_m_rt::exception]
    fn NonMaskableInt() {
        ecc();
    }

    /// Single-bit flash ECC errors (FLASH_ECCR.ECCCIE).
    #[interrupt]
    fn FLASH() {
        ecc();
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
    use memtest::{EccSnapshot, ErrorCode, OperationTag, TestKind};
    use platform::flash::{ECCR_BK_ECC, ECCR_ECCC, ECCR_ECCD};
    use platform::mocks::{LineRecorder, MockBackupRegisters};

    #[test]
    fn test_hardfault_marker() {
        assert!(HARDFAULT_DEFINED);
    }

    #[test]
    fn test_every_trap_halts_and_is_persisted() {
        for trap in HANDLED_TRAPS {
            let backup = MockBackupRegisters::with_values(
                OperationTag::new(TestKind::Address, 1, 0).raw(),
                7,
                0,
                0,
            );
            let mut sink = LineRecorder::new();
            let disposition = on_fault_trap(backup.clone(), trap, &mut sink);
            assert_eq!(disposition, TrapDisposition::Halt);
            assert_eq!(sink.lines().len(), 1);
            assert!(sink.contains("during Address bank 1 pass 0 (cycle 7)"));
        }
    }

    #[test]
    fn test_trap_writes_through_to_the_registers() {
        let mut backup = MockBackupRegisters::new();
        let mut sink = LineRecorder::new();
        on_fault_trap(&mut backup, FaultTrap::UsageFault, &mut sink);
        let store = FaultDiagnosisStore::new(backup);
        assert_eq!(store.read_state().error(), Some(ErrorCode::UsageFault));
    }

    #[test]
    fn test_spurious_ecc_interrupt_records_nothing() {
        let counters = EccCounters::new();
        let mut backup = MockBackupRegisters::new();
        let mut sink = LineRecorder::new();
        assert_eq!(on_ecc_status(0, &counters, &mut backup, &mut sink), None);
        assert_eq!(backup.write_count(), 0);
        assert_eq!(counters.snapshot(), EccSnapshot::default());
    }

    #[test]
    fn test_bank_two_ecc_event_resumes() {
        let counters = EccCounters::new();
        let mut backup = MockBackupRegisters::new();
        let mut sink = LineRecorder::new();

        let eccr = ECCR_ECCC | ECCR_BK_ECC | 0x0120;
        let d = on_ecc_status(eccr, &counters, &mut backup, &mut sink);

        assert_eq!(d, Some(TrapDisposition::Resume));
        assert!(sink.contains("Correctable Error Detected at 0x08040120"));
        assert_eq!(counters.snapshot().correctable, 1);
    }

    #[test]
    fn test_double_error_is_uncorrectable() {
        let counters = EccCounters::new();
        let mut backup = MockBackupRegisters::new();
        let mut sink = LineRecorder::new();
        on_ecc_status(
            ECCR_ECCD | ECCR_ECCC | 0x40,
            &counters,
            &mut backup,
            &mut sink,
        );
        let store = FaultDiagnosisStore::new(backup);
        assert_eq!(store.read_state().error(), Some(ErrorCode::EccUncorrectable));
        assert_eq!(counters.snapshot().uncorrectable, 1);
    }
}
