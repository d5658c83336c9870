//! Crash-persistent fault diagnosis record.
//!
//! Four backup slots hold "what was running, when, what went wrong, how many
//! times the device has been restarted". The write path is a handful of
//! plain slot stores so it can run from fault handlers.

use platform::{BackupRegisters, BackupSlot};

use crate::tag::{ErrorCode, OperationTag};

/// Snapshot of the four persistent slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRecord {
    /// Raw operation tag, see [`OperationTag`].
    pub operation_tag: u32,
    /// Low 32 bits of the cycle counter.
    pub cycle: u32,
    /// Raw error code, see [`ErrorCode`].
    pub error_code: u32,
    /// Supervisory resets seen so far.
    pub reset_count: u32,
}

impl FaultRecord {
    /// Operation tag as a typed value.
    #[must_use]
    pub const fn operation(&self) -> OperationTag {
        OperationTag::from_raw(self.operation_tag)
    }

    /// Error code, if it is one this build knows.
    #[must_use]
    pub const fn error(&self) -> Option<ErrorCode> {
        ErrorCode::from_raw(self.error_code)
    }
}

/// Typed access to the persistent slots.
///
/// Every method is allocation-free and lock-free. A fault handler may call
/// [`record_error`](Self::record_error) on a store that the main loop was in
/// the middle of updating; the worst outcome is a record mixing the old tag
/// with the new error code, which is still attributable.
#[derive(Debug)]
pub struct FaultDiagnosisStore<B> {
    regs: B,
}

impl<B: BackupRegisters> FaultDiagnosisStore<B> {
    /// Wrap the backup registers. Reads nothing, writes nothing.
    pub const fn new(regs: B) -> Self {
        Self { regs }
    }

    /// Persist the operation about to run.
    pub fn write_state(&mut self, tag: OperationTag, cycle: u32, error: ErrorCode) {
        self.regs.write(BackupSlot::OperationTag, tag.raw());
        self.regs.write(BackupSlot::Cycle, cycle);
        self.regs.write(BackupSlot::ErrorCode, error.raw());
    }

    /// Current contents of all four slots. All zero on a fresh backup domain.
    #[must_use]
    pub fn read_state(&self) -> FaultRecord {
        FaultRecord {
            operation_tag: self.regs.read(BackupSlot::OperationTag),
            cycle: self.regs.read(BackupSlot::Cycle),
            error_code: self.regs.read(BackupSlot::ErrorCode),
            reset_count: self.regs.read(BackupSlot::ResetCounter),
        }
    }

    /// Bump the reset counter, saturating. Returns the new value.
    pub fn increment_reset_counter(&mut self) -> u32 {
        let next = self.regs.read(BackupSlot::ResetCounter).saturating_add(1);
        self.regs.write(BackupSlot::ResetCounter, next);
        next
    }

    /// Zero the session fields. The reset counter is kept.
    pub fn clear_session(&mut self) {
        self.regs.write(BackupSlot::OperationTag, 0);
        self.regs.write(BackupSlot::Cycle, 0);
        self.regs.write(BackupSlot::ErrorCode, 0);
    }

    /// Overwrite the error code only. Safe from fault context.
    pub fn record_error(&mut self, code: ErrorCode) {
        self.regs.write(BackupSlot::ErrorCode, code.raw());
    }

    /// Underlying registers.
    pub fn registers(&self) -> &B {
        &self.regs
    }

    /// Give the registers back.
    pub fn into_inner(self) -> B {
        self.regs
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
    use crate::tag::TestKind;
    use platform::mocks::MockBackupRegisters;

    #[test]
    fn fresh_domain_reads_zero() {
        let store = FaultDiagnosisStore::new(MockBackupRegisters::new());
        assert_eq!(store.read_state(), FaultRecord::default());
    }

    #[test]
    fn write_then_read() {
        let mut store = FaultDiagnosisStore::new(MockBackupRegisters::new());
        let tag = OperationTag::new(TestKind::Butterfly, 1, 0);
        store.write_state(tag, 99, ErrorCode::None);
        let rec = store.read_state();
        assert_eq!(rec.operation(), tag);
        assert_eq!(rec.cycle, 99);
        assert_eq!(rec.error(), Some(ErrorCode::None));
    }

    #[test]
    fn read_is_idempotent() {
        let store = FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x41, 37, 6, 1));
        assert_eq!(store.read_state(), store.read_state());
        assert_eq!(store.registers().write_count(), 0);
    }

    #[test]
    fn clear_keeps_reset_counter() {
        let mut store =
            FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x41, 37, 6, 4));
        store.clear_session();
        assert_eq!(
            store.read_state(),
            FaultRecord {
                reset_count: 4,
                ..FaultRecord::default()
            }
        );
    }

    #[test]
    fn reset_counter_saturates() {
        let mut store =
            FaultDiagnosisStore::new(MockBackupRegisters::with_values(0, 0, 0, u32::MAX));
        assert_eq!(store.increment_reset_counter(), u32::MAX);
    }

    #[test]
    fn record_error_keeps_operation_and_cycle() {
        let mut store =
            FaultDiagnosisStore::new(MockBackupRegisters::with_values(0x0143, 12, 0, 0));
        store.record_error(ErrorCode::BusFault);
        assert_eq!(store.into_inner().raw(), [0x0143, 12, 0x0B, 0]);
    }
}
