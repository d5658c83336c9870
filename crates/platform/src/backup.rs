//! Persistent diagnostic slots.
//!
//! Four 32-bit slots that must survive the reset path the supervisory timer
//! triggers. On the STM32G4 these are the TAMP backup registers
//! (`TAMP_BKP0R..TAMP_BKP3R`), which are powered from the backup domain and
//! keep their value across system resets and, with VBAT connected, across
//! power loss.
//!
//! # Deployment guarantee
//!
//! A target without a backup domain may implement [`BackupRegisters`] over a
//! RAM region excluded from `.bss`/`.data` initialisation. Such a region
//! survives a watchdog reset but NOT power loss. That is a property of the
//! deployment, not of this interface: callers must not assume the stronger
//! guarantee.

/// Index of a persistent slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BackupSlot {
    /// Tag of the operation that was in flight.
    OperationTag = 0,
    /// Low 32 bits of the cycle counter when the tag was written.
    Cycle = 1,
    /// Last error code recorded.
    ErrorCode = 2,
    /// Number of supervisory resets over the device lifetime.
    ResetCounter = 3,
}

impl BackupSlot {
    /// Every slot, in index order.
    pub const ALL: [BackupSlot; 4] = [
        Self::OperationTag,
        Self::Cycle,
        Self::ErrorCode,
        Self::ResetCounter,
    ];

    /// Register index of this slot.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Fixed set of persistent 32-bit slots addressed by [`BackupSlot`].
///
/// # Fault-context contract
///
/// [`BackupRegisters::write`] is called from HardFault/BusFault handlers and
/// from the flash ECC interrupt. Implementations must be a plain register or
/// memory store: no allocation, no locks, no calls that can themselves fault.
pub trait BackupRegisters {
    /// Read the current value of `slot`.
    fn read(&self, slot: BackupSlot) -> u32;

    /// Overwrite `slot` with `value`.
    fn write(&mut self, slot: BackupSlot, value: u32);
}

impl<T: BackupRegisters + ?Sized> BackupRegisters for &mut T {
    fn read(&self, slot: BackupSlot) -> u32 {
        (**self).read(slot)
    }

    fn write(&mut self, slot: BackupSlot, value: u32) {
        (**self).write(slot, value);
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn slot_indices_match_register_layout() {
        assert_eq!(BackupSlot::OperationTag.index(), 0);
        assert_eq!(BackupSlot::Cycle.index(), 1);
        assert_eq!(BackupSlot::ErrorCode.index(), 2);
        assert_eq!(BackupSlot::ResetCounter.index(), 3);
    }

    #[test]
    fn all_is_in_index_order() {
        for (i, slot) in BackupSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
    }
}
