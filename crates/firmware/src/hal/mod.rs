//! STM32G473 implementations of the [`platform`] traits.
//!
//! | Trait | Implementation |
//! |---|---|
//! | `RawMemory` | [`VolatileBus`] |
//! | `BackupRegisters` | [`TampBackupRegisters`] (TAMP_BKP0R..3R) |
//! | `SupervisoryTimer` | [`Iwdg`] (embassy `IndependentWatchdog`) |
//! | `FlashArray` | [`FlashController`] (embassy blocking flash driver) |
//! | `ReportSink` | [`DefmtSink`] (`defmt::println!` over RTT) |
//! | `ResetCauseSource` | [`RccCsr`] |

pub mod flash;
pub mod registers;
pub mod watchdog;

use memtest::{Board, EccCounters};
use platform::ReportSink;

pub use flash::FlashController;
pub use registers::{RccCsr, TampBackupRegisters, VolatileBus};
pub use watchdog::Iwdg;

/// ECC events counted by the FLASH interrupt and NMI, read by the main loop.
pub static ECC_COUNTERS: EccCounters = EccCounters::new();

/// Report lines straight to the RTT console.
#[derive(Clone, Copy, Default)]
pub struct DefmtSink;

impl ReportSink for DefmtSink {
    fn write_line(&mut self, line: &str) {
        defmt::println!("{=str}", line);
    }
}

/// The target's drivers, one per role.
pub enum HardwareBoard {}

impl Board for HardwareBoard {
    type Memory = VolatileBus;
    type Flash = FlashController;
    type Backup = TampBackupRegisters;
    type Timer = Iwdg;
    type Sink = DefmtSink;
}
