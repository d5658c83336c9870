//! Hardware abstraction layer for the memory diagnostic engine.
//!
//! Every capability the diagnostic core needs from the target is a trait
//! here, so the core can run unchanged on the STM32G473 and on the host.
//!
//! # Architecture Layers
//!
//! ```text
//! firmware (boot, handlers, main loop)
//!         ↓
//! memtest (scheduler, planner, patterns, recovery)
//!         ↓
//! platform (this crate - trait abstractions)
//!         ↓
//! volatile register access / embassy-stm32 flash driver
//! ```
//!
//! # Capabilities
//!
//! - [`RawMemory`] - word loads/stores to the memory under test
//! - [`BackupRegisters`] - four persistent slots that survive a reset
//! - [`SupervisoryTimer`] - the independent watchdog
//! - [`FlashArray`] - programmable flash with a resettable cache
//! - [`ReportSink`] - human-readable report lines
//!
//! # Features
//!
//! - `std`: host mocks in [`mocks`]
//! - `defmt`: `defmt::Format` derives on all platform types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors; callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod backup;
pub mod flash;
pub mod memory;
pub mod memory_map;
pub mod report;
pub mod reset;
pub mod watchdog;

pub use backup::{BackupRegisters, BackupSlot};
pub use flash::{EccEvent, EccSeverity, FlashArray};
pub use memory::{align_down, align_up, RawMemory, WORD_BYTES};
pub use report::{NullSink, ReportSink};
pub use reset::{ResetCause, ResetCauseSource};
pub use watchdog::{iwdg_timing, IwdgTiming, SupervisoryTimer};

// Mock implementations for testing
#[cfg(any(test, feature = "std"))]
pub mod mocks;
