//! On-device memory diagnostic engine.
//!
//! Exercises flash and RAM banks with adversarial patterns, finds stuck bits,
//! address-decode faults, ECC events and stale cache lines, and survives its
//! own crashes by persisting what it was doing in four backup slots.
//!
//! # Structure
//!
//! ```text
//! CoverageScheduler ──▶ WindowPlanner (per bank) ──▶ TestWindow
//!        │                                              │
//!        ├──▶ FaultDiagnosisStore (tag before writes)   ▼
//!        └──▶ primitives ◀── pattern generators ── RawMemory / FlashArray
//!
//! boot: CrashRecoveryMonitor::reconcile ──▶ FaultDiagnosisStore
//! traps: record_fault_trap / record_ecc_event ──▶ FaultDiagnosisStore
//! ```
//!
//! Everything is `no_std`, allocation-free and target-independent. The
//! target supplies the [`platform`] traits through a [`Board`].
//!
//! # Features
//!
//! - `std`: `std::error::Error` impls; host mocks via `platform/std`
//! - `defmt`: `defmt::Format` derives and hardware logging
//! - `tracing`: host logging for the emulator

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)] // register and bank names in doc comments
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod error;
pub mod pattern;
pub mod primitives;
pub mod recovery;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod tag;
pub mod window;

pub use config::{BankCoverage, BankPlan, CoverageConfig, ReportInterval, Rotation, TestMode};
pub use error::{FlashStage, FlashTestError};
pub use recovery::{
    record_ecc_event, record_fault_trap, BootDiagnosis, CrashRecoveryMonitor, EccCounters,
    EccSnapshot, FaultTrap, TrapDisposition,
};
pub use scheduler::{Board, CoverageScheduler, CycleCounter, CycleSummary, Phase};
pub use stats::{BankStatus, Tally, TestOutcome};
pub use store::{FaultDiagnosisStore, FaultRecord};
pub use tag::{ErrorCode, OperationTag, TestKind};
pub use window::{BankKind, MemoryBank, SizeTier, TestWindow, WindowPlanner};
