//! Memory diagnostic firmware for the STM32G473CB
//!
//! Runs the [`memtest`] coverage scheduler forever on the target, with the
//! independent watchdog as the supervisory timer and the TAMP backup
//! registers as the crash-persistent store.
//!
//! # Architecture
//!
//! ```text
//! main.rs (boot, main loop)       exception_handlers (traps, ECC)
//!         ↓                               ↓
//! boot (host-testable boot steps)  ──▶ memtest (scheduler, recovery)
//!         ↓                               ↓
//! hal (register-level platform traits, embassy flash driver)
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for the STM32G473 target (embassy, defmt over RTT)
//! - `emulator` - Run the engine on simulated memory with `tracing` output
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Examples
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```
//!
//! ## Emulator Target
//!
//! ```bash
//! cargo run --example host_soak --features emulator -- 200
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod boot;
pub mod exception_handlers;

#[cfg(feature = "hardware")]
pub mod hal;

#[cfg(feature = "emulator")]
pub mod emulator;

pub use boot::{recover_session, BootOutcome, BOOT_SEQUENCE_STEPS, WATCHDOG_TIMEOUT_MS};
