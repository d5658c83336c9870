//! Host soak run of the diagnostic engine.
//!
//! Boots a simulated STM32G473, runs diagnostic cycles on a fixed tick,
//! optionally injects a stuck word into SRAM2, then simulates a watchdog
//! reset and shows what the next boot recovers from the backup slots.
//!
//! ```bash
//! cargo run --example host_soak --features emulator -- 200
//! cargo run --example host_soak --features emulator -- 50 --stuck 0x20018400
//! RUST_LOG=memtest=trace cargo run --example host_soak --features emulator
//! ```

#![allow(clippy::print_stdout, clippy::use_debug)] // demo binary: summary goes to the terminal

use std::time::Duration;

use firmware::boot::{coverage_config, recover_session};
use firmware::emulator::{
    build_scheduler, simulated_target, surviving_backup, LatchedCause, TracingSink,
};
use platform::mocks::{MockBackupRegisters, MockSupervisor};
use platform::reset::{CSR_IWDGRSTF, CSR_PINRSTF};
use tracing_subscriber::EnvFilter;

/// Simulated time per cycle.
const TICK: Duration = Duration::from_millis(5);

fn parse_hex(s: &str) -> Option<u32> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cycles: u32 = args.first().and_then(|s| s.parse().ok()).unwrap_or(100);
    let stuck = args
        .iter()
        .position(|a| a == "--stuck")
        .and_then(|i| args.get(i.saturating_add(1)))
        .and_then(|s| parse_hex(s));

    // First boot: power-on.
    let mut timer = MockSupervisor::new();
    let boot = recover_session(
        &mut LatchedCause(CSR_PINRSTF),
        MockBackupRegisters::new(),
        &mut timer,
        &mut TracingSink,
    );

    let mut memory = simulated_target();
    if let Some(addr) = stuck {
        tracing::warn!(addr = format_args!("{addr:#010x}"), "injecting stuck-at-0 word");
        memory.inject_stuck_bits(addr, u32::MAX, 0);
    }

    let mut scheduler = build_scheduler(coverage_config(), memory, boot.store, timer);
    scheduler.report_configuration();

    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(TICK);
    let mut errors = 0u64;
    for _ in 0..cycles {
        ticker.tick().await;
        let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = scheduler.run_cycle(now_ms, memtest::EccSnapshot::default());
        errors = errors.saturating_add(u64::from(summary.errors));
    }

    println!(
        "{} cycles, {} mismatches, {} words read, {} written",
        scheduler.cycle(),
        errors,
        scheduler.memory().reads(),
        scheduler.memory().writes()
    );

    // The device "hangs": only the backup domain survives.
    let backup = surviving_backup(&scheduler);
    drop(scheduler);

    let mut timer = MockSupervisor::new();
    let reboot = recover_session(
        &mut LatchedCause(CSR_IWDGRSTF | CSR_PINRSTF),
        backup,
        &mut timer,
        &mut TracingSink,
    );
    println!("after reset: {:?}", reboot.diagnosis);
}
