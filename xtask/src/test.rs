use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::run::{banner, cargo_step, done, test_totals, OnFailure};

/// Integration and property test binaries, per crate.
const INTEGRATION: &[(&str, &str)] = &[
    ("platform", "hal_math_proptest"),
    ("memtest", "scheduler_cycle"),
    ("memtest", "recovery_scenarios"),
    ("memtest", "pattern_window_proptest"),
    ("firmware", "integration_boot"),
    ("firmware", "memory_layout"),
];

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    banner("🧪 Running tests...");
    let start = Instant::now();

    if !integration_only {
        if let Some(out) = cargo_step(
            "Unit tests",
            &["test", "--lib", "--workspace"],
            OnFailure::Fail,
        )? {
            summarize(&out.stdout);
        }
    }

    if !unit_only {
        for &(krate, test) in INTEGRATION {
            let label = format!("{krate} / {test}");
            let args = ["test", "-p", krate, "--test", test];
            if let Some(out) = cargo_step(&label, &args, OnFailure::Fail)? {
                summarize(&out.stdout);
            }
        }

        cargo_step(
            "Emulator unit tests",
            &["test", "-p", "firmware", "--lib", "--features", "emulator"],
            OnFailure::Fail,
        )?;
    }

    done("All tests", start);
    Ok(())
}

fn summarize(stdout: &[u8]) {
    let (passed, failed) = test_totals(&String::from_utf8_lossy(stdout));
    println!("     {}", format!("{passed} passed, {failed} failed").dimmed());
    println!();
}
