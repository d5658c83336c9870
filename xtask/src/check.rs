use anyhow::Result;
use std::time::Instant;

use crate::run::{banner, cargo_step, done, OnFailure};

const TARGET: &str = "thumbv7em-none-eabihf";

pub fn run() -> Result<()> {
    banner("🔍 Checking firmware builds...");
    let start = Instant::now();

    cargo_step(
        "Hardware target (STM32G473)",
        &["check", "-p", "firmware", "--target", TARGET, "--features", "hardware"],
        OnFailure::Fail,
    )?;

    cargo_step(
        "Emulator target (host)",
        &["check", "-p", "firmware", "--features", "emulator", "--examples"],
        OnFailure::Fail,
    )?;

    // The core must stay no_std with and without logging.
    for (label, features) in [
        ("memtest (no_std)", None),
        ("memtest (no_std + defmt)", Some("defmt")),
    ] {
        let mut args = vec![
            "check",
            "-p",
            "memtest",
            "--target",
            TARGET,
            "--no-default-features",
        ];
        if let Some(f) = features {
            args.extend(["--features", f]);
        }
        cargo_step(label, &args, OnFailure::Fail)?;
    }

    cargo_step(
        "Platform crate (no_std)",
        &["check", "-p", "platform", "--target", TARGET, "--no-default-features"],
        OnFailure::Fail,
    )?;

    cargo_step(
        "Clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        OnFailure::Warn,
    )?;

    if cargo_step("Formatting", &["fmt", "--all", "--check"], OnFailure::Warn)?.is_none() {
        eprintln!("     Run 'cargo fmt --all' to fix");
    }

    done("All checks", start);
    Ok(())
}
