use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

use crate::run::{banner, cargo_step, OnFailure};

const TARGET: &str = "thumbv7em-none-eabihf";
const CHIP: &str = "STM32G473CBTx";

pub fn run(release: bool, log: &str) -> Result<()> {
    let mode = if release { "release" } else { "debug" };
    banner(&format!("🔨 Building firmware ({mode} mode, DEFMT_LOG={log})..."));

    let mut args = vec!["build", "-p", "firmware", "--target", TARGET, "--features", "hardware"];
    if release {
        args.push("--release");
    }
    // DEFMT_LOG is read at build time; the cargo child inherits it.
    std::env::set_var("DEFMT_LOG", log);
    cargo_step("Build", &args, OnFailure::Fail)?;

    let binary = format!("target/{TARGET}/{mode}/firmware");
    show_binary_size(&binary);

    // probe-rs stays attached and streams the report until interrupted.
    println!("{}", format!("📡 Flashing to {CHIP}...").cyan().bold());
    println!("   {}", "Report lines follow over RTT; Ctrl-C to detach".dimmed());
    let flash_start = Instant::now();

    let status = Command::new("probe-rs")
        .args(["run", "--chip", CHIP, "--probe-index", "0", &binary])
        .status()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;

    if !status.success() {
        anyhow::bail!(
            "probe-rs exited with {status} - check that the probe is connected and the device is powered"
        );
    }

    println!(
        "{}",
        format!("✓ Session ended after {:.2}s", flash_start.elapsed().as_secs_f64()).green()
    );
    Ok(())
}

fn show_binary_size(binary: &str) {
    let Ok(out) = Command::new("rust-size").args([binary, "-A"]).output() else {
        return;
    };
    if !out.status.success() {
        return;
    }
    println!("{}", "📊 Binary size:".cyan());
    for line in String::from_utf8_lossy(&out.stdout).lines() {
        println!("   {}", line.dimmed());
    }
    println!();
}
