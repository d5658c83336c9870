use anyhow::{Context, Result};
use std::process::Command;

use crate::run::banner;

pub fn run(cycles: u32, stuck: Option<&str>) -> Result<()> {
    banner(&format!("🔁 Soaking the engine on simulated memory ({cycles} cycles)..."));

    let cycles = cycles.to_string();
    let mut args = vec![
        "run",
        "-p",
        "firmware",
        "--example",
        "host_soak",
        "--features",
        "emulator",
        "--",
        cycles.as_str(),
    ];
    if let Some(addr) = stuck {
        args.extend(["--stuck", addr]);
    }

    let status = Command::new("cargo")
        .args(&args)
        .status()
        .context("Failed to run the host_soak example")?;
    if !status.success() {
        anyhow::bail!("host_soak exited with {status}");
    }
    Ok(())
}
