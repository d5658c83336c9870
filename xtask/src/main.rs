// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod flash;
mod run;
mod soak;
mod test;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Memory diagnostic firmware development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash firmware to the STM32G473 via probe-rs and stream the RTT report
    Flash {
        /// Build and flash release version
        #[arg(short, long)]
        release: bool,
        /// Build-time defmt filter (DEFMT_LOG)
        #[arg(long, default_value = "info")]
        log: String,
    },
    /// Check the hardware, emulator and no_std builds, clippy and formatting
    Check,
    /// Run host tests (unit, integration, property)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration and property tests
        #[arg(long)]
        integration: bool,
    },
    /// Run the engine on simulated memory with tracing output
    Soak {
        /// Number of diagnostic cycles
        #[arg(long, default_value_t = 100)]
        cycles: u32,
        /// Inject a stuck-at-0 word at this address (hex)
        #[arg(long)]
        stuck: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Flash { release, log } => flash::run(release, &log),
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Soak { cycles, stuck } => soak::run(cycles, stuck.as_deref()),
    }
}
