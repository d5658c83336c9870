//! Human-readable report lines.
//!
//! Every line is formatted into a fixed-capacity [`Line`] on the stack and
//! handed to a [`ReportSink`]. A line longer than the capacity is cut short;
//! nothing here allocates, so the same helpers serve fault handlers.

use core::fmt::{self, Write};

use platform::ReportSink;

use crate::config::{CoverageConfig, ReportInterval};
use crate::error::FlashTestError;
use crate::stats::BankStatus;
use crate::tag::TestKind;
use crate::window::{MemoryBank, TestWindow};

/// Capacity of one report line in bytes.
pub const LINE_CAPACITY: usize = 128;

/// One bounded report line.
pub type Line = heapless::String<LINE_CAPACITY>;

/// Format `args` into a [`Line`], truncating on overflow.
#[must_use]
pub fn format_line(args: fmt::Arguments<'_>) -> Line {
    let mut line = Line::new();
    let mut w = Truncating(&mut line);
    let _ = w.write_fmt(args);
    line
}

/// Format and emit one line.
pub fn emit<S: ReportSink + ?Sized>(sink: &mut S, args: fmt::Arguments<'_>) {
    sink.write_line(&format_line(args));
}

/// Writer that keeps as much of each fragment as still fits.
struct Truncating<'a>(&'a mut Line);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

/// `"<Kind> Error: addr=0x%08X read=0x%08X expected=0x%08X"`.
pub fn mismatch<S: ReportSink + ?Sized>(
    sink: &mut S,
    kind: TestKind,
    addr: u32,
    read: u32,
    expected: u32,
) {
    emit(
        sink,
        format_args!(
            "{} Error: addr=0x{:08X} read=0x{:08X} expected=0x{:08X}",
            kind.label(),
            addr,
            read,
            expected
        ),
    );
}

/// A failed flash erase/program.
pub fn flash_failure<S: ReportSink + ?Sized>(sink: &mut S, error: &FlashTestError) {
    emit(sink, format_args!("{error}"));
}

/// Configuration block: one line per bank plus the global switches.
pub fn configuration<S, I>(sink: &mut S, config: &CoverageConfig, windows: I)
where
    S: ReportSink + ?Sized,
    I: IntoIterator<Item = TestWindow>,
{
    sink.write_line("===== Memory Test Configuration =====");
    for w in windows {
        emit(
            sink,
            format_args!(
                "{} Test: Start=0x{:08X} Size=0x{:08X}",
                w.bank.name,
                w.start(),
                w.size
            ),
        );
    }
    emit(
        sink,
        format_args!("Address Test Stride: {} bytes", config.address_stride),
    );
    emit(
        sink,
        format_args!("Butterfly Pairs: {}", config.butterfly_pairs),
    );
    emit(
        sink,
        format_args!(
            "Rotating Offsets: {}",
            enabled(config.rotation.rotate_offsets)
        ),
    );
    emit(
        sink,
        format_args!("Rotating Sizes: {}", enabled(config.rotation.rotate_sizes)),
    );
    emit(
        sink,
        format_args!(
            "Advanced Tests: every {} cycles, Mode: {}",
            config.mode.advanced_interval(config.advanced_interval),
            config.mode.label()
        ),
    );
    match config.report {
        ReportInterval::EveryCycles(n) => {
            emit(sink, format_args!("Status Report: every {n} cycles"));
        }
        ReportInterval::EveryMillis(ms) => {
            emit(sink, format_args!("Status Report: every {ms} ms"));
        }
    }
}

/// Per-bank status block for cycle `cycle`.
pub fn status<'a, S, I>(sink: &mut S, cycle: u64, now_ms: u64, banks: I)
where
    S: ReportSink + ?Sized,
    I: IntoIterator<Item = (&'a MemoryBank, &'a BankStatus)>,
{
    emit(
        sink,
        format_args!("===== Status: cycle {cycle}, uptime {now_ms} ms ====="),
    );
    for (bank, s) in banks {
        let addr = s.tally(TestKind::Address);
        let bfly = s.tally(TestKind::Butterfly);
        let chk = s.tally(TestKind::Checkerboard);
        let flash = s.tally(TestKind::FlashProgram);
        emit(
            sink,
            format_args!(
                "{}: addr {}/{} bfly {}/{} chk {}/{} flash {}/{}",
                bank.name,
                addr.success,
                addr.total,
                bfly.success,
                bfly.total,
                chk.success,
                chk.total,
                flash.success,
                flash.total
            ),
        );
        let march = s.tally(TestKind::MarchC);
        let walk = s.tally(TestKind::Walking);
        let mchk = s.tally(TestKind::ModifiedCheckerboard);
        emit(
            sink,
            format_args!(
                "{}: march {}/{} walk {}/{} mchk {}/{}",
                bank.name,
                march.success,
                march.total,
                walk.success,
                walk.total,
                mchk.success,
                mchk.total
            ),
        );
        emit(
            sink,
            format_args!(
                "{}: ecc {} txfail {} errors {}",
                bank.name, s.ecc_events, s.transaction_failures, s.total_errors
            ),
        );
    }
}

const fn enabled(on: bool) -> &'static str {
    if on {
        "Enabled"
    } else {
        "Disabled"
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use crate::stats::TestOutcome;
    use platform::mocks::LineRecorder;

    #[test]
    fn mismatch_line_format() {
        let mut rec = LineRecorder::new();
        mismatch(&mut rec, TestKind::Address, 0x2001_8400, 0xDEAD_BEEF, 0x1);
        assert_eq!(
            rec.lines(),
            ["Address Error: addr=0x20018400 read=0xDEADBEEF expected=0x00000001"]
        );
    }

    #[test]
    fn long_lines_are_truncated_not_dropped() {
        let long = "x".repeat(LINE_CAPACITY * 2);
        let line = format_line(format_args!("{long}"));
        assert_eq!(line.len(), LINE_CAPACITY);
    }

    #[test]
    fn configuration_lists_every_bank() {
        let cfg = CoverageConfig::stm32g473();
        let windows = cfg.banks.iter().map(|p| TestWindow {
            bank: p.bank,
            offset: p.coverage.initial_offset,
            size: p.coverage.tiers[0],
        });
        let mut rec = LineRecorder::new();
        configuration(&mut rec, &cfg, windows);
        assert!(rec.contains("===== Memory Test Configuration ====="));
        assert!(rec.contains("SRAM2 Test: Start=0x20018400 Size=0x00002000"));
        assert!(rec.contains("Butterfly Pairs: 16"));
        assert!(rec.contains("Rotating Offsets: Enabled"));
        assert!(rec.contains("Status Report: every 1000 ms"));
    }

    #[test]
    fn status_shows_tallies() {
        let cfg = CoverageConfig::stm32g473();
        let bank = cfg.banks[1].bank;
        let mut s = BankStatus::new();
        s.record(TestOutcome {
            errors: 0,
            kind: TestKind::Address,
        });
        s.record(TestOutcome {
            errors: 2,
            kind: TestKind::Address,
        });
        let mut rec = LineRecorder::new();
        status(&mut rec, 7, 1500, [(&bank, &s)]);
        assert!(rec.contains("cycle 7, uptime 1500 ms"));
        assert!(rec.contains("SRAM1: addr 1/2 "));
        assert!(rec.contains("SRAM1: ecc 0 txfail 0 errors 2"));
    }

    #[test]
    fn status_shows_modified_checkerboard_tally() {
        let cfg = CoverageConfig::stm32g473();
        let bank = cfg.banks[2].bank;
        let mut s = BankStatus::new();
        for errors in [0, 0, 1] {
            s.record(TestOutcome {
                errors,
                kind: TestKind::ModifiedCheckerboard,
            });
        }
        let mut rec = LineRecorder::new();
        status(&mut rec, 5, 0, [(&bank, &s)]);
        assert!(rec.contains("SRAM2: march 0/0 walk 0/0 mchk 2/3"));
    }

    #[test]
    fn status_lines_cover_every_test_kind() {
        let cfg = CoverageConfig::stm32g473();
        let bank = cfg.banks[1].bank;
        let mut s = BankStatus::new();
        for kind in TestKind::ALL {
            for _ in 0..2 {
                s.record(TestOutcome { errors: 0, kind });
            }
        }
        let mut rec = LineRecorder::new();
        status(&mut rec, 1, 0, [(&bank, &s)]);
        assert!(rec.lines().iter().all(|l| l.len() < LINE_CAPACITY));
        assert!(rec.contains("SRAM1: march 2/2 walk 2/2 mchk 2/2"));
    }
}
