//! Coverage scheduler integration tests
//!
//! Runs the scheduler over the full STM32G473 bank layout on simulated
//! memory and flash, with faults injected through the platform mocks.
//!
//! Run with: cargo test -p memtest --test scheduler_cycle

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use embedded_storage::nor_flash::ReadNorFlash;
use memtest::pattern::address_pattern;
use memtest::{
    Board, CoverageConfig, CoverageScheduler, EccSnapshot, ErrorCode, FaultDiagnosisStore,
    OperationTag, Phase, ReportInterval, TestKind, TestMode,
};
use platform::memory_map as map;
use platform::mocks::{LineRecorder, MockBackupRegisters, MockFlash, MockSupervisor, SimulatedMemory};

struct HostBoard;

impl Board for HostBoard {
    type Memory = SimulatedMemory;
    type Flash = MockFlash;
    type Backup = MockBackupRegisters;
    type Timer = MockSupervisor;
    type Sink = LineRecorder;
}

const SRAM2: usize = 2;
const FLASH2: usize = 0;

fn host_scheduler(config: CoverageConfig) -> CoverageScheduler<HostBoard> {
    let memory = SimulatedMemory::new()
        .with_region(map::SRAM1_BASE, map::SRAM1_SIZE)
        .with_region(map::SRAM2_BASE, map::SRAM2_SIZE)
        .with_region(map::CCM_BASE, map::CCM_SIZE);
    let flash_len = usize::try_from(map::FLASH_SIZE).unwrap();
    CoverageScheduler::new(
        config,
        memory,
        MockFlash::new(flash_len),
        FaultDiagnosisStore::new(MockBackupRegisters::new()),
        MockSupervisor::new(),
        LineRecorder::new(),
    )
}

fn fixed_windows(mode: TestMode) -> CoverageConfig {
    let mut cfg = CoverageConfig::stm32g473().with_mode(mode);
    cfg.rotation.rotate_offsets = false;
    cfg.rotation.rotate_sizes = false;
    cfg
}

fn idle() -> EccSnapshot {
    EccSnapshot::default()
}

/// Word at `bus` in the simulated flash array.
fn flash_word(s: &mut CoverageScheduler<HostBoard>, bus: u32) -> u32 {
    let mut bytes = [0u8; 4];
    s.flash_mut().read(bus - MockFlash::BASE, &mut bytes).unwrap();
    u32::from_le_bytes(bytes)
}

// ─── Advanced-test cadence ───────────────────────────────────────────────────

#[test]
fn advanced_tests_run_exactly_every_tenth_cycle() {
    let mut s = host_scheduler(CoverageConfig::stm32g473());
    let advanced: Vec<u64> = (0..30)
        .map(|_| s.run_cycle(0, idle()))
        .filter(|summary| summary.advanced)
        .map(|summary| summary.cycle)
        .collect();
    assert_eq!(advanced, [10, 20, 30]);

    let march = s.status(SRAM2).unwrap().tally(TestKind::MarchC);
    assert_eq!(march.total, 3);
    assert_eq!(march.success, 3);
}

#[test]
fn sram_only_mode_halves_the_interval_and_skips_flash() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::SramOnly));
    let advanced: Vec<u64> = (0..10)
        .map(|_| s.run_cycle(0, idle()))
        .filter(|summary| summary.advanced)
        .map(|summary| summary.cycle)
        .collect();
    assert_eq!(advanced, [5, 10]);
    assert_eq!(
        s.status(SRAM2).unwrap().tally(TestKind::ModifiedCheckerboard).total,
        2
    );
    assert_eq!(s.status(FLASH2).unwrap().tally(TestKind::FlashProgram).total, 0);
    assert_eq!(s.flash().erases(), 0);
}

// ─── Fault detection ─────────────────────────────────────────────────────────

#[test]
fn stuck_word_is_found_by_address_and_checkerboard() {
    let mut s = host_scheduler(fixed_windows(TestMode::Normal));
    let start = s.window(SRAM2).unwrap().start();
    assert_eq!(start, 0x2001_8400);
    s.memory_mut().inject_stuck_bits(start, u32::MAX, 0);

    let summary = s.run_cycle(0, idle());
    assert!(summary.errors >= 3);

    let st = s.status(SRAM2).unwrap();
    assert_eq!(st.tally(TestKind::Address).success, 0);
    assert_eq!(st.tally(TestKind::Checkerboard).success, 0);
    assert_eq!(st.tally(TestKind::Checkerboard).total, 2);
    assert!(s.sink().contains("Address Error: addr=0x20018400"));
    assert!(s.sink().contains("Checkerboard Error: addr=0x20018400"));

    // Other banks are unaffected.
    assert!(s.status(1).unwrap().is_clean());
    assert!(s.status(3).unwrap().is_clean());
}

#[test]
fn failing_last_test_leaves_sram_read_in_the_store() {
    let mut cfg = fixed_windows(TestMode::Normal);
    cfg.banks.retain(|plan| plan.bank.name == "SRAM2");
    let mut s = host_scheduler(cfg);
    let start = s.window(0).unwrap().start();
    s.memory_mut().inject_stuck_bits(start, u32::MAX, 0);

    s.run_cycle(0, idle());

    let rec = s.store().read_state();
    assert_eq!(rec.operation(), OperationTag::new(TestKind::Checkerboard, 2, 1));
    assert_eq!(rec.error(), Some(ErrorCode::SramRead));
}

#[test]
fn address_alias_is_found_by_address_test() {
    let mut s = host_scheduler(fixed_windows(TestMode::Normal));
    let start = s.window(SRAM2).unwrap().start();
    s.memory_mut().inject_alias(start + 0x100, start);

    s.run_cycle(0, idle());

    let st = s.status(SRAM2).unwrap();
    assert_eq!(st.tally(TestKind::Address).success, 0);
    assert!(s.sink().contains("Address Error: addr=0x20018400"));
}

#[test]
fn mismatches_never_end_the_cycle() {
    let mut s = host_scheduler(fixed_windows(TestMode::Normal));
    let start = s.window(SRAM2).unwrap().start();
    s.memory_mut().inject_stuck_bits(start, 0xFFFF_0000, 0xDEAD_0000);
    for expected in 1..=3 {
        let summary = s.run_cycle(0, idle());
        assert_eq!(summary.cycle, expected);
        assert_eq!(s.phase(), Phase::Idle);
    }
    assert_eq!(s.timer().services(), 3);
}

// ─── Flash ───────────────────────────────────────────────────────────────────

#[test]
fn flash_erase_failure_is_a_transaction_failure() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::FlashOnly));
    s.flash_mut().fail_erase(true);

    let summary = s.run_cycle(0, idle());

    // Every pass fails on its own and the cycle carries on.
    assert_eq!(summary.transaction_failures, 5);
    assert_eq!(summary.errors, 0);
    assert_eq!(s.status(FLASH2).unwrap().transaction_failures, 5);
    assert_eq!(s.store().read_state().error(), Some(ErrorCode::FlashWrite));
    assert!(s.sink().contains("Flash erase failed at 0x0804"));
    assert_eq!(s.timer().services(), 1);
    assert_eq!(s.phase(), Phase::Idle);

    s.flash_mut().fail_erase(false);
    let summary = s.run_cycle(0, idle());
    assert_eq!(summary.transaction_failures, 0);
    assert_eq!(s.status(FLASH2).unwrap().tally(TestKind::FlashProgram).success, 1);
}

#[test]
fn flash_bank_gets_the_basic_set_every_cycle() {
    let mut s = host_scheduler(CoverageConfig::stm32g473());
    let summary = s.run_cycle(0, idle());
    assert_eq!(summary.errors, 0);

    let st = s.status(FLASH2).unwrap();
    assert_eq!(st.tally(TestKind::Address).success, 1);
    assert_eq!(st.tally(TestKind::Butterfly).success, 1);
    assert_eq!(st.tally(TestKind::Checkerboard).success, 2);
    assert_eq!(st.tally(TestKind::FlashProgram).success, 1);
    assert!(s.sink().lines().is_empty());
}

#[test]
fn flash_pages_walk_the_window() {
    let mut s = host_scheduler(fixed_windows(TestMode::FlashOnly));
    let w = s.window(FLASH2).unwrap();
    assert_eq!((w.offset, w.size), (0x1000, 0x8000));

    for _ in 0..3 {
        s.run_cycle(0, idle());
    }

    // Cycle n programs whole page n of the window; the last pass leaves
    // the complemented address pattern behind.
    for (cycle, page) in [(1, 0x1800), (2, 0x2000), (3, 0x2800)] {
        let bus = map::FLASH_BANK2_BASE + page;
        assert_eq!(flash_word(&mut s, bus), !address_pattern(bus, cycle), "page {page:#x}");
    }
    assert_eq!(flash_word(&mut s, map::FLASH_BANK2_BASE + 0x1000), u32::MAX);
    assert_eq!(flash_word(&mut s, map::FLASH_BANK2_BASE + 0x3000), u32::MAX);
    assert_eq!(s.flash().erases(), 15);
}

#[test]
fn flash_bit_flip_fails_the_flash_basic_tests() {
    let mut s = host_scheduler(fixed_windows(TestMode::FlashOnly));
    // Page walked on cycle 1.
    let bus = map::FLASH_BANK2_BASE + 0x1800 + 0x40;
    s.flash_mut().inject_bit_flip(bus - MockFlash::BASE, 0x10);

    let summary = s.run_cycle(0, idle());

    assert_eq!(summary.errors, 10);
    let st = s.status(FLASH2).unwrap();
    assert_eq!(st.tally(TestKind::Address).success, 0);
    assert_eq!(st.tally(TestKind::Butterfly).success, 0);
    assert_eq!(st.tally(TestKind::Checkerboard).success, 0);
    assert!(s.sink().contains("Address Error: addr=0x08041840"));
    assert!(s.sink().contains("Butterfly Error: addr=0x08041840"));
    assert_eq!(s.store().read_state().error(), Some(ErrorCode::FlashRead));
}

#[test]
fn flash_test_stays_in_bank_two() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::FlashOnly));
    for _ in 0..20 {
        s.run_cycle(0, idle());
    }
    let rec = s.store().read_state();
    assert_eq!(rec.operation(), OperationTag::new(TestKind::FlashProgram, 0, 0));
    assert_eq!(s.status(FLASH2).unwrap().tally(TestKind::FlashProgram).success, 20);
    assert_eq!(s.memory().writes(), 0);
}

#[test]
fn cache_only_services_timer_every_iteration() {
    let cfg = CoverageConfig::stm32g473().with_mode(TestMode::CacheOnly);
    let iterations = cfg.cache_iterations;
    let mut s = host_scheduler(cfg);

    s.run_cycle(0, idle());

    assert_eq!(s.timer().services(), iterations + 1);
    assert_eq!(s.flash().erases(), iterations);
    assert_eq!(s.flash().cache_resets(), iterations);
}

#[test]
fn stale_cache_is_recorded_as_cache_invalid() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::FlashOnly));
    s.flash_mut().set_stale_cache(true);
    let summary = s.run_cycle(0, idle());
    assert!(summary.errors > 0);
    assert_eq!(s.store().read_state().error(), Some(ErrorCode::CacheInvalid));
}

#[test]
fn ecc_events_are_attributed_to_the_flash_bank() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::FlashOnly));
    s.run_cycle(
        0,
        EccSnapshot {
            correctable: 4,
            uncorrectable: 0,
        },
    );
    s.run_cycle(
        0,
        EccSnapshot {
            correctable: 5,
            uncorrectable: 1,
        },
    );
    assert_eq!(s.status(FLASH2).unwrap().ecc_events, 6);
}

// ─── Window bounds & persistence ─────────────────────────────────────────────

#[test]
fn writes_stay_inside_the_window() {
    let mut cfg = CoverageConfig::stm32g473();
    cfg.banks.retain(|plan| plan.bank.name == "SRAM2");
    let mut s = host_scheduler(cfg);

    for _ in 0..40 {
        s.memory_mut().reset_write_bounds();
        s.run_cycle(0, idle());
        let w = s.window(0).unwrap();
        let (lo, hi) = s.memory().write_bounds().unwrap();
        assert!(lo >= w.start(), "cycle {}: {:#x} < {:#x}", s.cycle(), lo, w.start());
        assert!(hi < w.end(), "cycle {}: {:#x} >= {:#x}", s.cycle(), hi, w.end());
    }
    assert_eq!(s.memory().out_of_range(), 0);
}

#[test]
fn persisted_tag_names_the_last_test() {
    let mut s = host_scheduler(CoverageConfig::stm32g473().with_mode(TestMode::SramOnly));
    s.run_cycle(0, idle());
    let rec = s.store().read_state();
    // CCM (bank 3) is last; the second checkerboard pass is its last test.
    assert_eq!(rec.operation(), OperationTag::new(TestKind::Checkerboard, 3, 1));
    assert_eq!(rec.cycle, 1);
    assert_eq!(rec.error_code, 0);
}

// ─── Reporting ───────────────────────────────────────────────────────────────

#[test]
fn configuration_and_status_reports_follow_their_schedule() {
    let mut cfg = CoverageConfig::stm32g473().with_mode(TestMode::SramOnly);
    cfg.report = ReportInterval::EveryCycles(4);
    cfg.config_report_every = 8;
    let mut s = host_scheduler(cfg);

    let summaries: Vec<_> = (0..8).map(|_| s.run_cycle(0, idle())).collect();

    let reported: Vec<u64> = summaries.iter().filter(|x| x.reported).map(|x| x.cycle).collect();
    let configured: Vec<u64> = summaries
        .iter()
        .filter(|x| x.config_reported)
        .map(|x| x.cycle)
        .collect();
    assert_eq!(reported, [4, 8]);
    assert_eq!(configured, [8]);
    assert_eq!(s.sink().count_containing("===== Status"), 2);
    assert_eq!(s.sink().count_containing("===== Memory Test Configuration"), 1);
    assert!(s.sink().contains("SRAM2: addr 8/8"));
    assert!(s.sink().contains("Advanced Tests: every 5 cycles, Mode: sram-only"));
}
