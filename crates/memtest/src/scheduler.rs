//! Diagnostic coverage scheduler.
//!
//! One call to [`CoverageScheduler::run_cycle`] is one cycle of the test
//! loop, executed to completion:
//!
//! ```text
//! Idle ─▶ SelectWindows ─▶ RunBasicTests ─┬─▶ RunAdvancedTests ─┬─▶ ReportIfDue ─▶ Idle
//!                                         └─────────────────────┘
//! ```
//!
//! Before every primitive that writes, the operation tag and cycle are
//! persisted so a hang or trap mid-test is attributable on the next boot.
//! Mismatches are counted and reported; nothing a primitive observes ends
//! the cycle. The supervisory timer is serviced once the cycle completes.

use embedded_storage::nor_flash::NorFlash;
use heapless::Vec;
use platform::{BackupRegisters, FlashArray, RawMemory, ReportSink, SupervisoryTimer};

use crate::config::{CoverageConfig, ReportInterval, TestMode, MAX_BANKS};
use crate::pattern::{
    address_pattern, butterfly_page_word, butterfly_pairs, checkerboard_pattern,
    fold_pairs_into_page, CHECKERBOARD, CHECKERBOARD_INV,
};
use crate::primitives::{self, WordRange};
use crate::recovery::EccSnapshot;
use crate::report;
use crate::stats::{BankStatus, TestOutcome};
use crate::store::FaultDiagnosisStore;
use crate::tag::{ErrorCode, OperationTag, TestKind};
use crate::window::{BankKind, MemoryBank, TestWindow, WindowPlanner};

/// The set of capabilities one target provides.
///
/// A type family: implementors are usually empty marker types naming the
/// concrete driver for each role.
pub trait Board {
    /// Word access to the banks under test.
    type Memory: RawMemory;
    /// Flash array holding the flash bank under test.
    type Flash: FlashArray;
    /// Persistent diagnostic slots.
    type Backup: BackupRegisters;
    /// Supervisory timer.
    type Timer: SupervisoryTimer;
    /// Report transport.
    type Sink: ReportSink;
}

/// Monotonic cycle count.
///
/// 64 bits: at one cycle per microsecond it wraps after about 584 000 years.
/// Persisted slots and pattern generators take the low 32 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleCounter(u64);

impl CycleCounter {
    /// Counter at zero; the first cycle run is cycle 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Step to the next cycle and return it.
    pub fn advance(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    /// Current cycle.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Low 32 bits, as persisted.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }
}

/// Where in the cycle the scheduler is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Between cycles.
    Idle,
    /// Rotating windows.
    SelectWindows,
    /// Address, butterfly, checkerboard and flash tests.
    RunBasicTests,
    /// March C-, walking bits, modified checkerboard.
    RunAdvancedTests,
    /// Emitting the status report if due.
    ReportIfDue,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleSummary {
    /// Cycle number.
    pub cycle: u64,
    /// Advanced tests ran on at least one bank.
    pub advanced: bool,
    /// Mismatching words over all primitives.
    pub errors: u32,
    /// Failed flash erase/program operations.
    pub transaction_failures: u32,
    /// The status report was emitted.
    pub reported: bool,
    /// The configuration report was emitted.
    pub config_reported: bool,
}

/// Drives every bank through the test set, one cycle per call.
pub struct CoverageScheduler<B: Board> {
    config: CoverageConfig,
    planners: Vec<WindowPlanner, MAX_BANKS>,
    stats: Vec<BankStatus, MAX_BANKS>,
    cycle: CycleCounter,
    phase: Phase,
    last_report_ms: u64,
    last_ecc: EccSnapshot,
    memory: B::Memory,
    flash: B::Flash,
    store: FaultDiagnosisStore<B::Backup>,
    timer: B::Timer,
    sink: B::Sink,
}

impl<B: Board> CoverageScheduler<B> {
    /// Sanitize `config` and build one planner per bank.
    ///
    /// The timer is expected to be armed already.
    pub fn new(
        mut config: CoverageConfig,
        memory: B::Memory,
        flash: B::Flash,
        store: FaultDiagnosisStore<B::Backup>,
        timer: B::Timer,
        sink: B::Sink,
    ) -> Self {
        if config.sanitize() {
            #[cfg(feature = "defmt")]
            defmt::warn!("coverage configuration was clamped");
            #[cfg(feature = "tracing")]
            tracing::warn!("coverage configuration was clamped");
        }

        let planners = config
            .banks
            .iter()
            .map(|plan| WindowPlanner::new(plan.bank, plan.coverage))
            .collect();
        let stats = config.banks.iter().map(|_| BankStatus::new()).collect();

        Self {
            config,
            planners,
            stats,
            cycle: CycleCounter::new(),
            phase: Phase::Idle,
            last_report_ms: 0,
            last_ecc: EccSnapshot::default(),
            memory,
            flash,
            store,
            timer,
            sink,
        }
    }

    /// Run one full cycle.
    ///
    /// `now_ms` is uptime for time-based reporting; `ecc` the current value of
    /// the shared ECC counters.
    pub fn run_cycle(&mut self, now_ms: u64, ecc: EccSnapshot) -> CycleSummary {
        let cycle = self.cycle.advance();
        let mut summary = CycleSummary {
            cycle,
            ..CycleSummary::default()
        };

        self.enter(Phase::SelectWindows);
        let rotation = self.config.rotation;
        for planner in &mut self.planners {
            planner.rotate(cycle, rotation);
        }
        let every = self.config.config_report_every;
        if cycle.checked_rem(u64::from(every)) == Some(0) {
            self.report_configuration();
            summary.config_reported = true;
        }
        self.fold_ecc(ecc);

        self.enter(Phase::RunBasicTests);
        for index in 0..self.planners.len() {
            let Some(window) = self.active_window(index) else {
                continue;
            };
            match window.bank.kind {
                BankKind::Ram => self.run_basic(index, &window, &mut summary),
                BankKind::Flash => self.run_flash(index, &window, &mut summary),
            }
        }

        let interval = self.config.mode.advanced_interval(self.config.advanced_interval);
        if cycle.checked_rem(u64::from(interval)) == Some(0) {
            self.enter(Phase::RunAdvancedTests);
            for index in 0..self.planners.len() {
                let Some(window) = self.active_window(index) else {
                    continue;
                };
                if window.bank.kind == BankKind::Ram
                    && self.run_advanced(index, &window, &mut summary)
                {
                    summary.advanced = true;
                }
            }
        }

        self.enter(Phase::ReportIfDue);
        if self.report_due(cycle, now_ms) {
            self.last_report_ms = now_ms;
            report::status(
                &mut self.sink,
                cycle,
                now_ms,
                self.planners.iter().map(WindowPlanner::bank).zip(self.stats.iter()),
            );
            summary.reported = true;
        }

        self.timer.service();
        self.enter(Phase::Idle);

        if summary.errors > 0 || summary.transaction_failures > 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "cycle {=u64}: {=u32} mismatches, {=u32} flash failures",
                cycle,
                summary.errors,
                summary.transaction_failures
            );
            #[cfg(feature = "tracing")]
            tracing::warn!(
                cycle,
                errors = summary.errors,
                transaction_failures = summary.transaction_failures,
                "cycle found faults"
            );
        }
        summary
    }

    /// Emit the configuration block with the current windows.
    pub fn report_configuration(&mut self) {
        report::configuration(
            &mut self.sink,
            &self.config,
            self.planners.iter().map(WindowPlanner::window),
        );
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        #[cfg(feature = "defmt")]
        defmt::trace!("cycle {=u64}: {}", self.cycle.get(), phase);
        #[cfg(feature = "tracing")]
        tracing::trace!(cycle = self.cycle.get(), ?phase, "phase");
    }

    /// Window of bank `index` if the mode covers it and it is not empty.
    fn active_window(&self, index: usize) -> Option<TestWindow> {
        let window = self.planners.get(index)?.window();
        (self.config.mode.covers(window.bank.kind) && !window.is_empty()).then_some(window)
    }

    fn fold_ecc(&mut self, ecc: EccSnapshot) {
        let delta = ecc.since(&self.last_ecc);
        self.last_ecc = ecc;
        if delta.total() == 0 {
            return;
        }
        let flash_bank = self
            .planners
            .iter()
            .position(|p| p.bank().kind == BankKind::Flash);
        if let Some(status) = flash_bank.and_then(|i| self.stats.get_mut(i)) {
            status.record_ecc(delta.total());
        }
    }

    fn report_due(&self, cycle: u64, now_ms: u64) -> bool {
        match self.config.report {
            ReportInterval::EveryCycles(n) => cycle.checked_rem(u64::from(n)) == Some(0),
            ReportInterval::EveryMillis(ms) => now_ms.saturating_sub(self.last_report_ms) >= ms,
        }
    }

    /// Persist the tag, run `test` on the memory, fold the result in.
    fn run_tagged<F>(&mut self, index: usize, kind: TestKind, variant: u8, test: F) -> u32
    where
        F: FnOnce(&mut B::Memory, &mut B::Sink) -> u32,
    {
        let bank_id = self.planners.get(index).map_or(0, |p| p.bank().id);
        self.store.write_state(
            OperationTag::new(kind, bank_id, variant),
            self.cycle.low(),
            ErrorCode::None,
        );
        let errors = test(&mut self.memory, &mut self.sink);
        if let Some(status) = self.stats.get_mut(index) {
            status.record(TestOutcome { errors, kind });
        }
        if errors > 0 {
            self.store.record_error(ErrorCode::SramRead);
        }
        errors
    }

    fn run_basic(&mut self, index: usize, window: &TestWindow, summary: &mut CycleSummary) {
        let cycle = self.cycle.low();
        let range = WordRange::new(window.start(), window.size);
        let stride = self.config.address_stride;
        let pairs = butterfly_pairs(window, cycle, self.config.butterfly_pairs);

        let errors = [
            self.run_tagged(index, TestKind::Address, 0, |mem, sink| {
                primitives::address_test(mem, range, stride, cycle, sink)
            }),
            self.run_tagged(index, TestKind::Butterfly, 0, |mem, sink| {
                primitives::butterfly_test(mem, &pairs, cycle, sink)
            }),
            self.run_tagged(index, TestKind::Checkerboard, 0, |mem, sink| {
                primitives::checkerboard_test(mem, range, CHECKERBOARD, sink)
            }),
            self.run_tagged(index, TestKind::Checkerboard, 1, |mem, sink| {
                primitives::checkerboard_test(mem, range, CHECKERBOARD_INV, sink)
            }),
        ];
        summary.errors = errors
            .iter()
            .fold(summary.errors, |acc, e| acc.saturating_add(*e));
    }

    /// `false` when the window's advanced fraction holds no word.
    fn run_advanced(
        &mut self,
        index: usize,
        window: &TestWindow,
        summary: &mut CycleSummary,
    ) -> bool {
        let cycle = self.cycle.low();
        let part = window.fraction(self.config.mode.advanced_divisor());
        if part.is_empty() {
            return false;
        }
        let range = WordRange::new(part.start(), part.size);

        let mut errors = self
            .run_tagged(index, TestKind::MarchC, 0, |mem, sink| {
                primitives::march_c_test(mem, range, sink)
            })
            .saturating_add(self.run_tagged(index, TestKind::Walking, 0, |mem, sink| {
                primitives::walking_test(mem, range, false, sink)
            }))
            .saturating_add(self.run_tagged(index, TestKind::Walking, 1, |mem, sink| {
                primitives::walking_test(mem, range, true, sink)
            }));
        if self.config.mode.modified_checkerboard() {
            errors = errors.saturating_add(self.run_tagged(
                index,
                TestKind::ModifiedCheckerboard,
                0,
                |mem, sink| primitives::modified_checkerboard_test(mem, range, cycle, sink),
            ));
        }
        summary.errors = summary.errors.saturating_add(errors);
        true
    }

    /// Basic set and program/cache passes on one page of the flash window.
    ///
    /// The page walks the window one step per cycle. `CacheOnly` skips the
    /// basic set and repeats the program/cache pass, servicing the timer
    /// after each one.
    fn run_flash(&mut self, index: usize, window: &TestWindow, summary: &mut CycleSummary) {
        let cycle = self.cycle.low();
        let page_len = u32::try_from(<B::Flash as NorFlash>::ERASE_SIZE)
            .unwrap_or(u32::MAX)
            .max(1);
        let in_bank = window.page(page_len, cycle);
        let page_bus = window.bank.base.wrapping_add(in_bank);
        let page_offset = page_bus.wrapping_sub(<B::Flash as FlashArray>::BUS_BASE);

        if self.config.mode != TestMode::CacheOnly {
            let pairs = fold_pairs_into_page(
                &butterfly_pairs(window, cycle, self.config.butterfly_pairs),
                window.start(),
                page_bus,
                page_len,
            );
            let swapped = cycle & 1 != 0;
            self.run_flash_tagged(index, TestKind::Address, 0, page_offset, summary, |addr| {
                address_pattern(addr, cycle)
            });
            self.run_flash_tagged(
                index,
                TestKind::Butterfly,
                u8::from(swapped),
                page_offset,
                summary,
                |addr| butterfly_page_word(&pairs, addr, cycle, swapped),
            );
            for (variant, background) in [(0, CHECKERBOARD), (1, CHECKERBOARD_INV)] {
                self.run_flash_tagged(
                    index,
                    TestKind::Checkerboard,
                    variant,
                    page_offset,
                    summary,
                    |addr| checkerboard_pattern(addr, background),
                );
            }
        }

        let passes = self.config.mode.flash_passes(self.config.cache_iterations);
        for pass in 0..passes {
            let variant = u8::try_from(pass).unwrap_or(u8::MAX);
            self.run_flash_tagged(
                index,
                TestKind::FlashProgram,
                variant,
                page_offset,
                summary,
                |addr| !address_pattern(addr, cycle),
            );
            if self.config.mode == TestMode::CacheOnly {
                self.timer.service();
            }
        }
    }

    /// Persist the tag, run one flash pass, fold the result in.
    fn run_flash_tagged<P>(
        &mut self,
        index: usize,
        kind: TestKind,
        variant: u8,
        page_offset: u32,
        summary: &mut CycleSummary,
        pattern: P,
    ) where
        P: Fn(u32) -> u32,
    {
        let bank_id = self.planners.get(index).map_or(0, |p| p.bank().id);
        self.store.write_state(
            OperationTag::new(kind, bank_id, variant),
            self.cycle.low(),
            ErrorCode::None,
        );
        let result = primitives::flash_pattern_test(
            &mut self.flash,
            page_offset,
            kind,
            pattern,
            &mut self.sink,
        );
        let status = self.stats.get_mut(index);
        match result {
            Ok(outcome) => {
                if let Some(status) = status {
                    status.record(TestOutcome {
                        errors: outcome.errors(),
                        kind,
                    });
                }
                if outcome.after_cache_reset > 0 {
                    self.store.record_error(ErrorCode::FlashRead);
                } else if outcome.cache_only() {
                    self.store.record_error(ErrorCode::CacheInvalid);
                }
                summary.errors = summary.errors.saturating_add(outcome.errors());
            }
            Err(error) => {
                if let Some(status) = status {
                    status.record_transaction_failure();
                }
                self.store.record_error(ErrorCode::FlashWrite);
                report::flash_failure(&mut self.sink, &error);
                summary.transaction_failures = summary.transaction_failures.saturating_add(1);

                #[cfg(feature = "defmt")]
                defmt::error!("{}", error);
                #[cfg(feature = "tracing")]
                tracing::error!(%error, "flash transaction failed");
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Last cycle run, 0 before the first.
    pub fn cycle(&self) -> u64 {
        self.cycle.get()
    }

    /// Current phase. Always [`Phase::Idle`] between calls.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sanitized configuration in use.
    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Current window of bank `index`.
    pub fn window(&self, index: usize) -> Option<TestWindow> {
        self.planners.get(index).map(WindowPlanner::window)
    }

    /// Cumulative statistics of bank `index`.
    pub fn status(&self, index: usize) -> Option<&BankStatus> {
        self.stats.get(index)
    }

    /// Every bank with its statistics.
    pub fn banks(&self) -> impl Iterator<Item = (&MemoryBank, &BankStatus)> {
        self.planners.iter().map(WindowPlanner::bank).zip(self.stats.iter())
    }

    /// Persistent store.
    pub fn store(&self) -> &FaultDiagnosisStore<B::Backup> {
        &self.store
    }

    /// Memory under test.
    pub fn memory(&self) -> &B::Memory {
        &self.memory
    }

    /// Memory under test, mutably.
    pub fn memory_mut(&mut self) -> &mut B::Memory {
        &mut self.memory
    }

    /// Flash driver.
    pub fn flash(&self) -> &B::Flash {
        &self.flash
    }

    /// Flash driver, mutably.
    pub fn flash_mut(&mut self) -> &mut B::Flash {
        &mut self.flash
    }

    /// Supervisory timer.
    pub fn timer(&self) -> &B::Timer {
        &self.timer
    }

    /// Report sink.
    pub fn sink(&self) -> &B::Sink {
        &self.sink
    }

    /// Report sink, mutably.
    pub fn sink_mut(&mut self) -> &mut B::Sink {
        &mut self.sink
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
    use crate::config::{BankCoverage, BankPlan, Rotation};
    use embedded_storage::nor_flash::ReadNorFlash;
    use platform::mocks::{LineRecorder, MockBackupRegisters, MockFlash, MockSupervisor, SimulatedMemory};

    struct Host;

    impl Board for Host {
        type Memory = SimulatedMemory;
        type Flash = MockFlash;
        type Backup = MockBackupRegisters;
        type Timer = MockSupervisor;
        type Sink = LineRecorder;
    }

    const RAM: MemoryBank = MemoryBank {
        id: 1,
        name: "RAM",
        base: 0x2000_0000,
        size: 0x2000,
        safety_margin: 0x100,
        kind: BankKind::Ram,
    };

    fn scheduler(config: CoverageConfig) -> CoverageScheduler<Host> {
        CoverageScheduler::new(
            config,
            SimulatedMemory::new().with_region(RAM.base, RAM.size),
            MockFlash::new(4 * MockFlash::PAGE),
            FaultDiagnosisStore::new(MockBackupRegisters::new()),
            MockSupervisor::new(),
            LineRecorder::new(),
        )
    }

    fn ram_only() -> CoverageConfig {
        let plan = BankPlan {
            bank: RAM,
            coverage: BankCoverage {
                tiers: [0x400, 0x800, 0x1000],
                initial_offset: 0x100,
                offset_stride: 0x1F4,
            },
        };
        let mut cfg = CoverageConfig::new([plan].into_iter().collect());
        cfg.config_report_every = 0;
        cfg.report = ReportInterval::EveryCycles(1_000);
        cfg
    }

    #[test]
    fn cycle_counter_low_bits() {
        let mut c = CycleCounter(u64::from(u32::MAX));
        assert_eq!(c.advance(), 1 << 32);
        assert_eq!(c.low(), 0);
    }

    #[test]
    fn clean_cycle_services_timer_once() {
        let mut s = scheduler(ram_only());
        let summary = s.run_cycle(0, EccSnapshot::default());
        assert_eq!(summary.cycle, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.advanced);
        assert_eq!(s.timer().services(), 1);
        assert_eq!(s.phase(), Phase::Idle);
        let st = s.status(0).unwrap();
        assert_eq!(st.tally(TestKind::Checkerboard).total, 2);
        assert_eq!(st.tally(TestKind::Address).success, 1);
    }

    #[test]
    fn last_tag_is_second_checkerboard_pass() {
        let mut s = scheduler(ram_only());
        s.run_cycle(0, EccSnapshot::default());
        let rec = s.store().read_state();
        assert_eq!(rec.operation(), OperationTag::new(TestKind::Checkerboard, 1, 1));
        assert_eq!(rec.cycle, 1);
        assert_eq!(rec.error_code, 0);
    }

    #[test]
    fn mismatch_sets_sram_read_error() {
        let mut s = scheduler(ram_only());
        let w = s.window(0).unwrap();
        // The first cycle rotates before testing; inject where cycle 1 lands.
        let next = crate::window::advance_offset(&RAM, w.size, w.offset, 0x1F4);
        s.memory_mut()
            .inject_stuck_bits(RAM.base + next, u32::MAX, 0x1234_5678);
        let summary = s.run_cycle(0, EccSnapshot::default());
        assert!(summary.errors > 0);
        assert_eq!(s.store().read_state().error(), Some(ErrorCode::SramRead));
    }

    #[test]
    fn ecc_delta_goes_to_flash_bank_only_once() {
        let mut cfg = ram_only();
        let flash_plan = BankPlan {
            bank: MemoryBank {
                id: 0,
                name: "FLASH",
                base: MockFlash::BASE,
                size: 4 * 2048,
                safety_margin: 0x800,
                kind: BankKind::Flash,
            },
            coverage: BankCoverage {
                tiers: [0x800, 0x800, 0x800],
                initial_offset: 0x800,
                offset_stride: 0x800,
            },
        };
        cfg.banks.push(flash_plan).unwrap();
        let mut s = scheduler(cfg);
        let ecc = EccSnapshot {
            correctable: 2,
            uncorrectable: 1,
        };
        s.run_cycle(0, ecc);
        s.run_cycle(0, ecc);
        assert_eq!(s.status(1).unwrap().ecc_events, 3);
        assert_eq!(s.status(0).unwrap().ecc_events, 0);
    }

    /// Four-page flash bank at the mock base with a fixed 3-page window
    /// starting mid-page, so two whole pages fit.
    fn with_fixed_flash_window(mut cfg: CoverageConfig) -> CoverageConfig {
        cfg.banks
            .push(BankPlan {
                bank: MemoryBank {
                    id: 0,
                    name: "FLASH",
                    base: MockFlash::BASE,
                    size: 4 * 2048,
                    safety_margin: 0,
                    kind: BankKind::Flash,
                },
                coverage: BankCoverage {
                    tiers: [0x1800, 0x1800, 0x1800],
                    initial_offset: 0x400,
                    offset_stride: 0x800,
                },
            })
            .unwrap();
        cfg.rotation = Rotation {
            rotate_offsets: false,
            rotate_sizes: false,
            size_rotation_period: 1,
        };
        cfg
    }

    fn flash_word(s: &mut CoverageScheduler<Host>, offset: u32) -> u32 {
        let mut bytes = [0u8; 4];
        s.flash_mut().read(offset, &mut bytes).unwrap();
        u32::from_le_bytes(bytes)
    }

    #[test]
    fn flash_page_runs_the_basic_set_then_the_program_pass() {
        let mut s = scheduler(with_fixed_flash_window(ram_only()));
        let summary = s.run_cycle(0, EccSnapshot::default());
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.transaction_failures, 0);

        let st = s.status(1).unwrap();
        assert_eq!(st.tally(TestKind::Address).success, 1);
        assert_eq!(st.tally(TestKind::Butterfly).success, 1);
        assert_eq!(st.tally(TestKind::Checkerboard).success, 2);
        assert_eq!(st.tally(TestKind::FlashProgram).success, 1);
        // One erase per pass.
        assert_eq!(s.flash().erases(), 5);
        assert_eq!(
            s.store().read_state().operation(),
            OperationTag::new(TestKind::FlashProgram, 0, 0)
        );
    }

    #[test]
    fn flash_pages_walk_the_window_across_cycles() {
        let mut s = scheduler(with_fixed_flash_window(ram_only()));
        // Window [0x400, 0x1C00) holds the whole pages 0x800 and 0x1000.
        s.run_cycle(0, EccSnapshot::default());
        assert_eq!(
            flash_word(&mut s, 0x1000),
            !crate::pattern::address_pattern(MockFlash::BASE + 0x1000, 1)
        );
        assert_eq!(flash_word(&mut s, 0x800), u32::MAX);

        s.run_cycle(0, EccSnapshot::default());
        assert_eq!(
            flash_word(&mut s, 0x800),
            !crate::pattern::address_pattern(MockFlash::BASE + 0x800, 2)
        );
        // Pages only partly inside the window stay erased.
        assert_eq!(flash_word(&mut s, 0), u32::MAX);
        assert_eq!(flash_word(&mut s, 0x1800), u32::MAX);
    }

    #[test]
    fn flash_mismatch_is_counted_under_the_failing_pattern() {
        let mut s = scheduler(with_fixed_flash_window(ram_only()));
        s.flash_mut().inject_bit_flip(0x1000 + 8, 0x80);
        let summary = s.run_cycle(0, EccSnapshot::default());
        // Five passes, each reading the flipped byte before and after the
        // cache reset.
        assert_eq!(summary.errors, 10);
        let st = s.status(1).unwrap();
        assert_eq!(st.tally(TestKind::Address).success, 0);
        assert_eq!(st.tally(TestKind::Checkerboard).total, 2);
        assert_eq!(st.tally(TestKind::Checkerboard).success, 0);
        assert_eq!(s.store().read_state().error(), Some(ErrorCode::FlashRead));
        assert!(s.sink().contains("Checkerboard Error: addr=0x08001008"));
    }

    #[test]
    fn advanced_set_skips_a_window_too_small_to_split() {
        let mut cfg = ram_only();
        cfg.banks[0].coverage.tiers = [0x10, 0x10, 0x10];
        cfg.advanced_interval = 1;
        let mut s = scheduler(cfg);
        let summary = s.run_cycle(0, EccSnapshot::default());
        // 0x10 / 8 leaves no whole word.
        assert!(!summary.advanced);
        let st = s.status(0).unwrap();
        assert_eq!(st.tally(TestKind::MarchC).total, 0);
        assert_eq!(st.tally(TestKind::Walking).total, 0);
        assert_eq!(st.tally(TestKind::Address).success, 1);
    }

    #[test]
    fn advanced_set_runs_once_the_fraction_holds_a_word() {
        let mut cfg = ram_only();
        cfg.advanced_interval = 1;
        let mut s = scheduler(cfg);
        assert!(s.run_cycle(0, EccSnapshot::default()).advanced);
        assert_eq!(s.status(0).unwrap().tally(TestKind::MarchC).success, 1);
    }

    #[test]
    fn millisecond_report_interval() {
        let mut cfg = ram_only();
        cfg.report = ReportInterval::EveryMillis(1_000);
        let mut s = scheduler(cfg);
        assert!(!s.run_cycle(500, EccSnapshot::default()).reported);
        assert!(s.run_cycle(1_000, EccSnapshot::default()).reported);
        assert!(!s.run_cycle(1_900, EccSnapshot::default()).reported);
        assert!(s.run_cycle(2_000, EccSnapshot::default()).reported);
        assert!(s.sink().contains("RAM: addr 4/4"));
    }
}
