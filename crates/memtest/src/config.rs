//! Coverage configuration.
//!
//! Built once at startup from compile-time defaults and sanitized before the
//! scheduler takes it. After that only the planners' own rotation state
//! changes; the configuration itself is read-only.
//!
//! # Defaults (STM32G473CB)
//!
//! | Bank   | Tiers (S / M / L)           | Initial offset | Stride   |
//! |--------|-----------------------------|----------------|----------|
//! | FLASH2 | 0x8000 / 0x10000 / 0x20000  | margin         | 0xFFF4   |
//! | SRAM1  | 0x4000 / 0x8000 / 0x10000   | margin         | 0x3FF4   |
//! | SRAM2  | 0x2000 / 0x4000 / 0x6000    | 0x400          | 0x0FF4   |
//! | CCM    | 0x2000 / 0x4000 / 0x6000    | 0x400          | 0x0FF4   |
//!
//! Every stride is four times a prime, so it stays word-aligned and shares
//! no factor with the usable span beyond the word size.

use heapless::Vec;
use platform::{align_down, align_up, memory_map as map, WORD_BYTES};

use crate::pattern::MAX_BUTTERFLY_PAIRS;
use crate::window::{BankKind, MemoryBank};

/// Most banks one scheduler drives.
pub const MAX_BANKS: usize = 4;

/// Default size-tier period in cycles.
pub const DEFAULT_SIZE_ROTATION_PERIOD: u32 = 5;
/// Default advanced-test interval in cycles.
pub const DEFAULT_ADVANCED_INTERVAL: u32 = 10;
/// Default address-test stride in bytes.
pub const DEFAULT_ADDRESS_STRIDE: u32 = 256;
/// Default number of bank-spanning butterfly pairs.
pub const DEFAULT_BUTTERFLY_PAIRS: u32 = 16;
/// Default configuration report period in cycles.
pub const DEFAULT_CONFIG_REPORT_EVERY: u32 = 20;
/// Default status report period.
pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 1_000;
/// Default flash test repetitions in cache-only mode.
pub const DEFAULT_CACHE_ITERATIONS: u32 = 5;

/// Window sizing and movement for one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankCoverage {
    /// Window size for the small, medium and large tier.
    pub tiers: [u32; 3],
    /// Bank-relative offset of the first window.
    pub initial_offset: u32,
    /// Bytes the offset advances per cycle.
    pub offset_stride: u32,
}

/// Rotation switches shared by every planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rotation {
    /// Advance window offsets every cycle.
    pub rotate_offsets: bool,
    /// Cycle through size tiers.
    pub rotate_sizes: bool,
    /// Cycles between tier changes.
    pub size_rotation_period: u32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            rotate_offsets: true,
            rotate_sizes: true,
            size_rotation_period: DEFAULT_SIZE_ROTATION_PERIOD,
        }
    }
}

/// When the per-bank status report is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportInterval {
    /// Every `n` cycles.
    EveryCycles(u32),
    /// When at least this many milliseconds passed since the last report.
    EveryMillis(u64),
}

/// Which tests a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestMode {
    /// All banks; advanced tests on 1/8 of the window.
    Normal,
    /// All banks; advanced tests on 1/4 of the window.
    Stress,
    /// RAM banks only, advanced tests twice as often on 1/4 of the window,
    /// plus the modified checkerboard.
    SramOnly,
    /// Flash banks only.
    FlashOnly,
    /// Flash banks only, program/verify repeated to stress the read cache.
    CacheOnly,
}

impl TestMode {
    /// Report label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Stress => "stress",
            Self::SramOnly => "sram-only",
            Self::FlashOnly => "flash-only",
            Self::CacheOnly => "cache-only",
        }
    }

    /// `true` if banks of `kind` are tested in this mode.
    #[must_use]
    pub const fn covers(self, kind: BankKind) -> bool {
        match (self, kind) {
            (Self::SramOnly, BankKind::Flash) => false,
            (Self::FlashOnly | Self::CacheOnly, BankKind::Ram) => false,
            _ => true,
        }
    }

    /// Effective advanced-test interval for a configured `base`.
    #[must_use]
    pub const fn advanced_interval(self, base: u32) -> u32 {
        let interval = match self {
            Self::SramOnly => base / 2,
            _ => base,
        };
        if interval == 0 {
            1
        } else {
            interval
        }
    }

    /// Advanced tests run on `window.size / divisor` bytes.
    #[must_use]
    pub const fn advanced_divisor(self) -> u32 {
        match self {
            Self::Normal => 8,
            _ => 4,
        }
    }

    /// Flash program/verify passes per cycle.
    #[must_use]
    pub const fn flash_passes(self, cache_iterations: u32) -> u32 {
        match self {
            Self::CacheOnly => cache_iterations,
            _ => 1,
        }
    }

    /// `true` if the modified checkerboard joins the advanced set.
    #[must_use]
    pub const fn modified_checkerboard(self) -> bool {
        matches!(self, Self::SramOnly)
    }
}

/// One bank and how its window moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankPlan {
    /// The bank.
    pub bank: MemoryBank,
    /// Its window sizing.
    pub coverage: BankCoverage,
}

/// Everything the scheduler needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageConfig {
    /// Banks in test order.
    pub banks: Vec<BankPlan, MAX_BANKS>,
    /// Rotation switches.
    pub rotation: Rotation,
    /// Advanced tests run when `cycle % advanced_interval == 0`.
    pub advanced_interval: u32,
    /// Status report schedule.
    pub report: ReportInterval,
    /// Address test touches one word every `address_stride` bytes.
    pub address_stride: u32,
    /// Bank-spanning butterfly pairs per cycle (at most 32).
    pub butterfly_pairs: u32,
    /// Configuration report period in cycles; 0 disables it.
    pub config_report_every: u32,
    /// Which tests run.
    pub mode: TestMode,
    /// Flash passes per cycle in [`TestMode::CacheOnly`].
    pub cache_iterations: u32,
}

impl CoverageConfig {
    /// Defaults for `banks`.
    #[must_use]
    pub fn new(banks: Vec<BankPlan, MAX_BANKS>) -> Self {
        Self {
            banks,
            rotation: Rotation::default(),
            advanced_interval: DEFAULT_ADVANCED_INTERVAL,
            report: ReportInterval::EveryMillis(DEFAULT_REPORT_INTERVAL_MS),
            address_stride: DEFAULT_ADDRESS_STRIDE,
            butterfly_pairs: DEFAULT_BUTTERFLY_PAIRS,
            config_report_every: DEFAULT_CONFIG_REPORT_EVERY,
            mode: TestMode::Normal,
            cache_iterations: DEFAULT_CACHE_ITERATIONS,
        }
    }

    /// The four banks of the STM32G473CB with their default coverage.
    #[must_use]
    pub fn stm32g473() -> Self {
        let plans = [
            BankPlan {
                bank: MemoryBank {
                    id: 0,
                    name: "FLASH2",
                    base: map::FLASH_BANK2_BASE,
                    size: map::FLASH_BANK_SIZE,
                    safety_margin: map::FLASH_MARGIN,
                    kind: BankKind::Flash,
                },
                coverage: BankCoverage {
                    tiers: [0x8000, 0x1_0000, 0x2_0000],
                    initial_offset: map::FLASH_MARGIN,
                    offset_stride: 0xFFF4,
                },
            },
            BankPlan {
                bank: MemoryBank {
                    id: 1,
                    name: "SRAM1",
                    base: map::SRAM1_BASE,
                    size: map::SRAM1_SIZE,
                    safety_margin: map::SRAM1_MARGIN,
                    kind: BankKind::Ram,
                },
                coverage: BankCoverage {
                    tiers: [0x4000, 0x8000, 0x1_0000],
                    initial_offset: map::SRAM1_MARGIN,
                    offset_stride: 0x3FF4,
                },
            },
            BankPlan {
                bank: MemoryBank {
                    id: 2,
                    name: "SRAM2",
                    base: map::SRAM2_BASE,
                    size: map::SRAM2_SIZE,
                    safety_margin: map::SRAM2_MARGIN,
                    kind: BankKind::Ram,
                },
                coverage: BankCoverage {
                    tiers: [0x2000, 0x4000, 0x6000],
                    initial_offset: 0x400,
                    offset_stride: 0x0FF4,
                },
            },
            BankPlan {
                bank: MemoryBank {
                    id: 3,
                    name: "CCM",
                    base: map::CCM_BASE,
                    size: map::CCM_SIZE,
                    safety_margin: map::CCM_MARGIN,
                    kind: BankKind::Ram,
                },
                coverage: BankCoverage {
                    tiers: [0x2000, 0x4000, 0x6000],
                    initial_offset: 0x400,
                    offset_stride: 0x0FF4,
                },
            },
        ];
        Self::new(plans.into_iter().collect())
    }

    /// Same configuration in another mode.
    #[must_use]
    pub fn with_mode(mut self, mode: TestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Clamp every value the scheduler and planners rely on.
    ///
    /// Zero periods become 1, strides and margins are rounded up to a word,
    /// tier sizes down to a word, and the butterfly pair count is capped.
    /// Returns `true` if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();

        self.rotation.size_rotation_period = self.rotation.size_rotation_period.max(1);
        self.advanced_interval = self.advanced_interval.max(1);
        self.cache_iterations = self.cache_iterations.max(1);
        self.address_stride = align_up(self.address_stride.max(WORD_BYTES));
        self.butterfly_pairs = self
            .butterfly_pairs
            .min(u32::try_from(MAX_BUTTERFLY_PAIRS).unwrap_or(u32::MAX));
        self.report = match self.report {
            ReportInterval::EveryCycles(n) => ReportInterval::EveryCycles(n.max(1)),
            ms @ ReportInterval::EveryMillis(_) => ms,
        };

        for plan in &mut self.banks {
            plan.bank.safety_margin = align_up(plan.bank.safety_margin);
            plan.coverage.offset_stride = align_up(plan.coverage.offset_stride.max(WORD_BYTES));
            for tier in &mut plan.coverage.tiers {
                *tier = align_down(*tier);
            }
        }

        *self != before
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

    #[test]
    fn defaults_are_already_sane() {
        let mut cfg = CoverageConfig::stm32g473();
        assert!(!cfg.sanitize());
        assert_eq!(cfg.banks.len(), 4);
    }

    #[test]
    fn default_strides_are_word_multiples_of_a_prime() {
        let cfg = CoverageConfig::stm32g473();
        for plan in &cfg.banks {
            let words = plan.coverage.offset_stride / 4;
            assert_eq!(plan.coverage.offset_stride % 4, 0);
            assert!((2..words).all(|d| words % d != 0), "{} not prime", words);
        }
    }

    #[test]
    fn bank_ids_are_unique() {
        let cfg = CoverageConfig::stm32g473();
        for (i, a) in cfg.banks.iter().enumerate() {
            for b in cfg.banks.iter().skip(i + 1) {
                assert_ne!(a.bank.id, b.bank.id);
            }
        }
    }

    #[test]
    fn sanitize_clamps_zero_periods() {
        let mut cfg = CoverageConfig::stm32g473();
        cfg.rotation.size_rotation_period = 0;
        cfg.advanced_interval = 0;
        cfg.report = ReportInterval::EveryCycles(0);
        cfg.butterfly_pairs = 99;
        cfg.address_stride = 3;
        assert!(cfg.sanitize());
        assert_eq!(cfg.rotation.size_rotation_period, 1);
        assert_eq!(cfg.advanced_interval, 1);
        assert_eq!(cfg.report, ReportInterval::EveryCycles(1));
        assert_eq!(cfg.butterfly_pairs, 32);
        assert_eq!(cfg.address_stride, 4);
    }

    #[test]
    fn sanitize_aligns_bank_geometry() {
        let mut cfg = CoverageConfig::stm32g473();
        if let Some(plan) = cfg.banks.get_mut(2) {
            plan.bank.safety_margin = 0x401;
            plan.coverage.offset_stride = 0x101;
            plan.coverage.tiers = [0x1003, 0x2002, 0x3001];
        }
        cfg.sanitize();
        let plan = cfg.banks.get(2).unwrap();
        assert_eq!(plan.bank.safety_margin, 0x404);
        assert_eq!(plan.coverage.offset_stride, 0x104);
        assert_eq!(plan.coverage.tiers, [0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn sram_only_halves_interval_but_never_to_zero() {
        assert_eq!(TestMode::SramOnly.advanced_interval(10), 5);
        assert_eq!(TestMode::SramOnly.advanced_interval(1), 1);
        assert_eq!(TestMode::Normal.advanced_interval(10), 10);
    }

    #[test]
    fn mode_bank_coverage() {
        assert!(TestMode::Normal.covers(BankKind::Flash));
        assert!(TestMode::Normal.covers(BankKind::Ram));
        assert!(!TestMode::SramOnly.covers(BankKind::Flash));
        assert!(!TestMode::CacheOnly.covers(BankKind::Ram));
        assert!(TestMode::FlashOnly.covers(BankKind::Flash));
    }

    #[test]
    fn only_cache_mode_repeats_flash() {
        assert_eq!(TestMode::CacheOnly.flash_passes(5), 5);
        assert_eq!(TestMode::Stress.flash_passes(5), 1);
    }
}
