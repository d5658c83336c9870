//! Per-bank cumulative statistics.

use crate::tag::TestKind;

/// Result of one primitive invocation. Folded into [`BankStatus`], never kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestOutcome {
    /// Mismatching words.
    pub errors: u32,
    /// Which primitive ran.
    pub kind: TestKind,
}

/// Successful runs out of total runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tally {
    /// Runs with zero mismatches.
    pub success: u32,
    /// All runs.
    pub total: u32,
}

/// Running counters for one bank. Saturating: a long soak never wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankStatus {
    tallies: [Tally; TestKind::ALL.len()],
    /// ECC events attributed to this bank.
    pub ecc_events: u32,
    /// Flash erase/program operations that failed.
    pub transaction_failures: u32,
    /// Sum of every mismatch seen.
    pub total_errors: u32,
}

impl BankStatus {
    /// All zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one primitive result in.
    pub fn record(&mut self, outcome: TestOutcome) {
        if let Some(t) = self.tallies.get_mut(outcome.kind.index()) {
            t.total = t.total.saturating_add(1);
            if outcome.errors == 0 {
                t.success = t.success.saturating_add(1);
            }
        }
        self.total_errors = self.total_errors.saturating_add(outcome.errors);
    }

    /// Count a failed flash erase/program.
    pub fn record_transaction_failure(&mut self) {
        self.transaction_failures = self.transaction_failures.saturating_add(1);
    }

    /// Add `count` ECC events.
    pub fn record_ecc(&mut self, count: u32) {
        self.ecc_events = self.ecc_events.saturating_add(count);
    }

    /// Tally for one test kind.
    #[must_use]
    pub fn tally(&self, kind: TestKind) -> Tally {
        self.tallies.get(kind.index()).copied().unwrap_or_default()
    }

    /// `true` if nothing has gone wrong on this bank.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total_errors == 0 && self.ecc_events == 0 && self.transaction_failures == 0
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn clean_run_counts_as_success() {
        let mut s = BankStatus::new();
        s.record(TestOutcome {
            errors: 0,
            kind: TestKind::Address,
        });
        assert_eq!(s.tally(TestKind::Address), Tally { success: 1, total: 1 });
        assert!(s.is_clean());
    }

    #[test]
    fn errors_count_total_but_not_success() {
        let mut s = BankStatus::new();
        s.record(TestOutcome {
            errors: 3,
            kind: TestKind::Butterfly,
        });
        s.record(TestOutcome {
            errors: 0,
            kind: TestKind::Butterfly,
        });
        assert_eq!(s.tally(TestKind::Butterfly), Tally { success: 1, total: 2 });
        assert_eq!(s.total_errors, 3);
        assert!(!s.is_clean());
    }

    #[test]
    fn kinds_are_independent() {
        let mut s = BankStatus::new();
        s.record(TestOutcome {
            errors: 0,
            kind: TestKind::MarchC,
        });
        assert_eq!(s.tally(TestKind::Walking), Tally::default());
    }

    #[test]
    fn counters_saturate() {
        let mut s = BankStatus::new();
        s.total_errors = u32::MAX - 1;
        s.record(TestOutcome {
            errors: 10,
            kind: TestKind::Address,
        });
        assert_eq!(s.total_errors, u32::MAX);
    }
}
