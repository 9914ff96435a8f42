//! Recurring-overuse predicate: left undefined by the original platform
//! beyond "return false"; implemented here as a pluggable trait so the
//! threshold/window are config-driven and tests can mock the predicate
//! directly.

/// Whether a package's not-forgiven-overuse count over the check's window
/// counts as "recurring" for the action-decision table.
pub trait RecurringOveruseCheck: Send + Sync {
    /// Lookback window, in days, to query via
    /// `StatsStore::get_not_forgiven_historical_io_overuses`.
    fn window_days(&self) -> i64;

    fn is_recurring(&self, not_forgiven_overuses: u64) -> bool;
}

impl RecurringOveruseCheck for Box<dyn RecurringOveruseCheck> {
    fn window_days(&self) -> i64 {
        (**self).window_days()
    }
    fn is_recurring(&self, not_forgiven_overuses: u64) -> bool {
        (**self).is_recurring(not_forgiven_overuses)
    }
}

/// Default implementation: at least `min_overuses` not-forgiven overuses in
/// the trailing `window_days` days. Defaults to K=3, W=30 (the store's own
/// retention window).
pub struct ThresholdRecurringOveruseCheck {
    pub min_overuses: u64,
    pub window_days: i64,
}

impl Default for ThresholdRecurringOveruseCheck {
    fn default() -> Self {
        Self {
            min_overuses: 3,
            window_days: 30,
        }
    }
}

impl RecurringOveruseCheck for ThresholdRecurringOveruseCheck {
    fn window_days(&self) -> i64 {
        self.window_days
    }

    fn is_recurring(&self, not_forgiven_overuses: u64) -> bool {
        not_forgiven_overuses >= self.min_overuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_check_respects_minimum() {
        let check = ThresholdRecurringOveruseCheck { min_overuses: 3, window_days: 30 };
        assert!(!check.is_recurring(2));
        assert!(check.is_recurring(3));
        assert!(check.is_recurring(10));
    }
}
