use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use paperlink_core::config::LimitsConfig;

use crate::clock::Clock;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetLimits {
    pub daily_api_calls: u32,
    pub monthly_budget: f64,
    pub cost_per_1k_tokens: f64,
}

impl From<&LimitsConfig> for BudgetLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            daily_api_calls: config.daily_api_calls,
            monthly_budget: config.monthly_budget,
            cost_per_1k_tokens: config.cost_per_1k_tokens,
        }
    }
}

/// Persisted usage counters. In-flight reservations are never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetState {
    pub day: Option<NaiveDate>,
    pub month: Option<String>,
    pub calls_today: u32,
    pub cost_this_month: f64,
    pub tokens_this_month: u64,
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    #[serde(skip)]
    pub reserved_calls: u32,
    #[serde(skip)]
    pub reserved_cost: f64,
}

impl BudgetState {
    /// Reset the committed counters when the UTC day or month changed.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            if self.day.is_some() {
                debug!(%today, "daily call counter reset");
            }
            self.day = Some(today);
            self.calls_today = 0;
        }
        let month = month_key(now);
        if self.month.as_deref() != Some(month.as_str()) {
            if self.month.is_some() {
                debug!(%month, "monthly budget reset");
            }
            self.month = Some(month);
            self.cost_this_month = 0.0;
            self.tokens_this_month = 0;
        }
    }
}

fn month_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetDenial {
    #[error("daily call limit reached ({used}/{limit})")]
    DailyCalls { used: u32, limit: u32 },

    #[error("monthly budget exhausted (${spent:.4} spent, ${estimate:.4} requested, ${limit:.2} limit)")]
    MonthlyBudget {
        spent: f64,
        estimate: f64,
        limit: f64,
    },
}

impl From<BudgetDenial> for EngineError {
    fn from(denial: BudgetDenial) -> Self {
        EngineError::QuotaExceeded(denial.to_string())
    }
}

/// Daily call and monthly spend limits with atomic check-and-reserve.
pub struct BudgetTracker {
    limits: BudgetLimits,
    clock: Arc<dyn Clock>,
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_state(limits, BudgetState::default(), clock)
    }

    pub fn with_state(limits: BudgetLimits, state: BudgetState, clock: Arc<dyn Clock>) -> Arc<Self> {
        let mut state = state;
        state.reserved_calls = 0;
        state.reserved_cost = 0.0;
        Arc::new(Self {
            limits,
            clock,
            state: Mutex::new(state),
        })
    }

    /// Restore counters from `path`. A missing file starts from zero.
    pub fn load(path: &Path, limits: BudgetLimits, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "usage stats unreadable, starting fresh");
                    BudgetState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BudgetState::default(),
            Err(e) => return Err(EngineError::Cache(format!("{}: {e}", path.display()))),
        };
        Ok(Self::with_state(limits, state, clock))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Cache(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EngineError::Cache(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| EngineError::Cache(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    /// Upper-bound cost of a request: a token bound for the prompt plus the
    /// completion allowance, priced per 1k tokens.
    pub fn estimate_cost(&self, prompt_tokens: usize, max_tokens: u32) -> f64 {
        (prompt_tokens as f64 + max_tokens as f64) / 1000.0 * self.limits.cost_per_1k_tokens
    }

    pub fn cost_for_tokens(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.limits.cost_per_1k_tokens
    }

    /// Check both limits and hold one call plus `estimated_cost` against them.
    ///
    /// Outstanding reservations count as spent, so concurrent callers can
    /// never jointly overshoot a limit.
    pub fn reserve(self: &Arc<Self>, estimated_cost: f64) -> std::result::Result<Reservation, BudgetDenial> {
        let estimated_cost = estimated_cost.max(0.0);
        let mut state = self.lock();
        state.roll_over(self.clock.now());

        let used = state.calls_today + state.reserved_calls;
        if used >= self.limits.daily_api_calls {
            return Err(BudgetDenial::DailyCalls {
                used,
                limit: self.limits.daily_api_calls,
            });
        }
        let spent = state.cost_this_month + state.reserved_cost;
        if spent + estimated_cost > self.limits.monthly_budget + f64::EPSILON {
            return Err(BudgetDenial::MonthlyBudget {
                spent,
                estimate: estimated_cost,
                limit: self.limits.monthly_budget,
            });
        }

        state.reserved_calls += 1;
        state.reserved_cost += estimated_cost;
        Ok(Reservation {
            tracker: Arc::clone(self),
            estimated_cost,
            settled: false,
        })
    }

    pub fn snapshot(&self) -> BudgetState {
        let mut state = self.lock();
        state.roll_over(self.clock.now());
        state.clone()
    }

    /// Human-readable usage report.
    pub fn summary(&self) -> String {
        let state = self.snapshot();
        let calls_pct = percent(state.calls_today as f64, self.limits.daily_api_calls as f64);
        let budget_pct = percent(state.cost_this_month, self.limits.monthly_budget);
        let mut out = String::new();
        out.push_str("API usage\n");
        out.push_str(&format!(
            "  Today:      {} / {} calls ({calls_pct:.1}%)\n",
            state.calls_today, self.limits.daily_api_calls
        ));
        out.push_str(&format!(
            "  This month: ${:.4} / ${:.2} ({budget_pct:.1}%), {} tokens\n",
            state.cost_this_month, self.limits.monthly_budget, state.tokens_this_month
        ));
        out.push_str(&format!(
            "  All time:   {} calls, {} tokens, ${:.4}\n",
            state.total_calls, state.total_tokens, state.total_cost
        ));
        if state.reserved_calls > 0 {
            out.push_str(&format!("  In flight:  {} call(s)\n", state.reserved_calls));
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn settle(&self, estimated_cost: f64, committed: Option<(f64, u64)>) {
        let mut state = self.lock();
        state.roll_over(self.clock.now());
        state.reserved_calls = state.reserved_calls.saturating_sub(1);
        state.reserved_cost = (state.reserved_cost - estimated_cost).max(0.0);
        if let Some((cost, tokens)) = committed {
            // The monthly counter never passes the ceiling; a reply that cost
            // more than its estimate uses up the remaining headroom instead.
            let headroom = (self.limits.monthly_budget - state.cost_this_month - state.reserved_cost)
                .max(estimated_cost.min(cost));
            let charged = if cost > headroom {
                warn!(
                    cost,
                    estimated_cost,
                    charged = headroom,
                    "model call cost more than its estimate, monthly budget exhausted"
                );
                headroom
            } else {
                cost
            };
            state.calls_today += 1;
            state.cost_this_month += charged;
            state.tokens_this_month += tokens;
            state.total_calls += 1;
            state.total_tokens += tokens;
            state.total_cost += cost;
        }
    }
}

fn percent(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 { 0.0 } else { value / limit * 100.0 }
}

/// A held slot against the budget. Dropping it without committing releases it.
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    tracker: Arc<BudgetTracker>,
    estimated_cost: f64,
    settled: bool,
}

impl Reservation {
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Convert the hold into recorded usage.
    pub fn commit(mut self, actual_cost: f64, tokens: u64) {
        self.tracker
            .settle(self.estimated_cost, Some((actual_cost.max(0.0), tokens)));
        self.settled = true;
    }

    pub fn release(mut self) {
        self.tracker.settle(self.estimated_cost, None);
        self.settled = true;
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("estimated_cost", &self.estimated_cost)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(self.estimated_cost, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn limits(calls: u32, budget: f64) -> BudgetLimits {
        BudgetLimits {
            daily_api_calls: calls,
            monthly_budget: budget,
            cost_per_1k_tokens: 0.002,
        }
    }

    fn clock_at(y: i32, m: u32, d: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()))
    }

    #[test]
    fn estimate_uses_prompt_chars_and_completion_allowance() {
        let tracker = BudgetTracker::new(limits(10, 1.0), clock_at(2024, 1, 1));
        let estimate = tracker.estimate_cost(3000, 1000);
        assert!((estimate - 0.008).abs() < 1e-12);
    }

    #[test]
    fn daily_limit_counts_outstanding_reservations() {
        let tracker = BudgetTracker::new(limits(2, 100.0), clock_at(2024, 1, 1));
        let a = tracker.reserve(0.01).unwrap();
        let b = tracker.reserve(0.01).unwrap();
        assert!(matches!(
            tracker.reserve(0.01),
            Err(BudgetDenial::DailyCalls { used: 2, limit: 2 })
        ));
        a.commit(0.005, 100);
        b.release();
        // One committed call, one slot free again.
        let c = tracker.reserve(0.01).unwrap();
        assert!(tracker.reserve(0.01).is_err());
        drop(c);
        assert_eq!(tracker.snapshot().calls_today, 1);
        assert_eq!(tracker.snapshot().reserved_calls, 0);
    }

    #[test]
    fn monthly_budget_denies_before_overspend() {
        let tracker = BudgetTracker::new(limits(100, 0.05), clock_at(2024, 1, 1));
        let a = tracker.reserve(0.03).unwrap();
        let denied = tracker.reserve(0.03).unwrap_err();
        assert!(matches!(denied, BudgetDenial::MonthlyBudget { .. }));
        a.commit(0.02, 10_000);
        assert!(tracker.reserve(0.03).is_ok());
    }

    #[test]
    fn commit_above_estimate_stops_at_ceiling() {
        let tracker = BudgetTracker::new(limits(100, 0.01), clock_at(2024, 1, 1));
        let estimate = tracker.estimate_cost(1000, 500);
        let reservation = tracker.reserve(estimate).unwrap();
        reservation.commit(tracker.cost_for_tokens(6000), 6000);

        let state = tracker.snapshot();
        assert!(state.cost_this_month <= 0.01 + f64::EPSILON);
        assert!((state.total_cost - 0.012).abs() < 1e-12);
        assert_eq!(state.tokens_this_month, 6000);
        assert!(matches!(
            tracker.reserve(estimate),
            Err(BudgetDenial::MonthlyBudget { .. })
        ));
    }

    #[test]
    fn overshoot_does_not_eat_other_reservations() {
        let tracker = BudgetTracker::new(limits(100, 0.01), clock_at(2024, 1, 1));
        let first = tracker.reserve(0.004).unwrap();
        let second = tracker.reserve(0.004).unwrap();
        first.commit(0.02, 10_000);
        // The other hold keeps its share of the ceiling.
        let state = tracker.snapshot();
        assert!((state.cost_this_month - 0.006).abs() < 1e-12);
        second.commit(0.004, 2000);
        assert!(tracker.snapshot().cost_this_month <= 0.01 + 1e-12);
    }

    #[test]
    fn dropped_reservation_is_released() {
        let tracker = BudgetTracker::new(limits(1, 1.0), clock_at(2024, 1, 1));
        {
            let _held = tracker.reserve(0.5).unwrap();
            assert!(tracker.reserve(0.1).is_err());
        }
        let state = tracker.snapshot();
        assert_eq!(state.reserved_calls, 0);
        assert_eq!(state.reserved_cost, 0.0);
        assert!(tracker.reserve(0.1).is_ok());
    }

    #[test]
    fn concurrent_reservations_never_exceed_daily_limit() {
        let tracker = BudgetTracker::new(limits(25, 1000.0), clock_at(2024, 1, 1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let mut granted = 0;
                    for _ in 0..20 {
                        if let Ok(r) = tracker.reserve(0.001) {
                            r.commit(0.001, 10);
                            granted += 1;
                        }
                    }
                    granted
                })
            })
            .collect();
        let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 25);
        assert_eq!(tracker.snapshot().calls_today, 25);
    }

    #[test]
    fn counters_roll_over_by_day_and_month() {
        let clock = clock_at(2024, 1, 31);
        let tracker = BudgetTracker::new(limits(1, 1.0), clock.clone());
        tracker.reserve(0.1).unwrap().commit(0.4, 2000);
        assert!(tracker.reserve(0.1).is_err());

        clock.set(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 1).unwrap());
        let state = tracker.snapshot();
        assert_eq!(state.calls_today, 0);
        assert_eq!(state.cost_this_month, 0.0);
        assert_eq!(state.total_calls, 1);
        assert!(tracker.reserve(0.1).is_ok());
    }

    #[test]
    fn day_rollover_keeps_monthly_spend() {
        let clock = clock_at(2024, 3, 10);
        let tracker = BudgetTracker::new(limits(5, 1.0), clock.clone());
        tracker.reserve(0.2).unwrap().commit(0.2, 1000);
        clock.advance(chrono::Duration::days(1));
        let state = tracker.snapshot();
        assert_eq!(state.calls_today, 0);
        assert!((state.cost_this_month - 0.2).abs() < 1e-12);
    }

    #[test]
    fn state_persists_without_reservations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_stats.json");
        let clock = clock_at(2024, 5, 5);
        let tracker = BudgetTracker::new(limits(10, 1.0), clock.clone());
        tracker.reserve(0.1).unwrap().commit(0.01, 500);
        let _held = tracker.reserve(0.1).unwrap();
        tracker.save(&path).unwrap();

        let restored = BudgetTracker::load(&path, limits(10, 1.0), clock).unwrap();
        let state = restored.snapshot();
        assert_eq!(state.calls_today, 1);
        assert_eq!(state.total_tokens, 500);
        assert_eq!(state.reserved_calls, 0);
        assert!(restored.summary().contains("1 / 10 calls"));
    }
}
