//! Daily credit gate.
//!
//! The gate is a pure decision over a [`UsageRecord`] value. Persisting the
//! returned state is the caller's job.

use crate::config::DEFAULT_DAILY_LIMIT;
use crate::models::UsageRecord;
use chrono::{Local, NaiveDate};

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub granted: bool,
    /// Canonical next state, including any day rollover.
    pub state: UsageRecord,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaGate {
    daily_limit: u32,
}

impl Default for QuotaGate {
    fn default() -> Self {
        Self::new(DEFAULT_DAILY_LIMIT)
    }
}

impl QuotaGate {
    pub fn new(daily_limit: u32) -> Self {
        Self { daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Decide whether one gated action may proceed on `today`.
    pub fn try_consume(&self, state: &UsageRecord, today: NaiveDate) -> QuotaDecision {
        let mut next = state.rolled_over(today);

        if next.is_entitled {
            return QuotaDecision {
                granted: true,
                state: next,
            };
        }

        if next.credits_used_today < self.daily_limit {
            next.credits_used_today += 1;
            QuotaDecision {
                granted: true,
                state: next,
            }
        } else {
            QuotaDecision {
                granted: false,
                state: next,
            }
        }
    }

    /// [`try_consume`](Self::try_consume) against the local calendar day.
    pub fn try_consume_now(&self, state: &UsageRecord) -> QuotaDecision {
        self.try_consume(state, today())
    }

    /// Credits left on `today`; `None` when entitled.
    pub fn remaining(&self, state: &UsageRecord, today: NaiveDate) -> Option<u32> {
        let current = state.rolled_over(today);
        if current.is_entitled {
            None
        } else {
            Some(self.daily_limit.saturating_sub(current.credits_used_today))
        }
    }

    /// Whether the paywall should be shown instead of a gated feature.
    pub fn is_limit_reached(&self, state: &UsageRecord, today: NaiveDate) -> bool {
        self.remaining(state, today) == Some(0)
    }
}

/// Current local calendar day.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
