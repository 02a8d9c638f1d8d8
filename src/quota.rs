//! Quota policies, usage aggregates, and timeframe windows.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed monthly ceilings per user. The default is a flat pair; callers may
/// override per service or per user, but there is no tiering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Maximum total tokens per billing month
    pub max_tokens_per_month: u64,
    /// Maximum total cost in USD per billing month
    pub max_cost_per_month: f64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_tokens_per_month: 50_000,
            max_cost_per_month: 10.0,
        }
    }
}

/// What to do when the ledger cannot be read during a quota check.
/// `Allow` prioritizes availability over strict enforcement and is the
/// default; `Deny` fails closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaFailureMode {
    #[default]
    Allow,
    Deny,
}

/// Used-versus-ceiling view for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub user_id: String,
    pub tokens_used: u64,
    pub tokens_ceiling: u64,
    pub cost_used: f64,
    pub cost_ceiling: f64,
    /// `max(token_pct, cost_pct)`, clamped to 100
    pub percentage_used: f64,
}

impl QuotaInfo {
    pub fn new(user_id: impl Into<String>, tokens_used: u64, cost_used: f64, policy: QuotaPolicy) -> Self {
        let token_pct = if policy.max_tokens_per_month == 0 {
            0.0
        } else {
            tokens_used as f64 / policy.max_tokens_per_month as f64 * 100.0
        };
        let cost_pct = if policy.max_cost_per_month == 0.0 {
            0.0
        } else {
            cost_used / policy.max_cost_per_month * 100.0
        };
        Self {
            user_id: user_id.into(),
            tokens_used,
            tokens_ceiling: policy.max_tokens_per_month,
            cost_used,
            cost_ceiling: policy.max_cost_per_month,
            percentage_used: token_pct.max(cost_pct).min(100.0),
        }
    }
}

/// Aggregation window for usage stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    /// Start of the window ending now.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => now - Duration::days(1),
            Self::Week => now - Duration::weeks(1),
            Self::Month => now - Duration::days(30),
            Self::Year => now - Duration::days(365),
        }
    }
}

/// First instant of the current billing month; quota folds start here.
pub fn billing_period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Per-bucket aggregate used by total/by-provider/by-model folds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
}

impl UsageAggregate {
    pub fn add(&mut self, tokens: u64, cost: f64) {
        self.requests += 1;
        self.tokens += tokens;
        self.cost += cost;
    }
}

/// Folded usage view for one user over one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub user_id: String,
    pub timeframe: Timeframe,
    pub total: UsageAggregate,
    pub by_provider: HashMap<String, UsageAggregate>,
    pub by_model: HashMap<String, UsageAggregate>,
}
