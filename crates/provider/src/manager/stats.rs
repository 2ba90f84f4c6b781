//! Per-provider usage accounting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Running usage totals for one provider id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStatistics {
    /// Completed requests, failures and cancellations included.
    pub request_count: u64,
    /// Failed or cancelled requests.
    pub error_count: u64,
    /// Tokens reported by the vendor.
    pub total_tokens: u64,
    /// Estimated spend.
    pub total_cost: f64,
    /// Incremental mean latency over every request.
    pub average_latency: Duration,
    /// `error_count / request_count`.
    pub error_rate: f64,
    /// When the last request completed.
    pub last_used: Option<DateTime<Utc>>,
}

impl UsageStatistics {
    /// Fold one finished request into the totals.
    pub fn record(&mut self, latency: Duration, success: bool, tokens: u64, cost: f64) {
        self.request_count += 1;
        let n = u128::from(self.request_count);

        let average = (self.average_latency.as_nanos() * (n - 1) + latency.as_nanos()) / n;
        self.average_latency = Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX));

        if !success {
            self.error_count += 1;
        }
        self.error_rate = self.error_count as f64 / self.request_count as f64;
        self.total_tokens += tokens;
        self.total_cost += cost;
        self.last_used = Some(Utc::now());
    }
}
