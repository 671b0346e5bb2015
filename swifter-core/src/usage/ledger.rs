//! Monthly usage ledger
//!
//! Counts invocations per client, tool and UTC month in `usage.json`. The
//! ledger reports whether a client is within its plan's allowance but never
//! refuses an increment itself.

use super::client::{ClientIdentity, MonthKey, UsageKey};
use crate::error::Result;
use crate::store::{JsonStore, USAGE_FILE};
use crate::tools::ConfigStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Usage counter of one client, tool and month
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageRecord {
    /// Number of recorded uses
    pub count: u64,
    /// Time of the last write to this record
    pub last_used: Option<DateTime<Utc>>,
}

/// The `usage.json` document
pub type UsageDocument = BTreeMap<String, UsageRecord>;

/// One usage lookup or increment
#[derive(Debug, Clone, Copy)]
pub struct UsageRequest<'a> {
    /// Client the usage is attributed to
    pub client: &'a ClientIdentity,
    /// Tool key
    pub tool_key: &'a str,
    /// Instant selecting the calendar month
    pub at: DateTime<Utc>,
}

impl<'a> UsageRequest<'a> {
    /// Request for the current month
    pub fn new(client: &'a ClientIdentity, tool_key: &'a str) -> Self {
        Self {
            client,
            tool_key,
            at: Utc::now(),
        }
    }

    /// Builder: select the month containing `at`
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Month of this request
    pub fn month_key(&self) -> MonthKey {
        MonthKey::from_datetime(self.at)
    }

    /// Ledger key of this request
    pub fn key(&self) -> UsageKey {
        UsageKey::new(self.client, self.tool_key, &self.month_key())
    }
}

/// Usage of a client against its plan for one tool and month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    /// Plan the limit was taken from
    pub plan: String,
    /// Monthly limit; `None` is unlimited
    pub limit: Option<u64>,
    /// Uses recorded this month
    pub used: u64,
    /// Uses left this month; `None` when unlimited
    pub remaining: Option<u64>,
    /// Accounting period, always `month`
    pub period: String,
    /// Month the status refers to
    pub month_key: MonthKey,
    /// Whether another use is within the allowance
    pub allowed: bool,
}

impl UsageStatus {
    /// Compute a status from a limit and the recorded count
    pub fn compute(plan: impl Into<String>, limit: Option<u64>, used: u64, month_key: MonthKey) -> Self {
        let (remaining, allowed) = match limit {
            None => (None, true),
            Some(limit) => (Some(limit.saturating_sub(used)), used < limit),
        };
        Self {
            plan: plan.into(),
            limit,
            used,
            remaining,
            period: "month".to_string(),
            month_key,
            allowed,
        }
    }
}

/// Per-client monthly usage counters backed by `usage.json`
#[derive(Debug, Clone)]
pub struct UsageLedger {
    store: JsonStore,
    config: ConfigStore,
}

impl UsageLedger {
    /// Create a ledger persisting to `store`, reading plan limits from `config`
    pub fn new(store: JsonStore, config: ConfigStore) -> Self {
        Self { store, config }
    }

    /// Increment the counter for a request by one.
    ///
    /// The record is created when absent. The limit is not enforced here.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub async fn increment_usage(&self, request: &UsageRequest<'_>) -> Result<UsageRecord> {
        let key = request.key();
        let mut document: UsageDocument = self.store.read(USAGE_FILE).await;

        let record = document.entry(key.as_str().to_string()).or_default();
        record.count += 1;
        record.last_used = Some(Utc::now());
        let record = record.clone();

        self.store.write_atomic(USAGE_FILE, &document).await?;
        tracing::debug!(key = %key, count = record.count, "usage incremented");
        Ok(record)
    }

    /// Usage status against the named plan's limit from the tools config.
    ///
    /// Unknown plans are unlimited.
    pub async fn usage_status(&self, request: &UsageRequest<'_>, plan: &str) -> UsageStatus {
        let limit = self.config.tools_config().await.plan_limit(plan);
        self.usage_status_with_limit(request, plan, limit).await
    }

    /// Usage status against an already-resolved limit
    pub async fn usage_status_with_limit(
        &self,
        request: &UsageRequest<'_>,
        plan: &str,
        limit: Option<u64>,
    ) -> UsageStatus {
        let used = self.record(&request.key()).await.map_or(0, |r| r.count);
        UsageStatus::compute(plan, limit, used, request.month_key())
    }

    /// Stored record for a key, if any
    pub async fn record(&self, key: &UsageKey) -> Option<UsageRecord> {
        let document: UsageDocument = self.store.read(USAGE_FILE).await;
        document.get(key.as_str()).cloned()
    }

    /// Overwrite the counter for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub async fn set_usage(&self, key: &UsageKey, count: u64) -> Result<UsageRecord> {
        let mut document: UsageDocument = self.store.read(USAGE_FILE).await;
        let record = UsageRecord {
            count,
            last_used: Some(Utc::now()),
        };
        document.insert(key.as_str().to_string(), record.clone());
        self.store.write_atomic(USAGE_FILE, &document).await?;
        tracing::info!(key = %key, count, "usage set");
        Ok(record)
    }

    /// Remove the record for a key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub async fn delete_usage(&self, key: &UsageKey) -> Result<bool> {
        let mut document: UsageDocument = self.store.read(USAGE_FILE).await;
        let existed = document.remove(key.as_str()).is_some();
        self.store.write_atomic(USAGE_FILE, &document).await?;
        tracing::info!(key = %key, existed, "usage deleted");
        Ok(existed)
    }
}
