//! Reliability gate
//!
//! Keeps a rolling window of the most recent run outcomes per tool and
//! disables a tool once its windowed success rate falls below the configured
//! threshold. The rate is a simple moving average over the last `window`
//! outcomes; wall-clock time plays no part.
//!
//! Disabling is sticky. Nothing in this module re-enables a tool on its own;
//! an operator has to clear the record with [`ReliabilityGate::reset_tool`].

use super::config::{ConfigStore, ReliabilityConfig, normalize_tool_key};
use crate::error::Result;
use crate::store::{JsonStore, TOOL_METRICS_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Maximum number of alerts kept in the audit trail
pub const MAX_ALERTS: usize = 200;

/// Success rate over a window of outcomes; an empty window counts as healthy.
pub fn window_rate<'a>(window: impl IntoIterator<Item = &'a bool>) -> f64 {
    let (runs, successes) = window
        .into_iter()
        .fold((0usize, 0usize), |(runs, ok), success| {
            (runs + 1, ok + usize::from(*success))
        });
    if runs == 0 {
        1.0
    } else {
        successes as f64 / runs as f64
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn whole_percent(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

// Non-finite rates are written out as `null`.
fn nullable_rate<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Persisted reliability record of one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolMetrics {
    /// Most recent outcomes, oldest first
    pub window: VecDeque<bool>,
    /// Lifetime number of recorded runs
    pub total_runs: u64,
    /// Lifetime number of successful runs
    pub success_runs: u64,
    /// Lifetime number of failed runs
    pub fail_runs: u64,
    /// Success rate over the window, rounded to four decimals
    #[serde(deserialize_with = "nullable_rate")]
    pub window_success_rate: f64,
    /// Whether the gate has tripped
    pub disabled: bool,
    /// When the gate tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
    /// Human-readable reason recorded when the gate tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    /// Time of the last recorded run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Time of the last alert raised for this tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl Default for ToolMetrics {
    fn default() -> Self {
        Self {
            window: VecDeque::new(),
            total_runs: 0,
            success_runs: 0,
            fail_runs: 0,
            window_success_rate: 1.0,
            disabled: false,
            disabled_at: None,
            disabled_reason: None,
            updated_at: None,
            last_alert_at: None,
        }
    }
}

impl ToolMetrics {
    /// Append one outcome and evaluate the gate.
    ///
    /// Returns the alert raised when this outcome trips the gate. A record
    /// that is already disabled never raises a second alert.
    pub fn record(
        &mut self,
        tool_key: &str,
        success: bool,
        config: &ReliabilityConfig,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let window_size = config.window.max(1);
        self.window.push_back(success);
        while self.window.len() > window_size {
            self.window.pop_front();
        }

        self.total_runs += 1;
        if success {
            self.success_runs += 1;
        } else {
            self.fail_runs += 1;
        }
        self.updated_at = Some(now);

        let rate = window_rate(&self.window);
        self.window_success_rate = round4(rate);

        let should_gate = self.window.len() >= config.min_runs && rate < config.threshold;
        if !should_gate || self.disabled {
            return None;
        }

        let reason = format!(
            "Reliability {}% below {}%",
            whole_percent(rate),
            whole_percent(config.threshold)
        );
        self.disabled = true;
        self.disabled_at = Some(now);
        self.disabled_reason = Some(reason.clone());
        self.last_alert_at = Some(now);

        Some(Alert {
            tool: tool_key.to_string(),
            kind: AlertKind::ReliabilityGate,
            success_rate: self.window_success_rate,
            threshold: config.threshold,
            window: self.window.len(),
            at: now,
            message: reason,
        })
    }

    /// Read-only view of this record
    pub fn status(&self) -> ReliabilityStatus {
        ReliabilityStatus {
            disabled: self.disabled,
            window_success_rate: self.window_success_rate,
            window: self.window.len(),
            disabled_reason: self.disabled_reason.clone(),
            disabled_at: self.disabled_at,
        }
    }
}

/// Kind of an audit alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A tool was disabled by the reliability gate
    ReliabilityGate,
}

/// Audit trail entry raised when a tool is disabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Tool key
    pub tool: String,
    /// Alert kind
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Windowed success rate at the time of the transition
    #[serde(default, deserialize_with = "nullable_rate")]
    pub success_rate: f64,
    /// Threshold that was crossed
    #[serde(default, deserialize_with = "nullable_rate")]
    pub threshold: f64,
    /// Number of outcomes in the window
    #[serde(default)]
    pub window: usize,
    /// Transition time
    pub at: DateTime<Utc>,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// The `tool-metrics.json` document.
///
/// Parsed entry by entry: a malformed alert is dropped, and a malformed tool
/// record is reduced to its `disabled` state so a gated tool stays gated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct MetricsDocument {
    /// Records by tool key
    pub tools: BTreeMap<String, ToolMetrics>,
    /// Bounded alert trail, oldest first
    pub alerts: Vec<Alert>,
}

impl From<Value> for MetricsDocument {
    fn from(value: Value) -> Self {
        let Value::Object(mut document) = value else {
            tracing::warn!("metrics document is not a JSON object, starting empty");
            return Self::default();
        };

        let tools = match document.remove("tools") {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .map(|(key, entry)| {
                    let metrics = salvage_metrics(&key, entry);
                    (normalize_tool_key(&key), metrics)
                })
                .collect(),
            None | Some(Value::Null) => BTreeMap::new(),
            Some(other) => {
                tracing::warn!(%other, "metrics `tools` is not an object, ignoring");
                BTreeMap::new()
            }
        };

        let alerts = match document.remove("alerts") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|entry| match serde_json::from_value::<Alert>(entry) {
                    Ok(alert) => Some(alert),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed alert entry");
                        None
                    }
                })
                .collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                tracing::warn!(%other, "metrics `alerts` is not an array, ignoring");
                Vec::new()
            }
        };

        Self { tools, alerts }
    }
}

fn salvage_metrics(key: &str, entry: Value) -> ToolMetrics {
    match serde_json::from_value::<ToolMetrics>(entry.clone()) {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::warn!(
                tool = %key,
                error = %e,
                "malformed metrics record, keeping gate state only"
            );
            ToolMetrics {
                disabled: entry.get("disabled").and_then(Value::as_bool) == Some(true),
                disabled_reason: entry
                    .get("disabledReason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                disabled_at: entry
                    .get("disabledAt")
                    .cloned()
                    .and_then(|at| serde_json::from_value(at).ok()),
                ..ToolMetrics::default()
            }
        }
    }
}

impl MetricsDocument {
    /// Reliability status of a tool; untracked tools report healthy
    pub fn status(&self, tool_key: &str) -> ReliabilityStatus {
        self.tools
            .get(&normalize_tool_key(tool_key))
            .map(ToolMetrics::status)
            .unwrap_or_default()
    }

    fn push_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
        if self.alerts.len() > MAX_ALERTS {
            let excess = self.alerts.len() - MAX_ALERTS;
            self.alerts.drain(..excess);
        }
    }
}

/// Live reliability state of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilityStatus {
    /// Whether the gate has disabled the tool
    pub disabled: bool,
    /// Success rate over the current window
    pub window_success_rate: f64,
    /// Number of outcomes in the current window
    pub window: usize,
    /// Reason recorded when the gate tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    /// When the gate tripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl Default for ReliabilityStatus {
    fn default() -> Self {
        Self {
            disabled: false,
            window_success_rate: 1.0,
            window: 0,
            disabled_reason: None,
            disabled_at: None,
        }
    }
}

/// Records run outcomes and answers whether a tool is currently gated
#[derive(Debug, Clone)]
pub struct ReliabilityGate {
    store: JsonStore,
    config: ConfigStore,
}

impl ReliabilityGate {
    /// Create a gate persisting to `store`, reading thresholds from `config`
    pub fn new(store: JsonStore, config: ConfigStore) -> Self {
        Self { store, config }
    }

    /// Record one run outcome for a tool and persist the metrics document.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics document cannot be written.
    pub async fn record_tool_run(&self, tool_key: &str, success: bool) -> Result<ToolMetrics> {
        let key = normalize_tool_key(tool_key);
        let reliability = self.config.tools_config().await.reliability;
        let mut document: MetricsDocument = self.store.read(TOOL_METRICS_FILE).await;

        let metrics = document.tools.entry(key.clone()).or_default();
        let alert = metrics.record(&key, success, &reliability, Utc::now());
        let metrics = metrics.clone();

        if let Some(alert) = alert {
            tracing::error!(
                tool = %key,
                success_rate = alert.success_rate,
                threshold = alert.threshold,
                window = alert.window,
                "tool disabled by reliability gate: {}",
                alert.message
            );
            document.push_alert(alert);
        }

        self.store.write_atomic(TOOL_METRICS_FILE, &document).await?;
        Ok(metrics)
    }

    /// Current reliability status of a tool
    pub async fn reliability_status(&self, tool_key: &str) -> ReliabilityStatus {
        self.snapshot().await.status(tool_key)
    }

    /// The full metrics document as currently persisted
    pub async fn snapshot(&self) -> MetricsDocument {
        self.store.read(TOOL_METRICS_FILE).await
    }

    /// Alert trail, oldest first
    pub async fn alerts(&self) -> Vec<Alert> {
        self.snapshot().await.alerts
    }

    /// Drop a tool's record so its next run starts a fresh window.
    ///
    /// Returns whether a record existed. The alert trail is left intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics document cannot be written.
    pub async fn reset_tool(&self, tool_key: &str) -> Result<bool> {
        let key = normalize_tool_key(tool_key);
        let mut document = self.snapshot().await;
        let existed = document.tools.remove(&key).is_some();
        if existed {
            self.store.write_atomic(TOOL_METRICS_FILE, &document).await?;
            tracing::info!(tool = %key, "reliability record reset");
        }
        Ok(existed)
    }
}
