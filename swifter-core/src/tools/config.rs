//! Tools configuration: plans, reliability thresholds, tool switches and overrides
//!
//! The effective configuration is the compiled-in default with the optional
//! `tools-config.json` document merged on top, section by section:
//!
//! - `plans` and `tools` merge per entry; an override entry replaces the
//!   default entry of the same key wholesale.
//! - `reliability` and `overrides` merge per field; absent fields keep the
//!   default value.
//!
//! Values of the wrong type or out of range never reach consumers: they are
//! logged and replaced by the default.

use crate::store::{JsonStore, TOOLS_CONFIG_FILE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Tier assigned to tools that do not declare one
pub const DEFAULT_TIER: &str = "freemium";

/// Canonical form of a tool key: trimmed and lowercased.
pub fn normalize_tool_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Monthly allowance of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    /// Invocations per tool per calendar month; `None` is unlimited
    pub monthly_limit: Option<u64>,
}

impl PlanConfig {
    /// Plan without a monthly cap
    pub fn unlimited() -> Self {
        Self { monthly_limit: None }
    }

    /// Plan capped at `limit` runs per tool per month
    pub fn limited(limit: u64) -> Self {
        Self {
            monthly_limit: Some(limit),
        }
    }
}

/// Reliability gate thresholds applied to every tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReliabilityConfig {
    /// Minimum acceptable success rate over the window, in `[0, 1]`
    pub threshold: f64,
    /// Number of most recent outcomes kept per tool
    pub window: usize,
    /// Outcomes required in the window before the gate may trip
    pub min_runs: usize,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            window: 50,
            min_runs: 20,
        }
    }
}

impl ReliabilityConfig {
    /// Builder: set threshold (clamped to `[0, 1]`)
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            Self::default().threshold
        };
        self
    }

    /// Builder: set window size
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Builder: set minimum runs
    pub fn with_min_runs(mut self, min_runs: usize) -> Self {
        self.min_runs = min_runs.max(1);
        self
    }
}

/// Static switches for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Whether the tool is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Pricing tier label
    #[serde(default = "default_tier")]
    pub tier: String,
    /// Disabled regardless of `enabled`, unless force-enabled
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hard_disabled: bool,
}

fn default_tier() -> String {
    DEFAULT_TIER.to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tier: default_tier(),
            hard_disabled: false,
        }
    }
}

impl ToolConfig {
    /// An enabled tool in the given tier
    pub fn enabled(tier: impl Into<String>) -> Self {
        Self {
            enabled: true,
            tier: tier.into(),
            hard_disabled: false,
        }
    }

    /// A disabled tool in the given tier
    pub fn disabled(tier: impl Into<String>) -> Self {
        Self {
            enabled: false,
            tier: tier.into(),
            hard_disabled: false,
        }
    }

    /// Builder: mark as hard-disabled
    pub fn with_hard_disabled(mut self, hard_disabled: bool) -> Self {
        self.hard_disabled = hard_disabled;
        self
    }
}

/// Manual operator overrides
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridesConfig {
    /// Tools enabled even when statically disabled or hard-disabled
    #[serde(default)]
    pub force_enable: BTreeSet<String>,
    /// Tools disabled unconditionally
    #[serde(default)]
    pub force_disable: BTreeSet<String>,
}

/// Effective tools configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Plan name to monthly allowance
    pub plans: BTreeMap<String, PlanConfig>,
    /// Reliability gate thresholds
    pub reliability: ReliabilityConfig,
    /// Tool key to static switches
    pub tools: BTreeMap<String, ToolConfig>,
    /// Manual overrides
    pub overrides: OverridesConfig,
    /// Top-level keys outside the four known sections, carried through as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let plans = BTreeMap::from([
            ("standard".to_string(), PlanConfig::unlimited()),
            ("premium".to_string(), PlanConfig::unlimited()),
        ]);

        let tools = [
            ("compress-pdf", true),
            ("rotate-pdf", true),
            ("pdf-to-excel", true),
            ("pdf-to-jpg", true),
            ("tiktok-download", true),
            ("youtube-download", false),
            ("instagram-download", true),
            ("pdf-to-word", true),
        ]
        .into_iter()
        .map(|(key, enabled)| {
            let tool = if enabled {
                ToolConfig::enabled(DEFAULT_TIER)
            } else {
                ToolConfig::disabled(DEFAULT_TIER)
            };
            (key.to_string(), tool)
        })
        .collect();

        Self {
            plans,
            reliability: ReliabilityConfig::default(),
            tools,
            overrides: OverridesConfig::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl ToolsConfig {
    /// Static configuration of a tool, looked up by normalized key
    pub fn tool(&self, key: &str) -> Option<&ToolConfig> {
        self.tools.get(&normalize_tool_key(key))
    }

    /// Monthly limit of a plan; unknown plans are unlimited
    pub fn plan_limit(&self, plan: &str) -> Option<u64> {
        self.plans.get(plan).and_then(|p| p.monthly_limit)
    }

    /// Whether the tool is listed in `overrides.forceEnable`
    pub fn is_force_enabled(&self, key: &str) -> bool {
        self.overrides.force_enable.contains(&normalize_tool_key(key))
    }

    /// Whether the tool is listed in `overrides.forceDisable`
    pub fn is_force_disabled(&self, key: &str) -> bool {
        self.overrides.force_disable.contains(&normalize_tool_key(key))
    }

    /// Merge an override document onto this configuration.
    ///
    /// Non-object documents are ignored entirely.
    pub fn merged(mut self, document: &Value) -> Self {
        let Some(document) = document.as_object() else {
            tracing::warn!("tools config override is not a JSON object, using defaults");
            return self;
        };

        for (key, value) in document {
            match key.as_str() {
                "plans" => {
                    if let Some(entries) = section(key, value) {
                        merge_plans(&mut self.plans, entries);
                    }
                }
                "reliability" => {
                    if let Some(fields) = section(key, value) {
                        merge_reliability(&mut self.reliability, fields);
                    }
                }
                "tools" => {
                    if let Some(entries) = section(key, value) {
                        merge_tools(&mut self.tools, entries);
                    }
                }
                "overrides" => {
                    if let Some(fields) = section(key, value) {
                        merge_overrides(&mut self.overrides, fields);
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }

        self
    }
}

fn section<'a>(name: &str, value: &'a Value) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => {
            tracing::warn!(section = name, "config section is not an object, keeping defaults");
            None
        }
    }
}

fn merge_plans(plans: &mut BTreeMap<String, PlanConfig>, entries: &Map<String, Value>) {
    for (name, entry) in entries {
        let Some(fields) = entry.as_object() else {
            tracing::warn!(plan = %name, "plan entry is not an object, skipping");
            continue;
        };
        let monthly_limit = match fields.get("monthlyLimit") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(limit) => Some(limit),
                None => {
                    tracing::warn!(plan = %name, %value, "invalid monthlyLimit, treating plan as unlimited");
                    None
                }
            },
        };
        plans.insert(name.clone(), PlanConfig { monthly_limit });
    }
}

fn merge_reliability(reliability: &mut ReliabilityConfig, fields: &Map<String, Value>) {
    if let Some(value) = fields.get("threshold") {
        match value.as_f64() {
            Some(threshold) if threshold.is_finite() && (0.0..=1.0).contains(&threshold) => {
                reliability.threshold = threshold;
            }
            _ => tracing::warn!(%value, "invalid reliability.threshold, keeping default"),
        }
    }
    if let Some(value) = fields.get("window") {
        match positive(value) {
            Some(window) => reliability.window = window,
            None => tracing::warn!(%value, "invalid reliability.window, keeping default"),
        }
    }
    if let Some(value) = fields.get("minRuns") {
        match positive(value) {
            Some(min_runs) => reliability.min_runs = min_runs,
            None => tracing::warn!(%value, "invalid reliability.minRuns, keeping default"),
        }
    }
}

fn positive(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

fn merge_tools(tools: &mut BTreeMap<String, ToolConfig>, entries: &Map<String, Value>) {
    for (key, entry) in entries {
        let Some(fields) = entry.as_object() else {
            tracing::warn!(tool = %key, "tool entry is not an object, skipping");
            continue;
        };

        let mut tool = ToolConfig::default();
        if let Some(value) = fields.get("enabled") {
            match value.as_bool() {
                Some(enabled) => tool.enabled = enabled,
                None => tracing::warn!(tool = %key, %value, "invalid enabled flag, treating as false"),
            }
        }
        if let Some(value) = fields.get("tier") {
            match value.as_str() {
                Some(tier) if !tier.is_empty() => tool.tier = tier.to_string(),
                _ => tracing::warn!(tool = %key, %value, "invalid tier, using default"),
            }
        }
        if let Some(value) = fields.get("hardDisabled") {
            match value.as_bool() {
                Some(hard_disabled) => tool.hard_disabled = hard_disabled,
                None => tracing::warn!(tool = %key, %value, "invalid hardDisabled flag, treating as false"),
            }
        }

        tools.insert(normalize_tool_key(key), tool);
    }
}

fn merge_overrides(overrides: &mut OverridesConfig, fields: &Map<String, Value>) {
    if let Some(value) = fields.get("forceEnable") {
        if let Some(keys) = key_set("forceEnable", value) {
            overrides.force_enable = keys;
        }
    }
    if let Some(value) = fields.get("forceDisable") {
        if let Some(keys) = key_set("forceDisable", value) {
            overrides.force_disable = keys;
        }
    }
}

fn key_set(field: &str, value: &Value) -> Option<BTreeSet<String>> {
    let Some(items) = value.as_array() else {
        tracing::warn!(field, %value, "override list is not an array, keeping default");
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| match item.as_str() {
                Some(key) => Some(normalize_tool_key(key)),
                None => {
                    tracing::warn!(field, %item, "skipping non-string override entry");
                    None
                }
            })
            .collect(),
    )
}

/// Loads the effective tools configuration from the data directory.
///
/// Nothing is cached: every call re-reads `tools-config.json`, so edits to the
/// document take effect on the next request. Loading never fails; a missing or
/// broken document yields the compiled defaults.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    store: JsonStore,
}

impl ConfigStore {
    /// Create a config store over a document store
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Path of the override document
    pub fn config_path(&self) -> PathBuf {
        self.store.path(TOOLS_CONFIG_FILE)
    }

    /// Data directory holding the override document
    pub fn data_dir(&self) -> PathBuf {
        self.store.root().to_path_buf()
    }

    /// Effective configuration: defaults merged with the override document
    pub async fn tools_config(&self) -> ToolsConfig {
        match self.store.read_value(TOOLS_CONFIG_FILE).await {
            Some(document) => ToolsConfig::default().merged(&document),
            None => ToolsConfig::default(),
        }
    }

    /// Effective plan table
    pub async fn plan_limits(&self) -> BTreeMap<String, PlanConfig> {
        self.tools_config().await.plans
    }
}
