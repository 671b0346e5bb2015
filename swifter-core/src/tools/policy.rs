//! Policy resolution
//!
//! Combines the static tool switches, the manual overrides and the live
//! reliability state into one decision per tool. Checks run in a fixed order
//! and the first one that denies wins:
//!
//! 1. tool missing from the configuration: `not_configured`
//! 2. tool in `overrides.forceDisable`: `forced_disabled`
//! 3. `hardDisabled` and not force-enabled: `hard_disabled`
//! 4. `enabled: false` and not force-enabled: `disabled`
//! 5. reliability gate tripped: `reliability_gate`
//!
//! `forceEnable` lifts checks 3 and 4 only. A force-enabled tool that the
//! reliability gate has disabled stays disabled.

use super::config::{ConfigStore, PlanConfig, ToolConfig, ToolsConfig, normalize_tool_key};
use super::reliability::{MetricsDocument, ReliabilityGate, ReliabilityStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Machine-readable reason a tool is not runnable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    /// Tool key is not present in the configuration
    NotConfigured,
    /// Tool is listed in `overrides.forceDisable`
    ForcedDisabled,
    /// Tool is marked `hardDisabled`
    HardDisabled,
    /// Tool is statically disabled
    Disabled,
    /// Tool was disabled by the reliability gate
    ReliabilityGate,
}

impl PolicyReason {
    /// Get the string code of this reason
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyReason::NotConfigured => "not_configured",
            PolicyReason::ForcedDisabled => "forced_disabled",
            PolicyReason::HardDisabled => "hard_disabled",
            PolicyReason::Disabled => "disabled",
            PolicyReason::ReliabilityGate => "reliability_gate",
        }
    }
}

impl std::fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved policy for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Whether the tool may run
    pub enabled: bool,
    /// Why the tool may not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<PolicyReason>,
    /// Pricing tier of an enabled tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Live reliability state, when it was consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<ReliabilityStatus>,
}

impl ToolPolicy {
    fn denied(reason: PolicyReason) -> Self {
        Self {
            enabled: false,
            reason: Some(reason),
            tier: None,
            reliability: None,
        }
    }

    fn gated(reliability: ReliabilityStatus) -> Self {
        Self {
            enabled: false,
            reason: Some(PolicyReason::ReliabilityGate),
            tier: None,
            reliability: Some(reliability),
        }
    }

    fn allowed(tier: String, reliability: ReliabilityStatus) -> Self {
        Self {
            enabled: true,
            reason: None,
            tier: Some(tier),
            reliability: Some(reliability),
        }
    }
}

/// Static part of the decision (steps 1 to 4).
///
/// Returns the tool configuration when nothing static denies it.
pub fn check_static<'a>(
    config: &'a ToolsConfig,
    tool_key: &str,
) -> Result<&'a ToolConfig, PolicyReason> {
    let key = normalize_tool_key(tool_key);
    let tool = config.tools.get(&key).ok_or(PolicyReason::NotConfigured)?;

    if config.overrides.force_disable.contains(&key) {
        return Err(PolicyReason::ForcedDisabled);
    }

    let force_enabled = config.overrides.force_enable.contains(&key);
    if tool.hard_disabled && !force_enabled {
        return Err(PolicyReason::HardDisabled);
    }
    if !tool.enabled && !force_enabled {
        return Err(PolicyReason::Disabled);
    }

    Ok(tool)
}

/// Full decision against an already-loaded configuration and metrics document
pub fn evaluate(config: &ToolsConfig, metrics: &MetricsDocument, tool_key: &str) -> ToolPolicy {
    match check_static(config, tool_key) {
        Err(reason) => ToolPolicy::denied(reason),
        Ok(tool) => decide(tool, metrics.status(tool_key)),
    }
}

fn decide(tool: &ToolConfig, reliability: ReliabilityStatus) -> ToolPolicy {
    if reliability.disabled {
        ToolPolicy::gated(reliability)
    } else {
        ToolPolicy::allowed(tool.tier.clone(), reliability)
    }
}

/// Resolves whether tools may run
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    config: ConfigStore,
    gate: ReliabilityGate,
}

impl PolicyResolver {
    /// Create a resolver over the configuration and the reliability gate
    pub fn new(config: ConfigStore, gate: ReliabilityGate) -> Self {
        Self { config, gate }
    }

    /// Resolve the policy of one tool
    pub async fn tool_policy(&self, tool_key: &str) -> ToolPolicy {
        let config = self.config.tools_config().await;
        let policy = match check_static(&config, tool_key) {
            Err(reason) => ToolPolicy::denied(reason),
            Ok(tool) => decide(tool, self.gate.reliability_status(tool_key).await),
        };
        tracing::debug!(
            tool = %normalize_tool_key(tool_key),
            enabled = policy.enabled,
            reason = ?policy.reason,
            "resolved tool policy"
        );
        policy
    }

    /// Keys of every configured tool whose policy resolves to enabled
    pub async fn allowed_tool_keys(&self) -> Vec<String> {
        let config = self.config.tools_config().await;
        let metrics = self.gate.snapshot().await;
        config
            .tools
            .keys()
            .filter(|key| evaluate(&config, &metrics, key).enabled)
            .cloned()
            .collect()
    }

    /// Policy of every configured tool, keyed by tool
    pub async fn all_policies(&self) -> BTreeMap<String, ToolPolicy> {
        let config = self.config.tools_config().await;
        let metrics = self.gate.snapshot().await;
        config
            .tools
            .keys()
            .map(|key| (key.clone(), evaluate(&config, &metrics, key)))
            .collect()
    }

    /// Effective plan table
    pub async fn plan_limits(&self) -> BTreeMap<String, PlanConfig> {
        self.config.plan_limits().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::config::ReliabilityConfig;
    use chrono::Utc;

    fn config() -> ToolsConfig {
        let mut config = ToolsConfig::default();
        config.tools = BTreeMap::from([
            ("compress-pdf".to_string(), ToolConfig::enabled("freemium")),
            (
                "pdf-to-word".to_string(),
                ToolConfig::enabled("premium").with_hard_disabled(true),
            ),
            ("youtube-download".to_string(), ToolConfig::disabled("freemium")),
        ]);
        config
    }

    fn gated_metrics(tool: &str) -> MetricsDocument {
        let reliability = ReliabilityConfig {
            threshold: 0.95,
            window: 5,
            min_runs: 3,
        };
        let mut document = MetricsDocument::default();
        let metrics = document.tools.entry(tool.to_string()).or_default();
        for _ in 0..3 {
            metrics.record(tool, false, &reliability, Utc::now());
        }
        document
    }

    #[test]
    fn test_unconfigured_tool() {
        let policy = evaluate(&config(), &MetricsDocument::default(), "merge-pdf");
        assert!(!policy.enabled);
        assert_eq!(policy.reason, Some(PolicyReason::NotConfigured));
        assert!(policy.tier.is_none());
        assert!(policy.reliability.is_none());
    }

    #[test]
    fn test_enabled_tool_carries_tier_and_reliability() {
        let policy = evaluate(&config(), &MetricsDocument::default(), "compress-pdf");
        assert!(policy.enabled);
        assert_eq!(policy.reason, None);
        assert_eq!(policy.tier.as_deref(), Some("freemium"));
        assert_eq!(policy.reliability, Some(ReliabilityStatus::default()));
    }

    #[test]
    fn test_lookup_is_normalized() {
        let policy = evaluate(&config(), &MetricsDocument::default(), "  Compress-PDF ");
        assert!(policy.enabled);
    }

    #[test]
    fn test_hard_disabled_unless_force_enabled() {
        let mut config = config();
        let policy = evaluate(&config, &MetricsDocument::default(), "pdf-to-word");
        assert_eq!(policy.reason, Some(PolicyReason::HardDisabled));

        config.overrides.force_enable.insert("pdf-to-word".to_string());
        let policy = evaluate(&config, &MetricsDocument::default(), "pdf-to-word");
        assert!(policy.enabled);
        assert_eq!(policy.tier.as_deref(), Some("premium"));
    }

    #[test]
    fn test_static_disabled_unless_force_enabled() {
        let mut config = config();
        let policy = evaluate(&config, &MetricsDocument::default(), "youtube-download");
        assert_eq!(policy.reason, Some(PolicyReason::Disabled));

        config.overrides.force_enable.insert("youtube-download".to_string());
        assert!(evaluate(&config, &MetricsDocument::default(), "youtube-download").enabled);
    }

    #[test]
    fn test_force_disable_beats_force_enable() {
        let mut config = config();
        config.overrides.force_enable.insert("compress-pdf".to_string());
        config.overrides.force_disable.insert("compress-pdf".to_string());
        let policy = evaluate(&config, &MetricsDocument::default(), "compress-pdf");
        assert_eq!(policy.reason, Some(PolicyReason::ForcedDisabled));
    }

    #[test]
    fn test_force_disable_beats_hard_disabled() {
        let mut config = config();
        config.overrides.force_disable.insert("pdf-to-word".to_string());
        let policy = evaluate(&config, &MetricsDocument::default(), "pdf-to-word");
        assert_eq!(policy.reason, Some(PolicyReason::ForcedDisabled));
    }

    #[test]
    fn test_reliability_gate_denies() {
        let metrics = gated_metrics("compress-pdf");
        let policy = evaluate(&config(), &metrics, "compress-pdf");
        assert!(!policy.enabled);
        assert_eq!(policy.reason, Some(PolicyReason::ReliabilityGate));
        assert!(policy.reliability.unwrap().disabled);
    }

    #[test]
    fn test_force_enable_does_not_lift_reliability_gate() {
        let mut config = config();
        config.overrides.force_enable.insert("compress-pdf".to_string());
        let metrics = gated_metrics("compress-pdf");
        let policy = evaluate(&config, &metrics, "compress-pdf");
        assert_eq!(policy.reason, Some(PolicyReason::ReliabilityGate));
    }

    #[test]
    fn test_static_reasons_win_over_reliability() {
        let metrics = gated_metrics("youtube-download");
        let policy = evaluate(&config(), &metrics, "youtube-download");
        assert_eq!(policy.reason, Some(PolicyReason::Disabled));
        assert!(policy.reliability.is_none());
    }

    #[test]
    fn test_reason_codes() {
        let codes: Vec<_> = [
            PolicyReason::NotConfigured,
            PolicyReason::ForcedDisabled,
            PolicyReason::HardDisabled,
            PolicyReason::Disabled,
            PolicyReason::ReliabilityGate,
        ]
        .iter()
        .map(|reason| serde_json::to_value(reason).unwrap())
        .collect();
        assert_eq!(
            codes,
            vec![
                serde_json::json!("not_configured"),
                serde_json::json!("forced_disabled"),
                serde_json::json!("hard_disabled"),
                serde_json::json!("disabled"),
                serde_json::json!("reliability_gate"),
            ]
        );
        assert_eq!(PolicyReason::ReliabilityGate.to_string(), "reliability_gate");
    }

    #[test]
    fn test_denied_policy_serializes_without_optional_fields() {
        let value = serde_json::to_value(ToolPolicy::denied(PolicyReason::NotConfigured)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "enabled": false, "reason": "not_configured" })
        );
    }
}
