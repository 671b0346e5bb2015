//! Tests for the tools module backed by a real data directory

use super::*;
use crate::store::{JsonStore, TOOL_METRICS_FILE};
use serde_json::json;
use tempfile::TempDir;

struct Fixture {
    _temp_dir: TempDir,
    config: ConfigStore,
    gate: ReliabilityGate,
    resolver: PolicyResolver,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonStore::new(temp_dir.path());
    let config = ConfigStore::new(store.clone());
    let gate = ReliabilityGate::new(store, config.clone());
    let resolver = PolicyResolver::new(config.clone(), gate.clone());
    Fixture {
        _temp_dir: temp_dir,
        config,
        gate,
        resolver,
    }
}

fn write_config(fixture: &Fixture, document: serde_json::Value) {
    std::fs::write(fixture.config.config_path(), document.to_string()).unwrap();
}

fn strict_config() -> serde_json::Value {
    json!({
        "reliability": { "threshold": 0.95, "window": 5, "minRuns": 3 },
        "tools": {
            "compress-pdf": { "enabled": true, "tier": "freemium" },
            "pdf-to-word": { "enabled": false, "tier": "premium", "hardDisabled": true }
        },
        "overrides": { "forceEnable": [], "forceDisable": [] }
    })
}

#[tokio::test]
async fn test_record_tool_run_persists_metrics() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    let metrics = fixture.gate.record_tool_run("compress-pdf", true).await.unwrap();
    assert_eq!(metrics.total_runs, 1);
    assert_eq!(metrics.window_success_rate, 1.0);

    let metrics = fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    assert_eq!(metrics.total_runs, 2);
    assert_eq!(metrics.fail_runs, 1);
    assert_eq!(metrics.window_success_rate, 0.5);

    let snapshot = fixture.gate.snapshot().await;
    assert_eq!(snapshot.tools["compress-pdf"], metrics);
}

#[tokio::test]
async fn test_three_failures_disable_tool_and_raise_alert() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    for _ in 0..3 {
        fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    }

    let status = fixture.gate.reliability_status("compress-pdf").await;
    assert!(status.disabled);
    assert_eq!(status.window_success_rate, 0.0);
    assert_eq!(status.window, 3);
    assert_eq!(status.disabled_reason.as_deref(), Some("Reliability 0% below 95%"));
    assert!(status.disabled_at.is_some());

    let alerts = fixture.gate.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].tool, "compress-pdf");

    // Further failures do not append more alerts.
    fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    assert_eq!(fixture.gate.alerts().await.len(), 1);
}

#[tokio::test]
async fn test_fewer_than_min_runs_never_disable() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();

    let status = fixture.gate.reliability_status("compress-pdf").await;
    assert!(!status.disabled);
    assert_eq!(status.window_success_rate, 0.0);
}

#[tokio::test]
async fn test_untracked_tool_is_healthy() {
    let fixture = fixture();
    let status = fixture.gate.reliability_status("never-run").await;
    assert!(!status.disabled);
    assert_eq!(status.window_success_rate, 1.0);
    assert_eq!(status.window, 0);
}

#[tokio::test]
async fn test_unconfigured_tool_policy() {
    let fixture = fixture();
    let policy = fixture.resolver.tool_policy("merge-pdf").await;
    assert!(!policy.enabled);
    assert_eq!(policy.reason, Some(PolicyReason::NotConfigured));
}

#[tokio::test]
async fn test_hard_disabled_tool_needs_force_enable() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    let policy = fixture.resolver.tool_policy("pdf-to-word").await;
    assert!(!policy.enabled);
    assert_eq!(policy.reason, Some(PolicyReason::HardDisabled));

    write_config(
        &fixture,
        json!({
            "tools": {
                "pdf-to-word": { "enabled": true, "tier": "premium", "hardDisabled": true }
            },
            "overrides": { "forceEnable": ["pdf-to-word"] }
        }),
    );
    let policy = fixture.resolver.tool_policy("pdf-to-word").await;
    assert!(policy.enabled);
    assert_eq!(policy.tier.as_deref(), Some("premium"));
}

#[tokio::test]
async fn test_allowed_tool_keys_excludes_gated_tools() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    let allowed = fixture.resolver.allowed_tool_keys().await;
    assert!(allowed.contains(&"compress-pdf".to_string()));
    assert!(!allowed.contains(&"pdf-to-word".to_string()));

    for _ in 0..3 {
        fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    }

    let allowed = fixture.resolver.allowed_tool_keys().await;
    assert!(!allowed.contains(&"compress-pdf".to_string()));
    // Defaults merged in alongside the override document are still allowed.
    assert!(allowed.contains(&"rotate-pdf".to_string()));

    let policies = fixture.resolver.all_policies().await;
    assert_eq!(
        policies["compress-pdf"].reason,
        Some(PolicyReason::ReliabilityGate)
    );
}

#[tokio::test]
async fn test_reset_tool_clears_gate() {
    let fixture = fixture();
    write_config(&fixture, strict_config());

    for _ in 0..3 {
        fixture.gate.record_tool_run("compress-pdf", false).await.unwrap();
    }
    assert!(!fixture.resolver.tool_policy("compress-pdf").await.enabled);

    assert!(fixture.gate.reset_tool("compress-pdf").await.unwrap());
    assert!(!fixture.gate.reset_tool("compress-pdf").await.unwrap());

    assert!(fixture.resolver.tool_policy("compress-pdf").await.enabled);
    assert_eq!(fixture.gate.alerts().await.len(), 1);
}

#[tokio::test]
async fn test_corrupt_metrics_document_reads_as_empty() {
    let fixture = fixture();
    let store = JsonStore::new(fixture.config.data_dir());
    std::fs::write(store.path(TOOL_METRICS_FILE), "[[[").unwrap();

    let status = fixture.gate.reliability_status("compress-pdf").await;
    assert!(!status.disabled);

    let metrics = fixture.gate.record_tool_run("compress-pdf", true).await.unwrap();
    assert_eq!(metrics.total_runs, 1);
}

#[tokio::test]
async fn test_plan_limits_follow_document() {
    let fixture = fixture();
    write_config(
        &fixture,
        json!({ "plans": { "standard": { "monthlyLimit": 3 } } }),
    );
    let plans = fixture.resolver.plan_limits().await;
    assert_eq!(plans["standard"], PlanConfig::limited(3));
    assert_eq!(plans["premium"], PlanConfig::unlimited());
}

#[tokio::test]
async fn test_gated_tool_survives_alert_with_null_threshold() {
    let fixture = fixture();
    write_config(&fixture, strict_config());
    let store = JsonStore::new(fixture.config.data_dir());
    std::fs::write(
        store.path(TOOL_METRICS_FILE),
        json!({
            "tools": {
                "compress-pdf": {
                    "window": [false, false, false],
                    "totalRuns": 3,
                    "failRuns": 3,
                    "windowSuccessRate": 0,
                    "disabled": true,
                    "disabledAt": "2025-01-01T00:00:00Z",
                    "disabledReason": "Reliability 0% below NaN%"
                }
            },
            "alerts": [{
                "tool": "compress-pdf",
                "type": "reliability_gate",
                "successRate": 0,
                "threshold": null,
                "window": 3,
                "at": "2025-01-01T00:00:00Z",
                "message": "Reliability 0% below NaN%"
            }]
        })
        .to_string(),
    )
    .unwrap();

    assert!(fixture.gate.reliability_status("compress-pdf").await.disabled);

    fixture.gate.record_tool_run("rotate-pdf", true).await.unwrap();

    let raw = std::fs::read_to_string(store.path(TOOL_METRICS_FILE)).unwrap();
    let written: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(written["tools"]["compress-pdf"]["disabled"], json!(true));
    assert_eq!(written["alerts"].as_array().map(Vec::len), Some(1));

    let policy = fixture.resolver.tool_policy("compress-pdf").await;
    assert!(!policy.enabled);
    assert_eq!(policy.reason, Some(PolicyReason::ReliabilityGate));
}
