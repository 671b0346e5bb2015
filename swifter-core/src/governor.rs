//! Single entry point combining policy, usage and reliability
//!
//! A request handler asks [`ToolGovernor::authorize`] before running a tool and
//! reports the result with [`ToolGovernor::record_outcome`] afterwards.

use crate::config::SwifterConfig;
use crate::error::Result;
use crate::store::JsonStore;
use crate::tools::{
    ConfigStore, PolicyReason, PolicyResolver, ReliabilityGate, ToolMetrics, ToolPolicy,
};
use crate::usage::{
    ClientIdentity, OrderPlanResolver, PlanResolver, UsageLedger, UsageRecord, UsageRequest,
    UsageStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    /// The tool policy refused the tool
    Policy {
        /// First failing policy step
        reason: PolicyReason,
        /// Full resolved policy
        policy: ToolPolicy,
    },
    /// The client has used up its monthly allowance
    UsageLimit(UsageStatus),
}

impl Denial {
    /// Stable code for responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            Denial::Policy { reason, .. } => reason.as_str(),
            Denial::UsageLimit(_) => "usage_limit",
        }
    }
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::Policy { reason, .. } => write!(f, "tool refused: {}", reason),
            Denial::UsageLimit(status) => write!(
                f,
                "monthly limit of {} reached on plan {}",
                status.limit.unwrap_or_default(),
                status.plan
            ),
        }
    }
}

/// Result of [`ToolGovernor::authorize`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Authorization {
    /// The tool may run
    Granted {
        /// Resolved tool policy
        policy: ToolPolicy,
        /// Client usage before this run
        usage: UsageStatus,
    },
    /// The tool may not run
    Denied(Denial),
}

impl Authorization {
    /// Whether the tool may run
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted { .. })
    }

    /// The denial, if any
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Authorization::Granted { .. } => None,
            Authorization::Denied(denial) => Some(denial),
        }
    }
}

/// What [`ToolGovernor::record_outcome`] wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Reliability metrics after the run
    pub metrics: ToolMetrics,
    /// Usage counter after the run; `None` for failed runs
    pub usage: Option<UsageRecord>,
}

/// Facade over the configuration store, usage ledger, reliability gate and
/// policy resolver, all rooted at one data directory.
#[derive(Clone)]
pub struct ToolGovernor {
    config: ConfigStore,
    ledger: UsageLedger,
    gate: ReliabilityGate,
    resolver: PolicyResolver,
    plans: Arc<dyn PlanResolver>,
}

impl std::fmt::Debug for ToolGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGovernor")
            .field("data_dir", &self.config.data_dir())
            .finish_non_exhaustive()
    }
}

impl ToolGovernor {
    /// Build a governor from process settings.
    ///
    /// Plans are resolved from `orders.json` in the data directory.
    pub fn new(settings: &SwifterConfig) -> Self {
        let store = JsonStore::new(&settings.data_dir);
        let plans = OrderPlanResolver::new(
            store.clone(),
            settings.default_plan.clone(),
            settings.premium_plan.clone(),
        );
        Self::with_plan_resolver(store, Arc::new(plans))
    }

    /// Governor over `data_dir` with default plan settings
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self::new(&SwifterConfig::with_data_dir(data_dir.as_ref()))
    }

    /// Governor with a custom plan resolver
    pub fn with_plan_resolver(store: JsonStore, plans: Arc<dyn PlanResolver>) -> Self {
        let config = ConfigStore::new(store.clone());
        let gate = ReliabilityGate::new(store.clone(), config.clone());
        let resolver = PolicyResolver::new(config.clone(), gate.clone());
        let ledger = UsageLedger::new(store, config.clone());
        Self {
            config,
            ledger,
            gate,
            resolver,
            plans,
        }
    }

    /// Decide whether `client` may run `tool_key` at `at`.
    ///
    /// Policy is checked first; the usage limit only applies to tools the
    /// policy allows. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error for a client with neither user id nor IP address, or
    /// when the plan cannot be resolved.
    pub async fn authorize(
        &self,
        client: &ClientIdentity,
        tool_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Authorization> {
        client.ensure_identified()?;

        let policy = self.resolver.tool_policy(tool_key).await;
        if let Some(reason) = policy.reason.filter(|_| !policy.enabled) {
            tracing::info!(tool = %tool_key, reason = %reason, "tool refused by policy");
            return Ok(Authorization::Denied(Denial::Policy { reason, policy }));
        }

        let plan = self.plans.resolve_plan(client).await?;
        let request = UsageRequest::new(client, tool_key).at(at);
        let usage = self.ledger.usage_status(&request, &plan).await;
        if !usage.allowed {
            tracing::info!(
                tool = %tool_key,
                client = %client.client_key(),
                plan = %usage.plan,
                used = usage.used,
                "monthly usage limit reached"
            );
            return Ok(Authorization::Denied(Denial::UsageLimit(usage)));
        }

        Ok(Authorization::Granted { policy, usage })
    }

    /// Record the result of a tool run.
    ///
    /// Every run feeds the reliability window. Only successful runs count
    /// against the client's monthly allowance.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be written.
    pub async fn record_outcome(
        &self,
        client: &ClientIdentity,
        tool_key: &str,
        at: DateTime<Utc>,
        success: bool,
    ) -> Result<Outcome> {
        let metrics = self.gate.record_tool_run(tool_key, success).await?;
        let usage = if success {
            let request = UsageRequest::new(client, tool_key).at(at);
            Some(self.ledger.increment_usage(&request).await?)
        } else {
            None
        };
        Ok(Outcome { metrics, usage })
    }

    /// Configuration store
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Usage ledger
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Reliability gate
    pub fn gate(&self) -> &ReliabilityGate {
        &self.gate
    }

    /// Policy resolver
    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    /// Plan resolver
    pub fn plans(&self) -> &Arc<dyn PlanResolver> {
        &self.plans
    }
}
