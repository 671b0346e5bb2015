//! Tool governance: configuration, reliability gating and policy resolution
//!
//! This module decides whether a conversion tool may run at all. Key pieces:
//! - [`ConfigStore`] loads the layered tools configuration
//! - [`ReliabilityGate`] tracks recent outcomes and disables unreliable tools
//! - [`PolicyResolver`] combines both with manual overrides into one decision
//!
//! # Example
//!
//! ```rust,no_run
//! use swifter_core::store::JsonStore;
//! use swifter_core::tools::{ConfigStore, PolicyResolver, ReliabilityGate};
//!
//! # async fn run() -> swifter_core::error::Result<()> {
//! let store = JsonStore::new("data");
//! let config = ConfigStore::new(store.clone());
//! let gate = ReliabilityGate::new(store, config.clone());
//! let resolver = PolicyResolver::new(config, gate.clone());
//!
//! if resolver.tool_policy("compress-pdf").await.enabled {
//!     // ... call the remote conversion API, then report the outcome
//!     gate.record_tool_run("compress-pdf", true).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod policy;
mod reliability;

pub use config::{
    ConfigStore, DEFAULT_TIER, OverridesConfig, PlanConfig, ReliabilityConfig, ToolConfig,
    ToolsConfig, normalize_tool_key,
};
pub use policy::{PolicyReason, PolicyResolver, ToolPolicy, check_static, evaluate};
pub use reliability::{
    Alert, AlertKind, MAX_ALERTS, MetricsDocument, ReliabilityGate, ReliabilityStatus,
    ToolMetrics, window_rate,
};

#[cfg(test)]
mod tests;
