//! # Swifter - Governance for a PDF tools service
//!
//! Swifter decides whether a conversion tool may run for a given client and
//! keeps the books afterwards:
//! - Layered tools configuration with plans, switches and manual overrides
//! - Per-client monthly usage metering against plan limits
//! - A sliding-window reliability gate that disables failing tools
//! - A policy resolver combining all of the above into one decision
//!
//! All state lives in small JSON documents inside one data directory and is
//! written with a temp-file-then-rename step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swifter_core::prelude::*;
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let governor = ToolGovernor::new(&SwifterConfig::load()?);
//!     let client = ClientIdentity::anonymous("203.0.113.7").with_token("browser-1");
//!
//!     let now = Utc::now();
//!     if governor.authorize(&client, "compress-pdf", now).await?.is_granted() {
//!         let success = true; // run the tool here
//!         governor.record_outcome(&client, "compress-pdf", now, success).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod governor;
pub mod store;
pub mod tools;
pub mod usage;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SwifterConfig;
    pub use crate::error::{Result, SwifterError};
    pub use crate::governor::{Authorization, Denial, Outcome, ToolGovernor};
    pub use crate::store::JsonStore;

    pub use crate::tools::{
        Alert, ConfigStore, PlanConfig, PolicyReason, PolicyResolver, ReliabilityConfig,
        ReliabilityGate, ReliabilityStatus, ToolConfig, ToolMetrics, ToolPolicy, ToolsConfig,
    };

    pub use crate::usage::{
        ClientIdentity, MonthKey, OrderPlanResolver, PlanResolver, StaticPlanResolver,
        UsageKey, UsageLedger, UsageRecord, UsageRequest, UsageStatus,
    };
}
