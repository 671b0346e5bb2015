//! Per-client monthly usage metering
//!
//! Usage is attributed to a [`ClientIdentity`] and counted per tool and UTC
//! calendar month. A new month starts every counter at zero because no record
//! exists for it yet.

mod client;
mod ledger;
mod plan;

pub use client::{ClientIdentity, MonthKey, UsageKey};
pub use ledger::{UsageDocument, UsageLedger, UsageRecord, UsageRequest, UsageStatus};
pub use plan::{
    Order, OrderPlanResolver, OrderStatus, OrdersDocument, PlanResolver, StaticPlanResolver,
};
