//! Plan resolution for clients

use super::client::ClientIdentity;
use crate::error::Result;
use crate::store::{JsonStore, ORDERS_FILE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Decides which plan a client is on
#[async_trait]
pub trait PlanResolver: Send + Sync {
    /// Plan name for the client
    async fn resolve_plan(&self, client: &ClientIdentity) -> Result<String>;
}

/// Puts every client on the same plan
#[derive(Debug, Clone)]
pub struct StaticPlanResolver {
    plan: String,
}

impl StaticPlanResolver {
    /// Resolve every client to `plan`
    pub fn new(plan: impl Into<String>) -> Self {
        Self { plan: plan.into() }
    }
}

#[async_trait]
impl PlanResolver for StaticPlanResolver {
    async fn resolve_plan(&self, _client: &ClientIdentity) -> Result<String> {
        Ok(self.plan.clone())
    }
}

/// Payment order status as written by the payment flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, not yet paid
    Created,
    /// Payer approved the order
    Approved,
    /// Payment captured
    Captured,
    /// Any status this crate does not act on
    #[default]
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Whether this status grants the premium plan
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Approved | OrderStatus::Captured)
    }
}

/// One payment order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// IP address the order was placed from
    #[serde(default)]
    pub ip: Option<String>,
    /// Order status
    #[serde(default)]
    pub status: OrderStatus,
}

/// The `orders.json` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersDocument {
    /// Orders in creation order
    pub orders: Vec<Order>,
}

/// Grants the premium plan to IPs with an approved or captured order.
///
/// A missing or unreadable orders document puts everyone on the default plan.
#[derive(Debug, Clone)]
pub struct OrderPlanResolver {
    store: JsonStore,
    default_plan: String,
    premium_plan: String,
}

impl OrderPlanResolver {
    /// Create a resolver reading `orders.json` from `store`
    pub fn new(
        store: JsonStore,
        default_plan: impl Into<String>,
        premium_plan: impl Into<String>,
    ) -> Self {
        Self {
            store,
            default_plan: default_plan.into(),
            premium_plan: premium_plan.into(),
        }
    }
}

#[async_trait]
impl PlanResolver for OrderPlanResolver {
    async fn resolve_plan(&self, client: &ClientIdentity) -> Result<String> {
        let Some(ip) = client.ip.as_deref().filter(|ip| !ip.is_empty()) else {
            return Ok(self.default_plan.clone());
        };

        let document: OrdersDocument = self.store.read(ORDERS_FILE).await;
        let paid = document
            .orders
            .iter()
            .any(|order| order.ip.as_deref() == Some(ip) && order.status.is_paid());

        Ok(if paid {
            self.premium_plan.clone()
        } else {
            self.default_plan.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_orders(temp_dir: &TempDir, orders: serde_json::Value) {
        std::fs::write(
            temp_dir.path().join(ORDERS_FILE),
            json!({ "orders": orders }).to_string(),
        )
        .unwrap();
    }

    fn resolver(temp_dir: &TempDir) -> OrderPlanResolver {
        OrderPlanResolver::new(JsonStore::new(temp_dir.path()), "standard", "premium")
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticPlanResolver::new("standard");
        let plan = resolver.resolve_plan(&ClientIdentity::user("1")).await.unwrap();
        assert_eq!(plan, "standard");
    }

    #[tokio::test]
    async fn test_missing_orders_resolve_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let plan = resolver(&temp_dir)
            .resolve_plan(&ClientIdentity::anonymous("9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(plan, "standard");
    }

    #[tokio::test]
    async fn test_approved_and_captured_orders_are_premium() {
        let temp_dir = TempDir::new().unwrap();
        write_orders(
            &temp_dir,
            json!([
                { "ip": "9.9.9.9", "status": "APPROVED" },
                { "ip": "8.8.8.8", "status": "CAPTURED" },
                { "ip": "7.7.7.7", "status": "CREATED" },
                { "ip": "6.6.6.6", "status": "VOIDED" }
            ]),
        );
        let resolver = resolver(&temp_dir);

        for (ip, expected) in [
            ("9.9.9.9", "premium"),
            ("8.8.8.8", "premium"),
            ("7.7.7.7", "standard"),
            ("6.6.6.6", "standard"),
            ("1.2.3.4", "standard"),
        ] {
            let plan = resolver
                .resolve_plan(&ClientIdentity::anonymous(ip).with_token("pro"))
                .await
                .unwrap();
            assert_eq!(plan, expected, "ip {ip}");
        }
    }

    #[tokio::test]
    async fn test_client_without_ip_is_default() {
        let temp_dir = TempDir::new().unwrap();
        write_orders(&temp_dir, json!([{ "ip": "9.9.9.9", "status": "APPROVED" }]));
        let plan = resolver(&temp_dir)
            .resolve_plan(&ClientIdentity::user("42"))
            .await
            .unwrap();
        assert_eq!(plan, "standard");
    }
}
