//! Storage traits for subscriptions and plans.
//!
//! The service depends on these traits only. [`crate::services::Database`]
//! backs them with Postgres; [`crate::services::InMemoryStore`] keeps
//! everything in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::models::{CreatePlan, Plan, Subscription, SubscriptionPatch};
use crate::services::filters::SubscriptionFilter;

/// Row to insert for a new subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub slug: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn has_valid_period(&self) -> bool {
        match (self.starts_at, self.ends_at) {
            (Some(starts_at), Some(ends_at)) => ends_at >= starts_at,
            _ => true,
        }
    }
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_id(&self, subscription_id: Uuid)
        -> Result<Option<Subscription>, SubscriptionError>;

    async fn insert(
        &self,
        record: &SubscriptionRecord,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError>;

    /// Apply every field of `patch` in one write, or none of them.
    async fn patch(
        &self,
        subscription_id: Uuid,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError>;

    async fn list(
        &self,
        filters: &[SubscriptionFilter],
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, SubscriptionError>;

    async fn health_check(&self) -> Result<(), SubscriptionError> {
        Ok(())
    }
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, SubscriptionError>;

    async fn insert_plan(
        &self,
        input: &CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<Plan, SubscriptionError>;
}
