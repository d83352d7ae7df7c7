//! In-memory repositories.
//!
//! Wraps data in Arc for cheap cloning. Used by tests and by callers that
//! evaluate subscriptions without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::models::{CreatePlan, Plan, Subscription, SubscriptionPatch};
use crate::services::filters::{matches_all, SubscriptionFilter};
use crate::services::repository::{PlanRepository, SubscriptionRecord, SubscriptionRepository};

#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
    plans: RwLock<HashMap<Uuid, Plan>>,
    fail_patches: AtomicBool,
    unhealthy: AtomicBool,
}

fn poisoned<T>(_: T) -> SubscriptionError {
    SubscriptionError::Persistence(anyhow::anyhow!("in-memory store lock poisoned"))
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `patch` fail with a persistence error.
    pub fn fail_patches(&self, fail: bool) {
        self.inner.fail_patches.store(fail, Ordering::SeqCst);
    }

    /// Make `health_check` report the store as unavailable.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.inner.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Insert or replace a subscription as-is.
    pub fn seed_subscription(&self, subscription: Subscription) {
        if let Ok(mut subscriptions) = self.inner.subscriptions.write() {
            subscriptions.insert(subscription.subscription_id, subscription);
        }
    }

    /// Insert or replace a plan as-is.
    pub fn seed_plan(&self, plan: Plan) {
        if let Ok(mut plans) = self.inner.plans.write() {
            plans.insert(plan.plan_id, plan);
        }
    }

    /// Current stored copy of a subscription.
    pub fn get_subscription(&self, subscription_id: Uuid) -> Option<Subscription> {
        self.inner
            .subscriptions
            .read()
            .ok()
            .and_then(|subscriptions| subscriptions.get(&subscription_id).cloned())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn find_by_id(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let subscriptions = self.inner.subscriptions.read().map_err(poisoned)?;
        Ok(subscriptions.get(&subscription_id).cloned())
    }

    async fn insert(
        &self,
        record: &SubscriptionRecord,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if !record.has_valid_period() {
            return Err(SubscriptionError::InvalidPeriod);
        }

        let mut subscriptions = self.inner.subscriptions.write().map_err(poisoned)?;

        let duplicate = subscriptions
            .values()
            .any(|s| s.tenant_id == record.tenant_id && s.slug == record.slug);
        if duplicate {
            return Err(SubscriptionError::Persistence(anyhow::anyhow!(
                "subscription '{}' already exists for tenant {}",
                record.slug,
                record.tenant_id
            )));
        }

        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            tenant_id: record.tenant_id,
            plan_id: record.plan_id,
            slug: record.slug.clone(),
            starts_at: record.starts_at,
            ends_at: record.ends_at,
            trial_ends_at: record.trial_ends_at,
            cancels_at: None,
            created_utc: now,
            updated_utc: now,
        };
        subscriptions.insert(subscription.subscription_id, subscription.clone());
        Ok(subscription)
    }

    async fn patch(
        &self,
        subscription_id: Uuid,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if self.inner.fail_patches.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Persistence(anyhow::anyhow!(
                "simulated write failure"
            )));
        }

        let mut subscriptions = self.inner.subscriptions.write().map_err(poisoned)?;
        let stored = subscriptions
            .get_mut(&subscription_id)
            .ok_or(SubscriptionError::SubscriptionNotFound(subscription_id))?;

        let mut updated = stored.clone();
        patch.apply(&mut updated, now);
        *stored = updated.clone();

        Ok(updated)
    }

    async fn list(
        &self,
        filters: &[SubscriptionFilter],
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let subscriptions = self.inner.subscriptions.read().map_err(poisoned)?;
        let mut matched: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| matches_all(filters, s, now))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then(a.subscription_id.cmp(&b.subscription_id))
        });
        Ok(matched)
    }

    async fn health_check(&self) -> Result<(), SubscriptionError> {
        if self.inner.unhealthy.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Persistence(anyhow::anyhow!(
                "store marked unhealthy"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanRepository for InMemoryStore {
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, SubscriptionError> {
        let plans = self.inner.plans.read().map_err(poisoned)?;
        Ok(plans.get(&plan_id).cloned())
    }

    async fn insert_plan(
        &self,
        input: &CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<Plan, SubscriptionError> {
        let mut plans = self.inner.plans.write().map_err(poisoned)?;
        if plans.values().any(|p| p.slug == input.slug) {
            return Err(SubscriptionError::Persistence(anyhow::anyhow!(
                "plan '{}' already exists",
                input.slug
            )));
        }

        let plan = Plan {
            plan_id: Uuid::new_v4(),
            slug: input.slug.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            price: input.price,
            currency: input.currency.clone(),
            invoice_interval: input.invoice_interval.as_str().to_string(),
            invoice_period: input.invoice_period,
            trial_interval: input.trial_interval.map(|i| i.as_str().to_string()),
            trial_period: input.trial_period,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        };
        plans.insert(plan.plan_id, plan.clone());
        Ok(plan)
    }
}
