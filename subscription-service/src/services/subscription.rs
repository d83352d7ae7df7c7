//! Subscription lifecycle operations.
//!
//! Handles subscribing, renewing, cancelling and reporting status. Storage is
//! injected as repository trait objects; the current time is always passed in
//! by the caller.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::SubscriptionError;
use crate::models::{
    CreatePlan, NewSubscription, Plan, Subscription, SubscriptionPatch, SubscriptionSnapshot,
};
use crate::services::evaluator;
use crate::services::filters::SubscriptionFilter;
use crate::services::metrics::{record_error, record_plan_operation, record_subscription_operation};
use crate::services::period::{add_interval, compute_new_period};
use crate::services::repository::{PlanRepository, SubscriptionRecord, SubscriptionRepository};

/// Record failures for alerting before handing them back to the caller.
fn observe<T>(operation: &str, result: Result<T, SubscriptionError>) -> Result<T, SubscriptionError> {
    if let Err(e) = &result {
        record_error(e.kind(), operation);
        warn!(operation = operation, error = %e, "Subscription operation failed");
    }
    result
}

#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
        }
    }

    pub fn subscriptions(&self) -> &Arc<dyn SubscriptionRepository> {
        &self.subscriptions
    }

    /// Validate and store a new plan.
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_plan(
        &self,
        input: CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<Plan, SubscriptionError> {
        let plan = observe("create_plan", self.try_create_plan(&input, now).await)?;
        record_plan_operation("create");
        Ok(plan)
    }

    /// Subscribe a tenant to a plan.
    ///
    /// The first period starts at `input.starts_at` (or `now`). When the plan
    /// carries a trial, `trial_ends_at` is set that far past the start.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, plan_id = %input.plan_id))]
    pub async fn subscribe(
        &self,
        input: NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = observe("subscribe", self.try_subscribe(&input, now).await)?;
        record_subscription_operation(&subscription.tenant_id.to_string(), "subscribe");
        info!(
            subscription_id = %subscription.subscription_id,
            ends_at = ?subscription.ends_at,
            trial_ends_at = ?subscription.trial_ends_at,
            "Subscription started"
        );
        Ok(subscription)
    }

    /// Start a fresh period from `now` on `plan`.
    ///
    /// The new period, the cleared cancellation and the new plan id are
    /// written as one patch. If the write fails the stored subscription is
    /// left exactly as it was and the error is returned without retrying.
    #[instrument(skip(self, subscription, plan), fields(subscription_id = %subscription.subscription_id, plan_id = %plan.plan_id))]
    pub async fn renew(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let renewed = observe("renew", self.try_renew(subscription, plan, now).await)?;
        record_subscription_operation(&renewed.tenant_id.to_string(), "renew");
        info!(
            previous_plan_id = %subscription.plan_id,
            starts_at = ?renewed.starts_at,
            ends_at = ?renewed.ends_at,
            "Subscription renewed"
        );
        Ok(renewed)
    }

    /// Load both records, then [`SubscriptionService::renew`].
    pub async fn renew_by_id(
        &self,
        subscription_id: Uuid,
        plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = observe("renew", self.load_subscription(subscription_id).await)?;
        let plan = observe("renew", self.load_plan(plan_id).await)?;
        self.renew(&subscription, &plan, now).await
    }

    /// Schedule cancellation.
    ///
    /// Without an explicit instant the cancellation takes effect when access
    /// would otherwise lapse (end of period, or end of a trial still running
    /// past it), or immediately for open-ended subscriptions. Subscriptions
    /// whose access has already lapsed are rejected.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let canceled = observe("cancel", self.try_cancel(subscription_id, at, now).await)?;
        record_subscription_operation(&canceled.tenant_id.to_string(), "cancel");
        info!(cancels_at = ?canceled.cancels_at, "Subscription cancellation scheduled");
        Ok(canceled)
    }

    /// Current derived state of one subscription.
    pub async fn status(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionSnapshot, SubscriptionError> {
        let subscription = observe("status", self.load_subscription(subscription_id).await)?;
        Ok(evaluator::snapshot(&subscription, now))
    }

    /// Subscriptions matching every filter.
    pub async fn list(
        &self,
        filters: &[SubscriptionFilter],
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        observe("list", self.subscriptions.list(filters, now).await)
    }

    async fn try_create_plan(
        &self,
        input: &CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<Plan, SubscriptionError> {
        input.validate()?;
        self.plans.insert_plan(input, now).await
    }

    async fn try_subscribe(
        &self,
        input: &NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        input.validate()?;

        let plan = self.load_plan(input.plan_id).await?;
        if !plan.is_active {
            return Err(SubscriptionError::Configuration(format!(
                "plan {} is not active",
                plan.plan_id
            )));
        }

        let period = compute_new_period(&plan, None, None, input.starts_at, now)?;
        let trial_ends_at = match plan.trial()? {
            Some((interval, count)) => Some(add_interval(period.starts_at, interval, count)?),
            None => None,
        };

        let record = SubscriptionRecord {
            tenant_id: input.tenant_id,
            plan_id: plan.plan_id,
            slug: input.slug.clone(),
            starts_at: Some(period.starts_at),
            ends_at: Some(period.ends_at),
            trial_ends_at,
        };
        self.subscriptions.insert(&record, now).await
    }

    async fn try_renew(
        &self,
        subscription: &Subscription,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let period = compute_new_period(plan, None, None, None, now)?;
        let patch = SubscriptionPatch::renewal(period, plan.plan_id);
        self.subscriptions
            .patch(subscription.subscription_id, &patch, now)
            .await
    }

    async fn try_cancel(
        &self,
        subscription_id: Uuid,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let subscription = self.load_subscription(subscription_id).await?;
        if evaluator::is_inactive(&subscription, now) {
            return Err(SubscriptionError::AlreadyEnded(subscription_id));
        }

        let cancels_at = at
            .or_else(|| evaluator::access_ends_at(&subscription, now))
            .unwrap_or(now);
        self.subscriptions
            .patch(
                subscription_id,
                &SubscriptionPatch::cancellation(cancels_at),
                now,
            )
            .await
    }

    async fn load_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or(SubscriptionError::SubscriptionNotFound(subscription_id))
    }

    async fn load_plan(&self, plan_id: Uuid) -> Result<Plan, SubscriptionError> {
        self.plans
            .find_plan(plan_id)
            .await?
            .ok_or(SubscriptionError::PlanNotFound(plan_id))
    }
}
