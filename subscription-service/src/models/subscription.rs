//! Plan subscription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Derived lifecycle state of a subscription at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Trialing,
    Active,
    CanceledPending,
    Ended,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Trialing => "trialing",
            SubscriptionState::Active => "active",
            SubscriptionState::CanceledPending => "canceled_pending",
            SubscriptionState::Ended => "ended",
        }
    }
}

/// A tenant's subscription to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub slug: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub cancels_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// `ends_at`, when set alongside `starts_at`, must not precede it.
    pub fn has_valid_period(&self) -> bool {
        match (self.starts_at, self.ends_at) {
            (Some(starts_at), Some(ends_at)) => ends_at >= starts_at,
            _ => true,
        }
    }
}

/// Start and end of one billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Change to `cancels_at` carried by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelsAtChange {
    Set(DateTime<Utc>),
    Clear,
}

/// Partial update applied to a subscription in one atomic write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub period: Option<BillingPeriod>,
    pub cancels_at: Option<CancelsAtChange>,
    pub plan_id: Option<Uuid>,
}

impl SubscriptionPatch {
    /// New period, cancellation cleared, subscription moved to `plan_id`.
    pub fn renewal(period: BillingPeriod, plan_id: Uuid) -> Self {
        Self {
            period: Some(period),
            cancels_at: Some(CancelsAtChange::Clear),
            plan_id: Some(plan_id),
        }
    }

    pub fn cancellation(cancels_at: DateTime<Utc>) -> Self {
        Self {
            cancels_at: Some(CancelsAtChange::Set(cancels_at)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.period.is_none() && self.cancels_at.is_none() && self.plan_id.is_none()
    }

    /// Apply to an in-memory copy, stamping `updated_utc`.
    pub fn apply(&self, subscription: &mut Subscription, now: DateTime<Utc>) {
        if let Some(period) = self.period {
            subscription.starts_at = Some(period.starts_at);
            subscription.ends_at = Some(period.ends_at);
        }
        match self.cancels_at {
            Some(CancelsAtChange::Set(at)) => subscription.cancels_at = Some(at),
            Some(CancelsAtChange::Clear) => subscription.cancels_at = None,
            None => {}
        }
        if let Some(plan_id) = self.plan_id {
            subscription.plan_id = plan_id;
        }
        subscription.updated_utc = now;
    }
}

/// Request to subscribe a tenant to a plan.
#[derive(Debug, Clone, Validate)]
pub struct NewSubscription {
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: String,
    /// First period start; defaults to the current time.
    pub starts_at: Option<DateTime<Utc>>,
}

/// Serializable view of a subscription with its derived flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSnapshot {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub active: bool,
    pub inactive: bool,
    pub ended: bool,
    pub on_trial: bool,
    pub state: SubscriptionState,
}
