//! Composable selection predicates over subscriptions.
//!
//! A slice of filters is combined with AND. Each filter evaluates in memory
//! through [`SubscriptionFilter::matches`] and renders to SQL through
//! [`SubscriptionFilter::push_sql`]; the two must agree for every row.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::Subscription;
use crate::services::evaluator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    Active,
    Inactive,
    /// `ends_at` has passed.
    EndedPeriod,
    /// `trial_ends_at` has been reached.
    EndedTrial,
    /// `cancels_at` is set.
    CancelPending,
    Slug(String),
    Tenant(Uuid),
    Plan(Uuid),
}

impl SubscriptionFilter {
    pub fn matches(&self, subscription: &Subscription, now: DateTime<Utc>) -> bool {
        match self {
            SubscriptionFilter::Active => evaluator::is_active(subscription, now),
            SubscriptionFilter::Inactive => evaluator::is_inactive(subscription, now),
            SubscriptionFilter::EndedPeriod => evaluator::is_ended(subscription, now),
            SubscriptionFilter::EndedTrial => subscription
                .trial_ends_at
                .is_some_and(|trial_ends_at| trial_ends_at <= now),
            SubscriptionFilter::CancelPending => subscription.cancels_at.is_some(),
            SubscriptionFilter::Slug(slug) => subscription.slug == *slug,
            SubscriptionFilter::Tenant(tenant_id) => subscription.tenant_id == *tenant_id,
            SubscriptionFilter::Plan(plan_id) => subscription.plan_id == *plan_id,
        }
    }

    /// Append this filter's boolean SQL expression.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>, now: DateTime<Utc>) {
        match self {
            SubscriptionFilter::Active => push_active(builder, now),
            SubscriptionFilter::Inactive => {
                builder.push("NOT ");
                push_active(builder, now);
            }
            SubscriptionFilter::EndedPeriod => {
                builder.push("(ends_at IS NOT NULL AND ends_at < ");
                builder.push_bind(now);
                builder.push(")");
            }
            SubscriptionFilter::EndedTrial => {
                builder.push("(trial_ends_at IS NOT NULL AND trial_ends_at <= ");
                builder.push_bind(now);
                builder.push(")");
            }
            SubscriptionFilter::CancelPending => {
                builder.push("cancels_at IS NOT NULL");
            }
            SubscriptionFilter::Slug(slug) => {
                builder.push("slug = ");
                builder.push_bind(slug.clone());
            }
            SubscriptionFilter::Tenant(tenant_id) => {
                builder.push("tenant_id = ");
                builder.push_bind(*tenant_id);
            }
            SubscriptionFilter::Plan(plan_id) => {
                builder.push("plan_id = ");
                builder.push_bind(*plan_id);
            }
        }
    }
}

/// Not ended, or still inside the trial window.
fn push_active(builder: &mut QueryBuilder<'_, Postgres>, now: DateTime<Utc>) {
    builder.push("((ends_at IS NULL OR ends_at >= ");
    builder.push_bind(now);
    builder.push(") OR (trial_ends_at IS NOT NULL AND trial_ends_at > ");
    builder.push_bind(now);
    builder.push("))");
}

/// True when `subscription` satisfies every filter.
pub fn matches_all(
    filters: &[SubscriptionFilter],
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> bool {
    filters.iter().all(|f| f.matches(subscription, now))
}

/// Append ` WHERE a AND b ...`, or nothing for an empty slice.
pub fn push_where(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[SubscriptionFilter],
    now: DateTime<Utc>,
) {
    for (i, filter) in filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        filter.push_sql(builder, now);
    }
}
