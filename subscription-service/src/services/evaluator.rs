//! Derived lifecycle state of a subscription.
//!
//! Every function takes the current instant explicitly; nothing here reads a
//! clock.

use chrono::{DateTime, Utc};

use crate::models::{Subscription, SubscriptionSnapshot, SubscriptionState};

/// The billing period is over: `ends_at` is set and `now` is strictly after it.
/// Open-ended subscriptions never end.
pub fn is_ended(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    subscription.ends_at.is_some_and(|ends_at| now > ends_at)
}

/// Inside the trial window: `trial_ends_at` is set and `now` is strictly before it.
pub fn is_on_trial(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    subscription
        .trial_ends_at
        .is_some_and(|trial_ends_at| now < trial_ends_at)
}

pub fn is_active(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    !is_ended(subscription, now) || is_on_trial(subscription, now)
}

pub fn is_inactive(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    !is_active(subscription, now)
}

/// Instant access lapses: `ends_at`, pushed out to `trial_ends_at` while the
/// trial is still running. `None` for open-ended subscriptions.
pub fn access_ends_at(subscription: &Subscription, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let ends_at = subscription.ends_at?;
    match subscription.trial_ends_at {
        Some(trial_ends_at) if now < trial_ends_at => Some(ends_at.max(trial_ends_at)),
        _ => Some(ends_at),
    }
}

/// Collapse the flags into one state. `Ended` means access has lapsed
/// (inactive), so a running trial past `ends_at` is still `Trialing` even
/// though the `ended` period flag is set. Among active subscriptions a
/// pending cancellation outranks the trial.
pub fn state(subscription: &Subscription, now: DateTime<Utc>) -> SubscriptionState {
    if is_inactive(subscription, now) {
        SubscriptionState::Ended
    } else if subscription.cancels_at.is_some() {
        SubscriptionState::CanceledPending
    } else if is_on_trial(subscription, now) {
        SubscriptionState::Trialing
    } else {
        SubscriptionState::Active
    }
}

pub fn snapshot(subscription: &Subscription, now: DateTime<Utc>) -> SubscriptionSnapshot {
    let active = is_active(subscription, now);
    SubscriptionSnapshot {
        subscription: subscription.clone(),
        active,
        inactive: !active,
        ended: is_ended(subscription, now),
        on_trial: is_on_trial(subscription, now),
        state: state(subscription, now),
    }
}
