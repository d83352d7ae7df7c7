//! Domain models for subscription-service.

mod plan;
mod subscription;

pub use plan::{CreatePlan, InvoiceInterval, Plan};
pub use subscription::{
    BillingPeriod, CancelsAtChange, NewSubscription, Subscription, SubscriptionPatch,
    SubscriptionSnapshot, SubscriptionState,
};
