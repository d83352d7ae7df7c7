//! Services module for subscription-service.

pub mod database;
pub mod evaluator;
pub mod filters;
pub mod in_memory;
pub mod metrics;
pub mod period;
pub mod repository;
pub mod subscription;

pub use database::Database;
pub use filters::SubscriptionFilter;
pub use in_memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_plan_operation,
    record_subscription_operation,
};
pub use period::compute_new_period;
pub use repository::{PlanRepository, SubscriptionRecord, SubscriptionRepository};
pub use subscription::SubscriptionService;
