//! Billing period arithmetic.
//!
//! Day and week intervals add fixed spans. Month and year intervals add
//! calendar months; when the start day does not exist in the target month the
//! end is clamped to that month's last day, so 2024-01-31 + 1 month lands on
//! 2024-02-29 and 2024-02-29 + 1 year lands on 2025-02-28.

use chrono::{DateTime, Days, Months, Utc};

use crate::error::SubscriptionError;
use crate::models::{BillingPeriod, InvoiceInterval, Plan};

/// Add `count` intervals to `start`.
pub fn add_interval(
    start: DateTime<Utc>,
    interval: InvoiceInterval,
    count: u32,
) -> Result<DateTime<Utc>, SubscriptionError> {
    let end = match interval {
        InvoiceInterval::Day => start.checked_add_days(Days::new(u64::from(count))),
        InvoiceInterval::Week => start.checked_add_days(Days::new(u64::from(count) * 7)),
        InvoiceInterval::Month => start.checked_add_months(Months::new(count)),
        InvoiceInterval::Year => count
            .checked_mul(12)
            .and_then(|months| start.checked_add_months(Months::new(months))),
    };

    end.ok_or_else(|| {
        SubscriptionError::Configuration(format!(
            "{} x {} from {} is out of range",
            count, interval, start
        ))
    })
}

/// Compute the period that starts at `start` (or `now`) and lasts
/// `invoice_period` x `invoice_interval`.
///
/// Overrides that are `None` fall back to the plan's own values. A missing or
/// unknown interval and a period below one are configuration errors; a
/// zero-length period is never produced.
pub fn compute_new_period(
    plan: &Plan,
    invoice_interval: Option<InvoiceInterval>,
    invoice_period: Option<i32>,
    start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<BillingPeriod, SubscriptionError> {
    let interval = match invoice_interval {
        Some(interval) => interval,
        None => plan.interval()?,
    };
    let period = invoice_period.unwrap_or(plan.invoice_period);
    if period < 1 {
        return Err(SubscriptionError::Configuration(format!(
            "plan {} has invalid invoice period {}",
            plan.plan_id, period
        )));
    }

    let starts_at = start.unwrap_or(now);
    let ends_at = add_interval(starts_at, interval, period as u32)?;

    Ok(BillingPeriod { starts_at, ends_at })
}
