//! Subscription plan model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::SubscriptionError;

/// Unit of one invoice (or trial) interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceInterval {
    Day,
    Week,
    Month,
    Year,
}

impl InvoiceInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceInterval::Day => "day",
            InvoiceInterval::Week => "week",
            InvoiceInterval::Month => "month",
            InvoiceInterval::Year => "year",
        }
    }
}

impl fmt::Display for InvoiceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceInterval {
    type Err = SubscriptionError;

    /// Unknown units are a plan configuration problem, never a silent default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(InvoiceInterval::Day),
            "week" | "weeks" => Ok(InvoiceInterval::Week),
            "month" | "months" => Ok(InvoiceInterval::Month),
            "year" | "years" => Ok(InvoiceInterval::Year),
            other => Err(SubscriptionError::Configuration(format!(
                "unknown invoice interval '{}'",
                other
            ))),
        }
    }
}

/// Subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub plan_id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub invoice_interval: String,
    pub invoice_period: i32,
    pub trial_interval: Option<String>,
    pub trial_period: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Plan {
    /// Parsed billing interval.
    pub fn interval(&self) -> Result<InvoiceInterval, SubscriptionError> {
        self.invoice_interval.parse()
    }

    /// Trial length, or `None` when the plan has no trial.
    pub fn trial(&self) -> Result<Option<(InvoiceInterval, u32)>, SubscriptionError> {
        if self.trial_period <= 0 {
            return Ok(None);
        }
        let interval = match &self.trial_interval {
            Some(raw) => raw.parse()?,
            None => InvoiceInterval::Day,
        };
        Ok(Some((interval, self.trial_period as u32)))
    }
}

/// Input for creating a plan.
#[derive(Debug, Clone, Validate)]
pub struct CreatePlan {
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: String,
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: String,
    pub invoice_interval: InvoiceInterval,
    #[validate(range(min = 1, message = "Invoice period must be at least 1"))]
    pub invoice_period: i32,
    pub trial_interval: Option<InvoiceInterval>,
    #[validate(range(min = 0, message = "Trial period cannot be negative"))]
    pub trial_period: i32,
}
