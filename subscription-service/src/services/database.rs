//! Postgres-backed repositories for subscription-service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::SubscriptionError;
use crate::models::{CancelsAtChange, CreatePlan, Plan, Subscription, SubscriptionPatch};
use crate::services::filters::{push_where, SubscriptionFilter};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{PlanRepository, SubscriptionRecord, SubscriptionRepository};

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, tenant_id, plan_id, slug, starts_at, ends_at, trial_ends_at, cancels_at, created_utc, updated_utc";

const PLAN_COLUMNS: &str = "plan_id, slug, name, description, price, currency, invoice_interval, invoice_period, trial_interval, trial_period, is_active, created_utc, updated_utc";

const PERIOD_CHECK_CONSTRAINT: &str = "plan_subscriptions_period_check";

fn persistence(context: &str, e: sqlx::Error) -> SubscriptionError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.constraint() == Some(PERIOD_CHECK_CONSTRAINT) {
            return SubscriptionError::InvalidPeriod;
        }
    }
    SubscriptionError::Persistence(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "subscription-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, SubscriptionError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| persistence("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), SubscriptionError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SubscriptionError::Persistence(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for Database {
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    async fn find_by_id(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM plan_subscriptions WHERE subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get subscription", e))?;

        timer.observe_duration();

        Ok(subscription)
    }

    #[instrument(skip(self, record), fields(tenant_id = %record.tenant_id, plan_id = %record.plan_id))]
    async fn insert(
        &self,
        record: &SubscriptionRecord,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if !record.has_valid_period() {
            return Err(SubscriptionError::InvalidPeriod);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO plan_subscriptions (subscription_id, tenant_id, plan_id, slug, starts_at, ends_at, trial_ends_at, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(record.tenant_id)
        .bind(record.plan_id)
        .bind(&record.slug)
        .bind(record.starts_at)
        .bind(record.ends_at)
        .bind(record.trial_ends_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| persistence("Failed to create subscription", e))?;

        timer.observe_duration();
        info!(subscription_id = %subscription.subscription_id, slug = %subscription.slug, "Subscription created");

        Ok(subscription)
    }

    /// Single UPDATE statement; Postgres commits all columns or none.
    #[instrument(skip(self, patch), fields(subscription_id = %subscription_id))]
    async fn patch(
        &self,
        subscription_id: Uuid,
        patch: &SubscriptionPatch,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["patch_subscription"])
            .start_timer();

        let (set_cancels_at, cancels_at) = match patch.cancels_at {
            Some(CancelsAtChange::Set(at)) => (true, Some(at)),
            Some(CancelsAtChange::Clear) => (true, None),
            None => (false, None),
        };

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE plan_subscriptions
            SET starts_at = COALESCE($2, starts_at),
                ends_at = COALESCE($3, ends_at),
                cancels_at = CASE WHEN $4 THEN $5 ELSE cancels_at END,
                plan_id = COALESCE($6, plan_id),
                updated_utc = $7
            WHERE subscription_id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .bind(patch.period.map(|p| p.starts_at))
        .bind(patch.period.map(|p| p.ends_at))
        .bind(set_cancels_at)
        .bind(cancels_at)
        .bind(patch.plan_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to update subscription", e))?
        .ok_or(SubscriptionError::SubscriptionNotFound(subscription_id))?;

        timer.observe_duration();

        Ok(subscription)
    }

    #[instrument(skip(self, filters), fields(filters = filters.len()))]
    async fn list(
        &self,
        filters: &[SubscriptionFilter],
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM plan_subscriptions",
            SUBSCRIPTION_COLUMNS
        ));
        push_where(&mut builder, filters, now);
        builder.push(" ORDER BY created_utc, subscription_id");

        let subscriptions = builder
            .build_query_as::<Subscription>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| persistence("Failed to list subscriptions", e))?;

        timer.observe_duration();

        Ok(subscriptions)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }
}

#[async_trait]
impl PlanRepository for Database {
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    async fn find_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM subscription_plans WHERE plan_id = $1",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get plan", e))?;

        timer.observe_duration();

        Ok(plan)
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    async fn insert_plan(
        &self,
        input: &CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<Plan, SubscriptionError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(&format!(
            r#"
            INSERT INTO subscription_plans (plan_id, slug, name, description, price, currency, invoice_interval, invoice_period, trial_interval, trial_period, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.slug)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.currency)
        .bind(input.invoice_interval.as_str())
        .bind(input.invoice_period)
        .bind(input.trial_interval.map(|i| i.as_str()))
        .bind(input.trial_period)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| persistence("Failed to create plan", e))?;

        timer.observe_duration();
        info!(plan_id = %plan.plan_id, name = %plan.name, "Plan created");

        Ok(plan)
    }
}
