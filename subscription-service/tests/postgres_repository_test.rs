//! PostgreSQL repository integration tests for subscription-service.
//!
//! Run with `cargo test -- --ignored` against `TEST_DATABASE_URL`.

mod common;

use chrono::{DateTime, Utc};
use common::{at, create_plan_input, tenant_id, TestApp};
use subscription_service::error::SubscriptionError;
use subscription_service::models::{
    BillingPeriod, InvoiceInterval, NewSubscription, Plan, SubscriptionPatch,
};
use subscription_service::services::filters::matches_all;
use subscription_service::services::{
    PlanRepository, SubscriptionFilter, SubscriptionRecord, SubscriptionRepository,
};
use uuid::Uuid;

async fn monthly_plan(app: &TestApp, slug: &str) -> Plan {
    app.service
        .create_plan(create_plan_input(slug, 0), at(2024, 1, 1))
        .await
        .expect("Failed to create plan")
}

fn record(
    plan_id: Uuid,
    slug: &str,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    trial_ends_at: Option<DateTime<Utc>>,
) -> SubscriptionRecord {
    SubscriptionRecord {
        tenant_id: tenant_id(),
        plan_id,
        slug: slug.to_string(),
        starts_at: Some(starts_at),
        ends_at,
        trial_ends_at,
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn migrations_apply_and_store_is_healthy() {
    let app = TestApp::spawn().await;

    assert!(app.port > 0);
    app.db.health_check().await.expect("health check failed");
    let rows = app.db.list(&[], at(2024, 1, 1)).await.unwrap();
    assert!(rows.is_empty());

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn cancel_and_renew_round_trip() {
    let app = TestApp::spawn().await;
    let monthly = app
        .service
        .create_plan(create_plan_input("monthly", 7), at(2024, 1, 1))
        .await
        .unwrap();
    let mut yearly_input = create_plan_input("yearly", 0);
    yearly_input.invoice_interval = InvoiceInterval::Year;
    let yearly = app
        .service
        .create_plan(yearly_input, at(2024, 1, 1))
        .await
        .unwrap();

    let sub = app
        .service
        .subscribe(
            NewSubscription {
                tenant_id: tenant_id(),
                plan_id: monthly.plan_id,
                slug: "main".to_string(),
                starts_at: None,
            },
            at(2024, 1, 31),
        )
        .await
        .unwrap();
    assert_eq!(sub.ends_at, Some(at(2024, 2, 29)));
    assert_eq!(sub.trial_ends_at, Some(at(2024, 2, 7)));
    assert_eq!(
        app.db.find_by_id(sub.subscription_id).await.unwrap(),
        Some(sub.clone())
    );

    let canceled = app
        .service
        .cancel(sub.subscription_id, None, at(2024, 2, 10))
        .await
        .unwrap();
    assert_eq!(canceled.cancels_at, Some(at(2024, 2, 29)));
    assert_eq!(canceled.starts_at, sub.starts_at);
    assert_eq!(canceled.ends_at, sub.ends_at);

    // A patch without a cancellation change keeps the stored value.
    let untouched = app
        .db
        .patch(sub.subscription_id, &SubscriptionPatch::default(), at(2024, 2, 11))
        .await
        .unwrap();
    assert_eq!(untouched.cancels_at, Some(at(2024, 2, 29)));
    assert_eq!(untouched.updated_utc, at(2024, 2, 11));

    let renewed = app
        .service
        .renew_by_id(sub.subscription_id, yearly.plan_id, at(2024, 2, 29))
        .await
        .unwrap();
    assert_eq!(renewed.starts_at, Some(at(2024, 2, 29)));
    assert_eq!(renewed.ends_at, Some(at(2025, 2, 28)));
    assert_eq!(renewed.cancels_at, None);
    assert_eq!(renewed.plan_id, yearly.plan_id);
    assert_eq!(renewed.trial_ends_at, sub.trial_ends_at);
    assert_eq!(
        app.db.find_by_id(sub.subscription_id).await.unwrap(),
        Some(renewed)
    );

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn list_sql_agrees_with_in_memory_predicates() {
    let app = TestApp::spawn().await;
    let plan = monthly_plan(&app, "basic").await;
    let now = at(2024, 6, 1);
    let created = at(2024, 1, 1);

    let rows = [
        record(plan.plan_id, "current", at(2024, 5, 1), Some(at(2024, 7, 1)), None),
        record(
            plan.plan_id,
            "expired",
            at(2024, 4, 1),
            Some(at(2024, 5, 1)),
            Some(at(2024, 4, 10)),
        ),
        record(
            plan.plan_id,
            "trial-only",
            at(2024, 4, 1),
            Some(at(2024, 5, 1)),
            Some(at(2024, 6, 15)),
        ),
        record(plan.plan_id, "open", at(2024, 1, 1), None, None),
        record(plan.plan_id, "boundary", at(2024, 5, 1), Some(now), Some(now)),
        record(plan.plan_id, "pending", at(2024, 5, 1), Some(at(2024, 6, 30)), None),
    ];
    for row in &rows {
        app.db.insert(row, created).await.unwrap();
    }
    let mut other_tenant = record(plan.plan_id, "current", at(2024, 5, 1), None, None);
    other_tenant.tenant_id = Uuid::new_v4();
    let other = app.db.insert(&other_tenant, created).await.unwrap();

    let pending = app
        .db
        .list(&[SubscriptionFilter::Slug("pending".to_string())], now)
        .await
        .unwrap();
    app.service
        .cancel(pending[0].subscription_id, None, now)
        .await
        .unwrap();

    let all = app.db.list(&[], now).await.unwrap();
    assert_eq!(all.len(), 7);

    let cases = vec![
        vec![SubscriptionFilter::Active],
        vec![SubscriptionFilter::Inactive],
        vec![SubscriptionFilter::EndedPeriod],
        vec![SubscriptionFilter::EndedTrial],
        vec![SubscriptionFilter::CancelPending],
        vec![SubscriptionFilter::Slug("current".to_string())],
        vec![SubscriptionFilter::Tenant(other.tenant_id)],
        vec![SubscriptionFilter::Plan(plan.plan_id)],
        vec![SubscriptionFilter::Active, SubscriptionFilter::CancelPending],
        vec![SubscriptionFilter::Inactive, SubscriptionFilter::EndedTrial],
        vec![SubscriptionFilter::Active, SubscriptionFilter::EndedPeriod],
    ];

    for filters in &cases {
        let mut from_sql: Vec<Uuid> = app
            .db
            .list(filters, now)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.subscription_id)
            .collect();
        let mut expected: Vec<Uuid> = all
            .iter()
            .filter(|s| matches_all(filters, s, now))
            .map(|s| s.subscription_id)
            .collect();
        from_sql.sort();
        expected.sort();
        assert_eq!(from_sql, expected, "filters {:?}", filters);
    }

    let slugs_for = |filters: &[SubscriptionFilter]| {
        let mut slugs: Vec<String> = all
            .iter()
            .filter(|s| s.tenant_id == tenant_id() && matches_all(filters, s, now))
            .map(|s| s.slug.clone())
            .collect();
        slugs.sort();
        slugs
    };
    assert_eq!(
        slugs_for(&[SubscriptionFilter::Active]),
        vec!["boundary", "current", "open", "pending", "trial-only"]
    );
    assert_eq!(
        slugs_for(&[SubscriptionFilter::EndedTrial]),
        vec!["boundary", "expired"]
    );

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn period_check_violation_is_invalid_period() {
    let app = TestApp::spawn().await;
    let plan = monthly_plan(&app, "basic").await;
    let sub = app
        .db
        .insert(
            &record(plan.plan_id, "main", at(2024, 1, 1), Some(at(2024, 2, 1)), None),
            at(2024, 1, 1),
        )
        .await
        .unwrap();

    let backwards = SubscriptionPatch {
        period: Some(BillingPeriod {
            starts_at: at(2024, 3, 1),
            ends_at: at(2024, 2, 1),
        }),
        ..Default::default()
    };
    let result = app
        .db
        .patch(sub.subscription_id, &backwards, at(2024, 1, 15))
        .await;

    assert!(matches!(result, Err(SubscriptionError::InvalidPeriod)));
    assert_eq!(
        app.db.find_by_id(sub.subscription_id).await.unwrap(),
        Some(sub)
    );

    let result = app
        .db
        .insert(
            &record(plan.plan_id, "other", at(2024, 2, 1), Some(at(2024, 1, 1)), None),
            at(2024, 1, 1),
        )
        .await;
    assert!(matches!(result, Err(SubscriptionError::InvalidPeriod)));

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn uniqueness_and_missing_rows() {
    let app = TestApp::spawn().await;
    let plan = monthly_plan(&app, "basic").await;
    let now = at(2024, 1, 1);

    let duplicate_plan = app.db.insert_plan(&create_plan_input("basic", 0), now).await;
    assert!(matches!(duplicate_plan, Err(SubscriptionError::Persistence(_))));

    let row = record(plan.plan_id, "main", now, Some(at(2024, 2, 1)), None);
    app.db.insert(&row, now).await.unwrap();
    let duplicate = app.db.insert(&row, now).await;
    assert!(matches!(duplicate, Err(SubscriptionError::Persistence(_))));

    let missing = Uuid::new_v4();
    assert_eq!(app.db.find_by_id(missing).await.unwrap(), None);
    assert!(app.db.find_plan(missing).await.unwrap().is_none());
    let result = app
        .db
        .patch(missing, &SubscriptionPatch::cancellation(now), now)
        .await;
    assert!(matches!(result, Err(SubscriptionError::SubscriptionNotFound(id)) if id == missing));

    app.cleanup().await;
}
