use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use studiobook::{
    domain::*,
    gateways::LoggingInvoiceIssuer,
    notify::{NotificationManager, RecordingSink},
    service::ServiceContext,
};

pub struct TestApp {
    pub ctx: Arc<ServiceContext>,
    pub sink: Arc<RecordingSink>,
}

/// In-memory database on a single-connection pool so concurrent tasks in a
/// test hit the same database.
pub async fn setup() -> anyhow::Result<TestApp> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let sink = RecordingSink::new();
    let notifier = Arc::new(NotificationManager::new());
    notifier.register(sink.clone()).await;

    let ctx = Arc::new(ServiceContext::new(
        pool,
        Arc::new(LoggingInvoiceIssuer),
        notifier,
    ));

    Ok(TestApp { ctx, sink })
}

pub async fn create_class(
    app: &TestApp,
    category: &str,
    location: &str,
    capacity: i32,
    starts_in: Duration,
) -> anyhow::Result<ClassSession> {
    let now = Utc::now();
    let class = app
        .ctx
        .class_repo
        .create(ClassSession {
            id: Uuid::new_v4(),
            name: format!("{} class", category),
            category: category.to_string(),
            location: location.to_string(),
            start_time: now + starts_in,
            end_time: now + starts_in + Duration::hours(1),
            capacity,
            price_cents: 15_000_00,
            status: ClassStatus::Scheduled,
            created_at: now,
            updated_at: now,
        })
        .await?;
    Ok(class)
}

pub async fn create_package_type(
    app: &TestApp,
    credits: i32,
    validity_days: i64,
    category: &str,
) -> anyhow::Result<PackageType> {
    let package_type = app
        .ctx
        .package_type_repo
        .create(PackageType {
            id: Uuid::new_v4(),
            name: format!("{} x{}", category, credits),
            credits,
            validity_days,
            class_category: category.to_string(),
            price_cents: 50_000_00,
            created_at: Utc::now(),
        })
        .await?;
    Ok(package_type)
}

pub async fn grant_package(
    app: &TestApp,
    customer_id: Uuid,
    credits: i32,
    category: &str,
) -> anyhow::Result<Package> {
    let package_type = create_package_type(app, credits, 90, category).await?;
    let package = app
        .ctx
        .ledger
        .grant(customer_id, package_type.id, Utc::now())
        .await?;
    Ok(package)
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
