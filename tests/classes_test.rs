mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use studiobook::{api::create_app, config::Settings, domain::*, error::AppError};
use tower::ServiceExt;
use uuid::Uuid;

use common::{create_class, grant_package, setup};

fn status_request(class_id: Uuid, status: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/classes/{}/status", class_id))
        .header("content-type", "application/json")
        .body(Body::from(format!("{{\"status\":\"{}\"}}", status)))
        .unwrap()
}

#[tokio::test]
async fn cancelled_class_stops_taking_bookings() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let class = create_class(&test_app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let app = create_app(
        test_app.ctx.clone(),
        None,
        None,
        Arc::new(Settings::default()),
    );

    let response = app
        .oneshot(status_request(class.id, "Cancelled"))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let customer = Uuid::new_v4();
    let package = grant_package(&test_app, customer, 2, "yoga").await?;
    let err = test_app
        .ctx
        .booking_service
        .create(
            customer,
            class.id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // The credit was never touched.
    let after = test_app
        .ctx
        .package_repo
        .find_by_id(package.id)
        .await?
        .unwrap();
    assert_eq!(after.remaining_credits, 2);
    Ok(())
}

#[tokio::test]
async fn completed_class_status_is_immutable() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let class = create_class(&test_app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let app = create_app(
        test_app.ctx.clone(),
        None,
        None,
        Arc::new(Settings::default()),
    );

    let response = app
        .clone()
        .oneshot(status_request(class.id, "Completed"))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // No way back once completed.
    let response = app.oneshot(status_request(class.id, "Scheduled")).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = test_app
        .ctx
        .class_repo
        .find_by_id(class.id)
        .await?
        .unwrap();
    assert_eq!(stored.status, ClassStatus::Completed);
    Ok(())
}
