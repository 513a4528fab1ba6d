mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use serde_json::Value;
use studiobook::{
    api::create_app,
    config::Settings,
    domain::*,
    gateways::{PaymentGateway, XenditGateway},
};
use tower::ServiceExt;
use uuid::Uuid;

use common::{create_class, setup, TestApp};

const TOKEN: &str = "cb-token";

fn app_with_xendit(test_app: &TestApp) -> axum::Router {
    let xendit: Arc<dyn PaymentGateway> = Arc::new(XenditGateway::new(TOKEN.to_string()));
    create_app(
        test_app.ctx.clone(),
        None,
        Some(xendit),
        Arc::new(Settings::default()),
    )
}

fn xendit_request(body: String, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/xendit")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-callback-token", token);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn paid_invoice_confirms_the_booking_over_http() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&test_app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = test_app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;
    let app = app_with_xendit(&test_app);

    let body = serde_json::json!({
        "id": "inv-http-1",
        "external_id": format!("cls|{}|{}", customer, booking.id),
        "status": "PAID",
        "amount": 150000,
        "paid_at": "2026-08-20T03:00:00.000Z",
    })
    .to_string();

    let response = app.oneshot(xendit_request(body, Some(TOKEN))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let after = test_app
        .ctx
        .booking_repo
        .find_by_id(booking.id)
        .await?
        .unwrap();
    assert_eq!(after.status, BookingStatus::Confirmed);
    assert_eq!(after.payment_status, PaymentStatus::Paid);
    Ok(())
}

#[tokio::test]
async fn bad_token_gets_401_and_touches_nothing() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&test_app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = test_app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;
    let app = app_with_xendit(&test_app);

    let body = serde_json::json!({
        "id": "inv-http-2",
        "external_id": format!("cls|{}|{}", customer, booking.id),
        "status": "PAID",
        "amount": 150000,
    })
    .to_string();

    let response = app
        .oneshot(xendit_request(body, Some("wrong-token")))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let after = test_app
        .ctx
        .booking_repo
        .find_by_id(booking.id)
        .await?
        .unwrap();
    assert_eq!(after.status, BookingStatus::PendingPayment);
    Ok(())
}

#[tokio::test]
async fn undecodable_reference_is_acknowledged_as_ignored() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let app = app_with_xendit(&test_app);

    let body = serde_json::json!({
        "id": "inv-http-3",
        "external_id": "legacy-reference-941",
        "status": "PAID",
        "amount": 150000,
    })
    .to_string();

    let response = app.oneshot(xendit_request(body, Some(TOKEN))).await?;
    // 200, not 4xx: the token was right, so retrying will never help.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ignored");
    Ok(())
}

#[tokio::test]
async fn unparseable_body_is_a_bad_request() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let app = app_with_xendit(&test_app);

    let response = app
        .oneshot(xendit_request("not json at all".to_string(), Some(TOKEN)))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unrecognized_gateway_status_is_rejected() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&test_app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = test_app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;
    let app = app_with_xendit(&test_app);

    let body = serde_json::json!({
        "id": "inv-http-4",
        "external_id": format!("cls|{}|{}", customer, booking.id),
        "status": "REFUNDED",
        "amount": 150000,
    })
    .to_string();

    let response = app.oneshot(xendit_request(body, Some(TOKEN))).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn disabled_gateway_returns_503() -> anyhow::Result<()> {
    let test_app = setup().await?;
    let app = create_app(test_app.ctx.clone(), None, None, Arc::new(Settings::default()));

    let response = app
        .oneshot(xendit_request("{}".to_string(), Some(TOKEN)))
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
