use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{Booking, FundingChoice},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Supplied by the auth collaborator upstream of this service.
    pub customer_id: Uuid,
    pub class_id: Uuid,
    #[serde(flatten)]
    pub funding: FundingChoice,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub new_class_id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>)> {
    let booking = state
        .service_context
        .booking_service
        .create(request.customer_id, request.class_id, request.funding)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>> {
    let booking = state
        .service_context
        .booking_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound("Booking not found".to_string()))?;
    Ok(Json(booking))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Booking>> {
    let outcome = state
        .service_context
        .booking_service
        .cancel(id, &request.reason)
        .await?;

    if let Some(class_id) = outcome.seat_freed {
        state
            .service_context
            .waitlist_service
            .promote_next(class_id)
            .await?;
    }

    Ok(Json(outcome.booking))
}

pub async fn reschedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Booking>> {
    let booking = state
        .service_context
        .booking_service
        .reschedule(id, request.new_class_id)
        .await?;
    Ok(Json(booking))
}

pub async fn no_show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let seat_freed = state
        .service_context
        .booking_service
        .mark_no_show(id)
        .await?;

    if let Some(class_id) = seat_freed {
        state
            .service_context
            .waitlist_service
            .promote_next(class_id)
            .await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.service_context.booking_service.complete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
