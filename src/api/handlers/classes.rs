use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::state::AppState,
    domain::{ClassSession, ClassStatus, CreateClassRequest, WaitlistEntry},
    error::{AppError, Result},
};

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateClassRequest>,
) -> Result<(StatusCode, Json<ClassSession>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if request.end_time <= request.start_time {
        return Err(AppError::BadRequest(
            "Class must end after it starts".to_string(),
        ));
    }

    let now = Utc::now();
    let class = state
        .service_context
        .class_repo
        .create(ClassSession {
            id: Uuid::new_v4(),
            name: request.name,
            category: request.category,
            location: request.location,
            start_time: request.start_time,
            end_time: request.end_time,
            capacity: request.capacity,
            price_cents: request.price_cents,
            status: ClassStatus::Scheduled,
            created_at: now,
            updated_at: now,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ClassSession>>> {
    let classes = state.service_context.class_repo.list_upcoming(100).await?;
    Ok(Json(classes))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClassSession>> {
    let class = state
        .service_context
        .class_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;
    Ok(Json(class))
}

#[derive(Debug, Deserialize)]
pub struct JoinWaitlistRequest {
    pub customer_id: Uuid,
    #[serde(default)]
    pub auto_book: bool,
    pub package_id: Option<Uuid>,
}

pub async fn join_waitlist(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    Json(request): Json<JoinWaitlistRequest>,
) -> Result<(StatusCode, Json<WaitlistEntry>)> {
    let entry = state
        .service_context
        .waitlist_service
        .join(
            request.customer_id,
            class_id,
            request.auto_book,
            request.package_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateClassStatusRequest {
    pub status: ClassStatus,
}

/// Staff status change (delay, cancel, complete). A completed class is
/// immutable; the repository refuses further changes.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateClassStatusRequest>,
) -> Result<StatusCode> {
    state
        .service_context
        .class_repo
        .update_status(id, request.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin sweep: flips the advisory status on expired packages.
pub async fn expire_packages(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let flipped = state.service_context.ledger.expire_sweep().await?;
    Ok(Json(serde_json::json!({ "expired": flipped })))
}
