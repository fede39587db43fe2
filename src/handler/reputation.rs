// handler/reputation.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::trustdtos::{CastVoteDto, FileReportDto, PageQueryDto, Response},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn reputation_handler() -> Router {
    Router::new()
        .route("/votes", post(cast_vote))
        .route("/reports", post(file_report))
        .route("/:account_id", get(get_reputation))
        .route("/notifications", get(get_notifications))
}

pub async fn cast_vote(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CastVoteDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .reputation
        .cast_vote(
            user.user_id,
            body.target_user_id,
            body.vote_type,
            body.context,
            body.context_id,
        )
        .await?;

    Ok(Json(Response::success(outcome)))
}

pub async fn file_report(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<FileReportDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let report = app_state
        .reputation
        .file_report(user.user_id, body.target_user_id, body.reason)
        .await?;

    Ok(Json(Response::success(report)))
}

pub async fn get_reputation(
    Path(account_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state.reputation.get_stats(account_id).await?;

    Ok(Json(Response::success(summary)))
}

pub async fn get_notifications(
    Query(query): Query<PageQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let notifications = app_state
        .notifications
        .get_user_notifications(user.user_id, query.limit.unwrap_or(20))
        .await?;

    Ok(Json(Response::success(notifications)))
}
