// handler/admin.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::trustdtos::{
        DecideDocumentDto, LiftSuspensionDto, PageQueryDto, RejectLevelDto, ResolveDisputeDto,
        ResolveReportDto, ResponseRateDto, Response, SettlePayoutDto,
    },
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware, UserRole},
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/documents/:document_id/decision", post(decide_document))
        .route("/accounts/:account_id/levels/:level/reject", post(reject_level))
        .route("/accounts/:account_id/documents", get(list_account_documents))
        .route("/accounts/:account_id/suspension", put(lift_suspension))
        .route("/accounts/:account_id/response-rate", put(record_response_rate))
        .route("/reports/:report_id/resolve", post(resolve_report))
        .route("/escrow/:transaction_id/resolve", post(resolve_dispute))
        .route("/payouts/:payout_id/settle", post(settle_payout))
        .route("/audit/:subject_id", get(get_audit_trail))
        .route("/sweeps/auto-release", post(run_auto_release))
        .route("/sweeps/expiry", post(run_expiry_sweep))
        .layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, vec![UserRole::Admin])
        }))
}

pub async fn decide_document(
    Path(document_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<DecideDocumentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .verification
        .decide_document(document_id, body.decision, admin.user_id, body.reason)
        .await?;

    Ok(Json(Response::success(outcome)))
}

pub async fn reject_level(
    Path((account_id, level)): Path<(Uuid, i16)>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<RejectLevelDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let record = app_state
        .verification
        .reject_level(account_id, level, admin.user_id, body.reason)
        .await?;

    Ok(Json(Response::success(record)))
}

pub async fn list_account_documents(
    Path(account_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let documents = app_state.verification.list_documents(account_id, None).await?;

    Ok(Json(Response::success(documents)))
}

pub async fn lift_suspension(
    Path(account_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<LiftSuspensionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let record = app_state
        .trust
        .lift_suspension(account_id, admin.user_id, body.note)
        .await?;

    Ok(Json(Response::success(record)))
}

pub async fn record_response_rate(
    Path(account_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<ResponseRateDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let record = app_state
        .trust
        .record_response_rate(account_id, body.response_rate)
        .await?;

    Ok(Json(Response::success(record)))
}

pub async fn resolve_report(
    Path(report_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<ResolveReportDto>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state
        .reputation
        .resolve_report(report_id, admin.user_id, body.validated)
        .await?;

    Ok(Json(Response::success(report)))
}

pub async fn resolve_dispute(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<ResolveDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transaction = app_state
        .escrow
        .resolve_dispute(transaction_id, admin.user_id, body.resolution, body.note)
        .await?;

    Ok(Json(Response::success(transaction)))
}

pub async fn settle_payout(
    Path(payout_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
    Json(body): Json<SettlePayoutDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = body.into_outcome().map_err(|e| HttpError::bad_request(e))?;
    let payout = app_state
        .escrow
        .settle_payout(payout_id, outcome, admin.user_id)
        .await?;

    Ok(Json(Response::success(payout)))
}

pub async fn get_audit_trail(
    Path(subject_id): Path<Uuid>,
    Query(query): Query<PageQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let entries = app_state
        .audit
        .get_audit_trail(subject_id, query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;

    Ok(Json(Response::success(entries)))
}

pub async fn run_auto_release(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    tracing::info!("Admin {} triggered the auto-release sweep", admin.user_id);

    let report = app_state.escrow.auto_release().await?;

    Ok(Json(Response::success(report)))
}

pub async fn run_expiry_sweep(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(admin): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    tracing::info!("Admin {} triggered the verification expiry sweep", admin.user_id);

    let report = app_state.verification.expire_stale_submissions().await?;

    Ok(Json(Response::success(report)))
}
