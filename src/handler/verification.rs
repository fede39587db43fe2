// handler/verification.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::trustdtos::{Response, SubmitDocumentDto},
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware, UserRole},
    service::trust_service::public_trust_score,
    AppState,
};

pub fn verification_handler() -> Router {
    Router::new()
        .route("/status", get(get_my_record))
        .route("/eligibility", get(get_eligibility))
        .route(
            "/documents",
            get(list_my_documents).post(submit_document).layer(middleware::from_fn(
                |state, req, next| {
                    role_check(state, req, next, vec![UserRole::Seeker, UserRole::Provider])
                },
            )),
        )
        .route("/trust/:account_id", get(get_public_trust_score))
}

#[derive(Debug, Deserialize, Validate)]
pub struct DocumentsQuery {
    #[validate(range(min = 1, max = 4))]
    pub level: Option<i16>,
}

pub async fn get_my_record(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let record = app_state.verification.get_record(user.user_id).await?;

    Ok(Json(Response::success(record)))
}

pub async fn get_eligibility(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let account_kind = user.account_kind()?;

    let levels = app_state
        .verification
        .check_eligibility(user.user_id, account_kind)
        .await?;

    Ok(Json(Response::success(levels)))
}

pub async fn list_my_documents(
    Query(query): Query<DocumentsQuery>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let documents = app_state
        .verification
        .list_documents(user.user_id, query.level)
        .await?;

    Ok(Json(Response::success(documents)))
}

pub async fn submit_document(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<SubmitDocumentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let account_kind = user.account_kind()?;
    let submission = body.into_submission().map_err(|e| HttpError::bad_request(e))?;

    let document = app_state
        .verification
        .submit_document(user.user_id, account_kind, submission)
        .await?;

    Ok(Json(Response::success(document)))
}

pub async fn get_public_trust_score(
    Path(account_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let record = app_state.trust.get_record(account_id).await?;

    let score = public_trust_score(&record)
        .ok_or_else(|| HttpError::not_found("No public trust score for this account"))?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "account_id": account_id,
            "trust_score": score,
            "verification_level": record.highest_approved_level(),
            "is_suspended": record.is_suspended,
        }
    })))
}
