// handler/escrow.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::trustdtos::{
        CommissionPreviewQuery, CreateEscrowDto, FundEscrowDto, ReasonDto, Response,
    },
    error::{ErrorMessage, HttpError},
    middleware::{role_check, JWTAuthMiddeware, UserRole},
    models::escrowmodels::commission_period,
    service::escrow_service::Actor,
    AppState,
};

pub fn escrow_handler() -> Router {
    let provider_routes = Router::new()
        .route("/payouts", get(list_my_payouts))
        .route("/commission/preview", get(preview_commission))
        .layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, vec![UserRole::Provider])
        }));

    Router::new()
        .route("/", post(create_transaction))
        .route("/:transaction_id", get(get_transaction))
        .route("/:transaction_id/fund", post(fund_transaction))
        .route("/:transaction_id/release", post(release_transaction))
        .route("/:transaction_id/refund", post(refund_transaction))
        .route("/:transaction_id/dispute", post(raise_dispute))
        .merge(provider_routes)
}

pub async fn create_transaction(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    let transaction = app_state
        .escrow
        .create_transaction(body.quote_id, Actor::User(user.user_id))
        .await?;

    Ok(Json(Response::success(transaction)))
}

pub async fn get_transaction(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let transaction = app_state.escrow.get_transaction(transaction_id).await?;

    if !transaction.is_party(user.user_id) && user.role != UserRole::Admin {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(Json(Response::success(transaction)))
}

pub async fn fund_transaction(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<FundEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transaction = app_state
        .escrow
        .fund(transaction_id, body.payment_reference, Actor::User(user.user_id))
        .await?;

    Ok(Json(Response::success(transaction)))
}

pub async fn release_transaction(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let receipt = app_state
        .escrow
        .release(transaction_id, Actor::User(user.user_id))
        .await?;

    Ok(Json(Response::success(receipt)))
}

pub async fn refund_transaction(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transaction = app_state
        .escrow
        .refund(transaction_id, Actor::User(user.user_id), body.reason)
        .await?;

    Ok(Json(Response::success(transaction)))
}

pub async fn raise_dispute(
    Path(transaction_id): Path<Uuid>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
    Json(body): Json<ReasonDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transaction = app_state
        .escrow
        .raise_dispute(transaction_id, user.user_id, body.reason)
        .await?;

    Ok(Json(Response::success(transaction)))
}

pub async fn list_my_payouts(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let payouts = app_state.escrow.list_payouts(user.user_id).await?;

    Ok(Json(Response::success(payouts)))
}

/// Commission the calling provider would pay on a job of this size today.
pub async fn preview_commission(
    Query(query): Query<CommissionPreviewQuery>,
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(user): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let tier = app_state.commission.tier_for(user.user_id).await?;
    let quote = app_state
        .commission
        .resolve(
            query.amount_xaf,
            &query.country_code.to_uppercase(),
            tier,
            user.user_id,
            &commission_period(Utc::now()),
        )
        .await?;

    Ok(Json(Response::success(quote)))
}
