use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::AppState;

/// Customer-facing order routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(my_orders))
        .route("/{id}", get(get_order))
        .route("/by-number/{number}", get(get_order_by_number))
        .route("/{id}/cancel", post(cancel_order))
}

/// Back-office order routes, role-gated where they are nested.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all_orders))
        .route("/{id}/complete", post(complete_order))
}

#[derive(Debug, Deserialize)]
struct CancelOrderBody {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderListQuery {
    status: Option<String>,
}

async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(user.id).await?;
    Ok(created_response(order))
}

async fn my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.my_orders(user.id).await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(order_id, user.id, user.is_admin())
        .await?;
    Ok(success_response(order))
}

async fn get_order_by_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_number(&number, user.id, user.is_admin())
        .await?;
    Ok(success_response(order))
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    body: Option<Json<CancelOrderBody>>,
) -> Result<impl IntoResponse, ServiceError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let order = state
        .services
        .orders
        .cancel_order(user.id, order_id, reason)
        .await?;
    Ok(success_response(order))
}

async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<OrderStatus>().map_err(ServiceError::ValidationError))
        .transpose()?;
    let orders = state.services.orders.list_all(status).await?;
    Ok(success_response(orders))
}

async fn complete_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.complete_order(order_id).await?;
    Ok(success_response(order))
}
