use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::services::carts::{AddItemInput, UpdateQuantityInput};
use crate::AppState;

/// The caller's own cart. All routes require authentication; the cart is
/// addressed implicitly by the verified identity.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{id}", put(update_item))
        .route("/items/{id}", delete(remove_item))
}

/// Back-office read of an arbitrary customer's cart.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/{user_id}", get(get_user_cart))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(user.id).await?;
    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<AddItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.add_item(user.id, input).await?;
    Ok(success_response(cart))
}

async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateQuantityInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(user.id, item_id, input)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.remove_item(user.id, item_id).await?;
    Ok(success_response(cart))
}

async fn get_user_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(user_id).await?;
    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.clear_cart(user.id).await?;
    Ok(success_response(cart))
}
