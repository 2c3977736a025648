//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use common::{CartId, CartItemId, ProductId};
use domain::CartSummary;
use serde::{Deserialize, Serialize};
use store::{Cart, CartItem, CommerceStore};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_ids: Vec<ProductId>,
    pub quantities: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub cart_id: CartId,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub cart_id: CartId,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartUpdatedResponse {
    pub message: String,
    pub cart: Cart,
}

#[derive(Serialize)]
pub struct ItemRemovedResponse {
    pub message: String,
    pub item: CartItem,
}

// -- Handlers --

/// GET /cart/show: the caller's open cart.
#[tracing::instrument(skip(state, user))]
pub async fn show<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Cart>, ApiError> {
    let cart = state.carts.show(&user).await?;
    Ok(Json(cart))
}

/// POST /cart/add: parallel `product_ids` and `quantities`.
#[tracing::instrument(skip(state, user, body))]
pub async fn add<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<CartUpdatedResponse>, ApiError> {
    let Json(req) = body?;
    let cart = state
        .carts
        .add(&user, &req.product_ids, &req.quantities)
        .await?;

    Ok(Json(CartUpdatedResponse {
        message: "Items added to cart".to_string(),
        cart,
    }))
}

/// DELETE /cart/remove/{item_id}
#[tracing::instrument(skip(state, user, body))]
pub async fn remove<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    item_id: Result<Path<CartItemId>, PathRejection>,
    body: Result<Json<RemoveFromCartRequest>, JsonRejection>,
) -> Result<Json<ItemRemovedResponse>, ApiError> {
    let Path(item_id) = item_id?;
    let Json(req) = body?;
    let item = state.carts.remove(&user, req.cart_id, item_id).await?;

    Ok(Json(ItemRemovedResponse {
        message: format!("Item {item_id} removed from cart {}", req.cart_id),
        item,
    }))
}

/// GET /cart/summary?cart_id=
#[tracing::instrument(skip(state, user))]
pub async fn summary<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> Result<Json<CartSummary>, ApiError> {
    let Query(params) = params?;
    let summary = state.carts.summary(&user, params.cart_id).await?;
    Ok(Json(summary))
}
