//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartId, Money, OrderId};
use domain::CommerceError;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, Order, OrderPatch};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: CartId,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub message: String,
    pub order_id: OrderId,
    pub total: Money,
}

// -- Handlers --

/// POST /orders/create: turns the caller's cart into an order.
#[tracing::instrument(skip(state, user, body))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = body?;
    let order = state.orders.create(&user, req.cart_id).await?;
    let total = order.total().map_err(CommerceError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            message: "Order created".to_string(),
            order_id: order.id,
            total,
        }),
    ))
}

/// POST /orders/view: own orders, or the unshipped queue for superusers.
#[tracing::instrument(skip(state, user))]
pub async fn view<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.orders.view(&user).await?;
    Ok(Json(orders))
}

/// GET /orders/{order_id}
#[tracing::instrument(skip(state, user))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(order_id) = order_id?;
    let order = state.orders.get(&user, order_id).await?;
    Ok(Json(order))
}

/// PUT /orders/edit/{order_id}: superuser only.
#[tracing::instrument(skip(state, user, body))]
pub async fn edit<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    order_id: Result<Path<OrderId>, PathRejection>,
    body: Result<Json<OrderPatch>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(order_id) = order_id?;
    let Json(patch) = body?;
    let order = state.orders.edit(order_id, patch, &user).await?;
    Ok(Json(order))
}
