//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use common::{CartId, CheckoutId};
use domain::CheckoutDetails;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub cart_id: CartId,
    #[serde(flatten)]
    pub details: CheckoutDetails,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub message: String,
    pub checkout_id: CheckoutId,
}

/// POST /checkout: records contact and shipping details for a cart.
#[tracing::instrument(skip(state, user, body))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let Json(req) = body?;
    let checkout = state
        .checkouts
        .create(&user, req.cart_id, req.details)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            message: "Checkout recorded".to_string(),
            checkout_id: checkout.id,
        }),
    ))
}
