//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use store::{CommerceStore, NewProduct, Product, ProductPatch};

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::error::ApiError;
use crate::routes::MessageResponse;
use crate::state::AppState;

/// GET /products: visible products, one page.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state.catalog.list_visible(state.product_page_size).await?;
    Ok(Json(products))
}

/// GET /products/{id}
#[tracing::instrument(skip(state, user))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeUser(user): MaybeUser,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(product_id) = id?;
    let product = state.catalog.get(user.as_ref(), product_id).await?;
    Ok(Json(product))
}

/// POST /products: superuser only.
#[tracing::instrument(skip(state, user, body))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(product) = body?;
    let product = state.catalog.create(&user, product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /products/{id}: superuser only.
#[tracing::instrument(skip(state, user, body))]
pub async fn update<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    id: Result<Path<ProductId>, PathRejection>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(product_id) = id?;
    let Json(patch) = body?;
    let product = state.catalog.update(&user, product_id, patch).await?;
    Ok(Json(product))
}

/// DELETE /products/{id}: superuser only.
#[tracing::instrument(skip(state, user))]
pub async fn delete<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user): AuthenticatedUser,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(product_id) = id?;
    state.catalog.delete(&user, product_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Product {product_id} deleted"
    ))))
}
