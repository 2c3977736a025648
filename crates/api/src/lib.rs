//! HTTP API server with observability for the storefront backend.
//!
//! Provides REST endpoints for the catalog, carts, checkout and orders,
//! with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .patch(routes::products::update::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route("/cart/show", get(routes::cart::show::<S>))
        .route("/cart/add", post(routes::cart::add::<S>))
        .route("/cart/remove/{item_id}", delete(routes::cart::remove::<S>))
        .route("/cart/summary", get(routes::cart::summary::<S>))
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/orders/create", post(routes::orders::create::<S>))
        .route("/orders/view", post(routes::orders::view::<S>))
        .route("/orders/{order_id}", get(routes::orders::get::<S>))
        .route("/orders/edit/{order_id}", put(routes::orders::edit::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: log mailer, forwarded-header identity.
pub fn create_default_state<S: CommerceStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::with_defaults(store, config))
}
