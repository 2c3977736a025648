//! Storefront services for the cart, checkout and order flow.
//!
//! This crate provides:
//! - `CartService`, `CheckoutService`, `OrderService` and `CatalogService`
//! - `AccessPolicy` for ownership and role checks
//! - `Notifier` implementations for order confirmations
//! - `CommerceError`, the error taxonomy shared by every service

use std::future::Future;
use std::time::Instant;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod notification;
pub mod order;
pub mod policy;

pub use cart::{CartService, CartSummary};
pub use catalog::{CatalogService, DEFAULT_PAGE_SIZE};
pub use checkout::{CheckoutDetails, CheckoutService};
pub use error::CommerceError;
pub use notification::{
    BackgroundNotifier, LogMailer, Mailer, NotificationError, Notifier, OrderConfirmation,
    RecordingNotifier,
};
pub use order::OrderService;
pub use policy::{AccessPolicy, Resource};

/// Awaits a store write and records how long it took.
pub(crate) async fn timed<T>(operation: &'static str, fut: impl Future<Output = T>) -> T {
    let started = Instant::now();
    let output = fut.await;
    metrics::histogram!("store_operation_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    output
}
