//! Shared application state.

use std::sync::Arc;

use domain::{
    BackgroundNotifier, CartService, CatalogService, CheckoutService, LogMailer, Notifier,
    OrderService,
};
use store::CommerceStore;

use crate::auth::{ForwardedUserHeader, IdentityProvider};
use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub carts: CartService<S>,
    pub checkouts: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub store: S,
    pub identity: Arc<dyn IdentityProvider>,
    pub product_page_size: usize,
}

impl<S: CommerceStore + Clone> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(
        store: S,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityProvider>,
        product_page_size: usize,
    ) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkouts: CheckoutService::new(store.clone()),
            orders: OrderService::new(store.clone(), notifier),
            catalog: CatalogService::new(store.clone()),
            store,
            identity,
            product_page_size,
        }
    }

    /// State with the log mailer and the forwarded `x-user-id` header.
    pub fn with_defaults(store: S, config: &Config) -> Self {
        Self::new(
            store,
            Arc::new(BackgroundNotifier::new(LogMailer)),
            Arc::new(ForwardedUserHeader::default()),
            config.product_page_size,
        )
    }
}
