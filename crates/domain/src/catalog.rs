//! Product catalog reads and administration.

use common::{Money, ProductId};
use store::{CommerceStore, NewProduct, Product, ProductPatch, User, validate_product_fields};

use crate::CommerceError;
use crate::policy::{AccessPolicy, Resource};

/// Default number of products returned by a listing.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Service for the product catalog.
///
/// Anyone may browse visible products; writes need a superuser.
pub struct CatalogService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_visible(&self, limit: usize) -> Result<Vec<Product>, CommerceError> {
        Ok(self.store.list_visible_products(limit).await?)
    }

    /// Loads a product. Hidden products are only returned to superusers.
    #[tracing::instrument(skip(self, user))]
    pub async fn get(
        &self,
        user: Option<&User>,
        product_id: ProductId,
    ) -> Result<Product, CommerceError> {
        let can_see_hidden = user.is_some_and(|u| AccessPolicy::permits(u, Resource::Catalog));
        self.store
            .get_product(product_id)
            .await?
            .filter(|p| p.is_visible || can_see_hidden)
            .ok_or_else(|| CommerceError::not_found("Product", product_id))
    }

    #[tracing::instrument(skip(self, user, product), fields(user_id = %user.id))]
    pub async fn create(&self, user: &User, product: NewProduct) -> Result<Product, CommerceError> {
        AccessPolicy::authorize(user, Resource::Catalog)?;
        validate_fields(
            Some(product.title.as_str()),
            Some(product.quantity),
            Some(product.price),
        )?;

        let product = self.store.insert_product(product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, user, patch), fields(user_id = %user.id))]
    pub async fn update(
        &self,
        user: &User,
        product_id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, CommerceError> {
        AccessPolicy::authorize(user, Resource::Catalog)?;
        validate_fields(patch.title.as_deref(), patch.quantity, patch.price)?;

        Ok(self.store.update_product(product_id, patch).await?)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn delete(&self, user: &User, product_id: ProductId) -> Result<(), CommerceError> {
        AccessPolicy::authorize(user, Resource::Catalog)?;

        self.store.delete_product(product_id).await?;
        tracing::info!(%product_id, "product deleted");
        Ok(())
    }
}

fn validate_fields(
    title: Option<&str>,
    quantity: Option<u32>,
    price: Option<Money>,
) -> Result<(), CommerceError> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(CommerceError::validation("title must not be empty"));
    }
    validate_product_fields(quantity, price)?;
    Ok(())
}
