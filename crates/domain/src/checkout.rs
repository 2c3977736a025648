//! Checkout snapshots.

use common::{CartId, Money};
use serde::{Deserialize, Serialize};
use store::{Checkout, CommerceStore, NewCheckout, User, validate_amount};

use crate::policy::{AccessPolicy, Resource};
use crate::{CommerceError, timed};

/// Contact and shipping details submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDetails {
    pub amount: Money,
    pub email: String,
    pub name: String,
    pub phone_no: String,
    pub address: String,
    pub postal_code: String,
}

impl CheckoutDetails {
    fn validate(&self) -> Result<(), CommerceError> {
        validate_amount("amount", self.amount)?;

        let required = [
            ("email", &self.email),
            ("name", &self.name),
            ("phone_no", &self.phone_no),
            ("address", &self.address),
            ("postal_code", &self.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CommerceError::validation(format!("{field} is required")));
            }
        }

        Ok(())
    }
}

/// Records checkout details against a user's cart.
///
/// No payment is taken here.
pub struct CheckoutService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CheckoutService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, user, details), fields(user_id = %user.id))]
    pub async fn create(
        &self,
        user: &User,
        cart_id: CartId,
        details: CheckoutDetails,
    ) -> Result<Checkout, CommerceError> {
        details.validate()?;

        let cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("Cart", cart_id))?;
        AccessPolicy::authorize(user, Resource::Cart { owner: cart.user_id })?;
        if !cart.is_open() {
            return Err(CommerceError::CartClosed(cart_id));
        }

        let checkout = NewCheckout {
            user_id: user.id,
            cart_id,
            amount: details.amount,
            email: details.email,
            name: details.name,
            phone_no: details.phone_no,
            address: details.address,
            postal_code: details.postal_code,
        };
        let checkout = timed("insert_checkout", self.store.insert_checkout(checkout)).await?;

        tracing::info!(checkout_id = %checkout.id, %cart_id, "checkout recorded");
        Ok(checkout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            amount: Money::from_cents(2000),
            email: "buyer@example.com".to_string(),
            name: "Buyer".to_string(),
            phone_no: "555-0100".to_string(),
            address: "1 Main Street".to_string(),
            postal_code: "10001".to_string(),
        }
    }

    #[test]
    fn complete_details_pass() {
        assert!(details().validate().is_ok());
    }

    #[test]
    fn negative_amount_is_rejected() {
        let details = CheckoutDetails {
            amount: Money::from_cents(-1),
            ..details()
        };
        assert!(matches!(details.validate(), Err(CommerceError::Validation(_))));
    }

    #[test]
    fn blank_fields_are_rejected() {
        let details = CheckoutDetails {
            postal_code: "  ".to_string(),
            ..details()
        };
        let err = details.validate().unwrap_err();
        assert!(err.to_string().contains("postal_code"));
    }
}
