pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use serde::Serialize;

/// Plain acknowledgement body.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
