use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user, issued by the identity provider.
///
/// Wraps a UUID so user ids cannot be mixed up with the numeric row ids
/// used by catalog, cart and order records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<UserId> for Uuid {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Defines a newtype wrapper around a `BIGSERIAL` row id.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an id from its raw row value.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of a catalog product.
    ProductId
);
row_id!(
    /// Identifier of a shopping cart.
    CartId
);
row_id!(
    /// Identifier of a single line in a cart.
    CartItemId
);
row_id!(
    /// Identifier of a recorded checkout.
    CheckoutId
);
row_id!(
    /// Identifier of a placed order.
    OrderId
);
