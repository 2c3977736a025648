//! Role and ownership checks.

use common::UserId;
use store::{OrderQuery, User};

use crate::CommerceError;

/// Something an actor wants to read or change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A cart and its items.
    Cart { owner: UserId },
    /// A single placed order.
    Order { owner: UserId },
    /// The order listing.
    OrderList,
    /// Shipping and payment flags on any order.
    OrderFulfillment,
    /// Catalog writes.
    Catalog,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Cart { .. } => write!(f, "cart belongs to another user"),
            Resource::Order { .. } => write!(f, "order belongs to another user"),
            Resource::OrderList => write!(f, "order listing"),
            Resource::OrderFulfillment => write!(f, "only administrators can edit orders"),
            Resource::Catalog => write!(f, "only administrators can change the catalog"),
        }
    }
}

/// Single place where role branching lives.
///
/// Carts are owner-only, even for superusers. Orders are readable by their
/// owner and by superusers. Fulfillment and catalog writes need a superuser.
pub struct AccessPolicy;

impl AccessPolicy {
    /// Returns true if `actor` may access `resource`.
    pub fn permits(actor: &User, resource: Resource) -> bool {
        if !actor.is_active {
            return false;
        }
        match resource {
            Resource::Cart { owner } => actor.id == owner,
            Resource::Order { owner } => actor.id == owner || actor.is_superuser,
            Resource::OrderList => true,
            Resource::OrderFulfillment | Resource::Catalog => actor.is_superuser,
        }
    }

    /// Like [`permits`](Self::permits), but returns `Forbidden` on denial.
    pub fn authorize(actor: &User, resource: Resource) -> Result<(), CommerceError> {
        if Self::permits(actor, resource) {
            Ok(())
        } else {
            tracing::debug!(user_id = %actor.id, ?resource, "access denied");
            Err(CommerceError::Forbidden(resource.to_string()))
        }
    }

    /// Orders an actor sees when listing: the open fulfillment queue for
    /// superusers, their own history for everyone else.
    pub fn order_scope(actor: &User) -> OrderQuery {
        if actor.is_superuser {
            OrderQuery::unshipped()
        } else {
            OrderQuery::for_user(actor.id)
        }
    }
}
