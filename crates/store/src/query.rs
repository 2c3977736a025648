use crate::UserId;

/// Filter for listing orders.
///
/// An empty query matches every order. Results are always ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Only orders placed by this user.
    pub user_id: Option<UserId>,

    /// Only orders whose `shipped` flag equals this value.
    pub shipped: Option<bool>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for orders placed by a user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Creates a query for orders still waiting to ship.
    pub fn unshipped() -> Self {
        Self {
            shipped: Some(false),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, user_id: UserId, shipped: bool) -> bool {
        self.user_id.is_none_or(|id| id == user_id) && self.shipped.is_none_or(|s| s == shipped)
    }
}
