//! Caller identity.
//!
//! Authentication happens upstream; this service only trusts the user id the
//! gateway forwards and loads the matching profile from the store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderName;
use axum::http::request::Parts;
use common::UserId;
use store::{CommerceStore, User};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves which user made a request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the caller's id, `None` for an anonymous request, or the
    /// reason a present identity cannot be read.
    async fn identify(&self, parts: &Parts) -> Result<Option<UserId>, String>;
}

/// Reads a UUID from a header set by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct ForwardedUserHeader {
    header: HeaderName,
}

impl ForwardedUserHeader {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for ForwardedUserHeader {
    fn default() -> Self {
        Self::new(HeaderName::from_static(USER_ID_HEADER))
    }
}

#[async_trait]
impl IdentityProvider for ForwardedUserHeader {
    async fn identify(&self, parts: &Parts) -> Result<Option<UserId>, String> {
        let Some(value) = parts.headers.get(&self.header) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|_| format!("{} header is not valid UTF-8", self.header))?;
        uuid::Uuid::parse_str(value.trim())
            .map(|id| Some(UserId::from_uuid(id)))
            .map_err(|e| format!("invalid {} header: {e}", self.header))
    }
}

/// Extractor that requires an active, known user.
///
/// Rejects with 401 when the identity is missing or malformed, when no
/// profile exists for it, or when the profile is inactive.
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthenticatedUser
where
    S: CommerceStore + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await? {
            Some(user) => Ok(Self(user)),
            None => {
                metrics::counter!("identity_rejected_total", "reason" => "missing").increment(1);
                Err(ApiError::Unauthorized("authentication required".to_string()))
            }
        }
    }
}

/// Extractor that resolves the user when an identity is present.
///
/// Requests the identity provider reports as anonymous pass through; a
/// present but unusable identity is still rejected.
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<Arc<AppState<S>>> for MaybeUser
where
    S: CommerceStore + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?))
    }
}

/// Loads the active profile behind the request's identity, if it has one.
async fn resolve<S: CommerceStore>(
    parts: &Parts,
    state: &AppState<S>,
) -> Result<Option<User>, ApiError> {
    let user_id = state.identity.identify(parts).await.map_err(|reason| {
        metrics::counter!("identity_rejected_total", "reason" => "malformed").increment(1);
        ApiError::Unauthorized(reason)
    })?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let user = state
        .store
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::Commerce(e.into()))?;

    match user {
        Some(user) if user.is_active => Ok(Some(user)),
        Some(_) => {
            metrics::counter!("identity_rejected_total", "reason" => "inactive").increment(1);
            Err(ApiError::Unauthorized(format!("user {user_id} is inactive")))
        }
        None => {
            metrics::counter!("identity_rejected_total", "reason" => "unknown").increment(1);
            Err(ApiError::Unauthorized(format!("unknown user {user_id}")))
        }
    }
}
