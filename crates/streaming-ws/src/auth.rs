//! Authentication contract for inbound WebSocket connections.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Identity established from a connection's credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsIdentity {
    /// Whether the credentials were accepted.
    pub is_authenticated: bool,
    /// Claims carried by the credentials.
    pub claims: HashMap<String, String>,
}

impl ClaimsIdentity {
    /// An accepted identity with the given claims.
    #[must_use]
    pub const fn authenticated(claims: HashMap<String, String>) -> Self {
        Self {
            is_authenticated: true,
            claims,
        }
    }

    /// A rejected identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Errors raised while validating credentials, as opposed to rejecting them.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credentials could not be checked.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A credential or channel source was unavailable.
    #[error("Authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// Validates the credentials presented when a WebSocket is opened.
///
/// Implementations own their credential and channel sources.
#[async_trait]
pub trait AuthenticationValidator: Send + Sync + 'static {
    /// Whether connections are accepted without credentials.
    async fn is_authentication_disabled(&self) -> bool;

    /// Validate `token` for the channel `channel_id`.
    async fn validate_auth_header(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<ClaimsIdentity, AuthError>;
}

/// Accepts every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

#[async_trait]
impl AuthenticationValidator for NoAuthentication {
    async fn is_authentication_disabled(&self) -> bool {
        true
    }

    async fn validate_auth_header(
        &self,
        _token: &str,
        _channel_id: &str,
    ) -> Result<ClaimsIdentity, AuthError> {
        Ok(ClaimsIdentity::authenticated(HashMap::new()))
    }
}
