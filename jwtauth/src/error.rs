//! Errors surfaced to callers of the token and session APIs.
//!
//! Attacker-controlled input never produces one of these: forged, tampered,
//! expired or revoked tokens only flip the `is_valid`/`expired`/`blacklisted`
//! answers. An `AuthError` means either a caller broke a contract (asked an
//! invalid token a question that only a sound token can answer) or an
//! infrastructure collaborator failed.

use crate::store::StoreError;

/// Error returned by token operations and the session engine.
#[derive(Debug)]
pub enum AuthError {
    /// An operation that needs a structurally valid token was called on an invalid
    /// one. Indicates a caller bug, never hostile input.
    InvalidState {
        /// What the caller tried to do, e.g. "saved" or "tested for expiration".
        operation: &'static str,
    },
    /// A login was requested for a request that is already authenticated.
    AlreadyAuthenticated,
    /// Signing a token failed.
    Signing(String),
    /// No unused refresh token string was found within the retry budget.
    TokenStringExhausted {
        /// How many candidates were tried.
        attempts: usize,
    },
    /// The revocation store failed.
    Store(StoreError),
}

impl AuthError {
    pub(crate) const fn invalid_state(operation: &'static str) -> Self {
        Self::InvalidState { operation }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { operation } => {
                write!(f, "an invalid token cannot be {operation}")
            }
            Self::AlreadyAuthenticated => write!(f, "user is already logged in"),
            Self::Signing(reason) => write!(f, "failed to sign token: {reason}"),
            Self::TokenStringExhausted { attempts } => write!(
                f,
                "no unused refresh token string found after {attempts} attempts"
            ),
            Self::Store(e) => write!(f, "revocation store error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::InvalidState { .. }
            | Self::AlreadyAuthenticated
            | Self::Signing(_)
            | Self::TokenStringExhausted { .. } => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
