//! Short-lived, stateless access tokens.

use std::fmt;
use std::time::Duration;

use serde_json::Map;

use crate::clock::TimeSource;
use crate::directory::{Identity, UserDirectory, UserId};
use crate::error::AuthError;
use crate::token::codec::Signer;
use crate::token::user::{Rejection, UserToken};

/// An access token. Nothing about it is stored server-side.
#[derive(Debug, Clone)]
pub struct AccessToken<U> {
    inner: UserToken<U>,
}

impl<U: Identity + Clone> AccessToken<U> {
    /// Mint an access token for `user` valid for `lifetime`.
    pub fn issue(
        signer: &Signer,
        clock: &dyn TimeSource,
        user: &U,
        lifetime: Duration,
    ) -> Result<Self, AuthError> {
        let inner = UserToken::encode(signer, clock, user, Map::new(), lifetime)?;
        Ok(Self { inner })
    }

    pub fn decode<D>(signer: &Signer, directory: &D, encoding: impl Into<String>) -> Self
    where
        D: UserDirectory<User = U> + ?Sized,
    {
        Self {
            inner: UserToken::decode(signer, directory, encoding),
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        self.inner.rejection()
    }

    #[must_use]
    pub fn user(&self) -> Option<&U> {
        self.inner.user()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.user_id()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.inner.expires_at()
    }

    pub fn expired(&self, clock: &dyn TimeSource) -> Result<bool, AuthError> {
        self.inner.expired(clock)
    }

    #[must_use]
    pub fn encoding(&self) -> &str {
        self.inner.encoding()
    }

    #[must_use]
    pub const fn user_token(&self) -> &UserToken<U> {
        &self.inner
    }
}

impl<U> fmt::Display for AccessToken<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}
