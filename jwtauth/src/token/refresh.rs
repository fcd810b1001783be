//! Refresh tokens and their server-side lifecycle.
//!
//! A refresh token embeds a random token string that keys its records in the
//! [`RevocationStore`]. Unlike the other token kinds its validity depends on
//! server state, so [`RefreshToken::is_valid`] takes the store explicitly:
//!
//! ```text
//! is_valid(store) == is_structurally_valid() && !blacklisted(store)
//! ```

use std::fmt;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Map, Value};

use crate::clock::TimeSource;
use crate::directory::{Identity, UserDirectory, UserId};
use crate::error::AuthError;
use crate::store::{ActiveRecord, BlacklistRecord, RevocationStore};
use crate::token::access::AccessToken;
use crate::token::codec::Signer;
use crate::token::user::{Rejection, UserToken};

/// Claim carrying the token string.
pub const TOKEN_STRING_CLAIM: &str = "token_string";

/// Upper bound on token string candidates tried before giving up.
///
/// Generation retries until a string is unused, but stops here instead of
/// looping forever against a store that reports everything as taken. At the
/// default length a real collision is never expected, so hitting the cap
/// means the store is misbehaving.
pub const MAX_TOKEN_STRING_ATTEMPTS: usize = 32;

/// A refresh token.
#[derive(Debug, Clone)]
pub struct RefreshToken<U> {
    inner: UserToken<U>,
    token_string: Option<String>,
}

impl<U: Identity + Clone> RefreshToken<U> {
    /// Mint a refresh token for `user` with a token string not currently active.
    ///
    /// The token is not persisted; call [`save`](Self::save) for that.
    pub fn issue<S>(
        signer: &Signer,
        clock: &dyn TimeSource,
        store: &S,
        user: &U,
        lifetime: Duration,
        token_string_length: usize,
    ) -> Result<Self, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        Self::issue_with_rng(
            signer,
            clock,
            store,
            user,
            lifetime,
            token_string_length,
            &mut rand::rng(),
        )
    }

    pub(crate) fn issue_with_rng<S, R>(
        signer: &Signer,
        clock: &dyn TimeSource,
        store: &S,
        user: &U,
        lifetime: Duration,
        token_string_length: usize,
        rng: &mut R,
    ) -> Result<Self, AuthError>
    where
        S: RevocationStore + ?Sized,
        R: Rng + ?Sized,
    {
        let token_string = unique_token_string(store, token_string_length, rng)?;

        let mut extra = Map::new();
        extra.insert(
            TOKEN_STRING_CLAIM.to_string(),
            Value::String(token_string.clone()),
        );
        let inner = UserToken::encode(signer, clock, user, extra, lifetime)?;

        Ok(Self {
            inner,
            token_string: Some(token_string),
        })
    }

    /// Decode a refresh token. Structural validity additionally requires a
    /// non-empty `token_string` claim.
    pub fn decode<D>(signer: &Signer, directory: &D, encoding: impl Into<String>) -> Self
    where
        D: UserDirectory<User = U> + ?Sized,
    {
        let mut inner = UserToken::decode(signer, directory, encoding);
        let token_string = inner
            .data()
            .and_then(|data| data.get(TOKEN_STRING_CLAIM))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        if inner.is_valid() && token_string.is_none() {
            tracing::debug!("rejected refresh token: missing token string");
            inner.reject(Rejection::MissingTokenString);
        }

        Self {
            inner,
            token_string,
        }
    }

    /// Signature, claims and subject check out. Says nothing about revocation.
    #[must_use]
    pub const fn is_structurally_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// Structurally valid and not blacklisted.
    ///
    /// An invalid token is simply not valid; only store failures are errors.
    pub fn is_valid<S>(&self, store: &S) -> Result<bool, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        if !self.is_structurally_valid() {
            return Ok(false);
        }
        Ok(!self.blacklisted(store)?)
    }

    /// Whether the token string is on the blacklist.
    ///
    /// # Errors
    /// `AuthError::InvalidState` if the token is not structurally valid.
    pub fn blacklisted<S>(&self, store: &S) -> Result<bool, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        let token_string = self.require_token_string("checked for revocation")?;
        Ok(store.is_blacklisted(token_string)?)
    }

    /// Persist the active record for this token. Saving the same token again
    /// is a no-op.
    ///
    /// # Errors
    /// - `AuthError::InvalidState` if the token is not structurally valid.
    /// - `AuthError::Store` with `StoreError::Duplicate` if another token
    ///   already holds the string.
    pub fn save<S>(&self, store: &S) -> Result<ActiveRecord, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        let (token_string, owner, expires_at) = self.record_fields("saved")?;
        let record = ActiveRecord {
            token_string,
            owner,
            expires_at,
        };
        store.insert_active(record.clone())?;
        Ok(record)
    }

    /// Revoke this token: drop its active record, then blacklist its string.
    ///
    /// Works whether or not the token was ever saved, and may be repeated.
    ///
    /// # Errors
    /// `AuthError::InvalidState` if the token is not structurally valid.
    pub fn blacklist<S>(&self, store: &S) -> Result<BlacklistRecord, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        let (token_string, _, expires_at) = self.record_fields("blacklisted")?;
        store.delete_active(&token_string)?;
        let record = BlacklistRecord {
            token_string,
            expires_at,
        };
        store.insert_blacklisted(record.clone())?;
        Ok(record)
    }

    /// Mint a fresh access token for this token's user.
    ///
    /// # Errors
    /// `AuthError::InvalidState` unless [`is_valid`](Self::is_valid) holds.
    pub fn gen_access_token<S>(
        &self,
        signer: &Signer,
        clock: &dyn TimeSource,
        store: &S,
        lifetime: Duration,
    ) -> Result<AccessToken<U>, AuthError>
    where
        S: RevocationStore + ?Sized,
    {
        if !self.is_valid(store)? {
            return Err(AuthError::invalid_state("used to mint an access token"));
        }
        self.mint_access_token(signer, clock, lifetime)
    }

    /// Mint an access token without consulting the blacklist.
    ///
    /// For callers that already checked [`is_valid`](Self::is_valid) for this
    /// request; a second lookup could observe a concurrent revocation.
    pub(crate) fn mint_access_token(
        &self,
        signer: &Signer,
        clock: &dyn TimeSource,
        lifetime: Duration,
    ) -> Result<AccessToken<U>, AuthError> {
        let user = self
            .inner
            .user()
            .ok_or_else(|| AuthError::invalid_state("used to mint an access token"))?;
        AccessToken::issue(signer, clock, user, lifetime)
    }

    pub fn expired(&self, clock: &dyn TimeSource) -> Result<bool, AuthError> {
        self.inner.expired(clock)
    }

    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        self.inner.rejection()
    }

    /// The token string of a structurally valid token.
    #[must_use]
    pub fn token_string(&self) -> Option<&str> {
        self.inner
            .is_valid()
            .then_some(self.token_string.as_deref())
            .flatten()
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

    #[must_use]
    pub fn encoding(&self) -> &str {
        self.inner.encoding()
    }

    #[must_use]
    pub const fn user_token(&self) -> &UserToken<U> {
        &self.inner
    }

    fn require_token_string(&self, operation: &'static str) -> Result<&str, AuthError> {
        self.token_string()
            .ok_or_else(|| AuthError::invalid_state(operation))
    }

    fn record_fields(&self, operation: &'static str) -> Result<(String, UserId, u64), AuthError> {
        let token_string = self.require_token_string(operation)?.to_owned();
        match (self.user_id(), self.expires_at()) {
            (Some(owner), Some(expires_at)) => Ok((token_string, owner, expires_at)),
            _ => Err(AuthError::invalid_state(operation)),
        }
    }
}

impl<U> fmt::Display for RefreshToken<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// Generate a random alphanumeric string of `length` characters.
pub fn generate_token_string<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Draw token strings until one is not in the active set.
///
/// Collisions are astronomically unlikely at the default length, but not
/// impossible, so the store is always consulted.
fn unique_token_string<S, R>(store: &S, length: usize, rng: &mut R) -> Result<String, AuthError>
where
    S: RevocationStore + ?Sized,
    R: Rng + ?Sized,
{
    for _ in 0..MAX_TOKEN_STRING_ATTEMPTS {
        let candidate = generate_token_string(rng, length);
        if !store.is_active(&candidate)? {
            return Ok(candidate);
        }
        tracing::warn!("refresh token string collision, retrying");
    }
    Err(AuthError::TokenStringExhausted {
        attempts: MAX_TOKEN_STRING_ATTEMPTS,
    })
}
