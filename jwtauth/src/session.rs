//! Per-request session decisions.
//!
//! The transport layer drives the engine in two explicit phases:
//!
//! 1. [`AuthManager::evaluate`] turns the incoming cookie pair into a
//!    [`SessionDecision`] (who is the caller, and does the access token need
//!    a silent refresh).
//! 2. [`AuthManager::finalize`] combines that decision with what the handler
//!    wants to do ([`Intent`]) into the [`CookieOps`] to put on the response,
//!    performing any store writes (login persists, logout revokes).
//!
//! Nothing survives a request; the engine itself only holds configuration and
//! collaborators and is shared freely.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{SystemTimeSource, TimeSource};
use crate::config::Settings;
use crate::directory::{Identity, UserDirectory};
use crate::error::AuthError;
use crate::store::RevocationStore;
use crate::token::codec::{Signer, SignerError};
use crate::token::{AccessToken, RefreshToken};

/// Raw token encodings read from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl IncomingTokens {
    #[must_use]
    pub const fn new(access: Option<String>, refresh: Option<String>) -> Self {
        Self { access, refresh }
    }
}

/// Authentication verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState<U> {
    /// No usable credentials: nothing presented, only half a pair, or a pair
    /// whose tokens have both expired.
    Unauthenticated,
    /// The access token is valid and live.
    Authenticated(U),
    /// The access token expired and a new one was minted from the refresh
    /// token.
    Refreshed(U),
    /// A pair was presented but rejected: forged, tampered, revoked, or the
    /// two tokens name different users.
    Failed,
}

/// Outcome of [`AuthManager::evaluate`], consumed by [`AuthManager::finalize`].
#[derive(Debug, Clone)]
pub struct SessionDecision<U> {
    state: AuthState<U>,
    refresh: Option<RefreshToken<U>>,
    refreshed_access: Option<AccessToken<U>>,
}

impl<U> SessionDecision<U> {
    const fn new(
        state: AuthState<U>,
        refresh: Option<RefreshToken<U>>,
        refreshed_access: Option<AccessToken<U>>,
    ) -> Self {
        Self {
            state,
            refresh,
            refreshed_access,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AuthState<U> {
        &self.state
    }

    /// The authenticated user, directly or after a silent refresh.
    #[must_use]
    pub const fn user(&self) -> Option<&U> {
        match &self.state {
            AuthState::Authenticated(user) | AuthState::Refreshed(user) => Some(user),
            AuthState::Unauthenticated | AuthState::Failed => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, AuthState::Failed)
    }

    /// Whether `finalize` will emit a new access token.
    #[must_use]
    pub const fn is_silent_refresh(&self) -> bool {
        self.refreshed_access.is_some()
    }
}

/// What the handler decided to do with the session.
#[derive(Debug, Clone)]
pub enum Intent<U> {
    /// Leave the session as evaluated.
    Keep,
    /// Start a new session for the given user.
    Login(U),
    /// End the session.
    Logout,
}

/// One cookie change for the transport layer to apply.
#[derive(Clone, PartialEq, Eq)]
pub enum CookieOp {
    SetAccess(String),
    SetRefresh(String),
    DeleteAccess,
    DeleteRefresh,
}

impl std::fmt::Debug for CookieOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetAccess(_) => f.write_str("SetAccess(<redacted>)"),
            Self::SetRefresh(_) => f.write_str("SetRefresh(<redacted>)"),
            Self::DeleteAccess => f.write_str("DeleteAccess"),
            Self::DeleteRefresh => f.write_str("DeleteRefresh"),
        }
    }
}

/// Cookie changes produced by [`AuthManager::finalize`], in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOps(Vec<CookieOp>);

impl CookieOps {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CookieOp> {
        self.0.iter()
    }

    #[must_use]
    pub fn contains(&self, op: &CookieOp) -> bool {
        self.0.contains(op)
    }
}

impl FromIterator<CookieOp> for CookieOps {
    fn from_iter<I: IntoIterator<Item = CookieOp>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CookieOps {
    type Item = CookieOp;
    type IntoIter = std::vec::IntoIter<CookieOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CookieOps {
    type Item = &'a CookieOp;
    type IntoIter = std::slice::Iter<'a, CookieOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The session decision engine.
///
/// Built from a [`Settings`] snapshot; to pick up new settings, build a new one.
pub struct AuthManager<D, S> {
    signer: Signer,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
    token_string_length: usize,
    clock: Arc<dyn TimeSource>,
    directory: Arc<D>,
    store: Arc<S>,
}

impl<D, S> std::fmt::Debug for AuthManager<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("signer", &self.signer)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .finish_non_exhaustive()
    }
}

impl<D, S> AuthManager<D, S>
where
    D: UserDirectory,
    S: RevocationStore,
{
    /// Create an engine using the system clock.
    pub fn new(settings: &Settings, directory: Arc<D>, store: Arc<S>) -> Result<Self, SignerError> {
        Self::with_clock(settings, directory, store, Arc::new(SystemTimeSource))
    }

    /// Create an engine with an explicit time source.
    pub fn with_clock(
        settings: &Settings,
        directory: Arc<D>,
        store: Arc<S>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, SignerError> {
        Ok(Self {
            signer: Signer::from_settings(settings)?,
            access_token_lifetime: settings.access_token_lifetime,
            refresh_token_lifetime: settings.refresh_token_lifetime,
            token_string_length: settings.token_string_length,
            clock,
            directory,
            store,
        })
    }

    #[must_use]
    pub const fn signer(&self) -> &Signer {
        &self.signer
    }

    #[must_use]
    pub fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    #[must_use]
    pub const fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide who the caller is.
    ///
    /// # Post-conditions
    /// - Only a complete, structurally valid, non-revoked pair whose tokens name
    ///   the same user can authenticate.
    /// - An expired access token is replaced (in the decision) by one minted
    ///   from the refresh token, unless the refresh token has expired too.
    /// - No store writes happen here.
    ///
    /// # Errors
    /// Only collaborator failures; hostile input never errors.
    pub fn evaluate(&self, incoming: &IncomingTokens) -> Result<SessionDecision<D::User>, AuthError> {
        let refresh = incoming
            .refresh
            .as_deref()
            .map(|encoding| RefreshToken::decode(&self.signer, self.directory.as_ref(), encoding));

        let Some(access_encoding) = incoming.access.as_deref() else {
            if refresh.is_some() {
                tracing::debug!("refresh token without access token, treating request as anonymous");
            }
            return Ok(SessionDecision::new(AuthState::Unauthenticated, refresh, None));
        };
        let Some(refresh_token) = &refresh else {
            tracing::debug!("access token without refresh token, treating request as anonymous");
            return Ok(SessionDecision::new(AuthState::Unauthenticated, None, None));
        };

        let access = AccessToken::decode(&self.signer, self.directory.as_ref(), access_encoding);
        if !access.is_valid() || !refresh_token.is_valid(self.store.as_ref())? {
            tracing::warn!(
                access = ?access.rejection(),
                refresh = ?refresh_token.rejection(),
                "rejected token pair"
            );
            return Ok(SessionDecision::new(AuthState::Failed, refresh, None));
        }

        if access.user_id() != refresh_token.user_id() {
            tracing::warn!("token pair names two different users");
            return Ok(SessionDecision::new(AuthState::Failed, refresh, None));
        }

        if !access.expired(self.clock())? {
            let state = access
                .user()
                .cloned()
                .map_or(AuthState::Failed, AuthState::Authenticated);
            return Ok(SessionDecision::new(state, refresh, None));
        }

        if refresh_token.expired(self.clock())? {
            tracing::debug!("access and refresh tokens both expired");
            return Ok(SessionDecision::new(AuthState::Unauthenticated, refresh, None));
        }

        // Revocation was checked once above; the decision stands on that answer.
        let renewed = refresh_token.mint_access_token(
            &self.signer,
            self.clock(),
            self.access_token_lifetime,
        )?;
        let state = renewed
            .user()
            .cloned()
            .map_or(AuthState::Failed, AuthState::Refreshed);
        tracing::debug!(user_id = ?renewed.user_id(), "silently refreshed access token");
        Ok(SessionDecision::new(state, refresh, Some(renewed)))
    }

    /// Turn a decision plus the handler's intent into cookie changes.
    ///
    /// - `Keep`: a silent refresh sets the access cookie only; otherwise nothing.
    /// - `Login`: mints and persists a new pair and sets both cookies.
    /// - `Logout`: revokes the held refresh token if it is valid and unexpired,
    ///   and always deletes both cookies. A pending silent refresh is dropped.
    ///
    /// # Errors
    /// - `AuthError::AlreadyAuthenticated` for a login on an authenticated decision.
    /// - Signing and store failures.
    pub fn finalize(
        &self,
        decision: SessionDecision<D::User>,
        intent: Intent<D::User>,
    ) -> Result<CookieOps, AuthError> {
        let mut ops = Vec::new();
        match intent {
            Intent::Keep => {
                if let Some(access) = decision.refreshed_access {
                    ops.push(CookieOp::SetAccess(access.encoding().to_owned()));
                }
            }
            Intent::Login(user) => {
                if decision.is_authenticated() {
                    return Err(AuthError::AlreadyAuthenticated);
                }
                let (access, refresh) = self.start_session(&user)?;
                ops.push(CookieOp::SetAccess(access.encoding().to_owned()));
                ops.push(CookieOp::SetRefresh(refresh.encoding().to_owned()));
                tracing::info!(user_id = %user.user_id(), "logged in");
            }
            Intent::Logout => {
                if let Some(refresh) = &decision.refresh
                    && refresh.is_valid(self.store.as_ref())?
                    && !refresh.expired(self.clock())?
                {
                    refresh.blacklist(self.store.as_ref())?;
                }
                ops.push(CookieOp::DeleteAccess);
                ops.push(CookieOp::DeleteRefresh);
                tracing::info!(
                    user_id = ?decision.user().map(Identity::user_id),
                    "logged out"
                );
            }
        }
        Ok(CookieOps(ops))
    }

    fn start_session(
        &self,
        user: &D::User,
    ) -> Result<(AccessToken<D::User>, RefreshToken<D::User>), AuthError> {
        let access =
            AccessToken::issue(&self.signer, self.clock(), user, self.access_token_lifetime)?;
        let refresh = RefreshToken::issue(
            &self.signer,
            self.clock(),
            self.store.as_ref(),
            user,
            self.refresh_token_lifetime,
            self.token_string_length,
        )?;
        refresh.save(self.store.as_ref())?;
        Ok((access, refresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::directory::{MemoryDirectory, UserId};
    use crate::store::{
        ActiveRecord, BlacklistRecord, MemoryRevocationStore, PurgeResult, StoreError,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Member(u64);

    impl Identity for Member {
        fn user_id(&self) -> UserId {
            UserId::from(self.0)
        }
    }

    type Manager = AuthManager<MemoryDirectory<Member>, MemoryRevocationStore>;

    fn manager() -> (Manager, Arc<ManualTimeSource>) {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(Member(1));
        directory.insert(Member(2));
        let clock = Arc::new(ManualTimeSource::default());
        let manager = AuthManager::with_clock(
            &Settings::new("abcd1234"),
            directory,
            Arc::new(MemoryRevocationStore::new()),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
        )
        .expect("valid settings");
        (manager, clock)
    }

    fn login<S: RevocationStore>(
        manager: &AuthManager<MemoryDirectory<Member>, S>,
        user: Member,
    ) -> IncomingTokens {
        let decision = manager
            .evaluate(&IncomingTokens::default())
            .expect("evaluates");
        let ops = manager
            .finalize(decision, Intent::Login(user))
            .expect("logs in");
        let mut incoming = IncomingTokens::default();
        for op in ops {
            match op {
                CookieOp::SetAccess(v) => incoming.access = Some(v),
                CookieOp::SetRefresh(v) => incoming.refresh = Some(v),
                CookieOp::DeleteAccess | CookieOp::DeleteRefresh => {}
            }
        }
        incoming
    }

    #[test]
    fn test_no_tokens() {
        let (manager, _) = manager();
        let decision = manager
            .evaluate(&IncomingTokens::default())
            .expect("evaluates");

        assert_eq!(decision.state(), &AuthState::Unauthenticated);
        assert!(manager
            .finalize(decision, Intent::Keep)
            .expect("finalizes")
            .is_empty());
    }

    #[test]
    fn test_half_pair_is_anonymous() {
        let (manager, _) = manager();
        let tokens = login(&manager, Member(1));

        let access_only = IncomingTokens::new(tokens.access.clone(), None);
        let refresh_only = IncomingTokens::new(None, tokens.refresh);

        for incoming in [access_only, refresh_only] {
            let decision = manager.evaluate(&incoming).expect("evaluates");
            assert_eq!(decision.state(), &AuthState::Unauthenticated);
        }
    }

    #[test]
    fn test_authenticated() {
        let (manager, _) = manager();
        let tokens = login(&manager, Member(1));

        let decision = manager.evaluate(&tokens).expect("evaluates");
        assert_eq!(decision.state(), &AuthState::Authenticated(Member(1)));
        assert_eq!(decision.user(), Some(&Member(1)));
        assert!(!decision.is_silent_refresh());
    }

    #[test]
    fn test_mismatched_pair_fails() {
        let (manager, _) = manager();
        let first = login(&manager, Member(1));
        let second = login(&manager, Member(2));

        let mixed = IncomingTokens::new(first.access, second.refresh);
        let decision = manager.evaluate(&mixed).expect("evaluates");
        assert!(decision.is_failed());
    }

    #[test]
    fn test_login_when_authenticated_fails() {
        let (manager, _) = manager();
        let tokens = login(&manager, Member(1));

        let decision = manager.evaluate(&tokens).expect("evaluates");
        let result = manager.finalize(decision, Intent::Login(Member(1)));
        assert!(matches!(result, Err(AuthError::AlreadyAuthenticated)));
    }

    #[test]
    fn test_login_after_failure_is_allowed() {
        let (manager, _) = manager();
        let forged = IncomingTokens::new(Some("a.b.c".to_string()), Some("d.e.f".to_string()));

        let decision = manager.evaluate(&forged).expect("evaluates");
        assert!(decision.is_failed());
        let ops = manager
            .finalize(decision, Intent::Login(Member(1)))
            .expect("logs in");
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_logout_supersedes_silent_refresh() {
        let (manager, clock) = manager();
        let tokens = login(&manager, Member(1));
        clock.advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());

        let decision = manager.evaluate(&tokens).expect("evaluates");
        assert!(decision.is_silent_refresh());

        let ops = manager.finalize(decision, Intent::Logout).expect("logs out");
        let expected: Vec<CookieOp> = vec![CookieOp::DeleteAccess, CookieOp::DeleteRefresh];
        assert_eq!(ops.into_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_logout_with_expired_refresh_token_does_not_blacklist() {
        let (manager, clock) = manager();
        let tokens = login(&manager, Member(1));
        clock.advance(Settings::DEFAULT_REFRESH_TOKEN_LIFETIME.as_secs());

        let decision = manager.evaluate(&tokens).expect("evaluates");
        let ops = manager.finalize(decision, Intent::Logout).expect("logs out");

        assert_eq!(ops.len(), 2);
        assert_eq!(manager.store().blacklist_len().expect("store"), 0);
    }

    #[test]
    fn test_logout_with_refresh_cookie_only_revokes_it() {
        let (manager, _) = manager();
        let tokens = login(&manager, Member(1));

        let decision = manager
            .evaluate(&IncomingTokens::new(None, tokens.refresh))
            .expect("evaluates");
        manager.finalize(decision, Intent::Logout).expect("logs out");

        assert_eq!(manager.store().blacklist_len().expect("store"), 1);
        assert_eq!(manager.store().active_len().expect("store"), 0);
    }

    #[test]
    fn test_cookie_op_debug_redacts_tokens() {
        let op = CookieOp::SetAccess("secret.token.value".to_string());
        assert_eq!(format!("{op:?}"), "SetAccess(<redacted>)");
    }

    /// A store whose tokens get revoked right after the first blacklist lookup,
    /// as if a logout on another request landed in between.
    #[derive(Default)]
    struct RevokedMidRequest {
        inner: MemoryRevocationStore,
        blacklist_checks: AtomicUsize,
    }

    impl RevocationStore for RevokedMidRequest {
        fn is_active(&self, token_string: &str) -> Result<bool, StoreError> {
            self.inner.is_active(token_string)
        }
        fn is_blacklisted(&self, _: &str) -> Result<bool, StoreError> {
            Ok(self.blacklist_checks.fetch_add(1, Ordering::SeqCst) > 0)
        }
        fn insert_active(&self, record: ActiveRecord) -> Result<(), StoreError> {
            self.inner.insert_active(record)
        }
        fn delete_active(&self, token_string: &str) -> Result<(), StoreError> {
            self.inner.delete_active(token_string)
        }
        fn insert_blacklisted(&self, record: BlacklistRecord) -> Result<(), StoreError> {
            self.inner.insert_blacklisted(record)
        }
        fn purge_expired(&self, now: u64) -> Result<PurgeResult, StoreError> {
            self.inner.purge_expired(now)
        }
    }

    #[test]
    fn test_silent_refresh_checks_blacklist_once() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(Member(1));
        let clock = Arc::new(ManualTimeSource::default());
        let store = Arc::new(RevokedMidRequest::default());
        let manager = AuthManager::with_clock(
            &Settings::new("abcd1234"),
            directory,
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
        )
        .expect("valid settings");

        let tokens = login(&manager, Member(1));
        clock.advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());

        let decision = manager.evaluate(&tokens).expect("revocation race is not an error");
        assert_eq!(decision.state(), &AuthState::Refreshed(Member(1)));
        assert_eq!(store.blacklist_checks.load(Ordering::SeqCst), 1);

        // The next request sees the revocation.
        let decision = manager.evaluate(&tokens).expect("evaluates");
        assert!(decision.is_failed());
    }
}
