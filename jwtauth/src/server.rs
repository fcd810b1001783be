//! HTTP routes of the demo server.
//!
//! | Route            | Behaviour                                               |
//! |------------------|---------------------------------------------------------|
//! | `POST /login/`   | JSON credentials; `204` plus both cookies, or `403`     |
//! | `GET /logged/`   | `204` when authenticated, else `403`                    |
//! | `GET /username/` | `{"username": ...}`, empty for anonymous callers        |
//! | `DELETE /logout` | authenticated only; `204` and both cookies deleted      |
//!
//! Every handler evaluates the incoming cookies, then finalizes the decision
//! with its intent and copies the resulting cookie changes onto the response.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::clock::TimeSource;
use crate::config::ServerConfig;
use crate::directory::{Identity, MemoryDirectory, UserId, UserLookup};
use crate::error::AuthError;
use crate::session::{AuthManager, Intent, SessionDecision};
use crate::store::MemoryRevocationStore;
use crate::token::SignerError;
use crate::transport::{CookieTransport, require_user};

/// A user account of the demo server.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    id: u64,
    username: String,
    password: String,
}

impl Account {
    #[must_use]
    pub fn new(id: u64, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    fn check_password(&self, candidate: &str) -> bool {
        self.password.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Identity for Account {
    fn user_id(&self) -> UserId {
        UserId::from(self.id)
    }
}

pub type AccountManager = AuthManager<MemoryDirectory<Account>, MemoryRevocationStore>;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AccountManager>,
    pub transport: Arc<CookieTransport>,
}

impl AppState {
    /// Build the state from server configuration. Accounts get IDs `1..`.
    pub fn from_config(
        config: &ServerConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, SignerError> {
        let directory = MemoryDirectory::new();
        for (id, account) in (1_u64..).zip(&config.accounts) {
            directory.insert(Account::new(id, &account.username, &account.password));
        }
        let manager = AuthManager::with_clock(
            &config.settings,
            Arc::new(directory),
            Arc::new(MemoryRevocationStore::new()),
            clock,
        )?;
        Ok(Self {
            manager: Arc::new(manager),
            transport: Arc::new(CookieTransport::new(&config.settings, !config.debug)),
        })
    }

    fn evaluate(&self, headers: &HeaderMap) -> Result<SessionDecision<Account>, Response> {
        let incoming = self.transport.read_tokens(headers);
        self.manager.evaluate(&incoming).map_err(internal_error)
    }

    fn finish(
        &self,
        decision: SessionDecision<Account>,
        intent: Intent<Account>,
        response: impl IntoResponse,
    ) -> Response {
        let ops = match self.manager.finalize(decision, intent) {
            Ok(ops) => ops,
            Err(AuthError::AlreadyAuthenticated) => {
                return (StatusCode::BAD_REQUEST, "already logged in").into_response();
            }
            Err(e) => return internal_error(e),
        };

        let mut response = response.into_response();
        if let Err(e) = self.transport.apply(&ops, response.headers_mut()) {
            tracing::error!("failed to render cookies: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        response
    }
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login/", post(login))
        .route("/logged/", get(logged))
        .route("/username/", get(username))
        .route("/logout", delete(logout))
        .with_state(state)
}

/// Body of `POST /login/`.
#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(credentials): Json<Credentials>,
) -> Response {
    let decision = match state.evaluate(&headers) {
        Ok(decision) => decision,
        Err(response) => return response,
    };

    let lookup = state
        .manager
        .directory()
        .find_by(|account| account.username == credentials.username);
    let account = match lookup {
        UserLookup::Found(account) if account.check_password(&credentials.password) => account,
        UserLookup::Found(_) | UserLookup::NotFound | UserLookup::Ambiguous => {
            tracing::debug!("rejected login attempt");
            return (StatusCode::FORBIDDEN, "invalid username or password").into_response();
        }
    };

    state.finish(decision, Intent::Login(account), StatusCode::NO_CONTENT)
}

pub async fn logged(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let decision = match state.evaluate(&headers) {
        Ok(decision) => decision,
        Err(response) => return response,
    };
    if let Err(status) = require_user(&decision) {
        return status.into_response();
    }
    state.finish(decision, Intent::Keep, StatusCode::NO_CONTENT)
}

pub async fn username(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let decision = match state.evaluate(&headers) {
        Ok(decision) => decision,
        Err(response) => return response,
    };
    let username = decision
        .user()
        .map(|account| account.username().to_owned())
        .unwrap_or_default();
    state.finish(
        decision,
        Intent::Keep,
        Json(json!({ "username": username })),
    )
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let decision = match state.evaluate(&headers) {
        Ok(decision) => decision,
        Err(response) => return response,
    };
    if let Err(status) = require_user(&decision) {
        return status.into_response();
    }
    state.finish(decision, Intent::Logout, StatusCode::NO_CONTENT)
}

fn internal_error(e: AuthError) -> Response {
    tracing::error!("session handling failed: {e}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_password() {
        let account = Account::new(1, "john", "hunter2");
        assert!(account.check_password("hunter2"));
        assert!(!account.check_password("hunter3"));
        assert!(!account.check_password("hunter22"));
        assert!(!account.check_password(""));
    }

    #[test]
    fn test_account_debug_hides_password() {
        let account = Account::new(1, "john", "hunter2");
        let debug = format!("{account:?}");
        assert!(debug.contains("john"));
        assert!(!debug.contains("hunter2"));
    }
}
