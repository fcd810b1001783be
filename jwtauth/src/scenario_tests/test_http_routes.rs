use std::sync::Arc;

use axum::Json;
use axum::body::to_bytes;
use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::Value;

use crate::clock::{ManualTimeSource, TimeSource};
use crate::config::{AccountSpec, ServerConfig, Settings};
use crate::server::{self, AppState, Credentials};

fn state(debug: bool) -> (AppState, Arc<ManualTimeSource>) {
    let config = ServerConfig {
        settings: Settings::new("http-secret"),
        listen_port: ServerConfig::DEFAULT_PORT,
        debug,
        accounts: vec![AccountSpec {
            username: "john".to_string(),
            password: "hunter2".to_string(),
        }],
        sweep_interval: ServerConfig::DEFAULT_SWEEP_INTERVAL,
    };
    let clock = Arc::new(ManualTimeSource::default());
    let state = AppState::from_config(&config, Arc::clone(&clock) as Arc<dyn TimeSource>)
        .expect("valid config");
    (state, clock)
}

fn credentials(username: &str, password: &str) -> Json<Credentials> {
    Json(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().expect("ascii").to_string())
        .collect()
}

/// Turn `Set-Cookie` headers into the `Cookie` header a browser would send.
fn cookie_header(set_cookies: &[String]) -> HeaderMap {
    let pairs: Vec<&str> = set_cookies
        .iter()
        .filter_map(|c| c.split(';').next())
        .collect();
    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&pairs.join("; ")).expect("valid header"),
    );
    headers
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn logged_in(state: &AppState) -> HeaderMap {
    let response = server::login(
        State(state.clone()),
        HeaderMap::new(),
        credentials("john", "hunter2"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    cookie_header(&set_cookies(&response))
}

#[tokio::test]
async fn test_login_sets_two_secure_cookies() {
    let (state, _) = state(false);
    let response = server::login(
        State(state.clone()),
        HeaderMap::new(),
        credentials("john", "hunter2"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("access_token="));
    assert!(cookies[1].starts_with("refresh_token="));
    for cookie in &cookies {
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.ends_with("; Secure"));
    }
}

#[tokio::test]
async fn test_debug_mode_drops_secure_flag() {
    let (state, _) = state(true);
    let response = server::login(
        State(state.clone()),
        HeaderMap::new(),
        credentials("john", "hunter2"),
    )
    .await;

    for cookie in set_cookies(&response) {
        assert!(!cookie.contains("Secure"));
    }
}

#[tokio::test]
async fn test_bad_credentials_are_forbidden() {
    let (state, _) = state(false);

    for (username, password) in [("john", "wrong"), ("nobody", "hunter2"), ("john", "")] {
        let response = server::login(
            State(state.clone()),
            HeaderMap::new(),
            credentials(username, password),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(set_cookies(&response).is_empty());
    }
}

#[tokio::test]
async fn test_protected_route() {
    let (state, _) = state(false);

    let anonymous = server::logged(State(state.clone()), HeaderMap::new()).await;
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

    let cookies = logged_in(&state).await;
    let response = server::logged(State(state.clone()), cookies).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_protected_route_refreshes_silently() {
    let (state, clock) = state(false);
    let cookies = logged_in(&state).await;

    clock.advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());
    let response = server::logged(State(state.clone()), cookies).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let refreshed = set_cookies(&response);
    assert_eq!(refreshed.len(), 1);
    assert!(refreshed[0].starts_with("access_token="));
}

#[tokio::test]
async fn test_protected_route_rejects_expired_pair() {
    let (state, clock) = state(false);
    let cookies = logged_in(&state).await;

    clock.advance(Settings::DEFAULT_REFRESH_TOKEN_LIFETIME.as_secs());
    let response = server::logged(State(state.clone()), cookies).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_username() {
    let (state, _) = state(false);

    let anonymous = server::username(State(state.clone()), HeaderMap::new()).await;
    assert_eq!(anonymous.status(), StatusCode::OK);
    assert_eq!(body_json(anonymous).await["username"], "");

    let cookies = logged_in(&state).await;
    let response = server::username(State(state.clone()), cookies).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "john");
}

#[tokio::test]
async fn test_logout() {
    let (state, _) = state(false);
    let cookies = logged_in(&state).await;

    let response = server::logout(State(state.clone()), cookies.clone()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let deleted = set_cookies(&response);
    assert_eq!(deleted.len(), 2);
    for cookie in &deleted {
        assert!(cookie.contains("Max-Age=0"));
    }
    let store = state.manager.store();
    assert_eq!(store.active_len().expect("store"), 0);
    assert_eq!(store.blacklist_len().expect("store"), 1);

    let replay = server::logged(State(state.clone()), cookies).await;
    assert_eq!(replay.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let (state, _) = state(false);

    let response = server::logout(State(state.clone()), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_login_while_logged_in_is_rejected() {
    let (state, _) = state(false);
    let cookies = logged_in(&state).await;

    let response = server::login(
        State(state.clone()),
        cookies,
        credentials("john", "hunter2"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.manager.store().active_len().expect("store"), 1);
}
