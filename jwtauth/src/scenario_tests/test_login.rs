use super::helpers::{Browser, Harness, alice};
use crate::UserId;
use crate::session::{AuthState, CookieOp, Intent};

#[test]
fn test_login_sets_exactly_two_cookies() {
    let harness = Harness::new();
    let mut browser = Browser::default();

    let (decision, ops) = harness.request(&mut browser, Intent::Login(alice()));

    assert_eq!(decision.state(), &AuthState::Unauthenticated);
    assert_eq!(ops.len(), 2);
    assert!(matches!(
        ops.iter().collect::<Vec<_>>().as_slice(),
        [CookieOp::SetAccess(_), CookieOp::SetRefresh(_)]
    ));
}

#[test]
fn test_next_request_is_authenticated() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());

    let (decision, ops) = harness.request(&mut browser, Intent::Keep);

    assert_eq!(decision.state(), &AuthState::Authenticated(alice()));
    assert_eq!(decision.user().map(|member| member.name), Some("alice"));
    assert!(ops.is_empty());
}

#[test]
fn test_login_persists_refresh_token() {
    let harness = Harness::new();
    harness.logged_in(alice());

    assert_eq!(harness.store.active_len().expect("store"), 1);
    assert_eq!(harness.store.blacklist_len().expect("store"), 0);

    // A second login, e.g. from another device, adds a second session.
    let browser = harness.logged_in(alice());
    assert_eq!(harness.evaluate(&browser).user(), Some(&alice()));
    assert_eq!(harness.store.active_len().expect("store"), 2);
}

#[test]
fn test_active_record_owner_and_expiry() {
    let harness = Harness::new();
    let browser = harness.logged_in(alice());

    let token = crate::token::RefreshToken::decode(
        harness.manager.signer(),
        harness.directory.as_ref(),
        browser.refresh.clone().expect("refresh cookie"),
    );
    let token_string = token.token_string().expect("valid token");
    let record = harness
        .store
        .active_record(token_string)
        .expect("store")
        .expect("record exists");

    assert_eq!(record.owner, UserId::from(1));
    assert_eq!(record.expires_at, 1_700_000_000 + 86_400);
}

#[test]
fn test_login_twice_in_one_session_is_rejected() {
    let harness = Harness::new();
    let browser = harness.logged_in(alice());

    let decision = harness.evaluate(&browser);
    let result = harness.manager.finalize(decision, Intent::Login(alice()));

    assert!(matches!(result, Err(crate::AuthError::AlreadyAuthenticated)));
    assert_eq!(harness.store.active_len().expect("store"), 1);
}
