use super::helpers::{Browser, Harness, alice};
use crate::config::Settings;
use crate::session::{AuthState, CookieOp, Intent};
use crate::store::RevocationStore;
use crate::token::RefreshToken;

fn token_string(harness: &Harness, browser: &Browser) -> String {
    let token = RefreshToken::decode(
        harness.manager.signer(),
        harness.directory.as_ref(),
        browser.refresh.clone().expect("refresh cookie"),
    );
    token.token_string().expect("valid token").to_owned()
}

#[test]
fn test_logout_deletes_both_cookies_and_revokes() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());
    let held = browser.clone();
    let token_string = token_string(&harness, &browser);

    let (decision, ops) = harness.request(&mut browser, Intent::Logout);

    assert_eq!(decision.state(), &AuthState::Authenticated(alice()));
    assert_eq!(
        ops.into_iter().collect::<Vec<_>>(),
        vec![CookieOp::DeleteAccess, CookieOp::DeleteRefresh]
    );
    assert_eq!(browser, Browser::default());
    assert!(harness.store.is_blacklisted(&token_string).expect("store"));
    assert!(!harness.store.is_active(&token_string).expect("store"));

    // Replaying the cookies captured before logout is rejected outright.
    let replay = harness.evaluate(&held);
    assert!(replay.is_failed());
}

#[test]
fn test_logout_after_access_expiry_does_not_refresh() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());
    harness
        .clock
        .advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());

    let (decision, ops) = harness.request(&mut browser, Intent::Logout);

    assert_eq!(decision.state(), &AuthState::Refreshed(alice()));
    assert!(ops.iter().all(|op| matches!(
        op,
        CookieOp::DeleteAccess | CookieOp::DeleteRefresh
    )));
    assert_eq!(harness.store.blacklist_len().expect("store"), 1);
}

#[test]
fn test_logout_when_anonymous_only_deletes_cookies() {
    let harness = Harness::new();
    let mut browser = Browser::default();

    let (_, ops) = harness.request(&mut browser, Intent::Logout);

    assert_eq!(ops.len(), 2);
    assert_eq!(harness.store.blacklist_len().expect("store"), 0);
}

#[test]
fn test_logout_with_forged_refresh_token_does_not_revoke() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());
    browser.refresh = Some("not.a.token".to_string());

    let (decision, ops) = harness.request(&mut browser, Intent::Logout);

    assert!(decision.is_failed());
    assert_eq!(ops.len(), 2);
    assert_eq!(harness.store.blacklist_len().expect("store"), 0);
    assert_eq!(harness.store.active_len().expect("store"), 1);
}
