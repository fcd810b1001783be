use super::helpers::{Harness, alice};
use crate::config::Settings;
use crate::session::{AuthState, CookieOp, Intent};

#[test]
fn test_expired_access_token_is_silently_refreshed() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());
    let original = browser.clone();

    harness
        .clock
        .advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());
    let (decision, ops) = harness.request(&mut browser, Intent::Keep);

    assert_eq!(decision.state(), &AuthState::Refreshed(alice()));
    assert_eq!(decision.user(), Some(&alice()));
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        ops.iter().next(),
        Some(CookieOp::SetAccess(_))
    ));
    assert_ne!(browser.access, original.access);
    assert_eq!(browser.refresh, original.refresh);
}

#[test]
fn test_refreshed_access_token_authenticates_directly() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());

    harness
        .clock
        .advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());
    harness.request(&mut browser, Intent::Keep);

    harness.clock.advance(10);
    let (decision, ops) = harness.request(&mut browser, Intent::Keep);
    assert_eq!(decision.state(), &AuthState::Authenticated(alice()));
    assert!(ops.is_empty());
}

#[test]
fn test_silent_refresh_does_not_touch_the_store() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());

    harness
        .clock
        .advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());
    harness.request(&mut browser, Intent::Keep);

    assert_eq!(harness.store.active_len().expect("store"), 1);
    assert_eq!(harness.store.blacklist_len().expect("store"), 0);
}

#[test]
fn test_refresh_token_stays_usable_until_its_own_expiry() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());

    // One second before the refresh token expires the access token has long
    // expired, but a refresh still succeeds.
    harness
        .clock
        .advance(Settings::DEFAULT_REFRESH_TOKEN_LIFETIME.as_secs() - 1);
    let (decision, ops) = harness.request(&mut browser, Intent::Keep);

    assert_eq!(decision.state(), &AuthState::Refreshed(alice()));
    assert_eq!(ops.len(), 1);
}
