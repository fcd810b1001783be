use super::helpers::{Harness, Member, alice};
use crate::config::Settings;
use crate::store::RevocationStore;
use crate::token::RefreshToken;

fn decode(harness: &Harness, encoding: &str) -> RefreshToken<Member> {
    RefreshToken::decode(harness.manager.signer(), harness.directory.as_ref(), encoding)
}

#[test]
fn test_blacklisted_token_is_invalid_immediately_and_after_redecode() {
    let harness = Harness::new();
    let browser = harness.logged_in(alice());
    let encoding = browser.refresh.clone().expect("refresh cookie");

    let token = decode(&harness, &encoding);
    assert!(token.is_valid(harness.store.as_ref()).expect("store"));
    assert!(!token.expired(harness.clock.as_ref()).expect("valid token"));

    token.blacklist(harness.store.as_ref()).expect("blacklists");
    assert!(!token.is_valid(harness.store.as_ref()).expect("store"));
    assert!(token.is_structurally_valid());

    let redecoded = decode(&harness, &encoding);
    assert!(redecoded.is_structurally_valid());
    assert!(redecoded.blacklisted(harness.store.as_ref()).expect("store"));
    assert!(!redecoded.is_valid(harness.store.as_ref()).expect("store"));
}

#[test]
fn test_blacklisted_refresh_token_fails_the_pair() {
    let harness = Harness::new();
    let browser = harness.logged_in(alice());
    let token = decode(&harness, browser.refresh.as_deref().expect("refresh cookie"));

    token.blacklist(harness.store.as_ref()).expect("blacklists");

    assert!(harness.evaluate(&browser).is_failed());
}

#[test]
fn test_blacklisted_refresh_token_cannot_silently_refresh() {
    let harness = Harness::new();
    let browser = harness.logged_in(alice());
    let token = decode(&harness, browser.refresh.as_deref().expect("refresh cookie"));
    token.blacklist(harness.store.as_ref()).expect("blacklists");

    harness
        .clock
        .advance(Settings::DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs());
    let decision = harness.evaluate(&browser);

    assert!(decision.is_failed());
    assert!(!decision.is_silent_refresh());
}

#[test]
fn test_never_saved_token_can_be_blacklisted() {
    let harness = Harness::new();
    let token = RefreshToken::issue(
        harness.manager.signer(),
        harness.clock.as_ref(),
        harness.store.as_ref(),
        &alice(),
        Settings::DEFAULT_REFRESH_TOKEN_LIFETIME,
        Settings::DEFAULT_TOKEN_STRING_LENGTH,
    )
    .expect("issues");
    let token_string = token.token_string().expect("valid token").to_owned();
    assert!(!harness.store.is_active(&token_string).expect("store"));

    let record = token.blacklist(harness.store.as_ref()).expect("blacklists");

    assert_eq!(record.token_string, token_string);
    assert_eq!(record.expires_at, 1_700_000_000 + 86_400);
    assert!(harness.store.is_blacklisted(&token_string).expect("store"));
    assert!(!harness.store.is_active(&token_string).expect("store"));
    assert!(!token.is_valid(harness.store.as_ref()).expect("store"));
}

#[test]
fn test_other_sessions_survive_a_revocation() {
    let harness = Harness::new();
    let first = harness.logged_in(alice());
    let second = harness.logged_in(alice());

    let token = decode(&harness, first.refresh.as_deref().expect("refresh cookie"));
    token.blacklist(harness.store.as_ref()).expect("blacklists");

    assert!(harness.evaluate(&first).is_failed());
    assert_eq!(harness.evaluate(&second).user(), Some(&alice()));
}
