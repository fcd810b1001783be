use std::time::Duration;

use super::helpers::{Browser, Harness, alice};
use crate::config::Settings;
use crate::session::{AuthState, Intent};
use crate::token::{AccessToken, RefreshToken};

#[test]
fn test_both_tokens_expired_is_anonymous() {
    let harness = Harness::new();
    let mut browser = harness.logged_in(alice());
    let before = browser.clone();

    harness
        .clock
        .advance(Settings::DEFAULT_REFRESH_TOKEN_LIFETIME.as_secs());
    let (decision, ops) = harness.request(&mut browser, Intent::Keep);

    assert_eq!(decision.state(), &AuthState::Unauthenticated);
    assert!(!decision.is_failed());
    assert!(ops.is_empty());
    assert_eq!(browser, before);
}

#[test]
fn test_zero_duration_tokens_are_anonymous() {
    let harness = Harness::new();
    let signer = harness.manager.signer();
    let clock = harness.clock.as_ref();

    let access =
        AccessToken::issue(signer, clock, &alice(), Duration::ZERO).expect("issues");
    let refresh = RefreshToken::issue(
        signer,
        clock,
        harness.store.as_ref(),
        &alice(),
        Duration::ZERO,
        30,
    )
    .expect("issues");
    refresh.save(harness.store.as_ref()).expect("saves");

    let mut browser = Browser {
        access: Some(access.encoding().to_owned()),
        refresh: Some(refresh.encoding().to_owned()),
    };
    let (decision, ops) = harness.request(&mut browser, Intent::Keep);

    assert_eq!(decision.state(), &AuthState::Unauthenticated);
    assert!(ops.is_empty());
}
