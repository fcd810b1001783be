use std::collections::HashSet;
use std::sync::Mutex;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::helpers::{Harness, Member, alice, bob};
use crate::config::Settings;
use crate::error::AuthError;
use crate::session::{IncomingTokens, Intent};
use crate::store::StoreError;
use crate::token::RefreshToken;

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

#[test]
fn test_concurrent_issue_yields_distinct_token_strings() {
    let harness = Harness::new();
    let seen = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for i in 0..THREADS {
            let harness = &harness;
            let seen = &seen;
            scope.spawn(move || {
                let user = if i % 2 == 0 { alice() } else { bob() };
                for _ in 0..PER_THREAD {
                    let token = RefreshToken::issue(
                        harness.manager.signer(),
                        harness.clock.as_ref(),
                        harness.store.as_ref(),
                        &user,
                        Settings::DEFAULT_REFRESH_TOKEN_LIFETIME,
                        Settings::DEFAULT_TOKEN_STRING_LENGTH,
                    )
                    .expect("issues");
                    token.save(harness.store.as_ref()).expect("saves");
                    let token_string = token.token_string().expect("valid token").to_owned();
                    seen.lock().expect("lock").push(token_string);
                }
            });
        }
    });

    let seen = seen.into_inner().expect("lock");
    let distinct: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
    assert_eq!(
        harness.store.active_len().expect("store"),
        THREADS * PER_THREAD
    );
}

#[test]
fn test_concurrent_logins_for_one_user_all_succeed() {
    let harness = Harness::new();

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let harness = &harness;
            scope.spawn(move || {
                let decision = harness
                    .manager
                    .evaluate(&IncomingTokens::default())
                    .expect("evaluates");
                let ops = harness
                    .manager
                    .finalize(decision, Intent::Login(alice()))
                    .expect("logs in");
                assert_eq!(ops.len(), 2);
            });
        }
    });

    assert_eq!(harness.store.active_len().expect("store"), THREADS);
}

/// Issue a token whose string is drawn from a fixed seed, so two calls race
/// for the same string.
fn issue_seeded(harness: &Harness, user: &Member, seed: u64) -> RefreshToken<Member> {
    RefreshToken::issue_with_rng(
        harness.manager.signer(),
        harness.clock.as_ref(),
        harness.store.as_ref(),
        user,
        Settings::DEFAULT_REFRESH_TOKEN_LIFETIME,
        Settings::DEFAULT_TOKEN_STRING_LENGTH,
        &mut StdRng::seed_from_u64(seed),
    )
    .expect("issues")
}

#[test]
fn test_second_save_of_shared_token_string_is_rejected() {
    let harness = Harness::new();

    // Both pass the uniqueness check before either is saved.
    let first = issue_seeded(&harness, &alice(), 42);
    harness.clock.advance(1);
    let second = issue_seeded(&harness, &alice(), 42);
    assert_eq!(first.token_string(), second.token_string());
    assert_ne!(first.encoding(), second.encoding());

    first.save(harness.store.as_ref()).expect("saves");
    let result = second.save(harness.store.as_ref());
    assert!(matches!(
        result,
        Err(AuthError::Store(StoreError::Duplicate))
    ));

    // The stored record still belongs to the first token.
    let token_string = first.token_string().expect("valid token");
    assert_eq!(
        harness
            .store
            .active_record(token_string)
            .expect("store")
            .map(|record| record.expires_at),
        first.expires_at()
    );
    first.save(harness.store.as_ref()).expect("re-saving the same token");
}

#[test]
fn test_shared_token_string_across_users_is_rejected() {
    let harness = Harness::new();

    let first = issue_seeded(&harness, &alice(), 7);
    let second = issue_seeded(&harness, &bob(), 7);

    first.save(harness.store.as_ref()).expect("saves");
    assert!(matches!(
        second.save(harness.store.as_ref()),
        Err(AuthError::Store(StoreError::Duplicate))
    ));
    assert_eq!(harness.store.active_len().expect("store"), 1);
}
