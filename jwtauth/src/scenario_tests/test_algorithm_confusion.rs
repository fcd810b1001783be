use jsonwebtoken::{Algorithm, Header};
use serde_json::json;

use super::helpers::{Browser, Harness, SECRET, alice, craft, sign_claims};
use crate::token::{DecodeError, Token};

fn claims() -> serde_json::Value {
    json!({ "user_id": "1", "iat": 1_700_000_000_u64, "exp": 1_700_000_300_u64 })
}

#[test]
fn test_unsigned_token_is_invalid() {
    let harness = Harness::new();
    let unsigned = craft(&json!({ "alg": "none", "typ": "JWT" }), &claims(), "");

    let token = Token::decode(harness.manager.signer(), unsigned);
    assert!(!token.is_valid());
    assert!(token.data().is_none());
}

#[test]
fn test_unsigned_access_token_fails_the_pair() {
    let harness = Harness::new();
    let genuine = harness.logged_in(alice());

    for alg in ["none", "None", "NONE"] {
        let browser = Browser {
            access: Some(craft(&json!({ "alg": alg, "typ": "JWT" }), &claims(), "")),
            refresh: genuine.refresh.clone(),
        };
        assert!(harness.evaluate(&browser).is_failed(), "alg {alg} accepted");
    }
}

#[test]
fn test_declared_algorithm_without_signature_is_invalid() {
    let harness = Harness::new();
    let stripped = craft(&json!({ "alg": "HS256", "typ": "JWT" }), &claims(), "");

    let token = Token::decode(harness.manager.signer(), stripped);
    assert!(!token.is_valid());
}

#[test]
fn test_other_hmac_algorithm_with_same_secret_is_invalid() {
    let harness = Harness::new();
    let encoding = sign_claims(&claims(), SECRET, &Header::new(Algorithm::HS512));

    let token = Token::decode(harness.manager.signer(), encoding);
    assert_eq!(token.rejection(), Some(&DecodeError::InvalidAlgorithm));
}

#[test]
fn test_configured_algorithm_with_same_secret_is_valid() {
    let harness = Harness::new();
    let encoding = sign_claims(&claims(), SECRET, &Header::new(Algorithm::HS256));

    let token = Token::decode(harness.manager.signer(), encoding);
    assert!(token.is_valid());
}
