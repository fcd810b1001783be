use jsonwebtoken::Header;
use serde_json::json;

use super::helpers::{Browser, Harness, SECRET, alice, sign_claims};
use crate::token::{DecodeError, RefreshToken, Token};

const NOW: u64 = 1_700_000_000;

#[test]
fn test_missing_issued_at_is_invalid() {
    let harness = Harness::new();
    let encoding = sign_claims(
        &json!({ "user_id": "1", "exp": NOW + 300 }),
        SECRET,
        &Header::default(),
    );

    let token = Token::decode(harness.manager.signer(), encoding);
    assert!(!token.is_valid());
    assert_eq!(
        token.rejection(),
        Some(&DecodeError::MissingClaim("iat".to_string()))
    );
}

#[test]
fn test_missing_expiry_is_invalid() {
    let harness = Harness::new();
    let encoding = sign_claims(
        &json!({ "user_id": "1", "iat": NOW }),
        SECRET,
        &Header::default(),
    );

    let token = Token::decode(harness.manager.signer(), encoding);
    assert_eq!(
        token.rejection(),
        Some(&DecodeError::MissingClaim("exp".to_string()))
    );
}

#[test]
fn test_missing_claims_are_not_zero_filled() {
    let harness = Harness::new();
    let encoding = sign_claims(&json!({ "user_id": "1" }), SECRET, &Header::default());

    let token = Token::decode(harness.manager.signer(), encoding);
    assert!(!token.is_valid());
    assert!(token.issued_at().is_none());
    assert!(token.expires_at().is_none());
}

#[test]
fn test_refresh_token_without_token_string_fails_the_pair() {
    let harness = Harness::new();
    let genuine = harness.logged_in(alice());
    let refresh = sign_claims(
        &json!({ "user_id": "1", "iat": NOW, "exp": NOW + 86_400 }),
        SECRET,
        &Header::default(),
    );

    let decoded = RefreshToken::decode(
        harness.manager.signer(),
        harness.directory.as_ref(),
        refresh.clone(),
    );
    assert!(!decoded.is_structurally_valid());

    let browser = Browser {
        access: genuine.access,
        refresh: Some(refresh),
    };
    assert!(harness.evaluate(&browser).is_failed());
}

#[test]
fn test_access_token_without_user_id_fails_the_pair() {
    let harness = Harness::new();
    let genuine = harness.logged_in(alice());
    let access = sign_claims(
        &json!({ "iat": NOW, "exp": NOW + 300 }),
        SECRET,
        &Header::default(),
    );

    let browser = Browser {
        access: Some(access),
        refresh: genuine.refresh,
    };
    assert!(harness.evaluate(&browser).is_failed());
}
