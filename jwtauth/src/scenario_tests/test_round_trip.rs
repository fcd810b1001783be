use std::time::Duration;

use serde_json::{Map, Value, json};

use super::helpers::Harness;
use crate::token::Token;

fn payloads() -> Vec<Map<String, Value>> {
    [
        json!({}),
        json!({ "data": 42 }),
        json!({ "name": "zoë", "tags": ["a", "b"], "nested": { "ok": true, "n": null } }),
        json!({ "big": u64::MAX, "negative": -7, "float": 1.5 }),
        json!({ "user_id": "1", "token_string": "abc" }),
    ]
    .into_iter()
    .filter_map(|value| match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
    .collect()
}

#[test]
fn test_payloads_survive_encode_and_decode() {
    let harness = Harness::new();
    let signer = harness.manager.signer();

    for payload in payloads() {
        for secs in [1, 300, 86_400, 365 * 86_400] {
            let token = Token::encode(
                signer,
                harness.clock.as_ref(),
                payload.clone(),
                Duration::from_secs(secs),
            )
            .expect("encodes");
            let decoded = Token::decode(signer, token.encoding());

            assert!(decoded.is_valid());
            assert_eq!(decoded.data(), Some(&payload));
            assert_eq!(decoded.expires_at(), Some(1_700_000_000 + secs));
            assert!(!decoded.expired(harness.clock.as_ref()).expect("valid token"));
        }
    }
}

#[test]
fn test_registered_claims_in_payload_are_overridden() {
    let harness = Harness::new();
    let Value::Object(payload) = json!({ "iat": 1, "exp": 2, "data": 42 }) else {
        unreachable!()
    };

    let token = Token::encode(
        harness.manager.signer(),
        harness.clock.as_ref(),
        payload,
        Duration::from_secs(300),
    )
    .expect("encodes");
    let decoded = Token::decode(harness.manager.signer(), token.encoding());

    assert_eq!(decoded.issued_at(), Some(1_700_000_000));
    assert_eq!(decoded.expires_at(), Some(1_700_000_300));
    assert_eq!(decoded.data().map(Map::len), Some(1));
}

#[test]
fn test_encoding_is_rendered_verbatim() {
    let harness = Harness::new();
    let token = Token::encode(
        harness.manager.signer(),
        harness.clock.as_ref(),
        Map::new(),
        Duration::from_secs(300),
    )
    .expect("encodes");

    assert_eq!(token.to_string(), token.encoding());
    assert_eq!(token.encoding().split('.').count(), 3);
}
