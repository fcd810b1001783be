//! The base token: a signed claim bundle plus expiry evaluation.
//!
//! A `Token` is built exactly one of two ways, [`Token::encode`] from data and a
//! duration or [`Token::decode`] from an encoding. A decode failure does not
//! surface as an error; it produces an invalid token whose accessors all return
//! `None`.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::clock::TimeSource;
use crate::error::AuthError;
use crate::token::codec::{Claims, DecodeError, Signer};

/// A signed claim bundle, valid or not.
#[derive(Debug, Clone)]
pub struct Token {
    encoding: String,
    claims: Result<Claims, DecodeError>,
}

impl Token {
    /// Sign `data` into a new token valid for `duration` from now.
    ///
    /// # Post-conditions
    /// - `issued_at` is the clock's current second.
    /// - `expires_at == issued_at + duration` (whole seconds).
    /// - The token is valid.
    pub fn encode(
        signer: &Signer,
        clock: &dyn TimeSource,
        data: Map<String, Value>,
        duration: Duration,
    ) -> Result<Self, AuthError> {
        let claims = Claims::new(clock.now_secs(), duration.as_secs(), data);
        let encoding = signer.encode(&claims)?;
        Ok(Self {
            encoding,
            claims: Ok(claims),
        })
    }

    /// Decode a token from its encoding.
    ///
    /// Never fails: a forged, truncated or otherwise unacceptable encoding yields
    /// an invalid token.
    pub fn decode(signer: &Signer, encoding: impl Into<String>) -> Self {
        let encoding = encoding.into();
        let claims = signer.decode(&encoding);
        if let Err(e) = &claims {
            tracing::debug!("rejected token: {e}");
        }
        Self { encoding, claims }
    }

    /// Whether the signature verified and the required claims were present.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.claims.is_ok()
    }

    /// Why decoding failed, if it did.
    #[must_use]
    pub fn rejection(&self) -> Option<&DecodeError> {
        self.claims.as_ref().err()
    }

    /// The full claim bundle of a valid token.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref().ok()
    }

    /// The application payload of a valid token, without `iat`/`exp`.
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.claims().map(Claims::payload)
    }

    /// Issue time of a valid token.
    #[must_use]
    pub fn issued_at(&self) -> Option<u64> {
        self.claims().map(Claims::issued_at)
    }

    /// Expiry time of a valid token.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.claims().map(Claims::expires_at)
    }

    /// Whether the token has expired according to `clock`.
    ///
    /// A token is expired from the second its `exp` is reached, so a token encoded
    /// with a zero duration is expired immediately.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidState` if the token is not valid: expiry is only
    /// meaningful for a structurally sound token.
    pub fn expired(&self, clock: &dyn TimeSource) -> Result<bool, AuthError> {
        let claims = self
            .claims()
            .ok_or_else(|| AuthError::invalid_state("tested for expiration"))?;
        Ok(clock.now_secs() >= claims.expires_at())
    }

    /// The raw encoding.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn signer() -> Signer {
        Signer::new(b"abcd1234", Algorithm::HS256).expect("valid signer")
    }

    fn data() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("data".to_string(), json!(42));
        map
    }

    #[test]
    fn test_valid_token() {
        let clock = ManualTimeSource::default();
        let token = Token::encode(&signer(), &clock, data(), FIVE_MINUTES).expect("encodes");

        assert!(token.is_valid());
        assert!(!token.expired(&clock).expect("valid token"));
        assert_eq!(token.issued_at(), Some(1_700_000_000));
        assert_eq!(token.expires_at(), Some(1_700_000_300));
    }

    #[test]
    fn test_token_decode() {
        let clock = ManualTimeSource::default();
        let signer = signer();
        let original = Token::encode(&signer, &clock, data(), FIVE_MINUTES).expect("encodes");
        let decoded = Token::decode(&signer, original.encoding());

        assert!(decoded.is_valid());
        assert!(!decoded.expired(&clock).expect("valid token"));
        assert_eq!(decoded.data(), Some(&data()));
        assert_eq!(decoded.to_string(), original.to_string());
    }

    #[test]
    fn test_token_expired() {
        let clock = ManualTimeSource::default();
        let token = Token::encode(&signer(), &clock, data(), Duration::ZERO).expect("encodes");

        assert!(token.expired(&clock).expect("valid token"));
    }

    #[test]
    fn test_token_expires_after_duration() {
        let clock = ManualTimeSource::default();
        let token = Token::encode(&signer(), &clock, data(), FIVE_MINUTES).expect("encodes");

        clock.advance(299);
        assert!(!token.expired(&clock).expect("valid token"));

        clock.advance(1);
        assert!(token.expired(&clock).expect("valid token"));
    }

    #[test]
    fn test_token_decode_expired() {
        let clock = ManualTimeSource::default();
        let signer = signer();
        let encoded = Token::encode(&signer, &clock, data(), Duration::ZERO).expect("encodes");
        let decoded = Token::decode(&signer, encoded.encoding());

        assert!(decoded.is_valid());
        assert!(decoded.expired(&clock).expect("valid token"));
    }

    #[test]
    fn test_bad_token() {
        let decoded = Token::decode(&signer(), "12345");

        assert!(!decoded.is_valid());
        assert_eq!(decoded.rejection(), Some(&DecodeError::Malformed));
        assert!(decoded.data().is_none());
        assert!(decoded.issued_at().is_none());
        assert!(decoded.expires_at().is_none());
    }

    #[test]
    fn test_expired_on_invalid_token_is_an_error() {
        let clock = ManualTimeSource::default();
        let decoded = Token::decode(&signer(), "12345");

        let result = decoded.expired(&clock);
        assert!(matches!(result, Err(AuthError::InvalidState { .. })));
    }

    #[test]
    fn test_invalid_signature() {
        let clock = ManualTimeSource::default();
        let forged = Token::encode(
            &Signer::new(b"new_key", Algorithm::HS256).expect("valid signer"),
            &clock,
            data(),
            FIVE_MINUTES,
        )
        .expect("encodes");

        let decoded = Token::decode(&signer(), forged.encoding());
        assert!(!decoded.is_valid());
        assert_eq!(decoded.rejection(), Some(&DecodeError::InvalidSignature));
    }
}
