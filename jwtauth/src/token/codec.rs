//! Signed claim encoding.
//!
//! Stateless encode/decode of a claim bundle as a JWS compact serialization,
//! signed with one shared secret under one configured HMAC algorithm.
//!
//! # Pre-conditions
//! - The secret is non-empty.
//! - The algorithm is `HS256`, `HS384` or `HS512`.
//!
//! # Post-conditions
//! - `decode` succeeds only if the signature verifies under exactly the configured
//!   algorithm and both `iat` and `exp` are present integers with `exp >= iat`.
//! - `decode` does not look at the clock: an expired encoding still decodes.
//!
//! # Invariants
//! - Encoding and decoding have no side effects.
//! - An encoding whose header declares `none` (or any algorithm other than the
//!   configured one) never decodes.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Settings;
use crate::error::AuthError;

/// Registered claim holding the issue time.
pub const ISSUED_AT_CLAIM: &str = "iat";
/// Registered claim holding the expiry time.
pub const EXPIRES_AT_CLAIM: &str = "exp";

/// Parse a configured algorithm name, accepting only the HMAC family.
///
/// Names are matched exactly, so `none` and lowercase spellings are refused.
#[must_use]
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        _ => None,
    }
}

/// Error returned when a signer cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The shared secret is empty.
    EmptySecret,
    /// The algorithm is not a shared-secret algorithm.
    UnsupportedAlgorithm(Algorithm),
}

impl std::fmt::Display for SignerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySecret => write!(f, "signing secret must not be empty"),
            Self::UnsupportedAlgorithm(alg) => {
                write!(f, "unsupported signing algorithm: {alg:?}")
            }
        }
    }
}

impl std::error::Error for SignerError {}

/// Reason an encoding failed to decode.
///
/// Always recovered locally: a token holding one of these is simply invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The signature does not verify under the configured secret.
    InvalidSignature,
    /// The header declares an algorithm other than the configured one.
    InvalidAlgorithm,
    /// The encoding cannot be parsed at all.
    Malformed,
    /// A required claim is absent.
    MissingClaim(String),
    /// `exp` precedes `iat`.
    ExpiresBeforeIssued,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "invalid token signature"),
            Self::InvalidAlgorithm => write!(f, "unexpected token algorithm"),
            Self::Malformed => write!(f, "malformed token"),
            Self::MissingClaim(claim) => write!(f, "missing '{claim}' claim"),
            Self::ExpiresBeforeIssued => write!(f, "token expires before it was issued"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A decoded or to-be-encoded claim bundle.
///
/// # Invariants
/// - `expires_at >= issued_at`
/// - `payload` never contains the registered `iat`/`exp` keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    issued_at: u64,
    expires_at: u64,
    payload: Map<String, Value>,
}

impl Claims {
    /// Build a claim bundle valid for `duration_secs` from `issued_at`.
    ///
    /// Registered keys in `payload` are dropped; the registered claims win.
    #[must_use]
    pub fn new(issued_at: u64, duration_secs: u64, mut payload: Map<String, Value>) -> Self {
        payload.remove(ISSUED_AT_CLAIM);
        payload.remove(EXPIRES_AT_CLAIM);
        Self {
            issued_at,
            expires_at: issued_at.saturating_add(duration_secs),
            payload,
        }
    }

    /// Issue time, seconds since Unix epoch.
    #[must_use]
    pub const fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Expiry time, seconds since Unix epoch.
    #[must_use]
    pub const fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Application-defined claims.
    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// Wire shape used when signing.
#[derive(Serialize)]
struct OutgoingClaims<'a> {
    #[serde(flatten)]
    payload: &'a Map<String, Value>,
    iat: u64,
    exp: u64,
}

/// Wire shape used when verifying.
///
/// The registered claims are optional here so that their absence is reported as
/// `MissingClaim` rather than a generic parse failure.
#[derive(Debug, Clone, Deserialize)]
struct IncomingClaims {
    iat: Option<u64>,
    exp: Option<u64>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// Signs and verifies encodings with the configured secret and algorithm.
#[derive(Clone)]
pub struct Signer {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signer({:?}, [REDACTED])", self.algorithm)
    }
}

impl Signer {
    /// Create a signer for `algorithm` keyed with `secret`.
    ///
    /// # Errors
    /// Returns `SignerError::EmptySecret` for an empty secret and
    /// `SignerError::UnsupportedAlgorithm` for anything outside the HMAC family.
    pub fn new(secret: &[u8], algorithm: Algorithm) -> Result<Self, SignerError> {
        if secret.is_empty() {
            return Err(SignerError::EmptySecret);
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(SignerError::UnsupportedAlgorithm(algorithm));
        }

        // Expiry is judged by the token layer against an injectable clock, so the
        // library must not reject expired encodings here.
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&[EXPIRES_AT_CLAIM]);

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Create a signer from the configured secret and algorithm.
    pub fn from_settings(settings: &Settings) -> Result<Self, SignerError> {
        Self::new(&settings.signing_key, settings.algorithm)
    }

    /// The configured algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a claim bundle.
    ///
    /// # Errors
    /// Returns `AuthError::Signing` if the claims cannot be serialized or signed.
    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        let outgoing = OutgoingClaims {
            payload: &claims.payload,
            iat: claims.issued_at,
            exp: claims.expires_at,
        };
        encode(&Header::new(self.algorithm), &outgoing, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify an encoding and extract its claims.
    ///
    /// # Errors
    /// Returns a `DecodeError` describing why the encoding was refused.
    pub fn decode(&self, encoding: &str) -> Result<Claims, DecodeError> {
        let data =
            decode::<IncomingClaims>(encoding, &self.decoding_key, &self.validation)
                .map_err(map_jwt_error)?;

        let incoming = data.claims;
        let issued_at = incoming
            .iat
            .ok_or_else(|| DecodeError::MissingClaim(ISSUED_AT_CLAIM.to_string()))?;
        let expires_at = incoming
            .exp
            .ok_or_else(|| DecodeError::MissingClaim(EXPIRES_AT_CLAIM.to_string()))?;
        if expires_at < issued_at {
            return Err(DecodeError::ExpiresBeforeIssued);
        }

        Ok(Claims {
            issued_at,
            expires_at,
            payload: incoming.payload,
        })
    }
}

/// Maps jsonwebtoken errors to our `DecodeError` type.
fn map_jwt_error(error: jsonwebtoken::errors::Error) -> DecodeError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::InvalidSignature => DecodeError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => DecodeError::InvalidAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) => DecodeError::MissingClaim(claim.clone()),
        _ => DecodeError::Malformed,
    }
}
