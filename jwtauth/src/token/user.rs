//! Tokens that identify a user.
//!
//! The subject is written into the `user_id` claim on encode and re-resolved
//! through the [`UserDirectory`] on every decode. A token is valid only when the
//! base token is valid and the lookup yields exactly one user.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::clock::TimeSource;
use crate::directory::{Identity, UserDirectory, UserId, UserLookup};
use crate::error::AuthError;
use crate::token::base::Token;
use crate::token::codec::{DecodeError, Signer};

/// Claim carrying the subject's [`UserId`].
pub const USER_ID_CLAIM: &str = "user_id";

/// Why a user token is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The base token did not decode.
    Decode(DecodeError),
    /// The `user_id` claim is absent or not a usable identifier.
    MissingUserId,
    /// No user has the embedded ID.
    UnknownUser,
    /// More than one user has the embedded ID.
    AmbiguousUser,
    /// A refresh token lacks its token string.
    MissingTokenString,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{e}"),
            Self::MissingUserId => write!(f, "missing user id"),
            Self::UnknownUser => write!(f, "user does not exist"),
            Self::AmbiguousUser => write!(f, "user id matches more than one user"),
            Self::MissingTokenString => write!(f, "missing token string"),
        }
    }
}

/// A token bound to a resolved user.
#[derive(Debug, Clone)]
pub struct UserToken<U> {
    token: Token,
    user: Result<U, Rejection>,
}

impl<U: Identity + Clone> UserToken<U> {
    /// Sign a token for `user`, with `extra` claims alongside `user_id`.
    pub fn encode(
        signer: &Signer,
        clock: &dyn TimeSource,
        user: &U,
        mut extra: Map<String, Value>,
        duration: Duration,
    ) -> Result<Self, AuthError> {
        extra.insert(USER_ID_CLAIM.to_string(), user.user_id().to_claim());
        let token = Token::encode(signer, clock, extra, duration)?;
        Ok(Self {
            token,
            user: Ok(user.clone()),
        })
    }

    /// Decode a token and resolve its subject.
    ///
    /// Never fails. Any decode or lookup problem produces an invalid token.
    pub fn decode<D>(signer: &Signer, directory: &D, encoding: impl Into<String>) -> Self
    where
        D: UserDirectory<User = U> + ?Sized,
    {
        let token = Token::decode(signer, encoding);
        let user = resolve(&token, directory);
        if let Err(rejection) = &user
            && token.is_valid()
        {
            tracing::debug!("rejected user token: {rejection}");
        }
        Self { token, user }
    }

    /// Mark the token invalid. Used by variants with additional required claims.
    pub(crate) fn reject(&mut self, rejection: Rejection) {
        self.user = Err(rejection);
    }

    /// Whether the base token is valid and resolved to exactly one user.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.user.is_ok()
    }

    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        self.user.as_ref().err()
    }

    /// The resolved user of a valid token.
    #[must_use]
    pub fn user(&self) -> Option<&U> {
        self.user.as_ref().ok()
    }

    /// The subject of a valid token.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user().map(Identity::user_id)
    }

    /// Payload of a valid token, including `user_id`.
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.valid_token().and_then(Token::data)
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<u64> {
        self.valid_token().and_then(Token::issued_at)
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.valid_token().and_then(Token::expires_at)
    }

    /// Whether the token has expired according to `clock`.
    ///
    /// # Errors
    /// `AuthError::InvalidState` if the token is not valid.
    pub fn expired(&self, clock: &dyn TimeSource) -> Result<bool, AuthError> {
        self.valid_token()
            .ok_or_else(|| AuthError::invalid_state("tested for expiration"))?
            .expired(clock)
    }

    #[must_use]
    pub fn encoding(&self) -> &str {
        self.token.encoding()
    }

    fn valid_token(&self) -> Option<&Token> {
        self.is_valid().then_some(&self.token)
    }
}

impl<U> fmt::Display for UserToken<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.token, f)
    }
}

fn resolve<D>(token: &Token, directory: &D) -> Result<D::User, Rejection>
where
    D: UserDirectory + ?Sized,
{
    let Some(data) = token.data() else {
        let reason = token.rejection().cloned().unwrap_or(DecodeError::Malformed);
        return Err(Rejection::Decode(reason));
    };
    let id = data
        .get(USER_ID_CLAIM)
        .and_then(UserId::from_claim)
        .ok_or(Rejection::MissingUserId)?;

    match directory.find_by_id(&id) {
        UserLookup::Found(user) => Ok(user),
        UserLookup::NotFound => Err(Rejection::UnknownUser),
        UserLookup::Ambiguous => {
            tracing::warn!(user_id = %id, "user id resolves to more than one user");
            Err(Rejection::AmbiguousUser)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::directory::MemoryDirectory;
    use crate::token::codec::Claims;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Member {
        id: u64,
        name: &'static str,
    }

    impl Identity for Member {
        fn user_id(&self) -> UserId {
            UserId::from(self.id)
        }
    }

    fn signer() -> Signer {
        Signer::new(b"abcd1234", Algorithm::HS256).expect("valid signer")
    }

    fn john() -> Member {
        Member { id: 1, name: "john" }
    }

    fn directory_with(members: &[Member]) -> MemoryDirectory<Member> {
        let directory = MemoryDirectory::new();
        for member in members {
            directory.insert(member.clone());
        }
        directory
    }

    fn sign_raw(payload: serde_json::Value) -> String {
        let Value::Object(map) = payload else {
            panic!("payload must be an object");
        };
        signer()
            .encode(&Claims::new(1_700_000_000, 300, map))
            .expect("encodes")
    }

    #[test]
    fn test_user_token_round_trip() {
        let clock = ManualTimeSource::default();
        let directory = directory_with(&[john()]);
        let token = UserToken::encode(&signer(), &clock, &john(), Map::new(), FIVE_MINUTES)
            .expect("encodes");
        assert!(token.is_valid());
        assert_eq!(token.user(), Some(&john()));

        let decoded = UserToken::decode(&signer(), &directory, token.encoding());
        assert!(decoded.is_valid());
        assert_eq!(decoded.user(), Some(&john()));
        assert_eq!(decoded.user_id(), Some(UserId::from(1)));
        assert!(!decoded.expired(&clock).expect("valid token"));
        assert_eq!(
            decoded.data().and_then(|d| d.get(USER_ID_CLAIM)),
            Some(&json!("1"))
        );
    }

    #[test]
    fn test_user_is_fetched_fresh_on_decode() {
        let clock = ManualTimeSource::default();
        let directory = directory_with(&[john()]);
        let token = UserToken::encode(&signer(), &clock, &john(), Map::new(), FIVE_MINUTES)
            .expect("encodes");

        directory.remove(&UserId::from(1));
        directory.insert(Member { id: 1, name: "johnny" });

        let decoded = UserToken::decode(&signer(), &directory, token.encoding());
        assert_eq!(decoded.user().map(|m| m.name), Some("johnny"));
    }

    #[test]
    fn test_numeric_user_id_claim_is_accepted() {
        let directory = directory_with(&[john()]);
        let encoding = sign_raw(json!({ "user_id": 1 }));

        let decoded = UserToken::decode(&signer(), &directory, encoding);
        assert_eq!(decoded.user(), Some(&john()));
    }

    #[test]
    fn test_missing_user_id() {
        let directory = directory_with(&[john()]);
        let encoding = sign_raw(json!({ "data": 42 }));

        let decoded = UserToken::decode(&signer(), &directory, encoding);
        assert!(!decoded.is_valid());
        assert_eq!(decoded.rejection(), Some(&Rejection::MissingUserId));
        assert!(decoded.data().is_none());
        assert!(matches!(
            decoded.expired(&ManualTimeSource::default()),
            Err(AuthError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_unknown_user() {
        let directory = directory_with(&[john()]);
        let encoding = sign_raw(json!({ "user_id": "1234" }));

        let decoded = UserToken::decode(&signer(), &directory, encoding);
        assert_eq!(decoded.rejection(), Some(&Rejection::UnknownUser));
    }

    #[test]
    fn test_ambiguous_user() {
        let directory = directory_with(&[john(), Member { id: 1, name: "impostor" }]);
        let encoding = sign_raw(json!({ "user_id": "1" }));

        let decoded = UserToken::decode(&signer(), &directory, encoding);
        assert!(!decoded.is_valid());
        assert_eq!(decoded.rejection(), Some(&Rejection::AmbiguousUser));
    }

    #[test]
    fn test_bad_encoding() {
        let directory = directory_with(&[john()]);
        let decoded = UserToken::decode(&signer(), &directory, "12345");

        assert_eq!(
            decoded.rejection(),
            Some(&Rejection::Decode(DecodeError::Malformed))
        );
        assert!(decoded.user().is_none());
        assert!(decoded.expires_at().is_none());
    }
}
