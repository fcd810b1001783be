//! User lookup.
//!
//! User tokens carry a `user_id` claim that is resolved against a
//! [`UserDirectory`] every time a token is decoded. The directory answers with
//! exactly one user, none, or more than one; only the first makes a token valid.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

/// Identifier of a user as embedded in tokens.
///
/// Written to the `user_id` claim as a JSON string. Decoding also accepts a JSON
/// integer so tokens minted by issuers with numeric primary keys stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Create a user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The inner value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a user ID from a claim value.
    ///
    /// Returns `None` for anything other than a non-empty string or an integer.
    #[must_use]
    pub fn from_claim(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The claim value written into tokens.
    #[must_use]
    pub fn to_claim(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Anything that can be the subject of a user token.
pub trait Identity {
    /// The identifier written into the `user_id` claim.
    fn user_id(&self) -> UserId;
}

/// Outcome of looking a user up by ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup<U> {
    /// Exactly one user matched.
    Found(U),
    /// No user matched.
    NotFound,
    /// More than one user matched; the identity store is inconsistent.
    Ambiguous,
}

/// The user-lookup collaborator consulted when decoding user tokens.
///
/// Implementations are shared across concurrent requests.
pub trait UserDirectory: Send + Sync {
    /// The user type tokens resolve to.
    type User: Identity + Clone + Send + Sync;

    /// Look a user up by ID.
    fn find_by_id(&self, id: &UserId) -> UserLookup<Self::User>;
}

/// In-memory user directory.
///
/// Duplicate IDs are stored as given, so an inconsistent identity store can be
/// reproduced in tests.
#[derive(Debug)]
pub struct MemoryDirectory<U> {
    users: RwLock<Vec<U>>,
}

impl<U> MemoryDirectory<U> {
    /// Create an empty directory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            users: RwLock::new(Vec::new()),
        }
    }
}

impl<U: Identity + Clone> MemoryDirectory<U> {
    /// Add a user.
    pub fn insert(&self, user: U) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(user);
    }

    /// Remove every user with the given ID.
    pub fn remove(&self, id: &UserId) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|user| &user.user_id() != id);
    }

    /// Look a user up by an arbitrary predicate, e.g. a username.
    pub fn find_by<P>(&self, predicate: P) -> UserLookup<U>
    where
        P: Fn(&U) -> bool,
    {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches = users.iter().filter(|user| predicate(user));
        match (matches.next(), matches.next()) {
            (Some(user), None) => UserLookup::Found(user.clone()),
            (None, _) => UserLookup::NotFound,
            (Some(_), Some(_)) => UserLookup::Ambiguous,
        }
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<U> Default for MemoryDirectory<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> UserDirectory for MemoryDirectory<U>
where
    U: Identity + Clone + Send + Sync,
{
    type User = U;

    fn find_by_id(&self, id: &UserId) -> UserLookup<U> {
        self.find_by(|user| &user.user_id() == id)
    }
}
