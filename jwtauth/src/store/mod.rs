//! Server-side refresh token state.
//!
//! Two tables keyed by token string: the active set (refresh tokens the server
//! issued and persisted) and the blacklist (revoked refresh tokens). Records are
//! only ever written through `RefreshToken::save` and `RefreshToken::blacklist`.

pub mod memory;
pub mod sweep;

pub use memory::MemoryRevocationStore;
pub use sweep::spawn_sweep_task;

use crate::directory::UserId;

/// A persisted, live refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRecord {
    pub token_string: String,
    pub owner: UserId,
    pub expires_at: u64,
}

/// A revoked refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistRecord {
    pub token_string: String,
    pub expires_at: u64,
}

/// Counts returned by [`RevocationStore::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub active_removed: usize,
    pub blacklisted_removed: usize,
}

/// Error returned by revocation store operations.
#[derive(Debug)]
pub enum StoreError {
    /// A lock guarding the tables was poisoned by a panicking writer.
    LockPoisoned,
    /// A different active record with this token string already exists.
    Duplicate,
    /// A backend-specific failure.
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockPoisoned => write!(f, "store lock poisoned"),
            Self::Duplicate => write!(f, "token string already active"),
            Self::Backend(reason) => write!(f, "store backend failed: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence contract for refresh token revocation.
///
/// # Invariants
/// - Token strings are unique per table.
/// - Every method is atomic with respect to concurrent callers.
/// - Inserting a blacklist record for a string that is already blacklisted
///   succeeds and leaves a single record.
pub trait RevocationStore: Send + Sync {
    /// Whether an active record exists for `token_string`.
    fn is_active(&self, token_string: &str) -> Result<bool, StoreError>;

    /// Whether a blacklist record exists for `token_string`.
    fn is_blacklisted(&self, token_string: &str) -> Result<bool, StoreError>;

    /// Insert the active record for `record.token_string`. Re-inserting an
    /// identical record is a no-op.
    ///
    /// # Errors
    /// `StoreError::Duplicate` if a different record already holds the string,
    /// whoever owns it.
    fn insert_active(&self, record: ActiveRecord) -> Result<(), StoreError>;

    /// Remove the active record for `token_string`, if any.
    fn delete_active(&self, token_string: &str) -> Result<(), StoreError>;

    /// Insert or overwrite the blacklist record for `record.token_string`.
    fn insert_blacklisted(&self, record: BlacklistRecord) -> Result<(), StoreError>;

    /// Remove every record whose `expires_at` is at or before `now`.
    fn purge_expired(&self, now: u64) -> Result<PurgeResult, StoreError>;
}
