//! Signed tokens.
//!
//! Layers, innermost first:
//! - `codec`: JWT encode/verify of a claim bundle
//! - `base`: a token plus expiry evaluation
//! - `user`: a token bound to a resolved user
//! - `access` / `refresh`: the two token kinds exchanged with clients

pub mod access;
pub mod base;
pub mod codec;
pub mod refresh;
pub mod user;

pub use access::AccessToken;
pub use base::Token;
pub use codec::{Claims, DecodeError, Signer, SignerError};
pub use refresh::RefreshToken;
pub use user::{Rejection, UserToken};
