// Life of a request:
// 1. The transport reads the access/refresh cookie pair
// 2. `AuthManager::evaluate` decodes both tokens:
//     - signature, algorithm and required claims (codec)
//     - subject lookup (directory)
//     - refresh token revocation check (store)
//    and decides: anonymous, authenticated, silently refreshed, or failed
// 3. The handler runs and picks an intent: keep, login or logout
// 4. `AuthManager::finalize` performs store writes for that intent and returns
//    the cookie changes the transport renders onto the response
//
// System components:
//  - Token codec and token kinds
//  - Revocation store (active set + blacklist)
//  - Session decision engine
//  - Cookie transport and HTTP routes

pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod server;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;

mod scenario_tests;

pub use config::{ConfigError, ServerConfig, Settings};
pub use directory::{Identity, MemoryDirectory, UserDirectory, UserId, UserLookup};
pub use error::AuthError;
pub use session::{AuthManager, AuthState, CookieOp, CookieOps, IncomingTokens, Intent, SessionDecision};
pub use store::{MemoryRevocationStore, RevocationStore, StoreError};
pub use token::{AccessToken, RefreshToken, Signer};
pub use transport::CookieTransport;
