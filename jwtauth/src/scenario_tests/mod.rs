//! Scenario tests for the session lifecycle.
//!
//! Each file covers one scenario end to end: a simulated browser carries
//! cookies between requests, the engine runs against in-memory collaborators,
//! and time is driven by a manual clock.

#![cfg(test)]

mod helpers;

mod test_algorithm_confusion;
mod test_blacklist_precedence;
mod test_double_expiry;
mod test_forged_pair;
mod test_http_routes;
mod test_login;
mod test_logout;
mod test_missing_claims;
mod test_refresh_uniqueness;
mod test_round_trip;
mod test_silent_refresh;
