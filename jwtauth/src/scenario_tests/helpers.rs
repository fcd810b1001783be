//! Common helpers for scenario tests.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::Value;

use crate::clock::{ManualTimeSource, TimeSource};
use crate::config::Settings;
use crate::directory::{Identity, MemoryDirectory, UserId};
use crate::session::{AuthManager, CookieOp, CookieOps, IncomingTokens, Intent, SessionDecision};
use crate::store::MemoryRevocationStore;

pub const SECRET: &[u8] = b"scenario-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: u64,
    pub name: &'static str,
}

impl Identity for Member {
    fn user_id(&self) -> UserId {
        UserId::from(self.id)
    }
}

pub const fn alice() -> Member {
    Member { id: 1, name: "alice" }
}

pub const fn bob() -> Member {
    Member { id: 2, name: "bob" }
}

pub type Manager = AuthManager<MemoryDirectory<Member>, MemoryRevocationStore>;

/// An engine wired to in-memory collaborators and a manual clock.
pub struct Harness {
    pub manager: Manager,
    pub clock: Arc<ManualTimeSource>,
    pub directory: Arc<MemoryDirectory<Member>>,
    pub store: Arc<MemoryRevocationStore>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(alice());
        directory.insert(bob());
        let store = Arc::new(MemoryRevocationStore::new());
        let clock = Arc::new(ManualTimeSource::default());

        #[allow(clippy::expect_used)]
        let manager = AuthManager::with_clock(
            &Settings::new(SECRET),
            Arc::clone(&directory),
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
        )
        .expect("valid settings");

        Self {
            manager,
            clock,
            directory,
            store,
        }
    }

    /// Evaluate the cookies a browser would send.
    #[allow(clippy::expect_used)]
    pub fn evaluate(&self, browser: &Browser) -> SessionDecision<Member> {
        self.manager
            .evaluate(&browser.incoming())
            .expect("evaluation should not fail")
    }

    /// Run one full request cycle and let the browser store the response cookies.
    #[allow(clippy::expect_used)]
    pub fn request(
        &self,
        browser: &mut Browser,
        intent: Intent<Member>,
    ) -> (SessionDecision<Member>, CookieOps) {
        let decision = self.evaluate(browser);
        let ops = self
            .manager
            .finalize(decision.clone(), intent)
            .expect("finalize should not fail");
        browser.store(&ops);
        (decision, ops)
    }

    /// A browser holding a fresh session for `user`.
    pub fn logged_in(&self, user: Member) -> Browser {
        let mut browser = Browser::default();
        self.request(&mut browser, Intent::Login(user));
        browser
    }
}

/// Cookie jar of a single client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Browser {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Browser {
    #[must_use]
    pub fn incoming(&self) -> IncomingTokens {
        IncomingTokens::new(self.access.clone(), self.refresh.clone())
    }

    pub fn store(&mut self, ops: &CookieOps) {
        for op in ops {
            match op {
                CookieOp::SetAccess(value) => self.access = Some(value.clone()),
                CookieOp::SetRefresh(value) => self.refresh = Some(value.clone()),
                CookieOp::DeleteAccess => self.access = None,
                CookieOp::DeleteRefresh => self.refresh = None,
            }
        }
    }
}

/// Sign arbitrary JSON claims with `secret`, bypassing the claim checks of the
/// codec.
#[allow(clippy::expect_used)]
pub fn sign_claims(claims: &Value, secret: &[u8], header: &Header) -> String {
    jsonwebtoken::encode(header, claims, &EncodingKey::from_secret(secret)).expect("encodes")
}

/// Assemble a token from raw JSON segments and a literal signature.
pub fn craft(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{signature}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Flip one character in the middle of the signature segment.
#[allow(clippy::expect_used)]
pub fn tamper_signature(encoding: &str) -> String {
    let (head, signature) = encoding.rsplit_once('.').expect("three segments");
    let mut chars: Vec<char> = signature.chars().collect();
    let middle = chars.len() / 2;
    chars[middle] = if chars[middle] == 'A' { 'B' } else { 'A' };
    format!("{head}.{}", chars.into_iter().collect::<String>())
}
