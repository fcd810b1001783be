//! Cookie transport for the session engine.
//!
//! Reads the token pair out of `Cookie` request headers and renders
//! [`CookieOps`] as `Set-Cookie` response headers. Cookies are always
//! `HttpOnly; SameSite=Strict; Path=/`, and `Secure` unless running in debug.

use axum::http::header::{COOKIE, InvalidHeaderValue, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};

use crate::config::Settings;
use crate::session::{CookieOp, CookieOps, IncomingTokens, SessionDecision};

const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Maps the token pair to and from HTTP cookies.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    access_name: String,
    refresh_name: String,
    secure: bool,
}

impl CookieTransport {
    /// Cookie names come from `settings`; `secure` adds the `Secure` attribute.
    #[must_use]
    pub fn new(settings: &Settings, secure: bool) -> Self {
        Self {
            access_name: settings.access_token_cookie_name.clone(),
            refresh_name: settings.refresh_token_cookie_name.clone(),
            secure,
        }
    }

    /// Extract the raw token encodings from the request cookies.
    ///
    /// When a name appears more than once the first occurrence wins.
    #[must_use]
    pub fn read_tokens(&self, headers: &HeaderMap) -> IncomingTokens {
        let mut tokens = IncomingTokens::default();
        for (name, value) in request_cookies(headers) {
            if name == self.access_name && tokens.access.is_none() {
                tokens.access = Some(value.to_owned());
            } else if name == self.refresh_name && tokens.refresh.is_none() {
                tokens.refresh = Some(value.to_owned());
            }
        }
        tokens
    }

    /// Append one `Set-Cookie` header per operation.
    pub fn apply(&self, ops: &CookieOps, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        for op in ops {
            let cookie = match op {
                CookieOp::SetAccess(value) => self.set_cookie(&self.access_name, value),
                CookieOp::SetRefresh(value) => self.set_cookie(&self.refresh_name, value),
                CookieOp::DeleteAccess => self.delete_cookie(&self.access_name),
                CookieOp::DeleteRefresh => self.delete_cookie(&self.refresh_name),
            };
            headers.append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
        }
        Ok(())
    }

    fn set_cookie(&self, name: &str, value: &str) -> String {
        format!("{name}={value}; {}", self.attributes())
    }

    fn delete_cookie(&self, name: &str) -> String {
        format!(
            "{name}=\"\"; Expires={EXPIRED_DATE}; Max-Age=0; {}",
            self.attributes()
        )
    }

    fn attributes(&self) -> &'static str {
        if self.secure {
            "Path=/; HttpOnly; SameSite=Strict; Secure"
        } else {
            "Path=/; HttpOnly; SameSite=Strict"
        }
    }
}

/// The authenticated user, or `403 Forbidden` for anonymous and rejected
/// requests alike.
pub const fn require_user<U>(decision: &SessionDecision<U>) -> Result<&U, StatusCode> {
    match decision.user() {
        Some(user) => Ok(user),
        None => Err(StatusCode::FORBIDDEN),
    }
}

fn request_cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.trim(), value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(secure: bool) -> CookieTransport {
        CookieTransport::new(&Settings::new("abcd1234"), secure)
    }

    fn headers_with_cookies(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(COOKIE, HeaderValue::from_str(cookie).expect("valid header"));
        }
        headers
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().expect("ascii").to_string())
            .collect()
    }

    #[test]
    fn test_read_tokens() {
        let headers = headers_with_cookies(&["theme=dark; access_token=a.b.c; refresh_token=d.e.f"]);
        let tokens = transport(true).read_tokens(&headers);

        assert_eq!(tokens.access.as_deref(), Some("a.b.c"));
        assert_eq!(tokens.refresh.as_deref(), Some("d.e.f"));
    }

    #[test]
    fn test_read_tokens_across_headers() {
        let headers = headers_with_cookies(&["access_token=a.b.c", "refresh_token=\"d.e.f\""]);
        let tokens = transport(true).read_tokens(&headers);

        assert_eq!(tokens.access.as_deref(), Some("a.b.c"));
        assert_eq!(tokens.refresh.as_deref(), Some("d.e.f"));
    }

    #[test]
    fn test_read_tokens_first_occurrence_wins() {
        let headers = headers_with_cookies(&["access_token=first; access_token=second"]);
        let tokens = transport(true).read_tokens(&headers);

        assert_eq!(tokens.access.as_deref(), Some("first"));
        assert_eq!(tokens.refresh, None);
    }

    #[test]
    fn test_read_tokens_without_cookies() {
        let tokens = transport(true).read_tokens(&HeaderMap::new());
        assert_eq!(tokens, IncomingTokens::default());
    }

    #[test]
    fn test_read_tokens_honours_configured_names() {
        let mut settings = Settings::new("abcd1234");
        settings.access_token_cookie_name = "at".to_string();
        settings.refresh_token_cookie_name = "rt".to_string();
        let transport = CookieTransport::new(&settings, true);

        let headers = headers_with_cookies(&["access_token=x; at=a.b.c; rt=d.e.f"]);
        let tokens = transport.read_tokens(&headers);
        assert_eq!(tokens.access.as_deref(), Some("a.b.c"));
        assert_eq!(tokens.refresh.as_deref(), Some("d.e.f"));
    }

    #[test]
    fn test_set_cookies_are_secure() {
        let mut headers = HeaderMap::new();
        let ops: CookieOps = [
            CookieOp::SetAccess("a.b.c".to_string()),
            CookieOp::SetRefresh("d.e.f".to_string()),
        ]
        .into_iter()
        .collect();
        transport(true).apply(&ops, &mut headers).expect("valid header");

        assert_eq!(
            set_cookies(&headers),
            vec![
                "access_token=a.b.c; Path=/; HttpOnly; SameSite=Strict; Secure".to_string(),
                "refresh_token=d.e.f; Path=/; HttpOnly; SameSite=Strict; Secure".to_string(),
            ]
        );
    }

    #[test]
    fn test_debug_cookies_are_not_secure() {
        let mut headers = HeaderMap::new();
        let ops: CookieOps = std::iter::once(CookieOp::SetAccess("a.b.c".to_string())).collect();
        transport(false).apply(&ops, &mut headers).expect("valid header");

        assert_eq!(
            set_cookies(&headers),
            vec!["access_token=a.b.c; Path=/; HttpOnly; SameSite=Strict".to_string()]
        );
    }

    #[test]
    fn test_delete_cookies_expire_immediately() {
        let mut headers = HeaderMap::new();
        let ops: CookieOps = [CookieOp::DeleteAccess, CookieOp::DeleteRefresh]
            .into_iter()
            .collect();
        transport(true).apply(&ops, &mut headers).expect("valid header");

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("access_token=\"\"; "));
        assert!(cookies[1].starts_with("refresh_token=\"\"; "));
        for cookie in &cookies {
            assert!(cookie.contains("Max-Age=0"));
            assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        }
    }

    #[test]
    fn test_control_characters_are_rejected() {
        let mut headers = HeaderMap::new();
        let ops: CookieOps =
            std::iter::once(CookieOp::SetAccess("bad\nvalue".to_string())).collect();
        assert!(transport(true).apply(&ops, &mut headers).is_err());
    }
}
