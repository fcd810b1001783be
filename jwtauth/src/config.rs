//! Configuration loading.
//!
//! [`Settings`] is the explicit configuration value handed to the token codec and
//! the session engine. There is no global settings object: reloading means
//! building a new [`AuthManager`](crate::session::AuthManager) from a new
//! `Settings`.
//!
//! # Environment Variables
//!
//! - `JWTAUTH_SIGNING_KEY`: shared HMAC secret (required)
//! - `JWTAUTH_ALGORITHM`: `HS256`, `HS384` or `HS512` (default: `HS256`)
//! - `JWTAUTH_ACCESS_TOKEN_LIFETIME_SECS`: access token lifetime (default: `300`)
//! - `JWTAUTH_REFRESH_TOKEN_LIFETIME_SECS`: refresh token lifetime (default: `86400`)
//! - `JWTAUTH_ACCESS_TOKEN_COOKIE_NAME`: (default: `access_token`)
//! - `JWTAUTH_REFRESH_TOKEN_COOKIE_NAME`: (default: `refresh_token`)
//! - `JWTAUTH_TOKEN_STRING_LENGTH`: refresh token-string length (default: `30`)
//!
//! The demo server additionally reads:
//!
//! - `JWTAUTH_LISTEN_PORT`: (default: `3000`)
//! - `JWTAUTH_DEBUG`: `true`/`1` drops the `Secure` cookie flag (default: `false`)
//! - `JWTAUTH_ACCOUNTS`: comma separated `username:password` pairs
//! - `JWTAUTH_SWEEP_INTERVAL_SECS`: expired-record sweep period (default: `3600`)
//!
//! # Invariants
//!
//! - `signing_key` is never empty
//! - `algorithm` is always an HMAC algorithm
//! - both cookie names are non-empty and distinct

use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::token::codec::parse_algorithm;

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Token and cookie settings consumed by the core.
#[derive(Clone)]
pub struct Settings {
    /// Shared secret for signing and verifying every token.
    pub signing_key: Vec<u8>,
    /// The single accepted signing algorithm.
    pub algorithm: Algorithm,
    /// Default lifetime of access tokens.
    pub access_token_lifetime: Duration,
    /// Default lifetime of refresh tokens.
    pub refresh_token_lifetime: Duration,
    /// Cookie carrying the access token.
    pub access_token_cookie_name: String,
    /// Cookie carrying the refresh token.
    pub refresh_token_cookie_name: String,
    /// Length of the random token string embedded in refresh tokens.
    pub token_string_length: usize,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("signing_key", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("access_token_cookie_name", &self.access_token_cookie_name)
            .field("refresh_token_cookie_name", &self.refresh_token_cookie_name)
            .field("token_string_length", &self.token_string_length)
            .finish()
    }
}

impl Settings {
    /// Default access token lifetime (5 minutes).
    pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);
    /// Default refresh token lifetime (1 day).
    pub const DEFAULT_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
    /// Default access token cookie name.
    pub const DEFAULT_ACCESS_TOKEN_COOKIE_NAME: &'static str = "access_token";
    /// Default refresh token cookie name.
    pub const DEFAULT_REFRESH_TOKEN_COOKIE_NAME: &'static str = "refresh_token";
    /// Default refresh token-string length.
    pub const DEFAULT_TOKEN_STRING_LENGTH: usize = 30;
    /// Accepted token-string lengths. The upper bound matches the storage column
    /// width used by SQL-backed stores.
    pub const TOKEN_STRING_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 16..=255;

    /// Settings with the given secret and every other field at its default.
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            algorithm: Algorithm::HS256,
            access_token_lifetime: Self::DEFAULT_ACCESS_TOKEN_LIFETIME,
            refresh_token_lifetime: Self::DEFAULT_REFRESH_TOKEN_LIFETIME,
            access_token_cookie_name: Self::DEFAULT_ACCESS_TOKEN_COOKIE_NAME.to_string(),
            refresh_token_cookie_name: Self::DEFAULT_REFRESH_TOKEN_COOKIE_NAME.to_string(),
            token_string_length: Self::DEFAULT_TOKEN_STRING_LENGTH,
        }
    }

    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWTAUTH_SIGNING_KEY` is not set or is empty
    /// - any optional variable is set to an unparsable or out-of-range value
    /// - the two cookie names collide
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_key = load_signing_key(&lookup)?;
        let algorithm = load_algorithm(&lookup)?;
        let access_token_lifetime = load_secs(
            &lookup,
            "JWTAUTH_ACCESS_TOKEN_LIFETIME_SECS",
            Self::DEFAULT_ACCESS_TOKEN_LIFETIME,
        )?;
        let refresh_token_lifetime = load_secs(
            &lookup,
            "JWTAUTH_REFRESH_TOKEN_LIFETIME_SECS",
            Self::DEFAULT_REFRESH_TOKEN_LIFETIME,
        )?;
        let access_token_cookie_name = load_cookie_name(
            &lookup,
            "JWTAUTH_ACCESS_TOKEN_COOKIE_NAME",
            Self::DEFAULT_ACCESS_TOKEN_COOKIE_NAME,
        )?;
        let refresh_token_cookie_name = load_cookie_name(
            &lookup,
            "JWTAUTH_REFRESH_TOKEN_COOKIE_NAME",
            Self::DEFAULT_REFRESH_TOKEN_COOKIE_NAME,
        )?;
        if access_token_cookie_name == refresh_token_cookie_name {
            return Err(ConfigError::InvalidValue {
                name: "JWTAUTH_REFRESH_TOKEN_COOKIE_NAME".to_string(),
                message: "must differ from the access token cookie name".to_string(),
            });
        }
        let token_string_length = load_token_string_length(&lookup)?;

        Ok(Self {
            signing_key,
            algorithm,
            access_token_lifetime,
            refresh_token_lifetime,
            access_token_cookie_name,
            refresh_token_cookie_name,
            token_string_length,
        })
    }
}

/// Username/password pair accepted by the demo server's login route.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AccountSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountSpec({}, [REDACTED])", self.username)
    }
}

/// Configuration of the demo HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Core token settings.
    pub settings: Settings,
    /// Port to listen on.
    pub listen_port: u16,
    /// Development mode: cookies are sent without the `Secure` flag.
    pub debug: bool,
    /// Accounts the login route accepts.
    pub accounts: Vec<AccountSpec>,
    /// How often expired revocation records are purged.
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 3000;
    /// Default sweep interval (1 hour).
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the token settings are invalid, if `JWTAUTH_LISTEN_PORT`
    /// is not a port number, if `JWTAUTH_DEBUG` is not a boolean, or if an entry of
    /// `JWTAUTH_ACCOUNTS` is not of the form `username:password`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Settings::from_lookup(&lookup)?;
        let listen_port = load_listen_port(&lookup)?;
        let debug = load_debug(&lookup)?;
        let accounts = load_accounts(&lookup)?;
        let sweep_interval = load_secs(
            &lookup,
            "JWTAUTH_SWEEP_INTERVAL_SECS",
            Self::DEFAULT_SWEEP_INTERVAL,
        )?;
        if sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "JWTAUTH_SWEEP_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            settings,
            listen_port,
            debug,
            accounts,
            sweep_interval,
        })
    }
}

fn load_signing_key<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<Vec<u8>, ConfigError> {
    let key = lookup("JWTAUTH_SIGNING_KEY")
        .ok_or_else(|| ConfigError::MissingEnvVar("JWTAUTH_SIGNING_KEY".to_string()))?;

    if key.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: "JWTAUTH_SIGNING_KEY".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    Ok(key.into_bytes())
}

fn load_algorithm<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<Algorithm, ConfigError> {
    match lookup("JWTAUTH_ALGORITHM") {
        Some(value) => parse_algorithm(&value).ok_or_else(|| ConfigError::InvalidValue {
            name: "JWTAUTH_ALGORITHM".to_string(),
            message: format!("'{value}' is not one of HS256, HS384, HS512"),
        }),
        None => Ok(Algorithm::HS256),
    }
}

fn load_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a whole number of seconds"),
            }),
        None => Ok(default),
    }
}

fn load_cookie_name<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(default.to_string());
    };

    // RFC 6265 token: visible ASCII without separators.
    let valid = !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        });
    if !valid {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a valid cookie name"),
        });
    }

    Ok(value)
}

fn load_token_string_length<F: Fn(&str) -> Option<String>>(
    lookup: &F,
) -> Result<usize, ConfigError> {
    let Some(value) = lookup("JWTAUTH_TOKEN_STRING_LENGTH") else {
        return Ok(Settings::DEFAULT_TOKEN_STRING_LENGTH);
    };

    match value.parse::<usize>() {
        Ok(length) if Settings::TOKEN_STRING_LENGTH_RANGE.contains(&length) => Ok(length),
        _ => Err(ConfigError::InvalidValue {
            name: "JWTAUTH_TOKEN_STRING_LENGTH".to_string(),
            message: format!(
                "'{value}' must be a number between {} and {}",
                Settings::TOKEN_STRING_LENGTH_RANGE.start(),
                Settings::TOKEN_STRING_LENGTH_RANGE.end()
            ),
        }),
    }
}

fn load_listen_port<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<u16, ConfigError> {
    match lookup("JWTAUTH_LISTEN_PORT") {
        Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            name: "JWTAUTH_LISTEN_PORT".to_string(),
            message: format!("'{value}' is not a valid port number (must be 1-65535)"),
        }),
        None => Ok(ServerConfig::DEFAULT_PORT),
    }
}

fn load_debug<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<bool, ConfigError> {
    match lookup("JWTAUTH_DEBUG").as_deref() {
        None | Some("" | "0" | "false") => Ok(false),
        Some("1" | "true") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            name: "JWTAUTH_DEBUG".to_string(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

fn load_accounts<F: Fn(&str) -> Option<String>>(
    lookup: &F,
) -> Result<Vec<AccountSpec>, ConfigError> {
    let Some(value) = lookup("JWTAUTH_ACCOUNTS") else {
        return Ok(Vec::new());
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((username, password)) if !username.is_empty() && !password.is_empty() => {
                Ok(AccountSpec {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidValue {
                name: "JWTAUTH_ACCOUNTS".to_string(),
                message: "entries must look like 'username:password'".to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let settings =
            Settings::from_lookup(lookup_from(&[("JWTAUTH_SIGNING_KEY", "abcd1234")]))
                .expect("valid settings");

        assert_eq!(settings.signing_key, b"abcd1234");
        assert_eq!(settings.algorithm, Algorithm::HS256);
        assert_eq!(settings.access_token_lifetime, Duration::from_secs(300));
        assert_eq!(settings.refresh_token_lifetime, Duration::from_secs(86_400));
        assert_eq!(settings.access_token_cookie_name, "access_token");
        assert_eq!(settings.refresh_token_cookie_name, "refresh_token");
        assert_eq!(settings.token_string_length, 30);
    }

    #[test]
    fn test_missing_signing_key() {
        let result = Settings::from_lookup(lookup_from(&[]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingEnvVar("JWTAUTH_SIGNING_KEY".to_string())
        );
    }

    #[test]
    fn test_empty_signing_key() {
        let result = Settings::from_lookup(lookup_from(&[("JWTAUTH_SIGNING_KEY", "")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_ALGORITHM", "HS512"),
            ("JWTAUTH_ACCESS_TOKEN_LIFETIME_SECS", "60"),
            ("JWTAUTH_REFRESH_TOKEN_LIFETIME_SECS", "3600"),
            ("JWTAUTH_ACCESS_TOKEN_COOKIE_NAME", "acc"),
            ("JWTAUTH_REFRESH_TOKEN_COOKIE_NAME", "ref"),
            ("JWTAUTH_TOKEN_STRING_LENGTH", "40"),
        ]))
        .expect("valid settings");

        assert_eq!(settings.algorithm, Algorithm::HS512);
        assert_eq!(settings.access_token_lifetime, Duration::from_secs(60));
        assert_eq!(settings.refresh_token_lifetime, Duration::from_secs(3600));
        assert_eq!(settings.access_token_cookie_name, "acc");
        assert_eq!(settings.refresh_token_cookie_name, "ref");
        assert_eq!(settings.token_string_length, 40);
    }

    #[test]
    fn test_rejects_asymmetric_and_none_algorithms() {
        for alg in ["RS256", "ES256", "none", "None", "hs256x"] {
            let result = Settings::from_lookup(lookup_from(&[
                ("JWTAUTH_SIGNING_KEY", "secret"),
                ("JWTAUTH_ALGORITHM", alg),
            ]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref name, .. }) if name == "JWTAUTH_ALGORITHM"),
                "{alg} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_lifetime() {
        let result = Settings::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_ACCESS_TOKEN_LIFETIME_SECS", "-5"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_colliding_cookie_names() {
        let result = Settings::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_ACCESS_TOKEN_COOKIE_NAME", "token"),
            ("JWTAUTH_REFRESH_TOKEN_COOKIE_NAME", "token"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_invalid_cookie_name() {
        let result = Settings::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_ACCESS_TOKEN_COOKIE_NAME", "bad name;"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_short_token_string_length() {
        let result = Settings::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_TOKEN_STRING_LENGTH", "8"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_server_config() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_LISTEN_PORT", "8080"),
            ("JWTAUTH_DEBUG", "true"),
            ("JWTAUTH_ACCOUNTS", "john:abc12345#, paul:let-it-be"),
        ]))
        .expect("valid config");

        assert_eq!(config.listen_port, 8080);
        assert!(config.debug);
        assert_eq!(config.sweep_interval, ServerConfig::DEFAULT_SWEEP_INTERVAL);
        assert_eq!(
            config.accounts,
            vec![
                AccountSpec {
                    username: "john".to_string(),
                    password: "abc12345#".to_string(),
                },
                AccountSpec {
                    username: "paul".to_string(),
                    password: "let-it-be".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_server_config_bad_account() {
        let result = ServerConfig::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_ACCOUNTS", "john"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_server_config_bad_port() {
        let result = ServerConfig::from_lookup(lookup_from(&[
            ("JWTAUTH_SIGNING_KEY", "secret"),
            ("JWTAUTH_LISTEN_PORT", "99999"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let settings = Settings::new("super-secret");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert_eq!(
            error.to_string(),
            "missing required environment variable: TEST_VAR"
        );

        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
