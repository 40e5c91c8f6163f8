//! # Configuration Management
//!
//! Configuration comes from the environment ("12-factor app" style), with a
//! `.env` file loaded first when present.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite database connection string
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL); the RP ID is its host
//! - `RP_NAME`: Human-readable name for your service
//! - `REGISTRATION_CHALLENGE_TTL_SECS`: Lifetime of a registration challenge (default: 600, max: 86400)
//! - `AUTHENTICATION_CHALLENGE_TTL_SECS`: Lifetime of an authentication challenge (default: 300, max: 86400)
//! - `CHALLENGE_REAP_INTERVAL_SECS`: How often expired challenges are purged (default: 600)

use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Upper bound for either challenge lifetime
pub const MAX_CHALLENGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Application configuration
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: Your application/website that relies on authentication
/// - **RP ID**: Your domain name (e.g., "example.com" or "localhost"), taken from the origin
/// - **RP Origin**: Full URL of your application (e.g., "https://example.com")
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database connection URL
    /// Format: "sqlite:filename.db?mode=rwc" (read, write, create if missing)
    pub database_url: String,

    /// WebAuthn Relying Party Origin, e.g. "http://localhost:8080"
    pub rp_origin: String,

    /// Human-readable name shown to users during passkey creation
    pub rp_name: String,

    /// Registration challenges tolerate slow external security key prompts
    pub registration_challenge_ttl: Duration,

    /// Authentication challenges are not bound to an account, so they stay short
    pub authentication_challenge_ttl: Duration,

    /// Interval of the background task deleting expired challenge rows
    pub challenge_reap_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey.db?mode=rwc
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=Passkey Demo
    /// AUTHENTICATION_CHALLENGE_TTL_SECS=300
    /// ```
    pub fn from_env() -> Result<Self> {
        // dotenvy doesn't error if the file is missing
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    ///
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            host: var("HOST", "127.0.0.1"),
            port: var("PORT", "8080")
                .parse()
                .context("PORT must be a valid port number")?,
            database_url: var("DATABASE_URL", "sqlite:passkey.db?mode=rwc"),
            rp_origin: var("RP_ORIGIN", "http://localhost:8080"),
            rp_name: var("RP_NAME", "Passkey Demo"),
            registration_challenge_ttl: seconds(&var("REGISTRATION_CHALLENGE_TTL_SECS", "600"))
                .context("REGISTRATION_CHALLENGE_TTL_SECS")?,
            authentication_challenge_ttl: seconds(&var("AUTHENTICATION_CHALLENGE_TTL_SECS", "300"))
                .context("AUTHENTICATION_CHALLENGE_TTL_SECS")?,
            challenge_reap_interval: seconds(&var("CHALLENGE_REAP_INTERVAL_SECS", "600"))
                .context("CHALLENGE_REAP_INTERVAL_SECS")?,
        };

        for (key, ttl) in [
            ("REGISTRATION_CHALLENGE_TTL_SECS", config.registration_challenge_ttl),
            ("AUTHENTICATION_CHALLENGE_TTL_SECS", config.authentication_challenge_ttl),
        ] {
            if ttl > MAX_CHALLENGE_TTL {
                return Err(anyhow!(
                    "{} must be at most {} seconds",
                    key,
                    MAX_CHALLENGE_TTL.as_secs()
                ));
            }
        }

        if config.challenge_reap_interval.is_zero() {
            return Err(anyhow!("CHALLENGE_REAP_INTERVAL_SECS must be greater than zero"));
        }

        Ok(config)
    }

    /// Get the socket address to bind the server to, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the relying party the ceremonies are bound to
    pub fn relying_party(&self) -> Result<RelyingParty> {
        RelyingParty::new(&self.rp_name, &self.rp_origin)
    }

    pub fn challenge_ttls(&self) -> ChallengeTtls {
        ChallengeTtls {
            registration: self.registration_challenge_ttl,
            authentication: self.authentication_challenge_ttl,
        }
    }
}

fn seconds(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a number of seconds", raw))?;
    Ok(Duration::from_secs(secs))
}

/// The service credentials are bound to
///
/// The RP ID is never configured separately: it is the host of the origin,
/// so the two can't drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    /// Display name, e.g. "Passkey Demo"
    pub name: String,
    /// Effective domain, e.g. "example.com"
    pub id: String,
    /// Serialized origin as the browser reports it, e.g. "https://example.com"
    pub origin: String,
}

impl RelyingParty {
    pub fn new(name: &str, origin: &str) -> Result<Self> {
        let url = Url::parse(origin.trim())
            .with_context(|| format!("invalid RP_ORIGIN '{}'", origin))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("RP_ORIGIN must use http or https, got '{}'", url.scheme()));
        }

        let id = url
            .host_str()
            .ok_or_else(|| anyhow!("RP_ORIGIN '{}' has no host", origin))?
            .to_string();

        Ok(RelyingParty {
            name: name.to_string(),
            id,
            // No trailing slash, default ports dropped: matches clientDataJSON.origin
            origin: url.origin().ascii_serialization(),
        })
    }
}

/// Lifetimes of the two challenge namespaces
#[derive(Debug, Clone, Copy)]
pub struct ChallengeTtls {
    pub registration: Duration,
    pub authentication: Duration,
}

impl Default for ChallengeTtls {
    fn default() -> Self {
        ChallengeTtls {
            registration: Duration::from_secs(600),
            authentication: Duration::from_secs(300),
        }
    }
}
