//! Gateway configuration.
//!
//! [`GatewayConfig`] holds everything the server needs before it can accept
//! a request: the listen address, the credential store contents, the region
//! it reports, TLS material and logging preferences. Values come from the
//! environment via [`GatewayConfig::from_env`] and are overridden by CLI
//! flags in the server binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Errors reported by [`GatewayConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A certificate was given without a private key.
    #[error("TLS cert specified without key file")]
    CertWithoutKey,
    /// A private key was given without a certificate.
    #[error("TLS key specified without cert file")]
    KeyWithoutCert,
    /// The admin access/secret pair is incomplete.
    #[error("root user access and secret key must be provided")]
    MissingAdminCredentials,
    /// An `S3GW_ACCOUNTS` entry is not `access:secret`.
    #[error("invalid account entry '{0}', expected access:secret")]
    InvalidAccount(String),
    /// The listen address cannot be parsed.
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),
}

/// A non-admin account loaded into the credential store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Gateway configuration.
///
/// # Examples
///
/// ```
/// use s3gw_core::config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.listen, ":7070");
/// assert_eq!(config.region, "us-east-1");
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Listen address, `<ip>:<port>` or `:<port>`.
    #[builder(default = String::from(":7070"), setter(into))]
    pub listen: String,

    /// Admin access key id.
    #[builder(default, setter(strip_option, into))]
    pub admin_access_key: Option<String>,

    /// Admin secret access key.
    #[builder(default, setter(strip_option, into))]
    pub admin_secret_key: Option<String>,

    /// Region reported by GetBucketLocation and expected in credential scopes.
    #[builder(default = String::from("us-east-1"), setter(into))]
    pub region: String,

    /// Additional non-admin accounts.
    #[builder(default)]
    #[serde(default)]
    pub accounts: Vec<Account>,

    /// PEM certificate chain for TLS.
    #[builder(default, setter(strip_option, into))]
    pub cert_file: Option<String>,

    /// PEM private key for TLS.
    #[builder(default, setter(strip_option, into))]
    pub key_file: Option<String>,

    /// Largest accepted distance between a request's timestamp and now.
    #[builder(default = 900)]
    pub max_clock_skew_secs: u64,

    /// Base domain for virtual-hosted-style addressing.
    #[builder(default = String::from("localhost"), setter(into))]
    pub domain: String,

    /// Whether `<bucket>.<domain>` hosts are recognized.
    #[builder(default = false)]
    pub virtual_hosting: bool,

    /// Default log filter when `RUST_LOG` is unset.
    #[builder(default = String::from("info"), setter(into))]
    pub log_level: String,

    /// Emit JSON log lines.
    #[builder(default = false)]
    pub log_json: bool,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen", &self.listen)
            .field("admin_access_key", &self.admin_access_key)
            .field(
                "admin_secret_key",
                &self.admin_secret_key.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("accounts", &self.accounts)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .field("domain", &self.domain)
            .field("virtual_hosting", &self.virtual_hosting)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3GW_PORT` | `:7070` |
    /// | `ADMIN_ACCESS_KEY_ID` / `ADMIN_ACCESS_KEY` | unset |
    /// | `ADMIN_SECRET_ACCESS_KEY` / `ADMIN_SECRET_KEY` | unset |
    /// | `S3GW_REGION` | `us-east-1` |
    /// | `S3GW_ACCOUNTS` | empty (`ak:sk,ak:sk`) |
    /// | `S3GW_CERT` / `S3GW_KEY` | unset |
    /// | `S3GW_MAX_CLOCK_SKEW` | `900` |
    /// | `S3GW_DOMAIN` | `localhost` |
    /// | `S3GW_VIRTUAL_HOSTING` | `false` |
    /// | `S3GW_LOG_LEVEL` | `info` |
    /// | `S3GW_LOG_FORMAT` | `text` (`json` for JSON lines) |
    ///
    /// Malformed account entries are reported by [`Self::validate`] rather
    /// than dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAccount`] for an account entry without
    /// a `:` separator.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let first = |names: &[&str]| names.iter().find_map(|n| lookup(n));

        if let Some(v) = lookup("S3GW_PORT") {
            config.listen = v;
        }
        config.admin_access_key = first(&["ADMIN_ACCESS_KEY_ID", "ADMIN_ACCESS_KEY"]);
        config.admin_secret_key = first(&["ADMIN_SECRET_ACCESS_KEY", "ADMIN_SECRET_KEY"]);
        if let Some(v) = lookup("S3GW_REGION") {
            config.region = v;
        }
        if let Some(v) = lookup("S3GW_ACCOUNTS") {
            config.accounts = parse_accounts(&v)?;
        }
        config.cert_file = lookup("S3GW_CERT");
        config.key_file = lookup("S3GW_KEY");
        if let Some(n) = lookup("S3GW_MAX_CLOCK_SKEW").and_then(|v| v.parse::<u64>().ok()) {
            config.max_clock_skew_secs = n;
        }
        if let Some(v) = lookup("S3GW_DOMAIN") {
            config.domain = v;
        }
        if let Some(v) = lookup("S3GW_VIRTUAL_HOSTING") {
            config.virtual_hosting = parse_bool(&v);
        }
        if let Some(v) = lookup("S3GW_LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("S3GW_LOG_FORMAT") {
            config.log_json = v.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Check the configuration for combinations the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) => return Err(ConfigError::CertWithoutKey),
            (None, Some(_)) => return Err(ConfigError::KeyWithoutCert),
            _ => {}
        }
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !present(&self.admin_access_key) || !present(&self.admin_secret_key) {
            return Err(ConfigError::MissingAdminCredentials);
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Resolve [`Self::listen`] to a socket address; `:port` binds all interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListen`] if the address cannot be parsed.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || ConfigError::InvalidListen(self.listen.clone());
        if let Some(port) = self.listen.strip_prefix(':') {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        }
        self.listen.parse().map_err(|_| invalid())
    }

    /// Whether both TLS files are configured.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}

/// Parse `ak:sk,ak:sk`. Empty entries are skipped.
fn parse_accounts(value: &str) -> Result<Vec<Account>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (access_key, secret_key) = entry
                .split_once(':')
                .filter(|(ak, sk)| !ak.is_empty() && !sk.is_empty())
                .ok_or_else(|| ConfigError::InvalidAccount(entry.to_owned()))?;
            Ok(Account {
                access_key: access_key.to_owned(),
                secret_key: secret_key.to_owned(),
            })
        })
        .collect()
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
