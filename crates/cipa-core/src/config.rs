//! Configuration structures for fleet audits.
//!
//! This module provides the resolved inputs of a fleet run: the domain, the ordered host list,
//! bind credentials, thresholds and the timeouts that keep a hung server from stalling the scan.

use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::consistency::Thresholds;
use crate::error::{Error, Result};
use crate::types::DEFAULT_LDAPS_PORT;

/// Bind DN used when none is configured.
pub const DEFAULT_BIND_DN: &str = "cn=Directory Manager";

/// Default connect and bind timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 3;
/// Default per-query timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5;
/// Default fleet scan deadline (seconds).
pub const DEFAULT_SCAN_DEADLINE_SECS: u64 = 30;
/// Default number of servers audited at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Directory bind credentials.
///
/// The password is held as a [`SecretString`] and is redacted from `Debug` output.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: String,
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the LDAP bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the LDAP bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}

/// Resolved configuration of a fleet run.
#[derive(Debug, Clone, Validate)]
pub struct FleetConfig {
    /// IPA domain (dotted form)
    #[validate(length(min = 1))]
    pub domain: String,

    /// Servers to audit, in report order
    pub hosts: Vec<String>,

    credentials: Arc<BindCredentials>,

    /// Failed checks before WARNING / CRITICAL
    pub thresholds: Thresholds,

    /// LDAPS port
    #[validate(range(min = 1))]
    pub port: u16,

    /// Whether to verify server certificates
    pub tls_verify: bool,

    /// PEM file with the CA that signed the server certificates
    pub tls_ca_cert: Option<PathBuf>,

    /// Connect and bind timeout in seconds
    #[validate(range(min = 1, max = 60))]
    pub connection_timeout_secs: u64,

    /// Per-query timeout in seconds
    #[validate(range(min = 1, max = 300))]
    pub operation_timeout_secs: u64,

    /// Upper bound on the whole fleet scan in seconds
    #[validate(range(min = 1, max = 3600))]
    pub scan_deadline_secs: u64,

    /// Maximum number of servers audited at the same time
    #[validate(range(min = 1, max = 256))]
    pub max_concurrency: usize,
}

impl FleetConfig {
    /// Create a configuration with default timeouts and thresholds.
    #[must_use]
    pub fn new(domain: impl Into<String>, credentials: BindCredentials) -> Self {
        Self {
            domain: domain.into(),
            hosts: Vec::new(),
            credentials: Arc::new(credentials),
            thresholds: Thresholds::default(),
            port: DEFAULT_LDAPS_PORT,
            tls_verify: false,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            scan_deadline_secs: DEFAULT_SCAN_DEADLINE_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Set the host list.
    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the LDAPS port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set the CA certificate used to verify the servers.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_cert = Some(path.into());
        self
    }

    /// Set the connect and bind timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Set the per-query timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Set the scan deadline in seconds.
    #[must_use]
    pub const fn with_scan_deadline(mut self, seconds: u64) -> Self {
        self.scan_deadline_secs = seconds;
        self
    }

    /// Set the maximum number of concurrently audited servers.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Shared bind credentials.
    #[must_use]
    pub fn credentials(&self) -> &Arc<BindCredentials> {
        &self.credentials
    }

    /// Connect and bind timeout.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Per-query timeout.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whole-scan deadline.
    #[must_use]
    pub const fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }

    /// Checks everything that must hold before any directory work begins.
    ///
    /// The host list may still be empty here; it is filled by discovery afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the domain or credentials are missing, a host name is
    /// empty or contains whitespace, or a numeric setting is out of range.
    pub fn validate_for_scan(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::ConfigError("IPA domain not set".to_string()));
        }
        if self.credentials.bind_dn().trim().is_empty() {
            return Err(Error::ConfigError("Bind DN not set".to_string()));
        }
        if self.credentials.bind_password().is_empty() {
            return Err(Error::ConfigError("Bind password not set".to_string()));
        }
        if let Some(host) = self
            .hosts
            .iter()
            .find(|host| host.is_empty() || host.chars().any(char::is_whitespace))
        {
            return Err(Error::ConfigError(format!("Incorrect server name: {host:?}")));
        }

        self.validate()?;
        Ok(())
    }
}
