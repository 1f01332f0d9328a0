//! Configuration types for directory sessions.

use cipa_core::config::{
    BindCredentials, FleetConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_SCAN_DEADLINE_SECS,
};
use cipa_core::types::DEFAULT_LDAPS_PORT;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for connecting to the directory servers of one domain.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    domain: String,
    credentials: Arc<BindCredentials>,
    port: u16,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
    scan_deadline_secs: u64,
    max_concurrency: usize,
}

impl DirectoryConfig {
    /// Creates a new directory configuration with certificate verification disabled.
    #[must_use]
    pub fn new(domain: impl Into<String>, credentials: Arc<BindCredentials>) -> Self {
        Self {
            domain: domain.into(),
            credentials,
            port: DEFAULT_LDAPS_PORT,
            tls_verify: false,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            scan_deadline_secs: DEFAULT_SCAN_DEADLINE_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Returns the IPA domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the bind credentials.
    #[must_use]
    pub fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the LDAPS port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connect and bind timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the per-query timeout.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns the deadline for a whole fleet scan.
    #[must_use]
    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }

    /// Returns the number of servers audited at once.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Overrides the LDAPS port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Overrides the scan deadline in seconds.
    #[must_use]
    pub const fn with_scan_deadline_secs(mut self, seconds: u64) -> Self {
        self.scan_deadline_secs = seconds;
        self
    }

    /// Overrides the number of servers audited at once (at least one).
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }
}

impl From<&FleetConfig> for DirectoryConfig {
    fn from(config: &FleetConfig) -> Self {
        let directory = Self::new(config.domain.clone(), Arc::clone(config.credentials()))
            .with_port(config.port)
            .with_tls_verification(config.tls_verify)
            .with_connection_timeout_secs(config.connection_timeout_secs)
            .with_operation_timeout_secs(config.operation_timeout_secs)
            .with_scan_deadline_secs(config.scan_deadline_secs)
            .with_max_concurrency(config.max_concurrency);
        match &config.tls_ca_cert {
            Some(path) => directory.with_tls_ca_cert(path.clone()),
            None => directory,
        }
    }
}
