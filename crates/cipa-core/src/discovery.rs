//! DNS SRV lookups.
//!
//! SRV records are used twice: to find the directory servers of a domain when no host list is
//! configured, and to detect whether a server is published as an AD-trust domain controller.

use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// SRV record listing the LDAP servers of `domain`.
#[must_use]
pub fn ldap_srv_record(domain: &str) -> String {
    format!("_ldap._tcp.{domain}")
}

/// SRV record listing the AD-trust domain controllers of `domain`.
#[must_use]
pub fn ad_trust_srv_record(domain: &str) -> String {
    format!("_kerberos._tcp.Default-First-Site-Name._sites.dc._msdcs.{domain}")
}

/// Normalizes a DNS name for comparison (lowercase, no trailing dot).
#[must_use]
pub fn normalize_dns_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}

/// Resolves SRV record targets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SrvLookup: Send + Sync {
    /// Returns the target host names of `name`, in answer order.
    ///
    /// `Ok(None)` means the name does not exist or has no SRV records.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver itself failed.
    async fn srv_targets(&self, name: &str) -> Result<Option<Vec<String>>>;
}

/// [`SrvLookup`] backed by the system resolver configuration.
pub struct HickorySrvLookup {
    resolver: TokioAsyncResolver,
}

impl HickorySrvLookup {
    /// Creates a lookup using `/etc/resolv.conf` (or the platform equivalent).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the system resolver configuration cannot be read.
    pub fn from_system_conf(timeout: Duration) -> Result<Self> {
        let (config, mut options) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|err| Error::ConfigError(format!("failed to read resolver config: {err}")))?;
        options.timeout = timeout;
        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, options),
        })
    }
}

#[async_trait]
impl SrvLookup for HickorySrvLookup {
    async fn srv_targets(&self, name: &str) -> Result<Option<Vec<String>>> {
        debug!(record = name, "SRV lookup");
        match self.resolver.srv_lookup(name).await {
            Ok(lookup) => {
                let targets = lookup
                    .iter()
                    .map(|srv| normalize_dns_name(&srv.target().to_utf8()))
                    .collect::<Vec<_>>();
                Ok(Some(targets))
            }
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } | ResolveErrorKind::NoConnections => {
                    Ok(None)
                }
                _ => Err(Error::ExternalServiceError {
                    service: "dns".to_string(),
                    message: err.to_string(),
                }),
            },
        }
    }
}

/// Finds directory servers for a domain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerDiscovery: Send + Sync {
    /// Returns the servers of `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryFailed`] if no server can be found.
    async fn discover_servers(&self, domain: &str) -> Result<Vec<String>>;
}

/// Discovers servers from the `_ldap._tcp` SRV record of the domain.
#[derive(Clone)]
pub struct DnsServerDiscovery {
    lookup: Arc<dyn SrvLookup>,
}

impl DnsServerDiscovery {
    /// Creates a discovery using the given SRV lookup.
    #[must_use]
    pub fn new(lookup: Arc<dyn SrvLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl ServerDiscovery for DnsServerDiscovery {
    async fn discover_servers(&self, domain: &str) -> Result<Vec<String>> {
        let record = ldap_srv_record(domain);
        let targets = self
            .lookup
            .srv_targets(&record)
            .await
            .map_err(|err| Error::DiscoveryFailed(format!("{record}: {err}")))?
            .unwrap_or_default();

        let mut hosts: Vec<String> = Vec::with_capacity(targets.len());
        for target in targets {
            if !target.is_empty() && !hosts.contains(&target) {
                hosts.push(target);
            }
        }

        if hosts.is_empty() {
            return Err(Error::DiscoveryFailed(format!(
                "IPA servers not set, also failed to find any in DNS ({record})"
            )));
        }

        debug!(servers = ?hosts, "discovered servers");
        Ok(hosts)
    }
}
