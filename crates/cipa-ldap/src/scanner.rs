//! Concurrent audit of a whole fleet.

use cipa_core::discovery::{normalize_dns_name, SrvLookup};
use cipa_core::types::ServerReport;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use crate::client::{DirectorySession, LdapConnector, LdapsConnector};
use crate::collector::MetricCollector;
use crate::config::DirectoryConfig;
use crate::identity::{short_hostname, ServerIdentity};

/// Audits many servers concurrently, one session per server.
#[derive(Clone)]
pub struct FleetScanner {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn LdapConnector>,
    collector: MetricCollector,
}

impl FleetScanner {
    /// Creates a scanner connecting over LDAPS.
    #[must_use]
    pub fn new(config: DirectoryConfig, dns: Arc<dyn SrvLookup>) -> Self {
        let config = Arc::new(config);
        let connector = Arc::new(LdapsConnector::new(Arc::clone(&config)));
        Self {
            config,
            connector,
            collector: MetricCollector::new(dns),
        }
    }

    /// Creates a scanner with a custom connector.
    #[must_use]
    pub fn with_connector(
        config: DirectoryConfig,
        connector: Arc<dyn LdapConnector>,
        dns: Arc<dyn SrvLookup>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            collector: MetricCollector::new(dns),
        }
    }

    /// Scans every host and returns one report per host, in request order.
    ///
    /// At most `max_concurrency` servers are audited at once. Hosts still running when the scan
    /// deadline expires are reported unreachable.
    pub async fn scan(&self, hosts: &[String]) -> Vec<ServerReport> {
        let deadline = Instant::now() + self.config.scan_deadline();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency()));
        let mut tasks = JoinSet::new();

        for (index, host) in hosts.iter().enumerate() {
            let scanner = self.clone();
            let permits = Arc::clone(&permits);
            let host = host.clone();
            tasks.spawn(async move {
                let report = match permits.acquire_owned().await {
                    Ok(_permit) => scanner.scan_host(&host).await,
                    Err(err) => scanner.unreachable(&host, &err.to_string()),
                };
                (index, report)
            });
        }

        let mut slots: Vec<Option<ServerReport>> = vec![None; hosts.len()];
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, report)))) => slots[index] = Some(report),
                Ok(Some(Err(err))) => warn!("server audit task failed: {err}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        deadline_secs = self.config.scan_deadline().as_secs(),
                        "scan deadline expired"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        hosts
            .iter()
            .zip(slots)
            .map(|(host, slot)| {
                slot.unwrap_or_else(|| self.unreachable(host, "scan deadline expired"))
            })
            .collect()
    }

    /// Audits a single server.
    ///
    /// Connection, bind and identity failures yield an unreachable report.
    pub async fn scan_host(&self, host: &str) -> ServerReport {
        let identity = match ServerIdentity::new(host, self.config.domain()) {
            Ok(identity) => identity,
            Err(err) => return self.unreachable(host, &err.to_string()),
        };
        let span = info_span!("server", host = identity.fqdn());
        self.audit(identity).instrument(span).await
    }

    async fn audit(&self, identity: ServerIdentity) -> ServerReport {
        let session =
            DirectorySession::establish(self.connector.as_ref(), &identity, &self.config).await;
        let mut session = match session {
            Ok(session) => session,
            Err(err) => {
                if err.should_log() {
                    error!("{err}");
                } else {
                    warn!("{err}");
                }
                return ServerReport::unreachable(
                    identity.fqdn(),
                    identity.hostname_short(),
                    err.to_string(),
                );
            }
        };

        let report = self.collector.collect(&mut session).await;
        session.close().await;
        info!("audit complete");
        report
    }

    fn unreachable(&self, host: &str, reason: &str) -> ServerReport {
        let fqdn = normalize_dns_name(host);
        let short = short_hostname(&fqdn, &normalize_dns_name(self.config.domain()));
        ServerReport::unreachable(fqdn, short, reason)
    }
}
