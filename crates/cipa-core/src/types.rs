//! Core fleet audit domain types.
//!
//! This module provides the metric model collected from every directory server: the fixed set
//! of [`MetricKind`]s, the tagged [`MetricValue`] union and the per-server [`ServerReport`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default LDAPS port
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Metrics collected from every server, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Active user accounts
    #[serde(rename = "users")]
    ActiveUsers,
    /// Staged user accounts
    #[serde(rename = "susers")]
    StagedUsers,
    /// Preserved (deleted) user accounts
    #[serde(rename = "pusers")]
    PreservedUsers,
    /// Enrolled hosts
    #[serde(rename = "hosts")]
    Hosts,
    /// Kerberos service principals
    #[serde(rename = "services")]
    Services,
    /// User groups
    #[serde(rename = "ugroups")]
    UserGroups,
    /// Host groups
    #[serde(rename = "hgroups")]
    HostGroups,
    /// Netgroups
    #[serde(rename = "ngroups")]
    Netgroups,
    /// Host-based access control rules
    #[serde(rename = "hbac")]
    HbacRules,
    /// SUDO rules
    #[serde(rename = "sudo")]
    SudoRules,
    /// DNS zones (master and forward)
    #[serde(rename = "zones")]
    DnsZones,
    /// Certificates in the CA repository
    #[serde(rename = "certs")]
    Certificates,
    /// Entries carrying a replication conflict marker
    #[serde(rename = "conflicts")]
    LdapConflicts,
    /// Stale replica references in the tombstone entry
    #[serde(rename = "ghosts")]
    GhostReplicas,
    /// Anonymous bind configuration
    #[serde(rename = "bind")]
    AnonymousBind,
    /// Presence in the AD-trust `_msdcs` SRV records
    #[serde(rename = "msdcs")]
    AdTrust,
    /// Replication agreement status
    #[serde(rename = "replicas")]
    Replication,
}

/// How agreement across servers is judged for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyRule {
    /// Every server reports the same available value.
    Uniform,
    /// Every server reports a count of zero.
    UniformZero,
    /// Every server reports healthy replication.
    AllHealthy,
}

impl MetricKind {
    /// Returns all metric kinds in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ActiveUsers,
            Self::StagedUsers,
            Self::PreservedUsers,
            Self::Hosts,
            Self::Services,
            Self::UserGroups,
            Self::HostGroups,
            Self::Netgroups,
            Self::HbacRules,
            Self::SudoRules,
            Self::DnsZones,
            Self::Certificates,
            Self::LdapConflicts,
            Self::GhostReplicas,
            Self::AnonymousBind,
            Self::AdTrust,
            Self::Replication,
        ]
    }

    /// Short key used on the command line and in JSON output.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::ActiveUsers => "users",
            Self::StagedUsers => "susers",
            Self::PreservedUsers => "pusers",
            Self::Hosts => "hosts",
            Self::Services => "services",
            Self::UserGroups => "ugroups",
            Self::HostGroups => "hgroups",
            Self::Netgroups => "ngroups",
            Self::HbacRules => "hbac",
            Self::SudoRules => "sudo",
            Self::DnsZones => "zones",
            Self::Certificates => "certs",
            Self::LdapConflicts => "conflicts",
            Self::GhostReplicas => "ghosts",
            Self::AnonymousBind => "bind",
            Self::AdTrust => "msdcs",
            Self::Replication => "replicas",
        }
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ActiveUsers => "Active Users",
            Self::StagedUsers => "Stage Users",
            Self::PreservedUsers => "Preserved Users",
            Self::Hosts => "Hosts",
            Self::Services => "Services",
            Self::UserGroups => "User Groups",
            Self::HostGroups => "Host Groups",
            Self::Netgroups => "Netgroups",
            Self::HbacRules => "HBAC Rules",
            Self::SudoRules => "SUDO Rules",
            Self::DnsZones => "DNS Zones",
            Self::Certificates => "Certificates",
            Self::LdapConflicts => "LDAP Conflicts",
            Self::GhostReplicas => "Ghost Replicas",
            Self::AnonymousBind => "Anonymous BIND",
            Self::AdTrust => "Microsoft ADTrust",
            Self::Replication => "Replication Status",
        }
    }

    /// Returns the rule used to judge cross-server agreement for this metric.
    #[must_use]
    pub const fn consistency_rule(&self) -> ConsistencyRule {
        match self {
            Self::LdapConflicts | Self::GhostReplicas => ConsistencyRule::UniformZero,
            Self::Replication => ConsistencyRule::AllHealthy,
            _ => ConsistencyRule::Uniform,
        }
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.key() == key)
            .ok_or_else(|| Error::InvalidRequest(format!("Unknown check: {s}")))
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Anonymous access setting of a directory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymousBindState {
    /// Anonymous reads allowed
    On,
    /// Anonymous reads refused
    Off,
    /// Only the root DSE is readable anonymously
    RootDse,
    /// The server returned a value outside the known set
    Error,
}

impl AnonymousBindState {
    /// Maps the raw `nsslapd-allow-anonymous-access` value.
    #[must_use]
    pub fn from_raw(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "on" => Self::On,
            "off" => Self::Off,
            "rootdse" => Self::RootDse,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for AnonymousBindState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::RootDse => "ROOTDSE",
            Self::Error => "ERROR",
        };
        f.write_str(text)
    }
}

/// Status code reported for an agreement with no readable status attribute.
pub const UNKNOWN_REPLICATION_STATUS: &str = "unknown";

/// One replication agreement as seen from a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationAgreement {
    /// Short host name of the replication peer
    pub peer: String,
    /// Normalized last update status code (`0` means success)
    pub status: String,
}

impl ReplicationAgreement {
    /// Creates an agreement from already normalized values.
    #[must_use]
    pub fn new(peer: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            status: status.into(),
        }
    }

    /// Returns true if the last update succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "0"
    }
}

/// Replication agreements of one server plus the aggregate health flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationSummary {
    /// Agreements in the order returned by the server
    pub agreements: Vec<ReplicationAgreement>,
    /// True iff every agreement reports status `0`
    pub healthy: bool,
}

impl ReplicationSummary {
    /// Builds a summary, deriving the health flag from the agreements.
    #[must_use]
    pub fn from_agreements(agreements: Vec<ReplicationAgreement>) -> Self {
        let healthy = agreements.iter().all(ReplicationAgreement::is_healthy);
        Self {
            agreements,
            healthy,
        }
    }
}

impl fmt::Display for ReplicationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .agreements
            .iter()
            .map(|agreement| format!("{} {}", agreement.peer, agreement.status))
            .collect::<Vec<_>>();
        f.write_str(&lines.join("\n"))
    }
}

/// Normalizes a raw `nsds5replicaLastUpdateStatus` value to its status code.
///
/// `"Error (0) Replica acquired successfully"` becomes `"0"`, `"Error (5) incremental update
/// failed"` becomes `"5"` and the older `"0 Replica acquired successfully"` form becomes `"0"`.
#[must_use]
pub fn normalize_replication_status(raw: &str) -> String {
    let stripped = raw.replace("Error ", "");
    let token = stripped.trim().split(' ').next().unwrap_or_default();
    token.trim_matches(|ch| ch == '(' || ch == ')').to_string()
}

/// Value of one metric on one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// A non-negative count
    Count(u64),
    /// A yes/no state
    Flag(bool),
    /// Anonymous bind state
    Status(AnonymousBindState),
    /// Replication agreements and health
    ReplicationSummary(ReplicationSummary),
    /// The optional subsystem holding this metric is not installed on the server
    NotDeployed,
    /// The metric could not be collected from the server
    Unavailable,
}

impl MetricValue {
    /// Returns true if the value could not be collected.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Returns the count if this is a count value.
    #[must_use]
    pub const fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// Returns the replication summary if this is a replication value.
    #[must_use]
    pub const fn as_replication(&self) -> Option<&ReplicationSummary> {
        match self {
            Self::ReplicationSummary(summary) => Some(summary),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Flag(true) => f.write_str("YES"),
            Self::Flag(false) => f.write_str("NO"),
            Self::Status(state) => write!(f, "{state}"),
            Self::ReplicationSummary(summary) => write!(f, "{summary}"),
            Self::NotDeployed => f.write_str("N/A"),
            Self::Unavailable => f.write_str("-"),
        }
    }
}

/// Whether a report was collected from a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reachability {
    /// A session was established and metrics were queried
    Reachable,
    /// No session could be established; every metric is unavailable
    Unreachable {
        /// Why the server was not audited
        reason: String,
    },
}

/// Metrics collected from one server.
///
/// Every [`MetricKind`] is always present; metrics that were not collected hold
/// [`MetricValue::Unavailable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerReport {
    /// Host name as requested
    pub host: String,
    /// Short host name used for display
    pub hostname_short: String,
    /// Whether the server was reachable
    pub reachability: Reachability,
    /// When collection finished
    pub collected_at: DateTime<Utc>,
    metrics: BTreeMap<MetricKind, MetricValue>,
}

impl ServerReport {
    /// Creates a builder for a reachable server.
    #[must_use]
    pub fn builder(host: impl Into<String>, hostname_short: impl Into<String>) -> ServerReportBuilder {
        ServerReportBuilder {
            host: host.into(),
            hostname_short: hostname_short.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Creates the degenerate report of a server that could not be audited.
    #[must_use]
    pub fn unreachable(
        host: impl Into<String>,
        hostname_short: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            hostname_short: hostname_short.into(),
            reachability: Reachability::Unreachable {
                reason: reason.into(),
            },
            collected_at: Utc::now(),
            metrics: all_unavailable(),
        }
    }

    /// Returns the value collected for `kind`.
    #[must_use]
    pub fn get(&self, kind: MetricKind) -> &MetricValue {
        self.metrics.get(&kind).unwrap_or(&MetricValue::Unavailable)
    }

    /// Iterates over every metric in display order.
    pub fn metrics(&self) -> impl Iterator<Item = (MetricKind, &MetricValue)> + '_ {
        self.metrics.iter().map(|(kind, value)| (*kind, value))
    }

    /// Returns true if the server was reachable.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self.reachability, Reachability::Reachable)
    }
}

/// Builder for [`ServerReport`].
#[derive(Debug)]
pub struct ServerReportBuilder {
    host: String,
    hostname_short: String,
    metrics: BTreeMap<MetricKind, MetricValue>,
}

impl ServerReportBuilder {
    /// Records the value of one metric.
    #[must_use]
    pub fn metric(mut self, kind: MetricKind, value: MetricValue) -> Self {
        self.metrics.insert(kind, value);
        self
    }

    /// Builds the report, filling metrics that were never recorded with `Unavailable`.
    #[must_use]
    pub fn build(self) -> ServerReport {
        let mut metrics = all_unavailable();
        metrics.extend(self.metrics);
        ServerReport {
            host: self.host,
            hostname_short: self.hostname_short,
            reachability: Reachability::Reachable,
            collected_at: Utc::now(),
            metrics,
        }
    }
}

fn all_unavailable() -> BTreeMap<MetricKind, MetricValue> {
    MetricKind::all()
        .iter()
        .map(|kind| (*kind, MetricValue::Unavailable))
        .collect()
}
