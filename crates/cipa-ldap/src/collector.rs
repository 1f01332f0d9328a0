//! Derivation of every metric of a server report.
//!
//! Each [`MetricKind`] maps to one [`QueryPlan`]: where to search, with which scope, filter and
//! attributes, and how the returned entries become a [`MetricValue`]. A failing query degrades
//! only its own metric.

use cipa_core::discovery::{ad_trust_srv_record, normalize_dns_name, SrvLookup};
use cipa_core::error::Error;
use cipa_core::types::{
    normalize_replication_status, AnonymousBindState, MetricKind, MetricValue,
    ReplicationAgreement, ReplicationSummary, ServerReport, UNKNOWN_REPLICATION_STATUS,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{DirectorySession, LdapEntry, SearchScope};
use crate::dn::DistinguishedName;
use crate::identity::ServerIdentity;

const ALL_OBJECTS: &str = "(objectClass=*)";
const SUBORDINATE_COUNT: &str = "numSubordinates";
const ENTRY_INFO: &str = "nscpentrywsi";
const ANONYMOUS_ACCESS: &str = "nsslapd-allow-anonymous-access";
const REPLICA_HOST: &str = "nsDS5ReplicaHost";
const REPLICA_STATUS: &str = "nsds5replicaLastUpdateStatus";

/// Search base of a query.
#[derive(Debug, Clone, Copy)]
enum SearchBase {
    /// Container below the domain base DN, innermost RDN value first.
    Container(&'static [&'static str]),
    /// The domain base DN itself.
    Suffix,
    /// Fixed DN independent of the domain.
    Fixed(&'static str),
    /// Replica entry of the suffix in the mapping tree.
    ReplicaAgreements,
}

/// How the returned entries become a metric value.
#[derive(Debug, Clone, Copy)]
enum Derivation {
    Subordinates,
    Matches,
    GhostMarkers,
    AnonymousAccess,
    Replication,
}

#[derive(Debug, Clone, Copy)]
struct QueryPlan {
    base: SearchBase,
    scope: SearchScope,
    filter: &'static str,
    attributes: &'static [&'static str],
    derivation: Derivation,
    /// Containers that only exist when an optional component is installed.
    optional: bool,
}

const fn subordinates(path: &'static [&'static str]) -> QueryPlan {
    QueryPlan {
        base: SearchBase::Container(path),
        scope: SearchScope::Base,
        filter: ALL_OBJECTS,
        attributes: &[SUBORDINATE_COUNT],
        derivation: Derivation::Subordinates,
        optional: false,
    }
}

const fn matches(base: SearchBase, scope: SearchScope, filter: &'static str) -> QueryPlan {
    QueryPlan {
        base,
        scope,
        filter,
        attributes: &["1.1"],
        derivation: Derivation::Matches,
        optional: false,
    }
}

const fn optional(plan: QueryPlan) -> QueryPlan {
    QueryPlan {
        optional: true,
        ..plan
    }
}

/// Query plan of a directory-backed metric; `None` for metrics answered elsewhere.
const fn query_plan(kind: MetricKind) -> Option<QueryPlan> {
    let plan = match kind {
        MetricKind::ActiveUsers => subordinates(&["users", "accounts"]),
        MetricKind::StagedUsers => {
            subordinates(&["staged users", "accounts", "provisioning"])
        }
        MetricKind::PreservedUsers => {
            subordinates(&["deleted users", "accounts", "provisioning"])
        }
        MetricKind::Hosts => matches(
            SearchBase::Container(&["computers", "accounts"]),
            SearchScope::OneLevel,
            "(fqdn=*)",
        ),
        MetricKind::Services => matches(
            SearchBase::Container(&["services", "accounts"]),
            SearchScope::OneLevel,
            "(krbprincipalname=*)",
        ),
        MetricKind::UserGroups => matches(
            SearchBase::Container(&["groups", "accounts"]),
            SearchScope::Subtree,
            "(objectClass=ipausergroup)",
        ),
        MetricKind::HostGroups => subordinates(&["hostgroups", "accounts"]),
        MetricKind::Netgroups => optional(matches(
            SearchBase::Container(&["ng", "alt"]),
            SearchScope::OneLevel,
            "(ipaUniqueID=*)",
        )),
        MetricKind::HbacRules => matches(
            SearchBase::Container(&["hbac"]),
            SearchScope::OneLevel,
            "(ipaUniqueID=*)",
        ),
        MetricKind::SudoRules => matches(
            SearchBase::Container(&["sudorules", "sudo"]),
            SearchScope::OneLevel,
            "(ipaUniqueID=*)",
        ),
        MetricKind::DnsZones => matches(
            SearchBase::Container(&["dns"]),
            SearchScope::OneLevel,
            "(|(objectClass=idnszone)(objectClass=idnsforwardzone))",
        ),
        MetricKind::Certificates => optional(matches(
            SearchBase::Fixed("ou=certificateRepository,ou=ca,o=ipaca"),
            SearchScope::OneLevel,
            "(certStatus=*)",
        )),
        MetricKind::LdapConflicts => QueryPlan {
            attributes: &["nsds5ReplConflict"],
            ..matches(SearchBase::Suffix, SearchScope::Subtree, "(nsds5ReplConflict=*)")
        },
        MetricKind::GhostReplicas => QueryPlan {
            base: SearchBase::Suffix,
            scope: SearchScope::Subtree,
            filter: "(&(objectclass=nstombstone)(nsUniqueId=ffffffff-ffffffff-ffffffff-ffffffff))",
            attributes: &[ENTRY_INFO],
            derivation: Derivation::GhostMarkers,
            optional: false,
        },
        MetricKind::AnonymousBind => QueryPlan {
            base: SearchBase::Fixed("cn=config"),
            scope: SearchScope::Base,
            filter: ALL_OBJECTS,
            attributes: &[ANONYMOUS_ACCESS],
            derivation: Derivation::AnonymousAccess,
            optional: false,
        },
        MetricKind::Replication => QueryPlan {
            base: SearchBase::ReplicaAgreements,
            scope: SearchScope::OneLevel,
            filter: ALL_OBJECTS,
            attributes: &[REPLICA_HOST, REPLICA_STATUS],
            derivation: Derivation::Replication,
            optional: false,
        },
        MetricKind::AdTrust => return None,
    };
    Some(plan)
}

/// Collects the metrics of one server over an established session.
#[derive(Clone)]
pub struct MetricCollector {
    dns: Arc<dyn SrvLookup>,
}

impl MetricCollector {
    /// Creates a collector; `dns` answers the AD-trust presence check.
    #[must_use]
    pub fn new(dns: Arc<dyn SrvLookup>) -> Self {
        Self { dns }
    }

    /// Derives every metric of the session's server.
    ///
    /// Never fails as a whole: a metric whose query fails is reported as
    /// [`MetricValue::Unavailable`].
    pub async fn collect(&self, session: &mut DirectorySession) -> ServerReport {
        let identity = session.identity().clone();
        let mut builder = ServerReport::builder(identity.fqdn(), identity.hostname_short());
        for &kind in MetricKind::all() {
            let value = self.collect_metric(session, kind).await;
            debug!(server = identity.fqdn(), metric = kind.key(), %value, "collected");
            builder = builder.metric(kind, value);
        }
        builder.build()
    }

    /// Derives a single metric.
    pub async fn collect_metric(
        &self,
        session: &mut DirectorySession,
        kind: MetricKind,
    ) -> MetricValue {
        let Some(plan) = query_plan(kind) else {
            let identity = session.identity().clone();
            return self.ad_trust(&identity).await;
        };

        let base = search_base(plan.base, session.identity().base_dn());
        match session
            .query(&base, plan.filter, plan.attributes, plan.scope)
            .await
        {
            Ok(entries) => derive(kind, plan.derivation, &entries),
            Err(Error::NoSuchObject(_)) if plan.optional => {
                debug!(
                    server = session.identity().fqdn(),
                    metric = kind.key(),
                    base = %base,
                    "container absent, component not deployed"
                );
                MetricValue::NotDeployed
            }
            Err(err) => {
                warn!(
                    server = session.identity().fqdn(),
                    metric = kind.key(),
                    "query failed: {err}"
                );
                MetricValue::Unavailable
            }
        }
    }

    async fn ad_trust(&self, identity: &ServerIdentity) -> MetricValue {
        let record = ad_trust_srv_record(identity.domain());
        match self.dns.srv_targets(&record).await {
            Ok(Some(targets)) => MetricValue::Flag(
                targets
                    .iter()
                    .any(|target| normalize_dns_name(target) == identity.fqdn()),
            ),
            Ok(None) => MetricValue::Flag(false),
            Err(err) => {
                warn!(server = identity.fqdn(), %record, "AD trust lookup failed: {err}");
                MetricValue::Unavailable
            }
        }
    }
}

fn search_base(base: SearchBase, base_dn: &DistinguishedName) -> String {
    match base {
        SearchBase::Container(path) => base_dn.container(path).to_string(),
        SearchBase::Suffix => base_dn.to_string(),
        SearchBase::Fixed(dn) => dn.to_string(),
        SearchBase::ReplicaAgreements => format!(
            "cn=replica,cn={},cn=mapping tree,cn=config",
            base_dn.mapping_tree_value()
        ),
    }
}

fn derive(kind: MetricKind, derivation: Derivation, entries: &[LdapEntry]) -> MetricValue {
    match derivation {
        Derivation::Subordinates => subordinate_count(kind, entries),
        Derivation::Matches => MetricValue::Count(entries.len() as u64),
        Derivation::GhostMarkers => MetricValue::Count(ghost_markers(entries)),
        Derivation::AnonymousAccess => entries
            .first()
            .and_then(|entry| entry.first(ANONYMOUS_ACCESS))
            .map_or(MetricValue::Status(AnonymousBindState::Error), |raw| {
                MetricValue::Status(AnonymousBindState::from_raw(raw))
            }),
        Derivation::Replication => {
            MetricValue::ReplicationSummary(replication_summary(entries))
        }
    }
}

/// 389 omits `numSubordinates` on entries without children.
fn subordinate_count(kind: MetricKind, entries: &[LdapEntry]) -> MetricValue {
    let Some(entry) = entries.first() else {
        warn!(metric = kind.key(), "container entry not returned");
        return MetricValue::Unavailable;
    };
    match entry.first(SUBORDINATE_COUNT) {
        None => MetricValue::Count(0),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(count) => MetricValue::Count(count),
            Err(_) => {
                let err = Error::MalformedAttribute {
                    attribute: SUBORDINATE_COUNT.to_string(),
                    value: raw.to_string(),
                };
                warn!(metric = kind.key(), dn = %entry.dn, "{err}");
                MetricValue::Unavailable
            }
        },
    }
}

fn ghost_markers(entries: &[LdapEntry]) -> u64 {
    entries
        .iter()
        .filter_map(|entry| entry.values(ENTRY_INFO))
        .flatten()
        .filter(|value| value.contains("replica ") && !value.contains("ldap"))
        .count() as u64
}

fn replication_summary(entries: &[LdapEntry]) -> ReplicationSummary {
    let agreements = entries
        .iter()
        .map(|entry| {
            let peer = entry
                .first(REPLICA_HOST)
                .map(|host| host.split('.').next().unwrap_or(host).to_string())
                .unwrap_or_else(|| entry.dn.clone());
            let status = entry
                .first(REPLICA_STATUS)
                .map_or_else(
                    || UNKNOWN_REPLICATION_STATUS.to_string(),
                    normalize_replication_status,
                );
            ReplicationAgreement::new(peer, status)
        })
        .collect();
    ReplicationSummary::from_agreements(agreements)
}
