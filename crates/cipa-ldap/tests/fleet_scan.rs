use async_trait::async_trait;
use cipa_core::config::BindCredentials;
use cipa_core::consistency::{FleetAggregator, FleetStatus, Thresholds};
use cipa_core::discovery::SrvLookup;
use cipa_core::types::{AnonymousBindState, MetricKind, MetricValue};
use cipa_core::{Error, Result};
use cipa_ldap::{
    DirectoryConfig, FleetScanner, LdapConnector, LdapEntry, LdapSession, SearchScope,
    ServerIdentity,
};
use std::collections::HashMap;
use std::sync::Arc;

const DOMAIN: &str = "example.com";
const BASE_DN: &str = "dc=example,dc=com";

/// Contents of one in-memory replica.
#[derive(Clone)]
struct Replica {
    fqdn: String,
    naming_context: String,
    active_users: u64,
    accept_bind: bool,
    with_ca: bool,
}

impl Replica {
    fn new(fqdn: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            naming_context: BASE_DN.to_string(),
            active_users: 120,
            accept_bind: true,
            with_ca: true,
        }
    }

    fn peers(&self) -> Vec<String> {
        ["ipa01.example.com", "ipa02.example.com", "ipa03.example.com"]
            .into_iter()
            .filter(|peer| *peer != self.fqdn)
            .map(str::to_string)
            .collect()
    }

    fn search(&self, base: &str, scope: SearchScope) -> Result<Vec<LdapEntry>> {
        let users = format!("cn=users,cn=accounts,{BASE_DN}");
        let computers = format!("cn=computers,cn=accounts,{BASE_DN}");
        let hbac = format!("cn=hbac,{BASE_DN}");
        let user_count = self.active_users.to_string();
        let replica = "cn=replica,cn=dc\\3Dexample\\2Cdc\\3Dcom,cn=mapping tree,cn=config";

        let entries = match base {
            "" => vec![entry("", &[("defaultNamingContext", &[self.naming_context.as_str()])])],
            "cn=config" => vec![entry(
                "cn=config",
                &[
                    ("nsslapd-localhost", &[self.fqdn.as_str()]),
                    ("nsslapd-allow-anonymous-access", &["rootdse"]),
                ],
            )],
            "ou=certificateRepository,ou=ca,o=ipaca" if !self.with_ca => {
                return Err(Error::NoSuchObject(base.to_string()))
            }
            "ou=certificateRepository,ou=ca,o=ipaca" => (0..4)
                .map(|serial| entry(&format!("cn={serial},{base}"), &[]))
                .collect(),
            base if base == users => vec![entry(
                base,
                &[("numSubordinates", &[user_count.as_str()])],
            )],
            base if base == computers => (0..5)
                .map(|n| entry(&format!("fqdn=host{n}.example.com,{base}"), &[]))
                .collect(),
            base if base == hbac => vec![entry(&format!("ipaUniqueID=1,{base}"), &[])],
            base if base == replica => self
                .peers()
                .into_iter()
                .map(|peer| {
                    entry(
                        &format!("cn=meTo{peer},{base}"),
                        &[
                            ("nsDS5ReplicaHost", &[peer.as_str()]),
                            (
                                "nsds5replicaLastUpdateStatus",
                                &["Error (0) Replica acquired successfully: Incremental update succeeded"],
                            ),
                        ],
                    )
                })
                .collect(),
            // 389 omits numSubordinates on containers without children.
            base if scope == SearchScope::Base => vec![entry(base, &[])],
            _ => Vec::new(),
        };
        Ok(entries)
    }
}

fn entry(dn: &str, attributes: &[(&str, &[&str])]) -> LdapEntry {
    LdapEntry::new(
        dn,
        attributes.iter().map(|(name, values)| {
            (
                (*name).to_string(),
                values.iter().map(|value| (*value).to_string()).collect(),
            )
        }),
    )
}

struct InMemorySession {
    replica: Replica,
}

#[async_trait]
impl LdapSession for InMemorySession {
    async fn simple_bind(&mut self, _dn: &str, _password: &str) -> Result<()> {
        if self.replica.accept_bind {
            Ok(())
        } else {
            Err(Error::BindFailed("invalidCredentials".to_string()))
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        _filter: &str,
        _attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        self.replica.search(base_dn, scope)
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

struct InMemoryDirectory {
    replicas: HashMap<String, Replica>,
}

impl InMemoryDirectory {
    fn new(replicas: Vec<Replica>) -> Self {
        Self {
            replicas: replicas
                .into_iter()
                .map(|replica| (replica.fqdn.clone(), replica))
                .collect(),
        }
    }
}

#[async_trait]
impl LdapConnector for InMemoryDirectory {
    async fn connect(&self, identity: &ServerIdentity) -> Result<Box<dyn LdapSession>> {
        let replica = self
            .replicas
            .get(identity.fqdn())
            .cloned()
            .ok_or_else(|| Error::ConnectionFailed(format!("{}: no route", identity.fqdn())))?;
        Ok(Box::new(InMemorySession { replica }))
    }
}

struct TrustedControllers(Vec<String>);

#[async_trait]
impl SrvLookup for TrustedControllers {
    async fn srv_targets(&self, _name: &str) -> Result<Option<Vec<String>>> {
        if self.0.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.0.clone()))
        }
    }
}

fn scanner(replicas: Vec<Replica>, trusted: &[&str]) -> FleetScanner {
    let config = DirectoryConfig::new(
        DOMAIN,
        Arc::new(BindCredentials::new("cn=Directory Manager", "secret")),
    );
    FleetScanner::with_connector(
        config,
        Arc::new(InMemoryDirectory::new(replicas)),
        Arc::new(TrustedControllers(
            trusted.iter().map(|name| format!("{name}.")).collect(),
        )),
    )
}

fn fleet() -> Vec<String> {
    vec![
        "ipa01.example.com".to_string(),
        "ipa02.example.com".to_string(),
        "ipa03.example.com".to_string(),
    ]
}

#[tokio::test]
async fn consistent_fleet_passes_every_check() {
    let replicas = vec![
        Replica::new("ipa01.example.com"),
        Replica::new("ipa02.example.com"),
        Replica::new("ipa03.example.com"),
    ];
    let reports = scanner(replicas, &[]).scan(&fleet()).await;

    assert_eq!(reports.len(), 3);
    let first = &reports[0];
    assert!(first.is_reachable());
    assert_eq!(first.hostname_short, "ipa01");
    assert_eq!(first.get(MetricKind::ActiveUsers), &MetricValue::Count(120));
    assert_eq!(first.get(MetricKind::HostGroups), &MetricValue::Count(0));
    assert_eq!(first.get(MetricKind::Hosts), &MetricValue::Count(5));
    assert_eq!(first.get(MetricKind::HbacRules), &MetricValue::Count(1));
    assert_eq!(first.get(MetricKind::Certificates), &MetricValue::Count(4));
    assert_eq!(first.get(MetricKind::LdapConflicts), &MetricValue::Count(0));
    assert_eq!(first.get(MetricKind::GhostReplicas), &MetricValue::Count(0));
    assert_eq!(
        first.get(MetricKind::AnonymousBind),
        &MetricValue::Status(AnonymousBindState::RootDse)
    );
    assert_eq!(first.get(MetricKind::AdTrust), &MetricValue::Flag(false));
    let replication = first
        .get(MetricKind::Replication)
        .as_replication()
        .expect("replication summary");
    assert!(replication.healthy);
    assert_eq!(replication.to_string(), "ipa02 0\nipa03 0");

    let verdict = FleetAggregator::default().aggregate(&reports);
    assert_eq!(verdict.failures, 0);
    assert_eq!(verdict.status, FleetStatus::Ok);
    assert_eq!(verdict.summary(), "OK - 17/17 checks passed");
}

#[tokio::test]
async fn diverging_user_count_is_reported() {
    let mut lagging = Replica::new("ipa03.example.com");
    lagging.active_users = 119;
    let replicas = vec![
        Replica::new("ipa01.example.com"),
        Replica::new("ipa02.example.com"),
        lagging,
    ];
    let reports = scanner(replicas, &[]).scan(&fleet()).await;

    let verdict = FleetAggregator::default().aggregate(&reports);
    let users = verdict.check(MetricKind::ActiveUsers).expect("users check");
    assert!(!users.consistent);
    assert_eq!(verdict.failures, 1);
    assert_eq!(verdict.status, FleetStatus::Warning);

    let strict = FleetAggregator::new(Thresholds::new(1, 1).expect("valid thresholds"));
    assert_eq!(strict.aggregate(&reports).status, FleetStatus::Critical);
}

#[tokio::test]
async fn rejected_bind_makes_server_unreachable() {
    let mut locked = Replica::new("ipa02.example.com");
    locked.accept_bind = false;
    let replicas = vec![
        Replica::new("ipa01.example.com"),
        locked,
        Replica::new("ipa03.example.com"),
    ];
    let reports = scanner(replicas, &[]).scan(&fleet()).await;

    assert!(reports[0].is_reachable());
    assert!(!reports[1].is_reachable());
    assert!(reports[1]
        .metrics()
        .all(|(_, value)| value.is_unavailable()));

    let verdict = FleetAggregator::default().aggregate(&reports);
    assert_eq!(verdict.failures, verdict.total());
    assert_eq!(verdict.status, FleetStatus::Critical);
}

#[tokio::test]
async fn foreign_naming_context_is_rejected() {
    let mut impostor = Replica::new("ipa02.example.com");
    impostor.naming_context = "dc=corp,dc=example,dc=org".to_string();
    let replicas = vec![Replica::new("ipa01.example.com"), impostor];
    let reports = scanner(replicas, &[])
        .scan(&["ipa01.example.com".to_string(), "ipa02.example.com".to_string()])
        .await;

    assert!(reports[0].is_reachable());
    assert!(!reports[1].is_reachable());
}

#[tokio::test]
async fn missing_ca_and_trust_controllers() {
    let mut without_ca = Replica::new("ipa02.example.com");
    without_ca.with_ca = false;
    let replicas = vec![Replica::new("ipa01.example.com"), without_ca];
    let reports = scanner(replicas, &["ipa01.example.com"])
        .scan(&["ipa01.example.com".to_string(), "ipa02.example.com".to_string()])
        .await;

    assert_eq!(reports[0].get(MetricKind::AdTrust), &MetricValue::Flag(true));
    assert_eq!(reports[1].get(MetricKind::AdTrust), &MetricValue::Flag(false));
    assert_eq!(reports[1].get(MetricKind::Certificates), &MetricValue::NotDeployed);
    assert_eq!(reports[1].get(MetricKind::Netgroups), &MetricValue::Count(0));

    let verdict = FleetAggregator::default().aggregate(&reports);
    assert!(!verdict.check(MetricKind::Certificates).expect("certs").consistent);
    assert!(!verdict.check(MetricKind::AdTrust).expect("msdcs").consistent);
}

#[tokio::test]
async fn unknown_server_is_unreachable() {
    let reports = scanner(vec![Replica::new("ipa01.example.com")], &[])
        .scan(&["ipa09.example.com".to_string()])
        .await;
    assert!(!reports[0].is_reachable());
    assert_eq!(reports[0].hostname_short, "ipa09");
}
