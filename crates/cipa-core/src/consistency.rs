//! Cross-server consistency evaluation.
//!
//! The aggregator is a pure function of the collected [`ServerReport`]s: it decides for every
//! [`MetricKind`] whether the fleet agrees, counts the failed checks and classifies the result
//! into a monitoring severity using operator supplied thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{ConsistencyRule, MetricKind, MetricValue, ServerReport};

/// Default number of failed checks before a warning.
pub const DEFAULT_WARNING_THRESHOLD: u32 = 1;
/// Default number of failed checks before a critical.
pub const DEFAULT_CRITICAL_THRESHOLD: u32 = 2;

/// Overall fleet classification, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetStatus {
    /// Failed checks below the warning threshold
    Ok,
    /// Failed checks between the warning and critical thresholds
    Warning,
    /// Failed checks at or above the critical threshold
    Critical,
    /// The fleet could not be evaluated
    Unknown,
}

impl FleetStatus {
    /// Monitoring plugin exit code (0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN).
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Unknown => 3,
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

/// Warning and critical thresholds, counted in failed checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    warning: u32,
    critical: u32,
}

impl Thresholds {
    /// Creates validated thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `warning` is greater than `critical`.
    pub fn new(warning: u32, critical: u32) -> Result<Self> {
        if warning > critical {
            return Err(Error::ConfigError(format!(
                "warning threshold ({warning}) must not exceed critical threshold ({critical})"
            )));
        }
        Ok(Self { warning, critical })
    }

    /// Failed checks at which the fleet becomes WARNING.
    #[must_use]
    pub const fn warning(&self) -> u32 {
        self.warning
    }

    /// Failed checks at which the fleet becomes CRITICAL.
    #[must_use]
    pub const fn critical(&self) -> u32 {
        self.critical
    }

    /// Classifies a number of failed checks.
    #[must_use]
    pub fn classify(&self, failures: usize) -> FleetStatus {
        let failures = u64::try_from(failures).unwrap_or(u64::MAX);
        if failures < u64::from(self.warning) {
            FleetStatus::Ok
        } else if failures < u64::from(self.critical) {
            FleetStatus::Warning
        } else {
            FleetStatus::Critical
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_THRESHOLD,
            critical: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

/// A value reported by one host for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostValue {
    /// Host name as requested
    pub host: String,
    /// Reported value
    pub value: MetricValue,
}

/// Consistency of one metric across the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVerdict {
    /// Metric that was compared
    pub kind: MetricKind,
    /// True if the fleet agrees
    pub consistent: bool,
    /// Participating values in report order
    pub values: Vec<HostValue>,
}

/// Outcome of a full fleet evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetVerdict {
    /// One verdict per metric kind, in display order
    pub checks: Vec<CheckVerdict>,
    /// Number of inconsistent metrics
    pub failures: usize,
    /// Overall classification
    pub status: FleetStatus,
}

impl FleetVerdict {
    /// Number of metrics evaluated.
    #[must_use]
    pub fn total(&self) -> usize {
        self.checks.len()
    }

    /// Number of consistent metrics.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.total() - self.failures
    }

    /// Returns the verdict for a single metric.
    #[must_use]
    pub fn check(&self, kind: MetricKind) -> Option<&CheckVerdict> {
        self.checks.iter().find(|check| check.kind == kind)
    }

    /// One line monitoring summary, e.g. `OK - 17/17 checks passed`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} - {}/{} checks passed",
            self.status,
            self.passed(),
            self.total()
        )
    }
}

/// Outcome of a single-metric check; bypasses thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleCheckVerdict {
    /// Metric that was compared
    pub kind: MetricKind,
    /// True if the fleet agrees
    pub consistent: bool,
    /// `OK` when consistent, otherwise `CRITICAL`
    pub status: FleetStatus,
}

impl SingleCheckVerdict {
    /// One line monitoring summary, e.g. `CRITICAL - LDAP Conflicts`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} - {}", self.status, self.kind.label())
    }
}

/// Aggregates per-server reports into fleet verdicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FleetAggregator {
    thresholds: Thresholds,
}

impl FleetAggregator {
    /// Creates an aggregator using the given thresholds.
    #[must_use]
    pub const fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Returns the configured thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Evaluates every metric kind and classifies the fleet.
    ///
    /// An empty report set cannot be judged: every check fails and the status is `UNKNOWN`.
    #[must_use]
    pub fn aggregate(&self, reports: &[ServerReport]) -> FleetVerdict {
        let checks = MetricKind::all()
            .iter()
            .map(|kind| evaluate(reports, *kind))
            .collect::<Vec<_>>();
        let failures = checks.iter().filter(|check| !check.consistent).count();

        let status = if reports.is_empty() {
            FleetStatus::Unknown
        } else {
            self.thresholds.classify(failures)
        };

        FleetVerdict {
            checks,
            failures,
            status,
        }
    }

    /// Evaluates a single metric; the status is `OK` or `CRITICAL`.
    #[must_use]
    pub fn check(&self, reports: &[ServerReport], kind: MetricKind) -> SingleCheckVerdict {
        let consistent = evaluate(reports, kind).consistent;
        SingleCheckVerdict {
            kind,
            consistent,
            status: if consistent {
                FleetStatus::Ok
            } else {
                FleetStatus::Critical
            },
        }
    }
}

/// Evaluates the consistency of one metric across reports.
#[must_use]
pub fn evaluate(reports: &[ServerReport], kind: MetricKind) -> CheckVerdict {
    let values = reports
        .iter()
        .map(|report| HostValue {
            host: report.host.clone(),
            value: report.get(kind).clone(),
        })
        .collect::<Vec<_>>();
    let consistent = is_consistent(kind, values.iter().map(|entry| &entry.value));

    CheckVerdict {
        kind,
        consistent,
        values,
    }
}

/// Applies the metric's consistency rule to a set of values.
///
/// The first value is the baseline. An `Unavailable` participant is never consistent, and an
/// empty set is never consistent.
pub fn is_consistent<'a, I>(kind: MetricKind, values: I) -> bool
where
    I: IntoIterator<Item = &'a MetricValue>,
{
    let values = values.into_iter().collect::<Vec<_>>();
    let Some(baseline) = values.first() else {
        return false;
    };
    if values.iter().any(|value| value.is_unavailable()) {
        return false;
    }

    match kind.consistency_rule() {
        ConsistencyRule::Uniform => values.iter().all(|value| value == baseline),
        ConsistencyRule::UniformZero => values.iter().all(|value| value.as_count() == Some(0)),
        ConsistencyRule::AllHealthy => values
            .iter()
            .all(|value| value.as_replication().is_some_and(|summary| summary.healthy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnonymousBindState, ReplicationAgreement, ReplicationSummary};

    fn report(host: &str, metrics: &[(MetricKind, MetricValue)]) -> ServerReport {
        let short = host.split('.').next().unwrap_or(host);
        metrics
            .iter()
            .fold(ServerReport::builder(host, short), |builder, (kind, value)| {
                builder.metric(*kind, value.clone())
            })
            .build()
    }

    fn healthy_report(host: &str) -> ServerReport {
        let metrics = MetricKind::all()
            .iter()
            .map(|kind| {
                let value = match kind {
                    MetricKind::AnonymousBind => MetricValue::Status(AnonymousBindState::Off),
                    MetricKind::AdTrust => MetricValue::Flag(false),
                    MetricKind::Replication => {
                        MetricValue::ReplicationSummary(ReplicationSummary::from_agreements(
                            vec![ReplicationAgreement::new("peer", "0")],
                        ))
                    }
                    MetricKind::LdapConflicts | MetricKind::GhostReplicas => MetricValue::Count(0),
                    _ => MetricValue::Count(10),
                };
                (*kind, value)
            })
            .collect::<Vec<_>>();
        report(host, &metrics)
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(Thresholds::new(1, 2).is_ok());
        assert!(Thresholds::new(2, 2).is_ok());
        assert!(matches!(Thresholds::new(3, 2), Err(Error::ConfigError(_))));
        assert_eq!(Thresholds::default(), Thresholds::new(1, 2).unwrap());
    }

    #[test]
    fn test_classification() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(0), FleetStatus::Ok);
        assert_eq!(thresholds.classify(1), FleetStatus::Warning);
        assert_eq!(thresholds.classify(2), FleetStatus::Critical);
        assert_eq!(thresholds.classify(3), FleetStatus::Critical);

        let lenient = Thresholds::new(3, 5).unwrap();
        assert_eq!(lenient.classify(2), FleetStatus::Ok);
        assert_eq!(lenient.classify(4), FleetStatus::Warning);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FleetStatus::Ok.code(), 0);
        assert_eq!(FleetStatus::Warning.code(), 1);
        assert_eq!(FleetStatus::Critical.code(), 2);
        assert_eq!(FleetStatus::Unknown.code(), 3);
    }

    #[test]
    fn test_uniform_counts() {
        let same = [MetricValue::Count(120), MetricValue::Count(120)];
        assert!(is_consistent(MetricKind::ActiveUsers, &same));

        let differs = [MetricValue::Count(120), MetricValue::Count(119)];
        assert!(!is_consistent(MetricKind::ActiveUsers, &differs));

        let missing = [MetricValue::Count(0), MetricValue::Unavailable];
        assert!(!is_consistent(MetricKind::ActiveUsers, &missing));
    }

    #[test]
    fn test_not_deployed_agrees_only_with_itself() {
        let all_absent = [MetricValue::NotDeployed, MetricValue::NotDeployed];
        assert!(is_consistent(MetricKind::Certificates, &all_absent));

        let mixed = [MetricValue::NotDeployed, MetricValue::Count(0)];
        assert!(!is_consistent(MetricKind::Certificates, &mixed));
    }

    #[test]
    fn test_conflicts_require_zero() {
        let clean = [MetricValue::Count(0), MetricValue::Count(0)];
        assert!(is_consistent(MetricKind::LdapConflicts, &clean));

        let uniform_nonzero = [MetricValue::Count(2), MetricValue::Count(2)];
        assert!(!is_consistent(MetricKind::LdapConflicts, &uniform_nonzero));
        assert!(!is_consistent(MetricKind::GhostReplicas, &uniform_nonzero));
    }

    #[test]
    fn test_replication_requires_all_healthy() {
        let a = MetricValue::ReplicationSummary(ReplicationSummary::from_agreements(vec![
            ReplicationAgreement::new("ipa02", "0"),
        ]));
        let b = MetricValue::ReplicationSummary(ReplicationSummary::from_agreements(vec![
            ReplicationAgreement::new("ipa01", "0"),
            ReplicationAgreement::new("ipa03", "0"),
        ]));
        assert!(is_consistent(MetricKind::Replication, [&a, &b]));

        let broken = MetricValue::ReplicationSummary(ReplicationSummary::from_agreements(vec![
            ReplicationAgreement::new("ipa01", "5"),
        ]));
        assert!(!is_consistent(MetricKind::Replication, [&broken, &broken]));
        assert!(!is_consistent(
            MetricKind::Replication,
            [&a, &MetricValue::Unavailable]
        ));
    }

    #[test]
    fn test_empty_is_inconsistent() {
        assert!(!is_consistent(MetricKind::Hosts, Vec::<MetricValue>::new().iter()));
        let verdict = FleetAggregator::default().aggregate(&[]);
        assert_eq!(verdict.status, FleetStatus::Unknown);
        assert_eq!(verdict.failures, MetricKind::all().len());
    }

    #[test]
    fn test_aggregate_healthy_fleet() {
        let reports = vec![
            healthy_report("ipa01.example.com"),
            healthy_report("ipa02.example.com"),
        ];
        let verdict = FleetAggregator::default().aggregate(&reports);
        assert_eq!(verdict.failures, 0);
        assert_eq!(verdict.status, FleetStatus::Ok);
        assert_eq!(verdict.summary(), "OK - 17/17 checks passed");
        assert_eq!(
            verdict.check(MetricKind::Hosts).unwrap().values[1].host,
            "ipa02.example.com"
        );
    }

    #[test]
    fn test_aggregate_single_mismatch_warns() {
        let mut reports = vec![
            healthy_report("ipa01.example.com"),
            healthy_report("ipa02.example.com"),
        ];
        reports.push(report(
            "ipa03.example.com",
            &healthy_report("ipa03.example.com")
                .metrics()
                .map(|(kind, value)| {
                    if kind == MetricKind::ActiveUsers {
                        (kind, MetricValue::Count(9))
                    } else {
                        (kind, value.clone())
                    }
                })
                .collect::<Vec<_>>(),
        ));

        let aggregator = FleetAggregator::default();
        let verdict = aggregator.aggregate(&reports);
        assert_eq!(verdict.failures, 1);
        assert_eq!(verdict.status, FleetStatus::Warning);
        assert!(!verdict.check(MetricKind::ActiveUsers).unwrap().consistent);

        let single = aggregator.check(&reports, MetricKind::ActiveUsers);
        assert_eq!(single.status, FleetStatus::Critical);
        assert_eq!(single.status.code(), 2);
        assert_eq!(single.summary(), "CRITICAL - Active Users");

        let hosts = aggregator.check(&reports, MetricKind::Hosts);
        assert_eq!(hosts.status.code(), 0);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let reports = vec![
            healthy_report("ipa01.example.com"),
            ServerReport::unreachable("ipa02.example.com", "ipa02", "timeout"),
        ];
        let aggregator = FleetAggregator::default();
        let first = aggregator.aggregate(&reports);
        let second = aggregator.aggregate(&reports);
        assert_eq!(first, second);
        assert_eq!(first.failures, MetricKind::all().len());
        assert_eq!(first.status, FleetStatus::Critical);
    }
}
