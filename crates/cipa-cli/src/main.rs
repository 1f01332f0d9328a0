//! cipa - consistency check across FreeIPA servers

use anyhow::{Context, Result};
use cipa_core::config::{BindCredentials, FleetConfig, DEFAULT_BIND_DN};
use cipa_core::consistency::{
    FleetAggregator, Thresholds, DEFAULT_CRITICAL_THRESHOLD, DEFAULT_WARNING_THRESHOLD,
};
use cipa_core::discovery::{DnsServerDiscovery, HickorySrvLookup, ServerDiscovery, SrvLookup};
use cipa_core::types::MetricKind;
use cipa_ldap::{DirectoryConfig, FleetScanner};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, warn};

mod config;
mod logging;
mod output;

use config::{FileConfig, HostList};
use output::{OutputFormat, TableStyle};

/// Exit code used for configuration and discovery errors.
const EXIT_FAILURE: u8 = 1;
/// Exit code used when interrupted.
const EXIT_INTERRUPTED: u8 = 130;

/// Tool to check consistency across FreeIPA servers
#[derive(Debug, Parser)]
#[command(name = "cipa")]
#[command(version)]
pub struct Cli {
    /// List of IPA servers (discovered from DNS when omitted)
    #[arg(short = 'H', long, num_args = 1.., value_delimiter = ',')]
    hosts: Vec<String>,

    /// IPA domain
    #[arg(short, long)]
    domain: Option<String>,

    /// Bind DN (default: cn=Directory Manager)
    #[arg(short = 'D', long, env = "CIPA_BINDDN")]
    binddn: Option<String>,

    /// Bind password
    #[arg(short = 'W', long, env = "CIPA_BINDPW", hide_env_values = true)]
    bindpw: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debugging mode
    #[arg(long)]
    debug: bool,

    /// Do not log to console
    #[arg(long)]
    quiet: bool,

    /// Log to file (./cipa.log by default)
    #[arg(
        short,
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "cipa.log"
    )]
    log_file: Option<PathBuf>,

    /// Disable table header
    #[arg(long)]
    no_header: bool,

    /// Disable table border
    #[arg(long)]
    no_border: bool,

    /// Nagios plugin mode: `all` or a single check key
    #[arg(
        short = 'n',
        long,
        value_name = "CHECK",
        num_args = 0..=1,
        default_missing_value = "all",
        value_parser = parse_check
    )]
    nagios: Option<NagiosCheck>,

    /// Number of failed checks before warning
    #[arg(short, long)]
    warning: Option<u32>,

    /// Number of failed checks before critical
    #[arg(short, long)]
    critical: Option<u32>,

    /// Connect and bind timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Deadline for the whole scan in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

/// Monitoring mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NagiosCheck {
    /// Every check, classified against the thresholds
    All,
    /// A single check, OK or CRITICAL
    Single(MetricKind),
}

fn parse_check(value: &str) -> std::result::Result<NagiosCheck, String> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Ok(NagiosCheck::All);
    }
    value.parse::<MetricKind>().map(NagiosCheck::Single).map_err(|_| {
        let keys = MetricKind::all()
            .iter()
            .map(MetricKind::key)
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown check '{value}' (expected all, {keys})")
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(cli.debug, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(EXIT_FAILURE);
    }
    debug!(hosts = ?cli.hosts, domain = ?cli.domain, nagios = ?cli.nagios, "starting");

    tokio::select! {
        outcome = run(cli) => match outcome {
            Ok(code) => code,
            Err(err) => {
                error!("{err:#}");
                ExitCode::from(EXIT_FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let mut config = fleet_config(&cli, file)?;
    config.validate_for_scan()?;

    let dns: Arc<dyn SrvLookup> = Arc::new(
        HickorySrvLookup::from_system_conf(config.operation_timeout())
            .context("Failed to initialise DNS resolver")?,
    );

    if config.hosts.is_empty() {
        debug!(domain = %config.domain, "searching for IPA servers in DNS");
        config.hosts = DnsServerDiscovery::new(Arc::clone(&dns))
            .discover_servers(&config.domain)
            .await?;
    }
    debug!(servers = %config.hosts.join(", "), "IPA servers");

    let scanner = FleetScanner::new(DirectoryConfig::from(&config), dns);
    let reports = scanner.scan(&config.hosts).await;
    let aggregator = FleetAggregator::new(config.thresholds);

    match cli.nagios {
        Some(NagiosCheck::All) => {
            let verdict = aggregator.aggregate(&reports);
            println!("{}", verdict.summary());
            Ok(ExitCode::from(exit_status(verdict.status.code())))
        }
        Some(NagiosCheck::Single(kind)) => {
            let verdict = aggregator.check(&reports, kind);
            println!("{}", verdict.summary());
            Ok(ExitCode::from(exit_status(verdict.status.code())))
        }
        None => {
            let verdict = aggregator.aggregate(&reports);
            match cli.format {
                OutputFormat::Table => {
                    let style = TableStyle {
                        header: !cli.no_header,
                        border: !cli.no_border,
                    };
                    println!("{}", output::render_table(&reports, &verdict, style));
                }
                OutputFormat::Json => println!("{}", output::render_json(&reports, &verdict)?),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Merges command-line options over the configuration file.
fn fleet_config(cli: &Cli, file: FileConfig) -> Result<FleetConfig> {
    let domain = cli.domain.clone().or(file.domain).unwrap_or_default();
    let bind_dn = cli
        .binddn
        .clone()
        .or(file.binddn)
        .unwrap_or_else(|| DEFAULT_BIND_DN.to_string());
    let bind_password = cli.bindpw.clone().or(file.bindpw).unwrap_or_default();

    let hosts = if cli.hosts.is_empty() {
        file.hosts.map(HostList::into_hosts).unwrap_or_default()
    } else {
        cli.hosts.clone()
    };

    let thresholds = Thresholds::new(
        cli.warning.or(file.warning).unwrap_or(DEFAULT_WARNING_THRESHOLD),
        cli.critical.or(file.critical).unwrap_or(DEFAULT_CRITICAL_THRESHOLD),
    )?;

    let mut config = FleetConfig::new(domain, BindCredentials::new(bind_dn, bind_password))
        .with_hosts(hosts)
        .with_thresholds(thresholds);
    if let Some(timeout) = cli.timeout.or(file.timeout) {
        config = config.with_connection_timeout(timeout);
    }
    if let Some(deadline) = cli.deadline.or(file.deadline) {
        config = config.with_scan_deadline(deadline);
    }
    if let Some(port) = file.port {
        config = config.with_port(port);
    }
    if let Some(verify) = file.tls_verify {
        config = config.with_tls_verify(verify);
    }
    if let Some(path) = file.tls_ca_cert {
        config = config.with_tls_ca_cert(path);
    }
    if let Some(limit) = file.max_concurrency {
        config = config.with_max_concurrency(limit);
    }
    Ok(config)
}

/// Clamps a monitoring severity to a process exit status; anything unexpected is UNKNOWN.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(3)
}
