//! Configuration file handling

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in the user configuration directory.
pub const CONFIG_FILE_NAME: &str = "checkipaconsistency.yaml";

/// Domain shipped in the sample configuration; a file still using it has not been edited.
const PLACEHOLDER_DOMAIN: &str = "ipa.example.com";

/// Settings read from the YAML configuration file. Every field is optional; command-line options
/// take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// IPA domain
    pub domain: Option<String>,
    /// Servers to audit
    pub hosts: Option<HostList>,
    /// Bind DN
    pub binddn: Option<String>,
    /// Bind password
    pub bindpw: Option<String>,
    /// Failed checks before WARNING
    pub warning: Option<u32>,
    /// Failed checks before CRITICAL
    pub critical: Option<u32>,
    /// Connect and bind timeout in seconds
    pub timeout: Option<u64>,
    /// Whole-scan deadline in seconds
    pub deadline: Option<u64>,
    /// LDAPS port
    pub port: Option<u16>,
    /// Verify server certificates
    pub tls_verify: Option<bool>,
    /// PEM file with the IPA CA certificate
    pub tls_ca_cert: Option<PathBuf>,
    /// Servers audited at once
    pub max_concurrency: Option<usize>,
}

/// Host list written either as a YAML sequence or as one comma/space separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HostList {
    /// `hosts: [ipa01.example.com, ipa02.example.com]`
    List(Vec<String>),
    /// `hosts: "ipa01.example.com, ipa02.example.com"`
    Text(String),
}

impl HostList {
    /// Flattens the list into individual host names.
    pub fn into_hosts(self) -> Vec<String> {
        match self {
            Self::List(hosts) => hosts,
            Self::Text(text) => split_hosts(&text),
        }
    }
}

/// Splits a comma and/or whitespace separated host string.
fn split_hosts(text: &str) -> Vec<String> {
    text.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl FileConfig {
    /// Loads the configuration from `path`, or from the default location.
    ///
    /// A missing file, or one still holding the sample domain, yields the empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_config_path() {
                Some(path) => path,
                None => {
                    debug!("no configuration directory on this platform");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "config file not found");
            return Ok(Self::default());
        }

        debug!(path = %path.display(), "loading configuration file");
        let config = Self::load_from_file(&path)?;
        if config.domain.as_deref() == Some(PLACEHOLDER_DOMAIN) {
            debug!(
                path = %path.display(),
                "sample configuration found, ignoring it - PLEASE EDIT IT!"
            );
            return Ok(Self::default());
        }
        Ok(config)
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}
