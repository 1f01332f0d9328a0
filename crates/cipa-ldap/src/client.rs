//! Directory session implementation.

use async_trait::async_trait;
use cipa_core::error::Error;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{config::DirectoryConfig, dn::DistinguishedName, identity::ServerIdentity, Result};

/// LDAP result code for a search base that does not exist.
const LDAP_NO_SUCH_OBJECT: u32 = 32;

const ROOT_DSE_ATTRIBUTES: &[&str] = &["defaultNamingContext"];
const SERVER_CONFIG_ATTRIBUTES: &[&str] = &["nsslapd-localhost"];

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP entry representation used by the client.
#[derive(Debug, Clone, Default)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserved order from server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry from a DN and attribute pairs.
    #[must_use]
    pub fn new<I, K>(dn: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: Into<String>,
    {
        Self {
            dn: dn.into(),
            attributes: attributes
                .into_iter()
                .map(|(name, values)| (name.into(), values))
                .collect(),
        }
    }

    /// Returns all values for the attribute; attribute names match case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// One authenticated-capable connection to a directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Performs a simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    /// Searches the directory.
    ///
    /// A missing search base is reported as [`Error::NoSuchObject`].
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    /// Closes the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens connections to directory servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Opens an unauthenticated connection to the server.
    async fn connect(&self, identity: &ServerIdentity) -> Result<Box<dyn LdapSession>>;
}

/// Authenticated session scoped to one server.
///
/// Queries are issued sequentially; the session is never shared between servers.
pub struct DirectorySession {
    identity: ServerIdentity,
    inner: Box<dyn LdapSession>,
    operation_timeout: Duration,
}

impl std::fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySession")
            .field("identity", &self.identity)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl DirectorySession {
    /// Connects, binds and verifies that the server is the expected fleet member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] or [`Error::Timeout`] if the server cannot be reached,
    /// [`Error::BindFailed`] if the credentials are rejected and [`Error::IdentityMismatch`] if
    /// the server reports a different host name or naming context.
    pub async fn establish(
        connector: &dyn LdapConnector,
        identity: &ServerIdentity,
        config: &DirectoryConfig,
    ) -> Result<Self> {
        let connection_timeout = config.connection_timeout();
        let mut inner = timeout(connection_timeout, connector.connect(identity))
            .await
            .map_err(|_| Error::Timeout(format!("connect to {} timed out", identity.fqdn())))??;

        let credentials = config.credentials();
        timeout(
            connection_timeout,
            inner.simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await
        .map_err(|_| Error::Timeout(format!("bind to {} timed out", identity.fqdn())))??;
        debug!(server = identity.fqdn(), "bind succeeded");

        let mut session = Self {
            identity: identity.clone(),
            inner,
            operation_timeout: config.operation_timeout(),
        };

        if let Err(err) = session.verify_identity().await {
            session.close().await;
            return Err(err);
        }
        Ok(session)
    }

    /// Identity of the server this session is bound to.
    #[must_use]
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Runs one search bounded by the operation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if `base_dn` does not exist, [`Error::Timeout`] if the
    /// server does not answer in time, or another error if the search fails.
    pub async fn query(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&'static str],
        scope: SearchScope,
    ) -> Result<Vec<LdapEntry>> {
        debug!(base = base_dn, filter, ?scope, "search");
        timeout(
            self.operation_timeout,
            self.inner.search(base_dn, scope, filter, attributes),
        )
        .await
        .map_err(|_| Error::Timeout(format!("search of {base_dn} timed out")))?
    }

    /// Unbinds; failures are only logged.
    pub async fn close(mut self) {
        match timeout(self.operation_timeout, self.inner.unbind()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(server = self.identity.fqdn(), "unbind failed: {err}"),
            Err(_) => debug!(server = self.identity.fqdn(), "unbind timed out"),
        }
    }

    async fn verify_identity(&mut self) -> Result<()> {
        let expected_base = self.identity.base_dn().clone();
        match self
            .read_attribute("", ROOT_DSE_ATTRIBUTES[0], ROOT_DSE_ATTRIBUTES)
            .await
        {
            Some(context) => {
                let reported = DistinguishedName::parse(&context)?;
                if !reported.matches(&expected_base) {
                    return Err(Error::IdentityMismatch {
                        expected: expected_base.to_string(),
                        actual: reported.to_string(),
                    });
                }
            }
            None => warn!(
                server = self.identity.fqdn(),
                "server does not report a default naming context; skipping base DN verification"
            ),
        }

        match self
            .read_attribute("cn=config", SERVER_CONFIG_ATTRIBUTES[0], SERVER_CONFIG_ATTRIBUTES)
            .await
        {
            Some(localhost) => {
                let reported = cipa_core::discovery::normalize_dns_name(&localhost);
                if reported != self.identity.fqdn() {
                    return Err(Error::IdentityMismatch {
                        expected: self.identity.fqdn().to_string(),
                        actual: reported,
                    });
                }
            }
            None => warn!(
                server = self.identity.fqdn(),
                "server does not report its host name; skipping host name verification"
            ),
        }

        Ok(())
    }

    async fn read_attribute(
        &mut self,
        base_dn: &str,
        attribute: &str,
        attributes: &[&'static str],
    ) -> Option<String> {
        match self
            .query(base_dn, "(objectClass=*)", attributes, SearchScope::Base)
            .await
        {
            Ok(entries) => entries
                .first()
                .and_then(|entry| entry.first(attribute))
                .map(str::to_owned),
            Err(err) => {
                debug!(base = base_dn, attribute, "attribute lookup failed: {err}");
                None
            }
        }
    }
}

/// Real LDAPS connector backed by `ldap3`.
pub struct LdapsConnector {
    config: Arc<DirectoryConfig>,
}

impl LdapsConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for LdapsConnector {
    async fn connect(&self, identity: &ServerIdentity) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let url = identity.ldap_url(self.config.port())?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|err| Error::ConnectionFailed(format!("{}: {err}", identity.fqdn())))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession { inner: ldap }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;
        result
            .success()
            .map_err(|err| Error::BindFailed(err.to_string()))?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let result = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?;
        if result.1.rc == LDAP_NO_SUCH_OBJECT {
            return Err(Error::NoSuchObject(base_dn.to_string()));
        }
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::ExternalServiceError {
        service: "ldap".to_string(),
        message: err.to_string(),
    }
}
