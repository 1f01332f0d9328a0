//! Identity of an audited directory server.

use cipa_core::discovery::normalize_dns_name;
use url::Url;

use crate::dn::DistinguishedName;
use crate::Result;

/// Names of one fleet member, derived once from its host name and the IPA domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    fqdn: String,
    hostname_short: String,
    domain: String,
    base_dn: DistinguishedName,
}

impl ServerIdentity {
    /// Creates the identity of `fqdn` within `domain`.
    ///
    /// The short host name strips the `.domain` suffix; names outside the domain fall back to
    /// their first label.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is empty or the domain cannot form a base DN.
    pub fn new(fqdn: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let fqdn = normalize_dns_name(&fqdn.into());
        let domain = normalize_dns_name(&domain.into());
        if fqdn.is_empty() {
            return Err(cipa_core::Error::InvalidRequest(
                "server name cannot be empty".to_string(),
            ));
        }
        let base_dn = DistinguishedName::from_domain(&domain)?;
        let hostname_short = short_hostname(&fqdn, &domain);

        Ok(Self {
            fqdn,
            hostname_short,
            domain,
            base_dn,
        })
    }

    /// Fully-qualified host name (lowercase).
    #[must_use]
    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Short host name used for display.
    #[must_use]
    pub fn hostname_short(&self) -> &str {
        &self.hostname_short
    }

    /// IPA domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Base DN derived from the domain.
    #[must_use]
    pub fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// LDAPS URL of the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name does not form a valid URL.
    pub fn ldap_url(&self, port: u16) -> Result<Url> {
        Url::parse(&format!("ldaps://{}:{port}", self.fqdn)).map_err(|err| {
            cipa_core::Error::InvalidRequest(format!("invalid server name {}: {err}", self.fqdn))
        })
    }
}

/// Derives the short host name of `fqdn` within `domain`.
#[must_use]
pub fn short_hostname(fqdn: &str, domain: &str) -> String {
    let suffix = format!(".{domain}");
    match fqdn.strip_suffix(&suffix) {
        Some(short) if !short.is_empty() => short.to_string(),
        _ => fqdn.split('.').next().unwrap_or(fqdn).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_names() {
        let identity = ServerIdentity::new("IPA01.Example.com", "example.com").unwrap();
        assert_eq!(identity.fqdn(), "ipa01.example.com");
        assert_eq!(identity.hostname_short(), "ipa01");
        assert_eq!(identity.domain(), "example.com");
        assert_eq!(identity.base_dn().as_str(), "dc=example,dc=com");
        assert_eq!(
            identity.ldap_url(636).unwrap().as_str(),
            "ldaps://ipa01.example.com:636"
        );
    }

    #[test]
    fn short_name_keeps_subdomain_labels() {
        assert_eq!(short_hostname("ipa01.dc1.example.com", "example.com"), "ipa01.dc1");
        assert_eq!(short_hostname("ipa01.other.org", "example.com"), "ipa01");
        assert_eq!(short_hostname("ipa01", "example.com"), "ipa01");
    }

    #[test]
    fn same_domain_same_base_dn() {
        let a = ServerIdentity::new("ipa01.example.com", "example.com").unwrap();
        let b = ServerIdentity::new("ipa02.example.com", "example.com").unwrap();
        assert_eq!(a.base_dn(), b.base_dn());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ServerIdentity::new("", "example.com").is_err());
        assert!(ServerIdentity::new("ipa01.example.com", "").is_err());
    }
}
