//! Distinguished names of the entries the audit reads.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use cipa_core::error::Error as CoreError;

/// Errors that can occur when parsing or deriving distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component is not of the form `attribute=value`.
    #[error("invalid distinguished name component: {0:?}")]
    InvalidComponent(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// A domain name could not be turned into a `dc=` chain.
    #[error("invalid domain name: {0:?}")]
    InvalidDomain(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    fn eq_ignore_case(&self, other: &Self) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.to_lowercase() == other.value.to_lowercase()
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Distinguished name held as its RDN sequence plus the canonical string form.
///
/// Multi-valued RDNs (`a=1+b=2`) do not occur in the entries read here and are kept as one
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parses a string DN, normalizing whitespace around separators.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the name is empty or malformed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }
        let rdns = split_components(input)?
            .iter()
            .map(|component| parse_component(component))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rdns(rdns))
    }

    /// Derives the base DN of a domain: `example.com` becomes `dc=example,dc=com`.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError::InvalidDomain`] if the domain is empty or has an empty
    /// label.
    pub fn from_domain(domain: &str) -> Result<Self, DistinguishedNameError> {
        let labels = domain
            .trim()
            .trim_end_matches('.')
            .split('.')
            .collect::<Vec<_>>();
        if labels.iter().any(|label| label.trim().is_empty()) {
            return Err(DistinguishedNameError::InvalidDomain(domain.to_string()));
        }
        Ok(Self::from_rdns(
            labels
                .into_iter()
                .map(|label| Rdn::new("dc", label.trim()))
                .collect(),
        ))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let raw = rdns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, rdns }
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Value of the first RDN with the given attribute (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(|rdn| rdn.value.as_str())
    }

    /// Returns the DN of the `cn=<name>` child of this entry.
    #[must_use]
    pub fn child(&self, cn: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new("cn", cn));
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Returns the DN of a nested container, `path` listed from the innermost RDN outwards.
    ///
    /// `base.container(&["users", "accounts"])` yields `cn=users,cn=accounts,<base>`.
    #[must_use]
    pub fn container(&self, path: &[&str]) -> Self {
        path.iter().rev().fold(self.clone(), |dn, cn| dn.child(cn))
    }

    /// True if both names have the same RDNs, ignoring case.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len()
            && self
                .rdns
                .iter()
                .zip(&other.rdns)
                .all(|(left, right)| left.eq_ignore_case(right))
    }

    /// Encodes the DN for use as an RDN value inside another DN, the way the 389 mapping tree
    /// names suffix entries (`dc=example,dc=com` becomes `dc\3Dexample\2Cdc\3Dcom`).
    #[must_use]
    pub fn mapping_tree_value(&self) -> String {
        self.raw.replace('=', "\\3D").replace(',', "\\2C")
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits on unescaped commas, keeping escapes for the value parser.
fn split_components(input: &str) -> Result<Vec<String>, DistinguishedNameError> {
    let mut components = vec![String::new()];
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or(DistinguishedNameError::UnterminatedEscape)?;
                if let Some(current) = components.last_mut() {
                    current.push('\\');
                    current.push(escaped);
                }
            }
            ',' => components.push(String::new()),
            _ => {
                if let Some(current) = components.last_mut() {
                    current.push(ch);
                }
            }
        }
    }
    Ok(components)
}

fn parse_component(component: &str) -> Result<Rdn, DistinguishedNameError> {
    let invalid = || DistinguishedNameError::InvalidComponent(component.trim().to_string());
    let (attribute, value) = component.split_once('=').ok_or_else(invalid)?;
    let (attribute, value) = (attribute.trim(), value.trim());
    if attribute.is_empty() || value.is_empty() || attribute.contains('\\') {
        return Err(invalid());
    }
    Ok(Rdn::new(attribute, unescape_value(value)))
}

fn unescape_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => result.extend(chars.next()),
            _ => result.push(ch),
        }
    }
    result
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (index, ch) in value.chars().enumerate() {
        let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (index == 0 && matches!(ch, ' ' | '#'))
            || (index == last && ch == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("cn=users,cn=accounts,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("users"));
        assert_eq!(dn.get("DC"), Some("example"));
        assert_eq!(dn.to_string(), "cn=users,cn=accounts,dc=example,dc=com");
    }

    #[test]
    fn parse_dn_with_escape() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,cn=users,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert!(dn.as_str().starts_with("cn=Smith\\, John,cn=users"));
    }

    #[test]
    fn parse_normalizes_whitespace() {
        let dn: DistinguishedName = " dc=example, dc = com ".parse().unwrap();
        assert_eq!(dn.as_str(), "dc=example,dc=com");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert_eq!(
            DistinguishedName::parse("  "),
            Err(DistinguishedNameError::Empty)
        );
        assert!(matches!(
            DistinguishedName::parse("cn=users,"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("users"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
        assert_eq!(
            DistinguishedName::parse("cn=users\\"),
            Err(DistinguishedNameError::UnterminatedEscape)
        );
    }

    #[test]
    fn base_dn_from_domain() {
        let dn = DistinguishedName::from_domain("example.com").unwrap();
        assert_eq!(dn.as_str(), "dc=example,dc=com");

        let nested = DistinguishedName::from_domain("ipa.corp.example.com.").unwrap();
        assert_eq!(nested.as_str(), "dc=ipa,dc=corp,dc=example,dc=com");
    }

    #[test]
    fn base_dn_from_invalid_domain() {
        assert!(matches!(
            DistinguishedName::from_domain(""),
            Err(DistinguishedNameError::InvalidDomain(_))
        ));
        assert!(DistinguishedName::from_domain("example..com").is_err());
    }

    #[test]
    fn container_paths() {
        let base = DistinguishedName::from_domain("example.com").unwrap();
        assert_eq!(
            base.container(&["staged users", "accounts", "provisioning"])
                .as_str(),
            "cn=staged users,cn=accounts,cn=provisioning,dc=example,dc=com"
        );
        assert_eq!(base.child("hbac").as_str(), "cn=hbac,dc=example,dc=com");
    }

    #[test]
    fn case_insensitive_match() {
        let reported = DistinguishedName::parse("DC=Example, DC=Com").unwrap();
        let expected = DistinguishedName::from_domain("example.com").unwrap();
        assert!(reported.matches(&expected));
        assert_ne!(reported, expected);

        let parent = DistinguishedName::from_domain("com").unwrap();
        assert!(!parent.matches(&expected));
    }

    #[test]
    fn mapping_tree_value() {
        let base = DistinguishedName::from_domain("example.com").unwrap();
        assert_eq!(base.mapping_tree_value(), "dc\\3Dexample\\2Cdc\\3Dcom");
    }

    #[test]
    fn core_error_conversion() {
        let err: CoreError = DistinguishedNameError::Empty.into();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }
}
