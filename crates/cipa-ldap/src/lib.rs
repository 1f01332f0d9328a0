//! Directory access for FreeIPA fleet audits.
//!
//! This crate provides authenticated LDAPS sessions to individual 389 Directory Server replicas,
//! the battery of queries that derives every metric of a [`cipa_core::types::ServerReport`], and
//! the fleet scanner that audits many servers concurrently.

#![deny(missing_docs)]

mod client;
mod collector;
mod config;
mod dn;
mod identity;
mod scanner;

pub use client::{
    DirectorySession, LdapConnector, LdapEntry, LdapSession, LdapsConnector, SearchScope,
};
pub use collector::MetricCollector;
pub use config::DirectoryConfig;
pub use dn::{DistinguishedName, DistinguishedNameError};
pub use identity::ServerIdentity;
pub use scanner::FleetScanner;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = cipa_core::Result<T>;
