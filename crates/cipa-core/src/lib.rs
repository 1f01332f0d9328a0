//! # cipa-core
//!
//! Core types and utilities for auditing a fleet of FreeIPA directory replicas.
//!
//! This crate holds everything that does not need a live directory connection: the metric
//! model collected from each server, the cross-server consistency evaluation, fleet
//! configuration and DNS based server discovery.
//!
//! ## Modules
//!
//! - [`error`] - Error type shared by all cipa crates
//! - [`types`] - Metric kinds, metric values and per-server reports
//! - [`consistency`] - Fleet aggregation and monitoring severity classification
//! - [`config`] - Fleet configuration and bind credentials
//! - [`discovery`] - DNS SRV lookups used for server discovery and AD-trust detection

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod consistency;
pub mod discovery;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
