//! # kc-bootstrap
//!
//! Declarative bootstrap of Keycloak token-exchange topologies.
//!
//! This crate provides:
//! - An [`IdentityStore`] port and its admin REST adapter
//! - Exact-match entity resolution and race-tolerant resolve-or-create
//! - An audience graph that declares and verifies exchange chains
//! - A phase-ordered setup orchestrator with per-entity reporting
//! - The `kc-bootstrap` command-line tool

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod keycloak;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod profile;
pub mod reconciler;
pub mod resolver;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cli::Cli;
pub use config::BootstrapConfig;
pub use entity::{DesiredEntity, EntityKind, ScopeBinding, ScopeSet};
pub use error::{BootstrapError, BootstrapResult, ErrorKind};
pub use graph::{AudienceGraph, AudienceGraphBuilder, ChainReport, Hop, Placement, Topology};
pub use keycloak::KeycloakAdminClient;
pub use orchestrator::{EntityStatus, Phase, RunReport, SetupOrchestrator};
pub use profile::{Profile, ProfileParams};
pub use reconciler::{BindOutcome, Outcome, Reconciler};
pub use resolver::EntityResolver;
pub use store::IdentityStore;
