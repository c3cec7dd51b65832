//! Command implementations.

pub mod apply;
pub mod plan;
pub mod verify;

pub use apply::run_apply;
pub use plan::run_plan;
pub use verify::run_verify;

use crate::config::BootstrapConfig;
use crate::graph::{AudienceGraph, AudienceGraphBuilder};
use crate::profile::{Profile, ProfileParams};

/// Builds the audience graph of a profile under the effective configuration.
pub fn profile_graph(profile: Profile, config: &BootstrapConfig) -> crate::BootstrapResult<AudienceGraph> {
    let params = ProfileParams::from_config(config);
    AudienceGraphBuilder::new(profile.topology(&params)).build()
}
