//! Verify command implementation.

use crate::cli::ProfileArgs;
use crate::config::BootstrapConfig;
use crate::output::{print_chain, OutputFormat};

use super::profile_graph;

/// Evaluates the exchange chain of a profile.
///
/// Returns whether every hop receives its audience.
pub fn run_verify(
    args: &ProfileArgs,
    config: &BootstrapConfig,
    format: OutputFormat,
) -> crate::BootstrapResult<bool> {
    let graph = profile_graph(args.profile, config)?;
    let report = graph.verify_chain();
    print_chain(&report, format)?;
    Ok(report.is_valid())
}
