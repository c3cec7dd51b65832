//! Plan command implementation.

use crate::cli::ProfileArgs;
use crate::config::BootstrapConfig;
use crate::output::{info, print_plan, OutputFormat};

use super::profile_graph;

/// Prints the desired graph of a profile.
pub fn run_plan(
    args: &ProfileArgs,
    config: &BootstrapConfig,
    format: OutputFormat,
) -> crate::BootstrapResult<()> {
    let graph = profile_graph(args.profile, config)?;
    if format == OutputFormat::Table {
        info(&format!(
            "Plan for profile '{:?}' in realm '{}' at {}",
            args.profile,
            graph.realm.name,
            config.base_url()
        ));
    }
    print_plan(&graph, format)
}
