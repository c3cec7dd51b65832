//! Apply command implementation.

use std::sync::Arc;

use crate::cli::ProfileArgs;
use crate::config::BootstrapConfig;
use crate::keycloak::KeycloakAdminClient;
use crate::orchestrator::{RunReport, SetupOrchestrator};
use crate::output::{info, print_report, OutputFormat};
use crate::profile::ProfileParams;

use super::profile_graph;

/// Converges the server to a profile.
///
/// ## Errors
///
/// Fails only when the topology is invalid or the initial connection to
/// the server fails; per-entity failures are part of the report.
pub async fn run_apply(
    args: &ProfileArgs,
    config: &BootstrapConfig,
    format: OutputFormat,
) -> crate::BootstrapResult<RunReport> {
    let graph = profile_graph(args.profile, config)?;
    let store = Arc::new(KeycloakAdminClient::new(config)?);

    if format == OutputFormat::Table {
        info(&format!(
            "Connecting to Keycloak at {} as {}...",
            config.base_url(),
            config.admin_username
        ));
        if let Some(agent) = args.profile.agent_spiffe_id(&ProfileParams::from_config(config)) {
            info(&format!("Agent SPIFFE ID: {agent}"));
        }
    }

    let report = SetupOrchestrator::new(store, graph)
        .with_admin_realm(config.admin_realm.clone())
        .run()
        .await?;

    print_report(&report, format)?;
    if format == OutputFormat::Table {
        let params = ProfileParams::from_config(config);
        let steps = args.profile.next_steps(&params, &report);
        if !steps.is_empty() {
            println!();
            info("Next steps:");
            for step in steps {
                println!("  {step}");
            }
        }
    }
    Ok(report)
}
