//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;
use crate::profile::Profile;

/// kc-bootstrap - Converges a Keycloak realm to a token-exchange demo topology.
#[derive(Debug, Parser)]
#[command(name = "kc-bootstrap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Server URL (overrides config).
    #[arg(short, long, global = true, env = "KEYCLOAK_URL")]
    pub server: Option<String>,

    /// Realm to provision (overrides config).
    #[arg(short, long, global = true, env = "KEYCLOAK_REALM")]
    pub realm: Option<String>,

    /// Configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Admin username.
    #[arg(short, long, global = true, env = "KEYCLOAK_ADMIN_USERNAME")]
    pub username: Option<String>,

    /// Admin password.
    #[arg(long, global = true, env = "KEYCLOAK_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prompt for the admin password.
    #[arg(long, global = true, conflicts_with = "password")]
    pub prompt_password: bool,

    /// Agent namespace.
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Agent service account.
    #[arg(long, global = true)]
    pub service_account: Option<String>,

    /// SPIFFE trust domain.
    #[arg(long, global = true, env = "SPIFFE_TRUST_DOMAIN")]
    pub trust_domain: Option<String>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Converge the server to a profile.
    Apply(ProfileArgs),

    /// Print the entities and bindings of a profile without contacting the server.
    Plan(ProfileArgs),

    /// Walk a profile's exchange chain and check every audience.
    Verify(ProfileArgs),
}

/// Profile selection.
#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Topology to provision.
    #[arg(short, long, value_enum, default_value = "quickstart")]
    pub profile: Profile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_apply_with_overrides() {
        let cli = Cli::try_parse_from([
            "kc-bootstrap",
            "--server",
            "http://localhost:8080",
            "apply",
            "--profile",
            "webhook",
            "--namespace",
            "team2",
        ])
        .unwrap();

        assert_eq!(cli.server.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cli.namespace.as_deref(), Some("team2"));
        match cli.command {
            Command::Apply(args) => assert_eq!(args.profile, Profile::Webhook),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn prompt_conflicts_with_password() {
        let result = Cli::try_parse_from([
            "kc-bootstrap",
            "--password",
            "x",
            "--prompt-password",
            "plan",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn json_output() {
        let cli = Cli::try_parse_from(["kc-bootstrap", "-o", "json", "verify", "-p", "unified"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
    }
}
