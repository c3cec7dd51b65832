//! Bootstrap configuration.
//!
//! Values come from CLI flags, environment variables, a TOML file and
//! defaults, in that order of precedence. Flags and environment variables
//! are both resolved by `clap`; this module handles the file and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Credentials shipped with the demo Keycloak deployment.
const INSECURE_ADMIN: (&str, &str) = ("admin", "admin");

/// Bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Server URL (e.g., http://keycloak.localtest.me:8080).
    pub server_url: String,

    /// Realm to provision.
    pub realm: String,

    /// Realm the admin user authenticates against.
    pub admin_realm: String,

    /// Public client used for the admin password grant.
    pub admin_client_id: String,

    /// Admin username.
    pub admin_username: String,

    /// Admin password.
    #[serde(skip_serializing)]
    pub admin_password: String,

    /// SPIFFE trust domain used to derive workload audiences.
    pub trust_domain: String,

    /// Workload namespace (profile default when unset).
    pub namespace: Option<String>,

    /// Workload service account (profile default when unset).
    pub service_account: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for transient failures.
    pub max_retries: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            server_url: "http://keycloak.localtest.me:8080".to_string(),
            realm: "demo".to_string(),
            admin_realm: "master".to_string(),
            admin_client_id: "admin-cli".to_string(),
            admin_username: INSECURE_ADMIN.0.to_string(),
            admin_password: INSECURE_ADMIN.1.to_string(),
            trust_domain: "localtest.me".to_string(),
            namespace: None,
            service_account: None,
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl BootstrapConfig {
    /// Loads configuration from an explicit path, or from the default path
    /// when it exists.
    pub fn load(path: Option<&Path>) -> crate::BootstrapResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::config_path()?;
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> crate::BootstrapResult<Self> {
        toml::from_str(content).map_err(|e| {
            crate::BootstrapError::Config(format!("failed to parse config: {e}"))
        })
    }

    /// Gets the default configuration file path.
    pub fn config_path() -> crate::BootstrapResult<PathBuf> {
        let home = dirs_next::home_dir().ok_or_else(|| {
            crate::BootstrapError::Config("could not determine home directory".to_string())
        })?;
        Ok(home.join(".keycloak").join("kc-bootstrap.toml"))
    }

    /// Applies flag and environment overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(server) = &cli.server {
            self.server_url.clone_from(server);
        }
        if let Some(realm) = &cli.realm {
            self.realm.clone_from(realm);
        }
        if let Some(username) = &cli.username {
            self.admin_username.clone_from(username);
        }
        if let Some(password) = &cli.password {
            self.admin_password.clone_from(password);
        }
        if let Some(trust_domain) = &cli.trust_domain {
            self.trust_domain.clone_from(trust_domain);
        }
        if let Some(namespace) = &cli.namespace {
            self.namespace = Some(namespace.clone());
        }
        if let Some(service_account) = &cli.service_account {
            self.service_account = Some(service_account.clone());
        }
    }

    /// Validates required values.
    pub fn validate(&self) -> crate::BootstrapResult<()> {
        if self.server_url.is_empty() {
            return Err(crate::BootstrapError::Config("server_url is required".to_string()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(crate::BootstrapError::Config(format!(
                "server_url must be an http(s) URL: {}",
                self.server_url
            )));
        }
        if self.realm.is_empty() {
            return Err(crate::BootstrapError::Config("realm is required".to_string()));
        }
        if self.admin_username.is_empty() {
            return Err(crate::BootstrapError::Config(
                "admin username is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if the demo admin credentials are in use.
    #[must_use]
    pub fn uses_insecure_credentials(&self) -> bool {
        self.admin_username == INSECURE_ADMIN.0 && self.admin_password == INSECURE_ADMIN.1
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Server URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}
