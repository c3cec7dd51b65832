//! Built-in demo topologies.

use clap::ValueEnum;
use serde::Serialize;

use crate::config::BootstrapConfig;
use crate::entity::{ClientFlags, ClientSpec, RealmSpec, UserSpec};
use crate::graph::{Hop, Placement, Topology};
use crate::orchestrator::RunReport;

const DEFAULT_SERVICE_ACCOUNT: &str = "agent";

/// A demo deployment to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// application-caller → authproxy → demoapp, with client-level scopes.
    Quickstart,
    /// Auto-registered caller → authproxy → demoapp, realm-default entry scope.
    Unified,
    /// SPIFFE-identified agent exchanging for auth-target.
    Authbridge,
    /// Like `authbridge`, with the scope named after namespace and service account.
    Webhook,
}

/// Inputs a profile is parameterized by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileParams {
    /// Realm to provision.
    pub realm: String,
    /// SPIFFE trust domain.
    pub trust_domain: String,
    /// Agent namespace; the profile default when unset.
    pub namespace: Option<String>,
    /// Agent service account; the profile default when unset.
    pub service_account: Option<String>,
}

impl ProfileParams {
    /// Takes the parameters from the effective configuration.
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            realm: config.realm.clone(),
            trust_domain: config.trust_domain.clone(),
            namespace: config.namespace.clone(),
            service_account: config.service_account.clone(),
        }
    }
}

/// Builds the SPIFFE ID of a Kubernetes workload.
#[must_use]
pub fn spiffe_id(trust_domain: &str, namespace: &str, service_account: &str) -> String {
    format!("spiffe://{trust_domain}/ns/{namespace}/sa/{service_account}")
}

fn service_client(client_id: &str, name: &str) -> ClientSpec {
    ClientSpec::confidential(client_id, name)
        .with_flags(ClientFlags {
            service_accounts: true,
            ..Default::default()
        })
        .with_token_exchange()
}

fn demo_user(username: &str, password: &str, email: &str, first: &str, last: &str) -> UserSpec {
    UserSpec {
        username: username.to_string(),
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        password: password.to_string(),
        enabled: true,
        email_verified: true,
    }
}

impl Profile {
    /// Default agent namespace, for profiles that have an agent.
    #[must_use]
    pub const fn default_namespace(self) -> Option<&'static str> {
        match self {
            Self::Quickstart | Self::Unified => None,
            Self::Authbridge => Some("authbridge"),
            Self::Webhook => Some("team1"),
        }
    }

    /// Effective agent namespace and service account.
    fn workload<'a>(self, params: &'a ProfileParams) -> (&'a str, &'a str) {
        let namespace = params
            .namespace
            .as_deref()
            .or(self.default_namespace())
            .unwrap_or("default");
        let service_account = params
            .service_account
            .as_deref()
            .unwrap_or(DEFAULT_SERVICE_ACCOUNT);
        (namespace, service_account)
    }

    /// SPIFFE ID of the agent, for profiles that have one.
    #[must_use]
    pub fn agent_spiffe_id(self, params: &ProfileParams) -> Option<String> {
        self.default_namespace().map(|_| {
            let (namespace, service_account) = self.workload(params);
            spiffe_id(&params.trust_domain, namespace, service_account)
        })
    }

    /// Desired topology of this profile.
    #[must_use]
    pub fn topology(self, params: &ProfileParams) -> Topology {
        let realm = RealmSpec::new(&params.realm);
        match self {
            Self::Quickstart => Topology {
                realm,
                caller: "application-caller".to_string(),
                hops: vec![
                    Hop::new("authproxy", "authproxy-aud", Placement::ClientDefault)
                        .with_client(service_client("authproxy", "Auth Proxy"))
                        .exchanged_by("authproxy"),
                    Hop::new("demoapp", "demoapp-aud", Placement::ClientDefault),
                ],
                extra_clients: vec![ClientSpec::confidential(
                    "application-caller",
                    "Application Caller",
                )
                .with_flags(ClientFlags {
                    direct_access_grants: true,
                    ..Default::default()
                })],
                users: vec![demo_user(
                    "test-user",
                    "password",
                    "test-user@test.com",
                    "test-user",
                    "test-user",
                )],
                reveal_secrets: vec!["application-caller".to_string()],
            },
            Self::Unified => Topology {
                realm,
                caller: "caller".to_string(),
                hops: vec![
                    Hop::new("authproxy", "authproxy-aud", Placement::RealmDefault)
                        .with_client(service_client("authproxy", "Auth Proxy"))
                        .exchanged_by("authproxy"),
                    Hop::new("demoapp", "demoapp-aud", Placement::ClientDefault),
                ],
                extra_clients: Vec::new(),
                users: Vec::new(),
                reveal_secrets: vec!["authproxy".to_string()],
            },
            Self::Authbridge | Self::Webhook => {
                let (namespace, service_account) = self.workload(params);
                let agent = spiffe_id(&params.trust_domain, namespace, service_account);
                let agent_scope = if self == Self::Webhook {
                    format!("agent-{namespace}-{service_account}-aud")
                } else {
                    "agent-spiffe-aud".to_string()
                };
                Topology {
                    realm,
                    caller: agent.clone(),
                    hops: vec![
                        Hop::new(agent.clone(), agent_scope, Placement::RealmDefault)
                            .exchanged_by(agent),
                        Hop::new("auth-target", "auth-target-aud", Placement::RealmOptional)
                            .with_client(service_client("auth-target", "Auth Target")),
                    ],
                    extra_clients: Vec::new(),
                    users: vec![demo_user(
                        "alice",
                        "alice123",
                        "alice@example.com",
                        "Alice",
                        "Demo",
                    )],
                    reveal_secrets: Vec::new(),
                }
            }
        }
    }

    /// Short operator hints printed after a run.
    #[must_use]
    pub fn next_steps(self, params: &ProfileParams, report: &RunReport) -> Vec<String> {
        let secret_of = |client_id: &str| {
            report
                .secrets
                .get(client_id)
                .cloned()
                .unwrap_or_else(|| "<unavailable>".to_string())
        };
        match self {
            Self::Quickstart => vec![format!(
                "export CLIENT_SECRET={}",
                secret_of("application-caller")
            )],
            Self::Unified => vec![
                format!(
                    "kubectl patch secret auth-proxy-config -p '{{\"stringData\":{{\"CLIENT_SECRET\":\"{}\"}}}}'",
                    secret_of("authproxy")
                ),
                "The caller client is auto-registered by the client-registration init container."
                    .to_string(),
            ],
            Self::Authbridge | Self::Webhook => {
                let (namespace, _) = self.workload(params);
                let agent = self.agent_spiffe_id(params).unwrap_or_default();
                vec![
                    format!("Deploy the agent in namespace '{namespace}'; it registers as '{agent}'."),
                    "Exchanged tokens must request scope 'auth-target-aud' to reach auth-target."
                        .to_string(),
                ]
            }
        }
    }
}
