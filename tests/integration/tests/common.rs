//! Common test utilities and fixtures.

use std::sync::Arc;

use kc_bootstrap::entity::{ClientFlags, ClientSpec, RealmSpec};
use kc_bootstrap::testing::InMemoryStore;
use kc_bootstrap::{
    AudienceGraph, AudienceGraphBuilder, Hop, Placement, Profile, ProfileParams, RunReport,
    SetupOrchestrator, Topology,
};

/// Realm every fixture provisions.
pub const REALM: &str = "demo";

/// Initializes tracing once for the test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kc_bootstrap=debug")
        .with_test_writer()
        .try_init();
}

/// Profile parameters with every default.
pub fn params() -> ProfileParams {
    ProfileParams {
        realm: REALM.to_string(),
        trust_domain: "localtest.me".to_string(),
        namespace: None,
        service_account: None,
    }
}

/// Graph of a built-in profile.
pub fn profile_graph(profile: Profile) -> anyhow::Result<AudienceGraph> {
    Ok(AudienceGraphBuilder::new(profile.topology(&params())).build()?)
}

/// `authproxy-aud` realm-default, `demoapp-aud` default on `authproxy`.
pub fn proxy_chain_graph() -> anyhow::Result<AudienceGraph> {
    let authproxy = ClientSpec::confidential("authproxy", "Auth Proxy")
        .with_flags(ClientFlags {
            service_accounts: true,
            ..Default::default()
        })
        .with_token_exchange();

    let topology = Topology {
        realm: RealmSpec::new(REALM),
        caller: "caller".to_string(),
        hops: vec![
            Hop::new("authproxy", "authproxy-aud", Placement::RealmDefault)
                .with_client(authproxy)
                .exchanged_by("authproxy"),
            Hop::new("demoapp", "demoapp-aud", Placement::ClientDefault),
        ],
        extra_clients: Vec::new(),
        users: Vec::new(),
        reveal_secrets: vec!["authproxy".to_string()],
    };
    Ok(AudienceGraphBuilder::new(topology).build()?)
}

/// A fresh store containing only the `master` realm.
pub fn store() -> Arc<InMemoryStore> {
    init_tracing();
    Arc::new(InMemoryStore::new())
}

/// Runs a full setup against the store.
pub async fn apply(store: &Arc<InMemoryStore>, graph: AudienceGraph) -> anyhow::Result<RunReport> {
    Ok(SetupOrchestrator::new(store.clone(), graph).run().await?)
}
