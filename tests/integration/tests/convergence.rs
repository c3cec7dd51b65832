//! Convergence properties of a full setup run.

use std::collections::BTreeSet;

use kc_bootstrap::{EntityKind, EntityStatus, Profile, SetupOrchestrator};

use crate::common::{apply, profile_graph, proxy_chain_graph, store, REALM};

fn audiences(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[tokio::test]
async fn second_run_changes_nothing() -> anyhow::Result<()> {
    let store = store();

    let first = apply(&store, profile_graph(Profile::Quickstart)?).await?;
    assert!(first.is_converged());
    let after_first = store.snapshot();
    let creations = store.creations().len();

    let second = apply(&store, profile_graph(Profile::Quickstart)?).await?;
    assert!(second.is_converged());
    assert_eq!(second.created(), 0);
    assert_eq!(store.snapshot(), after_first);
    assert_eq!(store.creations().len(), creations);

    for entry in &second.entries {
        let expected = if entry.kind == EntityKind::ScopeBinding {
            EntityStatus::AlreadyBound
        } else {
            EntityStatus::Existing
        };
        assert_eq!(entry.status, expected, "{} '{}'", entry.kind, entry.key);
    }
    assert_eq!(first.secrets, second.secrets);
    Ok(())
}

#[tokio::test]
async fn near_match_user_does_not_hide_desired_user() -> anyhow::Result<()> {
    let store = store();
    store.seed_realm(REALM);
    store.seed_user(REALM, "alice2");

    let report = apply(&store, profile_graph(Profile::Authbridge)?).await?;

    assert_eq!(
        report.status_of(EntityKind::User, "alice"),
        Some(EntityStatus::Created)
    );
    assert_eq!(store.count_users(REALM, "alice"), 1);
    assert_eq!(store.count_users(REALM, "alice2"), 1);
    Ok(())
}

#[tokio::test]
async fn lost_creation_race_converges_to_one_client() -> anyhow::Result<()> {
    let store = store();
    store.seed_realm(REALM);
    store.race_creation(EntityKind::Client, "authproxy");

    let report = apply(&store, proxy_chain_graph()?).await?;

    assert!(report.is_converged());
    assert_eq!(
        report.status_of(EntityKind::Client, "authproxy"),
        Some(EntityStatus::Existing)
    );
    assert_eq!(store.count_clients(REALM, "authproxy"), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_runs_create_each_entity_once() -> anyhow::Result<()> {
    let store = store();
    let graph = proxy_chain_graph()?;
    let a = SetupOrchestrator::new(store.clone(), graph.clone());
    let b = SetupOrchestrator::new(store.clone(), graph);

    let (first, second) = tokio::join!(a.run(), b.run());
    assert!(first?.is_converged());
    assert!(second?.is_converged());

    assert_eq!(store.count_clients(REALM, "authproxy"), 1);
    assert_eq!(store.count_scopes(REALM, "authproxy-aud"), 1);
    assert_eq!(store.count_scopes(REALM, "demoapp-aud"), 1);
    Ok(())
}

#[tokio::test]
async fn realm_default_audience_is_in_every_token() -> anyhow::Result<()> {
    let store = store();
    let graph = profile_graph(Profile::Authbridge)?;
    let agent = graph.caller.clone();
    apply(&store, graph).await?;

    let token = store.issue_token(REALM, "any-client", &[]);
    assert!(token.contains(&agent));
    assert!(!token.contains("auth-target"));

    let exchanged = store.issue_token(REALM, &agent, &["auth-target-aud"]);
    assert!(exchanged.contains("auth-target"));
    Ok(())
}

#[tokio::test]
async fn proxy_chain_carries_expected_audiences() -> anyhow::Result<()> {
    let store = store();
    apply(&store, proxy_chain_graph()?).await?;

    assert_eq!(store.issue_token(REALM, "caller", &[]), audiences(&["authproxy"]));
    assert!(store.issue_token(REALM, "some-other-client", &[]).contains("authproxy"));
    assert!(store.issue_token(REALM, "authproxy", &[]).contains("demoapp"));
    Ok(())
}

#[tokio::test]
async fn emulated_tokens_match_declared_graph() -> anyhow::Result<()> {
    for profile in [
        Profile::Quickstart,
        Profile::Unified,
        Profile::Authbridge,
        Profile::Webhook,
    ] {
        let store = store();
        let graph = profile_graph(profile)?;
        let report = apply(&store, graph.clone()).await?;
        assert!(report.is_converged(), "{profile:?}");
        assert!(graph.verify_chain().is_valid(), "{profile:?}");

        let mut participants: Vec<String> =
            graph.clients.iter().map(|c| c.client_id.clone()).collect();
        participants.push(graph.caller.clone());
        let scopes: Vec<&str> = graph.scopes.iter().map(|s| s.name.as_str()).collect();

        for client in &participants {
            assert_eq!(
                store.issue_token(REALM, client, &[]),
                graph.token_audiences(client, &[]),
                "{profile:?} {client}"
            );
            assert_eq!(
                store.issue_token(REALM, client, &scopes),
                graph.token_audiences(client, &scopes),
                "{profile:?} {client} requesting all scopes"
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn unreachable_server_aborts_before_any_change() -> anyhow::Result<()> {
    let store = store();
    store.set_unreachable(true);
    let before = store.snapshot();

    let result = apply(&store, profile_graph(Profile::Quickstart)?).await;

    assert!(result.is_err());
    assert_eq!(store.snapshot(), before);
    assert!(store.creations().is_empty());
    Ok(())
}

#[tokio::test]
async fn rejected_client_does_not_block_scopes() -> anyhow::Result<()> {
    let store = store();
    store.reject_creation(EntityKind::Client, "authproxy");

    let report = apply(&store, proxy_chain_graph()?).await?;

    assert_eq!(
        report.status_of(EntityKind::Client, "authproxy"),
        Some(EntityStatus::Failed)
    );
    assert_eq!(store.count_scopes(REALM, "authproxy-aud"), 1);
    assert_eq!(store.count_scopes(REALM, "demoapp-aud"), 1);
    assert_eq!(
        report.status_of(EntityKind::ScopeBinding, "realm default <- authproxy-aud"),
        Some(EntityStatus::Bound)
    );
    assert_eq!(
        report.status_of(EntityKind::ScopeBinding, "authproxy default <- demoapp-aud"),
        Some(EntityStatus::Skipped)
    );
    assert!(!report.is_converged());
    assert!(report.secrets.is_empty());
    Ok(())
}

#[tokio::test]
async fn rejected_binding_is_reported_as_failure() -> anyhow::Result<()> {
    let store = store();
    store.reject_binding("demoapp-aud");

    let report = apply(&store, proxy_chain_graph()?).await?;

    assert_eq!(
        report.status_of(EntityKind::ScopeBinding, "authproxy default <- demoapp-aud"),
        Some(EntityStatus::Failed)
    );
    assert_eq!(
        report.status_of(EntityKind::ScopeBinding, "realm default <- authproxy-aud"),
        Some(EntityStatus::Bound)
    );
    assert!(report.secrets.contains_key("authproxy"));
    Ok(())
}

#[tokio::test]
async fn interrupted_run_is_completed_by_rerun() -> anyhow::Result<()> {
    let store = store();
    store.interrupt_after(2);

    let first = apply(&store, profile_graph(Profile::Quickstart)?).await?;
    assert!(!first.is_converged());
    assert_eq!(
        store.creations(),
        vec![
            (EntityKind::Realm, REALM.to_string()),
            (EntityKind::Client, "application-caller".to_string()),
        ]
    );

    store.resume();
    let second = apply(&store, profile_graph(Profile::Quickstart)?).await?;

    assert!(second.is_converged());
    assert_eq!(
        second.status_of(EntityKind::Realm, REALM),
        Some(EntityStatus::Existing)
    );
    assert_eq!(
        second.status_of(EntityKind::Client, "application-caller"),
        Some(EntityStatus::Existing)
    );
    assert_eq!(
        second.status_of(EntityKind::Client, "authproxy"),
        Some(EntityStatus::Created)
    );
    assert_eq!(store.count_clients(REALM, "application-caller"), 1);
    assert_eq!(store.count_users(REALM, "test-user"), 1);

    assert!(store.creations()[2..]
        .iter()
        .all(|(kind, key)| !(*kind == EntityKind::Realm || key == "application-caller")));
    Ok(())
}
