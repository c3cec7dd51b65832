//! Admin API adapter against a mock Keycloak.

use std::sync::Arc;

use kc_bootstrap::entity::{ClientSpec, DesiredEntity};
use kc_bootstrap::{
    BindOutcome, BootstrapConfig, BootstrapError, EntityResolver, ErrorKind, IdentityStore, KeycloakAdminClient,
    Outcome, Reconciler, ScopeBinding, ScopeSet,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{init_tracing, REALM};

const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";

fn config(server_url: String) -> BootstrapConfig {
    BootstrapConfig {
        server_url,
        max_retries: 1,
        request_timeout_secs: 5,
        ..Default::default()
    }
}

fn token(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": value,
        "expires_in": 300,
    }))
}

async fn mock_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("tok-1"))
        .mount(server)
        .await;
}

async fn authenticated(server: &MockServer) -> anyhow::Result<Arc<KeycloakAdminClient>> {
    init_tracing();
    mock_token(server).await;
    let client = Arc::new(KeycloakAdminClient::new(&config(server.uri()))?);
    client.authenticate().await?;
    Ok(client)
}

fn authproxy() -> DesiredEntity {
    DesiredEntity::Client(ClientSpec::confidential("authproxy", "Auth Proxy").with_token_exchange())
}

#[tokio::test]
async fn password_grant_opens_session() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=admin-cli"))
        .respond_with(token("tok-1"))
        .expect(1)
        .mount(&server)
        .await;

    let client = KeycloakAdminClient::new(&config(server.uri()))?;
    let session = client.authenticate().await?;

    assert_eq!(session.realm, "master");
    assert!(session.expires_in.as_secs() > 200);
    Ok(())
}

#[tokio::test]
async fn rejected_credentials_are_authentication_errors() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid user credentials",
        })))
        .mount(&server)
        .await;

    let client = KeycloakAdminClient::new(&config(server.uri()))?;
    let err = client.authenticate().await.unwrap_err();

    assert!(matches!(err, BootstrapError::Authentication(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Fatal);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_retryable() -> anyhow::Result<()> {
    init_tracing();
    let client = KeycloakAdminClient::new(&BootstrapConfig {
        server_url: "http://127.0.0.1:9".to_string(),
        max_retries: 0,
        request_timeout_secs: 2,
        ..Default::default()
    })?;

    let err = client.authenticate().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Retryable);
    Ok(())
}

#[tokio::test]
async fn user_lookup_filters_exact_username() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/users"))
        .and(query_param("username", "alice"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "u-2", "username": "alice2", "enabled": true },
            { "id": "u-1", "username": "alice", "enabled": true },
        ])))
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(client, REALM);
    assert_eq!(resolver.find_user_id("alice").await?.as_deref(), Some("u-1"));
    Ok(())
}

#[tokio::test]
async fn near_match_only_resolves_to_none() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .and(query_param("clientId", "authproxy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c-9", "clientId": "authproxy-legacy", "enabled": true },
        ])))
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(client, REALM);
    assert!(resolver.find_client_id("authproxy").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn created_id_comes_from_location() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/demo/clients"))
        .and(body_string_contains("\"clientId\":\"authproxy\""))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "Location",
            format!("{}/admin/realms/demo/clients/c-1", server.uri()).as_str(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let outcome = reconciler.ensure(&authproxy()).await?;

    assert_eq!(outcome, Outcome::Created("c-1".to_string()));
    Ok(())
}

#[tokio::test]
async fn conflict_on_create_resolves_again() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c-7", "clientId": "authproxy", "enabled": true },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errorMessage": "Client authproxy already exists",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let outcome = reconciler.ensure(&authproxy()).await?;

    assert_eq!(outcome, Outcome::Existing("c-7".to_string()));
    Ok(())
}

#[tokio::test]
async fn rejected_payload_is_validation_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/demo/clients"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid redirect uri"))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let err = reconciler.ensure(&authproxy()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("invalid redirect uri"));
    Ok(())
}

#[tokio::test]
async fn expired_session_is_renewed_once() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("tok-1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(token("tok-2"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "m", "realm": "master", "enabled": true },
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = KeycloakAdminClient::new(&config(server.uri()))?;
    client.authenticate().await?;
    let realms = client.list_realms().await?;

    assert_eq!(realms.len(), 1);
    assert_eq!(realms[0].realm, "master");
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "realm": "master", "enabled": true },
            { "realm": "demo", "enabled": true },
        ])))
        .mount(&server)
        .await;

    let resolver = EntityResolver::new(client, "master");
    let realm = resolver.find_realm(REALM).await?;

    assert_eq!(realm.map(|r| r.name).as_deref(), Some(REALM));
    Ok(())
}

async fn mock_scope(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/client-scopes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "s-1", "name": "authproxy-aud", "protocol": "openid-connect" },
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn duplicate_binding_is_already_bound() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    mock_scope(&server).await;
    Mock::given(method("PUT"))
        .and(path("/admin/realms/demo/default-default-client-scopes/s-1"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let outcome = reconciler
        .bind(&ScopeBinding::realm("authproxy-aud", ScopeSet::Default))
        .await?;

    assert!(matches!(outcome, BindOutcome::AlreadyBound(_)));
    Ok(())
}

#[tokio::test]
async fn rejected_binding_is_an_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    mock_scope(&server).await;
    Mock::given(method("PUT"))
        .and(path("/admin/realms/demo/default-optional-client-scopes/s-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad scope"))
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let err = reconciler
        .bind(&ScopeBinding::realm("authproxy-aud", ScopeSet::Optional))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn client_binding_uses_internal_id() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    mock_scope(&server).await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .and(query_param("clientId", "application-caller"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c-3", "clientId": "application-caller", "enabled": true },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/admin/realms/demo/clients/c-3/default-client-scopes/s-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    let outcome = reconciler
        .bind(&ScopeBinding::client(
            "application-caller",
            "authproxy-aud",
            ScopeSet::Default,
        ))
        .await?;

    assert_eq!(outcome, BindOutcome::Bound);
    Ok(())
}

#[tokio::test]
async fn secret_is_read_by_client_id() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let client = authenticated(&server).await?;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients"))
        .and(query_param("clientId", "authproxy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c-1", "clientId": "authproxy", "enabled": true },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/demo/clients/c-1/client-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "secret",
            "value": "s3cr3t",
        })))
        .mount(&server)
        .await;

    let reconciler = Reconciler::new(client, REALM);
    assert_eq!(reconciler.client_secret("authproxy").await?, "s3cr3t");
    Ok(())
}
