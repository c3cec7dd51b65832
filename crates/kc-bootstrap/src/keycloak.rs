//! HTTP adapter for the Keycloak admin REST API.
//!
//! Owns the admin session: the bearer token is obtained with the password
//! grant against the admin realm, refreshed shortly before it expires, and
//! re-acquired once if an admin call is answered with 401.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, BootstrapResult, ErrorKind};
use crate::model::{
    ClientRepresentation, ClientScopeRepresentation, ClientSecret,
    ProtocolMapperRepresentation, RealmRepresentation, TokenResponse, UserRepresentation,
};
use crate::store::{IdentityStore, SessionInfo};

/// Tokens are refreshed this long before they expire.
const REFRESH_SKEW: Duration = Duration::from_secs(10);

/// Base delay between retries of transient failures.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Admin credentials.
#[derive(Clone)]
pub struct AdminCredentials {
    /// Realm the admin user lives in.
    pub realm: String,
    /// Public client used for the password grant.
    pub client_id: String,
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An authenticated admin session.
#[derive(Debug, Clone)]
pub struct AdminSession {
    access_token: String,
    expires_at: Instant,
}

impl AdminSession {
    fn from_token(token: TokenResponse) -> Self {
        Self {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_SKEW < self.expires_at
    }

    fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Keycloak admin API client.
pub struct KeycloakAdminClient {
    http: reqwest::Client,
    base_url: String,
    credentials: AdminCredentials,
    session: RwLock<Option<AdminSession>>,
    max_retries: u32,
}

impl KeycloakAdminClient {
    /// Creates a new client. No request is made until [`IdentityStore::authenticate`].
    pub fn new(config: &BootstrapConfig) -> BootstrapResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            credentials: AdminCredentials {
                realm: config.admin_realm.clone(),
                client_id: config.admin_client_id.clone(),
                username: config.admin_username.clone(),
                password: config.admin_password.clone(),
            },
            session: RwLock::new(None),
            max_retries: config.max_retries,
        })
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url,
            urlencoding::encode(&self.credentials.realm)
        )
    }

    /// Performs the password grant, retrying transient failures.
    async fn login(&self) -> BootstrapResult<AdminSession> {
        let url = self.token_url();
        let params = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];

        let mut attempt = 0;
        loop {
            let result = match self.http.post(&url).form(&params).send().await {
                Ok(response) if response.status().is_success() => {
                    let token: TokenResponse = response.json().await?;
                    return Ok(AdminSession::from_token(token));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = error_body(response).await;
                    match status {
                        400 | 401 | 403 => Err(BootstrapError::Authentication(format!(
                            "token request for '{}' rejected: {status} - {message}",
                            self.credentials.username
                        ))),
                        _ => Err(BootstrapError::from_status(status, "Token", message)),
                    }
                }
                Err(e) => Err(transport_error(&url, &e)),
            };

            match result {
                Err(err) if err.kind() == ErrorKind::Retryable && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!("Token request failed ({}), retry {}", err, attempt);
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// Returns a valid bearer token, logging in again when needed.
    async fn bearer(&self) -> BootstrapResult<String> {
        let cached = self
            .session
            .read()
            .as_ref()
            .filter(|s| s.is_fresh())
            .map(|s| s.access_token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        tracing::debug!("Refreshing admin session");
        let session = self.login().await?;
        let token = session.access_token.clone();
        *self.session.write() = Some(session);
        Ok(token)
    }

    fn invalidate_session(&self) {
        *self.session.write() = None;
    }

    /// Executes an admin request with authentication, retries and status mapping.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        resource_type: &str,
    ) -> BootstrapResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        let mut reauthenticated = false;

        loop {
            let token = self.bearer().await?;
            let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = &body {
                request = request.json(body);
            }

            let err = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED && !reauthenticated => {
                    tracing::debug!("Admin session rejected, authenticating again");
                    reauthenticated = true;
                    self.invalidate_session();
                    continue;
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = error_body(response).await;
                    BootstrapError::from_status(status, resource_type, message)
                }
                Err(e) => transport_error(&url, &e),
            };

            if err.kind() == ErrorKind::Retryable && attempt < self.max_retries {
                attempt += 1;
                tracing::debug!("{} {} failed ({}), retry {}", method, path, err, attempt);
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                continue;
            }
            return Err(err);
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource_type: &str,
    ) -> BootstrapResult<T> {
        let response = self.execute(Method::GET, path, None, resource_type).await?;
        Ok(response.json().await?)
    }

    async fn post_created<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        resource_type: &str,
    ) -> BootstrapResult<Option<String>> {
        let body = serde_json::to_value(body)?;
        let response = self
            .execute(Method::POST, path, Some(body), resource_type)
            .await?;
        Ok(id_from_location(response.headers()))
    }

    async fn put_empty(&self, path: &str, resource_type: &str) -> BootstrapResult<()> {
        self.execute(Method::PUT, path, None, resource_type).await?;
        Ok(())
    }
}

/// Builds `/admin/realms/{realm}{rest}` with the realm name encoded.
fn realm_path(realm: &str, rest: &str) -> String {
    format!("/admin/realms/{}{}", urlencoding::encode(realm), rest)
}

/// Extracts the created entity ID from the `Location` header.
fn id_from_location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)?
        .to_str()
        .ok()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn transport_error(url: &str, err: &reqwest::Error) -> BootstrapError {
    BootstrapError::Transient(format!("request to {url} failed: {err}"))
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[async_trait]
impl IdentityStore for KeycloakAdminClient {
    async fn authenticate(&self) -> BootstrapResult<SessionInfo> {
        let session = self.login().await?;
        let info = SessionInfo {
            realm: self.credentials.realm.clone(),
            expires_in: session.remaining(),
        };
        *self.session.write() = Some(session);
        tracing::info!(
            "Authenticated as '{}' against realm '{}'",
            self.credentials.username,
            self.credentials.realm
        );
        Ok(info)
    }

    async fn list_realms(&self) -> BootstrapResult<Vec<RealmRepresentation>> {
        self.get_json("/admin/realms", "Realm").await
    }

    async fn create_realm(&self, realm: &RealmRepresentation) -> BootstrapResult<()> {
        self.post_created("/admin/realms", realm, "Realm").await?;
        Ok(())
    }

    async fn find_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> BootstrapResult<Vec<ClientRepresentation>> {
        let path = realm_path(
            realm,
            &format!("/clients?clientId={}", urlencoding::encode(client_id)),
        );
        self.get_json(&path, "Client").await
    }

    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> BootstrapResult<Option<String>> {
        self.post_created(&realm_path(realm, "/clients"), client, "Client")
            .await
    }

    async fn list_client_scopes(
        &self,
        realm: &str,
    ) -> BootstrapResult<Vec<ClientScopeRepresentation>> {
        self.get_json(&realm_path(realm, "/client-scopes"), "ClientScope")
            .await
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> BootstrapResult<Option<String>> {
        self.post_created(&realm_path(realm, "/client-scopes"), scope, "ClientScope")
            .await
    }

    async fn list_scope_mappers(
        &self,
        realm: &str,
        scope_id: &str,
    ) -> BootstrapResult<Vec<ProtocolMapperRepresentation>> {
        let path = realm_path(
            realm,
            &format!("/client-scopes/{scope_id}/protocol-mappers/models"),
        );
        self.get_json(&path, "AudienceMapper").await
    }

    async fn add_scope_mapper(
        &self,
        realm: &str,
        scope_id: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> BootstrapResult<Option<String>> {
        let path = realm_path(
            realm,
            &format!("/client-scopes/{scope_id}/protocol-mappers/models"),
        );
        self.post_created(&path, mapper, "AudienceMapper").await
    }

    async fn add_realm_default_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()> {
        let path = realm_path(realm, &format!("/default-default-client-scopes/{scope_id}"));
        self.put_empty(&path, "ScopeBinding").await
    }

    async fn add_realm_optional_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()> {
        let path = realm_path(realm, &format!("/default-optional-client-scopes/{scope_id}"));
        self.put_empty(&path, "ScopeBinding").await
    }

    async fn add_client_default_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()> {
        let path = realm_path(
            realm,
            &format!("/clients/{client_uuid}/default-client-scopes/{scope_id}"),
        );
        self.put_empty(&path, "ScopeBinding").await
    }

    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()> {
        let path = realm_path(
            realm,
            &format!("/clients/{client_uuid}/optional-client-scopes/{scope_id}"),
        );
        self.put_empty(&path, "ScopeBinding").await
    }

    async fn find_users(
        &self,
        realm: &str,
        username: &str,
    ) -> BootstrapResult<Vec<UserRepresentation>> {
        let path = realm_path(
            realm,
            &format!("/users?username={}", urlencoding::encode(username)),
        );
        self.get_json(&path, "User").await
    }

    async fn create_user(
        &self,
        realm: &str,
        user: &UserRepresentation,
    ) -> BootstrapResult<Option<String>> {
        self.post_created(&realm_path(realm, "/users"), user, "User")
            .await
    }

    async fn get_client_secret(&self, realm: &str, client_uuid: &str) -> BootstrapResult<String> {
        let path = realm_path(realm, &format!("/clients/{client_uuid}/client-secret"));
        let secret: ClientSecret = self.get_json(&path, "Client").await?;
        Ok(secret.value)
    }
}
