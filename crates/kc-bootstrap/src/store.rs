//! Identity store port.
//!
//! [`IdentityStore`] is the only way the rest of the crate talks to the
//! identity provider. The HTTP implementation lives in
//! [`crate::keycloak`]; tests use an in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BootstrapResult;
use crate::model::{
    ClientRepresentation, ClientScopeRepresentation, ProtocolMapperRepresentation,
    RealmRepresentation, UserRepresentation,
};

/// Information about an established admin session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Realm the admin authenticated against.
    pub realm: String,
    /// Remaining token lifetime.
    pub expires_in: Duration,
}

/// Administrative operations against the identity provider.
///
/// Creation methods return the new entity's ID when the server reports it,
/// or `None` when the caller must resolve it again.
///
/// ## Errors
///
/// Implementations classify failures with [`crate::BootstrapError`]:
/// `Conflict` for "already exists", `Validation` for rejected payloads,
/// `Transient` for network failures and `Authentication` for credentials.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Establishes the admin session.
    async fn authenticate(&self) -> BootstrapResult<SessionInfo>;

    /// Lists all realms.
    async fn list_realms(&self) -> BootstrapResult<Vec<RealmRepresentation>>;

    /// Creates a realm.
    async fn create_realm(&self, realm: &RealmRepresentation) -> BootstrapResult<()>;

    /// Searches clients by `client_id`. The search may match loosely.
    async fn find_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> BootstrapResult<Vec<ClientRepresentation>>;

    /// Creates a client.
    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> BootstrapResult<Option<String>>;

    /// Lists all client scopes in a realm.
    async fn list_client_scopes(&self, realm: &str)
        -> BootstrapResult<Vec<ClientScopeRepresentation>>;

    /// Creates a client scope.
    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> BootstrapResult<Option<String>>;

    /// Lists the protocol mappers of a client scope.
    async fn list_scope_mappers(
        &self,
        realm: &str,
        scope_id: &str,
    ) -> BootstrapResult<Vec<ProtocolMapperRepresentation>>;

    /// Adds a protocol mapper to a client scope.
    async fn add_scope_mapper(
        &self,
        realm: &str,
        scope_id: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> BootstrapResult<Option<String>>;

    /// Adds a scope to the realm's default scope set.
    async fn add_realm_default_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()>;

    /// Adds a scope to the realm's optional scope set.
    async fn add_realm_optional_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()>;

    /// Adds a default scope to one client.
    async fn add_client_default_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()>;

    /// Adds an optional scope to one client.
    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()>;

    /// Searches users by username. The search may match loosely.
    async fn find_users(&self, realm: &str, username: &str)
        -> BootstrapResult<Vec<UserRepresentation>>;

    /// Creates a user, including its initial credentials.
    async fn create_user(
        &self,
        realm: &str,
        user: &UserRepresentation,
    ) -> BootstrapResult<Option<String>>;

    /// Retrieves a confidential client's secret.
    async fn get_client_secret(&self, realm: &str, client_uuid: &str) -> BootstrapResult<String>;
}
