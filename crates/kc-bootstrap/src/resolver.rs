//! Entity resolution.
//!
//! Maps desired entities to the IDs of existing remote entities. The admin
//! API's search endpoints match loosely (a search for `alice` also returns
//! `alice2`), so every lookup filters for an exact key match.

use std::sync::Arc;

use crate::error::BootstrapResult;
use crate::store::IdentityStore;

/// A realm that exists on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmDescriptor {
    /// Internal ID, when the server reports one.
    pub id: Option<String>,
    /// Realm name.
    pub name: String,
    /// Whether the realm is enabled.
    pub enabled: bool,
    /// Display name.
    pub display_name: Option<String>,
}

/// Read-only lookups by unique key within one realm.
#[derive(Clone)]
pub struct EntityResolver {
    store: Arc<dyn IdentityStore>,
    realm: String,
}

impl EntityResolver {
    /// Creates a resolver bound to a realm.
    pub fn new(store: Arc<dyn IdentityStore>, realm: impl Into<String>) -> Self {
        Self {
            store,
            realm: realm.into(),
        }
    }

    /// Realm this resolver looks up entities in.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Finds a realm by exact name.
    pub async fn find_realm(&self, name: &str) -> BootstrapResult<Option<RealmDescriptor>> {
        let realms = self.store.list_realms().await?;
        Ok(exact(realms, name, |r| &r.realm).map(|r| RealmDescriptor {
            id: r.id,
            name: r.realm,
            enabled: r.enabled,
            display_name: r.display_name,
        }))
    }

    /// Finds a client's internal ID by exact `client_id`.
    pub async fn find_client_id(&self, client_id: &str) -> BootstrapResult<Option<String>> {
        let clients = self.store.find_clients(&self.realm, client_id).await?;
        Ok(exact(clients, client_id, |c| &c.client_id).and_then(|c| c.id))
    }

    /// Finds a client scope's ID by exact name.
    pub async fn find_scope_id(&self, name: &str) -> BootstrapResult<Option<String>> {
        let scopes = self.store.list_client_scopes(&self.realm).await?;
        Ok(exact(scopes, name, |s| &s.name).and_then(|s| s.id))
    }

    /// Finds a protocol mapper's ID by exact name within a scope.
    pub async fn find_mapper_id(&self, scope_id: &str, name: &str) -> BootstrapResult<Option<String>> {
        let mappers = self.store.list_scope_mappers(&self.realm, scope_id).await?;
        Ok(exact(mappers, name, |m| &m.name).and_then(|m| m.id))
    }

    /// Finds a user's ID by exact username.
    pub async fn find_user_id(&self, username: &str) -> BootstrapResult<Option<String>> {
        let users = self.store.find_users(&self.realm, username).await?;
        Ok(exact(users, username, |u| &u.username).and_then(|u| u.id))
    }
}

/// Returns the first item whose key equals `wanted`, discarding near-matches.
fn exact<T>(items: Vec<T>, wanted: &str, key: impl Fn(&T) -> &String) -> Option<T> {
    items.into_iter().find(|item| key(item) == wanted)
}
