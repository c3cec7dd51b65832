//! In-memory identity store.
//!
//! Behaves like the admin API for the operations this crate uses: searches
//! match by substring, duplicate keys answer with a conflict, and unknown
//! references answer with not-found. Faults can be injected per entity key
//! so that races, rejected payloads and interrupted runs can be replayed
//! deterministically.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::entity::{EntityKind, AUDIENCE_MAPPER};
use crate::error::{BootstrapError, BootstrapResult};
use crate::model::{
    ClientRepresentation, ClientScopeRepresentation, ProtocolMapperRepresentation,
    RealmRepresentation, UserRepresentation,
};
use crate::store::{IdentityStore, SessionInfo};

/// A client scope and the mappers it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRecord {
    /// Scope as stored.
    pub scope: ClientScopeRepresentation,
    /// Protocol mappers, in creation order.
    pub mappers: Vec<ProtocolMapperRepresentation>,
}

/// Everything stored for one realm. Maps are keyed by internal ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealmRecord {
    /// Realm as stored.
    pub realm: RealmRepresentation,
    /// Clients.
    pub clients: BTreeMap<String, ClientRepresentation>,
    /// Client scopes.
    pub scopes: BTreeMap<String, ScopeRecord>,
    /// Users.
    pub users: BTreeMap<String, UserRepresentation>,
    /// Realm default scope IDs.
    pub default_scopes: BTreeSet<String>,
    /// Realm optional scope IDs.
    pub optional_scopes: BTreeSet<String>,
    /// Default scope IDs per client.
    pub client_default_scopes: BTreeMap<String, BTreeSet<String>>,
    /// Optional scope IDs per client.
    pub client_optional_scopes: BTreeMap<String, BTreeSet<String>>,
    /// Secrets of confidential clients.
    pub secrets: BTreeMap<String, String>,
}

impl RealmRecord {
    fn named(name: &str) -> Self {
        Self {
            realm: RealmRepresentation {
                id: Some(Uuid::new_v4().to_string()),
                realm: name.to_string(),
                enabled: true,
                display_name: Some(name.to_string()),
            },
            ..Default::default()
        }
    }

    fn insert_client(&mut self, client: &ClientRepresentation) -> String {
        let id = Uuid::new_v4().to_string();
        let mut stored = client.clone();
        stored.id = Some(id.clone());
        if !stored.public_client {
            self.secrets.insert(id.clone(), Uuid::new_v4().to_string());
        }
        self.clients.insert(id.clone(), stored);
        id
    }

    fn insert_scope(&mut self, scope: &ClientScopeRepresentation) -> String {
        let id = Uuid::new_v4().to_string();
        let mut stored = scope.clone();
        stored.id = Some(id.clone());
        self.scopes.insert(
            id.clone(),
            ScopeRecord {
                scope: stored,
                mappers: Vec::new(),
            },
        );
        id
    }

    fn insert_user(&mut self, user: &UserRepresentation) -> String {
        let id = Uuid::new_v4().to_string();
        let mut stored = user.clone();
        stored.id = Some(id.clone());
        self.users.insert(id.clone(), stored);
        id
    }

    fn client_uuid(&self, client_id: &str) -> Option<&String> {
        self.clients
            .iter()
            .find(|(_, c)| c.client_id == client_id)
            .map(|(id, _)| id)
    }
}

/// Full remote state, keyed by realm name.
pub type StoreSnapshot = BTreeMap<String, RealmRecord>;

#[derive(Debug, Clone, Copy)]
enum BindTarget<'a> {
    RealmDefault,
    RealmOptional,
    ClientDefault(&'a str),
    ClientOptional(&'a str),
}

#[derive(Debug, Default)]
struct State {
    realms: StoreSnapshot,
    authenticated: bool,
    unreachable: bool,
    bad_credentials: bool,
    creation_budget: Option<usize>,
    rejected: HashSet<(EntityKind, String)>,
    rejected_bindings: HashSet<String>,
    races: HashSet<(EntityKind, String)>,
    creations: Vec<(EntityKind, String)>,
    bindings: Vec<String>,
    authentications: usize,
}

impl State {
    fn check_reachable(&self) -> BootstrapResult<()> {
        if self.unreachable || self.creation_budget == Some(0) {
            return Err(BootstrapError::Transient("connection refused".to_string()));
        }
        Ok(())
    }

    fn realm(&self, name: &str) -> BootstrapResult<&RealmRecord> {
        self.realms
            .get(name)
            .ok_or_else(|| BootstrapError::not_found("Realm", name))
    }

    fn realm_mut(&mut self, name: &str) -> BootstrapResult<&mut RealmRecord> {
        self.realms
            .get_mut(name)
            .ok_or_else(|| BootstrapError::not_found("Realm", name))
    }

    /// Applies injected faults; returns true if a concurrent creation
    /// must be simulated.
    fn before_create(&mut self, kind: EntityKind, key: &str) -> BootstrapResult<bool> {
        let fault = (kind, key.to_string());
        if self.rejected.contains(&fault) {
            return Err(BootstrapError::Validation(format!(
                "invalid {kind} representation: {key}"
            )));
        }
        Ok(self.races.remove(&fault))
    }

    fn record_creation(&mut self, kind: EntityKind, key: String) {
        self.creations.push((kind, key));
        if let Some(budget) = self.creation_budget.as_mut() {
            *budget = budget.saturating_sub(1);
        }
    }
}

/// Identity store held in memory.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a store containing only the `master` realm.
    #[must_use]
    pub fn new() -> Self {
        let mut state = State::default();
        state
            .realms
            .insert("master".to_string(), RealmRecord::named("master"));
        Self {
            state: Mutex::new(state),
        }
    }

    fn connected(&self) -> BootstrapResult<MutexGuard<'_, State>> {
        let state = self.state.lock();
        state.check_reachable()?;
        if !state.authenticated {
            return Err(BootstrapError::Authentication(
                "no admin session".to_string(),
            ));
        }
        Ok(state)
    }

    /// Makes every call fail as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Makes authentication fail.
    pub fn set_bad_credentials(&self, bad: bool) {
        self.state.lock().bad_credentials = bad;
    }

    /// Lets `creations` more entities be created, then fails every call.
    pub fn interrupt_after(&self, creations: usize) {
        self.state.lock().creation_budget = Some(creations);
    }

    /// Clears any interruption and makes the server reachable again.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.creation_budget = None;
        state.unreachable = false;
    }

    /// Rejects the creation of one entity with a validation error.
    pub fn reject_creation(&self, kind: EntityKind, key: &str) {
        self.state.lock().rejected.insert((kind, key.to_string()));
    }

    /// Rejects every binding of the named scope with a validation error.
    pub fn reject_binding(&self, scope: &str) {
        self.state.lock().rejected_bindings.insert(scope.to_string());
    }

    /// On the next creation of this entity, stores it as if another process
    /// had just created it and answers with a conflict.
    pub fn race_creation(&self, kind: EntityKind, key: &str) {
        self.state.lock().races.insert((kind, key.to_string()));
    }

    /// Entities created through this store, in order.
    #[must_use]
    pub fn creations(&self) -> Vec<(EntityKind, String)> {
        self.state.lock().creations.clone()
    }

    /// Scope bindings accepted by this store, in order.
    #[must_use]
    pub fn bindings_added(&self) -> Vec<String> {
        self.state.lock().bindings.clone()
    }

    /// Number of successful authentications.
    #[must_use]
    pub fn authentications(&self) -> usize {
        self.state.lock().authentications
    }

    /// Copy of the full stored state.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().realms.clone()
    }

    /// Number of clients with exactly this `client_id`.
    #[must_use]
    pub fn count_clients(&self, realm: &str, client_id: &str) -> usize {
        self.state.lock().realms.get(realm).map_or(0, |r| {
            r.clients.values().filter(|c| c.client_id == client_id).count()
        })
    }

    /// Number of users with exactly this username.
    #[must_use]
    pub fn count_users(&self, realm: &str, username: &str) -> usize {
        self.state.lock().realms.get(realm).map_or(0, |r| {
            r.users.values().filter(|u| u.username == username).count()
        })
    }

    /// Number of scopes with exactly this name.
    #[must_use]
    pub fn count_scopes(&self, realm: &str, name: &str) -> usize {
        self.state.lock().realms.get(realm).map_or(0, |r| {
            r.scopes.values().filter(|s| s.scope.name == name).count()
        })
    }

    /// Adds a realm directly.
    pub fn seed_realm(&self, name: &str) {
        self.state
            .lock()
            .realms
            .entry(name.to_string())
            .or_insert_with(|| RealmRecord::named(name));
    }

    /// Adds a confidential client directly and returns its ID.
    pub fn seed_client(&self, realm: &str, client_id: &str) -> String {
        let mut state = self.state.lock();
        let record = state
            .realms
            .entry(realm.to_string())
            .or_insert_with(|| RealmRecord::named(realm));
        record.insert_client(&ClientRepresentation {
            client_id: client_id.to_string(),
            enabled: true,
            ..Default::default()
        })
    }

    /// Adds a user directly and returns its ID.
    pub fn seed_user(&self, realm: &str, username: &str) -> String {
        let mut state = self.state.lock();
        let record = state
            .realms
            .entry(realm.to_string())
            .or_insert_with(|| RealmRecord::named(realm));
        record.insert_user(&UserRepresentation {
            username: username.to_string(),
            enabled: true,
            ..Default::default()
        })
    }

    /// Audiences of a token issued to `client_id` for the requested scope
    /// names.
    ///
    /// Realm and client default scopes are always applied; optional scopes
    /// only when requested. Clients that are not stored (auto-registered
    /// elsewhere) receive the realm-level scopes only.
    #[must_use]
    pub fn issue_token(&self, realm: &str, client_id: &str, requested: &[&str]) -> BTreeSet<String> {
        let state = self.state.lock();
        let Some(record) = state.realms.get(realm) else {
            return BTreeSet::new();
        };

        let mut granted: BTreeSet<&String> = record.default_scopes.iter().collect();
        let mut optional: BTreeSet<&String> = record.optional_scopes.iter().collect();
        if let Some(uuid) = record.client_uuid(client_id) {
            if let Some(set) = record.client_default_scopes.get(uuid) {
                granted.extend(set);
            }
            if let Some(set) = record.client_optional_scopes.get(uuid) {
                optional.extend(set);
            }
        }
        let requested: BTreeSet<&String> = record
            .scopes
            .iter()
            .filter(|(_, s)| requested.contains(&s.scope.name.as_str()))
            .map(|(id, _)| id)
            .collect();
        granted.extend(optional.intersection(&requested).copied());

        granted
            .into_iter()
            .filter_map(|id| record.scopes.get(id))
            .flat_map(|s| s.mappers.iter())
            .filter(|m| m.protocol_mapper == AUDIENCE_MAPPER)
            .filter_map(|m| m.config.get("included.custom.audience").cloned())
            .collect()
    }

    fn bind(&self, realm: &str, scope_id: &str, target: BindTarget<'_>) -> BootstrapResult<()> {
        let mut state = self.connected()?;
        let scope_name = state
            .realm(realm)?
            .scopes
            .get(scope_id)
            .map(|s| s.scope.name.clone())
            .ok_or_else(|| BootstrapError::not_found("ClientScope", scope_id))?;
        if state.rejected_bindings.contains(&scope_name) {
            return Err(BootstrapError::Validation(format!(
                "scope '{scope_name}' cannot be assigned"
            )));
        }

        let record = state.realm_mut(realm)?;
        let (label, set) = match target {
            BindTarget::RealmDefault => ("realm default".to_string(), &mut record.default_scopes),
            BindTarget::RealmOptional => {
                ("realm optional".to_string(), &mut record.optional_scopes)
            }
            BindTarget::ClientDefault(uuid) | BindTarget::ClientOptional(uuid) => {
                let client_id = record
                    .clients
                    .get(uuid)
                    .map(|c| c.client_id.clone())
                    .ok_or_else(|| BootstrapError::not_found("Client", uuid))?;
                if matches!(target, BindTarget::ClientDefault(_)) {
                    (
                        format!("{client_id} default"),
                        record.client_default_scopes.entry(uuid.to_string()).or_default(),
                    )
                } else {
                    (
                        format!("{client_id} optional"),
                        record.client_optional_scopes.entry(uuid.to_string()).or_default(),
                    )
                }
            }
        };

        if !set.insert(scope_id.to_string()) {
            return Err(BootstrapError::conflict("ScopeBinding", scope_name));
        }
        state.bindings.push(format!("{label} <- {scope_name}"));
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn authenticate(&self) -> BootstrapResult<SessionInfo> {
        let mut state = self.state.lock();
        state.check_reachable()?;
        if state.bad_credentials {
            return Err(BootstrapError::Authentication(
                "invalid user credentials".to_string(),
            ));
        }
        state.authenticated = true;
        state.authentications += 1;
        Ok(SessionInfo {
            realm: "master".to_string(),
            expires_in: Duration::from_secs(60),
        })
    }

    async fn list_realms(&self) -> BootstrapResult<Vec<RealmRepresentation>> {
        let state = self.connected()?;
        Ok(state.realms.values().map(|r| r.realm.clone()).collect())
    }

    async fn create_realm(&self, realm: &RealmRepresentation) -> BootstrapResult<()> {
        let mut state = self.connected()?;
        let raced = state.before_create(EntityKind::Realm, &realm.realm)?;
        if state.realms.contains_key(&realm.realm) {
            return Err(BootstrapError::conflict("Realm", &realm.realm));
        }
        let mut record = RealmRecord::named(&realm.realm);
        record.realm.enabled = realm.enabled;
        record.realm.display_name.clone_from(&realm.display_name);
        state.realms.insert(realm.realm.clone(), record);
        if raced {
            return Err(BootstrapError::conflict("Realm", &realm.realm));
        }
        state.record_creation(EntityKind::Realm, realm.realm.clone());
        Ok(())
    }

    async fn find_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> BootstrapResult<Vec<ClientRepresentation>> {
        let state = self.connected()?;
        Ok(state
            .realm(realm)?
            .clients
            .values()
            .filter(|c| c.client_id.contains(client_id))
            .cloned()
            .collect())
    }

    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> BootstrapResult<Option<String>> {
        let mut state = self.connected()?;
        let raced = state.before_create(EntityKind::Client, &client.client_id)?;
        let record = state.realm_mut(realm)?;
        if record.client_uuid(&client.client_id).is_some() {
            return Err(BootstrapError::conflict("Client", &client.client_id));
        }
        let id = record.insert_client(client);
        if raced {
            return Err(BootstrapError::conflict("Client", &client.client_id));
        }
        state.record_creation(EntityKind::Client, client.client_id.clone());
        Ok(Some(id))
    }

    async fn list_client_scopes(
        &self,
        realm: &str,
    ) -> BootstrapResult<Vec<ClientScopeRepresentation>> {
        let state = self.connected()?;
        Ok(state
            .realm(realm)?
            .scopes
            .values()
            .map(|s| s.scope.clone())
            .collect())
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScopeRepresentation,
    ) -> BootstrapResult<Option<String>> {
        let mut state = self.connected()?;
        let raced = state.before_create(EntityKind::ClientScope, &scope.name)?;
        let record = state.realm_mut(realm)?;
        if record.scopes.values().any(|s| s.scope.name == scope.name) {
            return Err(BootstrapError::conflict("ClientScope", &scope.name));
        }
        let id = record.insert_scope(scope);
        if raced {
            return Err(BootstrapError::conflict("ClientScope", &scope.name));
        }
        state.record_creation(EntityKind::ClientScope, scope.name.clone());
        Ok(Some(id))
    }

    async fn list_scope_mappers(
        &self,
        realm: &str,
        scope_id: &str,
    ) -> BootstrapResult<Vec<ProtocolMapperRepresentation>> {
        let state = self.connected()?;
        state
            .realm(realm)?
            .scopes
            .get(scope_id)
            .map(|s| s.mappers.clone())
            .ok_or_else(|| BootstrapError::not_found("ClientScope", scope_id))
    }

    async fn add_scope_mapper(
        &self,
        realm: &str,
        scope_id: &str,
        mapper: &ProtocolMapperRepresentation,
    ) -> BootstrapResult<Option<String>> {
        let mut state = self.connected()?;
        let scope_name = state
            .realm(realm)?
            .scopes
            .get(scope_id)
            .map(|s| s.scope.name.clone())
            .ok_or_else(|| BootstrapError::not_found("ClientScope", scope_id))?;
        let key = format!("{scope_name}/{}", mapper.name);
        let raced = state.before_create(EntityKind::AudienceMapper, &key)?;

        let record = state.realm_mut(realm)?;
        let scope = record
            .scopes
            .get_mut(scope_id)
            .ok_or_else(|| BootstrapError::not_found("ClientScope", scope_id))?;
        if scope.mappers.iter().any(|m| m.name == mapper.name) {
            return Err(BootstrapError::conflict("AudienceMapper", &key));
        }
        let id = Uuid::new_v4().to_string();
        let mut stored = mapper.clone();
        stored.id = Some(id.clone());
        scope.mappers.push(stored);
        if raced {
            return Err(BootstrapError::conflict("AudienceMapper", &key));
        }
        state.record_creation(EntityKind::AudienceMapper, key);
        Ok(Some(id))
    }

    async fn add_realm_default_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()> {
        self.bind(realm, scope_id, BindTarget::RealmDefault)
    }

    async fn add_realm_optional_scope(&self, realm: &str, scope_id: &str) -> BootstrapResult<()> {
        self.bind(realm, scope_id, BindTarget::RealmOptional)
    }

    async fn add_client_default_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()> {
        self.bind(realm, scope_id, BindTarget::ClientDefault(client_uuid))
    }

    async fn add_client_optional_scope(
        &self,
        realm: &str,
        client_uuid: &str,
        scope_id: &str,
    ) -> BootstrapResult<()> {
        self.bind(realm, scope_id, BindTarget::ClientOptional(client_uuid))
    }

    async fn find_users(
        &self,
        realm: &str,
        username: &str,
    ) -> BootstrapResult<Vec<UserRepresentation>> {
        let state = self.connected()?;
        Ok(state
            .realm(realm)?
            .users
            .values()
            .filter(|u| u.username.contains(username))
            .cloned()
            .collect())
    }

    async fn create_user(
        &self,
        realm: &str,
        user: &UserRepresentation,
    ) -> BootstrapResult<Option<String>> {
        let mut state = self.connected()?;
        let raced = state.before_create(EntityKind::User, &user.username)?;
        let record = state.realm_mut(realm)?;
        if record.users.values().any(|u| u.username == user.username) {
            return Err(BootstrapError::conflict("User", &user.username));
        }
        let id = record.insert_user(user);
        if raced {
            return Err(BootstrapError::conflict("User", &user.username));
        }
        state.record_creation(EntityKind::User, user.username.clone());
        Ok(Some(id))
    }

    async fn get_client_secret(&self, realm: &str, client_uuid: &str) -> BootstrapResult<String> {
        let state = self.connected()?;
        let record = state.realm(realm)?;
        if !record.clients.contains_key(client_uuid) {
            return Err(BootstrapError::not_found("Client", client_uuid));
        }
        record.secrets.get(client_uuid).cloned().ok_or_else(|| {
            BootstrapError::Validation(format!("client {client_uuid} is public"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requires_session() {
        let store = InMemoryStore::new();
        let err = store.list_realms().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Authentication(_)));

        store.authenticate().await.unwrap();
        assert_eq!(store.list_realms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_fuzzy() {
        let store = InMemoryStore::new();
        store.authenticate().await.unwrap();
        store.seed_user("demo", "alice");
        store.seed_user("demo", "alice2");

        let users = store.find_users("demo", "alice").await.unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn interruption_stops_calls() {
        let store = InMemoryStore::new();
        store.authenticate().await.unwrap();
        store.seed_realm("demo");
        store.interrupt_after(1);

        let client = ClientRepresentation {
            client_id: "a".to_string(),
            ..Default::default()
        };
        store.create_client("demo", &client).await.unwrap();
        let err = store.list_client_scopes("demo").await.unwrap_err();
        assert!(matches!(err, BootstrapError::Transient(_)));

        store.resume();
        assert!(store.list_client_scopes("demo").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_binding_conflicts() {
        let store = InMemoryStore::new();
        store.authenticate().await.unwrap();
        store.seed_realm("demo");
        let scope_id = store
            .create_client_scope(
                "demo",
                &ClientScopeRepresentation {
                    name: "s".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        store.add_realm_default_scope("demo", &scope_id).await.unwrap();
        let err = store
            .add_realm_default_scope("demo", &scope_id)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.bindings_added(), vec!["realm default <- s".to_string()]);
    }

    #[tokio::test]
    async fn optional_scope_needs_request() {
        let store = InMemoryStore::new();
        store.authenticate().await.unwrap();
        store.seed_realm("demo");
        let scope_id = store
            .create_client_scope(
                "demo",
                &ClientScopeRepresentation {
                    name: "y-aud".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        let mapper = crate::entity::AudienceMapperSpec::new("y-aud", "y-aud", "Y");
        store
            .add_scope_mapper("demo", &scope_id, &mapper.to_representation())
            .await
            .unwrap();
        store.add_realm_optional_scope("demo", &scope_id).await.unwrap();

        assert!(store.issue_token("demo", "anyone", &[]).is_empty());
        assert_eq!(
            store.issue_token("demo", "anyone", &["y-aud"]),
            BTreeSet::from(["Y".to_string()])
        );
    }
}
