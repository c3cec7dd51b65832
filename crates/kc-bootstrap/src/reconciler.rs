//! Resolve-or-create convergence.
//!
//! For every entity kind the same algorithm applies: resolve by unique key,
//! return the existing ID when found, create only when resolution proves
//! absence, and treat a creation conflict (another run got there first) as
//! success by resolving again. Validation errors propagate.
//!
//! Scope bindings have no cheap membership query, so they are issued
//! unconditionally and an "already associated" answer counts as success.

use std::sync::Arc;

use crate::entity::{BindingTarget, DesiredEntity, EntityKind, ScopeBinding, ScopeSet};
use crate::error::{BootstrapError, BootstrapResult};
use crate::resolver::EntityResolver;
use crate::store::IdentityStore;

/// Result of converging one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The entity was absent and has been created.
    Created(String),
    /// The entity already existed (possibly created by a concurrent run).
    Existing(String),
}

impl Outcome {
    /// Remote ID of the entity.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    /// Returns true if this run created the entity.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of attaching a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The server accepted the association.
    Bound,
    /// The association was already present.
    AlreadyBound(String),
}

/// Converges remote entities within one realm context.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn IdentityStore>,
    resolver: EntityResolver,
}

impl Reconciler {
    /// Creates a reconciler bound to a realm.
    pub fn new(store: Arc<dyn IdentityStore>, realm: impl Into<String>) -> Self {
        let resolver = EntityResolver::new(Arc::clone(&store), realm);
        Self { store, resolver }
    }

    /// The resolver used for existence checks.
    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Realm context of this reconciler.
    pub fn realm(&self) -> &str {
        self.resolver.realm()
    }

    /// Ensures an entity exists.
    ///
    /// ## Errors
    ///
    /// Returns `Validation` if the payload is rejected, `NotFound` if a
    /// mapper's owning scope is missing, and any transport or
    /// authentication error unchanged. Conflicts are never returned unless
    /// the entity cannot be resolved after one.
    pub async fn ensure(&self, entity: &DesiredEntity) -> BootstrapResult<Outcome> {
        let kind = entity.kind();
        let key = entity.key();

        if let Some(id) = self.resolve(entity).await? {
            tracing::debug!("{} '{}' already exists ({})", kind, key, id);
            return Ok(Outcome::Existing(id));
        }

        match self.create(entity).await {
            Ok(Some(id)) => {
                tracing::info!("Created {} '{}' ({})", kind, key, id);
                Ok(Outcome::Created(id))
            }
            Ok(None) => {
                let id = self
                    .resolve(entity)
                    .await?
                    .ok_or_else(|| BootstrapError::not_found(kind.as_str(), &key))?;
                tracing::info!("Created {} '{}' ({})", kind, key, id);
                Ok(Outcome::Created(id))
            }
            Err(err) if err.is_conflict() => {
                tracing::info!("{} '{}' was created concurrently", kind, key);
                match self.resolve(entity).await? {
                    Some(id) => Ok(Outcome::Existing(id)),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Looks up the remote ID of an entity.
    async fn resolve(&self, entity: &DesiredEntity) -> BootstrapResult<Option<String>> {
        match entity {
            DesiredEntity::Realm(realm) => Ok(self
                .resolver
                .find_realm(&realm.name)
                .await?
                .map(|r| r.name)),
            DesiredEntity::Client(client) => self.resolver.find_client_id(&client.client_id).await,
            DesiredEntity::ClientScope(scope) => self.resolver.find_scope_id(&scope.name).await,
            DesiredEntity::AudienceMapper(mapper) => {
                let scope_id = self.require_scope(&mapper.scope).await?;
                self.resolver.find_mapper_id(&scope_id, &mapper.name).await
            }
            DesiredEntity::User(user) => self.resolver.find_user_id(&user.username).await,
        }
    }

    /// Issues the creation request for an entity.
    async fn create(&self, entity: &DesiredEntity) -> BootstrapResult<Option<String>> {
        let realm = self.realm();
        match entity {
            DesiredEntity::Realm(spec) => {
                self.store.create_realm(&spec.to_representation()).await?;
                Ok(Some(spec.name.clone()))
            }
            DesiredEntity::Client(spec) => {
                self.store
                    .create_client(realm, &spec.to_representation())
                    .await
            }
            DesiredEntity::ClientScope(spec) => {
                self.store
                    .create_client_scope(realm, &spec.to_representation())
                    .await
            }
            DesiredEntity::AudienceMapper(spec) => {
                let scope_id = self.require_scope(&spec.scope).await?;
                self.store
                    .add_scope_mapper(realm, &scope_id, &spec.to_representation())
                    .await
            }
            DesiredEntity::User(spec) => {
                self.store
                    .create_user(realm, &spec.to_representation())
                    .await
            }
        }
    }

    async fn require_scope(&self, name: &str) -> BootstrapResult<String> {
        self.resolver
            .find_scope_id(name)
            .await?
            .ok_or_else(|| BootstrapError::not_found(EntityKind::ClientScope.as_str(), name))
    }

    async fn require_client(&self, client_id: &str) -> BootstrapResult<String> {
        self.resolver
            .find_client_id(client_id)
            .await?
            .ok_or_else(|| BootstrapError::not_found(EntityKind::Client.as_str(), client_id))
    }

    /// Attaches a scope to the realm or to a client.
    ///
    /// Only a conflict answer is treated as "already bound"; any other
    /// rejection is returned so it can be reported.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the scope or client does not exist.
    pub async fn bind(&self, binding: &ScopeBinding) -> BootstrapResult<BindOutcome> {
        let realm = self.realm();
        let scope_id = self.require_scope(&binding.scope).await?;

        let result = match (&binding.target, binding.set) {
            (BindingTarget::Realm, ScopeSet::Default) => {
                self.store.add_realm_default_scope(realm, &scope_id).await
            }
            (BindingTarget::Realm, ScopeSet::Optional) => {
                self.store.add_realm_optional_scope(realm, &scope_id).await
            }
            (BindingTarget::Client(client_id), set) => {
                let client_uuid = self.require_client(client_id).await?;
                match set {
                    ScopeSet::Default => {
                        self.store
                            .add_client_default_scope(realm, &client_uuid, &scope_id)
                            .await
                    }
                    ScopeSet::Optional => {
                        self.store
                            .add_client_optional_scope(realm, &client_uuid, &scope_id)
                            .await
                    }
                }
            }
        };

        match result {
            Ok(()) => {
                tracing::info!("Bound {}", binding.key());
                Ok(BindOutcome::Bound)
            }
            Err(err) if err.is_conflict() => {
                tracing::warn!("Note: {} might already exist: {}", binding.key(), err);
                Ok(BindOutcome::AlreadyBound(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Retrieves the secret of a confidential client by `client_id`.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the client does not exist.
    pub async fn client_secret(&self, client_id: &str) -> BootstrapResult<String> {
        let client_uuid = self.require_client(client_id).await?;
        self.store.get_client_secret(self.realm(), &client_uuid).await
    }
}
