//! Audience graph.
//!
//! A [`Topology`] describes a token-exchange chain: a caller obtains an
//! initial token, and every hop names the audience it expects, the scope
//! that injects it and where that scope is attached. The builder turns the
//! chain into concrete entities and scope bindings, rejects inconsistent
//! graphs, and the resulting [`AudienceGraph`] can both evaluate which
//! audiences a token would carry and drive the reconciler to realize
//! itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::entity::{
    AudienceMapperSpec, BindingTarget, ClientSpec, DesiredEntity, EntityKind, RealmSpec,
    ScopeBinding, ScopeSet, ScopeSpec, UserSpec,
};
use crate::error::{BootstrapError, BootstrapResult};
use crate::orchestrator::{EntityStatus, Phase, ReportEntry};
use crate::reconciler::Reconciler;

/// Where a hop's scope is attached, relative to the participant that
/// presents the token to that hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Placement {
    /// Realm default scope: every token in the realm carries the audience.
    RealmDefault,
    /// Realm optional scope: carried only when the scope is requested.
    RealmOptional,
    /// Default scope of the presenting client.
    ClientDefault,
    /// Optional scope of the presenting client.
    ClientOptional,
}

impl Placement {
    /// Returns true if the scope must be requested explicitly.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(self, Self::RealmOptional | Self::ClientOptional)
    }

    const fn set(self) -> ScopeSet {
        if self.is_optional() {
            ScopeSet::Optional
        } else {
            ScopeSet::Default
        }
    }
}

/// One step of the exchange chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    /// Audience the receiving service expects.
    pub audience: String,
    /// Scope whose mapper injects the audience.
    pub scope_name: String,
    /// Where the scope is attached.
    pub placement: Placement,
    /// Client to provision for the receiving service, if any.
    pub client: Option<ClientSpec>,
    /// Client that exchanges the received token for the next hop.
    pub exchanger: Option<String>,
}

impl Hop {
    /// Creates a terminal hop with nothing to provision.
    #[must_use]
    pub fn new(
        audience: impl Into<String>,
        scope_name: impl Into<String>,
        placement: Placement,
    ) -> Self {
        Self {
            audience: audience.into(),
            scope_name: scope_name.into(),
            placement,
            client: None,
            exchanger: None,
        }
    }

    /// Provisions a client for the receiving service.
    #[must_use]
    pub fn with_client(mut self, client: ClientSpec) -> Self {
        self.client = Some(client);
        self
    }

    /// Names the client that exchanges onward from this hop.
    #[must_use]
    pub fn exchanged_by(mut self, client_id: impl Into<String>) -> Self {
        self.exchanger = Some(client_id.into());
        self
    }
}

/// Desired deployment topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Realm to provision.
    pub realm: RealmSpec,
    /// Client that obtains the initial token.
    pub caller: String,
    /// Exchange chain, first hop first.
    pub hops: Vec<Hop>,
    /// Clients that are not the receiving side of any hop.
    pub extra_clients: Vec<ClientSpec>,
    /// Demo users.
    pub users: Vec<UserSpec>,
    /// Clients whose secrets are printed in the summary.
    pub reveal_secrets: Vec<String>,
}

/// Builds an [`AudienceGraph`] from a [`Topology`].
#[derive(Debug)]
pub struct AudienceGraphBuilder {
    topology: Topology,
}

impl AudienceGraphBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// Declares the entities and bindings of the topology.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTopology` if the chain is empty or broken, if an
    /// audience would be injected by two scopes (or a scope inject two
    /// audiences), if a scope would be both default and optional for the
    /// same target, or if a client placement references a client that is
    /// not provisioned.
    pub fn build(self) -> BootstrapResult<AudienceGraph> {
        let Topology {
            realm,
            caller,
            hops,
            extra_clients,
            users,
            reveal_secrets,
        } = self.topology;

        if hops.is_empty() {
            return Err(invalid("at least one hop is required"));
        }
        if caller.is_empty() {
            return Err(invalid("caller client is required"));
        }

        let mut clients: Vec<ClientSpec> = Vec::new();
        for client in extra_clients
            .into_iter()
            .chain(hops.iter().filter_map(|h| h.client.clone()))
        {
            match clients.iter().find(|c| c.client_id == client.client_id) {
                Some(existing) if *existing != client => {
                    return Err(invalid(format!(
                        "client '{}' is declared twice with different settings",
                        client.client_id
                    )));
                }
                Some(_) => {}
                None => clients.push(client),
            }
        }

        let mut audience_of: BTreeMap<&str, &str> = BTreeMap::new();
        let mut scope_of: BTreeMap<&str, &str> = BTreeMap::new();
        let mut scopes = Vec::new();
        let mut mappers = Vec::new();
        let mut bindings: Vec<ScopeBinding> = Vec::new();
        let mut presenter = caller.as_str();

        for (index, hop) in hops.iter().enumerate() {
            let terminal = index + 1 == hops.len();
            if !terminal && hop.exchanger.is_none() {
                return Err(invalid(format!(
                    "hop '{}' must name the client that exchanges onward",
                    hop.audience
                )));
            }

            match audience_of.get(hop.scope_name.as_str()) {
                Some(audience) if *audience != hop.audience => {
                    return Err(invalid(format!(
                        "scope '{}' cannot inject both '{}' and '{}'",
                        hop.scope_name, audience, hop.audience
                    )));
                }
                Some(_) => {}
                None => {
                    if let Some(scope) = scope_of.get(hop.audience.as_str()) {
                        return Err(invalid(format!(
                            "audience '{}' is injected by both '{}' and '{}'",
                            hop.audience, scope, hop.scope_name
                        )));
                    }
                    audience_of.insert(&hop.scope_name, &hop.audience);
                    scope_of.insert(&hop.audience, &hop.scope_name);
                    scopes.push(ScopeSpec::new(&hop.scope_name));
                    mappers.push(AudienceMapperSpec::new(
                        &hop.scope_name,
                        &hop.scope_name,
                        &hop.audience,
                    ));
                }
            }

            let binding = match hop.placement {
                Placement::RealmDefault | Placement::RealmOptional => {
                    ScopeBinding::realm(&hop.scope_name, hop.placement.set())
                }
                Placement::ClientDefault | Placement::ClientOptional => {
                    if !clients.iter().any(|c| c.client_id == presenter) {
                        return Err(invalid(format!(
                            "scope '{}' is attached to '{}', which is not provisioned",
                            hop.scope_name, presenter
                        )));
                    }
                    ScopeBinding::client(presenter, &hop.scope_name, hop.placement.set())
                }
            };
            if let Some(other) = bindings
                .iter()
                .find(|b| b.target == binding.target && b.scope == binding.scope)
            {
                if other.set != binding.set {
                    return Err(invalid(format!(
                        "scope '{}' cannot be both default and optional on the same target",
                        binding.scope
                    )));
                }
            } else {
                bindings.push(binding);
            }

            if let Some(exchanger) = &hop.exchanger {
                presenter = exchanger.as_str();
            }
        }

        for client_id in &reveal_secrets {
            if !clients.iter().any(|c| &c.client_id == client_id) {
                return Err(invalid(format!(
                    "secret of '{client_id}' requested but the client is not provisioned"
                )));
            }
        }

        Ok(AudienceGraph {
            realm,
            caller,
            clients,
            scopes,
            mappers,
            bindings,
            users,
            reveal_secrets,
            hops,
        })
    }
}

fn invalid(message: impl Into<String>) -> BootstrapError {
    BootstrapError::InvalidTopology(message.into())
}

/// The declared entities and edges of a topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceGraph {
    /// Realm.
    pub realm: RealmSpec,
    /// Client that obtains the initial token.
    pub caller: String,
    /// Clients, in creation order.
    pub clients: Vec<ClientSpec>,
    /// Scopes, in creation order.
    pub scopes: Vec<ScopeSpec>,
    /// One audience mapper per scope.
    pub mappers: Vec<AudienceMapperSpec>,
    /// Scope bindings.
    pub bindings: Vec<ScopeBinding>,
    /// Demo users.
    pub users: Vec<UserSpec>,
    /// Clients whose secrets are printed in the summary.
    pub reveal_secrets: Vec<String>,
    hops: Vec<Hop>,
}

/// One evaluated step of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    /// Client presenting the token.
    pub from: String,
    /// Audience the hop expects.
    pub audience: String,
    /// Scope explicitly requested for this step, if any.
    pub requested: Option<String>,
    /// Audiences the token would carry.
    pub granted: BTreeSet<String>,
    /// Whether the expected audience is present.
    pub ok: bool,
}

/// An exchange-only audience found in an unrequested token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leak {
    /// Client the token is issued to.
    pub client: String,
    /// Audience that should have required a request.
    pub audience: String,
}

/// Result of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// Steps, caller first.
    pub steps: Vec<ChainStep>,
    /// Optional audiences that leaked into default tokens.
    pub leaks: Vec<Leak>,
}

impl ChainReport {
    /// Returns true if every step receives its audience and nothing leaks.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.leaks.is_empty() && self.steps.iter().all(|s| s.ok)
    }
}

impl AudienceGraph {
    /// The hops of the chain, first hop first.
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Audience injected by a scope.
    fn audience_of(&self, scope: &str) -> Option<&str> {
        self.mappers
            .iter()
            .find(|m| m.scope == scope)
            .map(|m| m.audience.as_str())
    }

    /// Audiences of a token issued to `client_id` when `requested` scopes
    /// are asked for.
    ///
    /// Default scopes (realm-wide and the client's own) always apply;
    /// optional ones only when requested.
    #[must_use]
    pub fn token_audiences(&self, client_id: &str, requested: &[&str]) -> BTreeSet<String> {
        self.bindings
            .iter()
            .filter(|b| match &b.target {
                BindingTarget::Realm => true,
                BindingTarget::Client(id) => id == client_id,
            })
            .filter(|b| b.set == ScopeSet::Default || requested.contains(&b.scope.as_str()))
            .filter_map(|b| self.audience_of(&b.scope))
            .map(str::to_string)
            .collect()
    }

    /// Walks caller → hop₁ → … and checks every step's audience.
    #[must_use]
    pub fn verify_chain(&self) -> ChainReport {
        let mut steps = Vec::with_capacity(self.hops.len());
        let mut presenter = self.caller.clone();
        let mut participants = BTreeSet::from([self.caller.clone()]);

        for hop in &self.hops {
            let requested = hop.placement.is_optional().then(|| hop.scope_name.clone());
            let request: Vec<&str> = requested.iter().map(String::as_str).collect();
            let granted = self.token_audiences(&presenter, &request);
            steps.push(ChainStep {
                from: presenter.clone(),
                audience: hop.audience.clone(),
                ok: granted.contains(&hop.audience),
                requested,
                granted,
            });
            if let Some(exchanger) = &hop.exchanger {
                presenter.clone_from(exchanger);
                participants.insert(exchanger.clone());
            }
        }
        participants.extend(self.clients.iter().map(|c| c.client_id.clone()));

        let exchange_only: BTreeSet<&str> = self
            .bindings
            .iter()
            .filter(|b| b.set == ScopeSet::Optional)
            .filter_map(|b| self.audience_of(&b.scope))
            .collect();
        let mut leaks = Vec::new();
        for client in &participants {
            for audience in self.token_audiences(client, &[]) {
                if exchange_only.contains(audience.as_str()) {
                    leaks.push(Leak {
                        client: client.clone(),
                        audience,
                    });
                }
            }
        }

        ChainReport { steps, leaks }
    }

    /// Every declared entity, in creation order.
    #[must_use]
    pub fn entities(&self) -> Vec<DesiredEntity> {
        std::iter::once(DesiredEntity::Realm(self.realm.clone()))
            .chain(self.clients.iter().cloned().map(DesiredEntity::Client))
            .chain(self.scope_entities())
            .chain(self.users.iter().cloned().map(DesiredEntity::User))
            .collect()
    }

    /// Each scope followed by its mapper.
    fn scope_entities(&self) -> Vec<DesiredEntity> {
        self.scopes
            .iter()
            .flat_map(|scope| {
                std::iter::once(DesiredEntity::ClientScope(scope.clone())).chain(
                    self.mappers
                        .iter()
                        .filter(move |m| m.scope == scope.name)
                        .cloned()
                        .map(DesiredEntity::AudienceMapper),
                )
            })
            .collect()
    }

    /// Ensures every client exists.
    pub async fn realize_clients(&self, reconciler: &Reconciler) -> Vec<ReportEntry> {
        let mut entries = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            let entity = DesiredEntity::Client(client.clone());
            let result = reconciler.ensure(&entity).await;
            entries.push(ReportEntry::from_outcome(
                Phase::CreateClients,
                EntityKind::Client,
                entity.key(),
                result,
            ));
        }
        entries
    }

    /// Ensures every scope and then its mapper. A mapper whose scope could
    /// not be ensured is skipped.
    pub async fn realize_scopes(&self, reconciler: &Reconciler) -> Vec<ReportEntry> {
        let mut entries = Vec::new();
        let mut failed_scopes = BTreeSet::new();
        for entity in self.scope_entities() {
            let kind = entity.kind();
            let key = entity.key();
            if let DesiredEntity::AudienceMapper(mapper) = &entity {
                if failed_scopes.contains(&mapper.scope) {
                    entries.push(ReportEntry::skipped(
                        Phase::CreateScopesAndMappers,
                        kind,
                        key,
                        format!("scope '{}' is unavailable", mapper.scope),
                    ));
                    continue;
                }
            }

            let entry = ReportEntry::from_outcome(
                Phase::CreateScopesAndMappers,
                kind,
                key,
                reconciler.ensure(&entity).await,
            );
            if let DesiredEntity::ClientScope(scope) = &entity {
                if entry.status == EntityStatus::Failed {
                    failed_scopes.insert(scope.name.clone());
                }
            }
            entries.push(entry);
        }
        entries
    }

    /// Issues every binding. Bindings whose scope or client is listed in
    /// `unavailable` are skipped.
    pub async fn realize_bindings(
        &self,
        reconciler: &Reconciler,
        unavailable: &BTreeSet<(EntityKind, String)>,
    ) -> Vec<ReportEntry> {
        let mut entries = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let blocked = if unavailable.contains(&(EntityKind::ClientScope, binding.scope.clone())) {
                Some(format!("scope '{}' is unavailable", binding.scope))
            } else {
                match &binding.target {
                    BindingTarget::Client(client_id)
                        if unavailable.contains(&(EntityKind::Client, client_id.clone())) =>
                    {
                        Some(format!("client '{client_id}' is unavailable"))
                    }
                    _ => None,
                }
            };

            let entry = match blocked {
                Some(reason) => ReportEntry::skipped(
                    Phase::AssignBindings,
                    EntityKind::ScopeBinding,
                    binding.key(),
                    reason,
                ),
                None => ReportEntry::from_binding(
                    Phase::AssignBindings,
                    binding.key(),
                    reconciler.bind(binding).await,
                ),
            };
            entries.push(entry);
        }
        entries
    }

    /// Ensures every demo user exists.
    pub async fn realize_users(&self, reconciler: &Reconciler) -> Vec<ReportEntry> {
        let mut entries = Vec::with_capacity(self.users.len());
        for user in &self.users {
            let entity = DesiredEntity::User(user.clone());
            let result = reconciler.ensure(&entity).await;
            entries.push(ReportEntry::from_outcome(
                Phase::CreateDemoUsers,
                EntityKind::User,
                entity.key(),
                result,
            ));
        }
        entries
    }
}
