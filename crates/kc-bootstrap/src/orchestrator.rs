//! Setup orchestration.
//!
//! Runs the phases in a fixed order. Only the initial connection can abort
//! a run; every later failure is recorded against its entity and the run
//! moves on, so that a second run repairs what the first one missed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::entity::{DesiredEntity, EntityKind};
use crate::error::BootstrapResult;
use crate::graph::AudienceGraph;
use crate::reconciler::{BindOutcome, Outcome, Reconciler};
use crate::store::IdentityStore;

/// Setup phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    /// Authenticate against the admin realm.
    ConnectMaster,
    /// Ensure the target realm exists.
    EnsureRealm,
    /// Continue in the target realm.
    SwitchRealmContext,
    /// Ensure clients.
    CreateClients,
    /// Ensure scopes and their audience mappers.
    CreateScopesAndMappers,
    /// Attach scopes to the realm and to clients.
    AssignBindings,
    /// Ensure demo users.
    CreateDemoUsers,
    /// Collect secrets for the summary.
    PrintSummary,
}

impl Phase {
    /// All phases, in order.
    pub const ALL: [Self; 8] = [
        Self::ConnectMaster,
        Self::EnsureRealm,
        Self::SwitchRealmContext,
        Self::CreateClients,
        Self::CreateScopesAndMappers,
        Self::AssignBindings,
        Self::CreateDemoUsers,
        Self::PrintSummary,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectMaster => "connect",
            Self::EnsureRealm => "realm",
            Self::SwitchRealmContext => "switch-realm",
            Self::CreateClients => "clients",
            Self::CreateScopesAndMappers => "scopes",
            Self::AssignBindings => "bindings",
            Self::CreateDemoUsers => "users",
            Self::PrintSummary => "summary",
        };
        f.write_str(name)
    }
}

/// Outcome of one entity or binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Created by this run.
    Created,
    /// Already present.
    Existing,
    /// Binding accepted.
    Bound,
    /// Binding already present.
    AlreadyBound,
    /// Failed; a later run may repair it.
    Failed,
    /// Not attempted because a dependency failed.
    Skipped,
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Existing => "already exists",
            Self::Bound => "bound",
            Self::AlreadyBound => "already bound",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// One reported outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Phase that produced the entry.
    pub phase: Phase,
    /// Entity kind.
    pub kind: EntityKind,
    /// Unique key of the entity.
    pub key: String,
    /// Outcome.
    pub status: EntityStatus,
    /// Remote ID, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Error or note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReportEntry {
    /// Records the result of ensuring an entity.
    pub fn from_outcome(
        phase: Phase,
        kind: EntityKind,
        key: String,
        result: BootstrapResult<Outcome>,
    ) -> Self {
        match result {
            Ok(Outcome::Created(id)) => Self::new(phase, kind, key, EntityStatus::Created, Some(id), None),
            Ok(Outcome::Existing(id)) => Self::new(phase, kind, key, EntityStatus::Existing, Some(id), None),
            Err(err) => {
                tracing::warn!("Could not ensure {} '{}': {}", kind, key, err);
                Self::new(phase, kind, key, EntityStatus::Failed, None, Some(err.to_string()))
            }
        }
    }

    /// Records the result of a binding.
    pub fn from_binding(phase: Phase, key: String, result: BootstrapResult<BindOutcome>) -> Self {
        let kind = EntityKind::ScopeBinding;
        match result {
            Ok(BindOutcome::Bound) => Self::new(phase, kind, key, EntityStatus::Bound, None, None),
            Ok(BindOutcome::AlreadyBound(note)) => {
                Self::new(phase, kind, key, EntityStatus::AlreadyBound, None, Some(note))
            }
            Err(err) => {
                tracing::warn!("Could not bind {}: {}", key, err);
                Self::new(phase, kind, key, EntityStatus::Failed, None, Some(err.to_string()))
            }
        }
    }

    /// Records an entity that was not attempted.
    pub fn skipped(phase: Phase, kind: EntityKind, key: String, reason: String) -> Self {
        tracing::warn!("Skipping {} '{}': {}", kind, key, reason);
        Self::new(phase, kind, key, EntityStatus::Skipped, None, Some(reason))
    }

    fn new(
        phase: Phase,
        kind: EntityKind,
        key: String,
        status: EntityStatus,
        id: Option<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            phase,
            kind,
            key,
            status,
            id,
            detail,
        }
    }

    /// Returns true if the entity is not in its desired state.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self.status, EntityStatus::Failed | EntityStatus::Skipped)
    }
}

/// Everything a run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Target realm.
    pub realm: String,
    /// Per-entity outcomes, in execution order.
    pub entries: Vec<ReportEntry>,
    /// Secrets of the clients listed for reveal, by `client_id`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
}

impl RunReport {
    fn count(&self, status: EntityStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Number of entities created by this run.
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(EntityStatus::Created)
    }

    /// Number of entities that already existed.
    #[must_use]
    pub fn existing(&self) -> usize {
        self.count(EntityStatus::Existing)
    }

    /// Number of failed entities.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(EntityStatus::Failed)
    }

    /// Number of skipped entities.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(EntityStatus::Skipped)
    }

    /// Returns true if every entity and binding is in its desired state.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        !self.entries.iter().any(ReportEntry::is_unresolved)
    }

    /// Entity keys that are failed or skipped.
    #[must_use]
    pub fn unresolved(&self) -> BTreeSet<(EntityKind, String)> {
        self.entries
            .iter()
            .filter(|e| e.is_unresolved())
            .map(|e| (e.kind, e.key.clone()))
            .collect()
    }

    /// Outcome of one entity, if it was reported.
    #[must_use]
    pub fn status_of(&self, kind: EntityKind, key: &str) -> Option<EntityStatus> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.key == key)
            .map(|e| e.status)
    }
}

/// Sequences a full setup run.
pub struct SetupOrchestrator {
    store: Arc<dyn IdentityStore>,
    graph: AudienceGraph,
    admin_realm: String,
}

impl SetupOrchestrator {
    /// Creates an orchestrator that authenticates against `master`.
    pub fn new(store: Arc<dyn IdentityStore>, graph: AudienceGraph) -> Self {
        Self {
            store,
            graph,
            admin_realm: "master".to_string(),
        }
    }

    /// Sets the realm the admin session and realm lookups run in.
    #[must_use]
    pub fn with_admin_realm(mut self, admin_realm: impl Into<String>) -> Self {
        self.admin_realm = admin_realm.into();
        self
    }

    /// The graph being realized.
    pub fn graph(&self) -> &AudienceGraph {
        &self.graph
    }

    /// Runs every phase.
    ///
    /// ## Errors
    ///
    /// Returns an error only if the initial connection fails, in which case
    /// nothing has been changed remotely.
    pub async fn run(&self) -> BootstrapResult<RunReport> {
        tracing::debug!("Phase {}", Phase::ConnectMaster);
        let session = self.store.authenticate().await.map_err(|err| {
            tracing::error!("Failed to connect to the identity provider: {}", err);
            err
        })?;
        tracing::info!(
            "Connected to realm '{}' (session valid for {}s)",
            session.realm,
            session.expires_in.as_secs()
        );

        let realm_name = self.graph.realm.name.clone();
        let mut report = RunReport {
            realm: realm_name.clone(),
            ..Default::default()
        };

        tracing::debug!("Phase {}", Phase::EnsureRealm);
        let admin = Reconciler::new(Arc::clone(&self.store), self.admin_realm.clone());
        let realm = DesiredEntity::Realm(self.graph.realm.clone());
        report.entries.push(ReportEntry::from_outcome(
            Phase::EnsureRealm,
            EntityKind::Realm,
            realm.key(),
            admin.ensure(&realm).await,
        ));

        tracing::debug!("Phase {}", Phase::SwitchRealmContext);
        let reconciler = Reconciler::new(Arc::clone(&self.store), realm_name.clone());
        tracing::info!("Provisioning realm '{}'", realm_name);

        tracing::debug!("Phase {}", Phase::CreateClients);
        report
            .entries
            .extend(self.graph.realize_clients(&reconciler).await);

        tracing::debug!("Phase {}", Phase::CreateScopesAndMappers);
        report
            .entries
            .extend(self.graph.realize_scopes(&reconciler).await);

        tracing::debug!("Phase {}", Phase::AssignBindings);
        let unavailable = report.unresolved();
        report
            .entries
            .extend(self.graph.realize_bindings(&reconciler, &unavailable).await);

        tracing::debug!("Phase {}", Phase::CreateDemoUsers);
        report
            .entries
            .extend(self.graph.realize_users(&reconciler).await);

        tracing::debug!("Phase {}", Phase::PrintSummary);
        for client_id in &self.graph.reveal_secrets {
            if report.status_of(EntityKind::Client, client_id) == Some(EntityStatus::Failed) {
                continue;
            }
            match reconciler.client_secret(client_id).await {
                Ok(secret) => {
                    report.secrets.insert(client_id.clone(), secret);
                }
                Err(err) => {
                    tracing::warn!("Could not retrieve secret of '{}': {}", client_id, err);
                }
            }
        }

        tracing::info!(
            "Setup of realm '{}' finished: {} created, {} existing, {} failed",
            realm_name,
            report.created(),
            report.existing(),
            report.failed()
        );
        Ok(report)
    }
}
