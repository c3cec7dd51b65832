//! Desired-state entities.
//!
//! Each entity kind is a fixed structure keyed by the identifier the
//! identity provider enforces uniqueness on. [`DesiredEntity`] closes the
//! set so the reconciler can treat every kind uniformly.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::{
    ClientRepresentation, ClientScopeRepresentation, CredentialRepresentation,
    ProtocolMapperRepresentation, RealmRepresentation, UserRepresentation,
};

/// Protocol used by every scope and mapper this crate creates.
pub const OIDC_PROTOCOL: &str = "openid-connect";

/// Keycloak mapper type that stamps a fixed audience.
pub const AUDIENCE_MAPPER: &str = "oidc-audience-mapper";

/// Client attribute enabling standard token exchange.
pub const TOKEN_EXCHANGE_ATTRIBUTE: &str = "standard.token.exchange.enabled";

/// Kind of entity or relationship managed by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EntityKind {
    /// Realm.
    Realm,
    /// OAuth2 client.
    Client,
    /// Client scope.
    ClientScope,
    /// Audience protocol mapper.
    AudienceMapper,
    /// Scope binding (relationship).
    ScopeBinding,
    /// User.
    User,
}

impl EntityKind {
    /// Returns the display name used in errors and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Realm => "Realm",
            Self::Client => "Client",
            Self::ClientScope => "ClientScope",
            Self::AudienceMapper => "AudienceMapper",
            Self::ScopeBinding => "ScopeBinding",
            Self::User => "User",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealmSpec {
    /// Realm name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Whether the realm is enabled.
    pub enabled: bool,
}

impl RealmSpec {
    /// Creates an enabled realm whose display name is its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            enabled: true,
        }
    }

    /// Builds the creation payload.
    #[must_use]
    pub fn to_representation(&self) -> RealmRepresentation {
        RealmRepresentation {
            id: None,
            realm: self.name.clone(),
            enabled: self.enabled,
            display_name: Some(self.display_name.clone()),
        }
    }
}

/// OAuth flows enabled on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClientFlags {
    /// Authorization Code flow.
    pub standard_flow: bool,
    /// Resource Owner Password Credentials.
    pub direct_access_grants: bool,
    /// Client Credentials (service account).
    pub service_accounts: bool,
}

/// Desired client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSpec {
    /// Client identifier.
    pub client_id: String,
    /// Display name.
    pub display_name: String,
    /// Confidential (has a secret) or public.
    pub confidential: bool,
    /// Enabled flows.
    pub flags: ClientFlags,
    /// Extra attributes.
    pub attributes: HashMap<String, String>,
}

impl ClientSpec {
    /// Creates a confidential client with no flows enabled.
    #[must_use]
    pub fn confidential(client_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            display_name: display_name.into(),
            confidential: true,
            flags: ClientFlags::default(),
            attributes: HashMap::new(),
        }
    }

    /// Enables the given flows.
    #[must_use]
    pub fn with_flags(mut self, flags: ClientFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Allows this client to perform standard token exchange.
    #[must_use]
    pub fn with_token_exchange(mut self) -> Self {
        self.attributes
            .insert(TOKEN_EXCHANGE_ATTRIBUTE.to_string(), "true".to_string());
        self
    }

    /// Returns true if token exchange is enabled.
    #[must_use]
    pub fn token_exchange_enabled(&self) -> bool {
        self.attributes
            .get(TOKEN_EXCHANGE_ATTRIBUTE)
            .is_some_and(|v| v == "true")
    }

    /// Builds the creation payload.
    #[must_use]
    pub fn to_representation(&self) -> ClientRepresentation {
        ClientRepresentation {
            id: None,
            client_id: self.client_id.clone(),
            name: Some(self.display_name.clone()),
            enabled: true,
            public_client: !self.confidential,
            standard_flow_enabled: self.flags.standard_flow,
            direct_access_grants_enabled: self.flags.direct_access_grants,
            service_accounts_enabled: self.flags.service_accounts,
            attributes: self.attributes.clone(),
        }
    }
}

/// Desired client scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSpec {
    /// Scope name.
    pub name: String,
    /// Include the scope name in the token `scope` claim.
    pub include_in_token_scope: bool,
    /// Show on the consent screen.
    pub display_on_consent: bool,
}

impl ScopeSpec {
    /// Creates an OIDC scope that is visible in tokens and on consent.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include_in_token_scope: true,
            display_on_consent: true,
        }
    }

    /// Builds the creation payload.
    #[must_use]
    pub fn to_representation(&self) -> ClientScopeRepresentation {
        ClientScopeRepresentation {
            id: None,
            name: self.name.clone(),
            protocol: Some(OIDC_PROTOCOL.to_string()),
            attributes: HashMap::from([
                (
                    "include.in.token.scope".to_string(),
                    self.include_in_token_scope.to_string(),
                ),
                (
                    "display.on.consent.screen".to_string(),
                    self.display_on_consent.to_string(),
                ),
            ]),
        }
    }
}

/// Which tokens an audience mapper writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimPlacement {
    /// ID token.
    pub id_token: bool,
    /// Access token.
    pub access_token: bool,
    /// Userinfo response.
    pub userinfo: bool,
}

impl Default for ClaimPlacement {
    fn default() -> Self {
        Self {
            id_token: false,
            access_token: true,
            userinfo: false,
        }
    }
}

/// Desired audience mapper, owned by exactly one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudienceMapperSpec {
    /// Mapper name (unique within the scope).
    pub name: String,
    /// Name of the owning scope.
    pub scope: String,
    /// Audience value injected into tokens.
    pub audience: String,
    /// Token placement.
    pub placement: ClaimPlacement,
}

impl AudienceMapperSpec {
    /// Creates an access-token audience mapper.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        scope: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            audience: audience.into(),
            placement: ClaimPlacement::default(),
        }
    }

    /// Builds the creation payload.
    #[must_use]
    pub fn to_representation(&self) -> ProtocolMapperRepresentation {
        ProtocolMapperRepresentation {
            id: None,
            name: self.name.clone(),
            protocol: OIDC_PROTOCOL.to_string(),
            protocol_mapper: AUDIENCE_MAPPER.to_string(),
            consent_required: false,
            config: HashMap::from([
                ("included.custom.audience".to_string(), self.audience.clone()),
                ("id.token.claim".to_string(), self.placement.id_token.to_string()),
                (
                    "access.token.claim".to_string(),
                    self.placement.access_token.to_string(),
                ),
                (
                    "userinfo.token.claim".to_string(),
                    self.placement.userinfo.to_string(),
                ),
            ]),
        }
    }
}

/// Default or optional scope set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ScopeSet {
    /// Included in every token without being requested.
    Default,
    /// Included only when explicitly requested.
    Optional,
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Optional => f.write_str("optional"),
        }
    }
}

/// What a scope is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BindingTarget {
    /// The realm-wide default/optional sets.
    Realm,
    /// A single client, by `client_id`.
    Client(String),
}

/// A scope attached to the realm or to one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeBinding {
    /// Realm or client.
    pub target: BindingTarget,
    /// Scope name.
    pub scope: String,
    /// Default or optional set.
    pub set: ScopeSet,
}

impl ScopeBinding {
    /// Attaches a scope realm-wide.
    #[must_use]
    pub fn realm(scope: impl Into<String>, set: ScopeSet) -> Self {
        Self {
            target: BindingTarget::Realm,
            scope: scope.into(),
            set,
        }
    }

    /// Attaches a scope to one client.
    #[must_use]
    pub fn client(client_id: impl Into<String>, scope: impl Into<String>, set: ScopeSet) -> Self {
        Self {
            target: BindingTarget::Client(client_id.into()),
            scope: scope.into(),
            set,
        }
    }

    /// Human-readable key used in reports.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.target {
            BindingTarget::Realm => format!("realm {} <- {}", self.set, self.scope),
            BindingTarget::Client(client_id) => {
                format!("{client_id} {} <- {}", self.set, self.scope)
            }
        }
    }
}

/// Desired user with an initial password.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct UserSpec {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Initial password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Whether the user is enabled.
    pub enabled: bool,
    /// Whether the email is verified.
    pub email_verified: bool,
}

impl fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl UserSpec {
    /// Builds the creation payload, including a non-temporary password.
    #[must_use]
    pub fn to_representation(&self) -> UserRepresentation {
        UserRepresentation {
            id: None,
            username: self.username.clone(),
            email: Some(self.email.clone()),
            first_name: Some(self.first_name.clone()),
            last_name: Some(self.last_name.clone()),
            enabled: self.enabled,
            email_verified: self.email_verified,
            credentials: vec![CredentialRepresentation {
                credential_type: "password".to_string(),
                value: self.password.clone(),
                temporary: false,
            }],
        }
    }
}

/// A desired entity of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredEntity {
    /// Realm.
    Realm(RealmSpec),
    /// Client.
    Client(ClientSpec),
    /// Client scope.
    ClientScope(ScopeSpec),
    /// Audience mapper.
    AudienceMapper(AudienceMapperSpec),
    /// User.
    User(UserSpec),
}

impl DesiredEntity {
    /// Returns the entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Realm(_) => EntityKind::Realm,
            Self::Client(_) => EntityKind::Client,
            Self::ClientScope(_) => EntityKind::ClientScope,
            Self::AudienceMapper(_) => EntityKind::AudienceMapper,
            Self::User(_) => EntityKind::User,
        }
    }

    /// Returns the unique key of the entity.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Realm(r) => r.name.clone(),
            Self::Client(c) => c.client_id.clone(),
            Self::ClientScope(s) => s.name.clone(),
            Self::AudienceMapper(m) => format!("{}/{}", m.scope, m.name),
            Self::User(u) => u.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_payload_carries_token_exchange() {
        let client = ClientSpec::confidential("authproxy", "Auth Proxy")
            .with_flags(ClientFlags {
                service_accounts: true,
                ..Default::default()
            })
            .with_token_exchange();

        assert!(client.token_exchange_enabled());
        let rep = client.to_representation();
        assert!(!rep.public_client);
        assert!(rep.service_accounts_enabled);
        assert!(!rep.standard_flow_enabled);
        assert_eq!(rep.attributes[TOKEN_EXCHANGE_ATTRIBUTE], "true");
    }

    #[test]
    fn mapper_payload_targets_access_token_only() {
        let mapper = AudienceMapperSpec::new("demoapp-aud", "demoapp-aud", "demoapp");
        let rep = mapper.to_representation();
        assert_eq!(rep.protocol_mapper, AUDIENCE_MAPPER);
        assert_eq!(rep.config["included.custom.audience"], "demoapp");
        assert_eq!(rep.config["access.token.claim"], "true");
        assert_eq!(rep.config["id.token.claim"], "false");
        assert_eq!(rep.config["userinfo.token.claim"], "false");
    }

    #[test]
    fn user_payload_has_permanent_password() {
        let user = UserSpec {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Demo".to_string(),
            password: "alice123".to_string(),
            enabled: true,
            email_verified: true,
        };
        let rep = user.to_representation();
        assert_eq!(rep.credentials.len(), 1);
        assert!(!rep.credentials[0].temporary);
        assert!(!format!("{user:?}").contains("alice123"));
    }

    #[test]
    fn entity_keys() {
        let mapper = DesiredEntity::AudienceMapper(AudienceMapperSpec::new("m", "s", "aud"));
        assert_eq!(mapper.kind(), EntityKind::AudienceMapper);
        assert_eq!(mapper.key(), "s/m");

        let binding = ScopeBinding::client("authproxy", "demoapp-aud", ScopeSet::Default);
        assert_eq!(binding.key(), "authproxy default <- demoapp-aud");
        let binding = ScopeBinding::realm("auth-target-aud", ScopeSet::Optional);
        assert_eq!(binding.key(), "realm optional <- auth-target-aud");
    }
}
