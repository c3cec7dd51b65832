//! Admin API representations.
//!
//! These mirror the JSON bodies exchanged with the Keycloak admin REST API.
//! Optional fields are skipped when absent so that creation payloads only
//! carry what the desired state specifies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Realm representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    /// Internal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Realm name (unique).
    pub realm: String,
    /// Whether the realm is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Client representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ClientRepresentation {
    /// Internal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client identifier (OAuth `client_id`).
    pub client_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the client is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Whether this is a public client.
    #[serde(default)]
    pub public_client: bool,
    /// Enable Authorization Code flow.
    #[serde(default)]
    pub standard_flow_enabled: bool,
    /// Enable Direct Access Grants.
    #[serde(default)]
    pub direct_access_grants_enabled: bool,
    /// Enable Service Account.
    #[serde(default)]
    pub service_accounts_enabled: bool,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// Client scope representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScopeRepresentation {
    /// Internal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Scope name (unique within the realm).
    pub name: String,
    /// Protocol (`openid-connect`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Scope attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// Protocol mapper representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapperRepresentation {
    /// Internal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Mapper name.
    pub name: String,
    /// Protocol (`openid-connect`).
    pub protocol: String,
    /// Mapper type, e.g. `oidc-audience-mapper`.
    pub protocol_mapper: String,
    /// Whether consent is required.
    #[serde(default)]
    pub consent_required: bool,
    /// Mapper configuration.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Credential representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRepresentation {
    /// Credential type (`password`).
    #[serde(rename = "type")]
    pub credential_type: String,
    /// Secret value.
    pub value: String,
    /// Require change on first use.
    pub temporary: bool,
}

/// User representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
    /// Internal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Username (unique within the realm).
    pub username: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// First name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Whether the user is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Whether the email is verified.
    #[serde(default)]
    pub email_verified: bool,
    /// Initial credentials (write-only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialRepresentation>,
}

/// Client secret response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    /// Credential type.
    #[serde(rename = "type", default)]
    pub secret_type: Option<String>,
    /// Secret value.
    pub value: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for admin calls.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_serializes_camel_case() {
        let client = ClientRepresentation {
            client_id: "authproxy".to_string(),
            service_accounts_enabled: true,
            attributes: HashMap::from([(
                "standard.token.exchange.enabled".to_string(),
                "true".to_string(),
            )]),
            ..Default::default()
        };

        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["clientId"], "authproxy");
        assert_eq!(json["serviceAccountsEnabled"], true);
        assert_eq!(json["attributes"]["standard.token.exchange.enabled"], "true");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn user_deserializes_without_credentials() {
        let json = r#"{"id": "u-1", "username": "alice", "enabled": true, "firstName": "Alice"}"#;
        let user: UserRepresentation = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_deref(), Some("u-1"));
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert!(user.credentials.is_empty());
        assert!(!user.email_verified);
    }

    #[test]
    fn token_response_default_lifetime() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 60);
    }
}
