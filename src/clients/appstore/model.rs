//! App Store Connect response models.
//!
//! The Connect API wraps everything in `{ "data": [...] }` with per-object
//! `attributes`/`relationships`; these types flatten that into what the
//! tool surface actually needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Team roles accepted by the invite tools. Free-form role strings are
/// passed through uppercased so new Connect roles keep working.
pub fn map_role(role: &str) -> String {
    match role {
        "admin" | "ADMIN" => "ADMIN".to_string(),
        "finance" | "FINANCE" => "FINANCE".to_string(),
        "developer" | "DEVELOPER" => "DEVELOPER".to_string(),
        "marketing" | "MARKETING" => "MARKETING".to_string(),
        "customer_support" | "CUSTOMER_SUPPORT" => "CUSTOMER_SUPPORT".to_string(),
        other => other.to_uppercase(),
    }
}

// ─── Wire envelopes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceObject<A> {
    pub id: String,
    #[serde(default)]
    pub attributes: Option<A>,
}

// ─── Users & invitations ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttributes {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TeamMember {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<String>,
}

impl TeamMember {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn from_object(obj: ResourceObject<UserAttributes>) -> Self {
        let attrs = obj.attributes.unwrap_or_default();
        Self {
            id: obj.id,
            email: attrs.username,
            first_name: attrs.first_name,
            last_name: attrs.last_name,
            roles: attrs.roles,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationAttributes {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UserInvitation {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl UserInvitation {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_expired(&self) -> bool {
        self.expires.map(|e| Utc::now() > e).unwrap_or(false)
    }

    pub fn from_object(obj: ResourceObject<InvitationAttributes>) -> Self {
        let attrs = obj.attributes.unwrap_or_default();
        Self {
            id: obj.id,
            email: attrs.email,
            first_name: attrs.first_name,
            last_name: attrs.last_name,
            roles: attrs.roles,
            expires: attrs.expiration_date,
        }
    }
}

// ─── Apps & TestFlight ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub platform: String,
}

#[derive(Debug, Clone)]
pub struct App {
    pub id: String,
    pub name: String,
    pub bundle_id: String,
    pub platform: String,
}

impl App {
    pub fn from_object(obj: ResourceObject<AppAttributes>) -> Self {
        let attrs = obj.attributes.unwrap_or_default();
        Self {
            id: obj.id,
            name: attrs.name,
            bundle_id: attrs.bundle_id,
            platform: attrs.platform,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaGroupAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_internal_group: bool,
}

#[derive(Debug, Clone)]
pub struct BetaGroup {
    pub id: String,
    pub name: String,
    pub is_internal_group: bool,
}

impl BetaGroup {
    pub fn from_object(obj: ResourceObject<BetaGroupAttributes>) -> Self {
        let attrs = obj.attributes.unwrap_or_default();
        Self {
            id: obj.id,
            name: attrs.name,
            is_internal_group: attrs.is_internal_group,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaTesterAttributes {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BetaTester {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Invitation state as reported by Connect (`INVITED`, `ACCEPTED`,
    /// `INSTALLED`, ...).
    pub state: Option<String>,
}

impl BetaTester {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn state_label(&self) -> &str {
        self.state.as_deref().unwrap_or("NOT_INVITED")
    }

    pub fn from_object(obj: ResourceObject<BetaTesterAttributes>) -> Self {
        let attrs = obj.attributes.unwrap_or_default();
        Self {
            id: obj.id,
            email: attrs.email,
            first_name: attrs.first_name,
            last_name: attrs.last_name,
            state: attrs.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_passes_unknown_roles_through_uppercased() {
        assert_eq!(map_role("customer_support"), "CUSTOMER_SUPPORT");
        assert_eq!(map_role("ADMIN"), "ADMIN");
        assert_eq!(map_role("app_manager"), "APP_MANAGER");
    }

    #[test]
    fn member_parses_from_connect_envelope() {
        let raw = r#"{
            "data": [{
                "id": "u1",
                "attributes": {
                    "username": "dev@example.com",
                    "firstName": "Dev",
                    "lastName": "One",
                    "roles": ["DEVELOPER"]
                }
            }]
        }"#;
        let envelope: ListEnvelope<ResourceObject<UserAttributes>> =
            serde_json::from_str(raw).expect("valid envelope");
        let member = TeamMember::from_object(envelope.data.into_iter().next().expect("one user"));
        assert_eq!(member.email, "dev@example.com");
        assert_eq!(member.full_name(), "Dev One");
        assert_eq!(member.roles, vec!["DEVELOPER"]);
    }
}
