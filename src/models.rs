//! Domain records, request bodies and response bodies.
//!
//! Stored models (`Identity`, `Resource`) are what the metadata stores
//! persist as JSON. Info models are what the API hands back to clients.

use serde::{Deserialize, Serialize};

// ============================================================================
// Identity Models
// ============================================================================

/// Registered identity as persisted by an identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub gender: String,
    pub created_at: u64,
}

/// Fields needed to create an identity. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Mutable profile fields. Every field replaces the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub gender: String,
}

/// Identity as returned to clients (no password hash).
#[derive(Debug, Serialize)]
pub struct IdentityInfo {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
    pub school: String,
    pub student_id: String,
    pub birthdate: String,
    pub address: String,
    pub gender: String,
    pub created_at: u64,
}

impl From<Identity> for IdentityInfo {
    fn from(identity: Identity) -> Self {
        IdentityInfo {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            phone_number: identity.phone_number,
            role: identity.role,
            school: identity.school,
            student_id: identity.student_id,
            birthdate: identity.birthdate,
            address: identity.address,
            gender: identity.gender,
            created_at: identity.created_at,
        }
    }
}

// ============================================================================
// Auth Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneSignupRequest {
    #[serde(default)]
    pub name: String,
    pub phone: String,
    pub code: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneLoginRequest {
    pub phone: String,
    pub code: String,
}

/// Response carrying a freshly issued session token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

// ============================================================================
// Resource Models
// ============================================================================

/// Catalog entry as persisted by a resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Storage key returned by the file backend.
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    /// Lower-case hex SHA-256 of the stored bytes.
    pub file_hash: String,
    pub status: ResourceStatus,
    pub created_at: u64,
}

/// Fields needed to create a resource. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub owner_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub resource_type: String,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub file_hash: String,
    pub status: ResourceStatus,
}

/// Descriptive fields supplied with an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadMeta {
    pub title: String,
    pub description: String,
    pub subject: String,
    pub resource_type: String,
}

/// Resource plus its public URL, computed on the way out.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    #[serde(flatten)]
    pub resource: Resource,
    pub url: String,
}

/// Filters for catalog listing. `None` means "don't filter".
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    pub status: Option<ResourceStatus>,
    pub search: Option<String>,
}

impl ResourceFilter {
    /// Whether a resource passes this filter. Search is a
    /// case-insensitive substring match on title or description.
    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(status) = self.status {
            if resource.status != status {
                return false;
            }
        }
        match self.search.as_deref() {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                resource.title.to_lowercase().contains(&needle)
                    || resource.description.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateQuery {
    #[serde(default)]
    pub hash: String,
}

// ============================================================================
// Enums
// ============================================================================

/// Identity roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Moderation state of a resource.
///
/// `Pending` is the only initial state. Review may move a resource to
/// either terminal state, and may overwrite one terminal state with the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceStatus {
    Pending,
    Approved,
    Rejected,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "PENDING",
            ResourceStatus::Approved => "APPROVED",
            ResourceStatus::Rejected => "REJECTED",
        }
    }

    /// Statuses a reviewer may assign.
    pub fn is_review_outcome(&self) -> bool {
        matches!(self, ResourceStatus::Approved | ResourceStatus::Rejected)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ResourceStatus::Pending),
            "APPROVED" => Ok(ResourceStatus::Approved),
            "REJECTED" => Ok(ResourceStatus::Rejected),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Flow a one-time code is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Signup,
    Login,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Signup => "signup",
            Purpose::Login => "login",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(Purpose::Signup),
            "login" => Ok(Purpose::Login),
            _ => Err(format!("Invalid purpose: {}", s)),
        }
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(title: &str, description: &str, status: ResourceStatus) -> Resource {
        Resource {
            id: 1,
            owner_id: None,
            title: title.to_string(),
            description: description.to_string(),
            subject: String::new(),
            resource_type: String::new(),
            filename: "k.pdf".to_string(),
            original_name: "a.pdf".to_string(),
            size: 3,
            file_hash: "00".to_string(),
            status,
            created_at: 0,
        }
    }

    #[test]
    fn test_role_wire_values() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"USER\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_review_outcomes() {
        assert!(!ResourceStatus::Pending.is_review_outcome());
        assert!(ResourceStatus::Approved.is_review_outcome());
        assert!(ResourceStatus::Rejected.is_review_outcome());
        assert!("DELETED".parse::<ResourceStatus>().is_err());
    }

    #[test]
    fn test_resource_type_field_name() {
        let json = serde_json::to_value(resource("t", "d", ResourceStatus::Pending)).unwrap();
        assert_eq!(json["type"], "");
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("resource_type").is_none());
    }

    #[test]
    fn test_filter_search_title_or_description() {
        let filter = ResourceFilter {
            status: None,
            search: Some("calc".to_string()),
        };
        assert!(filter.matches(&resource("Calculus notes", "", ResourceStatus::Pending)));
        assert!(filter.matches(&resource("Notes", "intro to CALC", ResourceStatus::Pending)));
        assert!(!filter.matches(&resource("Algebra", "groups", ResourceStatus::Pending)));
    }

    #[test]
    fn test_filter_status_exact() {
        let filter = ResourceFilter {
            status: Some(ResourceStatus::Approved),
            search: None,
        };
        assert!(filter.matches(&resource("a", "b", ResourceStatus::Approved)));
        assert!(!filter.matches(&resource("a", "b", ResourceStatus::Pending)));
    }

    #[test]
    fn test_identity_info_drops_hash() {
        let identity = Identity {
            id: 7,
            name: "Ann".to_string(),
            email: Some("ann@example.com".to_string()),
            phone_number: None,
            password_hash: "$argon2id$secret".to_string(),
            role: Role::User,
            school: String::new(),
            student_id: String::new(),
            birthdate: String::new(),
            address: String::new(),
            gender: String::new(),
            created_at: 1,
        };
        let json = serde_json::to_string(&IdentityInfo::from(identity)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"USER\""));
    }
}
