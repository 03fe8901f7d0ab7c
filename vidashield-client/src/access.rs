//! Role-hierarchy access checks against the resource registry.

use crate::api_client::RestClient;
use crate::key::ResourceKey;
use serde::{Deserialize, Serialize};
use vidashield_cache::{Clock, RequestOptions};

pub const RESOURCES_PATH: &str = "/api/access/resources";

/// Roles in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    User = 1,
    Moderator = 2,
    Admin = 3,
}

impl Role {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Level of a role held by a user. Unknown roles hold nothing.
    pub fn level(name: &str) -> u8 {
        Self::parse(name).map_or(0, |role| role as u8)
    }

    /// Level a resource demands. Unknown requirements demand admin.
    pub fn required_level(name: &str) -> u8 {
        Self::parse(name).map_or(Self::Admin as u8, |role| role as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResource {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resource_type: String,
    pub resource_path: String,
    pub required_role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AccessDecision {
    fn allow(reason: String) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<AccessResource>,
}

/// Decide whether `user_role` may use `resource`.
pub fn evaluate(resource: Option<&AccessResource>, user_role: &str) -> AccessDecision {
    let Some(resource) = resource.filter(|resource| resource.is_active) else {
        return AccessDecision::deny("Resource not found");
    };
    if Role::level(user_role) >= Role::required_level(&resource.required_role) {
        AccessDecision::allow(format!("Role {user_role} has access"))
    } else {
        AccessDecision::deny(format!("Requires role {}", resource.required_role))
    }
}

pub struct AccessApi<'a, C> {
    client: &'a RestClient<C>,
}

impl<'a, C: Clock> AccessApi<'a, C> {
    pub fn new(client: &'a RestClient<C>) -> Self {
        Self { client }
    }

    /// Look up the active resource for `resource_path` and evaluate it.
    ///
    /// Never fails: lookup errors deny access.
    pub async fn check_access(&self, resource_path: &str, user_role: &str) -> AccessDecision {
        let key = ResourceKey::new(RESOURCES_PATH)
            .param("is_active", true)
            .param("resource_path", resource_path);

        match self
            .client
            .get_json::<ResourceList>(&key, RequestOptions::new())
            .await
        {
            Ok(read) => {
                let resource = read
                    .value()
                    .resources
                    .iter()
                    .find(|resource| resource.resource_path == resource_path);
                evaluate(resource, user_role)
            }
            Err(err) => {
                tracing::warn!(resource_path, error = %err, "Access check failed");
                AccessDecision::deny("Access check failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(required_role: &str, is_active: bool) -> AccessResource {
        AccessResource {
            id: "r1".to_string(),
            name: "Audit log".to_string(),
            description: None,
            resource_type: "page".to_string(),
            resource_path: "/audit".to_string(),
            required_role: required_role.to_string(),
            is_active,
        }
    }

    #[test]
    fn test_role_levels() {
        assert_eq!(Role::level("admin"), 3);
        assert_eq!(Role::level("moderator"), 2);
        assert_eq!(Role::level("user"), 1);
        assert_eq!(Role::level("guest"), 0);
        assert_eq!(Role::required_level("superuser"), 3);
        assert!(Role::Admin > Role::Moderator);
    }

    #[test]
    fn test_evaluate_hierarchy() {
        let moderated = resource("moderator", true);
        assert!(evaluate(Some(&moderated), "admin").allowed);
        assert!(evaluate(Some(&moderated), "moderator").allowed);

        let denied = evaluate(Some(&moderated), "user");
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "Requires role moderator");
    }

    #[test]
    fn test_unknown_required_role_needs_admin() {
        let odd = resource("owner", true);
        assert!(!evaluate(Some(&odd), "moderator").allowed);
        assert!(evaluate(Some(&odd), "admin").allowed);
    }

    #[test]
    fn test_missing_or_inactive_resource_is_denied() {
        assert_eq!(evaluate(None, "admin"), AccessDecision::deny("Resource not found"));
        let inactive = resource("user", false);
        assert!(!evaluate(Some(&inactive), "admin").allowed);
    }
}
