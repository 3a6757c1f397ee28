//! Users as seen by the warehouse: identity, role and permissions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Console roles relevant to the warehouse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Operator => "operator",
        }
    }

    /// Privileged actors may delete items and system taxonomy entries
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "operator" => Some(Role::Operator),
            _ => None,
        }
    }
}

/// Resources guarded by permissions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Inventory,
    Taxonomy,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Inventory => "inventory",
            Resource::Taxonomy => "taxonomy",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

/// Permission string in `resource:action` form
pub fn permission(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource.as_str(), action.as_str())
}

/// Permissions granted to a role by default
pub fn default_permissions(role: Role) -> Vec<String> {
    let actions: &[Action] = match role {
        Role::Admin => &[Action::View, Action::Edit, Action::Delete],
        Role::Manager => &[Action::View, Action::Edit],
        Role::Operator => &[Action::View],
    };
    let mut perms = Vec::new();
    for resource in [Resource::Inventory, Resource::Taxonomy] {
        for action in actions {
            perms.push(permission(resource, *action));
        }
    }
    // Operators still record stock movements
    if role == Role::Operator {
        perms.push(permission(Resource::Inventory, Action::Edit));
    }
    perms
}

/// Stored identity used for login and re-authentication
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_is_privileged() {
        assert!(Role::Admin.is_privileged());
        assert!(!Role::Manager.is_privileged());
        assert!(!Role::Operator.is_privileged());
    }

    #[test]
    fn test_default_permissions() {
        let admin = default_permissions(Role::Admin);
        assert!(admin.contains(&"inventory:delete".to_string()));
        assert!(admin.contains(&"taxonomy:edit".to_string()));

        let operator = default_permissions(Role::Operator);
        assert!(operator.contains(&"inventory:edit".to_string()));
        assert!(!operator.contains(&"taxonomy:edit".to_string()));
        assert!(!operator.contains(&"inventory:delete".to_string()));
    }
}
