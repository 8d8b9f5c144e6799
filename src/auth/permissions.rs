//! Role table
//!
//! Each user role maps to a fixed set of `resource.action` permission strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field and office roles known to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Pm,
    Foreman,
    Crew,
    Worker,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Pm,
        Role::Foreman,
        Role::Crew,
        Role::Worker,
        Role::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pm => "pm",
            Role::Foreman => "foreman",
            Role::Crew => "crew",
            Role::Worker => "worker",
            Role::Viewer => "viewer",
        }
    }

    /// Permissions granted to this role
    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "projects.create",
                "projects.read",
                "projects.update",
                "projects.delete",
                "users.create",
                "users.read",
                "users.update",
                "users.delete",
                "materials.create",
                "materials.read",
                "materials.update",
                "materials.delete",
                "equipment.create",
                "equipment.read",
                "equipment.update",
                "equipment.delete",
                "work_entries.approve",
                "work_entries.create",
                "work_entries.read",
                "work_entries.update",
                "work_entries.delete",
                "teams.create",
                "teams.read",
                "teams.update",
                "teams.delete",
            ],
            Role::Pm => &[
                "projects.create",
                "projects.read",
                "projects.update",
                "work_entries.approve",
                "work_entries.create",
                "work_entries.read",
                "work_entries.update",
                "materials.read",
                "equipment.read",
                "teams.read",
            ],
            Role::Foreman => &[
                "projects.read",
                "work_entries.create",
                "work_entries.read",
                "work_entries.update",
                "materials.read",
                "equipment.read",
                "teams.read",
            ],
            Role::Crew | Role::Worker => &[
                "projects.read",
                "work_entries.create",
                "work_entries.read",
                "materials.read",
                "equipment.read",
            ],
            Role::Viewer => &[
                "projects.read",
                "work_entries.read",
                "materials.read",
                "equipment.read",
                "teams.read",
            ],
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Permissions for a role name as stored in the database; unknown roles get none
pub fn permissions_for(role: &str) -> Vec<&'static str> {
    role.parse::<Role>()
        .map(|r| r.permissions().to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_delete_projects() {
        assert!(Role::Admin.has_permission("projects.delete"));
    }

    #[test]
    fn pm_approves_but_cannot_manage_users() {
        assert!(Role::Pm.has_permission("work_entries.approve"));
        assert!(!Role::Pm.has_permission("users.create"));
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(Role::Viewer
            .permissions()
            .iter()
            .all(|p| p.ends_with(".read")));
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        assert!(permissions_for("contractor").is_empty());
        assert_eq!(permissions_for("worker").len(), 5);
    }

    #[test]
    fn role_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }
}
