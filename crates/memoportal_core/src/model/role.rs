//! Closed role vocabulary.
//!
//! # Invariants
//! - Exactly three roles exist; adding one is a compile-time change.
//! - `admin` satisfies every permission check regardless of its stored list.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Highest role held by an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Secretary,
    Faculty,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Secretary, Role::Faculty];

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Secretary => "secretary",
            Self::Faculty => "faculty",
        }
    }

    /// Parses a stored role name. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "secretary" => Some(Self::Secretary),
            "faculty" => Some(Self::Faculty),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Admin => "Full system access, user management and memo approval.",
            Self::Secretary => "Department memo drafting, distribution and scheduling.",
            Self::Faculty => "Receives memos and calendar invitations for a department.",
        }
    }

    /// Whether actors with this role must belong to a department.
    pub fn requires_department(self) -> bool {
        match self {
            Self::Admin => false,
            Self::Secretary | Self::Faculty => true,
        }
    }

    /// Whether drafts from this role may be sent without approval.
    pub fn skips_memo_approval(self) -> bool {
        match self {
            Self::Admin => true,
            Self::Secretary | Self::Faculty => false,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn parse_is_exact_and_total_over_known_names() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("Admin"), None);
        assert_eq!(Role::parse("superadmin"), None);
    }

    #[test]
    fn only_admin_skips_approval() {
        assert!(Role::Admin.skips_memo_approval());
        assert!(!Role::Secretary.skips_memo_approval());
        assert!(!Role::Faculty.skips_memo_approval());
    }
}
