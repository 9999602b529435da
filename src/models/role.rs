// SPDX-License-Identifier: MIT

//! Role hierarchy: ranks, visibility, and management rules.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Staff and athlete roles, ordered by rank.
///
/// `SystemAdmin` is a hidden role: it never appears in role pickers or
/// aggregated analytics for anyone but itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    SystemAdmin,
    SuperAdmin,
    Admin,
    Doctor,
    FitnessCoach,
    SportCoach,
    Nutritionist,
    Psychologist,
    Athlete,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::SystemAdmin,
        Role::SuperAdmin,
        Role::Admin,
        Role::Doctor,
        Role::FitnessCoach,
        Role::SportCoach,
        Role::Nutritionist,
        Role::Psychologist,
        Role::Athlete,
    ];

    /// Numeric rank used for relative comparison only. Never persist a rank
    /// as the source of truth for a role's identity.
    pub fn rank(self) -> u8 {
        match self {
            Role::SystemAdmin => 100,
            Role::SuperAdmin => 90,
            Role::Admin => 80,
            Role::Doctor => 60,
            Role::FitnessCoach | Role::SportCoach | Role::Nutritionist | Role::Psychologist => 50,
            Role::Athlete => 10,
        }
    }

    /// Hidden roles are excluded from every other role's visibility and from
    /// all aggregated analytics.
    pub fn is_hidden(self) -> bool {
        matches!(self, Role::SystemAdmin)
    }

    /// Full-access roles bypass sport/squad scoping entirely.
    pub fn has_full_access(self) -> bool {
        matches!(self, Role::SystemAdmin | Role::SuperAdmin | Role::Admin)
    }

    /// Whether this role may impersonate another principal.
    pub fn can_switch_user(self) -> bool {
        matches!(self, Role::SystemAdmin)
    }

    /// Management rules, evaluated in order:
    /// 1. A system admin manages anyone.
    /// 2. Nobody else manages a system admin.
    /// 3. A super admin manages anyone remaining.
    /// 4. Otherwise management requires a strictly higher rank.
    pub fn can_manage(self, target: Role) -> bool {
        if self == Role::SystemAdmin {
            return true;
        }
        if target == Role::SystemAdmin {
            return false;
        }
        if self == Role::SuperAdmin {
            return true;
        }
        self.rank() > target.rank()
    }

    /// The set of roles this role may see in pickers and listings.
    pub fn visible_roles(self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| !r.is_hidden() || self == Role::SystemAdmin)
            .collect()
    }

    /// Wire/storage identifier for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SystemAdmin => "system_admin",
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::FitnessCoach => "fitness_coach",
            Role::SportCoach => "sport_coach",
            Role::Nutritionist => "nutritionist",
            Role::Psychologist => "psychologist",
            Role::Athlete => "athlete",
        }
    }
}
