// SPDX-License-Identifier: MIT

//! Activity log model: actions, severity classification, and module tags.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::{Role, User};

/// Discrete user action kinds. The set is closed: an unrecognized action on
/// the wire is rejected at deserialization, never mapped to an "unknown"
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ActivityAction {
    Login,
    Logout,
    PageView,
    Create,
    Update,
    Delete,
    Export,
    Import,
    Search,
    UserSwitch,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 10] = [
        ActivityAction::Login,
        ActivityAction::Logout,
        ActivityAction::PageView,
        ActivityAction::Create,
        ActivityAction::Update,
        ActivityAction::Delete,
        ActivityAction::Export,
        ActivityAction::Import,
        ActivityAction::Search,
        ActivityAction::UserSwitch,
    ];

    /// Total severity mapping used by the audit trail.
    pub fn severity(self) -> Severity {
        match self {
            ActivityAction::PageView | ActivityAction::Search => Severity::Low,
            ActivityAction::Login
            | ActivityAction::Logout
            | ActivityAction::Create
            | ActivityAction::Update => Severity::Medium,
            ActivityAction::Delete | ActivityAction::Export | ActivityAction::Import => {
                Severity::High
            }
            ActivityAction::UserSwitch => Severity::Critical,
        }
    }

    /// Wire/storage identifier for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityAction::Login => "login",
            ActivityAction::Logout => "logout",
            ActivityAction::PageView => "page_view",
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Delete => "delete",
            ActivityAction::Export => "export",
            ActivityAction::Import => "import",
            ActivityAction::Search => "search",
            ActivityAction::UserSwitch => "user_switch",
        }
    }
}

/// Coarse risk classification attached to an action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Dashboard modules an action can be attributed to. Closed set, same
/// boundary rule as [`ActivityAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Module {
    Dashboard,
    Athletes,
    Fitness,
    Medical,
    Nutrition,
    Contracts,
    Attendance,
    Users,
    Reports,
    Settings,
}

impl Module {
    /// Derive a module from a page path by its first segment.
    ///
    /// Paths outside the known module set yield `None`; the entry is then
    /// stored without a module tag.
    pub fn from_page_path(path: &str) -> Option<Module> {
        let first = path
            .trim_start_matches('/')
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("");
        match first {
            "" | "dashboard" => Some(Module::Dashboard),
            "athletes" => Some(Module::Athletes),
            "fitness" => Some(Module::Fitness),
            "medical" => Some(Module::Medical),
            "nutrition" => Some(Module::Nutrition),
            "contracts" => Some(Module::Contracts),
            "attendance" => Some(Module::Attendance),
            "users" => Some(Module::Users),
            "reports" => Some(Module::Reports),
            "settings" => Some(Module::Settings),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Module::Dashboard => "dashboard",
            Module::Athletes => "athletes",
            Module::Fitness => "fitness",
            Module::Medical => "medical",
            Module::Nutrition => "nutrition",
            Module::Contracts => "contracts",
            Module::Attendance => "attendance",
            Module::Users => "users",
            Module::Reports => "reports",
            Module::Settings => "settings",
        }
    }
}

/// Append-only activity log row stored in `activity_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Document ID (UUID v4)
    pub id: String,
    /// Acting principal id
    pub user_id: String,
    /// What happened
    pub action: ActivityAction,
    /// Page path for page-scoped actions
    #[serde(default)]
    pub page: Option<String>,
    /// Module the action is attributed to
    #[serde(default)]
    pub module: Option<Module>,
    /// Id of the record acted upon, if any
    #[serde(default)]
    pub target_id: Option<String>,
    /// Kind of the record acted upon
    #[serde(default)]
    pub target_type: Option<String>,
    /// Free-form structured detail payload
    #[serde(default)]
    pub details: Option<HashMap<String, serde_json::Value>>,
    /// Client network address
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Client agent string
    #[serde(default)]
    pub user_agent: Option<String>,
    /// When the event was recorded
    pub created_at: DateTime<Utc>,
}

/// Log entry joined with the acting principal's profile, as served on the
/// wire (activity listing, recent-activity feed, audit trail).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogEntryView {
    pub id: String,
    pub user_id: String,
    pub action: ActivityAction,
    pub page: Option<String>,
    pub module: Option<Module>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Joined principal display name; falls back to the raw id when the
    /// principal row is missing
    pub display_name: String,
    /// Joined principal email, empty when the principal row is missing
    pub email: String,
    /// Joined principal role
    pub role: Option<Role>,
    pub severity: Severity,
}

impl LogEntryView {
    pub fn from_entry(entry: ActivityLogEntry, user: Option<&User>) -> Self {
        let severity = entry.action.severity();
        Self {
            severity,
            display_name: user
                .map(|u| u.display_name.clone())
                .unwrap_or_else(|| entry.user_id.clone()),
            email: user.map(|u| u.email.clone()).unwrap_or_default(),
            role: user.map(|u| u.role),
            id: entry.id,
            user_id: entry.user_id,
            action: entry.action,
            page: entry.page,
            module: entry.module,
            target_id: entry.target_id,
            target_type: entry.target_type,
            details: entry.details,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        }
    }
}
