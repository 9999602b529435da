//! Principal (user) model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Role;

/// User profile stored in the `users` collection.
///
/// Principals are never physically deleted; `is_active = false` deactivates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque principal id (also used as document ID)
    pub id: String,
    /// Email address
    pub email: String,
    /// Display name shown in activity feeds and audit views
    pub display_name: String,
    /// Role in the club hierarchy
    pub role: Role,
    /// Deactivated principals cannot authenticate
    pub is_active: bool,
    /// Optional phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Sports this principal is scoped to; empty or containing "all" means
    /// unrestricted
    #[serde(default)]
    pub assigned_sports: Vec<String>,
    /// Squads this principal is scoped to; same convention as sports
    #[serde(default)]
    pub assigned_squads: Vec<String>,
    /// When the principal was created
    pub created_at: DateTime<Utc>,
    /// Last profile mutation
    pub updated_at: DateTime<Utc>,
}
