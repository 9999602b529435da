//! Browser session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked visit, stored in the `sessions` collection.
///
/// At most one active session per principal: starting a new one force-closes
/// any prior open session for the same principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Document ID (UUID v4)
    pub id: String,
    /// Owning principal id
    pub user_id: String,
    pub session_start: DateTime<Utc>,
    /// Set when the session closes
    #[serde(default)]
    pub session_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Whole minutes between start and end, computed at close
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Client network address
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Client agent string
    #[serde(default)]
    pub user_agent: Option<String>,
}
