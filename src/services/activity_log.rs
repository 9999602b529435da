// SPDX-License-Identifier: MIT

//! Activity event logger.
//!
//! Telemetry is an optional capability, never a hard dependency of the
//! product: a missing backing relation soft-disables logging, and any other
//! store failure degrades to success-with-warning. The only hard failure is
//! a missing principal id, which callers rely on to catch integration
//! mistakes.

use std::collections::HashMap;

use chrono::Utc;

use crate::db::{ClubDb, StoreError};
use crate::error::{AppError, Result};
use crate::models::{ActivityAction, ActivityLogEntry, Module};

/// A discrete user action to be recorded.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub user_id: String,
    pub action: ActivityAction,
    pub page: Option<String>,
    pub module: Option<Module>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<String>, action: ActivityAction) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            page: None,
            module: None,
            target_id: None,
            target_type: None,
            details: None,
            ip_address: None,
            user_agent: None,
        }
    }
}

/// How a record call concluded. All three are a success from the caller's
/// point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// Entry appended and derived updates attempted
    Recorded,
    /// Telemetry relations not provisioned; nothing written
    Disabled,
    /// Store failure; the caller's primary action is unaffected
    Degraded,
}

/// Records activity events and maintains the derived aggregates.
#[derive(Clone)]
pub struct ActivityLogger {
    db: ClubDb,
}

impl ActivityLogger {
    pub fn new(db: ClubDb) -> Self {
        Self { db }
    }

    /// Record one event. Fails only on a missing principal id; every storage
    /// problem is contained and reported through the returned outcome.
    pub async fn record(&self, event: ActivityEvent) -> Result<LogOutcome> {
        if event.user_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "an activity event requires a resolved principal id".to_string(),
            ));
        }

        if !self.db.telemetry_enabled() {
            tracing::debug!(action = event.action.as_str(), "Activity logging disabled");
            return Ok(LogOutcome::Disabled);
        }

        let now = Utc::now();
        let module = event
            .module
            .or_else(|| event.page.as_deref().and_then(Module::from_page_path));

        let entry = ActivityLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: event.user_id,
            action: event.action,
            page: event.page,
            module,
            target_id: event.target_id,
            target_type: event.target_type,
            details: event.details,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            created_at: now,
        };

        match self.db.insert_activity_log(&entry).await {
            Ok(()) => {}
            Err(StoreError::Unprovisioned) => {
                tracing::debug!(
                    action = entry.action.as_str(),
                    "Telemetry relations missing; skipping activity log"
                );
                return Ok(LogOutcome::Disabled);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = %entry.user_id,
                    action = entry.action.as_str(),
                    "Failed to append activity log"
                );
                return Ok(LogOutcome::Degraded);
            }
        }

        tracing::debug!(
            user_id = %entry.user_id,
            action = entry.action.as_str(),
            page = ?entry.page,
            "Activity recorded"
        );

        // Derived updates are each independently best-effort; a failure here
        // never unwinds into the reported outcome.
        if let Err(e) = self
            .db
            .mutate_user_stats(&entry.user_id, |stats| {
                stats.record_action(entry.action, now)
            })
            .await
        {
            tracing::warn!(
                error = %e,
                user_id = %entry.user_id,
                "Failed to update user stats counters"
            );
        }

        if entry.action == ActivityAction::PageView {
            if let Some(page) = &entry.page {
                if let Err(e) = self.db.upsert_page_visit(&entry.user_id, page, now).await {
                    tracing::warn!(
                        error = %e,
                        user_id = %entry.user_id,
                        page = %page,
                        "Failed to upsert page visit"
                    );
                }
            }
        }

        Ok(LogOutcome::Recorded)
    }
}
