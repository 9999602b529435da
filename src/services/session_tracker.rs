// SPDX-License-Identifier: MIT

//! Session tracking: one active session per principal, with login-streak and
//! duration accounting.
//!
//! Ending a session may be triggered from a page-unload beacon, so the
//! server side tolerates duplicates and missing sessions: ending an already
//! closed or unknown session is a no-op, not an error. Like the activity
//! logger, every store failure degrades to success.

use chrono::Utc;
use futures_util::{stream, StreamExt};

use crate::db::{ClubDb, StoreError};
use crate::error::{AppError, Result};
use crate::models::{ActivityAction, Session};
use crate::services::activity_log::{ActivityEvent, ActivityLogger};
use crate::time_utils::minutes_between;

const MAX_CONCURRENT_DB_OPS: usize = 10;

/// Which session an end call targets.
#[derive(Debug, Clone)]
pub enum EndTarget {
    /// A specific session id
    Session(String),
    /// Whatever session is currently active for a principal
    Principal(String),
}

/// Opens and closes sessions and keeps the per-principal login counters.
#[derive(Clone)]
pub struct SessionTracker {
    db: ClubDb,
    logger: ActivityLogger,
}

impl SessionTracker {
    pub fn new(db: ClubDb) -> Self {
        let logger = ActivityLogger::new(db.clone());
        Self { db, logger }
    }

    /// Open a session for a principal, force-closing any session still open
    /// for them first. Returns the new session id, or `None` when telemetry
    /// is disabled or the store declined the write.
    pub async fn start(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Option<String>> {
        if user_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "a session requires a resolved principal id".to_string(),
            ));
        }

        if !self.db.telemetry_enabled() {
            return Ok(None);
        }

        let now = Utc::now();

        // Force-close sessions left open by a previous visit.
        match self.db.get_active_sessions(user_id).await {
            Ok(open) => {
                let db = self.db.clone();
                let results: Vec<std::result::Result<(), StoreError>> = stream::iter(open)
                    .map(|mut session| {
                        let db = db.clone();
                        async move {
                            session.is_active = false;
                            session.session_end = Some(now);
                            db.update_session(&session).await
                        }
                    })
                    .buffer_unordered(MAX_CONCURRENT_DB_OPS)
                    .collect()
                    .await;
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, user_id, "Failed to force-close session");
                    }
                }
            }
            Err(StoreError::Unprovisioned) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Failed to query open sessions");
            }
        }

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_start: now,
            session_end: None,
            is_active: true,
            duration_minutes: None,
            ip_address: ip_address.clone(),
            user_agent: user_agent.clone(),
        };

        match self.db.insert_session(&session).await {
            Ok(()) => {}
            Err(StoreError::Unprovisioned) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Failed to open session");
                return Ok(None);
            }
        }

        let today = now.date_naive();
        if let Err(e) = self
            .db
            .mutate_user_stats(user_id, |stats| stats.record_login(today))
            .await
        {
            tracing::warn!(error = %e, user_id, "Failed to update login streak");
        }

        let mut event = ActivityEvent::new(user_id, ActivityAction::Login);
        event.ip_address = ip_address;
        event.user_agent = user_agent;
        if let Err(e) = self.logger.record(event).await {
            tracing::warn!(error = %e, user_id, "Failed to record login event");
        }

        tracing::info!(user_id, session_id = %session.id, "Session started");
        Ok(Some(session.id))
    }

    /// Close a session and fold its duration into the principal's stats.
    /// Idempotent: already-closed or unknown targets are a no-op.
    pub async fn end(&self, target: EndTarget) -> Result<()> {
        if !self.db.telemetry_enabled() {
            return Ok(());
        }

        let session = match &target {
            EndTarget::Session(session_id) => match self.db.get_session(session_id).await {
                Ok(session) => session,
                Err(StoreError::Unprovisioned) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, session_id, "Failed to load session to end");
                    return Ok(());
                }
            },
            EndTarget::Principal(user_id) => match self.db.get_active_sessions(user_id).await {
                Ok(open) => open.into_iter().next(),
                Err(StoreError::Unprovisioned) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, user_id, "Failed to find active session to end");
                    return Ok(());
                }
            },
        };

        let Some(mut session) = session else {
            return Ok(());
        };
        if !session.is_active {
            return Ok(());
        }

        let now = Utc::now();
        let duration = minutes_between(session.session_start, now);
        session.is_active = false;
        session.session_end = Some(now);
        session.duration_minutes = Some(duration);

        if let Err(e) = self.db.update_session(&session).await {
            // Leave the stats untouched so a retried end cannot double-count.
            tracing::warn!(error = %e, session_id = %session.id, "Failed to close session");
            return Ok(());
        }

        if let Err(e) = self
            .db
            .mutate_user_stats(&session.user_id, |stats| {
                stats.record_session_end(duration)
            })
            .await
        {
            tracing::warn!(error = %e, user_id = %session.user_id, "Failed to update session totals");
        }

        let mut event = ActivityEvent::new(session.user_id.clone(), ActivityAction::Logout);
        event.ip_address = session.ip_address.clone();
        event.user_agent = session.user_agent.clone();
        if let Err(e) = self.logger.record(event).await {
            tracing::warn!(error = %e, user_id = %session.user_id, "Failed to record logout event");
        }

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.id,
            duration_minutes = duration,
            "Session ended"
        );
        Ok(())
    }

    /// The principal's currently active session, if any.
    pub async fn current(&self, user_id: &str) -> Result<Option<Session>> {
        if !self.db.telemetry_enabled() {
            return Ok(None);
        }
        match self.db.get_active_sessions(user_id).await {
            Ok(open) => Ok(open.into_iter().next()),
            Err(StoreError::Unprovisioned) => Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Failed to query current session");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LogQuery;
    use chrono::Duration;

    #[tokio::test]
    async fn test_start_leaves_exactly_one_active_session() {
        let db = ClubDb::new_in_memory();
        let tracker = SessionTracker::new(db.clone());

        let first = tracker.start("u1", None, None).await.unwrap().unwrap();
        let second = tracker.start("u1", None, None).await.unwrap().unwrap();
        assert_ne!(first, second);

        let active = db.get_active_sessions("u1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);

        let closed = db.get_session(&first).await.unwrap().unwrap();
        assert!(!closed.is_active);
        assert!(closed.session_end.is_some());
    }

    #[tokio::test]
    async fn test_start_updates_login_counters_and_logs_event() {
        let db = ClubDb::new_in_memory();
        let tracker = SessionTracker::new(db.clone());

        tracker.start("u1", None, None).await.unwrap();

        let stats = db.get_user_stats("u1").await.unwrap().unwrap();
        assert_eq!(stats.total_logins, 1);
        assert_eq!(stats.login_streak, 1);
        assert_eq!(stats.last_login_date, Some(Utc::now().date_naive()));

        let logs = db.query_activity_logs(&LogQuery::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ActivityAction::Login);
    }

    #[tokio::test]
    async fn test_start_continues_streak_from_yesterday() {
        let db = ClubDb::new_in_memory();
        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        db.mutate_user_stats("u1", |stats| {
            stats.last_login_date = Some(yesterday);
            stats.login_streak = 4;
        })
        .await
        .unwrap();

        SessionTracker::new(db.clone())
            .start("u1", None, None)
            .await
            .unwrap();

        let stats = db.get_user_stats("u1").await.unwrap().unwrap();
        assert_eq!(stats.login_streak, 5);
    }

    #[tokio::test]
    async fn test_end_is_idempotent_and_counts_minutes_once() {
        let db = ClubDb::new_in_memory();
        let tracker = SessionTracker::new(db.clone());

        let session = Session {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            session_start: Utc::now() - Duration::minutes(30),
            session_end: None,
            is_active: true,
            duration_minutes: None,
            ip_address: None,
            user_agent: None,
        };
        db.insert_session(&session).await.unwrap();

        tracker.end(EndTarget::Session("s1".to_string())).await.unwrap();

        let closed = db.get_session("s1").await.unwrap().unwrap();
        assert!(!closed.is_active);
        assert_eq!(closed.duration_minutes, Some(30));

        let stats = db.get_user_stats("u1").await.unwrap().unwrap();
        assert_eq!(stats.total_session_minutes, 30);

        // Second end (e.g. a duplicate unload beacon) changes nothing.
        tracker.end(EndTarget::Session("s1".to_string())).await.unwrap();
        let stats = db.get_user_stats("u1").await.unwrap().unwrap();
        assert_eq!(stats.total_session_minutes, 30);
    }

    #[tokio::test]
    async fn test_end_unknown_session_is_a_noop() {
        let db = ClubDb::new_in_memory();
        let tracker = SessionTracker::new(db.clone());
        tracker
            .end(EndTarget::Session("missing".to_string()))
            .await
            .unwrap();
        assert!(db.get_user_stats("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_by_principal_closes_active_session() {
        let db = ClubDb::new_in_memory();
        let tracker = SessionTracker::new(db.clone());

        tracker.start("u1", None, None).await.unwrap();
        tracker
            .end(EndTarget::Principal("u1".to_string()))
            .await
            .unwrap();

        assert!(tracker.current("u1").await.unwrap().is_none());
        let logs = db
            .query_activity_logs(&LogQuery {
                action: Some(ActivityAction::Logout),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_unprovisioned_store_reports_success_without_session() {
        let db = ClubDb::new_in_memory_unprovisioned();
        let tracker = SessionTracker::new(db.clone());

        let session_id = tracker.start("u1", None, None).await.unwrap();
        assert!(session_id.is_none());
        tracker
            .end(EndTarget::Principal("u1".to_string()))
            .await
            .unwrap();
        assert!(tracker.current("u1").await.unwrap().is_none());
    }
}
