// SPDX-License-Identifier: MIT

//! Record-store wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (principal profiles)
//! - Activity logs (append-only telemetry)
//! - User stats (per-principal aggregates, transactional upserts)
//! - Page visits (per principal+page+day counters)
//! - Sessions (visit tracking)
//!
//! The telemetry relations may not be provisioned yet in a fresh deployment.
//! That condition is probed once at construction and cached as a typed
//! capability (`telemetry_enabled`); callers treat it as a soft-disable, not
//! an error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    ActivityAction, ActivityLogEntry, Module, PageVisit, Session, User, UserStats,
};

/// Storage-level failures, kept separate from [`AppError`] because the
/// unprovisioned condition is load-bearing: it toggles soft-disable rather
/// than signalling a fault.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("telemetry relations are not provisioned")]
    Unprovisioned,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn from_firestore(err: firestore::errors::FirestoreError) -> Self {
        use firestore::errors::FirestoreError;
        match &err {
            FirestoreError::DataNotFoundError(_) => StoreError::Unprovisioned,
            _ => {
                let msg = err.to_string();
                if msg.contains("NotFound") {
                    StoreError::Unprovisioned
                } else {
                    StoreError::Unavailable(msg)
                }
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Filters for activity-log queries. Ordering is always `created_at`
/// descending; pagination happens in the service layer because several
/// filters (severity, free text) only exist after enrichment.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub user_id: Option<String>,
    pub action: Option<ActivityAction>,
    pub module: Option<Module>,
    pub page: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(MemStore),
    Offline,
}

/// Record store client.
#[derive(Clone)]
pub struct ClubDb {
    backend: Backend,
    telemetry_enabled: Arc<AtomicBool>,
}

impl ClubDb {
    /// Connect to Firestore and probe the telemetry relations once.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn connect(project_id: &str) -> Result<Self, AppError> {
        let client = if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            Self::create_emulator_client(project_id).await?
        } else {
            let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
                AppError::Database(format!("Failed to connect to Firestore: {}", e))
            })?;
            tracing::info!(project = project_id, "Connected to Firestore");
            client
        };

        let telemetry = probe_telemetry(&client).await;
        if !telemetry {
            tracing::info!("Telemetry relations not provisioned; activity logging disabled");
        }

        Ok(Self {
            backend: Backend::Firestore(client),
            telemetry_enabled: Arc::new(AtomicBool::new(telemetry)),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
    ) -> Result<firestore::FirestoreDb, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Dummy token source so the emulator accepts requests without local
        // credentials.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(client)
    }

    /// In-memory store for tests and local development.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemStore::new(true)),
            telemetry_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// In-memory store whose telemetry relations do not exist, for
    /// exercising the soft-disable paths.
    pub fn new_in_memory_unprovisioned() -> Self {
        Self {
            backend: Backend::Memory(MemStore::new(false)),
            telemetry_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Offline mock; every operation fails with `Unavailable`.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
            telemetry_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Resolved telemetry capability (probed once at construction).
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled.load(Ordering::Relaxed)
    }

    /// Provision or deprovision the telemetry relations of the in-memory
    /// backend. No-op for other backends.
    pub fn set_telemetry_provisioned(&self, provisioned: bool) {
        if let Backend::Memory(mem) = &self.backend {
            mem.lock().provisioned = provisioned;
            self.telemetry_enabled.store(provisioned, Ordering::Relaxed);
        }
    }

    fn offline() -> StoreError {
        StoreError::Unavailable("store offline".to_string())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a principal by id.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(user_id)
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => Ok(mem.lock().users.get(user_id).cloned()),
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// List all principals.
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::USERS)
                .obj()
                .query()
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => Ok(mem.lock().users.values().cloned().collect()),
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Create or update a principal.
    pub async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(&user.id)
                    .object(user)
                    .execute()
                    .await
                    .map_err(StoreError::from_firestore)?;
                Ok(())
            }
            Backend::Memory(mem) => {
                mem.lock().users.insert(user.id.clone(), user.clone());
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── Activity Log Operations ─────────────────────────────────

    /// Append an activity log entry.
    pub async fn insert_activity_log(&self, entry: &ActivityLogEntry) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::ACTIVITY_LOGS)
                    .document_id(&entry.id)
                    .object(entry)
                    .execute()
                    .await
                    .map_err(StoreError::from_firestore)?;
                Ok(())
            }
            Backend::Memory(mem) => {
                let mut inner = mem.lock();
                inner.check_provisioned()?;
                inner.logs.push(entry.clone());
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Query activity log entries, newest first.
    pub async fn query_activity_logs(
        &self,
        query: &LogQuery,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let q_user = query.user_id.clone();
                let q_action = query.action;
                let q_module = query.module;
                let q_page = query.page.clone();
                let q_start = query.start;
                let q_end = query.end;
                client
                    .fluent()
                    .select()
                    .from(collections::ACTIVITY_LOGS)
                    .filter(move |q| {
                        let mut conds = Vec::new();
                        if let Some(user_id) = &q_user {
                            conds.push(q.field("user_id").eq(user_id.clone()));
                        }
                        if let Some(action) = q_action {
                            conds.push(q.field("action").eq(action.as_str()));
                        }
                        if let Some(module) = q_module {
                            conds.push(q.field("module").eq(module.as_str()));
                        }
                        if let Some(page) = &q_page {
                            conds.push(q.field("page").eq(page.clone()));
                        }
                        if let Some(start) = q_start {
                            conds.push(q.field("created_at").greater_than_or_equal(start));
                        }
                        if let Some(end) = q_end {
                            conds.push(q.field("created_at").less_than_or_equal(end));
                        }
                        q.for_all(conds)
                    })
                    .order_by([(
                        "created_at",
                        firestore::FirestoreQueryDirection::Descending,
                    )])
                    .obj()
                    .query()
                    .await
                    .map_err(StoreError::from_firestore)
            }
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                let mut matches: Vec<ActivityLogEntry> = inner
                    .logs
                    .iter()
                    .filter(|e| {
                        query.user_id.as_ref().is_none_or(|v| &e.user_id == v)
                            && query.action.is_none_or(|v| e.action == v)
                            && query.module.is_none_or(|v| e.module == Some(v))
                            && query.page.as_ref().is_none_or(|v| e.page.as_ref() == Some(v))
                            && query.start.is_none_or(|v| e.created_at >= v)
                            && query.end.is_none_or(|v| e.created_at <= v)
                    })
                    .cloned()
                    .collect();
                matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(matches)
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── User Stats Operations ──────────────────────────────────

    /// Get a principal's stats aggregate.
    pub async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USER_STATS)
                .obj()
                .one(user_id)
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                Ok(inner.stats.get(user_id).cloned())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// List every principal's stats aggregate.
    pub async fn list_user_stats(&self) -> Result<Vec<UserStats>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::USER_STATS)
                .obj()
                .query()
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                Ok(inner.stats.values().cloned().collect())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Read-modify-write a principal's stats row inside a transaction, so a
    /// conflicting concurrent update is retried by the store instead of
    /// losing an increment. Creates the row on first use.
    pub async fn mutate_user_stats<F>(
        &self,
        user_id: &str,
        mutate: F,
    ) -> Result<UserStats, StoreError>
    where
        F: FnOnce(&mut UserStats),
    {
        match &self.backend {
            Backend::Firestore(client) => {
                let mut transaction = client
                    .begin_transaction()
                    .await
                    .map_err(StoreError::from_firestore)?;

                let current: Option<UserStats> = client
                    .fluent()
                    .select()
                    .by_id_in(collections::USER_STATS)
                    .obj()
                    .one(user_id)
                    .await
                    .map_err(StoreError::from_firestore)?;

                let mut stats = current.unwrap_or_else(|| UserStats::new(user_id));
                mutate(&mut stats);

                client
                    .fluent()
                    .update()
                    .in_col(collections::USER_STATS)
                    .document_id(user_id)
                    .object(&stats)
                    .add_to_transaction(&mut transaction)
                    .map_err(StoreError::from_firestore)?;

                transaction
                    .commit()
                    .await
                    .map_err(StoreError::from_firestore)?;

                Ok(stats)
            }
            Backend::Memory(mem) => {
                let mut inner = mem.lock();
                inner.check_provisioned()?;
                let stats = inner
                    .stats
                    .entry(user_id.to_string())
                    .or_insert_with(|| UserStats::new(user_id));
                mutate(stats);
                Ok(stats.clone())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── Page Visit Operations ──────────────────────────────────

    /// Upsert the day's visit counter for a page: create with count 1, or
    /// increment and refresh the last-visit timestamp.
    pub async fn upsert_page_visit(
        &self,
        user_id: &str,
        page: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let day = now.date_naive();
        let doc_id = PageVisit::doc_id(user_id, page, day);

        match &self.backend {
            Backend::Firestore(client) => {
                let mut transaction = client
                    .begin_transaction()
                    .await
                    .map_err(StoreError::from_firestore)?;

                let current: Option<PageVisit> = client
                    .fluent()
                    .select()
                    .by_id_in(collections::PAGE_VISITS)
                    .obj()
                    .one(&doc_id)
                    .await
                    .map_err(StoreError::from_firestore)?;

                let visit = match current {
                    Some(mut visit) => {
                        visit.visit_count += 1;
                        visit.last_visit_at = now;
                        visit
                    }
                    None => PageVisit {
                        user_id: user_id.to_string(),
                        page: page.to_string(),
                        visit_date: day,
                        visit_count: 1,
                        last_visit_at: now,
                    },
                };

                client
                    .fluent()
                    .update()
                    .in_col(collections::PAGE_VISITS)
                    .document_id(&doc_id)
                    .object(&visit)
                    .add_to_transaction(&mut transaction)
                    .map_err(StoreError::from_firestore)?;

                transaction
                    .commit()
                    .await
                    .map_err(StoreError::from_firestore)?;

                Ok(())
            }
            Backend::Memory(mem) => {
                let mut inner = mem.lock();
                inner.check_provisioned()?;
                inner
                    .visits
                    .entry(doc_id)
                    .and_modify(|v| {
                        v.visit_count += 1;
                        v.last_visit_at = now;
                    })
                    .or_insert_with(|| PageVisit {
                        user_id: user_id.to_string(),
                        page: page.to_string(),
                        visit_date: day,
                        visit_count: 1,
                        last_visit_at: now,
                    });
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// List page-visit rows, optionally from a given day onward.
    pub async fn list_page_visits(
        &self,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PageVisit>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::PAGE_VISITS)
                .filter(move |q| {
                    let mut conds = Vec::new();
                    if let Some(since) = since {
                        conds.push(q.field("visit_date").greater_than_or_equal(since));
                    }
                    q.for_all(conds)
                })
                .obj()
                .query()
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                Ok(inner
                    .visits
                    .values()
                    .filter(|v| since.is_none_or(|s| v.visit_date >= s))
                    .cloned()
                    .collect())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── Session Operations ─────────────────────────────────────

    /// Insert a session row.
    pub async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::SESSIONS)
                    .document_id(&session.id)
                    .object(session)
                    .execute()
                    .await
                    .map_err(StoreError::from_firestore)?;
                Ok(())
            }
            Backend::Memory(mem) => {
                let mut inner = mem.lock();
                inner.check_provisioned()?;
                inner.sessions.insert(session.id.clone(), session.clone());
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Get a session by id.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::SESSIONS)
                .obj()
                .one(session_id)
                .await
                .map_err(StoreError::from_firestore),
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                Ok(inner.sessions.get(session_id).cloned())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Sessions still marked active for a principal, newest first.
    pub async fn get_active_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let user_id = user_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::SESSIONS)
                    .filter(move |q| {
                        q.for_all([
                            q.field("user_id").eq(user_id.clone()),
                            q.field("is_active").eq(true),
                        ])
                    })
                    .order_by([(
                        "session_start",
                        firestore::FirestoreQueryDirection::Descending,
                    )])
                    .obj()
                    .query()
                    .await
                    .map_err(StoreError::from_firestore)
            }
            Backend::Memory(mem) => {
                let inner = mem.lock();
                inner.check_provisioned()?;
                let mut sessions: Vec<Session> = inner
                    .sessions
                    .values()
                    .filter(|s| s.user_id == user_id && s.is_active)
                    .cloned()
                    .collect();
                sessions.sort_by(|a, b| b.session_start.cmp(&a.session_start));
                Ok(sessions)
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Overwrite a session row (used to close sessions).
    pub async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.insert_session(session).await
    }
}

/// Probe the activity-log relation once. Unprovisioned resolves the
/// capability to disabled; a transient failure leaves it enabled so later
/// writes can degrade per-call instead of silencing telemetry permanently.
async fn probe_telemetry(client: &firestore::FirestoreDb) -> bool {
    let result: Result<Vec<ActivityLogEntry>, _> = client
        .fluent()
        .select()
        .from(collections::ACTIVITY_LOGS)
        .limit(1)
        .obj()
        .query()
        .await;

    match result.map_err(StoreError::from_firestore) {
        Ok(_) => true,
        Err(StoreError::Unprovisioned) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Telemetry probe failed; assuming provisioned");
            true
        }
    }
}

// ─── In-Memory Backend ──────────────────────────────────────────

#[derive(Clone)]
struct MemStore {
    inner: Arc<Mutex<MemInner>>,
}

#[derive(Default)]
struct MemInner {
    provisioned: bool,
    users: HashMap<String, User>,
    logs: Vec<ActivityLogEntry>,
    stats: HashMap<String, UserStats>,
    visits: HashMap<String, PageVisit>,
    sessions: HashMap<String, Session>,
}

impl MemStore {
    fn new(provisioned: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemInner {
                provisioned,
                ..MemInner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemInner {
    fn check_provisioned(&self) -> Result<(), StoreError> {
        if self.provisioned {
            Ok(())
        } else {
            Err(StoreError::Unprovisioned)
        }
    }
}
