// SPDX-License-Identifier: MIT

//! Audit trail engine.
//!
//! Privileged read path over the same raw activity logs the aggregator
//! consumes, serving the single hidden system administrator. The
//! authorization check fails closed: denial is an explicit 403, never an
//! empty result.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::db::{ClubDb, LogQuery, StoreError};
use crate::error::{AppError, Result};
use crate::models::{ActivityAction, LogEntryView, Module, Severity, User};
use crate::services::identity::ActingIdentity;

/// Audit query filters. Severity and free-text filters depend on joined
/// fields, so they are applied after enrichment; pagination is applied last
/// so `total` reflects the filtered count.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub action: Option<ActivityAction>,
    pub module: Option<Module>,
    pub severity: Option<Severity>,
    pub search: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of audit results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuditPage {
    pub logs: Vec<LogEntryView>,
    /// Count after all filters, before pagination
    pub total: u32,
    pub limit: u32,
    pub offset: u32,
    pub stats: AuditSummary,
    pub filter_options: FilterOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuditSummary {
    pub by_action: BTreeMap<String, u32>,
    pub by_severity: BTreeMap<String, u32>,
    pub unique_users: u32,
}

/// Distinct values present in the queried window, for the filter dropdowns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FilterOptions {
    pub actions: Vec<ActivityAction>,
    pub modules: Vec<Module>,
    pub users: Vec<AuditUserOption>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuditUserOption {
    pub id: String,
    pub display_name: String,
}

/// Queries and summarizes the audit trail.
#[derive(Clone)]
pub struct AuditTrail {
    db: ClubDb,
}

impl AuditTrail {
    pub fn new(db: ClubDb) -> Self {
        Self { db }
    }

    /// Run an audit query on behalf of `caller`.
    ///
    /// The resolved acting principal must hold the hidden role; an
    /// impersonated target never qualifies, even when the impersonator would.
    pub async fn query(&self, caller: &ActingIdentity, query: AuditQuery) -> Result<AuditPage> {
        if !caller.acting().role.is_hidden() {
            return Err(AppError::Forbidden(
                "audit trail access is restricted".to_string(),
            ));
        }

        if !self.db.telemetry_enabled() {
            return Ok(Self::empty_page(&query));
        }

        // The auditor sees every principal, hidden ones included.
        let users: HashMap<String, User> = self
            .db
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let raw = match self
            .db
            .query_activity_logs(&LogQuery {
                user_id: query.user_id.clone(),
                action: query.action,
                module: query.module,
                page: None,
                start: query.start,
                end: query.end,
            })
            .await
        {
            Ok(raw) => raw,
            Err(StoreError::Unprovisioned) => return Ok(Self::empty_page(&query)),
            Err(e) => return Err(e.into()),
        };

        let enriched: Vec<LogEntryView> = raw
            .into_iter()
            .map(|entry| {
                let user = users.get(&entry.user_id);
                LogEntryView::from_entry(entry, user)
            })
            .collect();

        let filter_options = Self::filter_options(&enriched);

        let needle = query
            .search
            .as_deref()
            .map(str::to_lowercase)
            .filter(|s| !s.is_empty());
        let filtered: Vec<LogEntryView> = enriched
            .into_iter()
            .filter(|view| {
                query.severity.is_none_or(|s| view.severity == s)
                    && needle
                        .as_deref()
                        .is_none_or(|needle| Self::matches_search(view, needle))
            })
            .collect();

        let stats = Self::summarize(&filtered);
        let total = filtered.len() as u32;
        let logs: Vec<LogEntryView> = filtered
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        Ok(AuditPage {
            logs,
            total,
            limit: query.limit as u32,
            offset: query.offset as u32,
            stats,
            filter_options,
        })
    }

    fn matches_search(view: &LogEntryView, needle: &str) -> bool {
        view.display_name.to_lowercase().contains(needle)
            || view.email.to_lowercase().contains(needle)
            || view.action.as_str().contains(needle)
            || view
                .page
                .as_deref()
                .is_some_and(|p| p.to_lowercase().contains(needle))
            || view
                .target_id
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(needle))
    }

    fn summarize(views: &[LogEntryView]) -> AuditSummary {
        let mut by_action: BTreeMap<String, u32> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, u32> = BTreeMap::new();
        let mut users: HashSet<&str> = HashSet::new();
        for view in views {
            *by_action.entry(view.action.as_str().to_string()).or_insert(0) += 1;
            *by_severity
                .entry(view.severity.as_str().to_string())
                .or_insert(0) += 1;
            users.insert(view.user_id.as_str());
        }
        AuditSummary {
            by_action,
            by_severity,
            unique_users: users.len() as u32,
        }
    }

    fn filter_options(views: &[LogEntryView]) -> FilterOptions {
        let mut actions: Vec<ActivityAction> = vec![];
        let mut modules: Vec<Module> = vec![];
        let mut seen_users: HashSet<&str> = HashSet::new();
        let mut users: Vec<AuditUserOption> = vec![];
        for view in views {
            if !actions.contains(&view.action) {
                actions.push(view.action);
            }
            if let Some(module) = view.module {
                if !modules.contains(&module) {
                    modules.push(module);
                }
            }
            if seen_users.insert(view.user_id.as_str()) {
                users.push(AuditUserOption {
                    id: view.user_id.clone(),
                    display_name: view.display_name.clone(),
                });
            }
        }
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        FilterOptions {
            actions,
            modules,
            users,
        }
    }

    fn empty_page(query: &AuditQuery) -> AuditPage {
        AuditPage {
            logs: vec![],
            total: 0,
            limit: query.limit as u32,
            offset: query.offset as u32,
            stats: AuditSummary {
                by_action: BTreeMap::new(),
                by_severity: BTreeMap::new(),
                unique_users: 0,
            },
            filter_options: FilterOptions {
                actions: vec![],
                modules: vec![],
                users: vec![],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityLogEntry, Role};
    use chrono::Duration;

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@club.test", id),
            display_name: format!("User {}", id),
            role,
            is_active: true,
            phone: None,
            assigned_sports: vec![],
            assigned_squads: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn log(id: &str, user_id: &str, action: ActivityAction, age_hours: i64) -> ActivityLogEntry {
        ActivityLogEntry {
            id: id.to_string(),
            user_id: user_id.to_string(),
            action,
            page: Some("/dashboard".to_string()),
            module: Some(Module::Dashboard),
            target_id: None,
            target_type: None,
            details: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    async fn seeded_db() -> ClubDb {
        let db = ClubDb::new_in_memory();
        db.upsert_user(&user("root", Role::SystemAdmin)).await.unwrap();
        db.upsert_user(&user("coach", Role::SportCoach)).await.unwrap();
        db.upsert_user(&user("athlete", Role::Athlete)).await.unwrap();

        db.insert_activity_log(&log("l1", "coach", ActivityAction::PageView, 1))
            .await
            .unwrap();
        db.insert_activity_log(&log("l2", "coach", ActivityAction::Delete, 2))
            .await
            .unwrap();
        db.insert_activity_log(&log("l3", "athlete", ActivityAction::Login, 3))
            .await
            .unwrap();
        db.insert_activity_log(&log("l4", "root", ActivityAction::UserSwitch, 4))
            .await
            .unwrap();
        db
    }

    fn query_with_limit(limit: usize) -> AuditQuery {
        AuditQuery {
            limit,
            ..AuditQuery::default()
        }
    }

    #[tokio::test]
    async fn test_non_hidden_callers_are_denied() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);

        for role in [Role::SuperAdmin, Role::Admin, Role::SportCoach, Role::Athlete] {
            let caller = ActingIdentity::new(user("caller", role));
            let err = trail.query(&caller, query_with_limit(50)).await;
            assert!(matches!(err, Err(AppError::Forbidden(_))), "role {:?}", role);
        }
    }

    #[tokio::test]
    async fn test_impersonating_system_admin_is_denied() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);

        // While impersonating, the acting principal is the target; the
        // audit gate must not honor the original's privileges.
        let mut caller = ActingIdentity::new(user("root", Role::SystemAdmin));
        caller.switch_to(user("coach", Role::SportCoach)).unwrap();

        let err = trail.query(&caller, query_with_limit(50)).await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_hidden_caller_sees_all_logs_with_summary() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);
        let caller = ActingIdentity::new(user("root", Role::SystemAdmin));

        let page = trail.query(&caller, query_with_limit(50)).await.unwrap();

        assert_eq!(page.total, 4);
        assert_eq!(page.logs.len(), 4);
        assert_eq!(page.stats.unique_users, 3);
        assert_eq!(page.stats.by_severity.get("critical"), Some(&1));
        assert_eq!(page.stats.by_action.get("page_view"), Some(&1));
        assert_eq!(page.filter_options.users.len(), 3);
    }

    #[tokio::test]
    async fn test_severity_filter_applies_after_enrichment() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);
        let caller = ActingIdentity::new(user("root", Role::SystemAdmin));

        let page = trail
            .query(
                &caller,
                AuditQuery {
                    severity: Some(Severity::High),
                    limit: 50,
                    ..AuditQuery::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.logs[0].action, ActivityAction::Delete);
        // Options still describe the unfiltered window.
        assert_eq!(page.filter_options.actions.len(), 4);
    }

    #[tokio::test]
    async fn test_free_text_search_matches_joined_email() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);
        let caller = ActingIdentity::new(user("root", Role::SystemAdmin));

        let page = trail
            .query(
                &caller,
                AuditQuery {
                    search: Some("athlete@club.test".to_string()),
                    limit: 50,
                    ..AuditQuery::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.logs[0].user_id, "athlete");
    }

    #[tokio::test]
    async fn test_pagination_total_reflects_filtered_count() {
        let db = seeded_db().await;
        let trail = AuditTrail::new(db);
        let caller = ActingIdentity::new(user("root", Role::SystemAdmin));

        let page = trail
            .query(
                &caller,
                AuditQuery {
                    limit: 2,
                    offset: 2,
                    ..AuditQuery::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 4);
        assert_eq!(page.logs.len(), 2);
        // Newest first, so the second page holds the two oldest entries.
        assert_eq!(page.logs[0].id, "l3");
        assert_eq!(page.logs[1].id, "l4");
    }

    #[tokio::test]
    async fn test_unprovisioned_store_yields_empty_page() {
        let db = ClubDb::new_in_memory_unprovisioned();
        let trail = AuditTrail::new(db);
        let caller = ActingIdentity::new(user("root", Role::SystemAdmin));

        let page = trail.query(&caller, query_with_limit(50)).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.logs.is_empty());
    }
}
