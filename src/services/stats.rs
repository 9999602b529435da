// SPDX-License-Identifier: MIT

//! Stats aggregator: windowed dashboards derived from raw telemetry.
//!
//! Read-side consumer of the activity logs, stats rows, and page visits.
//! Serves every authenticated principal's personal analytics; hidden-role
//! principals are excluded from all aggregated outputs.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::db::{ClubDb, LogQuery};
use crate::error::Result;
use crate::models::{LogEntryView, Role, Trend, User, UserStats};

/// How many raw entries the recent-activity feed carries.
const RECENT_ACTIVITY_LIMIT: usize = 20;
/// How many pages the usage ranking carries.
const PAGE_USAGE_LIMIT: usize = 10;

/// Aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    All,
}

impl Default for Period {
    fn default() -> Self {
        Period::Week
    }
}

impl Period {
    /// Window start, `None` for the unbounded window.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Today => Some(now.date_naive().and_time(NaiveTime::MIN).and_utc()),
            Period::Week => Some(now - chrono::Duration::days(7)),
            Period::Month => Some(now - chrono::Duration::days(30)),
            Period::All => None,
        }
    }
}

/// Full dashboard payload for one window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DashboardStats {
    pub overall_stats: OverallStats,
    pub user_stats: Vec<PrincipalActivity>,
    pub page_usage: Vec<PageUsage>,
    pub recent_activities: Vec<LogEntryView>,
}

impl DashboardStats {
    fn empty() -> Self {
        Self {
            overall_stats: OverallStats {
                total_users: 0,
                active_users: 0,
                total_actions: 0,
                avg_performance_score: 0,
            },
            user_stats: vec![],
            page_usage: vec![],
            recent_activities: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OverallStats {
    pub total_users: u32,
    /// Principals with at least one logged action inside the window
    pub active_users: u32,
    /// Logged actions inside the window
    pub total_actions: u32,
    pub avg_performance_score: u8,
}

/// One principal's counters plus the derived analytics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PrincipalActivity {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub total_actions: u32,
    pub total_logins: u32,
    pub records_created: u32,
    pub records_updated: u32,
    pub records_deleted: u32,
    pub pages_visited: u32,
    pub total_session_minutes: u32,
    pub avg_session_duration: u32,
    pub login_streak: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub performance_score: u8,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PageUsage {
    pub page: String,
    pub visits: u32,
    /// Share of the window's total visits, one decimal
    pub percentage: f64,
}

/// Derives dashboard analytics from raw telemetry.
#[derive(Clone)]
pub struct StatsAggregator {
    db: ClubDb,
}

impl StatsAggregator {
    pub fn new(db: ClubDb) -> Self {
        Self { db }
    }

    /// Build the dashboard for a window. Store failures degrade to an empty
    /// dashboard; the end user never sees a storage error on this path.
    pub async fn dashboard(&self, period: Period) -> Result<DashboardStats> {
        let now = Utc::now();

        if !self.db.telemetry_enabled() {
            return Ok(DashboardStats::empty());
        }

        let users = match self.db.list_users().await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list users for stats");
                return Ok(DashboardStats::empty());
            }
        };
        let visible: HashMap<String, User> = users
            .into_iter()
            .filter(|u| !u.role.is_hidden())
            .map(|u| (u.id.clone(), u))
            .collect();

        let stats_rows: HashMap<String, UserStats> = match self.db.list_user_stats().await {
            Ok(rows) => rows.into_iter().map(|s| (s.user_id.clone(), s)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list user stats");
                HashMap::new()
            }
        };

        let since = period.since(now);
        let logs = match self
            .db
            .query_activity_logs(&LogQuery {
                start: since,
                ..LogQuery::default()
            })
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query activity logs for stats");
                vec![]
            }
        };

        let visits = match self.db.list_page_visits(since.map(|s| s.date_naive())).await {
            Ok(visits) => visits,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list page visits for stats");
                vec![]
            }
        };

        // Per-principal summaries, best performers first.
        let mut user_stats: Vec<PrincipalActivity> = visible
            .values()
            .map(|user| {
                let stats = stats_rows
                    .get(&user.id)
                    .cloned()
                    .unwrap_or_else(|| UserStats::new(&user.id));
                PrincipalActivity {
                    user_id: user.id.clone(),
                    display_name: user.display_name.clone(),
                    role: user.role,
                    total_actions: stats.total_actions,
                    total_logins: stats.total_logins,
                    records_created: stats.records_created,
                    records_updated: stats.records_updated,
                    records_deleted: stats.records_deleted,
                    pages_visited: stats.pages_visited,
                    total_session_minutes: stats.total_session_minutes,
                    avg_session_duration: stats.avg_session_duration,
                    login_streak: stats.login_streak,
                    last_activity_at: stats.last_activity_at,
                    performance_score: stats.performance_score(now),
                    trend: stats.trend(now),
                }
            })
            .collect();
        user_stats.sort_by(|a, b| {
            b.performance_score
                .cmp(&a.performance_score)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });

        // Page usage ranking within the window.
        let mut by_page: BTreeMap<String, u32> = BTreeMap::new();
        for visit in visits
            .iter()
            .filter(|v| visible.contains_key(&v.user_id))
        {
            *by_page.entry(visit.page.clone()).or_insert(0) += visit.visit_count;
        }
        let total_visits: u32 = by_page.values().sum();
        let mut page_usage: Vec<PageUsage> = by_page
            .into_iter()
            .map(|(page, visits)| PageUsage {
                page,
                visits,
                percentage: if total_visits == 0 {
                    0.0
                } else {
                    (f64::from(visits) * 1000.0 / f64::from(total_visits)).round() / 10.0
                },
            })
            .collect();
        page_usage.sort_by(|a, b| b.visits.cmp(&a.visits).then_with(|| a.page.cmp(&b.page)));
        page_usage.truncate(PAGE_USAGE_LIMIT);

        // Window-scoped feed and overall counters, hidden principals removed.
        let window_logs: Vec<_> = logs
            .into_iter()
            .filter(|entry| visible.contains_key(&entry.user_id))
            .collect();
        let active_users = window_logs
            .iter()
            .map(|entry| entry.user_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u32;
        let total_actions = window_logs.len() as u32;
        let recent_activities: Vec<LogEntryView> = window_logs
            .into_iter()
            .take(RECENT_ACTIVITY_LIMIT)
            .map(|entry| {
                let user = visible.get(&entry.user_id);
                LogEntryView::from_entry(entry, user)
            })
            .collect();

        let avg_performance_score = if user_stats.is_empty() {
            0
        } else {
            let sum: u32 = user_stats.iter().map(|u| u32::from(u.performance_score)).sum();
            (f64::from(sum) / user_stats.len() as f64).round() as u8
        };

        Ok(DashboardStats {
            overall_stats: OverallStats {
                total_users: visible.len() as u32,
                active_users,
                total_actions,
                avg_performance_score,
            },
            user_stats,
            page_usage,
            recent_activities,
        })
    }
}
