//! Per-principal usage aggregates and the analytics derived from them.
//!
//! One `UserStats` row per principal, upserted as activity events arrive.
//! The derived values (performance score, trend) are pure functions of the
//! row so the dashboard can compute them without extra reads.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::ActivityAction;

/// Cumulative usage counters for a principal.
///
/// Every counter is monotonically non-decreasing except `login_streak`,
/// which resets to 1 after a missed day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    /// Principal id (also used as document ID)
    pub user_id: String,
    #[serde(default)]
    pub total_actions: u32,
    #[serde(default)]
    pub total_logins: u32,
    #[serde(default)]
    pub records_created: u32,
    #[serde(default)]
    pub records_updated: u32,
    #[serde(default)]
    pub records_deleted: u32,
    #[serde(default)]
    pub pages_visited: u32,
    #[serde(default)]
    pub total_session_minutes: u32,
    /// `round(total_session_minutes / max(total_logins, 1))`, recomputed at
    /// session close
    #[serde(default)]
    pub avg_session_duration: u32,
    /// Consecutive calendar days with at least one session start
    #[serde(default)]
    pub login_streak: u32,
    #[serde(default)]
    pub last_login_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Activity trend over the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl UserStats {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_actions: 0,
            total_logins: 0,
            records_created: 0,
            records_updated: 0,
            records_deleted: 0,
            pages_visited: 0,
            total_session_minutes: 0,
            avg_session_duration: 0,
            login_streak: 0,
            last_login_date: None,
            last_activity_at: None,
            updated_at: None,
        }
    }

    /// Count a recorded activity event.
    pub fn record_action(&mut self, action: ActivityAction, now: DateTime<Utc>) {
        self.total_actions += 1;
        match action {
            ActivityAction::Create => self.records_created += 1,
            ActivityAction::Update => self.records_updated += 1,
            ActivityAction::Delete => self.records_deleted += 1,
            ActivityAction::PageView => self.pages_visited += 1,
            _ => {}
        }
        self.last_activity_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Count a session start and maintain the login streak: +1 when the
    /// previous login was yesterday, unchanged when it was today, otherwise
    /// reset to 1.
    pub fn record_login(&mut self, today: NaiveDate) {
        match self.last_login_date {
            Some(prev) if prev == today => {}
            Some(prev) if prev.succ_opt() == Some(today) => self.login_streak += 1,
            _ => self.login_streak = 1,
        }
        self.total_logins += 1;
        self.last_login_date = Some(today);
    }

    /// Fold a closed session's duration into the totals.
    pub fn record_session_end(&mut self, duration_minutes: u32) {
        self.total_session_minutes += duration_minutes;
        self.avg_session_duration = (f64::from(self.total_session_minutes)
            / f64::from(self.total_logins.max(1)))
        .round() as u32;
    }

    /// Engagement score in [0, 100]: login consistency + action volume +
    /// record authoring, plus a recency bonus.
    pub fn performance_score(&self, now: DateTime<Utc>) -> u8 {
        let streak = (f64::from(self.login_streak) * 2.0).min(30.0);
        let actions = (f64::from(self.total_actions) * 0.3).min(30.0);
        let authored =
            (f64::from(self.records_created + self.records_updated) * 0.5).min(25.0);
        let recency = match self.age_of_last_activity(now) {
            Some(age) if age < Duration::days(1) => 15.0,
            Some(age) if age < Duration::days(3) => 10.0,
            Some(age) if age < Duration::days(7) => 5.0,
            _ => 0.0,
        };
        (streak + actions + authored + recency).min(100.0).round() as u8
    }

    /// `Up` on fresh activity with a healthy streak, `Down` on silence or a
    /// broken streak, `Stable` otherwise.
    pub fn trend(&self, now: DateTime<Utc>) -> Trend {
        let Some(age) = self.age_of_last_activity(now) else {
            return Trend::Down;
        };
        if age < Duration::days(1) && self.login_streak > 3 {
            Trend::Up
        } else if age > Duration::days(7) || self.login_streak == 0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }

    fn age_of_last_activity(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_activity_at
            .map(|last| now.signed_duration_since(last))
    }
}

/// One row per principal, page, and UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub user_id: String,
    pub page: String,
    pub visit_date: NaiveDate,
    pub visit_count: u32,
    pub last_visit_at: DateTime<Utc>,
}

impl PageVisit {
    /// Composite document ID; the page path is percent-encoded so it stays a
    /// single id segment.
    pub fn doc_id(user_id: &str, page: &str, date: NaiveDate) -> String {
        format!("{}_{}_{}", user_id, urlencoding::encode(page), date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_login_streak_continues_from_yesterday() {
        let mut stats = UserStats::new("u1");
        stats.last_login_date = Some(date("2025-01-19"));
        stats.login_streak = 4;

        stats.record_login(date("2025-01-20"));

        assert_eq!(stats.login_streak, 5);
        assert_eq!(stats.total_logins, 1);
        assert_eq!(stats.last_login_date, Some(date("2025-01-20")));
    }

    #[test]
    fn test_login_streak_unchanged_same_day() {
        let mut stats = UserStats::new("u1");
        stats.last_login_date = Some(date("2025-01-20"));
        stats.login_streak = 4;

        stats.record_login(date("2025-01-20"));

        assert_eq!(stats.login_streak, 4);
        assert_eq!(stats.total_logins, 1);
    }

    #[test]
    fn test_login_streak_resets_after_gap() {
        let mut stats = UserStats::new("u1");
        stats.last_login_date = Some(date("2025-01-15"));
        stats.login_streak = 9;

        stats.record_login(date("2025-01-20"));

        assert_eq!(stats.login_streak, 1);
    }

    #[test]
    fn test_first_login_starts_streak() {
        let mut stats = UserStats::new("u1");
        stats.record_login(date("2025-01-20"));
        assert_eq!(stats.login_streak, 1);
        assert_eq!(stats.total_logins, 1);
    }

    #[test]
    fn test_record_action_counters() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        let mut stats = UserStats::new("u1");

        stats.record_action(ActivityAction::Create, now);
        stats.record_action(ActivityAction::PageView, now);
        stats.record_action(ActivityAction::Login, now);

        assert_eq!(stats.total_actions, 3);
        assert_eq!(stats.records_created, 1);
        assert_eq!(stats.pages_visited, 1);
        assert_eq!(stats.records_updated, 0);
        assert_eq!(stats.last_activity_at, Some(now));
    }

    #[test]
    fn test_avg_session_duration() {
        let mut stats = UserStats::new("u1");
        stats.total_logins = 3;
        stats.record_session_end(10);
        stats.record_session_end(25);

        assert_eq!(stats.total_session_minutes, 35);
        // round(35 / 3) = 12
        assert_eq!(stats.avg_session_duration, 12);
    }

    #[test]
    fn test_avg_session_duration_no_logins() {
        let mut stats = UserStats::new("u1");
        stats.record_session_end(7);
        assert_eq!(stats.avg_session_duration, 7);
    }

    #[test]
    fn test_performance_score_clamped_at_100() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        let mut stats = UserStats::new("u1");
        stats.login_streak = 50;
        stats.total_actions = 1000;
        stats.records_created = 500;
        stats.records_updated = 500;
        stats.last_activity_at = Some(now);

        assert_eq!(stats.performance_score(now), 100);
    }

    #[test]
    fn test_performance_score_zero_for_empty_stats() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        assert_eq!(UserStats::new("u1").performance_score(now), 0);
    }

    #[test]
    fn test_performance_score_recency_tiers() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        let mut stats = UserStats::new("u1");

        stats.last_activity_at = Some(now - Duration::hours(2));
        assert_eq!(stats.performance_score(now), 15);

        stats.last_activity_at = Some(now - Duration::days(2));
        assert_eq!(stats.performance_score(now), 10);

        stats.last_activity_at = Some(now - Duration::days(5));
        assert_eq!(stats.performance_score(now), 5);

        stats.last_activity_at = Some(now - Duration::days(30));
        assert_eq!(stats.performance_score(now), 0);
    }

    #[test]
    fn test_trend_up_down_stable() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap();
        let mut stats = UserStats::new("u1");

        // No recorded activity at all.
        assert_eq!(stats.trend(now), Trend::Down);

        stats.last_activity_at = Some(now - Duration::hours(3));
        stats.login_streak = 5;
        assert_eq!(stats.trend(now), Trend::Up);

        // Fresh activity but a short streak is merely stable.
        stats.login_streak = 2;
        assert_eq!(stats.trend(now), Trend::Stable);

        stats.login_streak = 0;
        assert_eq!(stats.trend(now), Trend::Down);

        stats.login_streak = 5;
        stats.last_activity_at = Some(now - Duration::days(10));
        assert_eq!(stats.trend(now), Trend::Down);

        stats.last_activity_at = Some(now - Duration::days(4));
        assert_eq!(stats.trend(now), Trend::Stable);
    }

    #[test]
    fn test_page_visit_doc_id_encodes_page() {
        let id = PageVisit::doc_id("u1", "/athletes/42", date("2025-01-20"));
        assert_eq!(id, "u1_%2Fathletes%2F42_2025-01-20");
    }
}
