// SPDX-License-Identifier: MIT

//! Sport/squad visibility filter.
//!
//! The authorization boundary for every domain list in the system. Evaluated
//! per request against the current acting principal; never cache the result
//! across principal switches.

use crate::models::User;

/// Token inside an assignment set that means "no restriction".
pub const UNRESTRICTED_TAG: &str = "all";

/// A domain record carrying sport/squad scope tags.
pub trait ScopedRecord {
    fn sport(&self) -> &str;
    fn squad(&self) -> Option<&str>;
}

/// Whether a principal may see a single record.
///
/// Full-access roles see everything. Otherwise both clauses must hold: the
/// record's sport is within the principal's assigned sports (empty or "all"
/// = unrestricted), and its squad, when present, is within the assigned
/// squads under the same convention.
pub fn can_access(principal: &User, record: &impl ScopedRecord) -> bool {
    if principal.role.has_full_access() {
        return true;
    }

    let sport_ok = unrestricted(&principal.assigned_sports)
        || principal
            .assigned_sports
            .iter()
            .any(|s| s == record.sport());

    let squad_ok = unrestricted(&principal.assigned_squads)
        || record
            .squad()
            .is_none_or(|squad| principal.assigned_squads.iter().any(|s| s == squad));

    sport_ok && squad_ok
}

/// The subset of `records` visible to `principal`.
pub fn filter_visible<R: ScopedRecord>(principal: &User, records: Vec<R>) -> Vec<R> {
    records
        .into_iter()
        .filter(|record| can_access(principal, record))
        .collect()
}

fn unrestricted(assigned: &[String]) -> bool {
    assigned.is_empty() || assigned.iter().any(|s| s == UNRESTRICTED_TAG)
}
