//! Domain data structures for addresses, collection schedules, and snapshots.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Waste collection services recognised for a household.
///
/// The remote service reports other, non-waste services too; anything that
/// does not map onto one of these four is dropped during normalisation.
pub enum CollectionKind {
    /// General household waste bin.
    Refuse,
    /// Dry recycling boxes.
    Recycling,
    /// Food caddy.
    Food,
    /// Garden waste (opt-in service, not every household has one).
    Garden,
}

impl CollectionKind {
    /// All recognised kinds, in display order.
    pub const ALL: [CollectionKind; 4] = [
        CollectionKind::Refuse,
        CollectionKind::Recycling,
        CollectionKind::Food,
        CollectionKind::Garden,
    ];

    /// Map a raw service name from the remote feed onto a kind.
    ///
    /// Matching is case-insensitive. Returns `None` for any service the
    /// integration does not track.
    #[must_use]
    pub fn from_service_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| trimmed.eq_ignore_ascii_case(kind.as_str()))
    }

    /// Canonical lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Refuse => "refuse",
            CollectionKind::Recycling => "recycling",
            CollectionKind::Food => "food",
            CollectionKind::Garden => "garden",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Unique property reference number used by the council's waste service.
pub struct Uprn(pub String);

impl fmt::Display for Uprn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Candidate address returned by the postcode lookup.
pub struct Address {
    /// Identifier used when requesting collection details.
    pub uprn: Uprn,
    /// Human-friendly label, non-empty address parts joined with ", ".
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-kind schedule information from one fetch.
pub struct CollectionInfo {
    /// Effective next collection date, after the same-day in-progress
    /// correction. Equals [`Self::original_next_collection`] on normal days.
    pub next_collection: Option<NaiveDate>,
    /// Next collection date exactly as reported by the remote service.
    pub original_next_collection: Option<NaiveDate>,
    /// Date of the most recent collection.
    pub last_collection: Option<NaiveDate>,
    /// Full timestamp of the last completed collection.
    pub last_completed: Option<DateTime<FixedOffset>>,
    /// Whether this kind applies to the household at all.
    pub available: bool,
    /// Schedule description, passed through verbatim.
    pub schedule: String,
    /// Collection round, passed through verbatim.
    pub round: String,
    /// Round group, passed through verbatim.
    pub round_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Live crew status for a kind, present only while the remote record
/// carries a state name (typically on and around collection days).
pub struct LiveStatus {
    /// Raw state name, e.g. "In Progress" or "Closed Completed".
    pub status: String,
    /// Optional explanatory text, e.g. why a round was suspended.
    pub reason: Option<String>,
    /// Optional provenance tag for the state.
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Immutable result of one successful fetch cycle.
///
/// A snapshot is replaced wholesale by the next fetch, never merged into.
pub struct Snapshot {
    /// Schedule information per recognised kind present in the response.
    pub collections: HashMap<CollectionKind, CollectionInfo>,
    /// Live status per kind, for kinds whose record carried a state name.
    pub live_status: HashMap<CollectionKind, LiveStatus>,
    /// Local time the snapshot was produced.
    pub fetched_at: DateTime<Local>,
}

impl Snapshot {
    /// Schedule info for a kind, if the household has that service.
    #[must_use]
    pub fn collection(&self, kind: CollectionKind) -> Option<&CollectionInfo> {
        self.collections.get(&kind)
    }

    /// Live status entry for a kind, if one was reported.
    #[must_use]
    pub fn live_status(&self, kind: CollectionKind) -> Option<&LiveStatus> {
        self.live_status.get(&kind)
    }

    /// Whether any kind's effective next collection falls on `date`.
    ///
    /// This is the condition that switches the coordinator onto its fast
    /// polling cadence.
    #[must_use]
    pub fn has_collection_on(&self, date: NaiveDate) -> bool {
        self.collections
            .values()
            .any(|info| info.next_collection == Some(date))
    }

    /// Whether `today` is a collection day for `kind`, or for any kind
    /// when `kind` is `None`.
    ///
    /// A day counts when the next collection is due today, or when the last
    /// collection happened today and a crew status is still being reported
    /// for it.
    #[must_use]
    pub fn is_collection_day(&self, kind: Option<CollectionKind>, today: NaiveDate) -> bool {
        match kind {
            Some(kind) => self
                .collection(kind)
                .is_some_and(|info| self.kind_collects_on(kind, info, today)),
            None => self
                .collections
                .iter()
                .any(|(&kind, info)| self.kind_collects_on(kind, info, today)),
        }
    }

    fn kind_collects_on(&self, kind: CollectionKind, info: &CollectionInfo, day: NaiveDate) -> bool {
        info.next_collection == Some(day)
            || (info.last_collection == Some(day) && self.live_status.contains_key(&kind))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;

    fn info(next: Option<NaiveDate>, last: Option<NaiveDate>) -> CollectionInfo {
        CollectionInfo {
            next_collection: next,
            original_next_collection: next,
            last_collection: last,
            last_completed: None,
            available: true,
            schedule: String::new(),
            round: String::new(),
            round_group: String::new(),
        }
    }

    fn snapshot_with(entries: Vec<(CollectionKind, CollectionInfo)>) -> Snapshot {
        Snapshot {
            collections: entries.into_iter().collect(),
            live_status: HashMap::new(),
            fetched_at: Local::now(),
        }
    }

    #[test]
    fn service_names_match_case_insensitively() {
        assert_eq!(
            CollectionKind::from_service_name("Refuse"),
            Some(CollectionKind::Refuse)
        );
        assert_eq!(
            CollectionKind::from_service_name("GARDEN"),
            Some(CollectionKind::Garden)
        );
        assert_eq!(CollectionKind::from_service_name("Street Sweeping"), None);
        assert_eq!(CollectionKind::from_service_name(""), None);
    }

    #[test]
    fn next_collection_today_is_a_collection_day() {
        let today = Local::now().date_naive();
        let snapshot = snapshot_with(vec![(CollectionKind::Refuse, info(Some(today), None))]);

        assert!(snapshot.is_collection_day(Some(CollectionKind::Refuse), today));
        assert!(snapshot.is_collection_day(None, today));
        assert!(!snapshot.is_collection_day(Some(CollectionKind::Food), today));
        assert!(snapshot.has_collection_on(today));
    }

    #[test]
    fn last_collection_today_counts_only_with_live_status() {
        let today = Local::now().date_naive();
        let tomorrow = today.succ_opt().expect("tomorrow exists");
        let mut snapshot = snapshot_with(vec![(
            CollectionKind::Recycling,
            info(Some(tomorrow), Some(today)),
        )]);

        assert!(!snapshot.is_collection_day(Some(CollectionKind::Recycling), today));

        snapshot.live_status.insert(
            CollectionKind::Recycling,
            LiveStatus {
                status: "In Progress".to_owned(),
                reason: None,
                source: None,
            },
        );
        assert!(snapshot.is_collection_day(Some(CollectionKind::Recycling), today));
        // The fast-cadence trigger looks at next_collection only.
        assert!(!snapshot.has_collection_on(today));
    }
}
