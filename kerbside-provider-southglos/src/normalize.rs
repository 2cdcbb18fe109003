//! Reduction of raw service records into a domain [`Snapshot`].

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::Deserialize;

use kerbside_core::model::{CollectionInfo, CollectionKind, LiveStatus, Snapshot};

/// The only state name treated as terminal. While the last collection is
/// dated today, any other state (including e.g. "Cancelled") means the
/// round still counts as being worked and today stays the effective next
/// collection date.
const STATE_CLOSED_COMPLETED: &str = "closed completed";

/// One service record from the collection-details feed.
///
/// Field names mirror the feed verbatim. The feed carries more fields than
/// these; we ignore the rest.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServiceRecord {
    #[serde(default)]
    pub(crate) hso_servicename: Option<String>,
    #[serde(default)]
    pub(crate) hso_nextcollection: Option<String>,
    #[serde(default)]
    pub(crate) hso_lastcollection: Option<String>,
    #[serde(default)]
    pub(crate) hso_lastcollectioncompleted: Option<String>,
    #[serde(default)]
    pub(crate) hso_statename: Option<String>,
    #[serde(default)]
    pub(crate) hso_reason: Option<String>,
    #[serde(default)]
    pub(crate) hso_statesource: Option<String>,
    #[serde(default)]
    pub(crate) hso_scheduledescription: Option<String>,
    #[serde(default)]
    pub(crate) hso_round: Option<String>,
    #[serde(default)]
    pub(crate) hso_roundgroup: Option<String>,
}

/// Build a snapshot from the feed's service records.
///
/// Records whose service name is not one of the four recognised kinds are
/// dropped; the feed lists non-waste services too. Field-level parse
/// problems degrade to `None` and never abort the whole snapshot.
pub(crate) fn snapshot_from_records(
    records: Vec<ServiceRecord>,
    today: NaiveDate,
    fetched_at: DateTime<Local>,
) -> Snapshot {
    let mut collections = HashMap::new();
    let mut live_status = HashMap::new();

    for record in records {
        let ServiceRecord {
            hso_servicename,
            hso_nextcollection,
            hso_lastcollection,
            hso_lastcollectioncompleted,
            hso_statename,
            hso_reason,
            hso_statesource,
            hso_scheduledescription,
            hso_round,
            hso_roundgroup,
        } = record;

        let Some(kind) = hso_servicename
            .as_deref()
            .and_then(CollectionKind::from_service_name)
        else {
            continue;
        };

        let original_next =
            parse_feed_date(kind, "hso_nextcollection", hso_nextcollection.as_deref());
        let last_collection =
            parse_feed_date(kind, "hso_lastcollection", hso_lastcollection.as_deref());
        let last_completed = parse_feed_datetime(
            kind,
            "hso_lastcollectioncompleted",
            hso_lastcollectioncompleted.as_deref(),
        );

        let state_name = hso_statename.filter(|state| !state.trim().is_empty());

        let next_collection = effective_next_collection(
            original_next,
            last_collection,
            state_name.as_deref(),
            today,
        );

        collections.insert(
            kind,
            CollectionInfo {
                next_collection,
                original_next_collection: original_next,
                last_collection,
                last_completed,
                available: true,
                schedule: hso_scheduledescription.unwrap_or_default(),
                round: hso_round.unwrap_or_default(),
                round_group: hso_roundgroup.unwrap_or_default(),
            },
        );

        if let Some(status) = state_name {
            live_status.insert(
                kind,
                LiveStatus {
                    status,
                    reason: hso_reason.filter(|reason| !reason.trim().is_empty()),
                    source: hso_statesource,
                },
            );
        }
    }

    Snapshot {
        collections,
        live_status,
        fetched_at,
    }
}

/// The effective next collection date after the same-day correction.
///
/// The feed flips `hso_nextcollection` to the *following* scheduled date as
/// soon as a collection slot opens, even while the crew is still out. As
/// long as the last collection is dated today and the state has not reached
/// "Closed Completed", today is the date consumers need.
fn effective_next_collection(
    raw_next: Option<NaiveDate>,
    last_collection: Option<NaiveDate>,
    state_name: Option<&str>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let in_progress_today = last_collection == Some(today)
        && state_name.is_some_and(|state| !state.eq_ignore_ascii_case(STATE_CLOSED_COMPLETED));

    if in_progress_today {
        Some(today)
    } else {
        raw_next
    }
}

/// Parse a feed datetime down to its date component.
fn parse_feed_date(kind: CollectionKind, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
    parse_feed_datetime(kind, field, raw).map(|datetime| datetime.date_naive())
}

/// Parse an ISO-8601 / RFC 3339 datetime, e.g. "2025-08-19T07:00:00+01:00".
/// A trailing `Z` is accepted as the UTC offset. Absent fields stay `None`
/// silently; unparseable values are logged and become `None` so a single
/// bad field never sinks the fetch.
fn parse_feed_datetime(
    kind: CollectionKind,
    field: &str,
    raw: Option<&str>,
) -> Option<DateTime<FixedOffset>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            tracing::warn!(%kind, field, raw, %error, "could not parse datetime field");
            None
        }
    }
}
