//! Shift status derivation.
//!
//! One pure function classifies a shift's lifecycle state from its segments
//! and the current HH:MM time. Every caller (dispatcher, batch sweep,
//! reports) goes through this module; no second copy of the priority list
//! exists anywhere.

use crate::model::Segment;
use crate::utils::time::{is_after, is_at_or_after, is_before, parse_time};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shift lifecycle status, ordered by progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// No segments exist yet
    #[serde(rename = "DRAFT")]
    Draft,
    /// Segments exist but the first start time is still in the future
    #[serde(rename = "OFFLINE")]
    Offline,
    /// At least one segment is currently open
    #[serde(rename = "ACTIVE")]
    Active,
    /// All segments closed, now inside a gap or before the last end time
    #[serde(rename = "ON BREAK")]
    OnBreak,
    /// All segments closed and the last end time has passed, or the shift
    /// was explicitly finalized
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl Status {
    /// Wire string, matching the stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "DRAFT",
            Status::Offline => "OFFLINE",
            Status::Active => "ACTIVE",
            Status::OnBreak => "ON BREAK",
            Status::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the canonical status for a shift.
///
/// Priority order, first match wins:
/// 1. no segments -> DRAFT
/// 2. now before the first start -> OFFLINE
/// 3. any open segment -> ACTIVE
/// 4. now strictly inside a gap between closed segments -> ON BREAK
/// 5. now at or past the last end time -> COMPLETED
/// 6. otherwise -> ON BREAK
///
/// Pure and total: malformed time strings make the affected comparison
/// fail closed, they never panic or error.
pub fn derive_status(segments: &[Segment], now: &str) -> Status {
    if segments.is_empty() {
        return Status::Draft;
    }

    if let Some(first) = segments.first() {
        if is_before(now, &first.start_time) {
            return Status::Offline;
        }
    }

    if segments.iter().any(Segment::is_open) {
        return Status::Active;
    }

    if in_gap_between_segments(segments, now) {
        return Status::OnBreak;
    }

    if let Some(last_end) = segments.last().and_then(|s| s.end_time.as_deref()) {
        if is_at_or_after(now, last_end) {
            return Status::Completed;
        }
    }

    // All segments closed but the last end time is still ahead
    Status::OnBreak
}

/// Like [`derive_status`], but falls back to the previously persisted
/// status when `now` itself cannot be interpreted.
pub fn derive_status_or(segments: &[Segment], now: &str, previous: Status) -> Status {
    if parse_time(now).is_none() {
        tracing::warn!("Unparseable reference time '{}', keeping status {}", now, previous);
        return previous;
    }
    derive_status(segments, now)
}

/// Does `now` fall strictly between one closed segment's end and the next
/// segment's start
fn in_gap_between_segments(segments: &[Segment], now: &str) -> bool {
    for pair in segments.windows(2) {
        let (end, next_start) = match (&pair[0].end_time, &pair[1].start_time) {
            (Some(end), start) => (end.as_str(), start.as_str()),
            _ => continue,
        };
        if is_after(now, end) && is_before(now, next_start) {
            return true;
        }
    }
    false
}

/// Outcome of the auto-completion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Leave the stored status as it is
    Unchanged,
    /// An open segment exists but the stored status disagrees
    Reactivate,
    /// Close any open segments and mark the shift completed
    Complete,
}

/// Auto-completion policy, layered on top of the pure engine.
///
/// An ACTIVE shift whose segments are all closed stays ACTIVE for manual
/// completion until `now` is more than `grace_minutes` past the latest end
/// time. Deliberately conservative: the sweep must never complete a shift
/// while the user is mid-break.
pub fn completion_policy(
    current: Status,
    segments: &[Segment],
    now: &str,
    grace_minutes: i64,
) -> PolicyDecision {
    if segments.is_empty() {
        return PolicyDecision::Unchanged;
    }

    let has_open = segments.iter().any(Segment::is_open);

    if has_open {
        if current != Status::Active {
            return PolicyDecision::Reactivate;
        }
        return PolicyDecision::Unchanged;
    }

    if current == Status::Active {
        let latest_end = segments
            .iter()
            .rev()
            .find_map(|s| s.end_time.as_deref());
        if let Some(end) = latest_end {
            if crate::utils::time::is_more_than_minutes_after(now, end, grace_minutes) {
                return PolicyDecision::Complete;
            }
        }
    }

    PolicyDecision::Unchanged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(id: u32, start: &str, end: &str) -> Segment {
        Segment {
            segment_id: id,
            start_time: start.to_string(),
            end_time: Some(end.to_string()),
            duration: Some(crate::utils::time::calculate_duration(start, end)),
        }
    }

    fn open(id: u32, start: &str) -> Segment {
        Segment::open(id, start.to_string())
    }

    #[test]
    fn test_no_segments_is_draft() {
        assert_eq!(derive_status(&[], "00:00"), Status::Draft);
        assert_eq!(derive_status(&[], "12:00"), Status::Draft);
        assert_eq!(derive_status(&[], "garbage"), Status::Draft);
    }

    #[test]
    fn test_before_first_start_is_offline() {
        let segments = vec![open(1, "09:00")];
        assert_eq!(derive_status(&segments, "08:30"), Status::Offline);

        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(derive_status(&segments, "07:00"), Status::Offline);
    }

    #[test]
    fn test_open_segment_is_active() {
        let segments = vec![open(1, "09:00")];
        assert_eq!(derive_status(&segments, "09:00"), Status::Active);
        assert_eq!(derive_status(&segments, "12:30"), Status::Active);
    }

    #[test]
    fn test_open_segment_beats_gap_check() {
        // Second segment is open, so 12:30 is ACTIVE even though it sits in
        // the 12:00-13:00 gap.
        let segments = vec![closed(1, "09:00", "12:00"), open(2, "13:00")];
        assert_eq!(derive_status(&segments, "12:30"), Status::Active);
    }

    #[test]
    fn test_gap_between_closed_segments_is_on_break() {
        let segments = vec![closed(1, "09:00", "12:00"), closed(2, "13:00", "17:00")];
        assert_eq!(derive_status(&segments, "12:30"), Status::OnBreak);
    }

    #[test]
    fn test_past_last_end_is_completed() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(derive_status(&segments, "18:00"), Status::Completed);
        // At the boundary
        assert_eq!(derive_status(&segments, "17:00"), Status::Completed);
    }

    #[test]
    fn test_closed_but_not_past_end_is_on_break() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(derive_status(&segments, "16:00"), Status::OnBreak);
    }

    #[test]
    fn test_night_shift_checked_next_morning_is_completed() {
        // Shift ended 23:30, checked at 06:15 the next morning: rollover
        // puts now a day ahead of the end time.
        let segments = vec![closed(1, "15:00", "23:30")];
        assert_eq!(derive_status(&segments, "06:15"), Status::Completed);
    }

    #[test]
    fn test_malformed_start_time_does_not_panic() {
        let segments = vec![open(1, "abc")];
        // The OFFLINE comparison fails closed, the open segment wins
        assert_eq!(derive_status(&segments, "12:00"), Status::Active);

        let segments = vec![closed(1, "abc", "xyz")];
        assert_eq!(derive_status(&segments, "12:00"), Status::OnBreak);
    }

    #[test]
    fn test_malformed_now_falls_back_to_previous() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(
            derive_status_or(&segments, "not-a-time", Status::Completed),
            Status::Completed
        );
        assert_eq!(
            derive_status_or(&segments, "18:00", Status::Draft),
            Status::Completed
        );
    }

    #[test]
    fn test_engine_is_pure() {
        let segments = vec![closed(1, "09:00", "12:00"), open(2, "13:00")];
        let first = derive_status(&segments, "12:30");
        let second = derive_status(&segments, "12:30");
        assert_eq!(first, second);
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&Status::OnBreak).unwrap(),
            "\"ON BREAK\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"COMPLETED\"").unwrap(),
            Status::Completed
        );
        assert_eq!(Status::Offline.to_string(), "OFFLINE");
    }

    #[test]
    fn test_policy_keeps_active_within_grace() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(
            completion_policy(Status::Active, &segments, "17:30", 60),
            PolicyDecision::Unchanged
        );
        // Exactly at the boundary is still within the grace window
        assert_eq!(
            completion_policy(Status::Active, &segments, "18:00", 60),
            PolicyDecision::Unchanged
        );
    }

    #[test]
    fn test_policy_completes_after_grace() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(
            completion_policy(Status::Active, &segments, "18:01", 60),
            PolicyDecision::Complete
        );
    }

    #[test]
    fn test_policy_reactivates_open_segment() {
        let segments = vec![open(1, "09:00")];
        assert_eq!(
            completion_policy(Status::OnBreak, &segments, "10:00", 60),
            PolicyDecision::Reactivate
        );
        assert_eq!(
            completion_policy(Status::Active, &segments, "10:00", 60),
            PolicyDecision::Unchanged
        );
    }

    #[test]
    fn test_policy_ignores_non_active_closed_shifts() {
        let segments = vec![closed(1, "09:00", "17:00")];
        assert_eq!(
            completion_policy(Status::Completed, &segments, "19:00", 60),
            PolicyDecision::Unchanged
        );
        assert_eq!(
            completion_policy(Status::OnBreak, &segments, "19:00", 60),
            PolicyDecision::Unchanged
        );
        assert_eq!(
            completion_policy(Status::Draft, &[], "19:00", 60),
            PolicyDecision::Unchanged
        );
    }
}
