use crate::status::Status;
use crate::utils::time::{calculate_duration, is_after, round2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One continuous work period within a shift
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// 1-based sequence number within the shift
    pub segment_id: u32,
    /// Start time (HH:MM)
    pub start_time: String,
    /// End time (HH:MM), None while the segment is open
    pub end_time: Option<String>,
    /// Hours between start and end, None while open
    pub duration: Option<f64>,
}

impl Segment {
    /// Open a new segment at the given time
    pub fn open(segment_id: u32, start_time: String) -> Self {
        Self {
            segment_id,
            start_time,
            end_time: None,
            duration: None,
        }
    }

    /// Whether this segment has no end time yet
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Close the segment and compute its duration
    pub fn close(&mut self, end_time: &str) {
        self.duration = Some(calculate_duration(&self.start_time, end_time));
        self.end_time = Some(end_time.to_string());
    }
}

/// One shift record per employee and calendar date
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// Opaque unique identifier, assigned at creation
    pub shift_id: String,
    pub employee_name: String,
    pub employee_id: String,
    /// Logical day of the shift (YYYY-MM-DD)
    pub shift_date: String,
    /// Free-form label, e.g. "Regular" or "Overtime"
    pub shift_type: String,
    /// Cache of segments[0].startTime
    pub first_start_time: Option<String>,
    /// Cache of the latest known end time
    pub last_end_time: Option<String>,
    /// Sum of closed segment durations, hours
    pub total_duration: f64,
    pub segments: Vec<Segment>,
    /// Derived but also persisted lifecycle status
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Shift {
    /// Create a new shift with no segments
    pub fn new(
        employee_id: String,
        employee_name: String,
        shift_date: String,
        shift_type: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shift_id: format!("SH{}", created_at.timestamp_millis()),
            employee_name,
            employee_id,
            shift_date,
            shift_type,
            first_start_time: None,
            last_end_time: None,
            total_duration: 0.0,
            segments: Vec::new(),
            status: Status::Draft,
            created_at,
            last_updated: created_at,
        }
    }

    /// Whether any segment is still open
    pub fn has_open_segment(&self) -> bool {
        self.segments.iter().any(Segment::is_open)
    }

    /// The open segment, if one exists. At most one can be open.
    pub fn open_segment_mut(&mut self) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.is_open())
    }

    /// Append a new open segment starting at the given time
    pub fn push_segment(&mut self, start_time: String) {
        let segment_id = self.segments.len() as u32 + 1;
        self.segments.push(Segment::open(segment_id, start_time));
    }

    /// Recompute the denormalized caches from the segment list. Must be
    /// called after every segment mutation, before persisting.
    pub fn refresh_caches(&mut self, now_utc: DateTime<Utc>) {
        self.first_start_time = self.segments.first().map(|s| s.start_time.clone());

        let mut last_end: Option<String> = None;
        for segment in &self.segments {
            if let Some(end) = &segment.end_time {
                match &last_end {
                    Some(current) if !is_after(end, current) => {}
                    _ => last_end = Some(end.clone()),
                }
            }
        }
        self.last_end_time = last_end;

        self.total_duration = round2(
            self.segments
                .iter()
                .filter_map(|s| s.duration)
                .sum::<f64>(),
        );
        self.last_updated = now_utc;
    }
}

/// A staff directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub staff_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub department: String,
    /// Preferred timezone, used when a request does not carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

fn default_role() -> String {
    "staff".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_shift() -> Shift {
        Shift::new(
            "EMP001".to_string(),
            "John Doe".to_string(),
            "2023-06-05".to_string(),
            "Regular".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_shift_is_draft() {
        let shift = base_shift();
        assert_eq!(shift.status, Status::Draft);
        assert!(shift.segments.is_empty());
        assert!(shift.shift_id.starts_with("SH"));
    }

    #[test]
    fn test_segment_lifecycle_updates_caches() {
        let mut shift = base_shift();
        shift.push_segment("09:00".to_string());
        shift.refresh_caches(Utc::now());

        assert!(shift.has_open_segment());
        assert_eq!(shift.first_start_time.as_deref(), Some("09:00"));
        assert_eq!(shift.last_end_time, None);
        assert_eq!(shift.total_duration, 0.0);

        shift
            .open_segment_mut()
            .expect("open segment exists")
            .close("12:00");
        shift.refresh_caches(Utc::now());

        assert!(!shift.has_open_segment());
        assert_eq!(shift.last_end_time.as_deref(), Some("12:00"));
        assert_eq!(shift.total_duration, 3.0);

        shift.push_segment("13:00".to_string());
        shift
            .open_segment_mut()
            .expect("second segment open")
            .close("17:30");
        shift.refresh_caches(Utc::now());

        assert_eq!(shift.segments.len(), 2);
        assert_eq!(shift.segments[1].segment_id, 2);
        assert_eq!(shift.last_end_time.as_deref(), Some("17:30"));
        assert_eq!(shift.total_duration, 7.5);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let mut shift = base_shift();
        shift.push_segment("09:00".to_string());
        shift.refresh_caches(Utc::now());

        let json = serde_json::to_value(&shift).unwrap();
        assert!(json.get("shiftId").is_some());
        assert!(json.get("employeeId").is_some());
        assert!(json.get("firstStartTime").is_some());
        assert_eq!(json["segments"][0]["segmentId"], 1);
        assert_eq!(json["segments"][0]["startTime"], "09:00");
    }
}
