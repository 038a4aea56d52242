use crate::config::Config;
use crate::error::{validation_error, AppResult, Error};
use crate::model::{Segment, Shift};
use crate::repo::{ShiftFilter, ShiftRepository, StaffDirectory, WriteLock};
use crate::status::{completion_policy, derive_status, derive_status_or, PolicyDecision, Status};
use crate::utils::time::{format_for_display, is_before, parse_time, Clock};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Action names understood by the dispatcher
pub const SUPPORTED_ACTIONS: &[&str] = &[
    "login",
    "startShift",
    "stopShift",
    "addNewSegment",
    "completeShift",
    "getCurrentShift",
    "getShifts",
    "syncShiftStatus",
    "createCompleteShift",
    "autoUpdateStatuses",
    "getStaffList",
    "testConnection",
];

/// One incoming request. Every action shares this shape; fields the action
/// does not use stay None.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionRequest {
    pub action: String,
    /// Explicit timezone carried by the request
    pub client_timezone: Option<String>,
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    pub shift_date: Option<String>,
    /// Alias used by getCurrentShift
    pub date: Option<String>,
    pub shift_type: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub shift_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub segments: Option<Vec<Segment>>,
    pub last_end_time: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timezone: Option<String>,
}

/// Successful action result, wrapped into the response envelope by the
/// HTTP layer
#[derive(Debug, Clone)]
pub struct Outcome {
    pub message: Option<String>,
    pub data: Option<Value>,
    pub count: Option<usize>,
}

impl Outcome {
    fn data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: Some(message.into()),
            data: Some(data),
            count: None,
        }
    }

    fn listing(data: Value, count: usize) -> Self {
        Self {
            message: None,
            data: Some(data),
            count: Some(count),
        }
    }
}

/// Segment as returned to clients, with display times in the viewer's
/// timezone
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentView {
    segment_id: u32,
    start_time: String,
    end_time: Option<String>,
    duration: Option<f64>,
    start_time_formatted: String,
    end_time_formatted: Option<String>,
}

/// Shift as returned to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShiftView {
    shift_id: String,
    employee_name: String,
    employee_id: String,
    shift_date: String,
    shift_type: String,
    first_start_time: Option<String>,
    first_start_time_formatted: Option<String>,
    last_end_time: Option<String>,
    last_end_time_formatted: Option<String>,
    total_duration: f64,
    number_of_segments: usize,
    segments: Vec<SegmentView>,
    status: Status,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    timezone: String,
}

/// The request dispatcher's core: routes named actions to repository
/// operations and runs the status engine on every read and write.
pub struct ShiftService {
    repo: Arc<dyn ShiftRepository>,
    staff: StaffDirectory,
    clock: Arc<dyn Clock>,
    lock: WriteLock,
    default_timezone: String,
    completion_grace_minutes: i64,
}

impl ShiftService {
    pub fn new(
        repo: Arc<dyn ShiftRepository>,
        staff: StaffDirectory,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            staff,
            clock,
            lock: WriteLock::new(config.lock_timeout_secs),
            default_timezone: config.default_timezone.clone(),
            completion_grace_minutes: config.completion_grace_minutes,
        }
    }

    /// Route an action to its implementation
    pub async fn dispatch(&self, request: &ActionRequest) -> AppResult<Outcome> {
        match request.action.as_str() {
            "login" => self.login(request),
            "startShift" | "addNewSegment" => self.start_shift(request).await,
            "stopShift" => self.stop_shift(request).await,
            "completeShift" => self.complete_shift(request).await,
            "getCurrentShift" => self.get_current_shift(request).await,
            "getShifts" => self.get_shifts(request).await,
            "syncShiftStatus" => self.sync_shift_status(request).await,
            "createCompleteShift" => self.create_complete_shift(request).await,
            "autoUpdateStatuses" => self.auto_update_statuses(request).await,
            "getStaffList" => self.get_staff_list(),
            "testConnection" => Ok(self.test_connection(request)),
            other => Err(validation_error(&format!("Invalid action: {}", other))),
        }
    }

    /// Resolve the timezone for a request: explicit request value, then the
    /// employee's stored preference, then the configured default. Never a
    /// heuristic scan of recent records.
    fn resolve_timezone(&self, request: &ActionRequest) -> String {
        if let Some(tz) = &request.client_timezone {
            if !tz.trim().is_empty() {
                return tz.trim().to_string();
            }
        }
        if let Some(employee_id) = &request.employee_id {
            if let Some(tz) = self.staff.find(employee_id).and_then(|s| s.timezone.clone()) {
                return tz;
            }
        }
        self.default_timezone.clone()
    }

    fn now_in(&self, timezone: &str) -> String {
        self.clock.time_in(Some(timezone), &self.default_timezone)
    }

    fn today_in(&self, timezone: &str) -> String {
        self.clock.date_in(Some(timezone), &self.default_timezone)
    }

    /// Validate a payload HH:MM field
    fn check_time(&self, label: &str, value: &str) -> AppResult<()> {
        if parse_time(value).is_none() {
            return Err(Error::Validation(format!(
                "Invalid {}: expected HH:MM, got '{}'",
                label, value
            )));
        }
        Ok(())
    }

    /// Validate a payload YYYY-MM-DD field
    fn check_date(&self, label: &str, value: &str) -> AppResult<()> {
        if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
            return Err(Error::Validation(format!(
                "Invalid {}: expected YYYY-MM-DD, got '{}'",
                label, value
            )));
        }
        Ok(())
    }

    fn view(&self, shift: &Shift, status: Status, timezone: &str) -> Value {
        let segments = shift
            .segments
            .iter()
            .map(|segment| SegmentView {
                segment_id: segment.segment_id,
                start_time: segment.start_time.clone(),
                end_time: segment.end_time.clone(),
                duration: segment.duration,
                start_time_formatted: format_for_display(
                    &segment.start_time,
                    Some(timezone),
                    &self.default_timezone,
                ),
                end_time_formatted: segment.end_time.as_deref().map(|end| {
                    format_for_display(end, Some(timezone), &self.default_timezone)
                }),
            })
            .collect::<Vec<_>>();

        let view = ShiftView {
            shift_id: shift.shift_id.clone(),
            employee_name: shift.employee_name.clone(),
            employee_id: shift.employee_id.clone(),
            shift_date: shift.shift_date.clone(),
            shift_type: shift.shift_type.clone(),
            first_start_time: shift.first_start_time.clone(),
            first_start_time_formatted: shift.first_start_time.as_deref().map(|t| {
                format_for_display(t, Some(timezone), &self.default_timezone)
            }),
            last_end_time: shift.last_end_time.clone(),
            last_end_time_formatted: shift.last_end_time.as_deref().map(|t| {
                format_for_display(t, Some(timezone), &self.default_timezone)
            }),
            total_duration: shift.total_duration,
            number_of_segments: shift.segments.len(),
            segments,
            status,
            is_active: shift.has_open_segment(),
            created_at: shift.created_at,
            last_updated: shift.last_updated,
            timezone: timezone.to_string(),
        };
        serde_json::to_value(view).unwrap_or(Value::Null)
    }

    /// Persist an engine correction for a stale stored status. Corrections
    /// mutate the record, so they take the write lock like every other
    /// writer; when the lock is busy the correction is skipped and the
    /// response still carries the computed status.
    async fn persist_correction(&self, shift_id: &str, stored: Status, computed: Status) {
        let _guard = match self.lock.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(shift_id = %shift_id, error = %e, "Skipped status correction, store is busy");
                return;
            }
        };
        if let Err(e) = self.repo.update_status(shift_id, computed).await {
            warn!(shift_id = %shift_id, error = %e, "Failed to persist status correction");
        } else {
            info!(shift_id = %shift_id, "Corrected stored status {} to {}", stored, computed);
        }
    }

    /// Clock in: open a new segment, creating the shift row if needed
    async fn start_shift(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let (Some(employee_id), Some(employee_name), Some(shift_date)) = (
            request.employee_id.as_deref(),
            request.employee_name.as_deref(),
            request.shift_date.as_deref(),
        ) else {
            return Err(validation_error(
                "Missing required fields: employeeName, employeeId, shiftDate",
            ));
        };
        let employee_id = employee_id.trim();
        let employee_name = employee_name.trim();
        self.check_date("shiftDate", shift_date)?;

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);
        let start_time = match &request.start_time {
            Some(t) => {
                self.check_time("startTime", t)?;
                t.clone()
            }
            None => now.clone(),
        };

        let _guard = self.lock.acquire().await?;

        match self.repo.find_shift(employee_id, shift_date).await? {
            Some(mut shift) => {
                if shift.status == Status::Completed {
                    return Err(validation_error("Shift already completed for today"));
                }
                if shift.has_open_segment() {
                    let status = derive_status_or(&shift.segments, &now, shift.status);
                    return Ok(Outcome::data(
                        "Your shift is already active",
                        self.view(&shift, status, &timezone),
                    ));
                }

                shift.push_segment(start_time);
                shift.refresh_caches(self.clock.now_utc());
                shift.status = derive_status(&shift.segments, &now);
                self.repo.update_shift(&shift).await?;
                info!(shift_id = %shift.shift_id, "New work segment started");
                let status = shift.status;
                Ok(Outcome::data(
                    "New work segment started",
                    self.view(&shift, status, &timezone),
                ))
            }
            None => {
                let mut shift = Shift::new(
                    employee_id.to_string(),
                    employee_name.to_string(),
                    shift_date.to_string(),
                    request
                        .shift_type
                        .clone()
                        .unwrap_or_else(|| "Regular".to_string()),
                    self.clock.now_utc(),
                );
                shift.push_segment(start_time);
                shift.refresh_caches(self.clock.now_utc());
                shift.status = derive_status(&shift.segments, &now);
                self.repo.insert_shift(&shift).await?;
                info!(shift_id = %shift.shift_id, employee = %shift.employee_id, "New shift started");
                let status = shift.status;
                Ok(Outcome::data(
                    "New shift started successfully",
                    self.view(&shift, status, &timezone),
                ))
            }
        }
    }

    /// Clock out: close the open segment and go on break
    async fn stop_shift(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let (Some(employee_id), Some(shift_date)) = (
            request.employee_id.as_deref(),
            request.shift_date.as_deref(),
        ) else {
            return Err(validation_error(
                "Missing required fields: employeeId, shiftDate",
            ));
        };
        self.check_date("shiftDate", shift_date)?;

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);
        let end_time = match &request.end_time {
            Some(t) => {
                self.check_time("endTime", t)?;
                t.clone()
            }
            None => now.clone(),
        };

        let _guard = self.lock.acquire().await?;

        let mut shift = self
            .repo
            .find_shift(employee_id.trim(), shift_date)
            .await?
            .ok_or_else(|| Error::NotFound("No active shift found to stop".to_string()))?;

        let segment = shift
            .open_segment_mut()
            .ok_or_else(|| validation_error("No active segment found to stop"))?;
        segment.close(&end_time);

        shift.refresh_caches(self.clock.now_utc());
        // Stopping a segment means going on break. The raw engine verdict
        // at this instant is COMPLETED (now is at the last end time), but
        // finalizing is completeShift's or the grace sweep's call.
        let engine = derive_status(&shift.segments, &now);
        shift.status = if engine == Status::Completed {
            Status::OnBreak
        } else {
            engine
        };
        self.repo.update_shift(&shift).await?;
        info!(shift_id = %shift.shift_id, "Segment stopped");

        let status = shift.status;
        Ok(Outcome::data(
            "Segment stopped successfully",
            self.view(&shift, status, &timezone),
        ))
    }

    /// Explicitly finalize the day's shift
    async fn complete_shift(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let (Some(employee_id), Some(shift_date)) = (
            request.employee_id.as_deref(),
            request.shift_date.as_deref(),
        ) else {
            return Err(validation_error(
                "Missing required fields: employeeId, shiftDate",
            ));
        };
        self.check_date("shiftDate", shift_date)?;

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);

        let _guard = self.lock.acquire().await?;

        let mut shift = self
            .repo
            .find_shift(employee_id.trim(), shift_date)
            .await?
            .ok_or_else(|| {
                Error::NotFound("No shift found for today to complete".to_string())
            })?;

        if let Some(segment) = shift.open_segment_mut() {
            segment.close(&now);
        }
        shift.refresh_caches(self.clock.now_utc());
        shift.status = Status::Completed;
        self.repo.update_shift(&shift).await?;
        info!(shift_id = %shift.shift_id, "Shift completed");

        Ok(Outcome::data(
            "Shift completed successfully",
            json!({
                "shiftId": shift.shift_id,
                "totalHours": shift.total_duration,
            }),
        ))
    }

    /// Today's shift for one employee, with the engine-computed status
    async fn get_current_shift(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let Some(employee_id) = request.employee_id.as_deref() else {
            return Err(validation_error("Missing required field: employeeId"));
        };

        let timezone = self.resolve_timezone(request);
        let date = request
            .date
            .clone()
            .or_else(|| request.shift_date.clone())
            .unwrap_or_else(|| self.today_in(&timezone));
        self.check_date("date", &date)?;

        let Some(shift) = self.repo.find_shift(employee_id.trim(), &date).await? else {
            return Ok(Outcome {
                message: Some("No shift found for this employee today".to_string()),
                data: Some(Value::Null),
                count: None,
            });
        };

        let now = self.now_in(&timezone);
        let computed = derive_status_or(&shift.segments, &now, shift.status);
        if computed != shift.status {
            // Report the engine's answer either way; persisting the
            // correction is best effort.
            self.persist_correction(&shift.shift_id, shift.status, computed)
                .await;
        }

        Ok(Outcome {
            message: None,
            data: Some(self.view(&shift, computed, &timezone)),
            count: None,
        })
    }

    /// Shift history with per-row engine-computed statuses
    async fn get_shifts(&self, request: &ActionRequest) -> AppResult<Outcome> {
        if let Some(start) = request.start_date.as_deref() {
            self.check_date("startDate", start)?;
        }
        if let Some(end) = request.end_date.as_deref() {
            self.check_date("endDate", end)?;
        }

        let filter = ShiftFilter {
            employee_id: request.employee_id.clone(),
            start_date: request.start_date.clone(),
            end_date: request.end_date.clone(),
        };

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);
        let shifts = self.repo.list_shifts(&filter).await?;

        let mut views = Vec::with_capacity(shifts.len());
        for shift in &shifts {
            let computed = derive_status_or(&shift.segments, &now, shift.status);
            if computed != shift.status {
                self.persist_correction(&shift.shift_id, shift.status, computed)
                    .await;
            }
            views.push(self.view(shift, computed, &timezone));
        }

        let count = views.len();
        Ok(Outcome::listing(Value::Array(views), count))
    }

    /// Recompute and persist one shift's status by id
    async fn sync_shift_status(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let Some(shift_id) = request.shift_id.as_deref() else {
            return Err(validation_error("Missing required field: shiftId"));
        };

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);

        let _guard = self.lock.acquire().await?;

        let mut shift = self
            .repo
            .find_by_id(shift_id)
            .await?
            .ok_or_else(|| Error::NotFound("Shift not found".to_string()))?;

        let stored = shift.status;
        let mut new_status = derive_status_or(&shift.segments, &now, stored);

        // ACTIVE shifts are not auto-completed by the engine's verdict
        // alone; the grace policy decides.
        if stored == Status::Active && new_status == Status::Completed {
            match completion_policy(stored, &shift.segments, &now, self.completion_grace_minutes)
            {
                PolicyDecision::Complete => {}
                _ => new_status = Status::Active,
            }
        }

        if new_status == stored {
            return Ok(Outcome::data(
                "Status is already correct",
                json!({ "shiftId": shift.shift_id, "status": stored }),
            ));
        }

        if new_status == Status::Completed {
            if let Some(segment) = shift.open_segment_mut() {
                segment.close(&now);
            }
        }
        shift.refresh_caches(self.clock.now_utc());
        shift.status = new_status;
        self.repo.update_shift(&shift).await?;
        info!(shift_id = %shift.shift_id, "Status updated from {} to {}", stored, new_status);

        Ok(Outcome::data(
            format!("Status updated from {} to {}", stored, new_status),
            json!({
                "shiftId": shift.shift_id,
                "oldStatus": stored,
                "newStatus": new_status,
                "updatedAt": shift.last_updated,
            }),
        ))
    }

    /// Full-shift upsert from the schedule editor. Status is always
    /// engine-derived; the client cannot submit one.
    async fn create_complete_shift(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let (Some(employee_id), Some(employee_name), Some(shift_date), Some(submitted)) = (
            request.employee_id.as_deref(),
            request.employee_name.as_deref(),
            request.shift_date.as_deref(),
            request.segments.as_ref(),
        ) else {
            return Err(validation_error(
                "Missing required fields: employeeName, employeeId, shiftDate, segments",
            ));
        };
        self.check_date("shiftDate", shift_date)?;

        // Renumber and recompute durations; client-supplied numbers are not
        // trusted.
        let mut segments = Vec::with_capacity(submitted.len());
        let mut open_count = 0;
        for (index, submitted_segment) in submitted.iter().enumerate() {
            self.check_time("segment startTime", &submitted_segment.start_time)?;
            let mut segment =
                Segment::open(index as u32 + 1, submitted_segment.start_time.clone());
            if let Some(end) = submitted_segment.end_time.as_deref() {
                self.check_time("segment endTime", end)?;
                segment.close(end);
            } else {
                open_count += 1;
            }
            segments.push(segment);
        }
        if open_count > 1 {
            return Err(validation_error(
                "At most one segment may be open at a time",
            ));
        }

        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);

        // A submission where every segment is closed but the declared end
        // is still ahead of the clock means the client sent stale segment
        // state. Surface it instead of silently rewriting the status.
        if open_count == 0 {
            let declared_end = request
                .last_end_time
                .clone()
                .or_else(|| segments.iter().rev().find_map(|s| s.end_time.clone()));
            if let Some(end) = declared_end {
                if is_before(&now, &end) {
                    return Err(Error::Validation(format!(
                        "All segments are closed but the end time {} is still in the future; \
                         submit the segment as open instead",
                        end
                    )));
                }
            }
        }

        let status = derive_status(&segments, &now);

        let _guard = self.lock.acquire().await?;

        let (mut shift, created) = match self
            .repo
            .find_shift(employee_id.trim(), shift_date)
            .await?
        {
            Some(existing) => (existing, false),
            None => (
                Shift::new(
                    employee_id.trim().to_string(),
                    employee_name.trim().to_string(),
                    shift_date.to_string(),
                    "Regular".to_string(),
                    self.clock.now_utc(),
                ),
                true,
            ),
        };

        if let Some(shift_type) = &request.shift_type {
            shift.shift_type = shift_type.clone();
        }
        shift.segments = segments;
        shift.refresh_caches(self.clock.now_utc());
        shift.status = status;

        if created {
            self.repo.insert_shift(&shift).await?;
        } else {
            self.repo.update_shift(&shift).await?;
        }
        info!(
            shift_id = %shift.shift_id,
            created, "Complete shift saved with status {}", status
        );

        Ok(Outcome::data(
            if created {
                "New shift created successfully"
            } else {
                "Shift updated successfully"
            },
            self.view(&shift, status, &timezone),
        ))
    }

    /// Batch sweep applying the completion policy to today's shifts
    async fn auto_update_statuses(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let timezone = self.resolve_timezone(request);
        let now = self.now_in(&timezone);
        let today = self.today_in(&timezone);

        let _guard = self.lock.acquire().await?;

        let filter = ShiftFilter {
            employee_id: None,
            start_date: Some(today.clone()),
            end_date: Some(today),
        };
        let shifts = self.repo.list_shifts(&filter).await?;

        let processed = shifts.len();
        let mut updated = 0;
        let mut completed = 0;

        for mut shift in shifts {
            if shift.status == Status::Completed {
                continue;
            }
            match completion_policy(
                shift.status,
                &shift.segments,
                &now,
                self.completion_grace_minutes,
            ) {
                PolicyDecision::Unchanged => {}
                PolicyDecision::Reactivate => {
                    shift.status = Status::Active;
                    shift.last_updated = self.clock.now_utc();
                    self.repo.update_shift(&shift).await?;
                    updated += 1;
                }
                PolicyDecision::Complete => {
                    if let Some(segment) = shift.open_segment_mut() {
                        segment.close(&now);
                    }
                    shift.refresh_caches(self.clock.now_utc());
                    shift.status = Status::Completed;
                    self.repo.update_shift(&shift).await?;
                    info!(shift_id = %shift.shift_id, "Auto-completed past the grace period");
                    updated += 1;
                    completed += 1;
                }
            }
        }

        Ok(Outcome::data(
            "Auto update complete",
            json!({
                "processed": processed,
                "updated": updated,
                "completed": completed,
                "timestamp": self.clock.now_utc(),
            }),
        ))
    }

    /// Plaintext roster lookup; hardening is out of scope
    fn login(&self, request: &ActionRequest) -> AppResult<Outcome> {
        let (Some(username), Some(password)) = (
            request.username.as_deref(),
            request.password.as_deref(),
        ) else {
            return Err(validation_error("Username and password are required."));
        };
        let Some(timezone) = request.timezone.as_deref().filter(|t| !t.trim().is_empty())
        else {
            return Err(validation_error("Please select your timezone."));
        };

        let staff = self
            .staff
            .authenticate(username, password)
            .ok_or_else(|| validation_error("Invalid username or password."))?;

        info!(user = %staff.staff_id, "Authentication successful");

        Ok(Outcome::data(
            "Authentication successful",
            json!({
                "id": staff.staff_id,
                "name": staff.name,
                "email": staff.email,
                "role": staff.role.to_lowercase(),
                "department": staff.department,
                "timezone": timezone,
                "serverInfo": {
                    "serverTimezone": self.default_timezone,
                    "userTimezone": timezone,
                    "currentServerTime": self.now_in(&self.default_timezone),
                    "currentUserTime": self.now_in(timezone),
                },
            }),
        ))
    }

    /// Staff directory dump
    fn get_staff_list(&self) -> AppResult<Outcome> {
        let staff = self.staff.all();
        let data = serde_json::to_value(staff)?;
        Ok(Outcome::listing(data, staff.len()))
    }

    /// Connection probe with the supported action list
    fn test_connection(&self, request: &ActionRequest) -> Outcome {
        Outcome::data(
            "Connection successful",
            json!({
                "serverTime": self.clock.now_utc(),
                "clientTimezone": request
                    .client_timezone
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                "actions": SUPPORTED_ACTIONS,
            }),
        )
    }
}
