use crate::error::{AppResult, Error};
use crate::model::{Shift, Staff};
use crate::status::Status;
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client as RedisClient};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

/// Redis keys for the shift store
mod keys {
    pub const SHIFT_RECORD_PREFIX: &str = "shifts:record:";
    pub const SHIFT_BY_DAY_PREFIX: &str = "shifts:by_day:";
    pub const SHIFT_IDS: &str = "shifts:ids";
    /// 90 days in seconds
    pub const EXPIRY_SECONDS: i64 = 90 * 24 * 60 * 60;
}

/// Filter for shift history queries
#[derive(Debug, Clone, Default)]
pub struct ShiftFilter {
    pub employee_id: Option<String>,
    /// Inclusive start date (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Inclusive end date (YYYY-MM-DD)
    pub end_date: Option<String>,
}

impl ShiftFilter {
    /// Whether a shift passes this filter. YYYY-MM-DD sorts
    /// lexicographically, so plain string comparison covers the range.
    pub fn matches(&self, shift: &Shift) -> bool {
        if let Some(employee_id) = &self.employee_id {
            if shift.employee_id.trim() != employee_id.trim() {
                return false;
            }
        }
        if let Some(start) = &self.start_date {
            if shift.shift_date.as_str() < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end_date {
            if shift.shift_date.as_str() > end.as_str() {
                return false;
            }
        }
        true
    }
}

/// Storage for shift records
#[async_trait]
pub trait ShiftRepository: Send + Sync + 'static {
    /// Find the shift for an employee on a date; the most recently created
    /// record wins if duplicates ever exist
    async fn find_shift(&self, employee_id: &str, shift_date: &str) -> AppResult<Option<Shift>>;

    /// Find a shift by its id
    async fn find_by_id(&self, shift_id: &str) -> AppResult<Option<Shift>>;

    /// List shifts matching the filter, ordered by date then creation time
    async fn list_shifts(&self, filter: &ShiftFilter) -> AppResult<Vec<Shift>>;

    /// Insert a new shift record
    async fn insert_shift(&self, shift: &Shift) -> AppResult<()>;

    /// Overwrite an existing shift record. Segments, caches, duration and
    /// status land in one write; no partial update is observable.
    async fn update_shift(&self, shift: &Shift) -> AppResult<()>;

    /// Persist only a corrected status
    async fn update_status(&self, shift_id: &str, status: Status) -> AppResult<()>;
}

/// Process-wide advisory lock serializing all shift mutations.
///
/// Acquisition blocks the caller up to the configured bound; on timeout the
/// operation fails with [`Error::LockTimeout`] instead of waiting forever.
/// The guard is scoped, so every exit path releases it.
pub struct WriteLock {
    inner: Mutex<()>,
    timeout_secs: u64,
}

impl WriteLock {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            inner: Mutex::new(()),
            timeout_secs,
        }
    }

    /// Acquire the lock or fail after the bounded wait
    pub async fn acquire(&self) -> AppResult<MutexGuard<'_, ()>> {
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), self.inner.lock())
            .await
            .map_err(|_| Error::LockTimeout(self.timeout_secs))
    }
}

/// In-memory repository, used by tests and as fallback when Redis is
/// unreachable
#[derive(Debug, Default)]
pub struct MemoryRepository {
    shifts: RwLock<HashMap<String, Shift>>,
}

#[async_trait]
impl ShiftRepository for MemoryRepository {
    async fn find_shift(&self, employee_id: &str, shift_date: &str) -> AppResult<Option<Shift>> {
        let shifts = self.shifts.read().await;
        let found = shifts
            .values()
            .filter(|s| {
                s.employee_id.trim() == employee_id.trim() && s.shift_date == shift_date
            })
            .max_by_key(|s| s.created_at)
            .cloned();
        Ok(found)
    }

    async fn find_by_id(&self, shift_id: &str) -> AppResult<Option<Shift>> {
        let shifts = self.shifts.read().await;
        Ok(shifts.get(shift_id).cloned())
    }

    async fn list_shifts(&self, filter: &ShiftFilter) -> AppResult<Vec<Shift>> {
        let shifts = self.shifts.read().await;
        let mut matching: Vec<Shift> = shifts
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.shift_date
                .cmp(&b.shift_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(matching)
    }

    async fn insert_shift(&self, shift: &Shift) -> AppResult<()> {
        let mut shifts = self.shifts.write().await;
        shifts.insert(shift.shift_id.clone(), shift.clone());
        Ok(())
    }

    async fn update_shift(&self, shift: &Shift) -> AppResult<()> {
        let mut shifts = self.shifts.write().await;
        shifts.insert(shift.shift_id.clone(), shift.clone());
        Ok(())
    }

    async fn update_status(&self, shift_id: &str, status: Status) -> AppResult<()> {
        let mut shifts = self.shifts.write().await;
        let shift = shifts
            .get_mut(shift_id)
            .ok_or_else(|| Error::NotFound(format!("Shift {} not found", shift_id)))?;
        shift.status = status;
        shift.last_updated = Utc::now();
        Ok(())
    }
}

/// Redis-backed repository
pub struct RedisRepository {
    client: RedisClient,
}

impl RedisRepository {
    /// Create a new Redis repository
    pub fn new(redis_url: &str) -> AppResult<Self> {
        info!("Connecting to Redis at {}", redis_url);
        let client = RedisClient::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get a Redis connection from the client
    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn record_key(shift_id: &str) -> String {
        format!("{}{}", keys::SHIFT_RECORD_PREFIX, shift_id)
    }

    fn day_key(employee_id: &str, shift_date: &str) -> String {
        format!(
            "{}{}:{}",
            keys::SHIFT_BY_DAY_PREFIX,
            employee_id.trim(),
            shift_date
        )
    }

    /// Write the full record plus its lookup keys
    async fn write_shift(&self, shift: &Shift) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(shift)?;

        let record_key = Self::record_key(&shift.shift_id);
        conn.set::<_, _, ()>(&record_key, &json).await?;
        conn.expire::<_, ()>(&record_key, keys::EXPIRY_SECONDS).await?;

        let day_key = Self::day_key(&shift.employee_id, &shift.shift_date);
        conn.set::<_, _, ()>(&day_key, &shift.shift_id).await?;
        conn.expire::<_, ()>(&day_key, keys::EXPIRY_SECONDS).await?;

        conn.sadd::<_, _, ()>(keys::SHIFT_IDS, &shift.shift_id).await?;

        Ok(())
    }
}

#[async_trait]
impl ShiftRepository for RedisRepository {
    async fn find_shift(&self, employee_id: &str, shift_date: &str) -> AppResult<Option<Shift>> {
        let mut conn = self.connection().await?;
        let shift_id: Option<String> = conn.get(Self::day_key(employee_id, shift_date)).await?;
        match shift_id {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, shift_id: &str) -> AppResult<Option<Shift>> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.get(Self::record_key(shift_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list_shifts(&self, filter: &ShiftFilter) -> AppResult<Vec<Shift>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.smembers(keys::SHIFT_IDS).await?;

        let mut matching = Vec::new();
        for id in ids {
            let json: Option<String> = conn.get(Self::record_key(&id)).await?;
            let Some(json) = json else {
                // Record expired but its id lingers in the index
                continue;
            };
            let shift: Shift = serde_json::from_str(&json)?;
            if filter.matches(&shift) {
                matching.push(shift);
            }
        }
        matching.sort_by(|a, b| {
            a.shift_date
                .cmp(&b.shift_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(matching)
    }

    async fn insert_shift(&self, shift: &Shift) -> AppResult<()> {
        self.write_shift(shift).await?;
        info!(
            "Stored shift {} for {} on {}",
            shift.shift_id, shift.employee_id, shift.shift_date
        );
        Ok(())
    }

    async fn update_shift(&self, shift: &Shift) -> AppResult<()> {
        self.write_shift(shift).await
    }

    async fn update_status(&self, shift_id: &str, status: Status) -> AppResult<()> {
        let mut shift = self
            .find_by_id(shift_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Shift {} not found", shift_id)))?;
        shift.status = status;
        shift.last_updated = Utc::now();
        self.write_shift(&shift).await
    }
}

/// Read-only staff directory backing login and the staff list
#[derive(Debug, Clone, Default)]
pub struct StaffDirectory {
    staff: Vec<Staff>,
}

#[derive(Debug, Deserialize)]
struct StaffFile {
    #[serde(default)]
    staff: Vec<Staff>,
}

impl StaffDirectory {
    /// Load the directory from a TOML file. A missing file yields the
    /// built-in sample roster so a fresh install is usable immediately.
    pub fn load(path: &str) -> AppResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let file: StaffFile = toml::from_str(&content)?;
                info!("Loaded {} staff entries from {}", file.staff.len(), path);
                Ok(Self { staff: file.staff })
            }
            Err(_) => {
                warn!("Staff file {} not found, using sample roster", path);
                Ok(Self::sample())
            }
        }
    }

    /// Build a directory from in-memory entries
    pub fn from_staff(staff: Vec<Staff>) -> Self {
        Self { staff }
    }

    fn sample() -> Self {
        let entry = |id: &str, name: &str, email: &str, role: &str, dept: &str| Staff {
            staff_id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            department: dept.to_string(),
            timezone: None,
        };
        Self {
            staff: vec![
                entry("EMP001", "John Doe", "john@company.com", "Staff", "Operations"),
                entry("EMP002", "Jane Smith", "jane@company.com", "Staff", "Sales"),
                entry("ADMIN01", "Admin User", "admin@company.com", "Admin", "Management"),
            ],
        }
    }

    /// All entries
    pub fn all(&self) -> &[Staff] {
        &self.staff
    }

    /// Look up an entry by staff id
    pub fn find(&self, staff_id: &str) -> Option<&Staff> {
        self.staff.iter().find(|s| s.staff_id == staff_id.trim())
    }

    /// Plaintext credential check: case-insensitive name, staff id as the
    /// password. Matches the legacy roster contract; hardening is out of
    /// scope here.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&Staff> {
        let username = username.trim().to_lowercase();
        let password = password.trim();
        self.staff
            .iter()
            .find(|s| s.name.to_lowercase() == username && s.staff_id == password)
    }
}
