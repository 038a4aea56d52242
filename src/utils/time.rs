use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse time string in HH:MM format
pub fn parse_time(time_str: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hour = parts[0].trim().parse::<u32>().ok()?;
    let minute = parts[1].trim().parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Convert two HH:MM strings to minutes-since-midnight, applying the
/// day-rollover rule: when `now` is early morning (hour 0-8) and the
/// reference time is afternoon or later (hour >= 15), `now` is taken to
/// belong to the next calendar day. Returns None if either string fails
/// to parse.
pub fn rollover_minutes(now: &str, reference: &str) -> Option<(u32, u32)> {
    let (now_h, now_m) = parse_time(now)?;
    let (ref_h, ref_m) = parse_time(reference)?;

    let mut now_minutes = now_h * 60 + now_m;
    let ref_minutes = ref_h * 60 + ref_m;

    // Night shift checked after midnight: shift ended yesterday evening,
    // we are looking at it the next morning.
    if now_h <= 8 && ref_h >= 15 {
        now_minutes += 24 * 60;
    }

    Some((now_minutes, ref_minutes))
}

/// Is `now` strictly after `reference`, with day rollover
pub fn is_after(now: &str, reference: &str) -> bool {
    match rollover_minutes(now, reference) {
        Some((now_minutes, ref_minutes)) => now_minutes > ref_minutes,
        None => false,
    }
}

/// Is `now` at or after `reference`, with day rollover
pub fn is_at_or_after(now: &str, reference: &str) -> bool {
    match rollover_minutes(now, reference) {
        Some((now_minutes, ref_minutes)) => now_minutes >= ref_minutes,
        None => false,
    }
}

/// Is `now` strictly before `reference`, with day rollover
pub fn is_before(now: &str, reference: &str) -> bool {
    match rollover_minutes(now, reference) {
        Some((now_minutes, ref_minutes)) => now_minutes < ref_minutes,
        None => false,
    }
}

/// Is `now` more than `minutes` past `reference`, with day rollover
pub fn is_more_than_minutes_after(now: &str, reference: &str, minutes: i64) -> bool {
    match rollover_minutes(now, reference) {
        Some((now_minutes, ref_minutes)) => {
            i64::from(now_minutes) - i64::from(ref_minutes) > minutes
        }
        None => false,
    }
}

/// Duration in hours between two HH:MM times, rounded to 2 decimals.
/// A negative span wraps past midnight. Returns 0.0 on parse failure.
pub fn calculate_duration(start: &str, end: &str) -> f64 {
    let (start_t, end_t) = match (parse_time(start), parse_time(end)) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };

    let start_minutes = i64::from(start_t.0 * 60 + start_t.1);
    let end_minutes = i64::from(end_t.0 * 60 + end_t.1);

    let mut diff = end_minutes - start_minutes;
    if diff < 0 {
        diff += 24 * 60;
    }

    round2(diff as f64 / 60.0)
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Resolve a timezone name, falling back to the configured default and
/// finally UTC. Never fails.
fn resolve_tz(timezone: Option<&str>, fallback: &str) -> Tz {
    timezone
        .and_then(|tz| tz.trim().parse::<Tz>().ok())
        .or_else(|| fallback.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::UTC)
}

/// Current time as "HH:MM" in the named timezone
pub fn current_time_in(timezone: Option<&str>, fallback: &str) -> String {
    time_in_at(timezone, fallback, Utc::now())
}

/// Current date as "YYYY-MM-DD" in the named timezone
pub fn current_date_in(timezone: Option<&str>, fallback: &str) -> String {
    date_in_at(timezone, fallback, Utc::now())
}

/// Format a UTC instant as "HH:MM" in the named timezone
pub fn time_in_at(timezone: Option<&str>, fallback: &str, at: DateTime<Utc>) -> String {
    let tz = resolve_tz(timezone, fallback);
    at.with_timezone(&tz).format("%H:%M").to_string()
}

/// Format a UTC instant as "YYYY-MM-DD" in the named timezone
pub fn date_in_at(timezone: Option<&str>, fallback: &str, at: DateTime<Utc>) -> String {
    let tz = resolve_tz(timezone, fallback);
    at.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Convert a stored HH:MM (interpreted in the reference timezone) into the
/// target timezone's HH:MM for display. Returns the input unchanged when
/// parsing fails or no target timezone is given.
pub fn format_for_display(time: &str, timezone: Option<&str>, reference: &str) -> String {
    let target = match timezone {
        Some(tz) => match tz.trim().parse::<Tz>() {
            Ok(parsed) => parsed,
            Err(_) => return time.to_string(),
        },
        None => return time.to_string(),
    };

    let reference_tz = match reference.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => return time.to_string(),
    };

    let (hour, minute) = match parse_time(time) {
        Some(t) => t,
        None => return time.to_string(),
    };

    let today = Utc::now().with_timezone(&reference_tz).date_naive();
    let naive = match today.and_hms_opt(hour, minute, 0) {
        Some(dt) => dt,
        None => return time.to_string(),
    };

    match reference_tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&target).format("%H:%M").to_string(),
        None => time.to_string(),
    }
}

/// Clock abstraction so status derivation can be driven by a fixed "now"
/// in tests. The system clock read is the only source of non-determinism.
pub trait Clock: Send + Sync + 'static {
    /// Current time as "HH:MM" in the named timezone
    fn time_in(&self, timezone: Option<&str>, fallback: &str) -> String;

    /// Current date as "YYYY-MM-DD" in the named timezone
    fn date_in(&self, timezone: Option<&str>, fallback: &str) -> String;

    /// Current instant in UTC
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_in(&self, timezone: Option<&str>, fallback: &str) -> String {
        current_time_in(timezone, fallback)
    }

    fn date_in(&self, timezone: Option<&str>, fallback: &str) -> String {
        current_date_in(timezone, fallback)
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
