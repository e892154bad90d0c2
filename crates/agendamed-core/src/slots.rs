//! Slot calendar: the fixed daily time-slot grid and all zone-aware
//! date math. Every persisted appointment or blocked-date instant passes
//! through here, so day-boundary comparisons agree across components.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, Result};

/// The canonical bookable times, 30-minute cadence, lunch break
/// (12:00–13:30) excluded.
pub const DAILY_SLOTS: [&str; 13] = [
    "09:00", "09:30", "10:00", "10:30", "11:00", "11:30", "13:30", "14:00", "14:30", "15:00",
    "15:30", "16:00", "16:30",
];

/// Ordered daily slot grid.
pub fn daily_slots() -> impl Iterator<Item = &'static str> {
    DAILY_SLOTS.iter().copied()
}

/// True if `time` is one of the canonical slots.
pub fn is_valid_slot(time: &str) -> bool {
    DAILY_SLOTS.contains(&time)
}

/// Zone-aware calendar over the clinic's fixed named time zone.
///
/// Cheap to copy; construct once from configuration and share.
#[derive(Debug, Clone, Copy)]
pub struct SlotCalendar {
    tz: Tz,
}

impl SlotCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse the zone name from configuration ("America/Sao_Paulo").
    pub fn from_zone_name(name: &str) -> Result<Self> {
        let tz: Tz = name
            .parse()
            .map_err(|_| AppError::Config(format!("Unknown time zone: {name}")))?;
        Ok(Self { tz })
    }

    pub fn zone(&self) -> Tz {
        self.tz
    }

    /// Combine a YYYY-MM-DD date and HH:mm time string, interpreted in the
    /// clinic zone, into the corresponding UTC instant.
    pub fn combine(&self, date: &str, time: &str) -> Result<DateTime<Utc>> {
        let day = parse_date(date)?;
        let tod = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|_| AppError::Validation(format!("Time must be in HH:mm format: {time}")))?;
        self.tz
            .from_local_datetime(&day.and_time(tod))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                AppError::Validation(format!("Invalid local time {date}T{time} in {}", self.tz))
            })
    }

    /// UTC instant of zone-local midnight for a YYYY-MM-DD date string.
    pub fn midnight(&self, date: &str) -> Result<DateTime<Utc>> {
        self.combine(date, "00:00")
    }

    /// Zone-aware start of the day containing `instant`.
    pub fn day_start(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.tz).date_naive();
        // Midnight always exists in this zone; fall back to the instant itself
        // rather than panic if the zone database says otherwise.
        self.tz
            .from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap_or_default())
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(instant)
    }

    /// Zone-aware end of the day containing `instant` (23:59:59.999 local).
    pub fn day_end(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = instant.with_timezone(&self.tz).date_naive();
        self.tz
            .from_local_datetime(&local.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default())
            .latest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(instant)
    }

    /// UTC instant of zone-local midnight for a calendar day.
    pub fn start_of_local_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.tz
            .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// UTC instant of zone-local 23:59:59.999 for a calendar day.
    pub fn end_of_local_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.tz
            .from_local_datetime(&day.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default())
            .latest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// Calendar day of `instant` as seen in the clinic zone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Today's calendar day in the clinic zone.
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// Display format used in notification emails: "dd/MM/yyyy às HH:mm".
    pub fn format_display(&self, instant: DateTime<Utc>) -> String {
        let local = instant.with_timezone(&self.tz);
        format!(
            "{:02}/{:02}/{:04} às {}",
            local.day(),
            local.month(),
            local.year(),
            local.format("%H:%M")
        )
    }

    /// Short day format for user-facing validation messages: "dd/MM/yyyy".
    pub fn format_day(&self, day: NaiveDate) -> String {
        format!("{:02}/{:02}/{:04}", day.day(), day.month(), day.year())
    }
}

/// Parse a YYYY-MM-DD date string.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Date must be in YYYY-MM-DD format: {date}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Sao_Paulo;

    fn calendar() -> SlotCalendar {
        SlotCalendar::new(Sao_Paulo)
    }

    #[test]
    fn test_daily_slots_shape() {
        let slots: Vec<_> = daily_slots().collect();
        assert_eq!(slots.len(), 13);
        assert_eq!(slots.first(), Some(&"09:00"));
        assert_eq!(slots.last(), Some(&"16:30"));
        // Lunch break excluded
        assert!(!slots.contains(&"12:00"));
        assert!(!slots.contains(&"12:30"));
        assert!(!slots.contains(&"13:00"));
        // Ascending order
        let mut sorted = slots.clone();
        sorted.sort();
        assert_eq!(slots, sorted);
    }

    #[test]
    fn test_is_valid_slot() {
        assert!(is_valid_slot("09:00"));
        assert!(is_valid_slot("13:30"));
        assert!(!is_valid_slot("12:00"));
        assert!(!is_valid_slot("09:15"));
        assert!(!is_valid_slot("9:00"));
    }

    #[test]
    fn test_combine_converts_to_utc() {
        // São Paulo is UTC-3 year-round since 2019.
        let instant = calendar().combine("2024-12-01", "09:00").unwrap();
        assert_eq!(instant.to_rfc3339(), "2024-12-01T12:00:00+00:00");
    }

    #[test]
    fn test_combine_rejects_malformed_input() {
        assert!(matches!(
            calendar().combine("01/12/2024", "09:00"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            calendar().combine("2024-12-01", "9am"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_day_bounds() {
        let cal = calendar();
        let instant = cal.combine("2024-12-01", "10:30").unwrap();
        let start = cal.day_start(instant);
        let end = cal.day_end(instant);
        assert_eq!(start.to_rfc3339(), "2024-12-01T03:00:00+00:00");
        assert!(start <= instant && instant <= end);
        assert_eq!(cal.local_date(start), cal.local_date(end));
        // 03:00 UTC is still the previous local day's evening boundary
        assert_eq!(
            cal.local_date(instant),
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
    }

    #[test]
    fn test_local_day_bounds_cover_whole_day() {
        let cal = calendar();
        let day = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let start = cal.start_of_local_day(day);
        let end = cal.end_of_local_day(day);
        assert_eq!(start, cal.midnight("2024-12-25").unwrap());
        assert!(start < end);
        assert_eq!(cal.local_date(start), day);
        assert_eq!(cal.local_date(end), day);
    }

    #[test]
    fn test_midnight_matches_day_start() {
        let cal = calendar();
        let midnight = cal.midnight("2024-12-25").unwrap();
        assert_eq!(cal.day_start(midnight), midnight);
    }

    #[test]
    fn test_format_display() {
        let cal = calendar();
        let instant = cal.combine("2024-12-01", "09:00").unwrap();
        assert_eq!(cal.format_display(instant), "01/12/2024 às 09:00");
    }

    #[test]
    fn test_format_day() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(calendar().format_day(day), "07/03/2025");
    }

    #[test]
    fn test_from_zone_name() {
        assert!(SlotCalendar::from_zone_name("America/Sao_Paulo").is_ok());
        assert!(matches!(
            SlotCalendar::from_zone_name("Mars/Olympus"),
            Err(AppError::Config(_))
        ));
    }
}
