//! Instants in time (`Moment`): seconds plus microseconds since the Unix
//! epoch. Calendar math goes through `chrono`; the local timezone is an
//! explicitly initialized memo rather than an ambient global, so `~`-style
//! late binding applies to time zones the same way it does to `HOME`.

use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{Metamethods, TypeDescriptor, TypeTag, Value};
use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, Months, NaiveDateTime,
    Offset, TimeZone, Timelike,
};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

/// One instant in time, at microsecond resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Moment {
    tv_sec: i64,
    tv_usec: i64,
}

static LOCAL_TIMEZONE: Lazy<Mutex<Option<FixedOffset>>> =
    Lazy::new(|| Mutex::new(None));

/// Override the process's notion of the local timezone with a fixed offset
/// (`+05:30` style or `UTC`), or clear the memo with none.
pub fn set_local_timezone(tz: Option<&Text>) {
    let mut memo = LOCAL_TIMEZONE.lock().unwrap();
    *memo = tz.and_then(|t| parse_offset(&t.to_string()));
}

/// The current local timezone as an offset string.
pub fn get_local_timezone() -> Text {
    let offset = local_offset();
    Text::from_str(&offset.to_string())
}

fn parse_offset(name: &str) -> Option<FixedOffset> {
    if name == "UTC" || name == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match name.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, name.strip_prefix('+').unwrap_or(name)),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn local_offset() -> FixedOffset {
    if let Some(offset) = *LOCAL_TIMEZONE.lock().unwrap() {
        return offset;
    }
    Local::now().offset().fix()
}

fn zone(tz: Option<&Text>) -> FixedOffset {
    match tz {
        Some(name) => {
            parse_offset(&name.to_string()).unwrap_or_else(local_offset)
        }
        None => local_offset(),
    }
}

impl Moment {
    pub fn now() -> Moment {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Moment {
            tv_sec: elapsed.as_secs() as i64,
            tv_usec: elapsed.subsec_micros() as i64,
        }
    }

    pub fn from_unix(tv_sec: i64, tv_usec: i64) -> Moment {
        Moment { tv_sec, tv_usec }
    }

    pub fn unix_timestamp(&self) -> i64 {
        self.tv_sec
    }

    pub fn microsecond(&self) -> i64 {
        self.tv_usec
    }

    fn datetime(&self, tz: Option<&Text>) -> DateTime<FixedOffset> {
        let offset = zone(tz);
        offset
            .timestamp_opt(self.tv_sec, (self.tv_usec * 1000) as u32)
            .single()
            .unwrap_or_else(|| {
                offset.timestamp_opt(0, 0).single().expect("epoch is valid")
            })
    }

    fn from_datetime(dt: DateTime<FixedOffset>) -> Moment {
        Moment {
            tv_sec: dt.timestamp(),
            tv_usec: dt.timestamp_subsec_micros() as i64,
        }
    }

    /// Build a moment from calendar fields. None when the fields don't name
    /// a real instant.
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: f64,
        tz: Option<&Text>,
    ) -> Option<Moment> {
        let offset = zone(tz);
        let whole = second.floor();
        let micros = ((second - whole) * 1e6).round() as i64;
        let dt = offset
            .with_ymd_and_hms(year, month, day, hour, minute, whole as u32)
            .single()?;
        Some(Moment {
            tv_sec: dt.timestamp(),
            tv_usec: micros,
        })
    }

    /// This moment shifted by the given amounts. Sub-day amounts are exact;
    /// days and larger are calendar-aware in the given timezone.
    #[allow(clippy::too_many_arguments)]
    pub fn after(
        &self,
        seconds: f64,
        minutes: f64,
        hours: f64,
        days: i64,
        weeks: i64,
        months: i64,
        years: i64,
        tz: Option<&Text>,
    ) -> Moment {
        let mut dt = self.datetime(tz);
        let exact_ms =
            ((seconds + 60.0 * minutes + 3600.0 * hours) * 1e3) as i64;
        dt = dt + chrono::Duration::milliseconds(exact_ms);
        let total_days = days + 7 * weeks;
        dt = if total_days >= 0 {
            dt.checked_add_days(Days::new(total_days as u64))
        } else {
            dt.checked_sub_days(Days::new((-total_days) as u64))
        }
        .unwrap_or(dt);
        let total_months = months + 12 * years;
        dt = if total_months >= 0 {
            dt.checked_add_months(Months::new(total_months as u32))
        } else {
            dt.checked_sub_months(Months::new((-total_months) as u32))
        }
        .unwrap_or(dt);
        Moment::from_datetime(dt)
    }

    pub fn seconds_till(&self, then: &Moment) -> f64 {
        (then.tv_sec - self.tv_sec) as f64
            + (then.tv_usec - self.tv_usec) as f64 / 1e6
    }

    pub fn minutes_till(&self, then: &Moment) -> f64 {
        self.seconds_till(then) / 60.0
    }

    pub fn hours_till(&self, then: &Moment) -> f64 {
        self.seconds_till(then) / 3600.0
    }

    // ===== Calendar field accessors =====

    pub fn year(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).year() as i64
    }

    pub fn month(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).month() as i64
    }

    pub fn day_of_month(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).day() as i64
    }

    /// 1 = Sunday, 7 = Saturday.
    pub fn day_of_week(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).weekday().number_from_sunday() as i64
    }

    pub fn day_of_year(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).ordinal() as i64
    }

    pub fn hour(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).hour() as i64
    }

    pub fn minute(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).minute() as i64
    }

    pub fn second(&self, tz: Option<&Text>) -> i64 {
        self.datetime(tz).second() as i64
    }

    // ===== Formatting and parsing =====

    pub fn format(&self, fmt: &Text, tz: Option<&Text>) -> Text {
        Text::from_str(
            &self.datetime(tz).format(&fmt.to_string()).to_string(),
        )
    }

    pub fn date(&self, tz: Option<&Text>) -> Text {
        self.format(&Text::from_str("%Y-%m-%d"), tz)
    }

    pub fn time(&self, seconds: bool, am_pm: bool, tz: Option<&Text>) -> Text {
        let fmt = match (seconds, am_pm) {
            (true, true) => "%l:%M:%S%p",
            (true, false) => "%H:%M:%S",
            (false, true) => "%l:%M%p",
            (false, false) => "%H:%M",
        };
        Text::from_str(&self.datetime(tz).format(fmt).to_string().trim().to_string())
    }

    /// Parse with a strftime-style format. None on mismatch.
    pub fn parse(text: &Text, format: &Text) -> Option<Moment> {
        let text = text.to_string();
        let format = format.to_string();
        if let Ok(dt) = DateTime::parse_from_str(&text, &format) {
            return Some(Moment::from_datetime(dt));
        }
        let naive = NaiveDateTime::parse_from_str(&text, &format).ok()?;
        let dt = local_offset().from_local_datetime(&naive).single()?;
        Some(Moment::from_datetime(dt))
    }

    /// Human-readable relative description, e.g. "5 minutes ago" or
    /// "2 days later". The unit is chosen from the calendar fields of both
    /// moments in the given timezone, so crossing a local year or day
    /// boundary reports the calendar difference rather than raw elapsed
    /// time.
    pub fn relative(&self, relative_to: &Moment, tz: Option<&Text>) -> Text {
        let info = self.datetime(tz);
        let relative_info = relative_to.datetime(tz);
        let second_diff = relative_to.seconds_till(self);

        if info.year() != relative_info.year()
            && second_diff.abs() > 365.0 * 24.0 * 60.0 * 60.0
        {
            num_format((info.year() - relative_info.year()) as i64, "year")
        } else if info.month() != relative_info.month()
            && second_diff.abs() > 31.0 * 24.0 * 60.0 * 60.0
        {
            num_format(
                12 * (info.year() - relative_info.year()) as i64
                    + info.month() as i64
                    - relative_info.month() as i64,
                "month",
            )
        } else if info.ordinal() != relative_info.ordinal()
            && second_diff.abs() > 24.0 * 60.0 * 60.0
        {
            num_format((second_diff / (24.0 * 60.0 * 60.0)).round() as i64, "day")
        } else if info.hour() != relative_info.hour()
            && second_diff.abs() > 60.0 * 60.0
        {
            num_format((second_diff / (60.0 * 60.0)).round() as i64, "hour")
        } else if info.minute() != relative_info.minute()
            && second_diff.abs() > 60.0
        {
            num_format((second_diff / 60.0).round() as i64, "minute")
        } else if second_diff.abs() < 1e-6 {
            num_format((second_diff * 1e9) as i64, "nanosecond")
        } else if second_diff.abs() < 1e-3 {
            num_format((second_diff * 1e6) as i64, "microsecond")
        } else if second_diff.abs() < 1.0 {
            num_format((second_diff * 1e3) as i64, "millisecond")
        } else {
            num_format(second_diff as i64, "second")
        }
    }

    pub fn compare_value(&self, other: &Moment) -> Ordering {
        (self.tv_sec, self.tv_usec).cmp(&(other.tv_sec, other.tv_usec))
    }
}

/// Format a signed count with its unit: "1 day later", "5 minutes ago".
fn num_format(n: i64, unit: &str) -> Text {
    let magnitude = n.abs();
    let plural = if magnitude == 1 { "" } else { "s" };
    let suffix = if n < 0 { "ago" } else { "later" };
    Text::from_str(&format!("{magnitude} {unit}{plural} {suffix}"))
}

// ===== Type descriptor =====

fn as_moment(v: &Value) -> &Moment {
    match v {
        Value::Moment(m) => m,
        other => panic!("expected Moment, got {other:?}"),
    }
}

/// The `Moment` type descriptor.
pub static MOMENT: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        size: 16,
        align: 8,
        tag: TypeTag::Opaque { name: "Moment".into() },
        metamethods: Metamethods {
            hash: Some(|v, _| {
                let m = as_moment(v);
                hashing::siphash_words(&[m.tv_sec as u64, m.tv_usec as u64])
            }),
            compare: Some(|x, y, _| {
                as_moment(x).compare_value(as_moment(y))
            }),
            equal: Some(|x, y, _| as_moment(x) == as_moment(y)),
            as_text: Some(|obj, colorize, _| match obj {
                None => Text::from_str("Moment"),
                Some(v) => {
                    let body = as_moment(v)
                        .format(&Text::from_str("%Y-%m-%dT%H:%M:%S%z"), None);
                    if colorize {
                        Text::from_str("\x1b[36m")
                            .concat(&body)
                            .concat(&Text::from_str("\x1b[m"))
                    } else {
                        body
                    }
                }
            }),
            is_none: Some(|v, _| matches!(v, Value::Null)),
            serialize: Some(|obj, out, _| {
                let m = as_moment(obj);
                serialize::write_varint(out, m.tv_sec);
                serialize::write_varint(out, m.tv_usec);
                Ok(())
            }),
            deserialize: Some(moment_deserialize),
        },
    })
});

fn moment_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let tv_sec = input.read_varint()?;
    let tv_usec = input.read_varint()?;
    Ok(Value::Moment(Moment::from_unix(tv_sec, tv_usec)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc() -> Text {
        Text::from_str("UTC")
    }

    #[test]
    fn test_calendar_fields() {
        // 2024-02-29 12:30:45 UTC (a leap day)
        let m = Moment::new(2024, 2, 29, 12, 30, 45.5, Some(&utc())).unwrap();
        assert_eq!(m.year(Some(&utc())), 2024);
        assert_eq!(m.month(Some(&utc())), 2);
        assert_eq!(m.day_of_month(Some(&utc())), 29);
        assert_eq!(m.hour(Some(&utc())), 12);
        assert_eq!(m.minute(Some(&utc())), 30);
        assert_eq!(m.second(Some(&utc())), 45);
        assert_eq!(m.microsecond(), 500_000);
        assert_eq!(m.day_of_year(Some(&utc())), 60);
        // 2024-02-29 was a Thursday (Sunday = 1)
        assert_eq!(m.day_of_week(Some(&utc())), 5);
    }

    #[test]
    fn test_invalid_dates_are_none() {
        assert!(Moment::new(2023, 2, 29, 0, 0, 0.0, Some(&utc())).is_none());
        assert!(Moment::new(2024, 13, 1, 0, 0, 0.0, Some(&utc())).is_none());
    }

    #[test]
    fn test_after_calendar_math() {
        let m = Moment::new(2024, 1, 31, 0, 0, 0.0, Some(&utc())).unwrap();
        let next_month = m.after(0.0, 0.0, 0.0, 0, 0, 1, 0, Some(&utc()));
        // Clamps to the last day of February
        assert_eq!(next_month.month(Some(&utc())), 2);
        assert_eq!(next_month.day_of_month(Some(&utc())), 29);

        let shifted = m.after(30.0, 1.0, 0.0, 1, 0, 0, 0, Some(&utc()));
        assert_eq!(shifted.day_of_month(Some(&utc())), 1);
        assert_eq!(shifted.minute(Some(&utc())), 1);
        assert_eq!(shifted.second(Some(&utc())), 30);
    }

    #[test]
    fn test_durations() {
        let a = Moment::from_unix(1000, 0);
        let b = Moment::from_unix(1090, 500_000);
        assert_eq!(a.seconds_till(&b), 90.5);
        assert_eq!(b.seconds_till(&a), -90.5);
        assert_eq!(a.minutes_till(&b), 90.5 / 60.0);
    }

    #[test]
    fn test_format_and_parse_round_trip() {
        let m = Moment::new(2020, 6, 15, 8, 30, 0.0, Some(&utc())).unwrap();
        let fmt = Text::from_str("%Y-%m-%d %H:%M:%S %z");
        let formatted = m.format(&fmt, Some(&utc()));
        let back = Moment::parse(&formatted, &fmt).unwrap();
        assert_eq!(m, back);
        assert!(Moment::parse(&Text::from_str("bogus"), &fmt).is_none());
    }

    #[test]
    fn test_date_and_time() {
        let m = Moment::new(2020, 6, 15, 14, 5, 9.0, Some(&utc())).unwrap();
        assert_eq!(m.date(Some(&utc())).to_string(), "2020-06-15");
        assert_eq!(m.time(true, false, Some(&utc())).to_string(), "14:05:09");
        assert_eq!(m.time(false, true, Some(&utc())).to_string(), "2:05PM");
    }

    #[test]
    fn test_relative_descriptions() {
        let now = Moment::from_unix(1_000_000, 0);
        let past = Moment::from_unix(1_000_000 - 300, 0);
        let future = Moment::from_unix(1_000_000 + 2 * 86_400, 0);
        assert_eq!(
            past.relative(&now, Some(&utc())).to_string(),
            "5 minutes ago"
        );
        assert_eq!(
            future.relative(&now, Some(&utc())).to_string(),
            "2 days later"
        );

        // Less than a day elapsed stays in hours, even across a calendar
        // day boundary
        let evening = Moment::new(2021, 6, 1, 20, 0, 0.0, Some(&utc())).unwrap();
        let next_day = Moment::new(2021, 6, 2, 13, 0, 0.0, Some(&utc())).unwrap();
        assert_eq!(
            next_day.relative(&evening, Some(&utc())).to_string(),
            "17 hours later"
        );

        // Months report the calendar difference
        let jan = Moment::new(2021, 1, 15, 0, 0, 0.0, Some(&utc())).unwrap();
        let mar = Moment::new(2021, 3, 20, 0, 0, 0.0, Some(&utc())).unwrap();
        assert_eq!(
            mar.relative(&jan, Some(&utc())).to_string(),
            "2 months later"
        );
    }

    #[test]
    fn test_relative_depends_on_timezone() {
        // ~366 days apart, straddling New Year's Eve: the calendar year
        // difference depends on which timezone's midnight applies
        let before = Moment::new(2020, 12, 31, 23, 0, 0.0, Some(&utc())).unwrap();
        let after = Moment::new(2022, 1, 1, 1, 0, 0.0, Some(&utc())).unwrap();
        assert_eq!(
            after.relative(&before, Some(&utc())).to_string(),
            "2 years later"
        );
        let ahead = Text::from_str("+02:00");
        assert_eq!(
            after.relative(&before, Some(&ahead)).to_string(),
            "1 year later"
        );
    }

    #[test]
    fn test_ordering() {
        let a = Moment::from_unix(100, 5);
        let b = Moment::from_unix(100, 6);
        let c = Moment::from_unix(101, 0);
        assert_eq!(a.compare_value(&b), Ordering::Less);
        assert_eq!(c.compare_value(&b), Ordering::Greater);
        assert_eq!(a.compare_value(&a), Ordering::Equal);
    }
}
