//! Temporal extraction (spec.md §4.2). Ported in spirit, not in letter, from
//! `mailq/digest/temporal.py`: same priority order of extraction strategies,
//! same tz-abbreviation map, re-expressed with the `regex`/`chrono`/
//! `chrono-tz` idiom this crate's Cargo.toml carries for exactly this
//! purpose.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::types::email::{Email, EmailType};
use crate::types::context::TemporalContext;

const DELIVERY_KEYWORDS: &[&str] = &[
    "delivered",
    "delivery",
    "arriving",
    "out for delivery",
    "package",
    "shipment",
];

const PURCHASE_KEYWORDS: &[&str] = &["receipt", "order", "payment", "confirmation", "invoice"];

static CALENDAR_SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)@\s*(?P<day>[a-z]{3})\s+(?P<mon>[a-z]{3})\s+(?P<d>\d{1,2})(?:,?\s+(?P<year>\d{4}))?\s+(?P<h>\d{1,2})(?::(?P<min>\d{2}))?\s*(?P<ampm>am|pm)(?:\s*-\s*(?P<eh>\d{1,2})(?::(?P<emin>\d{2}))?\s*(?P<eampm>am|pm))?(?:\s*\((?P<tz>[a-z]{2,4})\))?",
    )
    .expect("calendar subject regex is valid")
});

static GENERIC_THIS_WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bthis\s+(?P<wd>monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").unwrap());

static GENERIC_TODAY_AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btoday\s+at\s+(?P<h>\d{1,2})(?::(?P<min>\d{2}))?\s*(?P<ampm>am|pm)\b").unwrap()
});

static GENERIC_TOMORROW_AT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btomorrow\s+at\s+(?P<h>\d{1,2})(?::(?P<min>\d{2}))?\s*(?P<ampm>am|pm)\b").unwrap()
});

static GENERIC_MONTH_DAY_YEAR_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<mon>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(?P<d>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<year>\d{4})(?:\s+at\s+(?P<h>\d{1,2})(?::(?P<min>\d{2}))?\s*(?P<ampm>am|pm))?\b",
    )
    .unwrap()
});

static GENERIC_MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<mon>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(?P<d>\d{1,2})(?:st|nd|rd|th)?\b").unwrap()
});

static GENERIC_SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<m>\d{1,2})/(?P<d>\d{1,2})\b").unwrap());

fn tz_abbrev_to_zone(abbrev: &str) -> Option<Tz> {
    match abbrev.to_uppercase().as_str() {
        "EST" | "EDT" => Some(chrono_tz::America::New_York),
        "CST" | "CDT" => Some(chrono_tz::America::Chicago),
        "MST" | "MDT" => Some(chrono_tz::America::Denver),
        "PST" | "PDT" => Some(chrono_tz::America::Los_Angeles),
        "GMT" | "UTC" => Some(chrono_tz::UTC),
        _ => None,
    }
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let table: HashMap<&str, u32> = HashMap::from([
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ]);
    table.get(&abbrev.to_lowercase()[..3.min(abbrev.len())]).copied()
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_hour_min_ampm(h: &str, min: Option<&str>, ampm: &str) -> Option<NaiveTime> {
    let mut hour: u32 = h.parse().ok()?;
    let minute: u32 = min.map(|m| m.parse().ok()).unwrap_or(Some(0))?;
    let is_pm = ampm.eq_ignore_ascii_case("pm");
    if hour == 12 {
        hour = 0;
    }
    if is_pm {
        hour += 12;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Tolerant RFC 2822 parse. Failure yields `None`, never an error (spec.md
/// §4.2 step 1, §7 ParseSoftError).
pub fn parse_received_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Attempt the Google-Calendar-style subject pattern. Returns
/// `(event_time, event_end_time)` in UTC.
fn try_calendar_subject(
    subject: &str,
    now: DateTime<Utc>,
    default_tz: Tz,
) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    let caps = CALENDAR_SUBJECT_RE.captures(subject)?;
    let mon = month_from_abbrev(&caps["mon"])?;
    let day: u32 = caps["d"].parse().ok()?;
    let year: i32 = caps
        .name("year")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_else(|| now.year());
    let start_time = parse_hour_min_ampm(&caps["h"], caps.name("min").map(|m| m.as_str()), &caps["ampm"])?;

    let zone = caps
        .name("tz")
        .and_then(|m| tz_abbrev_to_zone(m.as_str()))
        .unwrap_or(default_tz);

    let naive_date = NaiveDate::from_ymd_opt(year, mon, day)?;
    let naive_start = naive_date.and_time(start_time);
    let start_utc = zone
        .from_local_datetime(&naive_start)
        .single()
        .map(|dt| dt.with_timezone(&Utc))?;

    let end_utc = if let (Some(eh), Some(eampm)) = (caps.name("eh"), caps.name("eampm")) {
        let end_time = parse_hour_min_ampm(eh.as_str(), caps.name("emin").map(|m| m.as_str()), eampm.as_str());
        end_time.and_then(|t| {
            zone.from_local_datetime(&naive_date.and_time(t))
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        })
    } else {
        None
    };

    Some((start_utc, end_utc))
}

fn subject_contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Most recent occurrence of `weekday` at-or-before `reference` (inclusive of
/// `reference`'s own weekday).
fn most_recent_weekday(reference: DateTime<Utc>, weekday: Weekday) -> DateTime<Utc> {
    let ref_day = reference.weekday();
    let mut back = ref_day.num_days_from_monday() as i64 - weekday.num_days_from_monday() as i64;
    if back < 0 {
        back += 7;
    }
    reference - Duration::days(back)
}

/// Next occurrence of `weekday` strictly after `reference`'s own day.
fn next_weekday(reference: DateTime<Utc>, weekday: Weekday) -> DateTime<Utc> {
    let ref_day = reference.weekday();
    let mut forward = weekday.num_days_from_monday() as i64 - ref_day.num_days_from_monday() as i64;
    if forward <= 0 {
        forward += 7;
    }
    reference + Duration::days(forward)
}

fn generic_date_scan(
    text: &str,
    received: DateTime<Utc>,
    default_tz: Tz,
) -> Option<DateTime<Utc>> {
    if let Some(caps) = GENERIC_THIS_WEEKDAY_RE.captures(text) {
        let wd = weekday_from_name(&caps["wd"])?;
        return Some(next_weekday(received, wd));
    }
    if let Some(caps) = GENERIC_TODAY_AT_RE.captures(text) {
        let time = parse_hour_min_ampm(&caps["h"], caps.name("min").map(|m| m.as_str()), &caps["ampm"])?;
        return local_datetime_utc(received, time, default_tz);
    }
    if let Some(caps) = GENERIC_TOMORROW_AT_RE.captures(text) {
        let time = parse_hour_min_ampm(&caps["h"], caps.name("min").map(|m| m.as_str()), &caps["ampm"])?;
        return local_datetime_utc(received + Duration::days(1), time, default_tz);
    }
    if let Some(caps) = GENERIC_MONTH_DAY_YEAR_TIME_RE.captures(text) {
        let mon = month_from_abbrev(&caps["mon"])?;
        let day: u32 = caps["d"].parse().ok()?;
        let year: i32 = caps["year"].parse().ok()?;
        let time = match (caps.name("h"), caps.name("ampm")) {
            (Some(h), Some(ampm)) => {
                parse_hour_min_ampm(h.as_str(), caps.name("min").map(|m| m.as_str()), ampm.as_str())?
            }
            _ => NaiveTime::from_hms_opt(0, 0, 0)?,
        };
        let date = NaiveDate::from_ymd_opt(year, mon, day)?;
        return default_tz
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(caps) = GENERIC_MONTH_DAY_RE.captures(text) {
        let mon = month_from_abbrev(&caps["mon"])?;
        let day: u32 = caps["d"].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(received.year(), mon, day)?;
        return default_tz
            .from_local_datetime(&date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?))
            .single()
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(caps) = GENERIC_SHORT_DATE_RE.captures(text) {
        let month: u32 = caps["m"].parse().ok()?;
        let day: u32 = caps["d"].parse().ok()?;
        let mut year = received.year();
        let mut date = NaiveDate::from_ymd_opt(year, month, day);
        if let Some(d) = date {
            let candidate = default_tz
                .from_local_datetime(&d.and_time(NaiveTime::from_hms_opt(0, 0, 0)?))
                .single()
                .map(|dt| dt.with_timezone(&Utc))?;
            if (received - candidate).num_days() > 30 {
                year += 1;
                date = NaiveDate::from_ymd_opt(year, month, day);
            }
        }
        return date.and_then(|d| {
            default_tz
                .from_local_datetime(&d.and_time(NaiveTime::from_hms_opt(0, 0, 0).unwrap()))
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        });
    }
    None
}

fn local_datetime_utc(day: DateTime<Utc>, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let local_day = day.with_timezone(&tz).date_naive();
    tz.from_local_datetime(&local_day.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract a full `TemporalContext` for one email (spec.md §4.2 step 2/3).
/// Never fails; every branch degrades to `None` on a parse miss.
pub fn extract_temporal_context(email: &Email, now: DateTime<Utc>, default_tz: Tz) -> TemporalContext {
    let mut ctx = TemporalContext::default();
    let received = parse_received_date(&email.date).unwrap_or(now);

    if let Some((start, end)) = try_calendar_subject(&email.subject, now, default_tz) {
        ctx.event_time = Some(start);
        ctx.event_end_time = end;
        return ctx;
    }

    if subject_contains_any(&email.subject, DELIVERY_KEYWORDS) {
        let lower = email.subject.to_lowercase();
        ctx.delivery_date = Some(if lower.contains("arriving today") {
            received.with_timezone(&default_tz).date_naive().and_hms_opt(0, 0, 0)
                .and_then(|naive| default_tz.from_local_datetime(&naive).single())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(received)
        } else if lower.contains("arriving tomorrow") {
            let tomorrow = received + Duration::days(1);
            tomorrow
                .with_timezone(&default_tz)
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .and_then(|naive| default_tz.from_local_datetime(&naive).single())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(tomorrow)
        } else {
            received
        });
        return ctx;
    }

    if subject_contains_any(&email.subject, PURCHASE_KEYWORDS) && !matches!(email.email_type, EmailType::Event) {
        let mut found_weekday = None;
        for (name, wd) in [
            ("monday", Weekday::Mon),
            ("tuesday", Weekday::Tue),
            ("wednesday", Weekday::Wed),
            ("thursday", Weekday::Thu),
            ("friday", Weekday::Fri),
            ("saturday", Weekday::Sat),
            ("sunday", Weekday::Sun),
        ] {
            if email.subject.to_lowercase().contains(name) {
                found_weekday = Some(wd);
                break;
            }
        }
        ctx.purchase_date = Some(match found_weekday {
            Some(wd) => most_recent_weekday(received, wd),
            None => received,
        });
        return ctx;
    }

    let text = email.searchable_text();
    if let Some(event_time) = generic_date_scan(&text, received, default_tz) {
        ctx.event_time = Some(event_time);
    }

    ctx
}

/// Past-grace rule (spec.md §4.2): an event is past-grace when its end (or
/// start + 1h absent an end) is earlier than `now - 1h`.
pub fn is_past_grace(ctx: &TemporalContext, now: DateTime<Utc>) -> bool {
    let Some(event_time) = ctx.event_time else {
        return false;
    };
    let end = ctx.event_end_time.unwrap_or(event_time + Duration::hours(1));
    end < now - Duration::hours(1)
}
