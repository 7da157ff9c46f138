//! Best-effort conversions for date and duration text scraped from pages.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})\s*日?(?:[ T]+(\d{1,2}):(\d{2})(?::(\d{2}))?)?",
    )
    .unwrap()
});

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d{1,2})(?::(\d{1,2}))?$").unwrap());

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d+(?:\.\d+)?)(?:\s*(hours?|hrs?|小时|時間|h|minutes?|mins?|分钟|分鐘|分|m|seconds?|secs?|秒|s)\b)?",
    )
    .unwrap()
});

/// Parse a release date into unix seconds (UTC).
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`, `YYYY年MM月DD日`, with an
/// optional `HH:MM[:SS]` suffix; surrounding text is ignored.
pub fn to_timestamp(text: &str) -> Option<i64> {
    let caps = DATE_RE.captures(text)?;
    let field = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let year: i32 = caps[1].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;
    let datetime = date.and_hms_opt(field(4)?, field(5)?, field(6)?)?;
    Some(datetime.and_utc().timestamp())
}

/// Parse a running time into seconds.
///
/// Accepts `H:MM:SS`, `MM:SS`, or amounts with units (`120分钟`, `1h 30min`,
/// `95 minutes`). A bare number is taken as minutes.
pub fn to_duration(text: &str) -> Option<i64> {
    let text = text.trim();

    if let Some(caps) = CLOCK_RE.captures(text) {
        let lead: i64 = caps[1].parse().ok()?;
        let mid: i64 = caps[2].parse().ok()?;
        return match caps.get(3) {
            Some(last) => {
                let secs: i64 = last.as_str().parse().ok()?;
                lead.checked_mul(3600)?
                    .checked_add(mid * 60)?
                    .checked_add(secs)
            }
            None => lead.checked_mul(60)?.checked_add(mid),
        };
    }

    let mut total = 0.0;
    let mut matched = false;
    for caps in AMOUNT_RE.captures_iter(text) {
        let Ok(amount) = caps[1].parse::<f64>() else {
            continue;
        };
        let unit_secs = match caps.get(2).map(|m| m.as_str()) {
            Some("hour" | "hours" | "hr" | "hrs" | "小时" | "時間" | "h") => 3600.0,
            Some("second" | "seconds" | "sec" | "secs" | "秒" | "s") => 1.0,
            _ => 60.0,
        };
        total += amount * unit_secs;
        matched = true;
    }

    let total = total.round();
    // Out-of-range amounts would saturate instead of failing.
    if !matched || !total.is_finite() || total >= i64::MAX as f64 {
        return None;
    }
    Some(total as i64)
}
