//! KST clock helpers. Every timestamp the service writes is Korea Standard Time.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc, Weekday};

/// `YYYY-MM-DD`, the `날짜` column format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// `HH:MM:SS`, the `시간` column format.
pub const TIME_FORMAT: &str = "%H:%M:%S";
/// `YYYY-MM-DD HH:MM`, the reminder format.
pub const ALARM_FORMAT: &str = "%Y-%m-%d %H:%M";

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// UTC+9. Korea has no DST so a fixed offset is exact.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).expect("+09:00 is a valid offset")
}

pub fn now_kst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

pub fn date_str(at: &DateTime<FixedOffset>) -> String {
    at.format(DATE_FORMAT).to_string()
}

pub fn time_str(at: &DateTime<FixedOffset>) -> String {
    at.format(TIME_FORMAT).to_string()
}

pub fn alarm_str(at: &DateTime<FixedOffset>) -> String {
    at.format(ALARM_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM` reminder as a KST instant.
///
/// Surrounding whitespace and runs of inner whitespace are tolerated since the
/// value is often copied out of model output.
pub fn parse_alarm(raw: &str) -> Option<DateTime<FixedOffset>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&normalized, ALARM_FORMAT).ok()?;
    kst().from_local_datetime(&naive).single()
}

/// Korean weekday name, used in prompts so the model can resolve "내일" or "다음 주 월요일".
pub fn weekday_ko(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월요일",
        Weekday::Tue => "화요일",
        Weekday::Wed => "수요일",
        Weekday::Thu => "목요일",
        Weekday::Fri => "금요일",
        Weekday::Sat => "토요일",
        Weekday::Sun => "일요일",
    }
}

/// `2026-01-04 15:00 (일요일)`, embedded in classifier prompts.
pub fn prompt_now(now: &DateTime<FixedOffset>) -> String {
    format!("{} ({})", alarm_str(now), weekday_ko(now.weekday()))
}
