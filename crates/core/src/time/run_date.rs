use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Resolves the calendar date a run is recorded under.
///
/// An explicit `YYYY-MM-DD` argument wins. Otherwise the date is taken from
/// `now_utc` shifted by `RUN_DATE_UTC_OFFSET_HOURS` (default 0), so a scheduled
/// job and a manual run on the same day land on the same ledger key.
pub fn resolve_run_date(run_date_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    if let Some(s) = run_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid run date {s:?}; expected YYYY-MM-DD"));
    }

    let offset_hours = std::env::var("RUN_DATE_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(0);

    date_at_offset(now_utc, offset_hours)
}

fn date_at_offset(now_utc: DateTime<Utc>, offset_hours: i32) -> anyhow::Result<NaiveDate> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .with_context(|| format!("invalid UTC offset: {offset_hours}h"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}
