use chrono::{DateTime, SecondsFormat, Utc};

pub fn date_now() -> DateTime<Utc> {
  Utc::now()
}

/// Formats a timestamp for log lines, e.g. `2024-05-02T13:44:01.123Z`
pub fn date_format_precise(date: &DateTime<Utc>) -> String {
  date.to_rfc3339_opts(SecondsFormat::Millis, true)
}
