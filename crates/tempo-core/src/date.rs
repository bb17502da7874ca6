use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "tempo-time.toml";
const TIMEZONE_ENV_VAR: &str = "TEMPO_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "TEMPO_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

pub fn project_timezone() -> &'static Tz {
    static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();
    PROJECT_TZ.get_or_init(resolve_project_timezone)
}

/// The calendar date of `dt` in the configured timezone. Due-date
/// comparisons and "today" derivation always go through this.
#[must_use]
pub fn to_project_date(dt: DateTime<Utc>) -> NaiveDate {
    dt.with_timezone(project_timezone()).date_naive()
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn resolve_project_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    tracing::info!("no timezone configured; using UTC");
    chrono_tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed reading timezone config file"
            );
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed parsing timezone config file"
            );
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured project timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

fn relative_date_regex() -> &'static Regex {
    static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();
    RELATIVE_RE
        .get_or_init(|| Regex::new(r"^([+-]?)(\d+)([dwm])$").expect("valid relative date pattern"))
}

/// Parses a calendar-date expression relative to `today`: the keywords
/// `today`/`tomorrow`/`yesterday`, relative offsets like `+3d`, `2w` or
/// `-1m`, or an ISO date `YYYY-MM-DD`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return shift_days(today, 1, true),
        "yesterday" => return shift_days(today, 1, false),
        _ => {}
    }

    if let Some(caps) = relative_date_regex().captures(&lower) {
        let forward = &caps[1] != "-";
        let count: u64 = caps[2]
            .parse()
            .map_err(|_| anyhow!("relative date offset out of range: {token}"))?;
        return match &caps[3] {
            "d" => shift_days(today, count, forward),
            "w" => shift_days(today, count * 7, forward),
            "m" => shift_months(today, count, forward),
            _ => Err(anyhow!("unknown relative date unit in: {token}")),
        };
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .map_err(|_| anyhow!("unrecognized date expression: {token}"))
}

fn shift_days(base: NaiveDate, count: u64, forward: bool) -> anyhow::Result<NaiveDate> {
    let shifted = if forward {
        base.checked_add_days(Days::new(count))
    } else {
        base.checked_sub_days(Days::new(count))
    };
    shifted.ok_or_else(|| anyhow!("date offset overflows the calendar"))
}

fn shift_months(base: NaiveDate, count: u64, forward: bool) -> anyhow::Result<NaiveDate> {
    let months = u32::try_from(count).map_err(|_| anyhow!("month offset out of range"))?;
    let shifted = if forward {
        base.checked_add_months(Months::new(months))
    } else {
        base.checked_sub_months(Months::new(months))
    };
    shifted.ok_or_else(|| anyhow!("date offset overflows the calendar"))
}
