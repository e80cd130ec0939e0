use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DAY_FORMAT: &str = "%Y-%m-%d";
const MAX_USER_AGENT_CHARS: usize = 300;

/// Event reported by a launcher. Missing strings are treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub event: String,
    #[serde(default)]
    pub event_time_utc: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub launcher_version: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub local_version: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub install_id: Option<String>,
    #[serde(default)]
    pub update_ok: Option<bool>,
    #[serde(default)]
    pub update_source: Option<String>,
    #[serde(default)]
    pub update_error: Option<String>,
}

/// Who sent an event, as seen by the HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: &str) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.chars().take(MAX_USER_AGENT_CHARS).collect(),
        }
    }
}

pub(crate) fn clean(value: Option<&String>) -> String {
    value.map(|value| value.trim().to_string()).unwrap_or_default()
}

#[must_use]
pub fn now_utc_iso() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn today_utc() -> String {
    Utc::now().format(DAY_FORMAT).to_string()
}

/// UTC day (`YYYY-MM-DD`) of an event timestamp, or today when it cannot be parsed.
#[must_use]
pub fn day_from_timestamp(timestamp: &str) -> String {
    parse_timestamp(timestamp).map_or_else(today_utc, |parsed| {
        parsed.format(DAY_FORMAT).to_string()
    })
}

fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(timestamp, DAY_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
