use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use validator::Validate;

pub type Metadata = serde_json::Map<String, Value>;

/// Body of `GET /api/healthz`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct HealthResponse {
    #[validate(length(min = 1))]
    pub status: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub services: HashMap<String, String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Error payload the backend attaches to non-2xx responses.
///
/// Handled exceptions carry `detail` (a string, or a list of field errors for
/// request validation); the catch-all handler adds `error`. Every field is
/// optional so that any of those shapes parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Timestamps arrive either as RFC 3339 or as naive ISO 8601 in UTC.
pub(crate) mod timestamp {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}
