//! Deserializers that fold the backend's field encodings into plain Rust types.
//!
//! The Gator API serializes Go `sql.NullString` / `sql.NullTime` values as
//! `{"String": "...", "Valid": true}` and `{"Time": "...", "Valid": true}`, but
//! some endpoints emit bare strings or `null` for the same fields. Every variant
//! is accepted here so the rest of the crate only ever sees `Option<T>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Nullable {
    Wrapped {
        #[serde(rename = "String", alias = "Time", alias = "string", alias = "time")]
        value: Option<String>,
        #[serde(rename = "Valid", alias = "valid", default = "valid_by_default")]
        valid: bool,
    },
    Plain(String),
}

fn valid_by_default() -> bool {
    true
}

impl Nullable {
    fn into_option(self) -> Option<String> {
        match self {
            Nullable::Wrapped { value, valid } if valid => value,
            Nullable::Wrapped { .. } => None,
            Nullable::Plain(s) => Some(s),
        }
    }
}

/// Deserialize a possibly-wrapped, possibly-null string. Blank strings become `None`.
pub(crate) fn nullable_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Nullable>::deserialize(deserializer)?;
    Ok(raw
        .and_then(Nullable::into_option)
        .filter(|s| !s.trim().is_empty()))
}

/// Deserialize a possibly-wrapped, possibly-null RFC 3339 timestamp.
///
/// Unparseable values and Go's zero time (`0001-01-01T00:00:00Z`) become `None`
/// rather than failing the whole record.
pub(crate) fn nullable_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = nullable_string(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(dt) if dt.timestamp() > GO_ZERO_TIME => Some(dt.with_timezone(&Utc)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(value = %s, error = %e, "Ignoring unparseable timestamp");
            None
        }
    }
}

/// Seconds since the Unix epoch of `0001-01-01T00:00:00Z`.
const GO_ZERO_TIME: i64 = -62_135_596_800;

/// Deserialize a bool that may be missing or `null`.
pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
