//! Backend records: trails, categories, notification authors, comments.
//!
//! Field names follow the PocketBase collections. PocketBase writes timestamps as
//! `2024-01-15 10:30:00.123Z`; RFC 3339 is accepted as well, and an empty
//! `updated` string is treated as absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A stored GPS recording and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    /// Category record id
    #[serde(default)]
    pub category: String,
    /// Stored GPX file name
    #[serde(default)]
    pub gpx: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub updated: Option<DateTime<Utc>>,
}

impl Trail {
    /// Whether the trail was created or updated at or after `checkpoint`.
    pub fn changed_since(&self, checkpoint: DateTime<Utc>) -> bool {
        self.created >= checkpoint || self.updated.is_some_and(|u| u >= checkpoint)
    }
}

/// Trail category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Local ActivityPub actor that signs reduction notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAuthor {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Comment record posted on a trail after its file was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub trail: String,
    pub author: String,
    pub text: String,
}

impl Comment {
    /// Build a comment, wrapping the configured text in a paragraph.
    pub fn new(trail_id: &str, author_id: &str, text: &str) -> Self {
        Self {
            trail: trail_id.to_string(),
            author: author_id.to_string(),
            text: format!("<p>{}</p>", text),
        }
    }
}

/// Parse a PocketBase or RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", value))),
    }
}
