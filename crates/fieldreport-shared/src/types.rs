use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{DEFAULT_CATEGORY, DEFAULT_PRIORITY, UNKNOWN_LOCATION};
use crate::timestamp;

// Remote ids are either bigint or uuid columns; both travel as strings here.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl ReportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ReportId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ReportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ReportId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        opaque_id(deserializer).map(Self)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        opaque_id(deserializer).map(Self)
    }
}

fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) if s.trim().is_empty() => Err(serde::de::Error::custom("empty identifier")),
        Raw::Text(s) => Ok(s),
        Raw::Int(n) => Ok(n.to_string()),
        Raw::Uint(n) => Ok(n.to_string()),
    }
}

/// Which reports a list view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Only reports owned by this user.
    User(UserId),
    /// Every report in the table.
    All,
}

impl Scope {
    pub fn contains(&self, report: &Report) -> bool {
        match self {
            Scope::All => true,
            Scope::User(uid) => report.user_id.as_ref() == Some(uid),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Scope::User(uid) => Some(uid),
            Scope::All => None,
        }
    }
}

/// A row of the remote `reports` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub id: ReportId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(rename = "type", default = "default_category", deserialize_with = "category")]
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub gps_location: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub responded: bool,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Category with its first letter upper-cased, `General` when blank.
    pub fn category_label(&self) -> String {
        let mut chars = self.category.trim().chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "General".to_string(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.responded {
            "Responded"
        } else {
            "Not Responded"
        }
    }

    pub fn priority_label(&self) -> &str {
        non_blank(self.priority.as_deref()).unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn location_label(&self) -> &str {
        non_blank(self.gps_location.as_deref())
            .or_else(|| non_blank(self.location.as_deref()))
            .unwrap_or(UNKNOWN_LOCATION)
    }
}

/// Insert payload for a new report. `id` and `created_at` are server-assigned.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewReport {
    pub user_id: Option<UserId>,
    #[serde(rename = "type")]
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub responded: bool,
}

/// A row of the remote `user_profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub phone: String,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(default_category))
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
