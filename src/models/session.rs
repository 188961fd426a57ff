use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::participant::{Guest, Role};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn parse(s: &str) -> SessionStatus {
        match s.to_ascii_lowercase().as_str() {
            "active" => SessionStatus::Active,
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Pending,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

/// Full session payload as sent by the backend or the real-time server.
///
/// The backend is inconsistent about field names, so this is built from raw
/// JSON with [`SessionSnapshot::from_value`] rather than derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: Option<String>,
    pub link: Option<String>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub mentor_id: Option<String>,
    pub mentor_name: Option<String>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub guests: Vec<Guest>,
    /// Role announced alongside a join, if any
    pub joined_role: Option<Role>,
}

impl SessionSnapshot {
    /// Build a snapshot from a payload that is either the session object or
    /// an array whose first element is the session.
    pub fn from_value(value: &Value) -> Option<SessionSnapshot> {
        let obj = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        if !obj.is_object() {
            return None;
        }

        Some(SessionSnapshot {
            id: id_at(obj, &["id"]),
            link: str_at(obj, &["link"]),
            status: str_at(obj, &["status"])
                .map(|s| SessionStatus::parse(&s))
                .unwrap_or_default(),
            started_at: obj
                .get("started_at")
                .or_else(|| obj.get("startedAt"))
                .and_then(parse_timestamp),
            code: str_at(obj, &["code"]),
            mentor_id: id_at(obj, &["mentor", "id"]).or_else(|| id_at(obj, &["mentor_id"])),
            mentor_name: str_at(obj, &["mentor_name"])
                .or_else(|| str_at(obj, &["mentor", "name"]))
                .or_else(|| str_at(obj, &["mentorName"]))
                .or_else(|| str_at(obj, &["creator", "name"]))
                .or_else(|| str_at(obj, &["ownerName"])),
            student_name: str_at(obj, &["student_name"]),
            student_email: str_at(obj, &["student_email"]),
            guests: guests_of(obj),
            joined_role: str_at(obj, &["role"]).map(|r| Role::parse(&r)),
        })
    }
}

/// Non-empty string at a nested path
fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Like [`str_at`] but also accepts numeric ids
fn id_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    match cur {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn guests_of(obj: &Value) -> Vec<Guest> {
    let list = ["guests", "participants", "students"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array));
    let Some(list) = list else {
        return Vec::new();
    };

    list.iter()
        .filter(|g| g.is_object())
        .map(|g| {
            let email = str_at(g, &["email"]);
            let name = str_at(g, &["name"])
                .or_else(|| str_at(g, &["guestName"]))
                .or_else(|| email.clone())
                .unwrap_or_else(|| "Student".to_string());
            Guest {
                id: id_at(g, &["id"]),
                name,
                email,
                role: str_at(g, &["role"]).map(|r| Role::parse(&r)).unwrap_or(Role::Student),
            }
        })
        .collect()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (assumed UTC) and epoch millis
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
