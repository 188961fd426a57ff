use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{Result, SyncError};
use super::participant::Role;
use super::session::SessionSnapshot;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub line_number: u32,
    pub column: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMessage {
    pub link: String,
    pub sender_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub position: Option<CursorPosition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeChangeMessage {
    pub link: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub link: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunResultMessage {
    pub link: String,
    pub data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ParticipantLeftMessage {
    pub link: Option<String>,
    pub role: Role,
}

/// Events this client emits on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinSession(String),
    CodeChange(CodeChangeMessage),
    CursorPosition(CursorMessage),
    RunStart(LinkMessage),
    RunResult(RunResultMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinSession(_) => "join-session",
            ClientEvent::CodeChange(_) => "code-change",
            ClientEvent::CursorPosition(_) => "cursor-position",
            ClientEvent::RunStart(_) => "run-start",
            ClientEvent::RunResult(_) => "run-result",
        }
    }

    pub fn payload(&self) -> Result<Value> {
        let value = match self {
            ClientEvent::JoinSession(link) => json!(link),
            ClientEvent::CodeChange(msg) => serde_json::to_value(msg)?,
            ClientEvent::CursorPosition(msg) => serde_json::to_value(msg)?,
            ClientEvent::RunStart(msg) => serde_json::to_value(msg)?,
            ClientEvent::RunResult(msg) => serde_json::to_value(msg)?,
        };
        Ok(value)
    }
}

/// Events received from the real-time server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionJoined(SessionSnapshot),
    SessionUpdate(SessionSnapshot),
    ParticipantLeft(ParticipantLeftMessage),
    MentorJoined { link: Option<String> },
    CursorPosition(CursorMessage),
    CodeChange(CodeChangeMessage),
    RunStart(LinkMessage),
    RunResult(RunResultMessage),
    StudentDisconnected,
    SessionEnded,
    Unknown(String),
}

impl ServerEvent {
    /// Decode a named event and its first argument
    pub fn parse(name: &str, payload: Value) -> Result<ServerEvent> {
        let event = match name {
            "session-joined" => ServerEvent::SessionJoined(snapshot_of(name, &payload)?),
            "session-update" => ServerEvent::SessionUpdate(snapshot_of(name, &payload)?),
            "participant-left" => ServerEvent::ParticipantLeft(serde_json::from_value(payload)?),
            "mentor-joined" => ServerEvent::MentorJoined {
                link: payload.get("link").and_then(Value::as_str).map(str::to_string),
            },
            "cursor-position" => ServerEvent::CursorPosition(serde_json::from_value(payload)?),
            "code-change" => ServerEvent::CodeChange(serde_json::from_value(payload)?),
            "run-start" => ServerEvent::RunStart(serde_json::from_value(payload)?),
            "run-result" => {
                let link = payload
                    .get("link")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SyncError::Codec("run-result without link".to_string()))?
                    .to_string();
                let data = match payload.get("data") {
                    Some(data) if !data.is_null() => data.clone(),
                    _ => payload,
                };
                ServerEvent::RunResult(RunResultMessage { link, data })
            }
            "student-disconnected" => ServerEvent::StudentDisconnected,
            "session-ended" => ServerEvent::SessionEnded,
            other => ServerEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }

    /// Room the event is addressed to, when it says so
    pub fn link(&self) -> Option<&str> {
        match self {
            ServerEvent::SessionJoined(s) | ServerEvent::SessionUpdate(s) => s.link.as_deref(),
            ServerEvent::ParticipantLeft(m) => m.link.as_deref(),
            ServerEvent::MentorJoined { link } => link.as_deref(),
            ServerEvent::CursorPosition(m) => Some(&m.link),
            ServerEvent::CodeChange(m) => Some(&m.link),
            ServerEvent::RunStart(m) => Some(&m.link),
            ServerEvent::RunResult(m) => Some(&m.link),
            ServerEvent::StudentDisconnected | ServerEvent::SessionEnded | ServerEvent::Unknown(_) => None,
        }
    }
}

fn snapshot_of(name: &str, payload: &Value) -> Result<SessionSnapshot> {
    SessionSnapshot::from_value(payload)
        .ok_or_else(|| SyncError::Codec(format!("{} without a session payload", name)))
}
