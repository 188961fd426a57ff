use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use super::clock::{elapsed_secs, format_elapsed};
use super::cursors::RemoteCursor;
use crate::models::{build_roster, Participant, Role, SessionSnapshot, SessionStatus};

/// Shown in the editor when neither the cache nor the backend has any code
pub const INITIAL_CODE: &str = r#"# Welcome to your coding session!
# Start coding together...

def hello(name):
    print(f"Hello, {name}! Ready to code?")


if __name__ == "__main__":
    hello("Mentor")
"#;

pub const RUNNING_MESSAGE: &str = "Running code...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Idle,
    Running,
    Error(String),
    Left,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Error(_) | Phase::Left)
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Running)
    }
}

/// Everything one client knows about the session it is in
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub link: String,
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Start of the elapsed clock; `started_at`, or first sight of an active
    /// session that didn't say when it started
    pub clock_origin: Option<DateTime<Utc>>,
    pub code: String,
    pub output: String,
    pub phase: Phase,
    pub roster: Vec<Participant>,
    pub participants_left: HashSet<Role>,
    pub last_snapshot: Option<SessionSnapshot>,

    /// Increment sent and not yet matched by a decrement
    pub presence_registered: bool,
    /// Document text has been seeded; later snapshots don't touch it
    pub initial_load_completed: bool,
    /// Cached text from an earlier visit wins until a peer edit arrives
    pub cache_preferred: bool,
    pub local_edited: bool,
    pub broadcast_pending: bool,
    pub unmounted: bool,

    pub connected: bool,
    pub connection_id: Option<String>,
    pub cursors: HashMap<String, RemoteCursor>,

    // Who this client is
    pub language: String,
    pub user_name: Option<String>,
    pub display_name: Option<String>,
    pub privileged: bool,
}

impl SessionState {
    pub fn new(link: impl Into<String>, cached_code: Option<String>, language: impl Into<String>) -> Self {
        let cache_preferred = cached_code.is_some();
        Self {
            link: link.into(),
            session_id: None,
            status: SessionStatus::Pending,
            started_at: None,
            clock_origin: None,
            code: cached_code.unwrap_or_else(|| INITIAL_CODE.to_string()),
            output: String::new(),
            phase: Phase::Loading,
            roster: Vec::new(),
            participants_left: HashSet::new(),
            last_snapshot: None,
            presence_registered: false,
            initial_load_completed: false,
            cache_preferred,
            local_edited: false,
            broadcast_pending: false,
            unmounted: false,
            connected: false,
            connection_id: None,
            cursors: HashMap::new(),
            language: language.into(),
            user_name: None,
            display_name: None,
            privileged: false,
        }
    }

    /// The one-second tick only matters while this is true
    pub fn clock_running(&self) -> bool {
        self.status == SessionStatus::Active && self.clock_origin.is_some() && !self.phase.is_terminal()
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.clock_origin {
            Some(origin) if self.clock_running() => elapsed_secs(origin, now),
            _ => 0,
        }
    }

    /// `Active • 00:02:05` or `Not started`
    pub fn clock_label(&self, now: DateTime<Utc>) -> String {
        if self.clock_running() {
            format!("Active • {}", format_elapsed(self.elapsed_secs(now)))
        } else {
            "Not started".to_string()
        }
    }

    pub fn rebuild_roster(&mut self) {
        self.roster = match &self.last_snapshot {
            Some(snapshot) => build_roster(snapshot, self.user_name.as_deref(), &self.participants_left),
            None => Vec::new(),
        };
    }

    pub fn stop_clock(&mut self) {
        self.clock_origin = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_state_prefers_cached_code() {
        let state = SessionState::new("ABC", Some("x=9".into()), "python");
        assert_eq!(state.code, "x=9");
        assert!(state.cache_preferred);

        let fresh = SessionState::new("ABC", None, "python");
        assert_eq!(fresh.code, INITIAL_CODE);
        assert!(!fresh.cache_preferred);
    }

    #[test]
    fn clock_label_reads_not_started_until_active() {
        let now = Utc::now();
        let mut state = SessionState::new("ABC", None, "python");
        assert_eq!(state.clock_label(now), "Not started");
        state.status = SessionStatus::Active;
        state.clock_origin = Some(now - Duration::seconds(61));
        assert_eq!(state.clock_label(now), "Active • 00:01:01");
        state.phase = Phase::Left;
        assert_eq!(state.elapsed_secs(now), 0);
    }
}
