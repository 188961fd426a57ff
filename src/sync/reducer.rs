//! Reconciliation of snapshots, channel events and local input into
//! [`SessionState`].
//!
//! `reduce` never performs I/O. It returns the effects to run, in order, and
//! the driver in `client.rs` carries them out.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::cursors::{color_index, RemoteCursor};
use super::state::{Phase, SessionState, RUNNING_MESSAGE};
use crate::models::{
    render_output, ClientEvent, CodeChangeMessage, CursorMessage, CursorPosition, LinkMessage, Role,
    RunRequest, RunResultMessage, ServerEvent, SessionSnapshot, SessionStatus,
};

/// Everything that can happen to a session client
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    ChannelConnected { sid: String },
    ChannelDisconnected,
    Server(ServerEvent),
    SnapshotFetched(Result<SessionSnapshot, String>),
    LocalEdit(String),
    /// The edit debounce went quiet
    BroadcastDue,
    CursorMoved { line: u32, column: u32 },
    RunRequested,
    RunCompleted(Result<Value, String>),
    LeaveRequested,
    EndRequested,
    Tick,
    /// Process or tab is going away; nothing after this is guaranteed to run
    Unload,
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SessionLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(ClientEvent),
    FetchSession,
    Increment(String),
    CacheCode(String),
    ScheduleBroadcast,
    CancelBroadcast,
    Execute(RunRequest),
    Leave { session_id: String },
    /// Awaited before continuing
    Decrement(String),
    /// Send-and-forget
    DecrementBeacon(String),
    EndSession,
    Disconnect,
    DrawCursor(String),
    RetractCursors,
    DetachCursorListener,
    Navigate(Route),
    Render,
}

pub fn reduce(state: &mut SessionState, msg: Msg, now: DateTime<Utc>) -> Vec<Effect> {
    match msg {
        Msg::Unload => return unload(state),
        Msg::Unmount => return unmount(state),
        _ if state.phase.is_terminal() => {
            debug!("Ignoring {:?} in phase {:?}", msg, state.phase);
            return Vec::new();
        }
        _ => {}
    }

    match msg {
        Msg::ChannelConnected { sid } => {
            state.connected = true;
            state.connection_id = Some(sid);
            vec![Effect::Emit(ClientEvent::JoinSession(state.link.clone()))]
        }
        Msg::ChannelDisconnected => {
            state.connected = false;
            let mut effects = Vec::new();
            if !state.cursors.is_empty() {
                effects.push(Effect::RetractCursors);
            }
            effects.push(Effect::Render);
            effects
        }
        Msg::SnapshotFetched(Ok(snapshot)) => apply_snapshot(state, snapshot, now),
        Msg::SnapshotFetched(Err(message)) => {
            if state.phase == Phase::Loading {
                state.phase = Phase::Error(message);
                vec![Effect::Render]
            } else {
                warn!("Session refresh failed: {}", message);
                Vec::new()
            }
        }
        Msg::Server(event) => on_server_event(state, event, now),
        Msg::LocalEdit(text) => {
            state.code = text.clone();
            state.local_edited = true;
            state.broadcast_pending = true;
            vec![Effect::CacheCode(text), Effect::ScheduleBroadcast, Effect::Render]
        }
        Msg::BroadcastDue => {
            state.broadcast_pending = false;
            if !state.connected {
                debug!("Edit broadcast skipped, channel is down");
                return Vec::new();
            }
            vec![Effect::Emit(ClientEvent::CodeChange(CodeChangeMessage {
                link: state.link.clone(),
                code: state.code.clone(),
            }))]
        }
        Msg::CursorMoved { line, column } => {
            if !state.connected {
                return Vec::new();
            }
            vec![Effect::Emit(ClientEvent::CursorPosition(CursorMessage {
                link: state.link.clone(),
                sender_id: state.connection_id.clone(),
                name: state.display_name.clone(),
                position: Some(CursorPosition { line_number: line, column }),
            }))]
        }
        Msg::RunRequested => {
            if state.phase != Phase::Idle {
                debug!("Run ignored in phase {:?}", state.phase);
                return Vec::new();
            }
            state.phase = Phase::Running;
            state.output = format!("{}\n", RUNNING_MESSAGE);
            let mut effects = Vec::new();
            if state.connected {
                effects.push(Effect::Emit(ClientEvent::RunStart(LinkMessage { link: state.link.clone() })));
            }
            effects.push(Effect::Execute(RunRequest {
                code: state.code.clone(),
                language: state.language.clone(),
                link: state.link.clone(),
                session_id: state.session_id.clone(),
            }));
            effects.push(Effect::Render);
            effects
        }
        Msg::RunCompleted(Ok(raw)) => {
            state.phase = Phase::Idle;
            state.output = render_output(&raw);
            let mut effects = Vec::new();
            if state.connected {
                effects.push(Effect::Emit(ClientEvent::RunResult(RunResultMessage {
                    link: state.link.clone(),
                    data: raw,
                })));
            }
            effects.push(Effect::Render);
            effects
        }
        Msg::RunCompleted(Err(message)) => {
            state.phase = Phase::Idle;
            state.output = format!("Error running code: {}", message);
            vec![Effect::Render]
        }
        Msg::LeaveRequested => {
            let mut effects = vec![Effect::CancelBroadcast];
            if let Some(id) = state.session_id.clone() {
                effects.push(Effect::Leave { session_id: id.clone() });
                if state.presence_registered {
                    effects.push(Effect::Decrement(id));
                }
            }
            state.presence_registered = false;
            effects.extend(depart(state));
            effects
        }
        Msg::EndRequested => {
            if !state.privileged {
                warn!("Only the session owner can end session {}", state.link);
                return Vec::new();
            }
            let mut effects = vec![Effect::CancelBroadcast, Effect::EndSession];
            effects.extend(depart(state));
            effects
        }
        Msg::Tick => {
            if state.clock_running() {
                vec![Effect::Render]
            } else {
                Vec::new()
            }
        }
        // Handled before the terminal check
        Msg::Unload | Msg::Unmount => Vec::new(),
    }
}

fn on_server_event(state: &mut SessionState, event: ServerEvent, now: DateTime<Utc>) -> Vec<Effect> {
    if let Some(link) = event.link() {
        if link != state.link {
            debug!("Discarding event for foreign session {}", link);
            return Vec::new();
        }
    }

    match event {
        ServerEvent::SessionJoined(snapshot) => {
            if let Some(role) = snapshot.joined_role {
                state.participants_left.remove(&role);
            }
            apply_snapshot(state, snapshot, now)
        }
        ServerEvent::SessionUpdate(snapshot) => apply_snapshot(state, snapshot, now),
        ServerEvent::ParticipantLeft(msg) => {
            state.participants_left.insert(msg.role);
            state.rebuild_roster();
            vec![Effect::Render]
        }
        ServerEvent::MentorJoined { .. } => {
            state.participants_left.remove(&Role::Mentor);
            state.rebuild_roster();
            vec![Effect::FetchSession, Effect::Render]
        }
        ServerEvent::CursorPosition(msg) => {
            let Some(sender) = msg.sender_id else {
                return Vec::new();
            };
            if state.connection_id.as_deref() == Some(sender.as_str()) {
                return Vec::new();
            }
            let Some(pos) = msg.position.filter(|p| p.line_number > 0) else {
                return Vec::new();
            };
            let cursor = state.cursors.entry(sender.clone()).or_insert_with(|| RemoteCursor {
                line: pos.line_number,
                column: pos.column,
                color_index: color_index(&sender),
                decoration_handles: Vec::new(),
            });
            cursor.line = pos.line_number;
            cursor.column = pos.column;
            vec![Effect::DrawCursor(sender)]
        }
        ServerEvent::CodeChange(msg) => {
            if msg.code == state.code {
                return Vec::new();
            }
            state.code = msg.code.clone();
            state.cache_preferred = false;
            state.initial_load_completed = true;
            let mut effects = Vec::new();
            if state.broadcast_pending {
                state.broadcast_pending = false;
                effects.push(Effect::CancelBroadcast);
            }
            effects.push(Effect::CacheCode(msg.code));
            effects.push(Effect::Render);
            effects
        }
        ServerEvent::RunStart(_) => {
            if state.phase.is_joined() {
                state.phase = Phase::Running;
            }
            state.output = RUNNING_MESSAGE.to_string();
            vec![Effect::Render]
        }
        ServerEvent::RunResult(msg) => {
            if state.phase.is_joined() {
                state.phase = Phase::Idle;
            }
            state.output = render_output(&msg.data);
            vec![Effect::Render]
        }
        ServerEvent::StudentDisconnected | ServerEvent::SessionEnded => {
            let mut effects = vec![Effect::CancelBroadcast];
            if !state.cursors.is_empty() {
                effects.push(Effect::RetractCursors);
            }
            effects.extend(depart(state));
            effects
        }
        ServerEvent::Unknown(name) => {
            debug!("Unhandled event {}", name);
            Vec::new()
        }
    }
}

fn apply_snapshot(state: &mut SessionState, snapshot: SessionSnapshot, now: DateTime<Utc>) -> Vec<Effect> {
    if let Some(link) = snapshot.link.as_deref() {
        if link != state.link {
            debug!("Discarding snapshot for foreign session {}", link);
            return Vec::new();
        }
    }

    let mut effects = Vec::new();

    if let Some(id) = snapshot.id.clone() {
        state.session_id = Some(id.clone());
        if !state.presence_registered {
            state.presence_registered = true;
            effects.push(Effect::Increment(id));
        }
    }

    state.status = snapshot.status;
    state.started_at = snapshot.started_at;
    state.clock_origin = match snapshot.status {
        SessionStatus::Active => snapshot.started_at.or(state.clock_origin).or(Some(now)),
        _ => None,
    };

    if !state.initial_load_completed {
        if !state.cache_preferred && !state.local_edited {
            if let Some(code) = snapshot.code.clone() {
                state.code = code;
            }
        }
        state.initial_load_completed = true;
    }

    state.last_snapshot = Some(snapshot);
    state.rebuild_roster();
    if state.phase == Phase::Loading {
        state.phase = Phase::Idle;
    }

    effects.push(Effect::Render);
    effects
}

/// Shared tail of every way out of a session
fn depart(state: &mut SessionState) -> Vec<Effect> {
    state.phase = Phase::Left;
    state.broadcast_pending = false;
    state.stop_clock();
    vec![Effect::Disconnect, Effect::Navigate(Route::SessionLeft), Effect::Render]
}

fn unload(state: &mut SessionState) -> Vec<Effect> {
    match state.session_id.clone() {
        Some(id) if state.presence_registered => {
            state.presence_registered = false;
            vec![Effect::DecrementBeacon(id)]
        }
        _ => Vec::new(),
    }
}

fn unmount(state: &mut SessionState) -> Vec<Effect> {
    if state.unmounted {
        return Vec::new();
    }
    state.unmounted = true;

    let mut effects = Vec::new();
    if !state.cursors.is_empty() {
        effects.push(Effect::RetractCursors);
    }
    effects.push(Effect::DetachCursorListener);
    effects.extend(unload(state));
    effects.push(Effect::Disconnect);
    effects
}
