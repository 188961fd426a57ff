use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::reducer::{reduce, Effect, Msg};
use super::state::SessionState;
use super::surface::Surface;
use crate::auth::AuthContext;
use crate::clients::SessionApi;
use crate::models::SyncError;
use crate::store::LocalStore;
use crate::ws::{ChannelHandle, ChannelMessage};

/// Input from whoever is operating the session page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiInput {
    Edit(String),
    CursorMoved { line: u32, column: u32 },
    Run,
    Leave,
    End,
    /// The page is being torn down without a chance to clean up
    Unload,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub edit_debounce: Duration,
    pub language: String,
}

enum Step {
    Dispatch(Msg),
    ChannelClosed,
    UiClosed,
    Unloaded,
}

/// Keeps one session page in sync with the backend and its peers.
///
/// All inputs are funnelled through [`reduce`]; this type only runs the
/// resulting effects.
pub struct SessionSyncClient<A: SessionApi + 'static, S: Surface> {
    state: SessionState,
    api: Arc<A>,
    auth: AuthContext,
    store: LocalStore,
    surface: S,
    channel: ChannelHandle,
    channel_open: bool,
    debouncer: Debouncer,
    results_tx: mpsc::UnboundedSender<Msg>,
    results_rx: mpsc::UnboundedReceiver<Msg>,
    view_tx: watch::Sender<SessionState>,
    navigated: bool,
}

impl<A: SessionApi + 'static, S: Surface> SessionSyncClient<A, S> {
    /// Mount a client for `link`. The cached document is read here, before
    /// any snapshot can arrive.
    pub fn new(
        link: impl Into<String>,
        options: ClientOptions,
        api: Arc<A>,
        auth: AuthContext,
        channel: ChannelHandle,
        surface: S,
    ) -> Self {
        let link = link.into();
        let store = auth.store().clone();
        let mut state = SessionState::new(link.clone(), store.cached_code(&link), options.language);
        state.user_name = auth.user().map(|u| u.name.clone());
        state.display_name = auth.display_name().map(str::to_string);
        state.privileged = auth.is_privileged();

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(state.clone());

        Self {
            state,
            api,
            auth,
            store,
            surface,
            channel,
            channel_open: true,
            debouncer: Debouncer::new(options.edit_debounce),
            results_tx,
            results_rx,
            view_tx,
            navigated: false,
        }
    }

    /// Follow state changes from outside the driver
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.view_tx.subscribe()
    }

    /// Run until the session is left, the UI goes away or the page unloads.
    /// Returns the final state.
    pub async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<UiInput>) -> SessionState {
        info!("Joining session {}", self.state.link);
        self.execute(vec![Effect::FetchSession, Effect::Render]).await;

        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut unloaded = false;
        while !self.navigated {
            let clock_running = self.state.clock_running();
            let step = tokio::select! {
                msg = self.channel.recv(), if self.channel_open => match msg {
                    Some(ChannelMessage::Connected { sid }) => Step::Dispatch(Msg::ChannelConnected { sid }),
                    Some(ChannelMessage::Disconnected) => Step::Dispatch(Msg::ChannelDisconnected),
                    Some(ChannelMessage::Event(event)) => Step::Dispatch(Msg::Server(event)),
                    None => Step::ChannelClosed,
                },
                Some(msg) = self.results_rx.recv() => Step::Dispatch(msg),
                input = inputs.recv() => match input {
                    Some(UiInput::Edit(text)) => Step::Dispatch(Msg::LocalEdit(text)),
                    Some(UiInput::CursorMoved { line, column }) => Step::Dispatch(Msg::CursorMoved { line, column }),
                    Some(UiInput::Run) => Step::Dispatch(Msg::RunRequested),
                    Some(UiInput::Leave) => Step::Dispatch(Msg::LeaveRequested),
                    Some(UiInput::End) => Step::Dispatch(Msg::EndRequested),
                    Some(UiInput::Unload) => Step::Unloaded,
                    None => Step::UiClosed,
                },
                _ = self.debouncer.fired() => Step::Dispatch(Msg::BroadcastDue),
                _ = tick.tick(), if clock_running => Step::Dispatch(Msg::Tick),
            };

            match step {
                Step::Dispatch(msg) => self.dispatch(msg).await,
                Step::ChannelClosed => {
                    warn!("Channel task ended");
                    self.channel_open = false;
                    self.dispatch(Msg::ChannelDisconnected).await;
                }
                Step::UiClosed => break,
                Step::Unloaded => {
                    unloaded = true;
                    break;
                }
            }
        }

        if unloaded {
            self.dispatch(Msg::Unload).await;
            self.channel.disconnect();
        } else {
            self.dispatch(Msg::Unmount).await;
        }
        info!("Session client for {} stopped", self.state.link);
        self.state
    }

    async fn dispatch(&mut self, msg: Msg) {
        let effects = reduce(&mut self.state, msg, Utc::now());
        self.execute(effects).await;
        let state = &self.state;
        self.view_tx.send_if_modified(|view| {
            if *view == *state {
                return false;
            }
            *view = state.clone();
            true
        });
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Emit(event) => {
                debug!("Emitting {}", event.name());
                if let Err(e) = self.channel.emit(event) {
                    warn!("Failed to emit: {}", e);
                }
            }
            Effect::FetchSession => {
                let api = self.api.clone();
                let link = self.state.link.clone();
                let tx = self.results_tx.clone();
                tokio::spawn(async move {
                    let result = api.fetch_session(&link).await.map_err(describe_fetch_error);
                    let _ = tx.send(Msg::SnapshotFetched(result));
                });
            }
            Effect::Increment(id) => {
                let api = self.api.clone();
                tokio::spawn(async move {
                    if let Err(e) = api.increment(&id).await {
                        warn!("Presence increment for {} failed: {}", id, e);
                    }
                });
            }
            Effect::CacheCode(code) => {
                if let Err(e) = self.store.cache_code(&self.state.link, &code) {
                    warn!("Failed to cache document for {}: {}", self.state.link, e);
                }
            }
            Effect::ScheduleBroadcast => self.debouncer.schedule(),
            Effect::CancelBroadcast => self.debouncer.cancel(),
            Effect::Execute(request) => {
                let api = self.api.clone();
                let tx = self.results_tx.clone();
                tokio::spawn(async move {
                    let result = api.run_code(&request).await.map_err(|e| e.to_string());
                    let _ = tx.send(Msg::RunCompleted(result));
                });
            }
            Effect::Leave { session_id } => {
                if let Err(e) = self.api.leave(&session_id, &self.state.link, self.auth.token()).await {
                    warn!("Leave call for {} failed: {}", session_id, e);
                }
            }
            Effect::Decrement(id) => {
                if let Err(e) = self.api.decrement(&id).await {
                    warn!("Presence decrement for {} failed: {}", id, e);
                }
            }
            Effect::DecrementBeacon(id) => self.api.decrement_beacon(&id),
            Effect::EndSession => match self.auth.token() {
                Some(token) => {
                    if let Err(e) = self.api.end_session(&self.state.link, token).await {
                        warn!("End session call failed: {}", e);
                    }
                }
                None => warn!("No credentials to end session {}", self.state.link),
            },
            Effect::Disconnect => self.channel.disconnect(),
            Effect::DrawCursor(sender) => {
                if let Some(cursor) = self.state.cursors.get_mut(&sender) {
                    let handles = self
                        .surface
                        .delta_decorations(&cursor.decoration_handles, &[cursor.decoration()]);
                    cursor.decoration_handles = handles;
                }
            }
            Effect::RetractCursors => {
                for (_, cursor) in self.state.cursors.drain() {
                    self.surface.delta_decorations(&cursor.decoration_handles, &[]);
                }
            }
            Effect::DetachCursorListener => self.surface.detach_cursor_listener(),
            Effect::Navigate(route) => {
                self.navigated = true;
                self.surface.navigate(route);
            }
            Effect::Render => self.surface.render(&self.state, Utc::now()),
        }
    }
}

fn describe_fetch_error(e: SyncError) -> String {
    match e {
        SyncError::Api { message, .. } => message,
        other => {
            warn!("Session fetch failed: {}", other);
            "Failed to load session".to_string()
        }
    }
}
