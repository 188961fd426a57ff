use chrono::{DateTime, Utc};
use tracing::info;

use super::cursors::{CursorDecoration, DecorationId};
use super::reducer::Route;
use super::state::SessionState;

/// The view a session client drives: the editor, the output pane and
/// navigation.
pub trait Surface: Send {
    fn render(&mut self, state: &SessionState, now: DateTime<Utc>);

    /// Replace the decorations in `old` with `new`, returning handles for the
    /// new ones. An empty `new` retracts.
    fn delta_decorations(&mut self, old: &[DecorationId], new: &[CursorDecoration]) -> Vec<DecorationId>;

    /// Stop reporting local cursor moves
    fn detach_cursor_listener(&mut self) {}

    fn navigate(&mut self, route: Route);
}

/// Surface for a terminal: renders by logging and keeps decorations as
/// plain counters.
#[derive(Debug, Default)]
pub struct LogSurface {
    next_decoration: u64,
    last_output: String,
    last_code: String,
}

impl Surface for LogSurface {
    fn render(&mut self, state: &SessionState, now: DateTime<Utc>) {
        let names: Vec<_> = state.roster.iter().map(|p| format!("{} ({})", p.name, p.role)).collect();
        info!(
            "[{}] {:?} | {} | {} participants: {}",
            state.link,
            state.phase,
            state.clock_label(now),
            state.roster.len(),
            names.join(", ")
        );
        if state.code != self.last_code {
            info!("Document:\n{}", state.code);
            self.last_code = state.code.clone();
        }
        if state.output != self.last_output {
            info!("Output:\n{}", state.output);
            self.last_output = state.output.clone();
        }
    }

    fn delta_decorations(&mut self, _old: &[DecorationId], new: &[CursorDecoration]) -> Vec<DecorationId> {
        new.iter()
            .map(|d| {
                self.next_decoration += 1;
                info!("Peer caret {} at {}:{}", d.color_index, d.line, d.column);
                DecorationId(self.next_decoration)
            })
            .collect()
    }

    fn navigate(&mut self, route: Route) {
        match route {
            Route::SessionLeft => info!("👋 You have left the session"),
        }
    }
}
