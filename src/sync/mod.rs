pub mod client;
pub mod clock;
pub mod cursors;
pub mod debounce;
pub mod reducer;
pub mod state;
pub mod surface;

pub use client::{ClientOptions, SessionSyncClient, UiInput};
pub use reducer::{reduce, Effect, Msg, Route};
pub use state::{Phase, SessionState};
pub use surface::{LogSurface, Surface};
