//! Client side of a shared coding session: document sync, presence,
//! roster, peer cursors and remote runs.

pub mod auth;
pub mod clients;
pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod sync;
pub mod ws;

pub use config::Config;
pub use models::SyncError;
pub use sync::{ClientOptions, SessionSyncClient, UiInput};
