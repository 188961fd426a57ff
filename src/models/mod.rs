pub mod api;
pub mod error;
pub mod events;
pub mod participant;
pub mod run_output;
pub mod session;
pub mod user;

pub use api::*;
pub use error::*;
pub use events::*;
pub use participant::*;
pub use run_output::*;
pub use session::*;
pub use user::*;
