pub mod channel;
pub mod socketio;

pub use channel::{ChannelCommand, ChannelConfig, ChannelHandle, ChannelMessage, ChannelPeer};
