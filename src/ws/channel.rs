use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::socketio::Packet;
use crate::models::{ClientEvent, ServerEvent, SyncError};

/// What the channel reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// Socket.IO connect acknowledged; `sid` is this client's connection id
    Connected { sid: String },
    Event(ServerEvent),
    Disconnected,
}

#[derive(Debug)]
pub enum ChannelCommand {
    Emit(ClientEvent),
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
}

/// Owner's side of a channel connection
#[derive(Debug)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    messages: mpsc::UnboundedReceiver<ChannelMessage>,
}

/// Transport side of an in-process channel, for driving a client without a server
#[derive(Debug)]
pub struct ChannelPeer {
    pub commands: mpsc::UnboundedReceiver<ChannelCommand>,
    pub messages: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelHandle {
    /// Connect to the real-time server, reconnecting until disconnected
    pub fn connect(config: ChannelConfig) -> Result<ChannelHandle, SyncError> {
        let endpoint = socket_endpoint(&config.url)?;
        let (handle, peer) = ChannelHandle::pair();
        tokio::spawn(run_channel(endpoint, config, peer));
        Ok(handle)
    }

    pub fn pair() -> (ChannelHandle, ChannelPeer) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        (
            ChannelHandle { commands: cmd_tx, messages: msg_rx },
            ChannelPeer { commands: cmd_rx, messages: msg_tx },
        )
    }

    pub fn emit(&self, event: ClientEvent) -> Result<(), SyncError> {
        self.commands
            .send(ChannelCommand::Emit(event))
            .map_err(|_| SyncError::Channel("channel closed".to_string()))
    }

    pub fn disconnect(&self) {
        // Already gone is fine
        let _ = self.commands.send(ChannelCommand::Disconnect);
    }

    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.messages.recv().await
    }
}

/// `http://host:8000` -> `ws://host:8000/socket.io/?EIO=4&transport=websocket`
pub fn socket_endpoint(base: &str) -> Result<String, SyncError> {
    let mut url = Url::parse(base).map_err(|e| SyncError::Channel(format!("invalid socket URL {}: {}", base, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(SyncError::Channel(format!("unsupported socket scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::Channel(format!("cannot use scheme {} for {}", scheme, base)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

enum SessionEnd {
    /// Owner asked to disconnect, or dropped its handle
    Closed,
    /// Transport went away, try again
    Lost,
}

async fn run_channel(endpoint: String, config: ChannelConfig, mut peer: ChannelPeer) {
    let mut delay = config.reconnect_delay;

    loop {
        info!("📡 Connecting to {}", endpoint);
        match connect_async(endpoint.as_str()).await {
            Ok((stream, _)) => {
                delay = config.reconnect_delay;
                let end = run_connection(stream, &mut peer).await;
                if peer.messages.send(ChannelMessage::Disconnected).is_err() {
                    return;
                }
                if let SessionEnd::Closed = end {
                    info!("Channel closed");
                    return;
                }
                warn!("Channel lost, reconnecting in {:?}", delay);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}, retrying in {:?}", endpoint, e, delay);
            }
        }

        // Wait out the backoff, dropping emits and honouring a disconnect
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = peer.commands.recv() => match cmd {
                    Some(ChannelCommand::Emit(event)) => debug!("Dropping {} while disconnected", event.name()),
                    Some(ChannelCommand::Disconnect) | None => return,
                },
            }
        }
        delay = (delay * 2).min(config.reconnect_max_delay);
    }
}

async fn run_connection<S>(stream: S, peer: &mut ChannelPeer) -> SessionEnd
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut connected = false;

    loop {
        tokio::select! {
            frame = source.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Channel read error: {}", e);
                        return SessionEnd::Lost;
                    }
                };
                let packet = match Packet::decode(text.as_str()) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Ignoring frame: {}", e);
                        continue;
                    }
                };
                let reply = match packet {
                    Packet::Open(hs) => {
                        debug!("Engine open, sid {}", hs.sid);
                        Some(Packet::Connect { sid: None })
                    }
                    Packet::Ping => Some(Packet::Pong),
                    Packet::Connect { sid } => {
                        connected = true;
                        let sid = sid.unwrap_or_default();
                        info!("✅ Channel connected as {}", sid);
                        if peer.messages.send(ChannelMessage::Connected { sid }).is_err() {
                            return SessionEnd::Closed;
                        }
                        None
                    }
                    Packet::Event { name, mut args } => {
                        let payload = if args.is_empty() { Value::Null } else { args.swap_remove(0) };
                        match ServerEvent::parse(&name, payload) {
                            Ok(event) => {
                                if peer.messages.send(ChannelMessage::Event(event)).is_err() {
                                    return SessionEnd::Closed;
                                }
                            }
                            Err(e) => warn!("Ignoring {} event: {}", name, e),
                        }
                        None
                    }
                    Packet::ConnectError(data) => {
                        error!("Server refused connection: {}", data);
                        return SessionEnd::Lost;
                    }
                    Packet::Disconnect | Packet::Close => return SessionEnd::Lost,
                    Packet::ForeignNamespace(nsp) => {
                        debug!("Ignoring packet for namespace {}", nsp);
                        None
                    }
                    Packet::Pong | Packet::Noop | Packet::Unsupported(_) => None,
                };
                if let Some(reply) = reply {
                    if let Err(e) = send_packet(&mut sink, &reply).await {
                        warn!("Channel write error: {}", e);
                        return SessionEnd::Lost;
                    }
                }
            }
            cmd = peer.commands.recv() => match cmd {
                Some(ChannelCommand::Emit(event)) => {
                    if !connected {
                        debug!("Dropping {} before connect", event.name());
                        continue;
                    }
                    let packet = match event.payload() {
                        Ok(payload) => Packet::event(event.name(), payload),
                        Err(e) => {
                            error!("Failed to encode {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    if let Err(e) = send_packet(&mut sink, &packet).await {
                        warn!("Channel write error: {}", e);
                        return SessionEnd::Lost;
                    }
                }
                Some(ChannelCommand::Disconnect) | None => {
                    let _ = send_packet(&mut sink, &Packet::Disconnect).await;
                    let _ = sink.close().await;
                    return SessionEnd::Closed;
                }
            },
        }
    }
}

async fn send_packet<K>(sink: &mut K, packet: &Packet) -> Result<(), SyncError>
where
    K: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let frame = packet.encode()?;
    sink.send(Message::Text(frame.into()))
        .await
        .map_err(|e| SyncError::Channel(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_swaps_scheme_and_path() {
        assert_eq!(
            socket_endpoint("http://localhost:8000").unwrap(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_endpoint("https://api.example.com/").unwrap(),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert!(socket_endpoint("ftp://x").is_err());
    }

    #[tokio::test]
    async fn pair_relays_commands_and_messages() {
        let (mut handle, mut peer) = ChannelHandle::pair();
        handle.emit(ClientEvent::JoinSession("ABC".into())).unwrap();
        handle.disconnect();
        assert!(matches!(peer.commands.recv().await, Some(ChannelCommand::Emit(ClientEvent::JoinSession(_)))));
        assert!(matches!(peer.commands.recv().await, Some(ChannelCommand::Disconnect)));

        peer.messages.send(ChannelMessage::Disconnected).unwrap();
        assert_eq!(handle.recv().await, Some(ChannelMessage::Disconnected));
    }
}
