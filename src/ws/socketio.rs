//! Text framing for Engine.IO v4 carrying Socket.IO v4 packets on the
//! default namespace. Packets for other namespaces decode as
//! [`Packet::ForeignNamespace`].
//!
//! An Engine.IO frame is a one-digit type followed by its data. Type `4`
//! (message) wraps a Socket.IO packet: another digit, an optional `/nsp,`
//! prefix, an optional ack id, then JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::models::SyncError;

/// Handshake data sent by the server in the open packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    /// Socket.IO connect; the server's reply carries the socket id
    Connect { sid: Option<String> },
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Value),
    /// Acks and binary packets, which this client never requests
    Unsupported(char),
    /// Any packet addressed to a namespace other than `/`
    ForeignNamespace(String),
}

impl Packet {
    pub fn event(name: &str, payload: Value) -> Packet {
        Packet::Event { name: name.to_string(), args: vec![payload] }
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        let frame = match self {
            Packet::Open(hs) => format!(
                "0{}",
                serde_json::json!({ "sid": hs.sid, "pingInterval": hs.ping_interval, "pingTimeout": hs.ping_timeout })
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { sid: None } => "40".to_string(),
            Packet::Connect { sid: Some(sid) } => format!("40{}", serde_json::json!({ "sid": sid })),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("42{}", serde_json::to_string(&items)?)
            }
            Packet::ConnectError(data) => format!("44{}", data),
            Packet::ForeignNamespace(nsp) => {
                return Err(SyncError::Codec(format!("cannot encode packet for namespace {}", nsp)))
            }
            Packet::Unsupported(kind) => {
                return Err(SyncError::Codec(format!("cannot encode packet type {}", kind)))
            }
        };
        Ok(frame)
    }

    pub fn decode(frame: &str) -> Result<Packet, SyncError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or_else(|| SyncError::Codec("empty frame".to_string()))?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket(rest),
            '6' => Ok(Packet::Noop),
            other => Err(SyncError::Codec(format!("unknown engine packet type {}", other))),
        }
    }
}

fn decode_socket(body: &str) -> Result<Packet, SyncError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Codec("empty socket packet".to_string()))?;
    let (namespace, rest) = split_namespace(chars.as_str());
    if namespace != "/" {
        return Ok(Packet::ForeignNamespace(namespace.to_string()));
    }
    let rest = strip_ack_id(rest);

    match kind {
        '0' => {
            let sid = if rest.is_empty() {
                None
            } else {
                let data: Value = serde_json::from_str(rest)?;
                data.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let items: Vec<Value> = serde_json::from_str(rest)?;
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(SyncError::Codec("event without a name".to_string())),
            };
            Ok(Packet::Event { name, args: items.collect() })
        }
        '4' => Ok(Packet::ConnectError(if rest.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(rest)?
        })),
        '3' | '5' | '6' => Ok(Packet::Unsupported(kind)),
        other => Err(SyncError::Codec(format!("unknown socket packet type {}", other))),
    }
}

/// `/nsp,rest` -> (`/nsp`, `rest`); no prefix means the default namespace
fn split_namespace(s: &str) -> (&str, &str) {
    if !s.starts_with('/') {
        return ("/", s);
    }
    match s.find(',') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

fn strip_ack_id(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_digit())
}
