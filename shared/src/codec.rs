//! Socket.IO text-frame codec
//!
//! The incident feed speaks Socket.IO v5 on top of Engine.IO v4 over a
//! WebSocket. Every WebSocket text message is one Engine.IO packet:
//! ```text
//! [ 1 char: engine.io type ][ payload ]
//! ```
//! and an Engine.IO `message` packet (`4`) carries one Socket.IO packet:
//! ```text
//! [ 1 char: socket.io type ][ optional "/namespace," ][ optional ack id ][ JSON ]
//! ```
//! Only the default namespace is used; a namespace prefix and ack id are
//! accepted on decode and discarded.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::defaults;

/// Errors that can occur while decoding a frame
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown engine.io packet type: {0:?}")]
    UnknownPacketType(char),

    #[error("Unknown socket.io packet type: {0:?}")]
    UnknownMessageType(char),

    #[error("Event packet without event name")]
    MissingEventName,

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine.IO open handshake parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    defaults::PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    defaults::PING_TIMEOUT_MS
}

impl Handshake {
    /// Longest silence tolerated before the link is considered dead
    pub fn liveness_window_ms(&self) -> u64 {
        self.ping_interval.saturating_add(self.ping_timeout)
    }
}

/// Socket.IO packet carried inside an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect request (client) or acknowledgement (server)
    Connect { sid: Option<String> },
    /// Namespace disconnect
    Disconnect,
    /// Named event with its arguments
    Event { name: String, args: Vec<Value> },
    /// Namespace connect refused by the server
    ConnectError { message: String },
}

/// Engine.IO packet, one per WebSocket text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Encode a packet into its text frame
pub fn encode(packet: &Packet) -> String {
    match packet {
        // Only the server opens; the client never sends a handshake
        Packet::Open(h) => format!(
            "0{{\"sid\":{},\"pingInterval\":{},\"pingTimeout\":{}}}",
            Value::String(h.sid.clone()),
            h.ping_interval,
            h.ping_timeout
        ),
        Packet::Close => "1".into(),
        Packet::Ping => "2".into(),
        Packet::Pong => "3".into(),
        Packet::Message(msg) => format!("4{}", encode_socket(msg)),
        Packet::Upgrade => "5".into(),
        Packet::Noop => "6".into(),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    match packet {
        SocketPacket::Connect { sid: None } => "0".into(),
        SocketPacket::Connect { sid: Some(sid) } => {
            format!("0{{\"sid\":{}}}", Value::String(sid.clone()))
        }
        SocketPacket::Disconnect => "1".into(),
        SocketPacket::Event { name, args } => {
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            format!("2{}", Value::Array(items))
        }
        SocketPacket::ConnectError { message } => {
            format!("4{{\"message\":{}}}", Value::String(message.clone()))
        }
    }
}

/// Decode one text frame
pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => Ok(Packet::Message(decode_socket(rest)?)),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let payload = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => {
            if payload.is_empty() {
                return Ok(SocketPacket::Connect { sid: None });
            }
            let value: Value = serde_json::from_str(payload)?;
            let sid = value.get("sid").and_then(Value::as_str).map(str::to_owned);
            Ok(SocketPacket::Connect { sid })
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let items: Vec<Value> = serde_json::from_str(payload)?;
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(CodecError::MissingEventName),
            };
            Ok(SocketPacket::Event {
                name,
                args: items.collect(),
            })
        }
        '4' => {
            let value: Value = if payload.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(payload)?
            };
            let message = match &value {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connect refused")
                    .to_owned(),
            };
            Ok(SocketPacket::ConnectError { message })
        }
        other => Err(CodecError::UnknownMessageType(other)),
    }
}

fn strip_namespace(payload: &str) -> &str {
    if !payload.starts_with('/') {
        return payload;
    }
    match payload.find(',') {
        Some(idx) => &payload[idx + 1..],
        // "/admin" with nothing after it
        None => "",
    }
}

fn strip_ack_id(payload: &str) -> &str {
    payload.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Shorthand for the client's namespace connect request
pub fn connect_request() -> String {
    encode(&Packet::Message(SocketPacket::Connect { sid: None }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#;
        match decode(frame).expect("decode failed") {
            Packet::Open(h) => {
                assert_eq!(h.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(h.ping_interval, 25000);
                assert_eq!(h.liveness_window_ms(), 30000);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_handshake_defaults() {
        match decode(r#"0{"sid":"abc"}"#).expect("decode failed") {
            Packet::Open(h) => {
                assert_eq!(h.ping_interval, defaults::PING_INTERVAL_MS);
                assert_eq!(h.ping_timeout, defaults::PING_TIMEOUT_MS);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode("1").unwrap(), Packet::Close);
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("3").unwrap(), Packet::Pong);
        assert_eq!(decode("6").unwrap(), Packet::Noop);
        assert!(matches!(decode(""), Err(CodecError::Empty)));
        assert!(matches!(decode("9"), Err(CodecError::UnknownPacketType('9'))));
    }

    #[test]
    fn test_decode_connect_ack() {
        let packet = decode(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Connect {
                sid: Some("wZX3oN0bSVIhsaknAAAI".into())
            })
        );
        assert_eq!(connect_request(), "40");
    }

    #[test]
    fn test_decode_event() {
        let frame = r#"42["incident",{"vehicleId":"V-1"}]"#;
        let packet = decode(frame).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                name: "incident".into(),
                args: vec![json!({"vehicleId": "V-1"})],
            })
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack_id() {
        let frame = r#"42/alerts,17["incident",{"vehicleId":"V-2"}]"#;
        match decode(frame).unwrap() {
            Packet::Message(SocketPacket::Event { name, args }) => {
                assert_eq!(name, "incident");
                assert_eq!(args[0]["vehicleId"], "V-2");
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_event_encoding_is_decodable() {
        let packet = Packet::Message(SocketPacket::Event {
            name: "connected".into(),
            args: vec![json!({"data": "Connected to Sage Guard Socket.IO server"})],
        });
        let frame = encode(&packet);
        assert!(frame.starts_with("42[\"connected\""));
        assert_eq!(decode(&frame).unwrap(), packet);
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = decode(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::ConnectError {
                message: "Not authorized".into()
            })
        );
    }

    #[test]
    fn test_malformed_event_payloads() {
        assert!(matches!(decode("42[1,2]"), Err(CodecError::MissingEventName)));
        assert!(matches!(decode("42[\"incident\""), Err(CodecError::Json(_))));
        assert!(matches!(decode("47"), Err(CodecError::UnknownMessageType('7'))));
    }
}
