//! Typed wire message set.
//!
//! Every frame's plaintext is one UTF-8 JSON object tagged by a `type`
//! field. Unknown or malformed types fail decoding with a
//! [`ProtocolError::Malformed`](crate::ProtocolError::Malformed) rather
//! than being silently skipped.

use serde::{Deserialize, Serialize};

/// Host metadata reported by an agent in its hello frame.
///
/// Collection is the agent host's concern; fields a probe cannot supply
/// are reported as `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub cwd: String,
    pub os_name: String,
    pub os_version: String,
    pub os_architecture: String,
    pub local_ip: String,
    pub public_ip: String,
    pub mac_address: String,
    pub is_admin: bool,
    pub username: String,
}

impl HostInfo {
    /// A placeholder value for every field a probe could not fill.
    pub const UNKNOWN: &'static str = "unknown";
}

/// Message exchanged over an established secure channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// First encrypted frame after the handshake, agent to server.
    /// Carries host metadata and the previously assigned identity, if any.
    AgentHello {
        #[serde(flatten)]
        host: HostInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    /// Registration acknowledgement carrying the canonical identity.
    ServerHello { agent_id: String },
    /// Command dispatched by the server for execution on the agent.
    Request { request_id: String, command: String },
    /// Command result; `response_id` echoes the request's correlation id.
    Response {
        response_id: String,
        response: String,
        cwd: String,
    },
    /// Keepalive sent by an idle agent.
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_info() -> HostInfo {
        HostInfo {
            hostname: "build-box".into(),
            cwd: "/home/ops".into(),
            os_name: "linux".into(),
            os_version: HostInfo::UNKNOWN.into(),
            os_architecture: "x86_64".into(),
            local_ip: "10.0.0.7".into(),
            public_ip: HostInfo::UNKNOWN.into(),
            mac_address: HostInfo::UNKNOWN.into(),
            is_admin: false,
            username: "ops".into(),
        }
    }

    #[test]
    fn type_tags_match_wire_names() {
        let hello = Message::AgentHello {
            host: host_info(),
            agent_id: None,
        };
        let json = serde_json::to_string(&hello).unwrap();
        assert!(json.contains("\"type\":\"agent-hello\""));
        // An absent identity must be omitted, not serialized as null.
        assert!(!json.contains("agent_id"));

        let json = serde_json::to_string(&Message::Heartbeat).unwrap();
        assert_eq!(json, "{\"type\":\"heartbeat\"}");

        let json = serde_json::to_string(&Message::ServerHello {
            agent_id: "a-1".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"server-hello\""));
    }

    #[test]
    fn hello_flattens_host_fields() {
        let hello = Message::AgentHello {
            host: host_info(),
            agent_id: Some("11111111-2222-3333-4444-555555555555".into()),
        };
        let value = serde_json::to_value(&hello).unwrap();
        assert_eq!(value["hostname"], "build-box");
        assert_eq!(value["is_admin"], false);
        assert_eq!(value["agent_id"], "11111111-2222-3333-4444-555555555555");

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, hello);
    }

    #[test]
    fn request_response_roundtrip() {
        let request = Message::Request {
            request_id: "r-9".into(),
            command: "uname -a".into(),
        };
        let parsed: Message =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(parsed, request);

        let response = Message::Response {
            response_id: "r-9".into(),
            response: "Linux\n".into(),
            cwd: "/".into(),
        };
        let parsed: Message =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<Message>("{\"type\":\"mystery\"}");
        assert!(result.is_err());
    }
}
