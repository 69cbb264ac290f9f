//! Control channel message model.
//!
//! Inbound messages are JSON objects carrying a `type` string. Only the
//! types below are routed; everything else (including non-object and
//! unparseable bodies) is dropped silently. Relayed messages are forwarded
//! verbatim, so inbound bodies are handled as raw JSON values rather than
//! typed structs; only server-emitted messages have a typed shape.

use serde::Serialize;
use serde_json::Value;

use crate::types::Permission;

/// Inbound message kinds accepted on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
	FileOp,
	PresenceUpdate,
	FollowUpdate,
	SessionEnd,
	JoinRequest,
	JoinResponse,
	FocusRequest,
	Summon,
	Kick,
}

impl ControlKind {
	pub fn parse(kind: &str) -> Option<Self> {
		match kind {
			"file-op" => Some(Self::FileOp),
			"presence-update" => Some(Self::PresenceUpdate),
			"follow-update" => Some(Self::FollowUpdate),
			"session-end" => Some(Self::SessionEnd),
			"join-request" => Some(Self::JoinRequest),
			"join-response" => Some(Self::JoinResponse),
			"focus-request" => Some(Self::FocusRequest),
			"summon" => Some(Self::Summon),
			"kick" => Some(Self::Kick),
			_ => None,
		}
	}
}

/// Messages originated by the server itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
	#[serde(rename = "join-response")]
	JoinResponse {
		approved: bool,
		#[serde(skip_serializing_if = "Option::is_none")]
		permission: Option<Permission>,
	},
	#[serde(rename = "kicked")]
	Kicked,
	#[serde(rename = "presence-leave")]
	PresenceLeave {
		#[serde(rename = "userId")]
		user_id: String,
	},
}

impl ServerMessage {
	pub fn to_json(&self) -> String {
		// Serialization of these variants cannot fail
		serde_json::to_string(self).unwrap_or_default()
	}
}

/// Read a string field from a JSON object, empty if absent.
pub fn str_field<'a>(msg: &'a Value, key: &str) -> &'a str {
	msg.get(key).and_then(Value::as_str).unwrap_or_default()
}


// vim: ts=4
