//! Common types used throughout the relay server.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

// Timestamp //
//***********//
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64)
	}

	pub fn from_now(delta: i64) -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64 + delta)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Permission //
//************//
/// Effective access level of a room participant on the control channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
	#[default]
	#[serde(rename = "read-write")]
	ReadWrite,
	#[serde(rename = "read-only")]
	ReadOnly,
}

impl Permission {
	pub fn can_edit(self) -> bool {
		matches!(self, Permission::ReadWrite)
	}
}

// Room //
//******//
/// A keyed, token-authenticated container scoping a set of documents and
/// one control channel. Persisted as JSON under `room:<id>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
	pub id: Box<str>,
	pub token: Box<str>,
	pub name: Box<str>,
	pub created_at: Timestamp,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_user_id: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub require_approval: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_permission: Option<Permission>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub participants: Option<Vec<Box<str>>>,
}

// Error response //
//****************//
/// Standardized error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

/// Error details with structured code and message
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
}

impl ErrorResponse {
	/// Create a new error response with code and message
	pub fn new(code: String, message: String) -> Self {
		Self { error: ErrorDetails { code, message } }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_permission_serde() {
		let json = serde_json::to_string(&Permission::ReadOnly).unwrap();
		assert_eq!(json, "\"read-only\"");
		let perm: Permission = serde_json::from_str("\"read-write\"").unwrap();
		assert_eq!(perm, Permission::ReadWrite);
	}

	#[test]
	fn test_room_roundtrip() {
		let room = Room {
			id: "a1b2c3d4e5f6a7b8".into(),
			token: "tttttttttttttttttttttttttttttttt".into(),
			name: "demo".into(),
			created_at: Timestamp(1700000000),
			host_user_id: Some("octocat".into()),
			require_approval: true,
			default_permission: Some(Permission::ReadOnly),
			participants: None,
		};
		let json = serde_json::to_string(&room).unwrap();
		assert!(json.contains("\"hostUserId\":\"octocat\""));
		assert!(json.contains("\"requireApproval\":true"));
		let back: Room = serde_json::from_str(&json).unwrap();
		assert_eq!(back.id, room.id);
		assert_eq!(back.default_permission, Some(Permission::ReadOnly));
	}

	#[test]
	fn test_room_optional_fields_absent() {
		let json = r#"{"id":"roomroomroomroom","token":"tok","name":"n","createdAt":1}"#;
		let room: Room = serde_json::from_str(json).unwrap();
		assert!(!room.require_approval);
		assert!(room.host_user_id.is_none());
		assert!(room.default_permission.is_none());
	}
}

// vim: ts=4
