use rand::RngExt;
use sha2::{Digest, Sha256};

pub const ROOM_ID_LENGTH: usize = 16;
pub const ROOM_TOKEN_LENGTH: usize = 32;
pub const SAFE: [char; 62] = [
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
	'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
	'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

fn random_string(len: usize) -> String {
	let mut rng = rand::rng();
	let mut result = String::with_capacity(len);

	for _ in 0..len {
		result.push(SAFE[rng.random_range(0..SAFE.len())]);
	}
	result
}

pub fn random_room_id() -> String {
	random_string(ROOM_ID_LENGTH)
}

pub fn random_room_token() -> String {
	random_string(ROOM_TOKEN_LENGTH)
}

/// Compare two secrets without leaking the position of the first difference.
/// Both sides are hashed first, so comparison time is independent of input
/// contents and of where they diverge.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	Sha256::digest(a) == Sha256::digest(b)
}

/// Reject C0 control bytes and DEL in user-supplied labels.
pub fn has_control_chars(s: &str) -> bool {
	s.bytes().any(|b| b < 0x20 || b == 0x7F)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_random_lengths() {
		assert_eq!(random_room_id().len(), ROOM_ID_LENGTH);
		assert_eq!(random_room_token().len(), ROOM_TOKEN_LENGTH);
	}

	#[test]
	fn test_random_tokens_differ() {
		assert_ne!(random_room_token(), random_room_token());
	}

	#[test]
	fn test_constant_time_eq() {
		assert!(constant_time_eq(b"same-token", b"same-token"));
		assert!(!constant_time_eq(b"same-token", b"same-tokeN"));
		assert!(!constant_time_eq(b"short", b"longer-than-short"));
	}

	#[test]
	fn test_has_control_chars() {
		assert!(!has_control_chars("Demo Room 42"));
		assert!(has_control_chars("evil\x00name"));
		assert!(has_control_chars("tab\there"));
		assert!(has_control_chars("del\x7f"));
	}
}

// vim: ts=4
