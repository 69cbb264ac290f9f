//! Wire framing for the binary document channel.
//!
//! Every WebSocket message is a lib0-encoded frame: a varint message type
//! followed by the body. Types 0 and 1 follow the Yjs sync protocol (sync
//! sub-message, length-prefixed awareness update); type 2 carries an opaque
//! file-operation body that is relayed verbatim. Unknown types are dropped
//! without closing the connection.

use yrs::encoding::read::{Cursor, Read};
use yrs::sync::SyncMessage;
use yrs::sync::protocol::{MSG_AWARENESS, MSG_SYNC};
use yrs::updates::decoder::{Decode, DecoderV1};
use yrs::updates::encoder::{Encode, Encoder, EncoderV1};
use yrs::encoding::write::Write;

use crate::prelude::*;

/// Relay-specific message type carrying an opaque file operation.
pub const MSG_FILE_OP: u8 = 2;

/// A decoded inbound frame.
#[derive(Debug)]
pub enum Frame {
	/// Yjs sync protocol sub-message (step-1 query, step-2 reply, update).
	Sync(SyncMessage),
	/// Encoded awareness update bytes (kept encoded; the engine decodes
	/// only to track client ids).
	Awareness(Vec<u8>),
	/// Opaque file-op body, relayed verbatim to document peers.
	FileOp(Vec<u8>),
}

/// Decode one inbound frame. Returns `Ok(None)` for unknown message types,
/// which the caller drops silently.
pub fn decode_frame(data: &[u8]) -> SrvResult<Option<Frame>> {
	// All known tags fit in a single varint byte; a multi-byte varint can
	// only encode an unknown type.
	let Some(&tag) = data.first() else {
		return Ok(None);
	};
	let body = &data[1..];
	match tag {
		MSG_SYNC => Ok(Some(Frame::Sync(SyncMessage::decode_v1(body)?))),
		MSG_AWARENESS => {
			let mut decoder = DecoderV1::new(Cursor::new(body));
			Ok(Some(Frame::Awareness(decoder.read_buf()?.to_vec())))
		}
		MSG_FILE_OP => Ok(Some(Frame::FileOp(body.to_vec()))),
		_ => Ok(None),
	}
}

pub fn encode_sync(msg: &SyncMessage) -> Vec<u8> {
	let mut encoder = EncoderV1::new();
	encoder.write_var(MSG_SYNC);
	msg.encode(&mut encoder);
	encoder.to_vec()
}

pub fn encode_awareness(update: &[u8]) -> Vec<u8> {
	let mut encoder = EncoderV1::new();
	encoder.write_var(MSG_AWARENESS);
	encoder.write_buf(update);
	encoder.to_vec()
}

pub fn encode_file_op(body: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(body.len() + 1);
	out.push(MSG_FILE_OP);
	out.extend_from_slice(body);
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use yrs::StateVector;
	use yrs::sync::AwarenessUpdate;

	#[test]
	fn test_sync_step1_roundtrip() {
		let frame = encode_sync(&SyncMessage::SyncStep1(StateVector::default()));
		match decode_frame(&frame).unwrap() {
			Some(Frame::Sync(SyncMessage::SyncStep1(sv))) => {
				assert_eq!(sv, StateVector::default());
			}
			other => panic!("unexpected frame: {:?}", other),
		}
	}

	#[test]
	fn test_sync_update_roundtrip() {
		let update = vec![0u8; 16];
		let frame = encode_sync(&SyncMessage::Update(update.clone().into()));
		match decode_frame(&frame).unwrap() {
			Some(Frame::Sync(SyncMessage::Update(u))) => assert_eq!(<Vec<u8> as AsRef<[u8]>>::as_ref(&u), &update[..]),
			other => panic!("unexpected frame: {:?}", other),
		}
	}

	#[test]
	fn test_awareness_roundtrip() {
		let update = AwarenessUpdate { clients: Default::default() };
		let bytes = update.encode_v1();
		let frame = encode_awareness(&bytes);
		match decode_frame(&frame).unwrap() {
			Some(Frame::Awareness(body)) => assert_eq!(body, bytes),
			other => panic!("unexpected frame: {:?}", other),
		}
	}

	#[test]
	fn test_file_op_passthrough() {
		let body = br#"{"type":"create","path":"test.md"}"#;
		let frame = encode_file_op(body);
		assert_eq!(frame[0], MSG_FILE_OP);
		match decode_frame(&frame).unwrap() {
			Some(Frame::FileOp(b)) => assert_eq!(b, body),
			other => panic!("unexpected frame: {:?}", other),
		}
	}

	#[test]
	fn test_unknown_type_dropped() {
		assert!(decode_frame(&[9, 1, 2, 3]).unwrap().is_none());
		assert!(decode_frame(&[0x85, 0x01]).unwrap().is_none());
	}

	#[test]
	fn test_empty_message_dropped() {
		assert!(decode_frame(&[]).unwrap().is_none());
	}

	#[test]
	fn test_truncated_sync_is_error() {
		// Type byte says sync but the body is not a valid sub-message
		assert!(decode_frame(&[MSG_SYNC]).is_err());
	}
}

// vim: ts=4
