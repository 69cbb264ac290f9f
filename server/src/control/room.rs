//! Per-room control channel state.
//!
//! A control room exists while at least one socket is connected; all of its
//! state is ephemeral. The peer map and the pending-approval map form one
//! unit under a single async mutex, with the same locking discipline as the
//! document engine: enqueueing outbound messages is non-blocking, so the
//! lock never spans socket I/O.

use axum::extract::ws::Message;
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::types::Permission;

pub type ConnId = Uuid;
pub type PeerTx = mpsc::UnboundedSender<Message>;

pub struct ControlPeer {
	/// Announced user id; empty until the first self-announce.
	pub user_id: String,
	pub display_name: String,
	pub is_host: bool,
	pub approved: bool,
	pub permission: Permission,
	pub tx: PeerTx,
}

pub struct ControlRoom {
	pub room_id: String,
	pub(super) inner: Mutex<ControlRoomInner>,
}

pub(super) struct ControlRoomInner {
	pub peers: HashMap<ConnId, ControlPeer>,
	/// Guests awaiting a host decision, keyed by their announced user id.
	pub pending_approvals: HashMap<String, ConnId>,
	/// Set once some peer has become host through the first-to-identify
	/// fallback; later arrivals stay guests.
	pub host_claimed: bool,
}

impl ControlRoom {
	pub(super) fn new(room_id: String) -> Self {
		Self {
			room_id,
			inner: Mutex::new(ControlRoomInner {
				peers: HashMap::new(),
				pending_approvals: HashMap::new(),
				host_claimed: false,
			}),
		}
	}
}

impl ControlRoomInner {
	/// Relay a JSON payload to every approved peer except `skip`.
	pub fn broadcast(&self, payload: &str, skip: Option<ConnId>) {
		for (id, peer) in &self.peers {
			if Some(*id) == skip || !peer.approved {
				continue;
			}
			let _ = peer.tx.send(Message::Text(payload.to_string().into()));
		}
	}

	/// Send a JSON payload to one peer.
	pub fn send_to(&self, conn: ConnId, payload: String) {
		if let Some(peer) = self.peers.get(&conn) {
			let _ = peer.tx.send(Message::Text(payload.into()));
		}
	}

	/// Relay a JSON payload to every connected host socket.
	pub fn send_to_hosts(&self, payload: &str) {
		for peer in self.peers.values().filter(|p| p.is_host) {
			let _ = peer.tx.send(Message::Text(payload.to_string().into()));
		}
	}
}

// vim: ts=4
