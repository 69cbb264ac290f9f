//! Per-document shared state.
//!
//! A document owns its CRDT replica (wrapped by the awareness instance),
//! the set of connected client senders, and the awareness client-ids each
//! socket has announced. The whole unit is guarded by one async mutex:
//! apply-update and fanout-enqueue happen under the same critical section,
//! which serializes updates within a document. Enqueueing to the unbounded
//! per-connection channels is non-blocking, so the lock is never held
//! across socket I/O.

use axum::extract::ws::Message;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use uuid::Uuid;
use yrs::block::ClientID;
use yrs::sync::Awareness;

pub type ConnId = Uuid;

/// Sender half of a document connection. The connection task forwards
/// whatever is enqueued here to the WebSocket sink.
pub type ClientTx = mpsc::UnboundedSender<Message>;

pub struct DocShared {
	/// Composite document name: `<roomId>:<docKey>`.
	pub name: String,
	pub(super) inner: Mutex<DocInner>,
}

pub(super) struct DocInner {
	pub awareness: Awareness,
	pub clients: HashMap<ConnId, ClientTx>,
	/// Awareness client-ids ever announced per socket, withdrawn on disconnect.
	pub awareness_ids: HashMap<ConnId, HashSet<ClientID>>,
	/// Unpersisted updates exist.
	pub dirty: bool,
	/// A persist task is sleeping towards `persist_deadline`.
	pub persist_scheduled: bool,
	pub persist_deadline: Instant,
	/// Bumped on every arrival; an idle-destroy timer only fires if the
	/// epoch it captured is still current.
	pub idle_epoch: u64,
	/// Set once the document has been torn down; connectors seeing this
	/// retry against a fresh instance.
	pub destroyed: bool,
}

impl DocShared {
	pub(super) fn new(name: String, awareness: Awareness) -> Self {
		Self {
			name,
			inner: Mutex::new(DocInner {
				awareness,
				clients: HashMap::new(),
				awareness_ids: HashMap::new(),
				dirty: false,
				persist_scheduled: false,
				persist_deadline: Instant::now(),
				idle_epoch: 0,
				destroyed: false,
			}),
		}
	}
}

impl DocInner {
	/// Enqueue a frame to every client except `skip`.
	pub fn fanout(&self, frame: &[u8], skip: Option<ConnId>) {
		for (id, tx) in &self.clients {
			if Some(*id) == skip {
				continue;
			}
			// A failed send means the receiver task is gone; the socket is
			// cleaned up on its own disconnect path.
			let _ = tx.send(Message::Binary(frame.to_vec().into()));
		}
	}

	/// Enqueue a frame to a single client.
	pub fn send_to(&self, conn: ConnId, frame: Vec<u8>) {
		if let Some(tx) = self.clients.get(&conn) {
			let _ = tx.send(Message::Binary(frame.into()));
		}
	}
}

// vim: ts=4
