//! Document engine: lifecycle and message handling for CRDT documents.
//!
//! Documents are created lazily on first connection, loading any persisted
//! snapshot into a fresh replica. Concurrent first connects converge on a
//! single creation through a pending-creation cell per document name.
//! Updates are persisted debounced; idle documents are destroyed after a
//! grace period with zero clients.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use yrs::sync::{Awareness, AwarenessUpdate, SyncMessage};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::crdt::doc::{ClientTx, ConnId, DocShared};
use crate::crdt::protocol::{self, Frame};
use crate::prelude::*;
use crate::store_adapter::DocStore;

/// How long bursts of updates coalesce before a snapshot write.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(5);
/// Nominal idle grace before a clientless document is destroyed.
pub const IDLE_GRACE: Duration = Duration::from_secs(30);

type PendingCell = Arc<OnceCell<Arc<DocShared>>>;

pub struct CrdtEngine {
	store: Arc<dyn DocStore>,
	docs: DashMap<String, Arc<DocShared>>,
	/// At-most-one-creator map: concurrent connectors for the same name
	/// await the same cell.
	pending: DashMap<String, PendingCell>,
	persist_debounce: Duration,
	idle_grace: Duration,
	connections: AtomicUsize,
}

impl CrdtEngine {
	pub fn new(store: Arc<dyn DocStore>) -> Self {
		Self::with_timing(store, PERSIST_DEBOUNCE, IDLE_GRACE)
	}

	/// Timing-parameterized constructor, used by tests to shrink the
	/// debounce and grace intervals.
	pub fn with_timing(
		store: Arc<dyn DocStore>,
		persist_debounce: Duration,
		idle_grace: Duration,
	) -> Self {
		Self {
			store,
			docs: DashMap::new(),
			pending: DashMap::new(),
			persist_debounce,
			idle_grace,
			connections: AtomicUsize::new(0),
		}
	}

	/// Live WebSocket connections on the document channel.
	pub fn connection_count(&self) -> usize {
		self.connections.load(Ordering::Relaxed)
	}

	/// Loaded (non-idle-destroyed) documents.
	pub fn doc_count(&self) -> usize {
		self.docs.len()
	}

	async fn get_or_create(&self, name: &str) -> SrvResult<Arc<DocShared>> {
		if let Some(doc) = self.docs.get(name) {
			return Ok(doc.value().clone());
		}

		let cell: PendingCell = self
			.pending
			.entry(name.to_string())
			.or_insert_with(|| Arc::new(OnceCell::new()))
			.clone();

		let created = cell
			.get_or_try_init(|| async {
				let replica = Doc::new();
				if let Some(snapshot) = self.store.load_doc(name).await? {
					let mut txn = replica.transact_mut();
					match Update::decode_v1(&snapshot) {
						Ok(update) => {
							if let Err(err) = txn.apply_update(update) {
								warn!("Discarding unusable snapshot for {}: {}", name, err);
							}
						}
						Err(err) => warn!("Discarding corrupt snapshot for {}: {}", name, err),
					}
				}
				let doc = Arc::new(DocShared::new(
					name.to_string(),
					Awareness::new(replica),
				));
				self.docs.insert(name.to_string(), doc.clone());
				Ok::<_, Error>(doc)
			})
			.await
			.cloned();

		self.pending.remove(name);
		created
	}

	/// Register a connection on a document, creating it if needed.
	///
	/// Sends the initial sync step-1 query and, if any awareness states are
	/// known, a full awareness frame. Cancels any pending idle destruction.
	pub async fn connect(
		self: &Arc<Self>,
		name: &str,
		conn: ConnId,
		tx: ClientTx,
	) -> SrvResult<Arc<DocShared>> {
		loop {
			let doc = self.get_or_create(name).await?;
			let mut inner = doc.inner.lock().await;
			if inner.destroyed {
				// Lost a race against idle destruction; retry on a fresh doc
				// once the dying instance has left the map.
				drop(inner);
				tokio::task::yield_now().await;
				continue;
			}
			inner.idle_epoch += 1;
			inner.clients.insert(conn, tx.clone());
			inner.awareness_ids.insert(conn, HashSet::new());

			let sv = inner.awareness.doc().transact().state_vector();
			inner.send_to(conn, protocol::encode_sync(&SyncMessage::SyncStep1(sv)));

			if let Ok(update) = inner.awareness.update() {
				if !update.clients.is_empty() {
					inner.send_to(conn, protocol::encode_awareness(&update.encode_v1()));
				}
			}
			drop(inner);

			self.connections.fetch_add(1, Ordering::Relaxed);
			debug!("Doc connection {} joined {}", conn, name);
			return Ok(doc);
		}
	}

	/// Handle one inbound binary frame from a connection.
	///
	/// Protocol errors are logged and dropped; they never close the socket
	/// or surface to peers.
	pub async fn handle_frame(self: &Arc<Self>, doc: &Arc<DocShared>, conn: ConnId, data: &[u8]) {
		let frame = match protocol::decode_frame(data) {
			Ok(Some(frame)) => frame,
			Ok(None) => return,
			Err(err) => {
				debug!("Dropping undecodable frame on {}: {}", doc.name, err);
				return;
			}
		};

		let result = match frame {
			Frame::Sync(msg) => self.handle_sync(doc, conn, msg).await,
			Frame::Awareness(update) => self.handle_awareness(doc, conn, update).await,
			Frame::FileOp(body) => {
				let inner = doc.inner.lock().await;
				inner.fanout(&protocol::encode_file_op(&body), Some(conn));
				Ok(())
			}
		};
		if let Err(err) = result {
			debug!("Dropping invalid message on {}: {}", doc.name, err);
		}
	}

	async fn handle_sync(
		self: &Arc<Self>,
		doc: &Arc<DocShared>,
		conn: ConnId,
		msg: SyncMessage,
	) -> SrvResult<()> {
		match msg {
			SyncMessage::SyncStep1(sv) => {
				let inner = doc.inner.lock().await;
				let reply = inner.awareness.doc().transact().encode_state_as_update_v1(&sv);
				inner.send_to(conn, protocol::encode_sync(&SyncMessage::SyncStep2(reply.into())));
			}
			SyncMessage::SyncStep2(update) | SyncMessage::Update(update) => {
				let mut inner = doc.inner.lock().await;
				let decoded = Update::decode_v1(&update)?;
				inner
					.awareness
					.doc()
					.transact_mut()
					.apply_update(decoded)
					.map_err(|err| Error::ValidationError(format!("unusable update: {}", err)))?;

				// Fanout in application order, origin excluded. Enqueue under
				// the lock so peers observe updates in the order applied.
				inner.fanout(&protocol::encode_sync(&SyncMessage::Update(update)), Some(conn));

				inner.dirty = true;
				inner.persist_deadline = Instant::now() + self.persist_debounce;
				if !inner.persist_scheduled {
					inner.persist_scheduled = true;
					let engine = self.clone();
					let doc = doc.clone();
					tokio::spawn(async move { engine.persist_after_debounce(doc).await });
				}
			}
		}
		Ok(())
	}

	async fn handle_awareness(
		self: &Arc<Self>,
		doc: &Arc<DocShared>,
		conn: ConnId,
		update: Vec<u8>,
	) -> SrvResult<()> {
		let mut inner = doc.inner.lock().await;
		let decoded = AwarenessUpdate::decode_v1(&update)?;

		// Remember every id this socket has announced so they can be
		// withdrawn on disconnect. Removal entries carry a null state.
		if let Some(ids) = inner.awareness_ids.get_mut(&conn) {
			ids.extend(
				decoded
					.clients
					.iter()
					.filter(|(_, entry)| &*entry.json != "null")
					.map(|(id, _)| *id),
			);
		}
		inner.awareness.apply_update(decoded)?;

		// Awareness goes to every socket including the origin; clients
		// self-filter their own states.
		inner.fanout(&protocol::encode_awareness(&update), None);
		Ok(())
	}

	/// Deregister a connection. Withdraws the awareness ids the socket
	/// announced and, when the document becomes clientless, arms the
	/// idle-destroy timer.
	pub async fn disconnect(self: &Arc<Self>, doc: &Arc<DocShared>, conn: ConnId) {
		let mut inner = doc.inner.lock().await;
		if inner.clients.remove(&conn).is_none() {
			return;
		}
		self.connections.fetch_sub(1, Ordering::Relaxed);

		let ids = inner.awareness_ids.remove(&conn).unwrap_or_default();
		if !ids.is_empty() {
			for id in &ids {
				inner.awareness.remove_state(*id);
			}
			if let Ok(update) = inner.awareness.update_with_clients(ids.iter().copied()) {
				inner.fanout(&protocol::encode_awareness(&update.encode_v1()), None);
			}
		}

		if inner.clients.is_empty() {
			inner.idle_epoch += 1;
			let epoch = inner.idle_epoch;
			let engine = self.clone();
			let doc = doc.clone();
			tokio::spawn(async move { engine.idle_destroy(doc, epoch).await });
		}
		debug!("Doc connection {} left {}", conn, doc.name);
	}

	async fn persist_after_debounce(self: Arc<Self>, doc: Arc<DocShared>) {
		loop {
			let deadline = doc.inner.lock().await.persist_deadline;
			tokio::time::sleep_until(deadline).await;

			let snapshot = {
				let mut inner = doc.inner.lock().await;
				if Instant::now() < inner.persist_deadline {
					// An update moved the deadline while we slept.
					continue;
				}
				inner.persist_scheduled = false;
				if !inner.dirty {
					return;
				}
				inner.dirty = false;
				inner
					.awareness
					.doc()
					.transact()
					.encode_state_as_update_v1(&StateVector::default())
			};

			if let Err(err) = self.store.persist_doc(&doc.name, &snapshot).await {
				warn!("Failed to persist doc {}: {}", doc.name, err);
			}
			return;
		}
	}

	async fn idle_destroy(self: Arc<Self>, doc: Arc<DocShared>, epoch: u64) {
		tokio::time::sleep(self.idle_grace).await;

		let snapshot = {
			let inner = doc.inner.lock().await;
			if !inner.clients.is_empty() || inner.idle_epoch != epoch || inner.destroyed {
				return;
			}
			inner.awareness.doc().transact().encode_state_as_update_v1(&StateVector::default())
		};

		// Final persist happens before the document leaves the map, so a
		// connector arriving right after destruction reloads full state.
		if let Err(err) = self.store.persist_doc(&doc.name, &snapshot).await {
			warn!("Failed final persist for doc {}: {}", doc.name, err);
		}

		let mut inner = doc.inner.lock().await;
		if !inner.clients.is_empty() || inner.idle_epoch != epoch {
			// Arrival during the final persist cancels destruction.
			return;
		}
		inner.destroyed = true;
		drop(inner);

		// Only this instance may be unlinked; a successor under the same
		// name is left alone.
		self.docs.remove_if(&doc.name, |_, candidate| Arc::ptr_eq(candidate, &doc));
		info!("Destroyed idle doc {}", doc.name);
	}

	/// Graceful shutdown: one awaited persist per document, then close
	/// every socket with a normal close code. The store itself is closed
	/// by the caller afterwards.
	pub async fn shutdown(&self) {
		use axum::extract::ws::{CloseFrame, Message, close_code};

		let names: Vec<String> = self.docs.iter().map(|entry| entry.key().clone()).collect();
		for name in names {
			let Some((_, doc)) = self.docs.remove(&name) else { continue };
			let (snapshot, clients) = {
				let mut inner = doc.inner.lock().await;
				inner.destroyed = true;
				let snapshot = inner
					.awareness
					.doc()
					.transact()
					.encode_state_as_update_v1(&StateVector::default());
				let clients: Vec<ClientTx> = inner.clients.drain().map(|(_, tx)| tx).collect();
				inner.awareness_ids.clear();
				(snapshot, clients)
			};

			if let Err(err) = self.store.persist_doc(&name, &snapshot).await {
				warn!("Failed shutdown persist for doc {}: {}", name, err);
			}
			for tx in clients {
				let _ = tx.send(Message::Close(Some(CloseFrame {
					code: close_code::NORMAL,
					reason: "server shutting down".into(),
				})));
			}
		}
	}
}

impl std::fmt::Debug for CrdtEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CrdtEngine")
			.field("docs", &self.docs.len())
			.field("connections", &self.connection_count())
			.finish()
	}
}

// vim: ts=4
