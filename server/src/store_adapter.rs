//! Document Store Adapter
//!
//! Trait and types for pluggable persistence backends holding CRDT document
//! snapshots and room metadata in one embedded key-value store.
//!
//! The adapter handles:
//! - Binary document snapshots (`doc:<name>` keyspace)
//! - Room metadata as JSON (`room:<id>` keyspace)
//! - Clean shutdown of the underlying store
//!
//! A missing key is a normal condition, never an error: `load_doc` returns
//! `None` and `load_all_rooms` returns an empty list for a fresh store.
//! `close` must be idempotent; the server calls it exactly once on shutdown,
//! but adapters must tolerate repeated calls.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::Room;

/// Document store trait.
///
/// Unified interface for snapshot persistence. The server treats snapshot
/// bytes as opaque; reconstructing a replica from them is the CRDT engine's
/// concern.
#[async_trait]
pub trait DocStore: Debug + Send + Sync {
	/// Load the persisted snapshot for a document, if any.
	async fn load_doc(&self, name: &str) -> SrvResult<Option<Vec<u8>>>;

	/// Persist a full snapshot for a document, replacing any previous one.
	async fn persist_doc(&self, name: &str, data: &[u8]) -> SrvResult<()>;

	/// Load every persisted room. Used once at startup to hydrate the registry.
	async fn load_all_rooms(&self) -> SrvResult<Vec<Room>>;

	/// Persist room metadata, replacing any previous record.
	async fn save_room(&self, room: &Room) -> SrvResult<()>;

	/// Delete a room record. Deleting an absent room is not an error.
	async fn delete_room(&self, id: &str) -> SrvResult<()>;

	/// Flush and close the underlying store.
	async fn close(&self) -> SrvResult<()>;
}

/// In-memory store with the same contract, for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemDocStore {
	docs: RwLock<HashMap<String, Vec<u8>>>,
	rooms: RwLock<HashMap<String, Room>>,
}

impl MemDocStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of persisted documents (test helper).
	pub fn doc_count(&self) -> usize {
		self.docs.read().len()
	}
}

#[async_trait]
impl DocStore for MemDocStore {
	async fn load_doc(&self, name: &str) -> SrvResult<Option<Vec<u8>>> {
		Ok(self.docs.read().get(name).cloned())
	}

	async fn persist_doc(&self, name: &str, data: &[u8]) -> SrvResult<()> {
		self.docs.write().insert(name.to_string(), data.to_vec());
		Ok(())
	}

	async fn load_all_rooms(&self) -> SrvResult<Vec<Room>> {
		Ok(self.rooms.read().values().cloned().collect())
	}

	async fn save_room(&self, room: &Room) -> SrvResult<()> {
		self.rooms.write().insert(room.id.to_string(), room.clone());
		Ok(())
	}

	async fn delete_room(&self, id: &str) -> SrvResult<()> {
		self.rooms.write().remove(id);
		Ok(())
	}

	async fn close(&self) -> SrvResult<()> {
		Ok(())
	}
}


// vim: ts=4
