//! Redb-based Document Store Adapter
//!
//! Implements the `DocStore` trait using redb for persistent storage of
//! binary CRDT snapshots and room metadata.
//!
//! # Storage Layout
//!
//! One database file (`liveshare.redb` inside the configured directory)
//! with two tables standing in for the two keyspaces of the store
//! contract:
//! - `docs` - `<roomId>:<docKey>` -> binary CRDT snapshot
//! - `rooms` - room id -> metadata JSON
//!
//! # Key Features
//!
//! - Snapshots are replaced atomically per write transaction
//! - A missing key reads as absent, never as an error
//! - `close()` is idempotent; subsequent operations report a closed store

use async_trait::async_trait;
use parking_lot::Mutex;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use liveshare::error::SrvResult;
use liveshare::store_adapter::DocStore;
use liveshare::types::Room;

mod error;
pub use error::Error;

/// Stores binary CRDT snapshots: doc_name -> snapshot_bytes
const TABLE_DOCS: TableDefinition<&str, &[u8]> = TableDefinition::new("docs");

/// Stores room metadata: room_id -> metadata_json
const TABLE_ROOMS: TableDefinition<&str, &str> = TableDefinition::new("rooms");

const DB_FILE: &str = "liveshare.redb";

/// Document store backed by a single redb database file.
pub struct DocStoreRedb {
	db: Mutex<Option<Arc<redb::Database>>>,
}

impl DocStoreRedb {
	/// Open (or create) the store under `storage_path`.
	pub fn new(storage_path: impl AsRef<Path>) -> Result<Self, Error> {
		let storage_path = storage_path.as_ref();
		std::fs::create_dir_all(storage_path)
			.map_err(|e| Error::IoError(format!("failed to create storage directory: {}", e)))?;

		let db_path = storage_path.join(DB_FILE);
		let db = redb::Database::create(&db_path)
			.map_err(|e| Error::DbError(format!("failed to open database: {}", e)))?;

		// Make sure both tables exist so later reads never fail on a fresh file
		let tx = db
			.begin_write()
			.map_err(|e| Error::DbError(format!("failed to begin write transaction: {}", e)))?;
		let _ = tx.open_table(TABLE_DOCS);
		let _ = tx.open_table(TABLE_ROOMS);
		tx.commit()
			.map_err(|e| Error::DbError(format!("failed to commit table creation: {}", e)))?;

		debug!("Opened document store at {:?}", db_path);
		Ok(Self { db: Mutex::new(Some(Arc::new(db))) })
	}

	fn database(&self) -> Result<Arc<redb::Database>, Error> {
		self.db.lock().clone().ok_or(Error::Closed)
	}
}

#[async_trait]
impl DocStore for DocStoreRedb {
	async fn load_doc(&self, name: &str) -> SrvResult<Option<Vec<u8>>> {
		let db = self.database()?;
		let tx = db
			.begin_read()
			.map_err(|e| Error::DbError(format!("failed to begin read transaction: {}", e)))?;
		let table = tx
			.open_table(TABLE_DOCS)
			.map_err(|e| Error::DbError(format!("failed to open docs table: {}", e)))?;

		let snapshot = table
			.get(name)
			.map_err(|e| Error::DbError(format!("failed to read doc: {}", e)))?
			.map(|value| value.value().to_vec());

		trace!("Loaded doc {} ({:?} bytes)", name, snapshot.as_ref().map(Vec::len));
		Ok(snapshot)
	}

	async fn persist_doc(&self, name: &str, data: &[u8]) -> SrvResult<()> {
		let db = self.database()?;
		let tx = db
			.begin_write()
			.map_err(|e| Error::DbError(format!("failed to begin write transaction: {}", e)))?;
		{
			let mut table = tx
				.open_table(TABLE_DOCS)
				.map_err(|e| Error::DbError(format!("failed to open docs table: {}", e)))?;
			table
				.insert(name, data)
				.map_err(|e| Error::DbError(format!("failed to write doc: {}", e)))?;
		}
		tx.commit().map_err(|e| Error::DbError(format!("failed to commit doc: {}", e)))?;

		trace!("Persisted doc {} ({} bytes)", name, data.len());
		Ok(())
	}

	async fn load_all_rooms(&self) -> SrvResult<Vec<Room>> {
		let db = self.database()?;
		let tx = db
			.begin_read()
			.map_err(|e| Error::DbError(format!("failed to begin read transaction: {}", e)))?;
		let table = tx
			.open_table(TABLE_ROOMS)
			.map_err(|e| Error::DbError(format!("failed to open rooms table: {}", e)))?;

		let mut rooms = Vec::new();
		let iter =
			table.iter().map_err(|e| Error::DbError(format!("failed to read rooms: {}", e)))?;
		for item in iter {
			let (key, value) =
				item.map_err(|e| Error::DbError(format!("failed to iterate rooms: {}", e)))?;
			match serde_json::from_str::<Room>(value.value()) {
				Ok(room) => rooms.push(room),
				// A single corrupt record must not take the server down
				Err(err) => warn!("Skipping unreadable room {}: {}", key.value(), err),
			}
		}

		debug!("Loaded {} room(s)", rooms.len());
		Ok(rooms)
	}

	async fn save_room(&self, room: &Room) -> SrvResult<()> {
		let json = serde_json::to_string(room)
			.map_err(|e| Error::DbError(format!("failed to serialize room: {}", e)))?;

		let db = self.database()?;
		let tx = db
			.begin_write()
			.map_err(|e| Error::DbError(format!("failed to begin write transaction: {}", e)))?;
		{
			let mut table = tx
				.open_table(TABLE_ROOMS)
				.map_err(|e| Error::DbError(format!("failed to open rooms table: {}", e)))?;
			table
				.insert(room.id.as_ref(), json.as_str())
				.map_err(|e| Error::DbError(format!("failed to write room: {}", e)))?;
		}
		tx.commit().map_err(|e| Error::DbError(format!("failed to commit room: {}", e)))?;
		Ok(())
	}

	async fn delete_room(&self, id: &str) -> SrvResult<()> {
		let db = self.database()?;
		let tx = db
			.begin_write()
			.map_err(|e| Error::DbError(format!("failed to begin write transaction: {}", e)))?;
		{
			let mut table = tx
				.open_table(TABLE_ROOMS)
				.map_err(|e| Error::DbError(format!("failed to open rooms table: {}", e)))?;
			table
				.remove(id)
				.map_err(|e| Error::DbError(format!("failed to delete room: {}", e)))?;
		}
		tx.commit().map_err(|e| Error::DbError(format!("failed to commit deletion: {}", e)))?;
		Ok(())
	}

	async fn close(&self) -> SrvResult<()> {
		// Dropping the last Arc releases the file handle; repeated calls
		// find the slot already empty.
		if self.db.lock().take().is_some() {
			debug!("Closed document store");
		}
		Ok(())
	}
}

impl std::fmt::Debug for DocStoreRedb {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocStoreRedb")
			.field("open", &self.db.lock().is_some())
			.finish()
	}
}

// vim: ts=4
