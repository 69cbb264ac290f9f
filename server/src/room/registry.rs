//! Room registry.
//!
//! In-memory map of rooms, hydrated from the store at startup and owned by
//! the application state. Rooms are the unit of authentication: one token
//! authorizes the documents under a room and its control channel.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::utils::{constant_time_eq, has_control_chars, random_room_id, random_room_token};
use crate::prelude::*;
use crate::store_adapter::DocStore;
use crate::types::{Permission, Room};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_HOST_ID_LEN: usize = 128;

pub struct Registry {
	store: Arc<dyn DocStore>,
	rooms: RwLock<HashMap<String, Room>>,
}

/// Validated input for room creation.
#[derive(Debug, Default)]
pub struct CreateRoom {
	pub name: String,
	pub host_user_id: Option<String>,
	pub require_approval: bool,
	pub default_permission: Option<Permission>,
	pub participants: Option<Vec<String>>,
}

impl Registry {
	pub fn new(store: Arc<dyn DocStore>) -> Self {
		Self { store, rooms: RwLock::new(HashMap::new()) }
	}

	/// Load every persisted room into the map. Called once at startup.
	pub async fn hydrate(&self) -> SrvResult<()> {
		let loaded = self.store.load_all_rooms().await?;
		let count = loaded.len();
		let mut rooms = self.rooms.write();
		for room in loaded {
			rooms.insert(room.id.to_string(), room);
		}
		drop(rooms);
		info!("Loaded {} room(s) from store", count);
		Ok(())
	}

	pub fn count(&self) -> usize {
		self.rooms.read().len()
	}

	pub fn get(&self, id: &str) -> Option<Room> {
		self.rooms.read().get(id).cloned()
	}

	/// Look up a room and check its token in constant time.
	pub fn authenticate(&self, id: &str, token: &str) -> SrvResult<Room> {
		let room = self.get(id).ok_or(Error::NotFound)?;
		if !constant_time_eq(room.token.as_bytes(), token.as_bytes()) {
			return Err(Error::PermissionDenied);
		}
		Ok(room)
	}

	/// Create a room with a fresh id and token, persisting it before it
	/// becomes visible.
	pub async fn create(&self, input: CreateRoom) -> SrvResult<Room> {
		validate_label(&input.name, MAX_NAME_LEN, "name")?;
		if let Some(host) = &input.host_user_id {
			validate_label(host, MAX_HOST_ID_LEN, "hostUserId")?;
		}

		let room = Room {
			id: random_room_id().into(),
			token: random_room_token().into(),
			name: input.name.into(),
			created_at: Timestamp::now(),
			host_user_id: input.host_user_id.map(Into::into),
			require_approval: input.require_approval,
			default_permission: input.default_permission,
			participants: input
				.participants
				.map(|list| list.into_iter().map(Into::into).collect()),
		};

		self.store.save_room(&room).await?;
		self.rooms.write().insert(room.id.to_string(), room.clone());
		info!("Created room {} ({})", room.id, room.name);
		Ok(room)
	}

	/// Delete a room; the bearer token must match.
	pub async fn delete(&self, id: &str, token: &str) -> SrvResult<()> {
		self.authenticate(id, token)?;
		self.store.delete_room(id).await?;
		self.rooms.write().remove(id);
		info!("Deleted room {}", id);
		Ok(())
	}
}

fn validate_label(value: &str, max_len: usize, what: &str) -> SrvResult<()> {
	if value.is_empty() {
		return Err(Error::ValidationError(format!("{} must not be empty", what)));
	}
	if value.len() > max_len {
		return Err(Error::ValidationError(format!("{} exceeds {} bytes", what, max_len)));
	}
	if has_control_chars(value) {
		return Err(Error::ValidationError(format!("{} contains control characters", what)));
	}
	Ok(())
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry").field("rooms", &self.count()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store_adapter::MemDocStore;

	fn registry() -> Registry {
		Registry::new(Arc::new(MemDocStore::new()))
	}

	#[tokio::test]
	async fn test_create_and_lookup() {
		let reg = registry();
		let room = reg
			.create(CreateRoom { name: "demo".into(), ..Default::default() })
			.await
			.unwrap();
		assert!(room.id.len() >= 12);
		assert!(room.token.len() >= 24);
		assert_eq!(reg.get(&room.id).unwrap().name.as_ref(), "demo");
	}

	#[tokio::test]
	async fn test_name_validation() {
		let reg = registry();
		let too_long = "x".repeat(MAX_NAME_LEN + 1);
		for bad in ["", "bad\x00name", too_long.as_str()] {
			let res = reg.create(CreateRoom { name: bad.into(), ..Default::default() }).await;
			assert!(matches!(res, Err(Error::ValidationError(_))), "accepted {:?}", bad);
		}
	}

	#[tokio::test]
	async fn test_host_id_validation() {
		let reg = registry();
		let res = reg
			.create(CreateRoom {
				name: "ok".into(),
				host_user_id: Some("evil\x1fhost".into()),
				..Default::default()
			})
			.await;
		assert!(matches!(res, Err(Error::ValidationError(_))));
	}

	#[tokio::test]
	async fn test_authenticate() {
		let reg = registry();
		let room =
			reg.create(CreateRoom { name: "demo".into(), ..Default::default() }).await.unwrap();
		assert!(reg.authenticate(&room.id, &room.token).is_ok());
		assert!(matches!(
			reg.authenticate(&room.id, "wrong-token"),
			Err(Error::PermissionDenied)
		));
		assert!(matches!(reg.authenticate("nosuchroom12345", &room.token), Err(Error::NotFound)));
	}

	#[tokio::test]
	async fn test_delete_requires_token() {
		let reg = registry();
		let room =
			reg.create(CreateRoom { name: "demo".into(), ..Default::default() }).await.unwrap();
		assert!(matches!(reg.delete(&room.id, "bogus").await, Err(Error::PermissionDenied)));
		reg.delete(&room.id, &room.token).await.unwrap();
		assert!(reg.get(&room.id).is_none());
	}

	#[tokio::test]
	async fn test_hydrate_restores_rooms() {
		let store = Arc::new(MemDocStore::new());
		let reg = Registry::new(store.clone());
		let room =
			reg.create(CreateRoom { name: "demo".into(), ..Default::default() }).await.unwrap();

		let reg2 = Registry::new(store);
		reg2.hydrate().await.unwrap();
		assert_eq!(reg2.get(&room.id).unwrap().token, room.token);
	}
}

// vim: ts=4
