//! Control engine: JSON message routing per room.
//!
//! Implements the room control plane: presence, file operations, guest
//! approval, kick, summon, and focus/follow relays. Authorization failures
//! (non-host kick or approval, read-only file-op, unapproved broadcast)
//! drop the message silently; the sender learns nothing.

use axum::extract::ws::{CloseFrame, Message, close_code};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::control::message::{ControlKind, ServerMessage, str_field};
use crate::control::room::{ConnId, ControlPeer, ControlRoom, PeerTx};
use crate::prelude::*;
use crate::types::{Permission, Room};

pub struct ControlEngine {
	rooms: DashMap<String, Arc<ControlRoom>>,
	connections: AtomicUsize,
}

impl Default for ControlEngine {
	fn default() -> Self {
		Self::new()
	}
}

impl ControlEngine {
	pub fn new() -> Self {
		Self { rooms: DashMap::new(), connections: AtomicUsize::new(0) }
	}

	/// Live WebSocket connections on the control channel.
	pub fn connection_count(&self) -> usize {
		self.connections.load(Ordering::Relaxed)
	}

	pub fn room_count(&self) -> usize {
		self.rooms.len()
	}

	/// Register a connection, creating the control room on first arrival.
	///
	/// The peer starts unidentified, with the room's default permission and
	/// pre-approved unless the room requires approval.
	pub async fn connect(&self, room_meta: &Room, conn: ConnId, tx: PeerTx) -> Arc<ControlRoom> {
		loop {
			let croom = self
				.rooms
				.entry(room_meta.id.to_string())
				.or_insert_with(|| Arc::new(ControlRoom::new(room_meta.id.to_string())))
				.value()
				.clone();

			croom.inner.lock().await.peers.insert(
				conn,
				ControlPeer {
					user_id: String::new(),
					display_name: String::new(),
					is_host: false,
					approved: !room_meta.require_approval,
					permission: room_meta.default_permission.unwrap_or_default(),
					tx: tx.clone(),
				},
			);

			// The room may have been dropped by a concurrent last-leave
			// between lookup and registration; make sure the map points at
			// the instance we registered into.
			let current = self
				.rooms
				.entry(room_meta.id.to_string())
				.or_insert_with(|| croom.clone())
				.value()
				.clone();
			if Arc::ptr_eq(&current, &croom) {
				self.connections.fetch_add(1, Ordering::Relaxed);
				debug!("Control connection {} joined room {}", conn, room_meta.id);
				return croom;
			}
			croom.inner.lock().await.peers.remove(&conn);
		}
	}

	/// Route one inbound text message.
	pub async fn handle_message(
		&self,
		room_meta: &Room,
		croom: &Arc<ControlRoom>,
		conn: ConnId,
		text: &str,
	) {
		let Ok(msg) = serde_json::from_str::<Value>(text) else {
			return;
		};
		if !msg.is_object() {
			return;
		}
		let Some(kind) = msg.get("type").and_then(Value::as_str).and_then(ControlKind::parse)
		else {
			return;
		};

		let mut guard = croom.inner.lock().await;
		let state = &mut *guard;

		match kind {
			ControlKind::JoinRequest => {
				let user_id = str_field(&msg, "userId").to_string();
				let display_name = str_field(&msg, "displayName").to_string();
				let Some(peer) = state.peers.get_mut(&conn) else { return };
				peer.user_id = user_id.clone();
				if !display_name.is_empty() {
					peer.display_name = display_name;
				}
				if room_meta.require_approval {
					peer.approved = false;
					if !user_id.is_empty() {
						state.pending_approvals.insert(user_id, conn);
					}
					// The request travels to the host as-is, avatar and all.
					state.send_to_hosts(text);
				} else {
					peer.approved = true;
					let permission = peer.permission;
					state.send_to(
						conn,
						ServerMessage::JoinResponse { approved: true, permission: Some(permission) }
							.to_json(),
					);
				}
			}

			ControlKind::JoinResponse => {
				if !state.peers.get(&conn).is_some_and(|p| p.is_host) {
					return;
				}
				let target_user = str_field(&msg, "userId");
				let Some(target_conn) = state.pending_approvals.remove(target_user) else {
					return;
				};
				let approved = msg.get("approved").and_then(Value::as_bool).unwrap_or(false);
				let permission = msg
					.get("permission")
					.and_then(|v| serde_json::from_value::<Permission>(v.clone()).ok());
				let Some(target) = state.peers.get_mut(&target_conn) else { return };
				target.approved = approved;
				if let Some(permission) = permission {
					target.permission = permission;
				}
				let effective = target.permission;
				state.send_to(
					target_conn,
					ServerMessage::JoinResponse { approved, permission: Some(effective) }.to_json(),
				);
			}

			ControlKind::Kick => {
				if !state.peers.get(&conn).is_some_and(|p| p.is_host) {
					return;
				}
				let target = str_field(&msg, "userId");
				if target.is_empty() {
					return;
				}
				for peer in state.peers.values().filter(|p| p.user_id == target) {
					let _ = peer.tx.send(Message::Text(ServerMessage::Kicked.to_json().into()));
					let _ = peer.tx.send(Message::Close(Some(CloseFrame {
						code: close_code::NORMAL,
						reason: "kicked".into(),
					})));
				}
			}

			ControlKind::FileOp => {
				let Some(sender) = state.peers.get(&conn) else { return };
				if !sender.approved || !sender.permission.can_edit() {
					return;
				}
				state.broadcast(text, Some(conn));
			}

			ControlKind::Summon => {
				let Some(sender) = state.peers.get(&conn) else { return };
				if !sender.approved {
					return;
				}
				let target = str_field(&msg, "targetUserId");
				if !target.is_empty() && target != "__all__" {
					for peer in state.peers.values().filter(|p| p.user_id == target) {
						let _ = peer.tx.send(Message::Text(text.to_string().into()));
					}
				} else {
					state.broadcast(text, Some(conn));
				}
			}

			ControlKind::PresenceUpdate => {
				let announced = str_field(&msg, "userId").to_string();
				let display_name = str_field(&msg, "displayName").to_string();
				let Some(peer) = state.peers.get_mut(&conn) else { return };

				if peer.user_id.is_empty() && !announced.is_empty() {
					// First self-announce decides host-ness: a pinned host id
					// wins, otherwise the first identified peer takes the
					// role. Once host, always host.
					let is_host = match room_meta.host_user_id.as_deref() {
						Some(host_id) => announced == host_id,
						None => !state.host_claimed,
					};
					if is_host {
						peer.is_host = true;
						peer.approved = true;
						state.host_claimed = true;
					}
				}
				peer.user_id = announced;
				if !display_name.is_empty() {
					peer.display_name = display_name;
				}
				let approved = peer.approved;
				if approved {
					state.broadcast(text, Some(conn));
				}
			}

			ControlKind::FollowUpdate | ControlKind::SessionEnd | ControlKind::FocusRequest => {
				if !state.peers.get(&conn).is_some_and(|p| p.approved) {
					return;
				}
				state.broadcast(text, Some(conn));
			}
		}
	}

	/// Deregister a connection; announces the departure and drops the room
	/// when it empties.
	pub async fn disconnect(&self, croom: &Arc<ControlRoom>, conn: ConnId) {
		let emptied = {
			let mut guard = croom.inner.lock().await;
			let state = &mut *guard;
			let Some(peer) = state.peers.remove(&conn) else {
				return;
			};
			self.connections.fetch_sub(1, Ordering::Relaxed);
			state.pending_approvals.retain(|_, pending| *pending != conn);
			if !peer.user_id.is_empty() {
				state.broadcast(
					&ServerMessage::PresenceLeave { user_id: peer.user_id }.to_json(),
					None,
				);
			}
			state.peers.is_empty()
		};

		if emptied {
			self.rooms.remove_if(&croom.room_id, |_, room| {
				Arc::ptr_eq(room, croom)
					&& room.inner.try_lock().map(|g| g.peers.is_empty()).unwrap_or(false)
			});
			debug!("Control room {} emptied", croom.room_id);
		}
	}
}

impl std::fmt::Debug for ControlEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ControlEngine")
			.field("rooms", &self.rooms.len())
			.field("connections", &self.connection_count())
			.finish()
	}
}

// vim: ts=4
