//! WebSocket upgrade gateway.
//!
//! Routes upgrades to the two protocol engines:
//! - `/ws/{docName}` - binary document channel (one connection per document)
//! - `/control/{roomId}` - JSON control channel (one connection per room)
//!
//! Authentication happens before the handoff: the room token from the query
//! string is compared in constant time, and - when the deployment requires
//! it - the identity token is verified. Failures complete the upgrade and
//! immediately close the socket with a 44xx close code, so an unauthorized
//! client never reaches an engine.

use axum::{
	extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
	extract::{Path, Query, State},
	response::Response,
};
use futures::SinkExt;
use serde::Deserialize;

use crate::control;
use crate::crdt;
use crate::prelude::*;
use crate::types::Room;

/// Frame cap on the binary document channel.
pub const DOC_MAX_FRAME: usize = 10 * 1024 * 1024;
/// Frame cap on the JSON control channel.
pub const CONTROL_MAX_FRAME: usize = 1024 * 1024;

/// Query parameters accepted on both WebSocket routes.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
	/// Room token; required.
	pub token: Option<String>,
	/// Identity token; required when identity auth is enabled.
	pub jwt: Option<String>,
}

/// Helper to close a just-upgraded WebSocket with an error code
async fn close_with_error(mut socket: WebSocket, code: u16, reason: &'static str) {
	let _ = socket
		.send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
		.await;
	let _ = socket.close().await;
}

/// Check room token and (optionally) identity before handing the socket off.
fn authenticate(app: &App, room_id: &str, query: &WsQuery) -> Result<Room, (u16, &'static str)> {
	let Some(room) = app.registry.get(room_id) else {
		return Err((4404, "Unknown room"));
	};
	let authenticated = query
		.token
		.as_deref()
		.map(|token| crate::core::utils::constant_time_eq(room.token.as_bytes(), token.as_bytes()))
		.unwrap_or(false);
	if !authenticated {
		return Err((4403, "Invalid room token"));
	}

	if app.opts.require_identity {
		let Some(verifier) = app.identity.as_ref() else {
			return Err((4401, "Identity verification unavailable"));
		};
		let Some(jwt) = query.jwt.as_deref() else {
			return Err((4401, "Identity token required"));
		};
		if verifier.verify(jwt).is_err() {
			return Err((4401, "Invalid identity token"));
		}
	}

	Ok(room)
}

/// WebSocket upgrade handler for the document channel
///
/// Route: `/ws/{*doc_name}` where the document name is `<roomId>:<docKey>`.
/// The base room id is the substring before the first `:`.
pub async fn get_ws_doc(
	ws: WebSocketUpgrade,
	Path(doc_name): Path<String>,
	Query(query): Query<WsQuery>,
	State(app): State<App>,
) -> Response {
	let ws = ws.max_message_size(DOC_MAX_FRAME);
	let room_id = doc_name.split(':').next().unwrap_or_default().to_string();

	match authenticate(&app, &room_id, &query) {
		Ok(_room) => {
			debug!("Doc WebSocket accepted: {}", doc_name);
			let engine = app.crdt.clone();
			ws.on_upgrade(move |socket| {
				crdt::websocket::handle_doc_connection(socket, engine, doc_name)
			})
		}
		Err((code, reason)) => {
			warn!("Doc WebSocket rejected ({}): {}", code, reason);
			ws.on_upgrade(move |socket| close_with_error(socket, code, reason))
		}
	}
}

/// WebSocket upgrade handler for the control channel
///
/// Route: `/control/{room_id}`
pub async fn get_ws_control(
	ws: WebSocketUpgrade,
	Path(room_id): Path<String>,
	Query(query): Query<WsQuery>,
	State(app): State<App>,
) -> Response {
	let ws = ws.max_message_size(CONTROL_MAX_FRAME);

	match authenticate(&app, &room_id, &query) {
		Ok(room) => {
			debug!("Control WebSocket accepted: room {}", room_id);
			let engine = app.control.clone();
			ws.on_upgrade(move |socket| {
				control::websocket::handle_control_connection(socket, engine, room)
			})
		}
		Err((code, reason)) => {
			warn!("Control WebSocket rejected ({}): {}", code, reason);
			ws.on_upgrade(move |socket| close_with_error(socket, code, reason))
		}
	}
}

// vim: ts=4
