//! REST handlers for room lifecycle and the health probe.

use axum::{
	Json,
	extract::{Path, State},
	http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::room::registry::CreateRoom;
use crate::types::Permission;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomReq {
	pub name: String,
	#[serde(default)]
	pub host_user_id: Option<String>,
	#[serde(default)]
	pub require_approval: bool,
	#[serde(default)]
	pub default_permission: Option<Permission>,
	#[serde(default)]
	pub participants: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomRes {
	pub id: Box<str>,
	pub token: Box<str>,
	pub name: Box<str>,
}

/// `POST /rooms` - create a room. The response is the only place the token
/// ever leaves the server.
pub async fn post_room(
	State(app): State<App>,
	Json(req): Json<CreateRoomReq>,
) -> SrvResult<(StatusCode, Json<CreateRoomRes>)> {
	let room = app
		.registry
		.create(CreateRoom {
			name: req.name,
			host_user_id: req.host_user_id,
			require_approval: req.require_approval,
			default_permission: req.default_permission,
			participants: req.participants,
		})
		.await?;

	Ok((
		StatusCode::CREATED,
		Json(CreateRoomRes { id: room.id, token: room.token, name: room.name }),
	))
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomReq {
	pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRes {
	pub id: Box<str>,
	pub name: Box<str>,
	pub ws_url: String,
}

/// `POST /rooms/{id}/join` - validate an invite token and hand back the
/// WebSocket path for the room.
pub async fn post_room_join(
	State(app): State<App>,
	Path(room_id): Path<String>,
	Json(req): Json<JoinRoomReq>,
) -> SrvResult<Json<JoinRoomRes>> {
	let room = app.registry.authenticate(&room_id, &req.token)?;
	let ws_url = format!("/ws/{}", room.id);
	Ok(Json(JoinRoomRes { id: room.id, name: room.name, ws_url }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoRes {
	pub name: Box<str>,
	pub created_at: Timestamp,
}

/// `GET /rooms/{id}` - public room info; never includes the token.
pub async fn get_room(
	State(app): State<App>,
	Path(room_id): Path<String>,
) -> SrvResult<Json<RoomInfoRes>> {
	let room = app.registry.get(&room_id).ok_or(Error::NotFound)?;
	Ok(Json(RoomInfoRes { name: room.name, created_at: room.created_at }))
}

#[derive(Debug, Serialize)]
pub struct DeleteRoomRes {
	pub ok: bool,
}

/// `DELETE /rooms/{id}` - requires `Authorization: Bearer <roomToken>`.
pub async fn delete_room(
	State(app): State<App>,
	Path(room_id): Path<String>,
	headers: HeaderMap,
) -> SrvResult<Json<DeleteRoomRes>> {
	let auth_header = headers
		.get(header::AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.ok_or(Error::Unauthorized)?;
	let token = auth_header.strip_prefix("Bearer ").ok_or(Error::Unauthorized)?.trim();

	if app.registry.get(&room_id).is_none() {
		return Err(Error::NotFound);
	}
	app.registry.delete(&room_id, token).await?;
	Ok(Json(DeleteRoomRes { ok: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRes {
	pub ok: bool,
	pub uptime: u64,
	pub rooms: usize,
	pub connections: usize,
	pub crdt_connections: usize,
	pub control_connections: usize,
}

/// `GET /healthz`
pub async fn get_healthz(State(app): State<App>) -> Json<HealthRes> {
	let crdt = app.crdt.connection_count();
	let control = app.control.connection_count();
	Json(HealthRes {
		ok: true,
		uptime: app.started_at.elapsed().as_secs(),
		rooms: app.registry.count(),
		connections: crdt + control,
		crdt_connections: crdt,
		control_connections: control,
	})
}

// vim: ts=4
