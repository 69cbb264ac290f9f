//! Per-connection handling for the control channel.

use axum::extract::ws::{Message, WebSocket};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::control::engine::ControlEngine;
use crate::prelude::*;
use crate::types::Room;

/// Handle one control WebSocket after the gateway has authenticated it.
pub async fn handle_control_connection(ws: WebSocket, engine: Arc<ControlEngine>, room_meta: Room) {
	let conn = Uuid::new_v4();
	info!("Control connection: room {} (conn={})", room_meta.id, &conn.to_string()[..8]);

	let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
	let (mut ws_tx, mut ws_rx) = ws.split();

	let send_task = tokio::spawn(async move {
		while let Some(msg) = rx.recv().await {
			let closing = matches!(msg, Message::Close(_));
			if ws_tx.send(msg).await.is_err() || closing {
				return;
			}
		}
	});

	let heartbeat_tx = tx.clone();
	let heartbeat_task = tokio::spawn(async move {
		let mut interval = tokio::time::interval(Duration::from_secs(30));
		interval.tick().await;
		loop {
			interval.tick().await;
			if heartbeat_tx.send(Message::Ping(vec![].into())).is_err() {
				return;
			}
		}
	});

	let croom = engine.connect(&room_meta, conn, tx).await;

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Text(text)) => {
				engine.handle_message(&room_meta, &croom, conn, text.as_str()).await;
			}
			Ok(Message::Close(_)) => break,
			// The control channel is JSON text; binary frames are dropped.
			Ok(_) => {}
			Err(err) => {
				debug!("Control connection error in room {}: {}", room_meta.id, err);
				break;
			}
		}
	}

	engine.disconnect(&croom, conn).await;
	heartbeat_task.abort();
	let _ = send_task.await;
	info!("Control connection closed: room {} (conn={})", room_meta.id, &conn.to_string()[..8]);
}

// vim: ts=4
