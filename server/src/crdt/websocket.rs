//! Per-connection handling for the binary document channel.

use axum::extract::ws::{Message, WebSocket};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::crdt::engine::CrdtEngine;
use crate::prelude::*;

/// Handle one document WebSocket after the gateway has authenticated it.
///
/// The socket is split: a sender task drains the per-connection channel the
/// engine enqueues into, while this task reads inbound frames. A heartbeat
/// ping keeps NAT mappings alive.
pub async fn handle_doc_connection(ws: WebSocket, engine: Arc<CrdtEngine>, doc_name: String) {
	let conn = Uuid::new_v4();
	info!("Doc connection: {} (conn={})", doc_name, &conn.to_string()[..8]);

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

	let doc = match engine.connect(&doc_name, conn, tx).await {
		Ok(doc) => doc,
		Err(err) => {
			warn!("Failed to open doc {}: {}", doc_name, err);
			heartbeat_task.abort();
			send_task.abort();
			return;
		}
	};

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Binary(data)) => engine.handle_frame(&doc, conn, &data).await,
			Ok(Message::Close(_)) => break,
			// The document channel is binary-only; anything else is dropped.
			Ok(_) => {}
			Err(err) => {
				debug!("Doc connection error on {}: {}", doc_name, err);
				break;
			}
		}
	}

	engine.disconnect(&doc, conn).await;
	heartbeat_task.abort();
	let _ = send_task.await;
	info!("Doc connection closed: {} (conn={})", doc_name, &conn.to_string()[..8]);
}

// vim: ts=4
