//! Integration tests for the CRDT document engine: sync relay, awareness
//! lifecycle, debounced persistence, and idle destruction.

use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use yrs::sync::awareness::AwarenessUpdateEntry;
use yrs::sync::{AwarenessUpdate, SyncMessage};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

use liveshare::crdt::CrdtEngine;
use liveshare::crdt::protocol::{self, Frame};
use liveshare::store_adapter::{DocStore, MemDocStore};

type Rx = mpsc::UnboundedReceiver<Message>;

fn engine(store: Arc<MemDocStore>) -> Arc<CrdtEngine> {
	Arc::new(CrdtEngine::with_timing(
		store,
		Duration::from_millis(50),
		Duration::from_millis(100),
	))
}

fn channel() -> (mpsc::UnboundedSender<Message>, Rx) {
	mpsc::unbounded_channel()
}

/// Drain everything currently queued for a connection.
fn drain(rx: &mut Rx) -> Vec<Message> {
	let mut out = Vec::new();
	while let Ok(msg) = rx.try_recv() {
		out.push(msg);
	}
	out
}

fn binary_frames(messages: Vec<Message>) -> Vec<Vec<u8>> {
	messages
		.into_iter()
		.filter_map(|msg| match msg {
			Message::Binary(data) => Some(data.to_vec()),
			_ => None,
		})
		.collect()
}

/// Encode a full-state update of `doc` as a sync frame.
fn update_frame(doc: &Doc) -> Vec<u8> {
	let update = doc.transact().encode_state_as_update_v1(&StateVector::default());
	protocol::encode_sync(&SyncMessage::Update(update.into()))
}

fn text_of(doc: &Doc) -> String {
	let text = doc.get_or_insert_text("contents");
	text.get_string(&doc.transact())
}

fn doc_with_text(content: &str) -> Doc {
	let doc = Doc::new();
	let text = doc.get_or_insert_text("contents");
	let mut txn = doc.transact_mut();
	text.insert(&mut txn, 0, content);
	drop(txn);
	doc
}

/// Apply every sync update found in `frames` to `doc`.
fn apply_sync_frames(doc: &Doc, frames: &[Vec<u8>]) {
	for frame in frames {
		if let Ok(Some(Frame::Sync(SyncMessage::SyncStep2(u) | SyncMessage::Update(u)))) =
			protocol::decode_frame(frame)
		{
			let update = Update::decode_v1(&u).unwrap();
			doc.transact_mut().apply_update(update).unwrap();
		}
	}
}

#[tokio::test]
async fn test_connect_sends_sync_step1() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let (tx, mut rx) = channel();
	engine.connect("r1:notes.md", Uuid::new_v4(), tx).await.unwrap();

	let frames = binary_frames(drain(&mut rx));
	assert_eq!(frames.len(), 1);
	match protocol::decode_frame(&frames[0]).unwrap() {
		Some(Frame::Sync(SyncMessage::SyncStep1(_))) => {}
		other => panic!("expected step-1, got {:?}", other),
	}
}

#[tokio::test]
async fn test_two_client_text_sync_converges() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let conn_b = Uuid::new_v4();
	let (tx_a, mut rx_a) = channel();
	let (tx_b, mut rx_b) = channel();

	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	engine.connect("r1:notes.md", conn_b, tx_b).await.unwrap();
	drain(&mut rx_a);
	drain(&mut rx_b);

	// A inserts text and ships the update
	let local_a = doc_with_text("hello from A");
	engine.handle_frame(&doc, conn_a, &update_frame(&local_a)).await;

	// B receives the forwarded update and converges
	let local_b = Doc::new();
	let frames_b = binary_frames(drain(&mut rx_b));
	assert!(!frames_b.is_empty());
	apply_sync_frames(&local_b, &frames_b);
	assert_eq!(text_of(&local_b), "hello from A");

	// No self-echo on the sync channel
	assert!(binary_frames(drain(&mut rx_a)).is_empty());
}

#[tokio::test]
async fn test_step1_query_gets_step2_reply() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let (tx_a, mut rx_a) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	drain(&mut rx_a);

	// Seed server state through a second connection
	let conn_b = Uuid::new_v4();
	let (tx_b, _rx_b) = channel();
	engine.connect("r1:notes.md", conn_b, tx_b).await.unwrap();
	let seeded = doc_with_text("server state");
	engine.handle_frame(&doc, conn_b, &update_frame(&seeded)).await;
	drain(&mut rx_a);

	// A asks for everything since the empty state vector
	let query = protocol::encode_sync(&SyncMessage::SyncStep1(StateVector::default()));
	engine.handle_frame(&doc, conn_a, &query).await;

	let local = Doc::new();
	apply_sync_frames(&local, &binary_frames(drain(&mut rx_a)));
	assert_eq!(text_of(&local), "server state");
}

#[tokio::test]
async fn test_concurrent_connects_create_one_doc() {
	let engine = engine(Arc::new(MemDocStore::new()));

	let mut handles = Vec::new();
	for _ in 0..16 {
		let engine = engine.clone();
		let (tx, rx) = channel();
		handles.push(tokio::spawn(async move {
			let doc = engine.connect("r1:shared.md", Uuid::new_v4(), tx).await.unwrap();
			(doc, rx)
		}));
	}

	let mut docs = Vec::new();
	for handle in handles {
		docs.push(handle.await.unwrap().0);
	}
	assert_eq!(engine.doc_count(), 1);
	for doc in &docs[1..] {
		assert!(Arc::ptr_eq(&docs[0], doc));
	}
	assert_eq!(engine.connection_count(), 16);
}

#[tokio::test]
async fn test_file_op_relayed_verbatim_to_peers_only() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let conn_b = Uuid::new_v4();
	let (tx_a, mut rx_a) = channel();
	let (tx_b, mut rx_b) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	engine.connect("r1:notes.md", conn_b, tx_b).await.unwrap();
	drain(&mut rx_a);
	drain(&mut rx_b);

	let body = br#"{"type":"rename","oldPath":"a.md","newPath":"b.md"}"#;
	engine.handle_frame(&doc, conn_a, &protocol::encode_file_op(body)).await;

	let frames_b = binary_frames(drain(&mut rx_b));
	assert_eq!(frames_b.len(), 1);
	match protocol::decode_frame(&frames_b[0]).unwrap() {
		Some(Frame::FileOp(received)) => assert_eq!(received, body),
		other => panic!("expected file-op, got {:?}", other),
	}
	assert!(binary_frames(drain(&mut rx_a)).is_empty());
}

#[tokio::test]
async fn test_unknown_frame_type_is_ignored() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let (tx_a, mut rx_a) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	drain(&mut rx_a);

	engine.handle_frame(&doc, conn_a, &[42, 1, 2, 3]).await;
	engine.handle_frame(&doc, conn_a, &[]).await;
	assert!(drain(&mut rx_a).is_empty());
	assert_eq!(engine.connection_count(), 1);
}

fn awareness_frame(client_id: u64, json: &str) -> Vec<u8> {
	let update = AwarenessUpdate {
		clients: HashMap::from([(
			client_id,
			AwarenessUpdateEntry { clock: 1, json: json.into() },
		)]),
	};
	protocol::encode_awareness(&update.encode_v1())
}

#[tokio::test]
async fn test_awareness_broadcast_includes_origin() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let conn_b = Uuid::new_v4();
	let (tx_a, mut rx_a) = channel();
	let (tx_b, mut rx_b) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	engine.connect("r1:notes.md", conn_b, tx_b).await.unwrap();
	drain(&mut rx_a);
	drain(&mut rx_b);

	engine
		.handle_frame(&doc, conn_a, &awareness_frame(7, r#"{"user":{"name":"alice"}}"#))
		.await;

	// Everyone sees awareness, including the origin; clients self-filter
	assert_eq!(binary_frames(drain(&mut rx_a)).len(), 1);
	assert_eq!(binary_frames(drain(&mut rx_b)).len(), 1);
}

#[tokio::test]
async fn test_awareness_withdrawn_on_disconnect() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let conn_b = Uuid::new_v4();
	let (tx_a, _rx_a) = channel();
	let (tx_b, mut rx_b) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	engine.connect("r1:notes.md", conn_b, tx_b).await.unwrap();

	engine
		.handle_frame(&doc, conn_a, &awareness_frame(7, r#"{"user":{"name":"alice"}}"#))
		.await;
	drain(&mut rx_b);

	engine.disconnect(&doc, conn_a).await;

	// B is told that client 7 went away
	let frames = binary_frames(drain(&mut rx_b));
	assert_eq!(frames.len(), 1);
	match protocol::decode_frame(&frames[0]).unwrap() {
		Some(Frame::Awareness(bytes)) => {
			let update = AwarenessUpdate::decode_v1(&bytes).unwrap();
			let entry = update.clients.get(&7).unwrap();
			assert_eq!(&*entry.json, "null");
		}
		other => panic!("expected awareness, got {:?}", other),
	}

	// A fresh connection no longer sees any awareness state
	let (tx_c, mut rx_c) = channel();
	engine.connect("r1:notes.md", Uuid::new_v4(), tx_c).await.unwrap();
	let frames_c = binary_frames(drain(&mut rx_c));
	assert_eq!(frames_c.len(), 1, "expected only the step-1 query");
}

#[tokio::test]
async fn test_debounced_persist_writes_snapshot() {
	let store = Arc::new(MemDocStore::new());
	let engine = engine(store.clone());
	let conn_a = Uuid::new_v4();
	let (tx_a, _rx_a) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();

	let local = doc_with_text("persisted");
	engine.handle_frame(&doc, conn_a, &update_frame(&local)).await;

	// Within the debounce window nothing is on disk yet
	assert!(store.load_doc("r1:notes.md").await.unwrap().is_none());
	tokio::time::sleep(Duration::from_millis(150)).await;

	let snapshot = store.load_doc("r1:notes.md").await.unwrap().unwrap();
	let restored = Doc::new();
	restored
		.transact_mut()
		.apply_update(Update::decode_v1(&snapshot).unwrap())
		.unwrap();
	assert_eq!(text_of(&restored), "persisted");
}

#[tokio::test]
async fn test_snapshot_loaded_on_fresh_engine() {
	let store = Arc::new(MemDocStore::new());
	{
		let engine = engine(store.clone());
		let conn = Uuid::new_v4();
		let (tx, _rx) = channel();
		let doc = engine.connect("r1:notes.md", conn, tx).await.unwrap();
		engine.handle_frame(&doc, conn, &update_frame(&doc_with_text("persisted"))).await;
		engine.shutdown().await;
	}

	// Simulated restart: a new engine over the same store
	let engine = engine(store);
	let conn = Uuid::new_v4();
	let (tx, mut rx) = channel();
	let doc = engine.connect("r1:notes.md", conn, tx).await.unwrap();
	drain(&mut rx);

	let query = protocol::encode_sync(&SyncMessage::SyncStep1(StateVector::default()));
	engine.handle_frame(&doc, conn, &query).await;

	let local = Doc::new();
	apply_sync_frames(&local, &binary_frames(drain(&mut rx)));
	assert_eq!(text_of(&local), "persisted");
}

#[tokio::test]
async fn test_idle_doc_destroyed_after_grace() {
	let store = Arc::new(MemDocStore::new());
	let engine = engine(store.clone());
	let conn = Uuid::new_v4();
	let (tx, _rx) = channel();
	let doc = engine.connect("r1:notes.md", conn, tx).await.unwrap();
	engine.handle_frame(&doc, conn, &update_frame(&doc_with_text("kept"))).await;

	engine.disconnect(&doc, conn).await;
	assert_eq!(engine.doc_count(), 1);

	tokio::time::sleep(Duration::from_millis(250)).await;
	assert_eq!(engine.doc_count(), 0);
	// The final persist ran before destruction
	assert!(store.load_doc("r1:notes.md").await.unwrap().is_some());
}

#[tokio::test]
async fn test_arrival_during_grace_cancels_destruction() {
	let engine = engine(Arc::new(MemDocStore::new()));
	let conn_a = Uuid::new_v4();
	let (tx_a, _rx_a) = channel();
	let doc = engine.connect("r1:notes.md", conn_a, tx_a).await.unwrap();
	engine.disconnect(&doc, conn_a).await;

	// New arrival within the grace period keeps the document alive
	tokio::time::sleep(Duration::from_millis(30)).await;
	let (tx_b, _rx_b) = channel();
	engine.connect("r1:notes.md", Uuid::new_v4(), tx_b).await.unwrap();

	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(engine.doc_count(), 1);
}

#[tokio::test]
async fn test_shutdown_persists_and_closes_clients() {
	let store = Arc::new(MemDocStore::new());
	let engine = engine(store.clone());
	let conn = Uuid::new_v4();
	let (tx, mut rx) = channel();
	let doc = engine.connect("r1:notes.md", conn, tx).await.unwrap();
	engine.handle_frame(&doc, conn, &update_frame(&doc_with_text("flushed"))).await;
	drain(&mut rx);

	// Shut down well before the debounce would have fired
	engine.shutdown().await;

	assert!(store.load_doc("r1:notes.md").await.unwrap().is_some());
	let messages = drain(&mut rx);
	assert!(messages.iter().any(|m| matches!(m, Message::Close(Some(frame))
		if frame.reason.as_str() == "server shutting down")));
	assert_eq!(engine.doc_count(), 0);
}

#[tokio::test]
async fn test_corrupt_snapshot_yields_empty_doc() {
	let store = Arc::new(MemDocStore::new());
	store.persist_doc("r1:bad.md", &[0xFF, 0xFE, 0xFD]).await.unwrap();

	let engine = engine(store);
	let conn = Uuid::new_v4();
	let (tx, mut rx) = channel();
	let doc = engine.connect("r1:bad.md", conn, tx).await.unwrap();
	drain(&mut rx);

	let query = protocol::encode_sync(&SyncMessage::SyncStep1(StateVector::default()));
	engine.handle_frame(&doc, conn, &query).await;
	let local = Doc::new();
	apply_sync_frames(&local, &binary_frames(drain(&mut rx)));
	assert_eq!(text_of(&local), "");
}

// vim: ts=4
