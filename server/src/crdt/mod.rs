//! CRDT document engine: binary Yjs sync relay with debounced persistence.

pub mod doc;
pub mod engine;
pub mod protocol;
pub mod websocket;

pub use engine::CrdtEngine;

// vim: ts=4
