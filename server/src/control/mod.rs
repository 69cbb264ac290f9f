//! Control channel engine: per-room JSON message bus for presence,
//! file operations, access control, and session commands.

pub mod engine;
pub mod message;
pub mod room;
pub mod websocket;

pub use engine::ControlEngine;

// vim: ts=4
