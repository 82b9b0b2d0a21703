//! WebSocket codec for async I/O.
//!
//! This module provides frame-level encoding/decoding over async streams.

mod framed;

pub use framed::WebSocketCodec;
