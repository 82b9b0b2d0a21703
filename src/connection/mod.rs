//! Client connection management and lifecycle states.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - TCP/TLS and upgrade handshake in progress
//! 2. **Open** - Handshake complete, messages flow
//! 3. **Closing** - Close frame sent, waiting for the peer
//! 4. **Closed** / **Failed** - Terminal

#[allow(clippy::module_inception)]
mod connection;
mod state;

pub use connection::Connection;
pub use state::ConnectionState;
