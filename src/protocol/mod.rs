//! WebSocket protocol core (RFC 6455), client role.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{ClientHandshake, HandshakeResponse, WS_GUID, compute_accept_key, generate_key};
pub use mask::{MaskGenerator, apply_mask};
pub use opcode::OpCode;
