//! WebSocket client subsystem.
//!
//! # Data Flow
//! ```text
//! SessionConfig
//!     → session.rs: connect()
//!         → net::socket (TCP, connect deadline)
//!         → tunnel.rs (CONNECT through proxy, tunnel deadline)
//!         → handshake.rs (upgrade + accept check, handshake deadline)
//!     → Open
//!         socket → buffer.rs → frame.rs → SessionEvent
//!         send()/close() → frame.rs (masked) → writer task → socket
//! ```
//!
//! # Design Decisions
//! - Each pre-open phase hands its leftover bytes to the next one explicitly
//! - One message per frame; fragmented input is reported, not reassembled
//! - Client frames are always masked

pub mod buffer;
pub mod frame;
pub mod handshake;
pub mod session;
pub mod tunnel;

pub use buffer::FrameBuffer;
pub use frame::{create_frame, parse_frame, Frame, FrameParse, OpCode};
pub use handshake::{compute_accept, generate_key};
pub use session::{Message, Session, SessionConfig, SessionEvent, SessionSender, SessionState};
