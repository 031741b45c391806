//! Wire protocol: signed envelopes, `#`-delimited framing, TTL budgets and
//! the sealed bootstrap join.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod ttl;

pub use codec::{encode_frame, parse_frame, FrameBuffer, FRAME_DELIMITER, MAX_MESSAGE_SIZE};
pub use envelope::{Envelope, MessageType};
pub use error::ProtocolError;
pub use handshake::{open_join, seal_join};
pub use ttl::time_to_live;
