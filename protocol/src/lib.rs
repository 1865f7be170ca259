//! Wire protocol: frame codec, handshake messages, versioning.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod version;

pub use codec::{read_frame, write_frame, MAX_HANDSHAKE_SIZE, MAX_MESSAGE_SIZE};
pub use error::ProtocolError;
pub use handshake::{
    generate_handshake_message, process_handshake, seal_handshake_data, HandshakeData,
    HandshakeMessage,
};
pub use version::{CLIENT_VERSION, PROTOCOL_VERSION};
