//! pvbridge protocol - wire format for WebSocket clients
//!
//! This crate provides:
//! - `message` - inbound control messages and outbound server messages
//! - `normalize` - raw provider updates to wire-ready canonical updates
//! - `codec` - little-endian base64 packing of numeric arrays

pub mod codec;
pub mod error;
pub mod message;
pub mod normalize;

pub use codec::EncodedArray;
pub use error::ProtocolError;
pub use message::{parse_client_message, ClientMessage, ServerMessage};
pub use normalize::{normalize, CanonicalUpdate};
