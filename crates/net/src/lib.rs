#![warn(missing_docs)]
//! Wire format for game state synchronization.
//!
//! Records from `gamesync-core` are encoded with [`codec`], wrapped into a
//! [`Packet`] and framed into a single datagram. Sockets, retries and
//! timeouts belong to the caller.

pub mod builders;
pub mod codec;
pub mod config;
mod error;
pub mod protocol;

pub use codec::{decode, decode_fields, encode, encode_fields, MAX_NESTING};
pub use config::{FramingMode, ProtocolConfig, MAX_UDP_PAYLOAD};
pub use error::{CodecError, ConfigError, FrameError};
pub use protocol::{Body, BodyDecoder, BodyType, DecodeTable, Header, Packet, Protocol, BOUNDARY_TOKEN};
