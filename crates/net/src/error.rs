//! Error taxonomy for codec, framing and configuration.

use crate::protocol::Packet;
use gamesync_core::{ErrorKind, FieldError};
use thiserror::Error;

/// Failure to turn a record into bytes or back.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The field map could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[source] postcard::Error),
    /// Bytes are truncated or not a field map.
    #[error("malformed record bytes: {0}")]
    Malformed(#[source] postcard::Error),
    /// Maps and lists nest deeper than the decoder accepts.
    #[error("record nests deeper than {0} levels")]
    TooDeep(usize),
    /// A complete field map was followed by extra bytes.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
    /// Decoded fields do not fit the target record.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Failure to build or parse a datagram.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No header/body boundary token in the datagram.
    #[error("datagram has no header boundary")]
    MissingBoundary,
    /// The length prefix promises more bytes than the datagram holds.
    #[error("datagram truncated: header needs {expected} bytes, {actual} available")]
    Truncated {
        /// Bytes the prefix promised.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// The datagram exceeds the configured size limit.
    #[error("datagram of {len} bytes exceeds limit of {max}")]
    Oversized {
        /// Datagram length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// The header could not be decoded.
    #[error("bad header: {0}")]
    Header(#[source] CodecError),
    /// The body could not be decoded as its announced type.
    #[error("bad {body_type} body: {source}")]
    Body {
        /// Body type announced in the header.
        body_type: String,
        /// Underlying decode failure.
        #[source]
        source: CodecError,
    },
    /// The header names a body type with no registered decoder.
    #[error("unknown body type `{0}`")]
    UnknownBodyType(String),
    /// The header's package kind is not registered.
    #[error("unknown package kind {0}")]
    UnknownPackageKind(u32),
    /// An activity body carries an unregistered activity kind.
    #[error("unknown activity kind {0}")]
    UnknownActivityKind(u32),
    /// An error body carries an unregistered error kind.
    #[error("unknown error kind {0}")]
    UnknownErrorKind(u32),
    /// Encoding an outbound packet failed.
    #[error("failed to encode packet: {0}")]
    Encode(#[source] CodecError),
}

impl FrameError {
    /// Protocol error kind a server reports back for this failure.
    ///
    /// Bytes that cannot be split or decoded are an `UnpackError`; frames
    /// that decode but name something this side does not know are
    /// `RequestInvalid`.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            FrameError::MissingBoundary
            | FrameError::Truncated { .. }
            | FrameError::Oversized { .. }
            | FrameError::Header(_)
            | FrameError::Body { .. }
            | FrameError::Encode(_) => ErrorKind::UNPACK_ERROR,
            FrameError::UnknownBodyType(_)
            | FrameError::UnknownPackageKind(_)
            | FrameError::UnknownActivityKind(_)
            | FrameError::UnknownErrorKind(_) => ErrorKind::REQUEST_INVALID,
        }
    }

    /// Error response packet describing this failure.
    pub fn to_error_packet(&self) -> Packet {
        crate::builders::error_response(self.error_kind(), self.to_string())
    }
}

/// Failure to read protocol configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The TOML did not match the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Values parsed but are unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}
