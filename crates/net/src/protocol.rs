//! Packet definitions and datagram framing.
//!
//! A datagram is a codec-encoded header followed by an optional codec-encoded
//! body. Two framings are supported:
//!
//! ```text
//! Boundary:        [header][b5 96 84 59][body]
//! LengthPrefixed:  [header_len: u32 le][header][body]
//! ```
//!
//! Boundary framing splits at the first occurrence of the token. The body
//! may contain the token freely; a header that contained it would be split
//! in the wrong place. Length-prefixed framing has no such case, but both
//! peers must be configured for it.

use crate::codec::{self, decode_fields, encode_fields};
use crate::config::{FramingMode, ProtocolConfig};
use crate::error::{CodecError, FrameError};
use gamesync_core::{
    ClientActivity, ErrorMessage, FieldError, Fields, GameState, GameStateUpdate, PackageKind, Record,
    Registries, Value,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::{trace, warn};

/// Marks the end of the header in boundary framing.
pub const BOUNDARY_TOKEN: [u8; 4] = [0xb5, 0x96, 0x84, 0x59];

/// Kind of record carried as a packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BodyType {
    /// No body.
    None = 0,
    /// Full shared state.
    GameState = 1,
    /// Partial state update.
    GameStateUpdate = 2,
    /// Client activity.
    ClientActivity = 3,
    /// Error description.
    ErrorMessage = 4,
}

impl BodyType {
    /// Every body type, in code order.
    pub const ALL: [BodyType; 5] = [
        BodyType::None,
        BodyType::GameState,
        BodyType::GameStateUpdate,
        BodyType::ClientActivity,
        BodyType::ErrorMessage,
    ];

    /// Name written into the header.
    pub fn name(self) -> &'static str {
        match self {
            BodyType::None => "none",
            BodyType::GameState => GameState::BODY_TYPE,
            BodyType::GameStateUpdate => GameStateUpdate::BODY_TYPE,
            BodyType::ClientActivity => ClientActivity::BODY_TYPE,
            BodyType::ErrorMessage => ErrorMessage::BODY_TYPE,
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packet header: what the packet is for and what its body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Package kind code.
    pub package_kind: PackageKind,
    /// Body type tag, always derived from the body.
    pub body_type: BodyType,
}

const PACKAGE_KIND: &str = "package_kind";
const BODY_TYPE: &str = "body_type";

impl Header {
    fn to_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(PACKAGE_KIND.into(), Value::from(self.package_kind.code()));
        fields.insert(BODY_TYPE.into(), Value::from(self.body_type.name()));
        fields
    }
}

/// Header as it appears on the wire, before the body type is resolved.
struct WireHeader {
    package_kind: u32,
    body_type: String,
}

impl WireHeader {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let fields = decode_fields(bytes)?;
        let package_kind = match fields.get(PACKAGE_KIND) {
            Some(value) => value
                .as_int()
                .and_then(|code| u32::try_from(code).ok())
                .ok_or_else(|| wrong_type(PACKAGE_KIND, "package kind code", value))?,
            None => PackageKind::RESPONSE.code(),
        };
        let body_type = match fields.get(BODY_TYPE) {
            Some(value) => value
                .as_str()
                .ok_or_else(|| wrong_type(BODY_TYPE, "string", value))?
                .to_string(),
            None => BodyType::None.name().to_string(),
        };
        Ok(Self {
            package_kind,
            body_type,
        })
    }
}

fn wrong_type(field: &str, expected: &'static str, found: &Value) -> CodecError {
    CodecError::Field(FieldError::WrongType {
        field: field.to_string(),
        expected,
        found: found.kind_name(),
    })
}

/// A packet body: exactly one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Full shared state.
    GameState(GameState),
    /// Partial state update.
    GameStateUpdate(GameStateUpdate),
    /// Client activity.
    ClientActivity(ClientActivity),
    /// Error description.
    ErrorMessage(ErrorMessage),
}

impl Body {
    /// Type tag of the wrapped record.
    pub fn body_type(&self) -> BodyType {
        match self {
            Body::GameState(_) => BodyType::GameState,
            Body::GameStateUpdate(_) => BodyType::GameStateUpdate,
            Body::ClientActivity(_) => BodyType::ClientActivity,
            Body::ErrorMessage(_) => BodyType::ErrorMessage,
        }
    }

    /// Encode the wrapped record.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Body::GameState(state) => codec::encode(state),
            Body::GameStateUpdate(update) => codec::encode(update),
            Body::ClientActivity(activity) => codec::encode(activity),
            Body::ErrorMessage(error) => codec::encode(error),
        }
    }
}

impl From<GameState> for Body {
    fn from(v: GameState) -> Self {
        Body::GameState(v)
    }
}

impl From<GameStateUpdate> for Body {
    fn from(v: GameStateUpdate) -> Self {
        Body::GameStateUpdate(v)
    }
}

impl From<ClientActivity> for Body {
    fn from(v: ClientActivity) -> Self {
        Body::ClientActivity(v)
    }
}

impl From<ErrorMessage> for Body {
    fn from(v: ErrorMessage) -> Self {
        Body::ErrorMessage(v)
    }
}

/// One wire message: a header and zero or one body record.
///
/// The header's body type is derived from the body, so a packet can never
/// announce one record kind and carry another.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    header: Header,
    body: Option<Body>,
}

impl Packet {
    /// Build a packet; the header's body type follows `body`.
    pub fn new(package_kind: PackageKind, body: Option<Body>) -> Self {
        let body_type = body.as_ref().map_or(BodyType::None, Body::body_type);
        Self {
            header: Header {
                package_kind,
                body_type,
            },
            body,
        }
    }

    /// Packet header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Package kind from the header.
    pub fn package_kind(&self) -> PackageKind {
        self.header.package_kind
    }

    /// Body record, if any.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Take the body record.
    pub fn into_body(self) -> Option<Body> {
        self.body
    }

    /// Whether this is a server response.
    pub fn is_response(&self) -> bool {
        self.header.package_kind == PackageKind::RESPONSE
    }

    /// Whether this is a server error.
    pub fn is_error(&self) -> bool {
        self.header.package_kind == PackageKind::ERROR_RESPONSE
    }

    /// Whether this asks for incremental updates.
    pub fn is_update_request(&self) -> bool {
        self.header.package_kind == PackageKind::STATE_UPDATE_REQUEST
    }

    /// Whether this asks for the full state.
    pub fn is_state_request(&self) -> bool {
        self.header.package_kind == PackageKind::STATE_REQUEST
    }

    /// Whether this posts a client activity.
    pub fn is_post_activity_request(&self) -> bool {
        self.header.package_kind == PackageKind::POST_ACTIVITY_REQUEST
    }

    /// Serialize with boundary framing.
    pub fn to_datagram(&self) -> Result<Vec<u8>, FrameError> {
        let (header, body) = self.encode_parts()?;
        Ok(frame(&header, &body, FramingMode::Boundary))
    }

    /// Parse a boundary-framed datagram using the standard decoders.
    ///
    /// No registry validation happens here; use [`Protocol::decode_packet`]
    /// on the receiving side of a live connection.
    pub fn from_datagram(datagram: &[u8]) -> Result<Self, FrameError> {
        let (header, body) = unframe(datagram, FramingMode::Boundary)?;
        decode_parts(DecodeTable::standard(), header, body)
    }

    fn encode_parts(&self) -> Result<(Vec<u8>, Vec<u8>), FrameError> {
        let header = encode_fields(&self.header.to_fields()).map_err(FrameError::Encode)?;
        let body = match &self.body {
            Some(body) => body.encode().map_err(FrameError::Encode)?,
            None => Vec::new(),
        };
        Ok((header, body))
    }
}

/// Decoder for one body type.
pub type BodyDecoder = fn(&[u8]) -> Result<Body, CodecError>;

/// Dispatch table from wire body-type names to decoders.
///
/// Populated once and shared by every decoder; body types are never
/// resolved any other way.
pub struct DecodeTable {
    by_name: HashMap<&'static str, (BodyType, BodyDecoder)>,
}

impl DecodeTable {
    fn build() -> Self {
        let mut by_name: HashMap<&'static str, (BodyType, BodyDecoder)> = HashMap::new();
        by_name.insert(
            BodyType::GameState.name(),
            (BodyType::GameState, decode_game_state),
        );
        by_name.insert(
            BodyType::GameStateUpdate.name(),
            (BodyType::GameStateUpdate, decode_game_state_update),
        );
        by_name.insert(
            BodyType::ClientActivity.name(),
            (BodyType::ClientActivity, decode_client_activity),
        );
        by_name.insert(
            BodyType::ErrorMessage.name(),
            (BodyType::ErrorMessage, decode_error_message),
        );
        Self { by_name }
    }

    /// Shared table with a decoder for every [`BodyType`].
    pub fn standard() -> &'static DecodeTable {
        static TABLE: OnceLock<DecodeTable> = OnceLock::new();
        TABLE.get_or_init(DecodeTable::build)
    }

    /// Resolve a wire name. `"none"` resolves to [`BodyType::None`] with no
    /// decoder.
    pub fn lookup(&self, name: &str) -> Option<(BodyType, Option<BodyDecoder>)> {
        if name == BodyType::None.name() {
            return Some((BodyType::None, None));
        }
        self.by_name
            .get(name)
            .map(|(body_type, decoder)| (*body_type, Some(*decoder)))
    }
}

impl fmt::Debug for DecodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("DecodeTable").field("body_types", &names).finish()
    }
}

fn decode_game_state(bytes: &[u8]) -> Result<Body, CodecError> {
    codec::decode(bytes).map(Body::GameState)
}

fn decode_game_state_update(bytes: &[u8]) -> Result<Body, CodecError> {
    codec::decode(bytes).map(Body::GameStateUpdate)
}

fn decode_client_activity(bytes: &[u8]) -> Result<Body, CodecError> {
    codec::decode(bytes).map(Body::ClientActivity)
}

fn decode_error_message(bytes: &[u8]) -> Result<Body, CodecError> {
    codec::decode(bytes).map(Body::ErrorMessage)
}

fn frame(header: &[u8], body: &[u8], mode: FramingMode) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(4 + header.len() + body.len());
    match mode {
        FramingMode::Boundary => {
            datagram.extend_from_slice(header);
            datagram.extend_from_slice(&BOUNDARY_TOKEN);
        }
        FramingMode::LengthPrefixed => {
            datagram.extend_from_slice(&(header.len() as u32).to_le_bytes());
            datagram.extend_from_slice(header);
        }
    }
    datagram.extend_from_slice(body);
    datagram
}

fn unframe(datagram: &[u8], mode: FramingMode) -> Result<(&[u8], &[u8]), FrameError> {
    match mode {
        FramingMode::Boundary => {
            let at = datagram
                .windows(BOUNDARY_TOKEN.len())
                .position(|w| w == BOUNDARY_TOKEN)
                .ok_or(FrameError::MissingBoundary)?;
            Ok((&datagram[..at], &datagram[at + BOUNDARY_TOKEN.len()..]))
        }
        FramingMode::LengthPrefixed => {
            if datagram.len() < 4 {
                return Err(FrameError::Truncated {
                    expected: 4,
                    actual: datagram.len(),
                });
            }
            let length =
                u32::from_le_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]) as usize;
            let rest = &datagram[4..];
            if rest.len() < length {
                return Err(FrameError::Truncated {
                    expected: length,
                    actual: rest.len(),
                });
            }
            Ok(rest.split_at(length))
        }
    }
}

fn decode_parts(table: &DecodeTable, header: &[u8], body: &[u8]) -> Result<Packet, FrameError> {
    let wire = WireHeader::decode(header).map_err(FrameError::Header)?;
    let (body_type, decoder) = table
        .lookup(&wire.body_type)
        .ok_or_else(|| FrameError::UnknownBodyType(wire.body_type.clone()))?;
    trace!(
        "Decoding package kind {} with {} body ({} bytes)",
        wire.package_kind,
        body_type,
        body.len()
    );

    let body = match decoder {
        Some(decode) => Some(decode(body).map_err(|source| FrameError::Body {
            body_type: wire.body_type,
            source,
        })?),
        None => None,
    };
    Ok(Packet::new(PackageKind(wire.package_kind), body))
}

/// Encoder/decoder bound to a set of registries and a configuration.
///
/// Build one at startup, after game layers have registered their kinds, and
/// share it read-only with every thread that sends or receives.
#[derive(Debug, Clone)]
pub struct Protocol {
    registries: Registries,
    config: ProtocolConfig,
}

impl Protocol {
    /// Bind `registries` and `config`.
    pub fn new(registries: Registries, config: ProtocolConfig) -> Self {
        Self { registries, config }
    }

    /// Standard registries with default configuration.
    pub fn standard() -> Self {
        Self::new(Registries::standard(), ProtocolConfig::default())
    }

    /// Registries used for validation.
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Active configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Frame `packet` for sending.
    pub fn encode_packet(&self, packet: &Packet) -> Result<Vec<u8>, FrameError> {
        self.validate(packet)?;
        let (header, body) = packet.encode_parts()?;
        let datagram = frame(&header, &body, self.config.framing);
        if datagram.len() > self.config.max_datagram_len {
            return Err(FrameError::Oversized {
                len: datagram.len(),
                max: self.config.max_datagram_len,
            });
        }
        Ok(datagram)
    }

    /// Parse and validate a received datagram.
    ///
    /// Failures never touch shared state; callers can turn them into a reply
    /// with [`FrameError::to_error_packet`].
    pub fn decode_packet(&self, datagram: &[u8]) -> Result<Packet, FrameError> {
        let result = self.decode_unchecked(datagram).and_then(|packet| {
            self.validate(&packet)?;
            Ok(packet)
        });
        if let Err(err) = &result {
            warn!("Dropping datagram of {} bytes: {}", datagram.len(), err);
        }
        result
    }

    fn decode_unchecked(&self, datagram: &[u8]) -> Result<Packet, FrameError> {
        if datagram.len() > self.config.max_datagram_len {
            return Err(FrameError::Oversized {
                len: datagram.len(),
                max: self.config.max_datagram_len,
            });
        }
        let (header, body) = unframe(datagram, self.config.framing)?;
        decode_parts(DecodeTable::standard(), header, body)
    }

    fn validate(&self, packet: &Packet) -> Result<(), FrameError> {
        let kind = packet.package_kind();
        if !self.registries.package_kinds.contains(kind.code()) {
            return Err(FrameError::UnknownPackageKind(kind.code()));
        }
        match packet.body() {
            Some(Body::ClientActivity(activity))
                if !self
                    .registries
                    .activity_kinds
                    .contains(activity.activity_type.code()) =>
            {
                Err(FrameError::UnknownActivityKind(activity.activity_type.code()))
            }
            Some(Body::ErrorMessage(error))
                if !self.registries.error_kinds.contains(error.error_type.code()) =>
            {
                Err(FrameError::UnknownErrorKind(error.error_type.code()))
            }
            _ => Ok(()),
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::standard()
    }
}
