//! Records exchanged between client and server.
//!
//! Each record converts to and from a flat [`Fields`] map. Decoding starts
//! from the record's default and overlays whatever fields arrived, so peers
//! may omit fields they did not change.

use crate::registry::{ActivityKind, ErrorKind};
use crate::value::{Fields, Value};
use std::cmp::Ordering;
use std::collections::btree_map;
use std::fmt;
use thiserror::Error;

/// Field name of the ordering key.
pub const TIME_ORDER: &str = "time_order";
/// Field name of the game status.
pub const GAME_STATUS: &str = "game_status";
/// Field name of the players map.
pub const PLAYERS: &str = "players";

/// A decoded field does not fit the record it is decoded into.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// The field holds a value of the wrong variant.
    #[error("field `{field}` expected {expected}, found {found}")]
    WrongType {
        /// Field name.
        field: String,
        /// Expected variant.
        expected: &'static str,
        /// Variant that arrived.
        found: &'static str,
    },
    /// An integer code is outside the closed set the field allows.
    #[error("field `{field}` has unknown code {code}")]
    UnknownCode {
        /// Field name.
        field: String,
        /// Offending code.
        code: i64,
    },
    /// A time order that is NaN or positive infinity.
    #[error("field `{field}` must be a finite time order, found {value}")]
    NonFinite {
        /// Field name.
        field: String,
        /// Offending value.
        value: f64,
    },
    /// The name belongs to a field the record stores separately.
    #[error("field `{field}` is reserved")]
    Reserved {
        /// Field name.
        field: String,
    },
    /// A required field was removed.
    #[error("field `{field}` is required")]
    Required {
        /// Field name.
        field: String,
    },
    /// The record has a closed field set and this name is not part of it.
    #[error("{record} has no field `{field}`")]
    UnknownField {
        /// Record kind.
        record: &'static str,
        /// Field name.
        field: String,
    },
}

impl FieldError {
    fn wrong_type(field: &str, expected: &'static str, found: &Value) -> Self {
        FieldError::WrongType {
            field: field.to_string(),
            expected,
            found: found.kind_name(),
        }
    }
}

/// A record that can travel as a packet body.
pub trait Record: Default + Sized {
    /// Name written into the packet header's body type.
    const BODY_TYPE: &'static str;

    /// Flatten the record into named fields.
    fn to_fields(&self) -> Fields;

    /// Rebuild a record from named fields, starting from `Default`.
    fn from_fields(fields: Fields) -> Result<Self, FieldError>;

    /// Check the record can be decoded back after encoding.
    fn validate(&self) -> Result<(), FieldError> {
        Ok(())
    }
}

/// Scalar ordering key for states and updates.
///
/// Holds an `f64` so fractional keys are allowed; ordering is total
/// (`f64::total_cmp`), which keeps comparisons consistent across peers.
/// `-0.0` and `0.0` are the same key. NaN and positive infinity are never
/// accepted from the wire; see [`TimeOrder::check`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrder(pub f64);

impl TimeOrder {
    /// Orders before every real key. Used by the neutral update.
    pub const NEUTRAL: Self = Self(f64::NEG_INFINITY);

    /// Encode as an integer when the key is integral, otherwise as a float.
    pub fn to_value(self) -> Value {
        let v = self.0;
        if v.is_finite() && v.fract() == 0.0 && v.abs() < (1u64 << 53) as f64 {
            Value::Int(v as i64)
        } else {
            Value::Float(v)
        }
    }

    /// Decode from an integer or float field.
    pub fn from_value(field: &str, value: &Value) -> Result<Self, FieldError> {
        value
            .as_float()
            .map(TimeOrder)
            .ok_or_else(|| FieldError::wrong_type(field, "number", value))?
            .check(field)
    }

    /// Whether the key is finite or [`TimeOrder::NEUTRAL`].
    pub fn is_valid(self) -> bool {
        self.0.is_finite() || self.0 == f64::NEG_INFINITY
    }

    /// Pass valid keys through; a NaN or positive infinite key would sort
    /// after every later update and freeze the state.
    pub fn check(self, field: &str) -> Result<Self, FieldError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(FieldError::NonFinite {
                field: field.to_string(),
                value: self.0,
            })
        }
    }

    fn normalized(self) -> f64 {
        if self.0 == 0.0 {
            0.0
        } else {
            self.0
        }
    }
}

impl PartialEq for TimeOrder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeOrder {}

impl PartialOrd for TimeOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized().total_cmp(&other.normalized())
    }
}

impl From<i64> for TimeOrder {
    fn from(v: i64) -> Self {
        TimeOrder(v as f64)
    }
}

impl From<i32> for TimeOrder {
    fn from(v: i32) -> Self {
        TimeOrder(f64::from(v))
    }
}

impl From<u32> for TimeOrder {
    fn from(v: u32) -> Self {
        TimeOrder(f64::from(v))
    }
}

impl From<f64> for TimeOrder {
    fn from(v: f64) -> Self {
        TimeOrder(v)
    }
}

impl fmt::Display for TimeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the shared game loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameStatus {
    /// Loop halted.
    #[default]
    Paused = 1,
    /// Loop running.
    Active = 2,
}

impl GameStatus {
    /// Wire code.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Parse a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(GameStatus::Paused),
            2 => Some(GameStatus::Active),
            _ => None,
        }
    }

    fn from_value(field: &str, value: &Value) -> Result<Self, FieldError> {
        let code = value
            .as_int()
            .ok_or_else(|| FieldError::wrong_type(field, "int", value))?;
        Self::from_code(code).ok_or_else(|| FieldError::UnknownCode {
            field: field.to_string(),
            code,
        })
    }
}

/// Opaque 4-byte player identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub [u8; 4]);

impl PlayerId {
    /// Key used for this player in the players map.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Raw bytes as a field value.
    pub fn to_value(self) -> Value {
        Value::Bytes(self.0.to_vec())
    }

    /// Read an id from a 4-byte field value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let bytes = value.as_bytes()?;
        <[u8; 4]>::try_from(bytes).ok().map(PlayerId)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// State shared between the server and every client.
///
/// `time_order` follows the server's update counter. Mutate it only through
/// [`GameState::apply`](crate::merge) so the key never moves backwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameState {
    /// Ordering key of the last applied update.
    pub time_order: TimeOrder,
    /// Whether the loop is running.
    pub game_status: GameStatus,
    /// Player records keyed by player id.
    pub players: Fields,
    /// Fields defined by the game-specific layer, never a reserved name.
    pub(crate) extra: Fields,
}

impl GameState {
    /// Create an empty state.
    pub fn new(time_order: impl Into<TimeOrder>, game_status: GameStatus) -> Self {
        Self {
            time_order: time_order.into(),
            game_status,
            ..Self::default()
        }
    }

    /// True iff the game is paused.
    pub fn is_paused(&self) -> bool {
        self.game_status == GameStatus::Paused
    }

    /// Snapshot of a map-valued field, safe to walk while the live state
    /// keeps changing. `None` if the field is missing or not a map.
    pub fn iter(&self, field: &str) -> Option<btree_map::IntoIter<String, Value>> {
        let snapshot = if field == PLAYERS {
            self.players.clone()
        } else {
            self.extra.get(field)?.as_map()?.clone()
        };
        Some(snapshot.into_iter())
    }

    /// Snapshot of the players map.
    pub fn players(&self) -> btree_map::IntoIter<String, Value> {
        self.players.clone().into_iter()
    }

    /// Fields defined by the game-specific layer.
    pub fn extra(&self) -> &Fields {
        &self.extra
    }

    /// Set a game-specific field. Reserved names have typed fields of their
    /// own and are refused.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, FieldError> {
        let name = name.into();
        if matches!(name.as_str(), TIME_ORDER | GAME_STATUS | PLAYERS) {
            return Err(FieldError::Reserved { field: name });
        }
        Ok(self.extra.insert(name, value.into()))
    }

    /// Remove a game-specific field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.extra.remove(name)
    }

    /// Owned copy of a field, reserved ones included.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            TIME_ORDER => Some(self.time_order.to_value()),
            GAME_STATUS => Some(Value::Int(self.game_status.code())),
            PLAYERS => Some(Value::Map(self.players.clone())),
            _ => self.extra.get(name).cloned(),
        }
    }
}

impl Record for GameState {
    const BODY_TYPE: &'static str = "GameState";

    fn to_fields(&self) -> Fields {
        let mut fields = self.extra.clone();
        fields.insert(TIME_ORDER.into(), self.time_order.to_value());
        fields.insert(GAME_STATUS.into(), Value::Int(self.game_status.code()));
        fields.insert(PLAYERS.into(), Value::Map(self.players.clone()));
        fields
    }

    fn from_fields(fields: Fields) -> Result<Self, FieldError> {
        let mut state = Self::default();
        for (name, value) in fields {
            match name.as_str() {
                TIME_ORDER => state.time_order = TimeOrder::from_value(&name, &value)?,
                GAME_STATUS => state.game_status = GameStatus::from_value(&name, &value)?,
                PLAYERS => match value {
                    Value::Map(players) => state.players = players,
                    other => return Err(FieldError::wrong_type(&name, "map", &other)),
                },
                _ => {
                    state.extra.insert(name, value);
                }
            }
        }
        Ok(state)
    }

    fn validate(&self) -> Result<(), FieldError> {
        self.time_order.check(TIME_ORDER).map(drop)
    }
}

/// A set of changes to carry out on a [`GameState`].
///
/// Field values are literals, nested maps (partial sub-updates) or the
/// deletion marker. Updates are transient: they are combined or applied and
/// then dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameStateUpdate {
    /// Ordering key assigned by the server.
    pub time_order: TimeOrder,
    /// Changed fields. `time_order` is kept out of this map.
    pub(crate) fields: Fields,
}

impl GameStateUpdate {
    /// Empty update at `time_order`.
    pub fn new(time_order: impl Into<TimeOrder>) -> Self {
        Self {
            time_order: time_order.into(),
            fields: Fields::new(),
        }
    }

    /// The identity for [`combine`](crate::merge::combine): older than any
    /// real update and carries no fields.
    pub fn neutral() -> Self {
        Self {
            time_order: TimeOrder::NEUTRAL,
            fields: Fields::new(),
        }
    }

    /// Update at `time_order` carrying `fields`, which must not name
    /// `time_order` itself.
    pub fn from_parts(
        time_order: impl Into<TimeOrder>,
        fields: Fields,
    ) -> Result<Self, FieldError> {
        if fields.contains_key(TIME_ORDER) {
            return Err(FieldError::Reserved {
                field: TIME_ORDER.into(),
            });
        }
        Ok(Self {
            time_order: time_order.into(),
            fields,
        })
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, FieldError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Set a field to a literal or nested sub-update.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), FieldError> {
        let name = name.into();
        if name == TIME_ORDER {
            return Err(FieldError::Reserved { field: name });
        }
        self.fields.insert(name, value.into());
        Ok(())
    }

    /// Mark a field for removal from the state.
    pub fn delete(&mut self, name: impl Into<String>) -> Result<(), FieldError> {
        self.set(name, Value::Delete)
    }

    /// Changed fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Field value, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether the update carries no field changes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Record for GameStateUpdate {
    const BODY_TYPE: &'static str = "GameStateUpdate";

    fn to_fields(&self) -> Fields {
        let mut fields = self.fields.clone();
        fields.insert(TIME_ORDER.into(), self.time_order.to_value());
        fields
    }

    fn from_fields(mut fields: Fields) -> Result<Self, FieldError> {
        let time_order = match fields.remove(TIME_ORDER) {
            Some(value) => TimeOrder::from_value(TIME_ORDER, &value)?,
            None => TimeOrder::default(),
        };
        Ok(Self { time_order, fields })
    }

    fn validate(&self) -> Result<(), FieldError> {
        self.time_order.check(TIME_ORDER).map(drop)
    }
}

/// Client-side intent sent to the authoritative server.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientActivity {
    /// What the client wants to do.
    pub activity_type: ActivityKind,
    /// Named parameters of the activity.
    pub activity_data: Fields,
}

impl Default for ClientActivity {
    fn default() -> Self {
        Self {
            activity_type: ActivityKind::PAUSE_GAME,
            activity_data: Fields::new(),
        }
    }
}

const ACTIVITY_TYPE: &str = "activity_type";
const ACTIVITY_DATA: &str = "activity_data";

impl Record for ClientActivity {
    const BODY_TYPE: &'static str = "ClientActivity";

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(ACTIVITY_TYPE.into(), Value::from(self.activity_type.code()));
        fields.insert(ACTIVITY_DATA.into(), Value::Map(self.activity_data.clone()));
        fields
    }

    fn from_fields(fields: Fields) -> Result<Self, FieldError> {
        let mut activity = Self::default();
        for (name, value) in fields {
            match name.as_str() {
                ACTIVITY_TYPE => activity.activity_type = ActivityKind(code_field(&name, &value)?),
                ACTIVITY_DATA => match value {
                    Value::Map(data) => activity.activity_data = data,
                    other => return Err(FieldError::wrong_type(&name, "map", &other)),
                },
                _ => {
                    return Err(FieldError::UnknownField {
                        record: Self::BODY_TYPE,
                        field: name,
                    })
                }
            }
        }
        Ok(activity)
    }
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// What went wrong.
    pub error_type: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorMessage {
    /// Create an error message.
    pub fn new(error_type: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

impl Default for ErrorMessage {
    fn default() -> Self {
        Self::new(ErrorKind::REQUEST_INVALID, "")
    }
}

const ERROR_TYPE: &str = "error_type";
const MESSAGE: &str = "message";

impl Record for ErrorMessage {
    const BODY_TYPE: &'static str = "ErrorMessage";

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(ERROR_TYPE.into(), Value::from(self.error_type.code()));
        fields.insert(MESSAGE.into(), Value::Str(self.message.clone()));
        fields
    }

    fn from_fields(fields: Fields) -> Result<Self, FieldError> {
        let mut error = Self::default();
        for (name, value) in fields {
            match name.as_str() {
                ERROR_TYPE => error.error_type = ErrorKind(code_field(&name, &value)?),
                MESSAGE => match value {
                    Value::Str(message) => error.message = message,
                    other => return Err(FieldError::wrong_type(&name, "string", &other)),
                },
                _ => {
                    return Err(FieldError::UnknownField {
                        record: Self::BODY_TYPE,
                        field: name,
                    })
                }
            }
        }
        Ok(error)
    }
}

fn code_field(field: &str, value: &Value) -> Result<u32, FieldError> {
    let code = value
        .as_int()
        .ok_or_else(|| FieldError::wrong_type(field, "int", value))?;
    u32::try_from(code).map_err(|_| FieldError::UnknownCode {
        field: field.to_string(),
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::fields;

    #[test]
    fn time_order_orders_mixed_keys() {
        assert!(TimeOrder::from(3) < TimeOrder::from(3.5));
        assert!(TimeOrder::NEUTRAL < TimeOrder::from(i64::MIN));
        assert_eq!(TimeOrder::from(4), TimeOrder::from(4.0));
    }

    #[test]
    fn integral_time_order_encodes_as_int() {
        assert_eq!(TimeOrder::from(6).to_value(), Value::Int(6));
        assert_eq!(TimeOrder::from(3.5).to_value(), Value::Float(3.5));
        assert_eq!(TimeOrder::NEUTRAL.to_value(), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn game_state_fields_round_trip() {
        let mut state = GameState::new(7, GameStatus::Active);
        state
            .players
            .insert("p1".into(), Value::Map(fields([("x", 1)])));
        state.extra.insert("score".into(), Value::Int(42));

        let restored = GameState::from_fields(state.to_fields()).unwrap();

        assert_eq!(restored, state);
    }

    #[test]
    fn game_state_rejects_bad_status() {
        let err = GameState::from_fields(fields([(GAME_STATUS, 9)])).unwrap_err();
        assert_eq!(
            err,
            FieldError::UnknownCode {
                field: GAME_STATUS.into(),
                code: 9
            }
        );

        let err = GameState::from_fields(fields([(PLAYERS, "nobody")])).unwrap_err();
        assert!(matches!(err, FieldError::WrongType { expected: "map", .. }));
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let state = GameState::from_fields(Fields::new()).unwrap();
        assert_eq!(state, GameState::default());
        assert!(state.is_paused());
    }

    #[test]
    fn iter_is_a_snapshot() {
        let mut state = GameState::default();
        state.players.insert("a".into(), Value::Int(1));
        state.extra.insert("npcs".into(), Value::Map(fields([("n", 2)])));

        let snapshot = state.iter(PLAYERS).unwrap();
        state.players.insert("b".into(), Value::Int(2));

        let keys: Vec<_> = snapshot.map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a".to_string()]);
        assert_eq!(state.iter("npcs").unwrap().count(), 1);
        assert!(state.iter("missing").is_none());
        assert_eq!(state.players().count(), 2);
    }

    #[test]
    fn get_covers_reserved_fields() {
        let mut state = GameState::new(7, GameStatus::Active);
        state.extra.insert("score".into(), Value::Int(3));

        assert_eq!(state.get(TIME_ORDER), Some(Value::Int(7)));
        assert_eq!(state.get(GAME_STATUS), Some(Value::Int(2)));
        assert_eq!(state.get(PLAYERS), Some(Value::Map(Fields::new())));
        assert_eq!(state.get("score"), Some(Value::Int(3)));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn update_keeps_time_order_out_of_fields() {
        let update = GameStateUpdate::from_fields(fields([
            (TIME_ORDER, Value::Float(3.5)),
            ("foo", Value::Int(1)),
        ]))
        .unwrap();
        assert_eq!(update.time_order, TimeOrder(3.5));
        assert!(update.get(TIME_ORDER).is_none());
        assert_eq!(update.get("foo"), Some(&Value::Int(1)));
    }

    #[test]
    fn time_order_rejects_nan_and_positive_infinity() {
        for bad in [Value::Float(f64::NAN), Value::Float(f64::INFINITY)] {
            assert!(matches!(
                TimeOrder::from_value(TIME_ORDER, &bad),
                Err(FieldError::NonFinite { .. })
            ));
        }
        let neutral = TimeOrder::from_value(TIME_ORDER, &TimeOrder::NEUTRAL.to_value()).unwrap();
        assert_eq!(neutral, TimeOrder::NEUTRAL);

        let err = GameStateUpdate::from_fields(fields([(TIME_ORDER, f64::NAN)])).unwrap_err();
        assert!(matches!(err, FieldError::NonFinite { .. }));
        assert!(GameStateUpdate::new(f64::NAN).validate().is_err());
        assert!(GameState::new(f64::INFINITY, GameStatus::Paused).validate().is_err());
    }

    #[test]
    fn negative_zero_time_order_round_trips() {
        let update = GameStateUpdate::new(-0.0);
        let restored = GameStateUpdate::from_fields(update.to_fields()).unwrap();
        assert_eq!(restored, update);
    }

    #[test]
    fn reserved_names_are_refused() {
        let mut state = GameState::default();
        for name in [TIME_ORDER, GAME_STATUS, PLAYERS] {
            assert_eq!(
                state.insert(name, 1),
                Err(FieldError::Reserved { field: name.into() })
            );
        }
        assert_eq!(state.insert("score", 1), Ok(None));
        assert_eq!(state.remove("score"), Some(Value::Int(1)));

        let mut update = GameStateUpdate::new(1);
        assert!(update.set(TIME_ORDER, 2).is_err());
        assert!(update.delete(TIME_ORDER).is_err());
        assert!(GameStateUpdate::from_parts(1, fields([(TIME_ORDER, 2)])).is_err());
        assert!(update.is_empty());

        // Game status and players are plain fields of an update.
        update.set(GAME_STATUS, 2).unwrap();
        let restored = GameStateUpdate::from_fields(update.to_fields()).unwrap();
        assert_eq!(restored, update);
    }

    #[test]
    fn error_message_rejects_unknown_fields() {
        let err = ErrorMessage::from_fields(fields([("oops", 1)])).unwrap_err();
        assert!(matches!(err, FieldError::UnknownField { .. }));
    }

    #[test]
    fn activity_rejects_negative_code() {
        let err = ClientActivity::from_fields(fields([(ACTIVITY_TYPE, -1)])).unwrap_err();
        assert!(matches!(err, FieldError::UnknownCode { code: -1, .. }));
    }

    #[test]
    fn player_id_displays_as_hex() {
        let id = PlayerId([0xde, 0xad, 0x00, 0x01]);
        assert_eq!(id.key(), "dead0001");
        assert_eq!(PlayerId::from_value(&id.to_value()), Some(id));
    }
}
