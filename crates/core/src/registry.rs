//! Name to code registries for package, error and activity kinds.
//!
//! Registries are append-only. Higher layers extend them (for example with a
//! `"Jump"` activity) during startup, before any traffic is decoded; after
//! that they are shared read-only. Nothing here enforces the startup phase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Error returned when extending a [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is already registered.
    #[error("kind `{name}` is already registered with code {code}")]
    Duplicate {
        /// Offending name.
        name: String,
        /// Code the name already maps to.
        code: u32,
    },
    /// Names must be non-empty.
    #[error("kind names cannot be empty")]
    EmptyName,
}

/// Append-only mapping between kind names and integer codes.
///
/// Codes start at 1 and are never reused for the lifetime of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    by_name: BTreeMap<String, u32>,
    by_code: BTreeMap<u32, String>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `names`, coded from 1 in order.
    pub fn with_names<I, S>(names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.add(name)?;
        }
        Ok(registry)
    }

    /// Register `name` under the next unused code and return that code.
    pub fn add(&mut self, name: impl Into<String>) -> Result<u32, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(&code) = self.by_name.get(&name) {
            return Err(RegistryError::Duplicate { name, code });
        }

        let code = self.by_code.keys().next_back().map_or(1, |last| last + 1);
        debug!("Registered kind {name} as {code}");
        self.by_name.insert(name.clone(), code);
        self.by_code.insert(code, name);
        Ok(code)
    }

    /// Code registered for `name`.
    pub fn code(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Name registered for `code`.
    pub fn name(&self, code: u32) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    /// Whether `code` is known.
    pub fn contains(&self, code: u32) -> bool {
        self.by_code.contains_key(&code)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Iterate `(code, name)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_code.iter().map(|(code, name)| (*code, name.as_str()))
    }
}

macro_rules! kind_code {
    ($(#[$meta:meta])* $name:ident { $($(#[$cmeta:meta])* $konst:ident = $code:expr => $label:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            $($(#[$cmeta])* pub const $konst: Self = Self($code);)*

            /// Names of the pre-registered kinds in code order.
            pub const STANDARD_NAMES: &'static [&'static str] = &[$($label),*];

            /// Raw integer code.
            pub fn code(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let idx = self.0 as usize;
                match Self::STANDARD_NAMES.get(idx.wrapping_sub(1)) {
                    Some(label) => f.write_str(label),
                    None => write!(f, "{}({})", stringify!($name), self.0),
                }
            }
        }
    };
}

kind_code! {
    /// Package kind code carried in every packet header.
    PackageKind {
        /// Client asks for the full shared state.
        STATE_REQUEST = 1 => "StateRequest",
        /// Client asks for updates since its last known time order.
        STATE_UPDATE_REQUEST = 2 => "StateUpdateRequest",
        /// Client posts an activity.
        POST_ACTIVITY_REQUEST = 3 => "PostActivityRequest",
        /// Server answers a request.
        RESPONSE = 4 => "Response",
        /// Server reports an error.
        ERROR_RESPONSE = 5 => "ErrorResponse",
    }
}

kind_code! {
    /// Error kind carried by an error message.
    ErrorKind {
        /// No response arrived in time; raised by the transport.
        REQUEST_TIMEOUT = 1 => "RequestTimeout",
        /// Bytes could not be unpacked.
        UNPACK_ERROR = 2 => "UnpackError",
        /// Well-formed but not actionable.
        REQUEST_INVALID = 3 => "RequestInvalid",
        /// Client time order is too stale to diff from.
        OUT_OF_SYNC = 4 => "OutOfSync",
    }
}

kind_code! {
    /// Activity kind carried by a client activity. Open set; game layers
    /// register more through [`Registries::activity_kinds`].
    ActivityKind {
        /// Pause the game loop.
        PAUSE_GAME = 1 => "PauseGame",
        /// Resume the game loop.
        RESUME_GAME = 2 => "ResumeGame",
        /// Join a player.
        JOIN_SERVER = 3 => "JoinServer",
        /// Remove a player.
        LEAVE_SERVER = 4 => "LeaveServer",
    }
}

/// The three kind registries used by encode, decode and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registries {
    /// Package kinds.
    pub package_kinds: Registry,
    /// Error kinds.
    pub error_kinds: Registry,
    /// Activity kinds.
    pub activity_kinds: Registry,
}

impl Registries {
    /// Registries holding only the pre-registered kinds.
    pub fn standard() -> Self {
        Self {
            package_kinds: standard(PackageKind::STANDARD_NAMES),
            error_kinds: standard(ErrorKind::STANDARD_NAMES),
            activity_kinds: standard(ActivityKind::STANDARD_NAMES),
        }
    }

    /// Register a game-specific activity kind.
    pub fn add_activity(&mut self, name: impl Into<String>) -> Result<ActivityKind, RegistryError> {
        self.activity_kinds.add(name).map(ActivityKind)
    }

    /// Look up an activity kind by name.
    pub fn activity(&self, name: &str) -> Option<ActivityKind> {
        self.activity_kinds.code(name).map(ActivityKind)
    }

    /// Name of an activity kind, including game-specific ones.
    pub fn activity_name(&self, kind: ActivityKind) -> Option<&str> {
        self.activity_kinds.name(kind.0)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::standard()
    }
}

/// Registry whose codes follow the order of `names`, starting at 1.
fn standard(names: &[&str]) -> Registry {
    let mut registry = Registry::new();
    for (code, name) in (1u32..).zip(names) {
        registry.by_name.insert(name.to_string(), code);
        registry.by_code.insert(code, name.to_string());
    }
    registry
}
