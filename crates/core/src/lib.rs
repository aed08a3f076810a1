#![warn(missing_docs)]
//! State model and merge engine shared by client and server.
//!
//! A [`GameState`] is only ever changed by applying [`GameStateUpdate`]s,
//! which are ordered by a scalar [`TimeOrder`]. Updates can be combined
//! before they are applied; see [`merge`].

pub mod activity;
pub mod merge;
pub mod registry;
pub mod state;
pub mod value;

pub use activity::{join_server_activity, leave_server_activity, toggle_pause_activity};
pub use merge::{apply, combine, combine_all, recursive_update};
pub use registry::{ActivityKind, ErrorKind, PackageKind, Registries, Registry, RegistryError};
pub use state::{
    ClientActivity, ErrorMessage, FieldError, GameState, GameStateUpdate, GameStatus, PlayerId,
    Record, TimeOrder,
};
pub use value::{fields, Fields, Value, DELETION_MARKER};
