//! Ready-made client activities for the pre-registered activity kinds.

use crate::registry::ActivityKind;
use crate::state::{ClientActivity, GameState, PlayerId};
use crate::value::{Fields, Value};
use rand::Rng;

/// Activity data key holding the player's display name.
pub const NAME: &str = "name";
/// Activity data key holding the id generated on join.
pub const JOIN_ID: &str = "join_id";
/// Activity data key naming the player to remove.
pub const PLAYER_ID: &str = "player_id";

/// Join a player called `player_name`.
///
/// The random `join_id` identifies the player in the shared state, so names
/// need not be unique. The id is drawn from a plain thread RNG and is not
/// checked against already connected players.
pub fn join_server_activity(player_name: &str) -> ClientActivity {
    let join_id = PlayerId(rand::thread_rng().gen());
    let mut data = Fields::new();
    data.insert(NAME.into(), Value::from(player_name));
    data.insert(JOIN_ID.into(), join_id.to_value());
    ClientActivity {
        activity_type: ActivityKind::JOIN_SERVER,
        activity_data: data,
    }
}

/// Remove the player with `player_id` from the game.
pub fn leave_server_activity(player_id: PlayerId) -> ClientActivity {
    let mut data = Fields::new();
    data.insert(PLAYER_ID.into(), player_id.to_value());
    ClientActivity {
        activity_type: ActivityKind::LEAVE_SERVER,
        activity_data: data,
    }
}

/// Pause a running game or resume a paused one.
pub fn toggle_pause_activity(shared_state: &GameState) -> ClientActivity {
    let activity_type = if shared_state.is_paused() {
        ActivityKind::RESUME_GAME
    } else {
        ActivityKind::PAUSE_GAME
    };
    ClientActivity {
        activity_type,
        activity_data: Fields::new(),
    }
}

impl ClientActivity {
    /// Id generated by [`join_server_activity`].
    pub fn join_id(&self) -> Option<PlayerId> {
        self.activity_data.get(JOIN_ID).and_then(PlayerId::from_value)
    }

    /// Player named by [`leave_server_activity`].
    pub fn player_id(&self) -> Option<PlayerId> {
        self.activity_data.get(PLAYER_ID).and_then(PlayerId::from_value)
    }

    /// Player name carried by a join.
    pub fn player_name(&self) -> Option<&str> {
        self.activity_data.get(NAME).and_then(Value::as_str)
    }
}
