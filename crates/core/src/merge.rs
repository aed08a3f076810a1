//! Combining updates and applying them to a state.
//!
//! Both operations rest on [`recursive_update`]. `combine` coalesces pending
//! updates and never deletes; `apply` merges one update into a live state,
//! honors deletion markers, and only runs when the update is strictly newer.
//! Together they converge to the same state regardless of delivery order or
//! duplication.

use crate::state::{FieldError, GameState, GameStateUpdate, Record, GAME_STATUS, PLAYERS, TIME_ORDER};
use crate::value::{Fields, Value};
use std::collections::BTreeSet;
use std::iter::Sum;
use std::ops::Add;
use tracing::{debug, trace};

/// Merge `src` into `dst` key by key.
///
/// - deletion marker with `honor_deletions`: remove the key from `dst`
/// - map over map: descend
/// - anything else: overwrite
///
/// Nested maps are walked with an explicit worklist. When deletions are
/// honored, values copied into `dst` are stripped of deletion markers so a
/// concrete state never stores one.
pub fn recursive_update(dst: &mut Fields, src: &Fields, honor_deletions: bool) {
    let mut work: Vec<(&mut Fields, &Fields)> = vec![(dst, src)];

    while let Some((dst, src)) = work.pop() {
        let mut descend = BTreeSet::new();

        for (key, value) in src {
            if honor_deletions && value.is_deletion_marker() {
                dst.remove(key);
                continue;
            }
            match (dst.get(key), value) {
                (Some(Value::Map(_)), Value::Map(_)) => {
                    descend.insert(key.as_str());
                }
                _ => {
                    let value = if honor_deletions {
                        value.without_deletions()
                    } else {
                        value.clone()
                    };
                    dst.insert(key.clone(), value);
                }
            }
        }

        if descend.is_empty() {
            continue;
        }
        for (key, value) in dst.iter_mut() {
            if !descend.contains(key.as_str()) {
                continue;
            }
            if let (Value::Map(child_dst), Some(Value::Map(child_src))) = (value, src.get(key)) {
                work.push((child_dst, child_src));
            }
        }
    }
}

/// Coalesce two pending updates into one.
///
/// Fields of the older update are kept unless the newer one sets them; on a
/// tie in `time_order` the second argument counts as newer. Deletion markers
/// are carried through as values, never executed. The result has the larger
/// `time_order`.
pub fn combine(first: GameStateUpdate, second: GameStateUpdate) -> GameStateUpdate {
    let (mut older, newer) = if second.time_order >= first.time_order {
        (first, second)
    } else {
        (second, first)
    };
    recursive_update(&mut older.fields, &newer.fields, false);
    older.time_order = newer.time_order;
    older
}

/// Fold any number of updates into one. Empty input yields the neutral
/// update, which applies as a no-op.
///
/// Updates are folded oldest first, so the result does not depend on the
/// order they arrived in.
pub fn combine_all<I>(updates: I) -> GameStateUpdate
where
    I: IntoIterator<Item = GameStateUpdate>,
{
    let mut updates: Vec<_> = updates.into_iter().collect();
    updates.sort_by(|a, b| a.time_order.cmp(&b.time_order));
    updates
        .into_iter()
        .fold(GameStateUpdate::neutral(), combine)
}

/// Apply `update` to `state`. See [`GameState::apply`].
pub fn apply(update: &GameStateUpdate, state: &mut GameState) -> Result<bool, FieldError> {
    state.apply(update)
}

impl GameState {
    /// Merge `update` into this state if it is strictly newer.
    ///
    /// Returns `Ok(false)` for stale or duplicate updates, which leave the
    /// state untouched. On error the state is also left untouched.
    pub fn apply(&mut self, update: &GameStateUpdate) -> Result<bool, FieldError> {
        update.time_order.check(TIME_ORDER)?;
        if update.time_order <= self.time_order {
            trace!(
                "Skipping stale update {} (state at {})",
                update.time_order,
                self.time_order
            );
            return Ok(false);
        }

        let mut fields = self.to_fields();
        recursive_update(&mut fields, &update.to_fields(), true);
        for required in [TIME_ORDER, GAME_STATUS, PLAYERS] {
            if !fields.contains_key(required) {
                return Err(FieldError::Required {
                    field: required.to_string(),
                });
            }
        }
        let next = GameState::from_fields(fields)?;

        debug!(
            "Applied update {} over state {} ({} fields)",
            update.time_order,
            self.time_order,
            update.fields.len()
        );
        *self = next;
        Ok(true)
    }

    /// Apply several updates in any order. Returns how many were newer than
    /// the state at the time they were applied.
    pub fn apply_all<'a, I>(&mut self, updates: I) -> Result<usize, FieldError>
    where
        I: IntoIterator<Item = &'a GameStateUpdate>,
    {
        let mut sorted: Vec<_> = updates.into_iter().collect();
        sorted.sort_by(|a, b| a.time_order.cmp(&b.time_order));

        let mut applied = 0;
        for update in sorted {
            if self.apply(update)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

impl Add for GameStateUpdate {
    type Output = GameStateUpdate;

    fn add(self, rhs: GameStateUpdate) -> GameStateUpdate {
        combine(self, rhs)
    }
}

impl Sum for GameStateUpdate {
    fn sum<I: Iterator<Item = GameStateUpdate>>(iter: I) -> Self {
        combine_all(iter)
    }
}
