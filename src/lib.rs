//! Optimus computes an assignment of users to groups, driven by group preferences and friend
//! preferences of the users, by compiling the problem into an integer program and handing it to
//! an external LP solver process.

pub mod error;
pub mod io;
mod naming;
pub mod model;
pub mod optimizer;
pub mod registry;
pub mod solution;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use error::OptimizerError;
pub use optimizer::{Optimizer, SolverConfig};
pub use registry::Registry;

/// Numeric identifier of a user
pub type UserId = u64;

/// Identifier of a group (arbitrary string)
pub type GroupId = String;

/// How much a user wants to be placed into a specific group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Preference {
    Preferred,
    Possible,
    Dislike,
    Impossible,
}

/// Group preferences of each user. The key set of this map is the roster of users to be assigned.
/// Groups without an entry are treated as unspecified.
pub type GroupPreferences = BTreeMap<UserId, BTreeMap<GroupId, Preference>>;

/// Friends each user wants to be grouped with. Friendship is directed.
pub type TeamPreferences = BTreeMap<UserId, Vec<UserId>>;

/// Result of the optimization: the group of each user
pub type Assignment = BTreeMap<UserId, GroupId>;

#[cfg(test)]
fn preferences_from_list(list: Vec<(UserId, Vec<(&str, Preference)>)>) -> GroupPreferences {
    list.into_iter()
        .map(|(user, prefs)| {
            (
                user,
                prefs
                    .into_iter()
                    .map(|(group, pref)| (group.to_owned(), pref))
                    .collect(),
            )
        })
        .collect()
}
