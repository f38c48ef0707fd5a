//! Mapping between the domain identifiers and the numeric indexes used in solver variable names.

use crate::{GroupId, OptimizerError, UserId};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

/// Bidirectional mapping of group ids to dense group indexes `0..num_groups()`, together with the
/// set of users taking part in the optimization. Never changes after construction, so it can be
/// shared between the model compiler and the output reader thread.
#[derive(Debug)]
pub struct Registry {
    user_ids: BTreeSet<UserId>,
    /// Group id of each group index
    group_ids: Vec<GroupId>,
    /// Inverse of `group_ids`
    group_indexes: HashMap<GroupId, usize>,
}

impl Registry {
    /// Create the registry. Group indexes are assigned in the order of `group_ids`.
    ///
    /// # Errors
    /// Fails with `OptimizerError::DuplicateGroup`, if a group id is given more than once.
    pub fn new<U, G>(user_ids: U, group_ids: G) -> Result<Self, OptimizerError>
    where
        U: IntoIterator<Item = UserId>,
        G: IntoIterator,
        G::Item: Into<GroupId>,
    {
        let group_ids: Vec<GroupId> = group_ids.into_iter().map(Into::into).collect();
        let mut group_indexes = HashMap::with_capacity(group_ids.len());
        for (index, group) in group_ids.iter().enumerate() {
            if group_indexes.insert(group.clone(), index).is_some() {
                return Err(OptimizerError::DuplicateGroup(group.clone()));
            }
        }

        Ok(Registry {
            user_ids: user_ids.into_iter().collect(),
            group_ids,
            group_indexes,
        })
    }

    pub fn numeric_group_id(&self, group: &str) -> Result<usize, OptimizerError> {
        self.group_indexes
            .get(group)
            .copied()
            .ok_or_else(|| OptimizerError::UnknownGroup(group.to_owned()))
    }

    pub fn string_group_id(&self, index: usize) -> Result<&str, OptimizerError> {
        self.group_ids
            .get(index)
            .map(String::as_str)
            .ok_or(OptimizerError::UnknownGroupIndex(index))
    }

    /// Iterate all groups as (group index, group id) in index order
    pub fn groups(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.group_ids
            .iter()
            .enumerate()
            .map(|(index, group)| (index, group.as_str()))
    }

    pub fn all_user_ids(&self) -> &BTreeSet<UserId> {
        &self.user_ids
    }

    pub fn all_numeric_group_ids(&self) -> Range<usize> {
        0..self.group_ids.len()
    }

    pub fn num_groups(&self) -> usize {
        self.group_ids.len()
    }
}
