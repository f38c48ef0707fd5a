//! Parser for the textual output of the solver.

use crate::naming::parse_assignment_var;
use crate::{Assignment, OptimizerError, Registry};
use log::trace;

/// Collects the user to group assignment from the solver's output, line by line.
///
/// Only lines of the form `u<user>g<group index> <0|1>` are interpreted (this is how e.g.
/// `lp_solve -S3` prints the values of the variables). All other lines (headers, objective value,
/// the broken friendship variables, ...) are ignored.
pub struct SolutionParser<'a> {
    registry: &'a Registry,
    assignment: Assignment,
}

impl<'a> SolutionParser<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        SolutionParser {
            registry,
            assignment: Assignment::new(),
        }
    }

    /// Interpret a single line of solver output.
    ///
    /// # Errors
    /// - `OptimizerError::InconsistentAssignment`, if the user has already been assigned to a
    ///   different group by a previous line
    /// - `OptimizerError::UnknownGroupIndex`, if the group index is not known to the registry
    pub fn parse_line(&mut self, line: &str) -> Result<(), OptimizerError> {
        let (user, group_index, value) = match split_assignment_line(line) {
            Some(x) => x,
            None => return Ok(()),
        };
        if !value {
            return Ok(());
        }

        let group = self.registry.string_group_id(group_index)?;
        trace!("Solver assigned user {} to group '{}'", user, group);
        match self.assignment.get(&user) {
            Some(previous) if previous != group => Err(OptimizerError::InconsistentAssignment {
                user,
                first: previous.clone(),
                second: group.to_owned(),
            }),
            Some(_) => Ok(()),
            None => {
                self.assignment.insert(user, group.to_owned());
                Ok(())
            }
        }
    }

    /// The assignment collected so far. Only complete after the whole solver output has been
    /// parsed.
    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn into_assignment(self) -> Assignment {
        self.assignment
    }
}

/// Split a line of the form `u<digits>g<digits><whitespace><0|1>` into user id, group index and
/// value. Trailing whitespace (esp. a '\r') is tolerated, leading whitespace is not.
fn split_assignment_line(line: &str) -> Option<(crate::UserId, usize, bool)> {
    let line = line.trim_end();
    let split_at = line.find(char::is_whitespace)?;
    let (name, value) = line.split_at(split_at);
    let (user, group_index) = parse_assignment_var(name)?;
    let value = match value.trim_start() {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    Some((user, group_index, value))
}
