use crate::{GroupId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Everything that can make a group assignment run fail. There is no partial result: any of these
/// errors aborts the whole optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("group id '{0}' is given more than once")]
    DuplicateGroup(GroupId),
    #[error("unknown group '{0}'")]
    UnknownGroup(GroupId),
    #[error("group index {0} is out of range")]
    UnknownGroupIndex(usize),
    #[error("there are no groups to assign users to")]
    NoGroups,
    #[error("team preferences given for user {0}, who has no group preferences")]
    UnknownUser(UserId),
    #[error("user {user} lists unknown user {friend} as friend")]
    UnknownFriend { user: UserId, friend: UserId },
    #[error("user {user} lists user {friend} as friend more than once")]
    DuplicateFriend { user: UserId, friend: UserId },

    #[error("could not launch solver '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("communication with the solver failed: {0}")]
    Communication(#[from] std::io::Error),
    #[error("the solver output reader thread panicked")]
    ReaderPanicked,

    #[error("inconsistent assignment: user {user} is assigned to group '{first}' and '{second}'")]
    InconsistentAssignment {
        user: UserId,
        first: GroupId,
        second: GroupId,
    },
    #[error("solver exited with code {code}{}", format_stderr(.stderr))]
    SolverExit { code: i32, stderr: Vec<String> },
    #[error("solver was terminated by a signal{}", format_stderr(.stderr))]
    SolverTerminated { stderr: Vec<String> },
    #[error("solver did not finish within {0:?}")]
    Timeout(Duration),
    #[error("solver did not assign a group to users {0:?}")]
    IncompleteAssignment(Vec<UserId>),
    #[error("solver assigned a group to unknown user {0}")]
    UnexpectedUser(UserId),
}

fn format_stderr(stderr: &[String]) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::OptimizerError;

    #[test]
    fn exit_code_message() {
        let err = OptimizerError::SolverExit {
            code: 2,
            stderr: vec![],
        };
        assert_eq!(err.to_string(), "solver exited with code 2");

        let err = OptimizerError::SolverExit {
            code: 1,
            stderr: vec!["syntax error on line 3".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "solver exited with code 1:\nsyntax error on line 3"
        );
    }
}
