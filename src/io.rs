pub mod simple;

use crate::{Assignment, GroupId};
use std::fmt::Write;

/// Format the calculated group assignment into a human readable String (e.g. to print it to
/// stdout).
///
/// The output format will look like
/// ```text
/// ===== Group name =====
/// 17
/// 42
///
/// ===== Another group name =====
///
/// ===== A third group name =====
/// …
/// ```
pub fn format_assignment(assignment: &Assignment, group_ids: &[GroupId]) -> String {
    let mut result = String::new();
    for group in group_ids.iter() {
        write!(result, "\n===== {} =====\n", group).unwrap();
        for (user, assigned_group) in assignment.iter() {
            if assigned_group == group {
                writeln!(result, "{}", user).unwrap();
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::Assignment;

    #[test]
    fn test_format_assignment() {
        let assignment: Assignment = vec![(3, "A"), (1, "B"), (2, "A")]
            .into_iter()
            .map(|(u, g)| (u, g.to_owned()))
            .collect();
        let groups = vec!["A".to_owned(), "B".to_owned(), "C".to_owned()];
        assert_eq!(
            super::format_assignment(&assignment, &groups),
            "\n===== A =====\n2\n3\n\n===== B =====\n1\n\n===== C =====\n"
        );
    }
}
