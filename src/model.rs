//! Compiler of the group assignment problem into the LP file format of the external solver.
//!
//! The integer program uses two kinds of binary variables (see `crate::naming`):
//! - `u{user}g{group}` is 1 iff the user is assigned to the group (by numeric group index)
//! - `bf{user}_{friend}` is 1 iff the friendship of user with friend is broken, i.e. both end up
//!   in different groups
//!
//! The objective is the sum of the preference weights of all assignment variables plus the
//! weighted broken friendship variables. It is minimized subject to
//! 1. every user is in exactly one group,
//! 2. every group size is within the bounds calculated by `group_size_bounds()`,
//! 3. `bf{u}_{f} >= u{u}g{g} - u{f}g{g}` for every friendship and every group. If u and f are in
//!    different groups, this forces the broken friendship variable to 1 for the group of u. The
//!    minimization keeps it at 0 otherwise.

use crate::naming::{assignment_var, broken_friendship_var};
use crate::{GroupPreferences, Preference, Registry, TeamPreferences, UserId};
use std::iter::{once, Peekable};

/// Objective weight of an assignment variable for a user without preference for that group
pub const UNSPECIFIED_WEIGHT: u32 = 50;

/// Total objective weight of all broken friendships of a single user
pub const FRIENDSHIP_WEIGHT: u32 = 100;

/// Maximum number of variables written into a single line of the model file
const TERMS_PER_LINE: usize = 10;

/// Objective weight for a user being assigned to a group with the given preference (`None` means
/// the user did not specify a preference for the group).
pub fn preference_weight(preference: Option<Preference>) -> u32 {
    match preference {
        Some(Preference::Preferred) => 1,
        Some(Preference::Possible) => 3,
        Some(Preference::Dislike) => 10,
        Some(Preference::Impossible) => 200,
        None => UNSPECIFIED_WEIGHT,
    }
}

/// Objective weight of every single broken friendship of a user with `num_friends` friends.
///
/// The weight is not normalized across users: users listing more friends get a smaller penalty for
/// each broken friendship.
pub fn friendship_weight(num_friends: usize) -> u32 {
    if num_friends == 0 {
        return 0;
    }
    FRIENDSHIP_WEIGHT / num_friends as u32
}

/// Calculate (minimum, maximum) number of users per group from the number of users and groups.
///
/// Integer division is intended: 10 users in 4 groups give the bounds (1, 3).
pub fn group_size_bounds(num_users: usize, num_groups: usize) -> (usize, usize) {
    let min = num_users
        .checked_div(num_groups)
        .unwrap_or(0)
        .saturating_sub(1);
    (min, min + 2)
}

/// Generate the LP model for the given problem as a sequence of lines (without line terminators).
///
/// The lines are generated lazily, so they can be streamed into the solver process without
/// building the whole model in memory. The output is deterministic: users are processed in
/// ascending order and groups in the order of their index in the `registry`.
///
/// The inputs are expected to be consistent (see `crate::optimizer::validate_preferences()`):
/// every user in `team_preferences` and every listed friend is part of the registry, and no friend
/// is listed twice. The users are taken from the registry, which mirrors the key set of
/// `group_preferences`.
pub fn compile<'a>(
    registry: &'a Registry,
    group_preferences: &'a GroupPreferences,
    team_preferences: &'a TeamPreferences,
) -> impl Iterator<Item = String> + 'a {
    let users = move || registry.all_user_ids().iter().copied();

    // Objective function
    let preference_terms = users().flat_map(move |user| {
        let preferences = group_preferences.get(&user);
        registry.groups().map(move |(index, group)| {
            let weight = preference_weight(preferences.and_then(|p| p.get(group)).copied());
            format!("+{} {}", weight, assignment_var(user, index))
        })
    });
    let friendship_terms = friendships(team_preferences).flat_map(|(user, friends)| {
        let weight = friendship_weight(friends.len());
        friends
            .iter()
            .map(move |friend| format!("+{} {}", weight, broken_friendship_var(user, *friend)))
    });
    let objective = once("/* Objective function */".to_owned()).chain(Statement::new(
        "min:",
        preference_terms.chain(friendship_terms),
        "",
        ";",
    ));

    // Constraint 1: Each user is in exactly one group
    let one_group = users().flat_map(move |user| {
        Statement::new(
            "",
            registry
                .groups()
                .map(move |(index, _)| format!("+{}", assignment_var(user, index))),
            "",
            " = 1;",
        )
    });

    // Constraint 2: Group sizes
    let (min_size, max_size) = group_size_bounds(group_preferences.len(), registry.num_groups());
    let group_sizes = registry.all_numeric_group_ids().flat_map(move |index| {
        Statement::new(
            &format!("{} <=", min_size),
            users().map(move |user| format!("+{}", assignment_var(user, index))),
            "",
            &format!(" <= {};", max_size),
        )
    });

    // Constraint 3: Broken friendships
    let broken_friendships = friendships(team_preferences).flat_map(move |(user, friends)| {
        friends.iter().flat_map(move |friend| {
            let friend = *friend;
            registry.all_numeric_group_ids().map(move |index| {
                format!(
                    "{} >= {} - {};",
                    broken_friendship_var(user, friend),
                    assignment_var(user, index),
                    assignment_var(friend, index)
                )
            })
        })
    });

    // Declarations
    let assignment_declarations = users().flat_map(move |user| {
        Statement::new(
            "bin",
            registry
                .all_numeric_group_ids()
                .map(move |index| assignment_var(user, index)),
            ",",
            ";",
        )
    });
    let friendship_declarations = friendships(team_preferences).flat_map(|(user, friends)| {
        Statement::new(
            "bin",
            friends
                .iter()
                .map(move |friend| broken_friendship_var(user, *friend)),
            ",",
            ";",
        )
    });

    objective
        .chain(once(String::new()))
        .chain(once("/* Each user is in exactly one group */".to_owned()))
        .chain(one_group)
        .chain(once(String::new()))
        .chain(once("/* Group sizes */".to_owned()))
        .chain(group_sizes)
        .chain(once(String::new()))
        .chain(once("/* Broken friendships */".to_owned()))
        .chain(broken_friendships)
        .chain(once(String::new()))
        .chain(once("/* Declarations */".to_owned()))
        .chain(assignment_declarations)
        .chain(friendship_declarations)
}

/// Iterate the users with at least one friend, together with their friends
fn friendships(
    team_preferences: &TeamPreferences,
) -> impl Iterator<Item = (UserId, &[UserId])> + '_ {
    team_preferences
        .iter()
        .filter(|(_, friends)| !friends.is_empty())
        .map(|(user, friends)| (*user, friends.as_slice()))
}

/// Iterator over the lines of a single LP statement, wrapping the terms after every
/// `TERMS_PER_LINE` terms.
///
/// The first line starts with the `head`, the last line ends with the `tail`. Terms are joined by
/// the `separator` and a space. A statement without any terms gets a single `0` term.
struct Statement<I: Iterator<Item = String>> {
    head: Option<String>,
    terms: Peekable<I>,
    separator: &'static str,
    tail: String,
    finished: bool,
}

impl<I: Iterator<Item = String>> Statement<I> {
    fn new(head: &str, terms: I, separator: &'static str, tail: &str) -> Self {
        Statement {
            head: Some(head.to_owned()),
            terms: terms.peekable(),
            separator,
            tail: tail.to_owned(),
            finished: false,
        }
    }
}

impl<I: Iterator<Item = String>> Iterator for Statement<I> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        let first_line = self.head.is_some();
        let mut line = self.head.take().unwrap_or_else(|| "   ".to_owned());
        if first_line && self.terms.peek().is_none() {
            push_term(&mut line, "0");
        }
        for _ in 0..TERMS_PER_LINE {
            match self.terms.next() {
                Some(term) => {
                    push_term(&mut line, &term);
                    if self.terms.peek().is_some() {
                        line.push_str(self.separator);
                    }
                }
                None => break,
            }
        }

        if self.terms.peek().is_none() {
            line.push_str(&self.tail);
            self.finished = true;
        }
        Some(line)
    }
}

fn push_term(line: &mut String, term: &str) {
    if !line.is_empty() {
        line.push(' ');
    }
    line.push_str(term);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{preferences_from_list, Preference::*};
    use std::collections::BTreeSet;

    fn compile_to_vec(
        groups: &[&str],
        group_preferences: &GroupPreferences,
        team_preferences: &TeamPreferences,
    ) -> Vec<String> {
        let registry =
            Registry::new(group_preferences.keys().copied(), groups.iter().copied()).unwrap();
        compile(&registry, group_preferences, team_preferences).collect()
    }

    /// Find the objective function statement and return it as a single string
    fn objective(lines: &[String]) -> String {
        let start = lines.iter().position(|l| l.starts_with("min:")).unwrap();
        let end = start + lines[start..].iter().position(|l| l.ends_with(';')).unwrap();
        lines[start..=end].join(" ")
    }

    #[test]
    fn test_weight_monotonicity() {
        let weights: Vec<u32> = [
            Some(Preferred),
            Some(Possible),
            Some(Dislike),
            None,
            Some(Impossible),
        ]
        .iter()
        .map(|p| preference_weight(*p))
        .collect();
        assert_eq!(weights, vec![1, 3, 10, 50, 200]);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_friendship_weight() {
        assert_eq!(friendship_weight(0), 0);
        assert_eq!(friendship_weight(1), 100);
        assert_eq!(friendship_weight(3), 33);
        assert_eq!(friendship_weight(7), 14);
        assert_eq!(friendship_weight(200), 0);
    }

    #[test]
    fn test_group_size_bounds() {
        assert_eq!(group_size_bounds(10, 4), (1, 3));
        assert_eq!(group_size_bounds(3, 2), (0, 2));
        assert_eq!(group_size_bounds(20, 4), (4, 6));
        assert_eq!(group_size_bounds(1, 5), (0, 2));
        assert_eq!(group_size_bounds(0, 0), (0, 2));
    }

    #[test]
    fn test_small_model() {
        let group_preferences =
            preferences_from_list(vec![(1, vec![("A", Preferred)]), (2, vec![("B", Possible)])]);
        let mut team_preferences = TeamPreferences::new();
        team_preferences.insert(1, vec![2]);
        team_preferences.insert(2, vec![]);

        let lines = compile_to_vec(&["A", "B"], &group_preferences, &team_preferences);
        let expected = vec![
            "/* Objective function */",
            "min: +1 u1g0 +50 u1g1 +50 u2g0 +3 u2g1 +100 bf1_2;",
            "",
            "/* Each user is in exactly one group */",
            "+u1g0 +u1g1 = 1;",
            "+u2g0 +u2g1 = 1;",
            "",
            "/* Group sizes */",
            "0 <= +u1g0 +u2g0 <= 2;",
            "0 <= +u1g1 +u2g1 <= 2;",
            "",
            "/* Broken friendships */",
            "bf1_2 >= u1g0 - u2g0;",
            "bf1_2 >= u1g1 - u2g1;",
            "",
            "/* Declarations */",
            "bin u1g0, u1g1;",
            "bin u2g0, u2g1;",
            "bin bf1_2;",
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_friendship_terms() {
        let group_preferences = preferences_from_list(vec![(1, vec![]), (2, vec![]), (3, vec![]), (4, vec![])]);
        let mut team_preferences = TeamPreferences::new();
        team_preferences.insert(1, vec![2, 3, 4]);
        team_preferences.insert(3, vec![1]);

        let lines = compile_to_vec(&["A"], &group_preferences, &team_preferences);
        let objective = objective(&lines);
        for var in ["bf1_2", "bf1_3", "bf1_4"].iter() {
            assert!(objective.contains(&format!("+33 {}", var)), "{}", objective);
        }
        assert!(objective.contains("+100 bf3_1"));
        assert!(!objective.contains("bf2_"));
        assert!(!objective.contains("bf4_"));
        assert!(lines.contains(&"bf3_1 >= u3g0 - u1g0;".to_owned()));
        assert_eq!(lines.iter().filter(|l| l.starts_with("bf")).count(), 4);
    }

    #[test]
    fn test_wrapping() {
        let group_preferences = preferences_from_list((1..=25).map(|u| (u, vec![])).collect());
        let lines = compile_to_vec(&["A", "B"], &group_preferences, &TeamPreferences::new());

        // 50 objective terms in 5 lines
        let start = lines.iter().position(|l| l.starts_with("min:")).unwrap();
        assert!(lines[start..start + 4].iter().all(|l| !l.ends_with(';')));
        assert!(lines[start + 4].ends_with("+50 u25g1;"));
        assert!(lines[start + 1].starts_with("    +50 "));

        // group size constraint with 25 terms in 3 lines
        let start = lines.iter().position(|l| l.starts_with("11 <=")).unwrap();
        assert_eq!(lines[start].matches("+u").count(), 10);
        assert_eq!(lines[start + 1].matches("+u").count(), 10);
        assert_eq!(lines[start + 2], "    +u21g0 +u22g0 +u23g0 +u24g0 +u25g0 <= 13;");

        let declarations = lines
            .iter()
            .skip_while(|l| !l.starts_with("bin"))
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(declarations.len(), 25);
        assert_eq!(declarations[24], "bin u25g0, u25g1;");
    }

    #[test]
    fn test_wrapped_declaration() {
        let groups: Vec<String> = (0..12).map(|g| format!("G{}", g)).collect();
        let group_preferences = preferences_from_list(vec![(7, vec![])]);
        let registry =
            Registry::new(vec![7], groups.iter().map(String::as_str)).unwrap();
        let lines: Vec<String> =
            compile(&registry, &group_preferences, &TeamPreferences::new()).collect();

        let start = lines.iter().position(|l| l.starts_with("bin")).unwrap();
        assert_eq!(
            lines[start],
            "bin u7g0, u7g1, u7g2, u7g3, u7g4, u7g5, u7g6, u7g7, u7g8, u7g9,"
        );
        assert_eq!(lines[start + 1], "    u7g10, u7g11;");
        assert_eq!(lines.len(), start + 2);
    }

    #[test]
    fn test_declarations_complete_and_unique() {
        let group_preferences = preferences_from_list(vec![
            (1, vec![("A", Preferred), ("C", Impossible)]),
            (2, vec![("B", Dislike)]),
            (3, vec![]),
        ]);
        let mut team_preferences = TeamPreferences::new();
        team_preferences.insert(1, vec![2, 3]);
        team_preferences.insert(2, vec![1]);

        let lines = compile_to_vec(&["A", "B", "C"], &group_preferences, &team_preferences);
        let declared: Vec<String> = lines
            .iter()
            .skip_while(|l| !l.starts_with("bin"))
            .flat_map(|l| {
                l.trim_start_matches("bin")
                    .split(|c| c == ',' || c == ';')
                    .map(|v| v.trim().to_owned())
                    .filter(|v| !v.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();
        let unique: BTreeSet<&String> = declared.iter().collect();
        assert_eq!(declared.len(), unique.len());
        assert_eq!(declared.len(), 3 * 3 + 3);

        // All variables in the objective function are declared
        let objective = objective(&lines);
        for var in objective
            .trim_start_matches("min:")
            .trim_end_matches(';')
            .split_whitespace()
            .filter(|t| !t.starts_with('+'))
        {
            assert!(unique.contains(&var.to_owned()), "{} not declared", var);
        }
    }

    #[test]
    fn test_group_without_members_gets_constraint() {
        let group_preferences = preferences_from_list(vec![(1, vec![("A", Preferred)])]);
        let lines = compile_to_vec(&["A", "B", "C"], &group_preferences, &TeamPreferences::new());
        assert!(lines.contains(&"0 <= +u1g2 <= 2;".to_owned()));
        assert_eq!(lines.iter().filter(|l| l.starts_with("0 <=")).count(), 3);
    }
}
