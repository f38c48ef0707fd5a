//! Names of the solver variables. The model compiler generates them and the solution parser
//! recognizes them again, so both directions live here.

use crate::UserId;

/// Name of the binary variable "user is in group (by numeric group index)"
pub fn assignment_var(user: UserId, group_index: usize) -> String {
    format!("u{}g{}", user, group_index)
}

/// Name of the binary variable "user and friend ended up in different groups"
pub fn broken_friendship_var(user: UserId, friend: UserId) -> String {
    format!("bf{}_{}", user, friend)
}

/// Inverse of `assignment_var()`. Returns None for anything that is not exactly of the form
/// `u<digits>g<digits>`.
pub fn parse_assignment_var(name: &str) -> Option<(UserId, usize)> {
    let (user, group) = name.strip_prefix('u')?.split_once('g')?;
    Some((parse_digits(user)?, parse_digits(group)?))
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    // `parse()` would also accept a leading '+'
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
