use crate::model::{friendship_weight, preference_weight};
use crate::{Assignment, GroupPreferences, TeamPreferences, UserId};

/// Calculate the objective value of the LP model for the given assignment, i.e. the sum of the
/// preference weights of all assigned groups plus the weights of all broken friendships.
///
/// Users missing in the `assignment` are not counted.
pub fn assignment_penalty(
    assignment: &Assignment,
    group_preferences: &GroupPreferences,
    team_preferences: &TeamPreferences,
) -> u32 {
    let preference_penalty: u32 = assignment
        .iter()
        .map(|(user, group)| {
            preference_weight(
                group_preferences
                    .get(user)
                    .and_then(|preferences| preferences.get(group))
                    .copied(),
            )
        })
        .sum();

    let friendship_penalty: u32 = team_preferences
        .iter()
        .map(|(user, friends)| {
            friendship_weight(friends.len())
                * friends
                    .iter()
                    .filter(|friend| is_broken(assignment, *user, **friend))
                    .count() as u32
        })
        .sum();

    preference_penalty + friendship_penalty
}

/// List all (user, friend) pairs from the team preferences, who have been assigned to different
/// groups
pub fn broken_friendships(
    assignment: &Assignment,
    team_preferences: &TeamPreferences,
) -> Vec<(UserId, UserId)> {
    team_preferences
        .iter()
        .flat_map(|(user, friends)| friends.iter().map(move |friend| (*user, *friend)))
        .filter(|(user, friend)| is_broken(assignment, *user, *friend))
        .collect()
}

/// Calculate a comparable quality score of an assignment: the average preference weight of the
/// assigned groups (1.0 means everyone got a preferred group). Friendships are not considered.
pub fn assignment_quality(assignment: &Assignment, group_preferences: &GroupPreferences) -> f32 {
    if assignment.is_empty() {
        return 0.0;
    }
    let total: u32 = assignment
        .iter()
        .map(|(user, group)| {
            preference_weight(
                group_preferences
                    .get(user)
                    .and_then(|preferences| preferences.get(group))
                    .copied(),
            )
        })
        .sum();
    total as f32 / assignment.len() as f32
}

fn is_broken(assignment: &Assignment, user: UserId, friend: UserId) -> bool {
    match (assignment.get(&user), assignment.get(&friend)) {
        (Some(g1), Some(g2)) => g1 != g2,
        _ => false,
    }
}
