use crate::{Assignment, GroupId, GroupPreferences, TeamPreferences};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

const INPUT_FORMAT: &str = "X-groupdata-simple";
const OUTPUT_FORMAT: &str = "X-groupassignment-simple";
const FORMAT_VERSION: &str = "1.0";

/// Input data of a group assignment problem, as read from the simple JSON representation
#[derive(Deserialize, Debug)]
pub struct ProblemData {
    pub groups: Vec<GroupId>,
    pub group_preferences: GroupPreferences,
    #[serde(default)]
    pub team_preferences: TeamPreferences,
}

/// Read the groups, group preferences and team preferences from the simple JSON representation.
///
/// The JSON object may have a "format" and "version" field. If present, they must match the
/// supported format. User ids are used as JSON object keys, so they are given as strings.
pub fn read<R: std::io::Read>(reader: R) -> Result<ProblemData, String> {
    let mut data: serde_json::Value =
        serde_json::from_reader(reader).map_err(|err| err.to_string())?;

    if let Some(format) = data.get("format") {
        if format != INPUT_FORMAT {
            return Err(format!(
                "Unsupported input format {}. Expected \"{}\".",
                format, INPUT_FORMAT
            ));
        }
    }
    if let Some(version) = data.get("version") {
        if version != FORMAT_VERSION {
            return Err(format!("Unsupported input format version {}.", version));
        }
    }
    if let Some(object) = data.as_object_mut() {
        object.remove("format");
        object.remove("version");
    }

    serde_json::from_value(data).map_err(|e| format!("{}", e))
}

/// Write the calculated group assignment as simple JSON representation to a Writer (e.g. an
/// output file).
pub fn write<W: std::io::Write>(writer: W, assignment: &Assignment) -> Result<(), String> {
    let a: serde_json::Value = serde_json::to_value(assignment).map_err(|e| format!("{}", e))?;
    let data = json!({
        "format": OUTPUT_FORMAT,
        "version": FORMAT_VERSION,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
        "assignment": a
    });
    serde_json::to_writer(writer, &data).map_err(|e| format!("{}", e))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use crate::{Assignment, Preference};

    #[test]
    fn parse_simple_file() {
        let data = include_bytes!("test_ressources/simple_input.json");
        let problem = super::read(&data[..]).unwrap();

        assert_eq!(problem.groups, vec!["A", "B"]);
        assert_eq!(problem.group_preferences.len(), 3);
        assert_eq!(
            problem.group_preferences[&1].get("A"),
            Some(&Preference::Preferred)
        );
        assert_eq!(
            problem.group_preferences[&2].get("A"),
            Some(&Preference::Impossible)
        );
        assert!(problem.group_preferences[&3].is_empty());
        assert_eq!(problem.team_preferences[&1], vec![2]);
        assert!(!problem.team_preferences.contains_key(&2));
    }

    #[test]
    fn parse_without_team_preferences() {
        let data = r#"{"groups": ["x"], "group_preferences": {"5": {"x": "DISLIKE"}}}"#;
        let problem = super::read(data.as_bytes()).unwrap();
        assert_eq!(
            problem.group_preferences[&5].get("x"),
            Some(&Preference::Dislike)
        );
        assert!(problem.team_preferences.is_empty());
    }

    #[test]
    fn reject_invalid_input() {
        let wrong_format = r#"{"format": "X-coursedata-simple", "groups": [], "group_preferences": {}}"#;
        assert!(super::read(wrong_format.as_bytes()).is_err());
        let wrong_level = r#"{"groups": ["x"], "group_preferences": {"5": {"x": "MAYBE"}}}"#;
        assert!(super::read(wrong_level.as_bytes()).is_err());
        let bad_user = r#"{"groups": ["x"], "group_preferences": {"bob": {}}}"#;
        assert!(super::read(bad_user.as_bytes()).is_err());
        assert!(super::read(&b"{\"groups\": "[..]).is_err());
    }

    #[test]
    fn write_simple_file() {
        let assignment: Assignment = vec![(1, "A".to_owned()), (2, "B".to_owned())]
            .into_iter()
            .collect();
        let mut buffer = Vec::<u8>::new();
        let result = super::write(&mut buffer, &assignment);
        assert!(result.is_ok());

        // Parse buffer as JSON file
        let mut data: serde_json::Value = serde_json::from_reader(&buffer[..]).unwrap();
        assert_eq!(data["format"], "X-groupassignment-simple");
        assert!(data["timestamp"].is_string());
        let parsed_assignment =
            serde_json::from_value::<Assignment>(data["assignment"].take()).unwrap();
        assert_eq!(assignment, parsed_assignment);
    }
}
