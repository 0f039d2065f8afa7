//! Splitting a raw script into scenes.

use std::collections::HashSet;

use crate::error::{PitchError, Result};
use crate::scene::Scene;

/// Delimiter between scenes when none is given.
pub const DEFAULT_DELIMITER: &str = "---";

/// Split `script` into scenes on `delimiter`.
///
/// A segment whose first line starts with `#` or ends with `:` is a heading;
/// the heading, reduced to lowercase ASCII letters and digits, becomes the
/// scene id. Otherwise the id is `scene<N>`, where N counts every segment
/// from 1, empty ones included.
pub fn parse_script(script: &str, delimiter: &str) -> Result<Vec<Scene>> {
    if delimiter.is_empty() {
        return Err(PitchError::Config("scene delimiter cannot be empty".to_string()));
    }

    let mut scenes = Vec::new();
    let mut seen = HashSet::new();

    for (index, part) in script.split(delimiter).enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (first_line, rest) = part.split_once('\n').unwrap_or((part, ""));
        let first_line = first_line.trim();
        let heading = (first_line.starts_with('#') || first_line.ends_with(':'))
            .then(|| normalize_id(first_line))
            .filter(|id| !id.is_empty());

        let (id, text) = match heading {
            Some(id) => (id, rest.trim()),
            None => (format!("scene{}", index + 1), part),
        };

        if !seen.insert(id.clone()) {
            return Err(PitchError::DuplicateSceneId(id));
        }
        scenes.push(Scene::new(id, text)?);
    }

    Ok(scenes)
}

/// Lowercase ASCII alphanumerics only.
pub fn normalize_id(heading: &str) -> String {
    heading
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings_and_positional_ids() {
        let script = "# Hook\nEvery district loses time.\n---\nNo heading here.\n---\nThe Close:\nLet's talk.";
        let scenes = parse_script(script, DEFAULT_DELIMITER).unwrap();

        let ids: Vec<&str> = scenes.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["hook", "scene2", "theclose"]);
        assert_eq!(scenes[0].text(), "Every district loses time.");
        assert_eq!(scenes[1].text(), "No heading here.");
        assert_eq!(scenes[2].text(), "Let's talk.");
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let scenes = parse_script("---\n\nOne.\n---\n   \n---\nTwo.\n---", "---").unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["scene2", "scene4"]);
    }

    #[test]
    fn test_leading_delimiter_keeps_positions() {
        let scenes = parse_script("---\nIntro line.\n---\nBody line.", "---").unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["scene2", "scene3"]);
        assert_eq!(scenes[0].text(), "Intro line.");
    }

    #[test]
    fn test_duplicate_normalized_ids() {
        let err = parse_script("# The Hook\nA\n---\n# the-hook!\nB", "---").unwrap_err();
        match err {
            PitchError::DuplicateSceneId(id) => assert_eq!(id, "thehook"),
            other => panic!("expected DuplicateSceneId, got {:?}", other),
        }
    }

    #[test]
    fn test_heading_collides_with_positional_id() {
        let err = parse_script("Intro text\n---\n# Scene 1\nMore", "---").unwrap_err();
        assert!(matches!(err, PitchError::DuplicateSceneId(_)));
    }

    #[test]
    fn test_symbol_only_heading_falls_back_to_position() {
        let scenes = parse_script("#\nJust text", "---").unwrap();
        assert_eq!(scenes[0].id(), "scene1");
        assert_eq!(scenes[0].text(), "#\nJust text");
    }

    #[test]
    fn test_custom_delimiter() {
        let scenes = parse_script("A:\none\n===\nB:\ntwo", "===").unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[1].id(), "b");
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        assert!(parse_script("text", "").is_err());
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_script("  \n ", "---").unwrap().is_empty());
    }
}
