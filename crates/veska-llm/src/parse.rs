use regex::Regex;
use serde::de::DeserializeOwned;

use veska_core::error::{Result, VeskaError};

/// Extract the first `{...}` block from free-form model output.
pub fn extract_json_block(text: &str) -> Option<&str> {
    // Models wrap JSON in prose or code fences; take the outermost braces.
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    re.find(text).map(|m| m.as_str())
}

/// Strict-then-lenient JSON parsing. Tries the whole response first, then the
/// first brace-delimited block. Callers add the retry-with-clarifier rung.
pub fn parse_json_lenient<T: DeserializeOwned>(text: &str) -> Result<T> {
    if let Ok(value) = serde_json::from_str::<T>(text.trim()) {
        return Ok(value);
    }
    if let Some(block) = extract_json_block(text) {
        if let Ok(value) = serde_json::from_str::<T>(block) {
            return Ok(value);
        }
    }
    Err(VeskaError::BadResponse(format!(
        "no parseable JSON in response: {}",
        truncate(text, 200)
    )))
}

/// Match a response against a fixed set of single-token tags. Accepts exact
/// (case-insensitive) matches or a response whose first line is the tag.
pub fn single_token_tag(text: &str, allowed: &[&str]) -> Option<String> {
    let normalized = text.trim().to_lowercase();
    for tag in allowed {
        if normalized == *tag {
            return Some((*tag).to_string());
        }
    }
    let first_line = normalized.lines().next().unwrap_or("");
    let first_word = first_line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
    allowed
        .iter()
        .find(|tag| first_word == **tag)
        .map(|tag| tag.to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Routed {
        route: String,
    }

    #[test]
    fn strict_json_parses() {
        let parsed: Routed = parse_json_lenient(r#"{"route":"mail"}"#).unwrap();
        assert_eq!(parsed.route, "mail");
    }

    #[test]
    fn json_inside_prose_parses() {
        let text = "Sure! Here is my decision:\n```json\n{\"route\": \"calendar\"}\n```\nDone.";
        let parsed: Routed = parse_json_lenient(text).unwrap();
        assert_eq!(parsed.route, "calendar");
    }

    #[test]
    fn garbage_is_bad_response() {
        let err = parse_json_lenient::<Routed>("I cannot decide.").unwrap_err();
        assert!(matches!(err, VeskaError::BadResponse(_)));
    }

    #[test]
    fn tag_matching() {
        let skills = ["calendar", "mail", "drive", "free_form"];
        assert_eq!(
            single_token_tag("mail", &skills),
            Some("mail".to_string())
        );
        assert_eq!(
            single_token_tag("  Calendar\n", &skills),
            Some("calendar".to_string())
        );
        assert_eq!(
            single_token_tag("drive. The user wants files.", &skills),
            Some("drive".to_string())
        );
        assert_eq!(single_token_tag("no idea", &skills), None);
    }
}
