use regex::Regex;
use tracing::warn;

/// Risky-verb detector. Matching requests need an explicit confirmation
/// token from the originating channel before a skill runs.
pub struct SafetyGate {
    patterns: Vec<(Regex, String)>,
}

impl SafetyGate {
    /// Compile the configured patterns. Invalid regexes are skipped with a
    /// warning rather than failing startup.
    pub fn new(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|source| match Regex::new(&format!("(?i){}", source)) {
                Ok(re) => Some((re, source.clone())),
                Err(e) => {
                    warn!(pattern = %source, error = %e, "invalid risky pattern, skipping");
                    None
                }
            })
            .collect();
        Self { patterns: compiled }
    }

    /// The first risky pattern the utterance matches, if any.
    pub fn requires_confirmation(&self, utterance: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(utterance))
            .map(|(_, source)| source.as_str())
    }

    /// Whether a clarifier reply counts as explicit confirmation.
    pub fn is_confirmation(reply: &str) -> bool {
        let normalized = reply.trim().to_lowercase();
        normalized == "confirm" || normalized == "yes" || normalized == "y"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veska_core::config::DispatchConfig;

    fn default_gate() -> SafetyGate {
        SafetyGate::new(&DispatchConfig::default_risky_patterns())
    }

    #[test]
    fn risky_verbs_match() {
        let gate = default_gate();
        assert!(gate.requires_confirmation("delete my drafts folder").is_some());
        assert!(gate.requires_confirmation("Send the email to Ana").is_some());
        assert!(gate.requires_confirmation("transfer 50 dollars").is_some());
        assert!(gate.requires_confirmation("run rm -rf on the temp dir").is_some());
    }

    #[test]
    fn benign_requests_pass() {
        let gate = default_gate();
        assert!(gate.requires_confirmation("summarize my inbox").is_none());
        assert!(gate.requires_confirmation("what's on my calendar").is_none());
        // Substrings of risky words do not fire the word-boundary patterns.
        assert!(gate.requires_confirmation("show the sender column").is_none());
    }

    #[test]
    fn confirmation_tokens() {
        assert!(SafetyGate::is_confirmation("confirm"));
        assert!(SafetyGate::is_confirmation("  YES "));
        assert!(!SafetyGate::is_confirmation("no"));
        assert!(!SafetyGate::is_confirmation("maybe confirm later"));
    }
}
