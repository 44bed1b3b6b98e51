use regex::Regex;
use tracing::debug;

/// North-American phone number shapes: optional +1, (312) / 312, separators.
const PHONE_PATTERN: &str =
    r"(?:\+?1[-.\s]*)?(?:\(\d{3}\)|\d{3})[-.\s]*\d{3}[-.\s]*\d{4}";

/// Pull the best-matching phone number out of page body text.
///
/// Candidates score on digit count and on query tokens appearing within an
/// 80-character window around the match. The winner is normalised to
/// `(XXX) XXX-XXXX`.
pub fn extract_phone_number(body: &str, query: &str) -> Option<String> {
    let phone_re = Regex::new(PHONE_PATTERN).ok()?;
    let token_re = Regex::new(r"\W+").ok()?;

    let lowered = body.to_lowercase();
    let query_tokens: Vec<String> = token_re
        .split(&query.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    let mut best_score = -1i32;
    let mut best_phone: Option<String> = None;

    for found in phone_re.find_iter(body) {
        let digits: String = found.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        let mut score = 1;
        if digits.len() >= 10 {
            score += 1;
        }
        let start = found.start().saturating_sub(80);
        let end = (found.end() + 80).min(lowered.len());
        // Byte offsets can split a UTF-8 char; widen to the nearest boundary.
        let snippet = nearest_slice(&lowered, start, end);
        if query_tokens.iter().any(|t| snippet.contains(t.as_str())) {
            score += 2;
        }
        if score > best_score {
            best_score = score;
            best_phone = Some(format_phone(&digits));
        }
    }

    if let Some(ref phone) = best_phone {
        debug!(phone = %phone, query = %query, "extracted phone number");
    }
    best_phone
}

/// Normalise digit runs into `(XXX) XXX-XXXX` when ten digits are present.
pub fn format_phone(digits: &str) -> String {
    let tail: String = digits
        .chars()
        .rev()
        .take(10)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if tail.len() != 10 {
        return tail;
    }
    format!("({}) {}-{}", &tail[..3], &tail[3..6], &tail[6..])
}

fn nearest_slice(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ten_digits() {
        assert_eq!(format_phone("7085551212"), "(708) 555-1212");
        assert_eq!(format_phone("17085551212"), "(708) 555-1212");
        assert_eq!(format_phone("1212"), "1212");
    }

    #[test]
    fn extracts_from_body_text() {
        let body = "Target Tinley Park. Store phone: (708) 555-1212. Pharmacy: 708.555.9999";
        let phone = extract_phone_number(body, "Target Tinley Park").unwrap();
        assert_eq!(phone, "(708) 555-1212");
    }

    #[test]
    fn prefers_match_near_query_tokens() {
        let body = "Some other store: 111-222-3333 ... lots of text ... \
                    Walgreens Oak Lawn front desk 444-555-6666";
        let phone = extract_phone_number(body, "Walgreens Oak Lawn").unwrap();
        assert_eq!(phone, "(444) 555-6666");
    }

    #[test]
    fn no_match_is_none() {
        assert!(extract_phone_number("no numbers here", "query").is_none());
    }
}
