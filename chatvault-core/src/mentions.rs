//! Issue-key and user-mention extraction
//!
//! Pure text scanning shared by the ingestion path (issue keys are
//! materialized into every persisted row) and the view formatter (mention
//! resolution).

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Issue keys look like `ABC-123`: two or more uppercase letters, a dash,
/// digits, on word boundaries.
fn issue_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{2,}-\d+\b").expect("issue key pattern"))
}

/// User mentions are platform-encoded as `<@U…>`.
fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@(U[A-Z0-9]+)>").expect("mention pattern"))
}

/// Extract issue keys from text, deduped, preserving first-occurrence order.
pub fn extract_issue_keys(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for m in issue_key_re().find_iter(text) {
        if seen.insert(m.as_str()) {
            keys.push(m.as_str().to_string());
        }
    }
    keys
}

/// Extract mentioned user IDs from text, deduped, first-occurrence order.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for cap in mention_re().captures_iter(text) {
        let id = &cap[1];
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Replace `<@UXXXX>` mentions with `@<display name>` for known users.
///
/// Unknown IDs are left as the literal platform encoding.
pub fn resolve_mentions(text: &str, users: &HashMap<String, String>) -> String {
    mention_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match users.get(&caps[1]) {
                Some(name) => format!("@{}", name),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_issue_keys_dedupes_in_order() {
        let keys = extract_issue_keys("Fixed PRD-16975 and PRD-16975 and FOO-1");
        assert_eq!(keys, vec!["PRD-16975", "FOO-1"]);
    }

    #[test]
    fn test_extract_issue_keys_requires_two_letters() {
        // Single-letter prefixes are not issue keys
        assert!(extract_issue_keys("see A-1 for details").is_empty());
        assert_eq!(extract_issue_keys("see AB-1 for details"), vec!["AB-1"]);
    }

    #[test]
    fn test_extract_issue_keys_word_boundaries() {
        assert!(extract_issue_keys("xPRD-123").is_empty());
        assert_eq!(extract_issue_keys("(PRD-123)"), vec!["PRD-123"]);
        assert!(extract_issue_keys("no tickets here").is_empty());
    }

    #[test]
    fn test_extract_mentions() {
        let ids = extract_mentions("Hi <@U2ABC>, ping <@U999> and <@U2ABC> again");
        assert_eq!(ids, vec!["U2ABC", "U999"]);
    }

    #[test]
    fn test_resolve_mentions_known_and_unknown() {
        let mut users = HashMap::new();
        users.insert("U2".to_string(), "Bob".to_string());

        let resolved = resolve_mentions("Hi <@U2>, ping <@U999>", &users);
        assert_eq!(resolved, "Hi @Bob, ping <@U999>");
    }

    #[test]
    fn test_resolve_mentions_ignores_non_user_refs() {
        let users = HashMap::new();
        // Channel refs and plain text pass through untouched
        let text = "see <#C123|general> and <@U1>";
        assert_eq!(resolve_mentions(text, &users), text);
    }
}
