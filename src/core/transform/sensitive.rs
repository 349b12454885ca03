//! Redaction and suppression of sensitive fields

use crate::core::redaction::{RedactionRules, SuppressionKeywords};
use crate::domain::record::path_matches;
use serde_json::Value;

/// What happens to a sensitive field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A suppression keyword matched; the whole record is dropped
    Suppress,
    /// A secret rule matched; the field is removed
    Secret(String),
    /// No keyword or secret matched; user rules are substituted
    Scrub,
}

/// Sensitive field paths with the rules applied to them
#[derive(Debug, Clone, Default)]
pub struct SensitivePolicy {
    fields: Vec<String>,
    rules: RedactionRules,
    keywords: SuppressionKeywords,
}

impl SensitivePolicy {
    /// Creates a policy
    pub fn new(fields: Vec<String>, rules: RedactionRules, keywords: SuppressionKeywords) -> Self {
        Self {
            fields,
            rules,
            keywords,
        }
    }

    /// Configured sensitive paths
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether a flattened field is sensitive
    ///
    /// A sensitive path covers the field itself and every field nested
    /// beneath it.
    pub fn covers(&self, field: &str) -> bool {
        self.fields.iter().any(|path| path_matches(path, field))
    }

    /// Decides what happens to a sensitive value
    ///
    /// Keywords are checked before secrets, so a value matching both always
    /// suppresses the record. Only strings match; lists are checked
    /// element-wise.
    pub fn inspect(&self, value: &Value) -> Verdict {
        if strings(value).any(|text| self.keywords.matches(text)) {
            return Verdict::Suppress;
        }

        match strings(value).find_map(|text| self.rules.matching_secret(text)) {
            Some(rule) => Verdict::Secret(rule.name().to_string()),
            None => Verdict::Scrub,
        }
    }

    /// Applies every user rule in place, returning whether anything changed
    pub fn scrub(&self, value: &mut Value) -> bool {
        match value {
            Value::String(text) => {
                let scrubbed = match self.rules.scrub(text) {
                    std::borrow::Cow::Owned(scrubbed) => Some(scrubbed),
                    std::borrow::Cow::Borrowed(_) => None,
                };
                match scrubbed {
                    Some(scrubbed) => {
                        *text = scrubbed;
                        true
                    }
                    None => false,
                }
            }
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |changed, item| self.scrub(item) || changed),
            _ => false,
        }
    }
}

fn strings(value: &Value) -> Box<dyn Iterator<Item = &str> + '_> {
    match value {
        Value::String(text) => Box::new(std::iter::once(text.as_str())),
        Value::Array(items) => Box::new(items.iter().filter_map(Value::as_str)),
        _ => Box::new(std::iter::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn policy() -> SensitivePolicy {
        let mut rules = RedactionRules::builtin().unwrap();
        rules
            .add_user("home_dir", r"(/home/)[^/\s]+", "${1}")
            .unwrap();
        SensitivePolicy::new(
            vec!["message".to_string(), "process".to_string()],
            rules,
            SuppressionKeywords::new(["DROP_ME"]),
        )
    }

    #[test_case("message", true ; "exact path")]
    #[test_case("process.args", true ; "nested path")]
    #[test_case("messages", false ; "prefix without separator")]
    #[test_case("user.name", false ; "unrelated")]
    fn test_covers(field: &str, expected: bool) {
        assert_eq!(policy().covers(field), expected);
    }

    #[test]
    fn test_keyword_wins_over_secret() {
        let verdict = policy().inspect(&json!("password: abc123 DROP_ME"));
        assert_eq!(verdict, Verdict::Suppress);
    }

    #[test]
    fn test_secret_in_list_element() {
        let verdict = policy().inspect(&json!(["fine", "password: abc123"]));
        assert_eq!(verdict, Verdict::Secret("password_assignment".to_string()));
    }

    #[test]
    fn test_non_strings_never_match() {
        assert_eq!(policy().inspect(&json!(42)), Verdict::Scrub);
        assert_eq!(policy().inspect(&json!(null)), Verdict::Scrub);
    }

    #[test]
    fn test_scrub_lists_element_wise() {
        let mut value = json!(["/home/alice/.ssh", "/var/log", 7]);
        assert!(policy().scrub(&mut value));
        assert_eq!(value, json!(["/home//.ssh", "/var/log", 7]));
    }

    #[test]
    fn test_scrub_reports_unchanged() {
        let mut value = json!("nothing to see");
        assert!(!policy().scrub(&mut value));
    }
}
