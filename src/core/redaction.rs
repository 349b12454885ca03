//! Redaction rules and suppression keywords
//!
//! Rules come from three places, in this order: the embedded secret library,
//! an optional library file in the same TOML format, and the inline
//! `[[redaction.*_patterns]]` tables of the configuration.

use crate::config::{PatternConfig, RedactionConfig};
use crate::domain::{AnonymizeError, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

/// Embedded secret pattern library
const BUILTIN_LIBRARY: &str = include_str!("../../patterns/secrets.toml");

/// Replacement used when a user pattern does not name one
pub const DEFAULT_REPLACEMENT: &str = "${1}";

/// What a matching rule does to a sensitive field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Remove the field from the record
    Secret,
    /// Substitute the matched text inside the value
    User,
}

/// Pattern definition from a TOML library
#[derive(Debug, Clone, Deserialize)]
struct PatternDefinition {
    kind: RuleKind,
    patterns: Vec<String>,
    #[serde(default)]
    replacement: Option<String>,
}

/// Pattern library container
#[derive(Debug, Deserialize)]
struct PatternLibrary {
    patterns: BTreeMap<String, PatternDefinition>,
}

/// A compiled redaction rule
#[derive(Debug, Clone)]
pub struct RedactionRule {
    name: String,
    regex: Regex,
    replacement: String,
}

impl RedactionRule {
    /// Rule name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the rule matches anywhere in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Secret and user-identifying redaction rules
#[derive(Debug, Clone, Default)]
pub struct RedactionRules {
    secrets: Vec<RedactionRule>,
    user: Vec<RedactionRule>,
}

impl RedactionRules {
    /// An empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded secret library
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the embedded library is malformed.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_LIBRARY)
    }

    /// Loads a pattern library from a TOML file
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or holds an
    /// invalid pattern.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnonymizeError::Configuration(format!(
                "Failed to read pattern library {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses a pattern library
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML is malformed or a pattern
    /// does not compile.
    pub fn from_toml(content: &str) -> Result<Self> {
        let library: PatternLibrary = toml::from_str(content).map_err(|e| {
            AnonymizeError::Configuration(format!("Failed to parse pattern library: {e}"))
        })?;

        let mut rules = Self::new();
        for (name, definition) in library.patterns {
            for pattern in &definition.patterns {
                match definition.kind {
                    RuleKind::Secret => rules.add_secret(&name, pattern)?,
                    RuleKind::User => rules.add_user(
                        &name,
                        pattern,
                        definition.replacement.as_deref().unwrap_or(DEFAULT_REPLACEMENT),
                    )?,
                }
            }
        }
        Ok(rules)
    }

    /// Builds the rule set described by the configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid rule.
    pub fn from_config(config: &RedactionConfig) -> Result<Self> {
        let mut rules = if config.builtin_secrets {
            Self::builtin()?
        } else {
            Self::new()
        };

        if let Some(path) = &config.pattern_library {
            rules.extend(Self::from_file(path)?);
        }

        for PatternConfig { name, pattern, .. } in &config.secret_patterns {
            rules.add_secret(name, pattern)?;
        }
        for PatternConfig {
            name,
            pattern,
            replacement,
        } in &config.user_patterns
        {
            rules.add_user(name, pattern, replacement)?;
        }

        tracing::debug!(
            secret_rules = rules.secrets.len(),
            user_rules = rules.user.len(),
            "Redaction rules loaded"
        );
        Ok(rules)
    }

    /// Adds a pattern whose match removes the field
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern does not compile.
    pub fn add_secret(&mut self, name: &str, pattern: &str) -> Result<()> {
        let regex = compile(name, pattern, false)?;
        self.secrets.push(RedactionRule {
            name: name.to_string(),
            regex,
            replacement: String::new(),
        });
        Ok(())
    }

    /// Adds a multi-line, case-insensitive substitution pattern
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern does not compile.
    pub fn add_user(&mut self, name: &str, pattern: &str, replacement: &str) -> Result<()> {
        let regex = compile(name, pattern, true)?;
        self.user.push(RedactionRule {
            name: name.to_string(),
            regex,
            replacement: replacement.to_string(),
        });
        Ok(())
    }

    /// Appends all rules of another set
    pub fn extend(&mut self, other: RedactionRules) {
        self.secrets.extend(other.secrets);
        self.user.extend(other.user);
    }

    /// The first secret rule matching `text`
    pub fn matching_secret(&self, text: &str) -> Option<&RedactionRule> {
        self.secrets.iter().find(|rule| rule.is_match(text))
    }

    /// Applies every user-identifying rule in order
    pub fn scrub<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        for rule in &self.user {
            let replaced = match rule.regex.replace_all(&current, rule.replacement.as_str()) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                current = Cow::Owned(replaced);
            }
        }
        current
    }

    /// Number of secret rules
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    /// Number of user-identifying rules
    pub fn user_count(&self) -> usize {
        self.user.len()
    }
}

fn compile(name: &str, pattern: &str, user: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(user)
        .case_insensitive(user)
        .build()
        .map_err(|e| {
            AnonymizeError::Configuration(format!("Invalid redaction pattern '{name}': {e}"))
        })
}

/// Literal strings that suppress a record when found in a sensitive field
#[derive(Debug, Clone, Default)]
pub struct SuppressionKeywords(Vec<String>);

impl SuppressionKeywords {
    /// Creates a keyword set, ignoring empty strings
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            keywords
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
        )
    }

    /// Whether `text` contains any keyword
    pub fn matches(&self, text: &str) -> bool {
        self.0.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keywords
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
