//! Record transformation
//!
//! The [`RecordTransformer`] applies a [`MaskingPlan`] and the sensitive
//! field policy to one record at a time:
//!
//! 1. bucketed fields are replaced through their bucket map
//! 2. mapped fields are replaced through their value map, element-wise for
//!    lists; values missing from the map follow the [`UnmappedPolicy`]
//! 3. sensitive fields are checked for suppression keywords (drop the record),
//!    then secret rules (remove the field), then scrubbed with user rules
//!
//! The record is taken by value, so a dropped record is never partially
//! emitted.

pub mod sensitive;

use crate::config::{MaskingConfig, UnmappedValuePolicy};
use crate::core::mapping::{FieldMask, MaskingPlan};
use crate::domain::record::path_matches;
use crate::domain::{AnonymizeError, FieldDirective, Record, Result, ValueKey};
use serde_json::Value;

pub use sensitive::{SensitivePolicy, Verdict};

/// Handling of a value absent from its field's value map
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UnmappedPolicy {
    /// Fail with [`AnonymizeError::UnmappedValue`]
    #[default]
    Fail,
    /// Replace the value with a visible sentinel
    Sentinel(Value),
}

impl From<&MaskingConfig> for UnmappedPolicy {
    fn from(config: &MaskingConfig) -> Self {
        match config.unmapped_value_policy {
            UnmappedValuePolicy::Fail => Self::Fail,
            UnmappedValuePolicy::Sentinel => {
                Self::Sentinel(Value::String(config.unmapped_sentinel.clone()))
            }
        }
    }
}

/// Result of transforming one record
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The record is emitted
    Emit {
        /// Transformed record
        record: Record,
        /// Sensitive fields removed by secret rules
        secrets_removed: usize,
    },
    /// A suppression keyword matched; the record is not emitted
    Drop {
        /// Sensitive field that matched
        field: String,
    },
}

/// Checks that no sensitive path is also assigned a masking strategy
///
/// Directives with strategy `none` never conflict.
///
/// # Errors
///
/// Returns [`AnonymizeError::PolicyConflict`] for the first conflicting field.
pub fn check_policy_conflicts(directives: &[FieldDirective], sensitive: &[String]) -> Result<()> {
    for directive in directives.iter().filter(|d| d.strategy.is_masking()) {
        if let Some(path) = sensitive
            .iter()
            .find(|path| overlaps(path, &directive.field))
        {
            return Err(AnonymizeError::PolicyConflict {
                field: path.clone(),
                strategy: directive.strategy.to_string(),
            });
        }
    }
    Ok(())
}

fn overlaps(a: &str, b: &str) -> bool {
    path_matches(a, b) || path_matches(b, a)
}

/// Applies masking and sensitive-field handling to records
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    plan: MaskingPlan,
    sensitive: SensitivePolicy,
    unmapped: UnmappedPolicy,
}

impl RecordTransformer {
    /// Creates a transformer
    ///
    /// # Errors
    ///
    /// Returns [`AnonymizeError::PolicyConflict`] if a sensitive path is also
    /// masked by the plan.
    pub fn new(
        plan: MaskingPlan,
        sensitive: SensitivePolicy,
        unmapped: UnmappedPolicy,
    ) -> Result<Self> {
        for (field, mask) in plan.masks() {
            if sensitive.covers(field) || sensitive.fields().iter().any(|p| path_matches(field, p))
            {
                return Err(AnonymizeError::PolicyConflict {
                    field: field.to_string(),
                    strategy: mask.provider().to_string(),
                });
            }
        }

        Ok(Self {
            plan,
            sensitive,
            unmapped,
        })
    }

    /// The masking plan in use
    pub fn plan(&self) -> &MaskingPlan {
        &self.plan
    }

    /// Transforms one record
    ///
    /// # Errors
    ///
    /// Returns [`AnonymizeError::UnmappedValue`] under the fail policy when a
    /// mapped field holds a value that was not enumerated.
    pub fn transform(&self, mut record: Record) -> Result<TransformOutcome> {
        for (field, mask) in self.plan.masks() {
            if let Some(value) = record.get_mut(field) {
                self.substitute(field, mask, value)?;
            }
        }

        let sensitive_fields: Vec<String> = record
            .fields()
            .filter(|field| self.sensitive.covers(field))
            .map(str::to_string)
            .collect();

        let mut secrets_removed = 0;
        for field in sensitive_fields {
            let verdict = match record.get(&field) {
                Some(value) => self.sensitive.inspect(value),
                None => continue,
            };

            match verdict {
                Verdict::Suppress => {
                    tracing::debug!(field = %field, "Suppression keyword matched, dropping record");
                    return Ok(TransformOutcome::Drop { field });
                }
                Verdict::Secret(rule) => {
                    tracing::debug!(field = %field, rule = %rule, "Secret matched, removing field");
                    record.remove(&field);
                    secrets_removed += 1;
                }
                Verdict::Scrub => {
                    if let Some(value) = record.get_mut(&field) {
                        self.sensitive.scrub(value);
                    }
                }
            }
        }

        Ok(TransformOutcome::Emit {
            record,
            secrets_removed,
        })
    }

    fn substitute(&self, field: &str, mask: &FieldMask, value: &mut Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Array(items) => items
                .iter_mut()
                .try_for_each(|item| self.substitute(field, mask, item)),
            scalar => {
                let replacement = match mask.substitute(scalar) {
                    Some(replacement) => replacement.clone(),
                    None => match &self.unmapped {
                        UnmappedPolicy::Fail => {
                            return Err(AnonymizeError::UnmappedValue {
                                field: field.to_string(),
                                value_digest: ValueKey::of(scalar).digest(),
                            });
                        }
                        UnmappedPolicy::Sentinel(sentinel) => {
                            tracing::warn!(
                                field,
                                value_digest = %ValueKey::of(scalar).digest(),
                                "Value missing from value map, emitting sentinel"
                            );
                            sentinel.clone()
                        }
                    },
                };
                *scalar = replacement;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mapping::{BucketMap, ValueMap};
    use crate::core::providers::ProviderRegistry;
    use crate::core::redaction::{RedactionRules, SuppressionKeywords};
    use crate::domain::MaskStrategy;
    use serde_json::json;

    fn ip_plan(registry: &mut ProviderRegistry) -> MaskingPlan {
        let mut map = ValueMap::new("user.ip");
        map.insert_original(&json!("10.0.0.1"));
        map.insert_original(&json!("10.0.0.2"));
        let provider = registry.resolve("user.ip", "ipv4").unwrap();
        let mut plan = MaskingPlan::empty();
        plan.insert("user.ip", FieldMask::Mapped(map.resolve(&provider, registry)));
        plan
    }

    fn sensitive() -> SensitivePolicy {
        SensitivePolicy::new(
            vec!["message".to_string(), "comment".to_string()],
            RedactionRules::builtin().unwrap(),
            SuppressionKeywords::new(["DROP_ME"]),
        )
    }

    fn transformer(unmapped: UnmappedPolicy) -> RecordTransformer {
        let mut registry = ProviderRegistry::new(Some(11));
        RecordTransformer::new(ip_plan(&mut registry), sensitive(), unmapped).unwrap()
    }

    fn record(document: Value) -> Record {
        Record::from_document(document).unwrap()
    }

    fn emitted(outcome: TransformOutcome) -> Record {
        match outcome {
            TransformOutcome::Emit { record, .. } => record,
            other => panic!("expected an emitted record, got {other:?}"),
        }
    }

    #[test]
    fn test_mapped_values_are_stable() {
        let transformer = transformer(UnmappedPolicy::Fail);
        let first = emitted(transformer.transform(record(json!({"user": {"ip": "10.0.0.1"}}))).unwrap());
        let again = emitted(transformer.transform(record(json!({"user": {"ip": "10.0.0.1"}}))).unwrap());
        let other = emitted(transformer.transform(record(json!({"user": {"ip": "10.0.0.2"}}))).unwrap());

        assert_eq!(first.get("user.ip"), again.get("user.ip"));
        assert_ne!(first.get("user.ip"), other.get("user.ip"));
        assert_ne!(first.get("user.ip"), Some(&json!("10.0.0.1")));
    }

    #[test]
    fn test_lists_are_mapped_element_wise() {
        let transformer = transformer(UnmappedPolicy::Fail);
        let single = emitted(transformer.transform(record(json!({"user": {"ip": "10.0.0.2"}}))).unwrap());
        let list = emitted(
            transformer
                .transform(record(json!({"user": {"ip": ["10.0.0.2", null]}})))
                .unwrap(),
        );

        let expected = json!([single.get("user.ip").unwrap().clone(), null]);
        assert_eq!(list.get("user.ip"), Some(&expected));
    }

    #[test]
    fn test_unmapped_value_fails_without_leaking_value() {
        let err = transformer(UnmappedPolicy::Fail)
            .transform(record(json!({"user": {"ip": "192.168.1.1"}})))
            .unwrap_err();

        match err {
            AnonymizeError::UnmappedValue { field, value_digest } => {
                assert_eq!(field, "user.ip");
                assert!(!value_digest.contains("192.168"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unmapped_value_sentinel() {
        let transformer = transformer(UnmappedPolicy::Sentinel(json!("<UNMAPPED>")));
        let out = emitted(
            transformer
                .transform(record(json!({"user": {"ip": "192.168.1.1"}})))
                .unwrap(),
        );
        assert_eq!(out.get("user.ip"), Some(&json!("<UNMAPPED>")));
    }

    #[test]
    fn test_secret_removes_only_the_field() {
        let transformer = transformer(UnmappedPolicy::Fail);
        let outcome = transformer
            .transform(record(json!({"message": "password: abc123", "host": "web-1"})))
            .unwrap();

        match outcome {
            TransformOutcome::Emit {
                record,
                secrets_removed,
            } => {
                assert!(!record.contains("message"));
                assert_eq!(record.get("host"), Some(&json!("web-1")));
                assert_eq!(secrets_removed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_keyword_drops_record() {
        let outcome = transformer(UnmappedPolicy::Fail)
            .transform(record(json!({"comment": "please DROP_ME", "host": "web-1"})))
            .unwrap();
        assert_eq!(
            outcome,
            TransformOutcome::Drop {
                field: "comment".to_string()
            }
        );
    }

    #[test]
    fn test_bucketed_fields_never_fail() {
        let mut registry = ProviderRegistry::new(Some(2));
        let provider = registry.resolve("session.id", "uuid").unwrap();
        let mut plan = MaskingPlan::empty();
        plan.insert(
            "session.id",
            FieldMask::Bucketed(BucketMap::generate("session.id", &provider, 8, &mut registry)),
        );
        let transformer =
            RecordTransformer::new(plan, SensitivePolicy::default(), UnmappedPolicy::Fail).unwrap();

        let a = emitted(transformer.transform(record(json!({"session": {"id": "abc"}}))).unwrap());
        let b = emitted(transformer.transform(record(json!({"session": {"id": "abc"}}))).unwrap());
        assert_eq!(a.get("session.id"), b.get("session.id"));
        assert_ne!(a.get("session.id"), Some(&json!("abc")));
    }

    #[test]
    fn test_sensitive_masked_field_conflicts() {
        let mut registry = ProviderRegistry::new(Some(11));
        let plan = ip_plan(&mut registry);
        let policy = SensitivePolicy::new(
            vec!["user".to_string()],
            RedactionRules::new(),
            SuppressionKeywords::default(),
        );

        let err = RecordTransformer::new(plan, policy, UnmappedPolicy::Fail).unwrap_err();
        assert!(matches!(err, AnonymizeError::PolicyConflict { ref field, .. } if field == "user.ip"));
    }

    #[test]
    fn test_check_policy_conflicts_ignores_skip() {
        let directives = vec![
            FieldDirective::new("message", MaskStrategy::Skip).unwrap(),
            FieldDirective::new("user.ip", MaskStrategy::parse("ipv4")).unwrap(),
        ];
        assert!(check_policy_conflicts(&directives, &["message".to_string()]).is_ok());

        let directives = vec![FieldDirective::new("message", MaskStrategy::Infer).unwrap()];
        let err = check_policy_conflicts(&directives, &["message".to_string()]).unwrap_err();
        assert!(matches!(err, AnonymizeError::PolicyConflict { ref strategy, .. } if strategy == "infer"));
    }
}
