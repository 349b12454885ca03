//! Provider inference for `infer` directives
//!
//! Each inferred field's declared type is looked up once and translated
//! through [`FieldType::inferred_strategy`]. Partitions disagreeing on the
//! type abort inference.

use crate::adapters::source::DocumentSource;
use crate::domain::{FieldDirective, FieldType, MaskStrategy, Result};

/// Replaces every `infer` directive with a concrete strategy
///
/// When inference is disabled, or a field has no declared type or an
/// unknown one, the field falls back to [`MaskStrategy::Skip`] with a
/// warning. Other directives are returned unchanged.
///
/// # Errors
///
/// Returns [`crate::domain::AnonymizeError::ProviderInference`] if the source
/// reports inconsistent types, or a source error if the lookup fails.
pub async fn infer_strategies(
    source: &dyn DocumentSource,
    directives: &[FieldDirective],
    enabled: bool,
) -> Result<Vec<FieldDirective>> {
    let mut resolved = Vec::with_capacity(directives.len());

    for directive in directives {
        if directive.strategy != MaskStrategy::Infer {
            resolved.push(directive.clone());
            continue;
        }

        let strategy = if enabled {
            match source.field_type(&directive.field).await? {
                Some(FieldType::Unknown(tag)) => {
                    tracing::warn!(
                        field = %directive.field,
                        field_type = %tag,
                        "No masking strategy for field type, emitting unmasked"
                    );
                    MaskStrategy::Skip
                }
                Some(field_type) => {
                    let strategy = field_type.inferred_strategy();
                    tracing::info!(
                        field = %directive.field,
                        field_type = %field_type,
                        strategy = %strategy,
                        "Inferred masking strategy"
                    );
                    strategy
                }
                None => {
                    tracing::warn!(
                        field = %directive.field,
                        "Field type not declared by source, emitting unmasked"
                    );
                    MaskStrategy::Skip
                }
            }
        } else {
            tracing::warn!(
                field = %directive.field,
                "Provider inference disabled, emitting unmasked"
            );
            MaskStrategy::Skip
        };

        resolved.push(FieldDirective {
            field: directive.field.clone(),
            strategy,
        });
    }

    Ok(resolved)
}
