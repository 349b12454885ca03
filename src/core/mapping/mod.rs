//! Masking plan construction
//!
//! Turns the configured field directives into a [`MaskingPlan`]: one resolved
//! value map or bucket map per masked field. The plan is built to completion
//! before any record is transformed and is read-only afterwards.
//!
//! Construction order:
//! 1. explicit provider names are resolved against the registry, before any I/O
//! 2. `infer` directives are resolved from the source's declared field types
//! 3. high-cardinality fields get a bucket map; every other masked field is
//!    enumerated and its value map resolved

pub mod bucket;
pub mod inference;
pub mod value_map;

use crate::adapters::source::{DocumentSource, Query};
use crate::config::MaskingConfig;
use crate::core::providers::{MaskProvider, ProviderRegistry};
use crate::domain::{FieldDirective, MaskStrategy, Result};
use serde_json::Value;
use std::collections::BTreeMap;

pub use bucket::BucketMap;
pub use inference::infer_strategies;
pub use value_map::{Enumeration, ResolvedValueMap, ValueMap, ValueMapper};

/// Substitution scheme of one masked field
#[derive(Debug, Clone)]
pub enum FieldMask {
    /// Exhaustively enumerated values with one replacement each
    Mapped(ResolvedValueMap),
    /// Hash-selected replacements from a fixed pool
    Bucketed(BucketMap),
}

impl FieldMask {
    /// Provider that generated the replacements
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Mapped(map) => map.provider(),
            Self::Bucketed(bucket) => bucket.provider(),
        }
    }

    /// Replacement for a scalar value, `None` if the value was never mapped
    pub fn substitute(&self, original: &Value) -> Option<&Value> {
        match self {
            Self::Mapped(map) => map.get(original),
            Self::Bucketed(bucket) => Some(bucket.substitute(original)),
        }
    }

    /// Whether the field uses a bucket map
    pub fn is_bucketed(&self) -> bool {
        matches!(self, Self::Bucketed(_))
    }
}

/// Every masked field's substitution scheme for one run
#[derive(Debug, Clone, Default)]
pub struct MaskingPlan {
    masks: BTreeMap<String, FieldMask>,
    passthrough: Vec<String>,
}

impl MaskingPlan {
    /// A plan that masks nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a field's substitution scheme
    pub fn insert(&mut self, field: impl Into<String>, mask: FieldMask) {
        self.masks.insert(field.into(), mask);
    }

    /// Substitution scheme of a field
    pub fn mask(&self, field: &str) -> Option<&FieldMask> {
        self.masks.get(field)
    }

    /// Iterates over masked fields and their schemes
    pub fn masks(&self) -> impl Iterator<Item = (&str, &FieldMask)> {
        self.masks.iter().map(|(field, mask)| (field.as_str(), mask))
    }

    /// Fields included verbatim
    pub fn passthrough(&self) -> &[String] {
        &self.passthrough
    }

    /// Number of masked fields
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Whether no field is masked
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// Tunables for plan construction
#[derive(Debug, Clone)]
pub struct MappingSettings {
    /// Distinct values fetched per enumeration page
    pub page_size: usize,
    /// Enumeration limit before a field switches to a bucket map
    pub max_distinct_values: usize,
    /// Pool size of fields switched to a bucket map
    pub default_pool_size: usize,
    /// Whether `infer` directives are resolved
    pub infer: bool,
    /// Fields bucketed from the start, with their pool sizes
    pub high_cardinality: BTreeMap<String, usize>,
}

impl From<&MaskingConfig> for MappingSettings {
    fn from(config: &MaskingConfig) -> Self {
        Self {
            page_size: config.distinct_page_size,
            max_distinct_values: config.max_distinct_values,
            default_pool_size: config.default_pool_size,
            infer: config.infer,
            high_cardinality: config.high_cardinality.clone(),
        }
    }
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self::from(&MaskingConfig::default())
    }
}

/// Builds a [`MaskingPlan`] against a source
pub struct PlanBuilder<'a> {
    source: &'a dyn DocumentSource,
    query: &'a Query,
    settings: &'a MappingSettings,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder
    pub fn new(
        source: &'a dyn DocumentSource,
        query: &'a Query,
        settings: &'a MappingSettings,
    ) -> Self {
        Self {
            source,
            query,
            settings,
        }
    }

    /// Builds the plan for a set of directives
    ///
    /// # Errors
    ///
    /// Returns `ProviderResolution` for an unregistered provider name before
    /// the source is contacted, `ProviderInference` for inconsistent field
    /// types, or a source error from enumeration.
    pub async fn build(
        &self,
        directives: &[FieldDirective],
        registry: &mut ProviderRegistry,
    ) -> Result<MaskingPlan> {
        for directive in directives {
            if let MaskStrategy::Provider(name) = &directive.strategy {
                registry.resolve(&directive.field, name)?;
            }
        }

        let directives = infer_strategies(self.source, directives, self.settings.infer).await?;
        let mapper = ValueMapper::new(
            self.source,
            self.query,
            self.settings.page_size,
            self.settings.max_distinct_values,
        );

        let mut plan = MaskingPlan::empty();
        for directive in &directives {
            let provider = match &directive.strategy {
                MaskStrategy::Provider(name) => registry.resolve(&directive.field, name)?,
                _ => {
                    if self.settings.high_cardinality.contains_key(&directive.field) {
                        tracing::warn!(
                            field = %directive.field,
                            "High-cardinality field resolved to no masking"
                        );
                    }
                    plan.passthrough.push(directive.field.clone());
                    continue;
                }
            };

            let mask = self
                .build_field(&mapper, &directive.field, &provider, registry)
                .await?;
            tracing::info!(
                field = %directive.field,
                provider = provider.name(),
                bucketed = mask.is_bucketed(),
                "Field mask built"
            );
            plan.insert(directive.field.clone(), mask);
        }

        Ok(plan)
    }

    async fn build_field(
        &self,
        mapper: &ValueMapper<'_>,
        field: &str,
        provider: &MaskProvider,
        registry: &mut ProviderRegistry,
    ) -> Result<FieldMask> {
        if let Some(pool_size) = self.settings.high_cardinality.get(field) {
            return Ok(FieldMask::Bucketed(BucketMap::generate(
                field, provider, *pool_size, registry,
            )));
        }

        match mapper.enumerate(field).await? {
            Enumeration::Complete(map) => {
                let distinct_values = map.len();
                let resolved = map.resolve(provider, registry);
                tracing::debug!(field, distinct_values, "Value map resolved");
                Ok(FieldMask::Mapped(resolved))
            }
            Enumeration::Exceeded { seen } => {
                tracing::warn!(
                    field,
                    seen,
                    limit = self.settings.max_distinct_values,
                    pool_size = self.settings.default_pool_size,
                    "Too many distinct values, switching field to a bucket map"
                );
                Ok(FieldMask::Bucketed(BucketMap::generate(
                    field,
                    provider,
                    self.settings.default_pool_size,
                    registry,
                )))
            }
        }
    }
}
