//! Value maps and exhaustive distinct-value enumeration

use crate::adapters::source::{DocumentSource, Query};
use crate::core::providers::{MaskProvider, ProviderRegistry};
use crate::domain::{FieldDirective, MaskStrategy, Result, SourceError, ValueKey};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Attempts to find a replacement not used by another value of the field
pub const MAX_COLLISION_RETRIES: usize = 32;

/// Distinct values of one field, each waiting for a replacement
///
/// Keys are kept in sorted order so seeded runs resolve values in the same
/// order.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    field: String,
    entries: BTreeMap<ValueKey, Option<Value>>,
}

impl ValueMap {
    /// Creates an empty map for a field
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Field the map belongs to
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Records an original value with an unresolved placeholder
    ///
    /// Lists contribute each element; nulls are never masked.
    pub fn insert_original(&mut self, value: &Value) {
        match value {
            Value::Null => {}
            Value::Array(items) => items.iter().for_each(|item| self.insert_original(item)),
            scalar => {
                self.entries.entry(ValueKey::of(scalar)).or_insert(None);
            }
        }
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no value was observed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every value still awaits a replacement
    pub fn is_unresolved(&self) -> bool {
        self.entries.values().all(Option::is_none)
    }

    /// Assigns a replacement to every value, calling the provider once per value
    ///
    /// A candidate that equals another value's replacement, or one of the
    /// field's original values, is regenerated up to
    /// [`MAX_COLLISION_RETRIES`] times before it is accepted anyway.
    pub fn resolve(
        mut self,
        provider: &MaskProvider,
        registry: &mut ProviderRegistry,
    ) -> ResolvedValueMap {
        let mut taken: HashSet<ValueKey> = self.entries.keys().cloned().collect();
        let mut collisions = 0usize;

        for slot in self.entries.values_mut() {
            let mut candidate = registry.generate(provider);
            let mut attempts = 1;
            while taken.contains(&ValueKey::of(&candidate)) && attempts < MAX_COLLISION_RETRIES {
                candidate = registry.generate(provider);
                attempts += 1;
            }
            if !taken.insert(ValueKey::of(&candidate)) {
                collisions += 1;
            }
            *slot = Some(candidate);
        }

        if collisions > 0 {
            tracing::warn!(
                field = %self.field,
                provider = provider.name(),
                collisions,
                "Provider could not produce unique replacements for every value"
            );
        }

        let entries = self
            .entries
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect();

        ResolvedValueMap {
            field: self.field,
            provider: provider.name(),
            entries,
        }
    }
}

/// A value map whose every entry has its replacement
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct ResolvedValueMap {
    field: String,
    provider: &'static str,
    entries: HashMap<ValueKey, Value>,
}

impl ResolvedValueMap {
    /// Field the map belongs to
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Provider that generated the replacements
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Replacement of a scalar value
    pub fn get(&self, original: &Value) -> Option<&Value> {
        self.entries.get(&ValueKey::of(original))
    }

    /// Number of mapped values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the replacements
    pub fn replacements(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}

/// Outcome of enumerating one field
#[derive(Debug)]
pub enum Enumeration {
    /// Every distinct value was collected
    Complete(ValueMap),
    /// The field has more distinct values than the configured limit
    Exceeded {
        /// Distinct values seen before enumeration stopped
        seen: usize,
    },
}

/// Enumerates the distinct values of masked fields
///
/// Pages through the source's distinct values in sort order, advancing a
/// cursor to the last value of each page until a short page arrives.
pub struct ValueMapper<'a> {
    source: &'a dyn DocumentSource,
    query: &'a Query,
    page_size: usize,
    max_distinct_values: usize,
}

impl<'a> ValueMapper<'a> {
    /// Creates a mapper over a source and predicate
    pub fn new(
        source: &'a dyn DocumentSource,
        query: &'a Query,
        page_size: usize,
        max_distinct_values: usize,
    ) -> Self {
        Self {
            source,
            query,
            page_size: page_size.max(1),
            max_distinct_values,
        }
    }

    /// Enumerates every distinct value of a field
    ///
    /// # Errors
    ///
    /// Returns a source error if a page cannot be fetched or the cursor
    /// stops advancing.
    pub async fn enumerate(&self, field: &str) -> Result<Enumeration> {
        let mut map = ValueMap::new(field);
        let mut after: Option<Value> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .source
                .distinct_values_page(field, self.query, after.as_ref(), self.page_size)
                .await?;
            pages += 1;
            let fetched = page.len();

            for value in &page {
                map.insert_original(value);
            }

            if map.len() > self.max_distinct_values {
                tracing::debug!(field, pages, seen = map.len(), "Distinct value limit exceeded");
                return Ok(Enumeration::Exceeded { seen: map.len() });
            }

            if fetched < self.page_size {
                break;
            }

            let last = page.into_iter().last();
            if last.is_some() && last == after {
                return Err(SourceError::InvalidResponse(format!(
                    "distinct value cursor for '{field}' did not advance"
                ))
                .into());
            }
            after = last;
        }

        tracing::debug!(field, pages, distinct_values = map.len(), "Field enumerated");
        Ok(Enumeration::Complete(map))
    }

    /// Builds empty value maps for every directive with a provider strategy
    ///
    /// Fields with strategy `none` or `infer` are not enumerated.
    ///
    /// # Errors
    ///
    /// Returns the first enumeration error.
    pub async fn build_value_maps(
        &self,
        directives: &[FieldDirective],
    ) -> Result<BTreeMap<String, Enumeration>> {
        let mut maps = BTreeMap::new();
        for directive in directives {
            if matches!(directive.strategy, MaskStrategy::Provider(_)) {
                let enumeration = self.enumerate(&directive.field).await?;
                maps.insert(directive.field.clone(), enumeration);
            }
        }
        Ok(maps)
    }
}
