//! Bucket maps for fields too large to enumerate

use crate::core::providers::{MaskProvider, ProviderRegistry};
use crate::domain::ValueKey;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Pre-generated pool of synthetic values for one high-cardinality field
///
/// The replacement for an original value is the pool entry at
/// `u64(first 8 bytes of SHA-256(value key)) mod pool_size`, so equal inputs
/// always select the same entry.
#[derive(Debug, Clone)]
pub struct BucketMap {
    field: String,
    provider: &'static str,
    pool: Vec<Value>,
}

impl BucketMap {
    /// Generates a pool of `pool_size` values with the given provider
    ///
    /// A zero pool size is treated as one.
    pub fn generate(
        field: impl Into<String>,
        provider: &MaskProvider,
        pool_size: usize,
        registry: &mut ProviderRegistry,
    ) -> Self {
        let pool = (0..pool_size.max(1))
            .map(|_| registry.generate(provider))
            .collect();
        Self {
            field: field.into(),
            provider: provider.name(),
            pool,
        }
    }

    /// Field the bucket map belongs to
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Provider that filled the pool
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Number of pool entries
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Pool index selected for a scalar value
    pub fn index_of(&self, original: &Value) -> usize {
        let digest = Sha256::digest(ValueKey::of(original).as_str().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.pool.len() as u64) as usize
    }

    /// Replacement for a scalar value
    pub fn substitute(&self, original: &Value) -> &Value {
        &self.pool[self.index_of(original)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket(pool_size: usize) -> BucketMap {
        let mut registry = ProviderRegistry::new(Some(3));
        let provider = registry.resolve("session.id", "uuid").unwrap();
        BucketMap::generate("session.id", &provider, pool_size, &mut registry)
    }

    #[test]
    fn test_substitute_is_deterministic() {
        let map = bucket(64);
        let value = json!("f3b1c0de");
        assert_eq!(map.substitute(&value), map.substitute(&value));
        assert_eq!(map.index_of(&value), map.index_of(&value));
    }

    #[test]
    fn test_index_stays_in_range() {
        let map = bucket(7);
        for i in 0..200 {
            assert!(map.index_of(&json!(i)) < 7);
        }
    }

    #[test]
    fn test_zero_pool_size_is_clamped() {
        let map = bucket(0);
        assert_eq!(map.pool_size(), 1);
        assert_eq!(map.substitute(&json!("a")), map.substitute(&json!("b")));
    }

    #[test]
    fn test_string_and_number_keys_differ() {
        let map = bucket(1_000_000);
        assert_ne!(map.index_of(&json!("1")), map.index_of(&json!(1)));
    }
}
