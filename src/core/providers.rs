//! Mask provider registry
//!
//! A fixed table of strategy name to generator function. Every generator
//! draws from the registry's random number generator, which can be seeded so
//! two runs over the same corpus assign identical synthetic values.
//!
//! Names are resolved up front, while the masking plan is built, so an
//! unknown strategy fails before any record is read.

use crate::domain::{AnonymizeError, Result};
use fake::faker::address::en::CityName;
use fake::faker::chrono::en::DateTime;
use fake::faker::company::en::CompanyName;
use fake::faker::filesystem::en::FilePath;
use fake::faker::internet::en::{IPv4, IPv6, MACAddress, SafeEmail, Username};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::fmt;

/// Generator signature shared by all providers
pub type GeneratorFn = fn(&mut StdRng) -> Value;

const TOKEN_LENGTH: usize = 16;

/// Registered providers: name, description, generator
static CATALOGUE: &[(&str, &str, GeneratorFn)] = &[
    ("file_path", "Synthetic file system path", |rng| {
        json!(FilePath().fake_with_rng::<String, _>(rng))
    }),
    ("ipv4", "IPv4 address", |rng| {
        json!(IPv4().fake_with_rng::<String, _>(rng))
    }),
    ("ipv6", "IPv6 address", |rng| {
        json!(IPv6().fake_with_rng::<String, _>(rng))
    }),
    ("email", "Email address on a reserved domain", |rng| {
        json!(SafeEmail().fake_with_rng::<String, _>(rng))
    }),
    ("user_name", "Login name", |rng| {
        json!(Username().fake_with_rng::<String, _>(rng))
    }),
    ("name", "Person name", |rng| {
        json!(Name().fake_with_rng::<String, _>(rng))
    }),
    ("phone_number", "Phone number", |rng| {
        json!(PhoneNumber().fake_with_rng::<String, _>(rng))
    }),
    ("mac_address", "MAC address", |rng| {
        json!(MACAddress().fake_with_rng::<String, _>(rng))
    }),
    ("company", "Company name", |rng| {
        json!(CompanyName().fake_with_rng::<String, _>(rng))
    }),
    ("city", "City name", |rng| {
        json!(CityName().fake_with_rng::<String, _>(rng))
    }),
    ("word", "Single lorem ipsum word", |rng| {
        json!(Word().fake_with_rng::<String, _>(rng))
    }),
    ("token", "Random alphanumeric token", |rng| {
        let token: String = std::iter::repeat_with(|| char::from(rng.sample(Alphanumeric)))
            .take(TOKEN_LENGTH)
            .collect();
        json!(token)
    }),
    ("uuid", "Random UUID", |rng| {
        json!(uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string())
    }),
    ("integer", "Non-negative integer", |rng| {
        json!(rng.gen_range(0..1_000_000_i64))
    }),
    ("float", "Floating point number", |rng| {
        let raw: f64 = rng.gen_range(0.0..1_000_000.0);
        json!((raw * 100.0).round() / 100.0)
    }),
    ("date", "RFC 3339 timestamp", |rng| {
        let timestamp: chrono::DateTime<chrono::Utc> = DateTime().fake_with_rng(rng);
        json!(timestamp.to_rfc3339())
    }),
];

/// A resolved masking strategy
#[derive(Clone, Copy)]
pub struct MaskProvider {
    name: &'static str,
    generate: GeneratorFn,
}

impl MaskProvider {
    /// Registered name of the provider
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Produces a fresh synthetic value from the given generator state
    pub fn generate_with(&self, rng: &mut StdRng) -> Value {
        (self.generate)(rng)
    }
}

impl fmt::Debug for MaskProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskProvider")
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for MaskProvider {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Registry of mask providers plus the generator state they draw from
pub struct ProviderRegistry {
    rng: StdRng,
    seeded: bool,
}

impl ProviderRegistry {
    /// Creates a registry, seeded for reproducible output when `seed` is set
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            seeded: seed.is_some(),
        }
    }

    /// Whether values are reproducible across runs
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Looks up a provider by name
    pub fn lookup(name: &str) -> Option<MaskProvider> {
        CATALOGUE
            .iter()
            .find(|(registered, _, _)| *registered == name)
            .map(|(name, _, generate)| MaskProvider {
                name,
                generate: *generate,
            })
    }

    /// Resolves the provider assigned to a field
    ///
    /// # Errors
    ///
    /// Returns [`AnonymizeError::ProviderResolution`] naming the field if the
    /// provider is not registered.
    pub fn resolve(&self, field: &str, name: &str) -> Result<MaskProvider> {
        Self::lookup(name).ok_or_else(|| AnonymizeError::ProviderResolution {
            field: field.to_string(),
            provider: name.to_string(),
        })
    }

    /// Produces a fresh synthetic value
    pub fn generate(&mut self, provider: &MaskProvider) -> Value {
        provider.generate_with(&mut self.rng)
    }

    /// Whether a strategy name is registered
    pub fn contains(name: &str) -> bool {
        Self::lookup(name).is_some()
    }

    /// `(name, description)` of every registered provider
    pub fn catalogue() -> impl Iterator<Item = (&'static str, &'static str)> {
        CATALOGUE.iter().map(|(name, description, _)| (*name, *description))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldType;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_resolve_unknown_provider_names_field() {
        let registry = ProviderRegistry::new(Some(1));
        let err = registry.resolve("user.ip", "ipv5").unwrap_err();
        match err {
            AnonymizeError::ProviderResolution { field, provider } => {
                assert_eq!(field, "user.ip");
                assert_eq!(provider, "ipv5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ipv4_provider_produces_valid_addresses() {
        let mut registry = ProviderRegistry::new(Some(7));
        let provider = registry.resolve("user.ip", "ipv4").unwrap();
        for _ in 0..20 {
            let value = registry.generate(&provider);
            let text = value.as_str().unwrap();
            assert!(text.parse::<Ipv4Addr>().is_ok(), "not an IPv4 address: {text}");
        }
    }

    #[test]
    fn test_ipv6_provider_produces_valid_addresses() {
        let mut registry = ProviderRegistry::new(Some(7));
        let provider = registry.resolve("host.ip", "ipv6").unwrap();
        let value = registry.generate(&provider);
        assert!(value.as_str().unwrap().parse::<Ipv6Addr>().is_ok());
    }

    #[test]
    fn test_seeded_registries_agree() {
        let mut first = ProviderRegistry::new(Some(42));
        let mut second = ProviderRegistry::new(Some(42));

        for (name, _) in ProviderRegistry::catalogue() {
            let provider = ProviderRegistry::lookup(name).unwrap();
            assert_eq!(first.generate(&provider), second.generate(&provider), "{name}");
        }
        assert!(first.is_seeded());
    }

    #[test]
    fn test_every_provider_generates_a_scalar() {
        let mut registry = ProviderRegistry::new(Some(3));
        for (name, description) in ProviderRegistry::catalogue() {
            assert!(!description.is_empty());
            let provider = ProviderRegistry::lookup(name).unwrap();
            let value = registry.generate(&provider);
            assert!(!value.is_null() && !value.is_array() && !value.is_object(), "{name}");
        }
    }

    #[test]
    fn test_token_provider_shape() {
        let mut registry = ProviderRegistry::new(Some(5));
        let provider = ProviderRegistry::lookup("token").unwrap();
        let token = registry.generate(&provider);
        let token = token.as_str().unwrap();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_inferred_strategies_are_registered() {
        let tags = [
            FieldType::Keyword,
            FieldType::Text,
            FieldType::Integer,
            FieldType::Float,
            FieldType::Boolean,
            FieldType::Date,
            FieldType::Ip,
        ];
        for tag in tags {
            if let Some(name) = tag.inferred_strategy().provider() {
                assert!(ProviderRegistry::contains(name), "{name} is not registered");
            }
        }
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let mut names: Vec<&str> = ProviderRegistry::catalogue().map(|(n, _)| n).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
