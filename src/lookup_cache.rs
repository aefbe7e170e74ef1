use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cached lookup payload stored next to its SHA-256 checksum.
///
/// Entries whose checksum no longer matches are treated as a miss, so a
/// corrupted value is refetched instead of being shown to the user.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// JSON payload.
    pub data: String,
    /// Hex-encoded SHA-256 of `data`.
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the payload if the stored entry parses and its checksum matches.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Lookup cache checksum mismatch (expected {}, {} bytes), discarding entry",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }
}

/// TTL-bounded cache of successful lookups, keyed by `"{kind}:{digits}"`.
#[derive(Clone)]
pub struct LookupCache {
    inner: Cache<String, String>,
}

impl LookupCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
        }
    }

    fn key(kind: &str, digits: &str) -> String {
        format!("{}:{}", kind, digits)
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: &str, digits: &str) -> Option<T> {
        let key = Self::key(kind, digits);
        let cached = self.inner.get(&key).await?;

        let Some(valid) = ValidatedCacheEntry::deserialize_and_validate(&cached) else {
            self.inner.invalidate(&key).await;
            return None;
        };

        match serde_json::from_str(&valid) {
            Ok(value) => {
                tracing::debug!("Lookup cache HIT for {}", key);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Lookup cache entry {} no longer parses: {}", key, e);
                self.inner.invalidate(&key).await;
                None
            }
        }
    }

    pub async fn insert<T: Serialize>(&self, kind: &str, digits: &str, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            let entry = ValidatedCacheEntry::new(json);
            self.inner
                .insert(Self::key(kind, digits), entry.serialize())
                .await;
        }
    }

    /// Stores a raw string under a key, bypassing the checksum. Used to
    /// exercise the corruption path.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, kind: &str, digits: &str, raw: String) {
        self.inner.insert(Self::key(kind, digits), raw).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressLookup;

    #[test]
    fn test_cache_entry_validation() {
        let data = r#"{"cnpj":"11222333000181","razao_social":"ACME LTDA"}"#.to_string();
        let entry = ValidatedCacheEntry::new(data.clone());

        assert!(entry.is_valid());
        assert_eq!(entry.data, data);
    }

    #[test]
    fn test_tampered_cache_returns_none() {
        let entry = ValidatedCacheEntry::new(r#"{"cidade":"Rio de Janeiro"}"#.to_string());
        let tampered = entry.serialize().replace("Rio de Janeiro", "Niteroi");

        assert_eq!(ValidatedCacheEntry::deserialize_and_validate(&tampered), None);
    }

    #[tokio::test]
    async fn test_round_trip_through_cache() {
        let cache = LookupCache::new(Duration::from_secs(60), 10);
        let address = AddressLookup {
            cep: "22070002".to_string(),
            logradouro: "Avenida Atlântica".to_string(),
            bairro: "Copacabana".to_string(),
            cidade: "Rio de Janeiro".to_string(),
            estado: "RJ".to_string(),
        };

        cache.insert("cep", "22070002", &address).await;

        let hit: Option<AddressLookup> = cache.get("cep", "22070002").await;
        assert_eq!(hit, Some(address));
        let other: Option<AddressLookup> = cache.get("cep", "01001000").await;
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_a_miss() {
        let cache = LookupCache::new(Duration::from_secs(60), 10);
        cache
            .insert_raw("cnpj", "11222333000181", "not json".to_string())
            .await;

        let hit: Option<AddressLookup> = cache.get("cnpj", "11222333000181").await;
        assert!(hit.is_none());
    }
}
