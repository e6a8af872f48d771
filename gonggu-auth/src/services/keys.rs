//! Remote verification keys, cached per `kid`.
//!
//! Kakao publishes a standard JWKS document. Google publishes its token
//! signing keys as a JSON object mapping `kid` to an x509 certificate PEM.
//! Both end up as `kid -> DecodingKey` in the same cache.

use std::collections::HashMap;
use std::time::Duration;

use jsonwebtoken::{jwk::JwkSet, DecodingKey};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Minimum spacing between refetches triggered by an unknown `kid`.
const UNKNOWN_KID_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetFormat {
    Jwks,
    X509,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

pub struct KeySetCache {
    http: reqwest::Client,
    url: String,
    format: KeySetFormat,
    ttl: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

impl KeySetCache {
    pub fn new(http: reqwest::Client, url: impl Into<String>, format: KeySetFormat, ttl: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            format,
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key for `kid`, fetching the key set when the cache is empty, stale,
    /// or does not know the `kid` yet. `Ok(None)` means the publisher does
    /// not list the key.
    pub async fn get(&self, kid: &str) -> Result<Option<DecodingKey>, anyhow::Error> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                let age = entry.fetched_at.elapsed();
                if age < self.ttl {
                    if let Some(key) = entry.keys.get(kid) {
                        return Ok(Some(key.clone()));
                    }
                    if age < UNKNOWN_KID_REFETCH_INTERVAL {
                        return Ok(None);
                    }
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < UNKNOWN_KID_REFETCH_INTERVAL {
                return Ok(entry.keys.get(kid).cloned());
            }
        }

        let keys = self.fetch().await?;
        tracing::debug!(url = %self.url, count = keys.len(), "Fetched verification keys");
        let key = keys.get(kid).cloned();
        *cached = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(key)
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, anyhow::Error> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch key set from {}: {}", self.url, e))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Key set endpoint {} returned {}",
                self.url,
                response.status()
            ));
        }

        match self.format {
            KeySetFormat::Jwks => {
                let set: JwkSet = response
                    .json()
                    .await
                    .map_err(|e| anyhow::anyhow!("Invalid JWKS document: {}", e))?;
                Ok(parse_jwks(&set))
            }
            KeySetFormat::X509 => {
                let certs: HashMap<String, String> = response
                    .json()
                    .await
                    .map_err(|e| anyhow::anyhow!("Invalid certificate map: {}", e))?;
                Ok(parse_x509_map(&certs))
            }
        }
    }
}

fn parse_jwks(set: &JwkSet) -> HashMap<String, DecodingKey> {
    set.keys
        .iter()
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((kid, key)),
                Err(e) => {
                    tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWK");
                    None
                }
            }
        })
        .collect()
}

fn parse_x509_map(certs: &HashMap<String, String>) -> HashMap<String, DecodingKey> {
    certs
        .iter()
        .filter_map(|(kid, pem)| match DecodingKey::from_rsa_pem(pem.as_bytes()) {
            Ok(key) => Some((kid.clone(), key)),
            Err(e) => {
                tracing::warn!(kid = %kid, error = %e, "Skipping unusable certificate");
                None
            }
        })
        .collect()
}
