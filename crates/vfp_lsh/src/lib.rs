//! Locality-sensitive bucket hashing over canonical features.
//!
//! Each bucket hashes a fixed, overlapping subset of the canonical feature
//! set, chosen so a fingerprint that drifted in one weak subsystem (say, a
//! timezone changed by travel) still collides on the buckets that exclude
//! that subsystem. Bucket payloads are serialized through a `BTreeMap`, so
//! key order is canonical by construction and the hash is stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use vfp_canonical::CanonicalFeatureSet;

/// Number of fixed feature groupings available.
pub const MAX_BUCKETS: usize = 4;

/// Configuration for bucket generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LshConfig {
    /// Semantic version of the LSH configuration.
    pub version: u32,
    /// Number of buckets to emit (at most [`MAX_BUCKETS`]).
    pub bucket_count: usize,
    /// Hex length each bucket hash is truncated to.
    pub bucket_hash_len: usize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bucket_count: MAX_BUCKETS,
            bucket_hash_len: 16,
        }
    }
}

impl LshConfig {
    pub fn validate(&self) -> Result<(), LshError> {
        if self.version == 0 {
            return Err(LshError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.bucket_count == 0 || self.bucket_count > MAX_BUCKETS {
            return Err(LshError::InvalidConfig(format!(
                "bucket_count must be in 1..={MAX_BUCKETS} (got {})",
                self.bucket_count
            )));
        }
        if self.bucket_hash_len == 0 || self.bucket_hash_len > 64 {
            return Err(LshError::InvalidConfig(
                "bucket_hash_len must be in 1..=64".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LshError {
    #[error("invalid lsh config: {0}")]
    InvalidConfig(String),
    #[error("bucket serialization failed: {0}")]
    Serialization(String),
}

/// Ordered bucket hashes. Position `i` always encodes the same feature
/// combination, so positional comparison between two sets is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FuzzyHashSet {
    pub hashes: Vec<String>,
    pub meta: LshMeta,
}

/// Generation parameters recorded for traceability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LshMeta {
    pub version: u32,
    pub bucket_count: usize,
    pub bucket_hash_len: usize,
}

impl FuzzyHashSet {
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Feature grouping for bucket `i`. Groupings are fixed; changing them is a
/// breaking change to every stored bucket hash.
fn combination(features: &CanonicalFeatureSet, i: usize) -> BTreeMap<&'static str, &str> {
    let mut map = BTreeMap::new();
    match i {
        // Render stack: highest-stability signals.
        0 => {
            map.insert("canvas", features.canvas_prefix.as_str());
            map.insert("webgl_vendor", features.webgl_vendor.as_str());
            map.insert("webgl_renderer", features.webgl_renderer.as_str());
            map.insert("audio", features.audio_prefix.as_str());
        }
        // Environment: survives canvas/audio drift, breaks on travel.
        1 => {
            map.insert("screen", features.screen_bucket.as_str());
            map.insert("timezone", features.timezone.as_str());
            map.insert("language", features.language.as_str());
            map.insert("webgl_vendor", features.webgl_vendor.as_str());
        }
        // Software profile: fonts and user agent.
        2 => {
            map.insert("fonts", features.fonts_digest.as_str());
            map.insert("ua", features.ua_digest.as_str());
            map.insert("language", features.language.as_str());
        }
        // Hardware-plus-customization cross-cut.
        3 => {
            map.insert("canvas", features.canvas_prefix.as_str());
            map.insert("screen", features.screen_bucket.as_str());
            map.insert("extensions", features.extensions_digest.as_str());
        }
        _ => unreachable!("bucket index out of range"),
    }
    map
}

/// Generate the ordered fuzzy bucket hashes for a feature set.
pub fn generate_buckets(
    features: &CanonicalFeatureSet,
    cfg: &LshConfig,
) -> Result<FuzzyHashSet, LshError> {
    cfg.validate()?;
    let mut hashes = Vec::with_capacity(cfg.bucket_count);
    for i in 0..cfg.bucket_count {
        let payload = serde_json::to_string(&combination(features, i))
            .map_err(|e| LshError::Serialization(e.to_string()))?;
        hashes.push(truncated_sha256(&payload, cfg.bucket_hash_len));
    }
    Ok(FuzzyHashSet {
        hashes,
        meta: LshMeta {
            version: cfg.version,
            bucket_count: cfg.bucket_count,
            bucket_hash_len: cfg.bucket_hash_len,
        },
    })
}

/// Generate the full exact hash over every canonical feature. Used for
/// high-confidence exact re-identification; never truncated.
pub fn generate_exact_hash(
    features: &CanonicalFeatureSet,
    cfg: &LshConfig,
) -> Result<String, LshError> {
    cfg.validate()?;
    let mut map = BTreeMap::new();
    map.insert("canvas", features.canvas_prefix.as_str());
    map.insert("webgl_vendor", features.webgl_vendor.as_str());
    map.insert("webgl_renderer", features.webgl_renderer.as_str());
    map.insert("audio", features.audio_prefix.as_str());
    map.insert("screen", features.screen_bucket.as_str());
    map.insert("timezone", features.timezone.as_str());
    map.insert("language", features.language.as_str());
    map.insert("fonts", features.fonts_digest.as_str());
    map.insert("extensions", features.extensions_digest.as_str());
    map.insert("ua", features.ua_digest.as_str());
    let payload =
        serde_json::to_string(&map).map_err(|e| LshError::Serialization(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Positional similarity between two bucket sets: exact collisions only,
/// `matches / max(len_a, len_b)`. Empty sets score 0.
pub fn fuzzy_similarity(a: &FuzzyHashSet, b: &FuzzyHashSet) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let matches = a
        .hashes
        .iter()
        .zip(b.hashes.iter())
        .filter(|(x, y)| x == y)
        .count();
    matches as f64 / longest as f64
}

fn truncated_sha256(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(len);
    hex
}
