//! # Feature canonicalization
//!
//! Reduces a raw fingerprint payload into a small, fixed-shape set of stable,
//! comparable feature values. The reduction is a pure, total function: missing
//! sub-fields collapse to documented sentinel values rather than failing,
//! because partial payloads are the common case.
//!
//! Determinism rules:
//!
//! - Screen resolution is bucketed down to the nearest 100px per dimension,
//!   deliberately discarding fine-grained resolution noise.
//! - Language is reduced to its primary subtag (`en-US` becomes `en`).
//! - Font, extension, and CSS lists are sorted and de-duplicated before
//!   digesting so browser-internal enumeration order never affects the result.
//! - No wall-clock or random input is consulted anywhere in this crate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use vfp_ingest::RawFingerprintPayload;

/// Sentinel used when a string-valued signal is absent.
pub const UNKNOWN: &str = "unknown";
/// Default screen dimensions assumed for privacy-hardened browsers.
pub const DEFAULT_SCREEN: (u32, u32) = (1920, 1080);
/// Default base timezone when the collector reports none.
pub const DEFAULT_TIMEZONE: &str = "UTC";
/// Default primary language subtag.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Configuration for feature canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalConfig {
    /// Semantic version of the canonicalization configuration.
    pub version: u32,
    /// Leading characters of the canvas digest retained as the stable prefix.
    pub canvas_prefix_len: usize,
    /// Leading characters of the audio digest retained as the stable prefix.
    pub audio_prefix_len: usize,
    /// Hex length of list digests (fonts, extensions, user-agent).
    pub digest_len: usize,
    /// Entries of a sorted list that participate in its digest.
    pub max_digest_entries: usize,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            version: 1,
            canvas_prefix_len: 32,
            audio_prefix_len: 24,
            digest_len: 16,
            max_digest_entries: 10,
        }
    }
}

impl CanonicalConfig {
    pub fn validate(&self) -> Result<(), CanonicalError> {
        if self.version == 0 {
            return Err(CanonicalError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.canvas_prefix_len == 0 || self.audio_prefix_len == 0 {
            return Err(CanonicalError::InvalidConfig(
                "prefix lengths must be greater than zero".into(),
            ));
        }
        if self.digest_len == 0 || self.digest_len > 64 {
            return Err(CanonicalError::InvalidConfig(
                "digest_len must be in 1..=64".into(),
            ));
        }
        if self.max_digest_entries == 0 {
            return Err(CanonicalError::InvalidConfig(
                "max_digest_entries must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("invalid canonical config: {0}")]
    InvalidConfig(String),
}

/// The reduced, comparable feature record. Identical payloads always produce
/// an identical feature set under a given configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CanonicalFeatureSet {
    pub canvas_prefix: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub audio_prefix: String,
    /// Bucketed `WxH`, e.g. `1900x1000` for a 1920x1080 display.
    pub screen_bucket: String,
    pub timezone: String,
    /// Primary language subtag only.
    pub language: String,
    pub fonts_digest: String,
    pub extensions_digest: String,
    pub ua_digest: String,
}

/// Canonicalize a raw payload into its comparable feature set.
pub fn canonicalize(
    payload: &RawFingerprintPayload,
    cfg: &CanonicalConfig,
) -> Result<CanonicalFeatureSet, CanonicalError> {
    cfg.validate()?;

    let core = payload.core.as_ref();
    let advanced = payload.advanced.as_ref();

    let canvas_prefix = prefix(
        core.and_then(|c| c.canvas.as_deref()).unwrap_or(UNKNOWN),
        cfg.canvas_prefix_len,
    );
    let audio_prefix = prefix(
        core.and_then(|c| c.audio.as_deref()).unwrap_or(UNKNOWN),
        cfg.audio_prefix_len,
    );
    let webgl_vendor = core
        .and_then(|c| c.webgl_vendor.as_deref())
        .unwrap_or(UNKNOWN)
        .trim()
        .to_string();
    let webgl_renderer = core
        .and_then(|c| c.webgl_renderer.as_deref())
        .unwrap_or(UNKNOWN)
        .trim()
        .to_string();

    let width = core.and_then(|c| c.screen_width).unwrap_or(DEFAULT_SCREEN.0);
    let height = core
        .and_then(|c| c.screen_height)
        .unwrap_or(DEFAULT_SCREEN.1);

    let timezone = core
        .and_then(|c| c.timezone.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TIMEZONE)
        .to_string();
    let language = primary_subtag(core.and_then(|c| c.language.as_deref()));

    let fonts_digest = sorted_digest(core.and_then(|c| c.fonts.as_deref()), cfg);
    let extensions_digest = sorted_digest(advanced.and_then(|a| a.extensions.as_deref()), cfg);
    let ua_digest = short_digest(
        core.and_then(|c| c.user_agent.as_deref()).unwrap_or(UNKNOWN),
        cfg.digest_len,
    );

    Ok(CanonicalFeatureSet {
        canvas_prefix,
        webgl_vendor,
        webgl_renderer,
        audio_prefix,
        screen_bucket: bucket_screen(width, height),
        timezone,
        language,
        fonts_digest,
        extensions_digest,
        ua_digest,
    })
}

/// Bucket screen dimensions down to the nearest 100px per axis.
pub fn bucket_screen(width: u32, height: u32) -> String {
    format!("{}x{}", (width / 100) * 100, (height / 100) * 100)
}

/// Reduce a BCP 47 tag to its primary subtag, falling back to the default.
pub fn primary_subtag(language: Option<&str>) -> String {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.split(['-', '_'])
                .next()
                .unwrap_or(l)
                .to_ascii_lowercase()
        })
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Digest a list-valued signal order-independently: sort, de-duplicate,
/// truncate to the configured entry count, then hash the joined entries.
fn sorted_digest(entries: Option<&[String]>, cfg: &CanonicalConfig) -> String {
    let Some(entries) = entries.filter(|e| !e.is_empty()) else {
        return UNKNOWN.to_string();
    };
    let mut sorted: Vec<&str> = entries.iter().map(|e| e.trim()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.truncate(cfg.max_digest_entries);
    short_digest(&sorted.join("\u{1f}"), cfg.digest_len)
}

/// SHA-256 digest truncated to `len` hex characters.
pub fn short_digest(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(len);
    hex
}

fn prefix(value: &str, len: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        return UNKNOWN.to_string();
    }
    value.chars().take(len).collect()
}
