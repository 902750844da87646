//! Behavioral signature engine.
//!
//! Extracts a compact behavioral profile from interaction telemetry and folds
//! new observations into an existing profile via weighted exponential
//! smoothing. Numeric zero and empty strings are the "no signal" sentinels
//! throughout; scorers exclude absent pairs instead of penalizing them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vfp_ingest::BehavioralTelemetry;

mod similarity;

pub use similarity::{behavioral_similarity, cross_device_similarity};

/// Smoothing constants for signature merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeConfig {
    /// Semantic version of the merge configuration.
    pub version: u32,
    /// Weight of the stored signature in numeric blends.
    pub existing_weight: f64,
    /// Weight of the freshly observed signature in numeric blends.
    pub observed_weight: f64,
    /// Stability gained per merge, capped at 1.0.
    pub stability_increment: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            existing_weight: 0.7,
            observed_weight: 0.3,
            stability_increment: 0.1,
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<(), BehaviorError> {
        if self.version == 0 {
            return Err(BehaviorError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if (self.existing_weight + self.observed_weight - 1.0).abs() > 1e-9 {
            return Err(BehaviorError::InvalidConfig(
                "existing_weight and observed_weight must sum to 1.0".into(),
            ));
        }
        if !(self.stability_increment > 0.0 && self.stability_increment <= 1.0) {
            return Err(BehaviorError::InvalidConfig(
                "stability_increment must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BehaviorError {
    #[error("invalid merge config: {0}")]
    InvalidConfig(String),
}

/// Compact behavioral profile of one visitor. Numeric `0.0` and empty strings
/// mean "never observed".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehavioralSignature {
    pub typing_wpm: f64,
    /// Keystroke interval consistency in [0, 1].
    pub typing_rhythm: f64,
    pub pointer_velocity: f64,
    pub click_pattern: String,
    pub scroll_pattern: String,
    pub session_duration_avg: f64,
    /// Interactions per minute of session time.
    pub interaction_frequency: f64,
    pub preferred_resolution: String,
    pub timezone_pattern: String,
    pub keyboard_language: String,
    /// Local hours of day (0-23) with observed activity.
    pub active_hours: BTreeSet<u8>,
    /// Confidence ratchet in [0, 1] reflecting accumulated evidence.
    pub stability: f64,
    pub updated_at: DateTime<Utc>,
}

impl BehavioralSignature {
    /// A signature with no observed signal; every comparison against it
    /// excludes every pair and scores 0.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            typing_wpm: 0.0,
            typing_rhythm: 0.0,
            pointer_velocity: 0.0,
            click_pattern: String::new(),
            scroll_pattern: String::new(),
            session_duration_avg: 0.0,
            interaction_frequency: 0.0,
            preferred_resolution: String::new(),
            timezone_pattern: String::new(),
            keyboard_language: String::new(),
            active_hours: BTreeSet::new(),
            stability: 0.0,
            updated_at: at,
        }
    }
}

/// Extract a signature from raw telemetry. Pure; missing fields collapse to
/// the "no signal" sentinels.
pub fn extract(telemetry: &BehavioralTelemetry, at: DateTime<Utc>) -> BehavioralSignature {
    let session_secs = telemetry.session_duration_secs.unwrap_or(0.0).max(0.0);
    let interaction_frequency = match (telemetry.interaction_count, session_secs) {
        (Some(count), secs) if count > 0 && secs > 0.0 => f64::from(count) / (secs / 60.0),
        _ => 0.0,
    };
    let mut active_hours = BTreeSet::new();
    if let Some(hour) = telemetry.active_hour.filter(|h| *h < 24) {
        active_hours.insert(hour);
    }

    BehavioralSignature {
        typing_wpm: telemetry.typing_wpm.unwrap_or(0.0).max(0.0),
        typing_rhythm: telemetry.typing_rhythm.unwrap_or(0.0).clamp(0.0, 1.0),
        pointer_velocity: telemetry.pointer_velocity.unwrap_or(0.0).max(0.0),
        click_pattern: non_empty(&telemetry.click_pattern),
        scroll_pattern: non_empty(&telemetry.scroll_pattern),
        session_duration_avg: session_secs,
        interaction_frequency,
        preferred_resolution: non_empty(&telemetry.preferred_resolution),
        timezone_pattern: non_empty(&telemetry.timezone),
        keyboard_language: non_empty(&telemetry.keyboard_language),
        active_hours,
        stability: 0.0,
        updated_at: at,
    }
}

/// Fold an observed signature into an existing one.
///
/// Numeric fields blend as `existing * w_e + observed * w_o` when both carry
/// signal; a side with no signal yields to the other. Categorical fields take
/// the observed value when present. `active_hours` is a set union and
/// stability ratchets up by the configured increment, capped at 1.0.
///
/// Repeated merges with the same observation converge geometrically toward
/// it; the operation is not literally associative for differing inputs.
pub fn merge(
    existing: &BehavioralSignature,
    observed: &BehavioralSignature,
    cfg: &MergeConfig,
) -> Result<BehavioralSignature, BehaviorError> {
    cfg.validate()?;

    let mut active_hours = existing.active_hours.clone();
    active_hours.extend(observed.active_hours.iter().copied());

    Ok(BehavioralSignature {
        typing_wpm: blend(existing.typing_wpm, observed.typing_wpm, cfg),
        typing_rhythm: blend(existing.typing_rhythm, observed.typing_rhythm, cfg),
        pointer_velocity: blend(existing.pointer_velocity, observed.pointer_velocity, cfg),
        click_pattern: pick(&existing.click_pattern, &observed.click_pattern),
        scroll_pattern: pick(&existing.scroll_pattern, &observed.scroll_pattern),
        session_duration_avg: blend(
            existing.session_duration_avg,
            observed.session_duration_avg,
            cfg,
        ),
        interaction_frequency: blend(
            existing.interaction_frequency,
            observed.interaction_frequency,
            cfg,
        ),
        preferred_resolution: pick(&existing.preferred_resolution, &observed.preferred_resolution),
        timezone_pattern: pick(&existing.timezone_pattern, &observed.timezone_pattern),
        keyboard_language: pick(&existing.keyboard_language, &observed.keyboard_language),
        active_hours,
        stability: (existing.stability + cfg.stability_increment).min(1.0),
        updated_at: observed.updated_at,
    })
}

fn blend(existing: f64, observed: f64, cfg: &MergeConfig) -> f64 {
    if observed <= 0.0 {
        existing
    } else if existing <= 0.0 {
        observed
    } else {
        existing * cfg.existing_weight + observed * cfg.observed_weight
    }
}

fn pick(existing: &str, observed: &str) -> String {
    if observed.is_empty() {
        existing.to_string()
    } else {
        observed.to_string()
    }
}

fn non_empty(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}
