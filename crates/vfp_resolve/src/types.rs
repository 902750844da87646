use serde::{Deserialize, Serialize};
use thiserror::Error;
use vfp_behavior::BehaviorError;
use vfp_canonical::CanonicalError;
use vfp_ingest::IngestError;
use vfp_lsh::LshError;
use vfp_store::StoreError;

/// How the resolution terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Exact hash hit whose behavioral similarity cleared the threshold.
    ExactReturning,
    /// Fuzzy candidate accepted by cross-device similarity; the new
    /// fingerprint was associated with the existing visitor.
    CrossDeviceReturning,
    /// No acceptable candidate; a fresh identity was allocated.
    New,
}

/// Outcome of one resolution call. Transient; never persisted by this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionResult {
    pub visitor_id: String,
    pub session_id: String,
    pub is_new_visitor: bool,
    /// Similarity score behind the decision, in [0, 1]. A new visitor scores
    /// 1.0 by definition: there is no uncertainty about "this is unseen".
    pub confidence: f64,
    pub kind: MatchKind,
}

/// Decision thresholds and retrieval caps for the resolver.
///
/// Everything here is injected rather than ambient so tests can exercise
/// boundary values. Threshold comparisons are closed-interval: a score equal
/// to the threshold is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// Semantic version of the resolver configuration.
    pub version: u32,
    /// Minimum behavioral similarity for an exact-hash hit to be reused.
    #[serde(default = "ResolverConfig::default_behavioral_threshold")]
    pub behavioral_similarity_threshold: f64,
    /// Minimum cross-device similarity for a fuzzy candidate to be accepted.
    #[serde(default = "ResolverConfig::default_cross_device_threshold")]
    pub cross_device_similarity_threshold: f64,
    /// Result cap per bucket query.
    #[serde(default = "ResolverConfig::default_bucket_limit")]
    pub bucket_limit: usize,
    /// Cap on the combined, de-duplicated candidate list.
    #[serde(default = "ResolverConfig::default_candidate_cap")]
    pub candidate_cap: usize,
}

impl ResolverConfig {
    pub(crate) fn default_behavioral_threshold() -> f64 {
        0.7
    }

    pub(crate) fn default_cross_device_threshold() -> f64 {
        0.8
    }

    pub(crate) fn default_bucket_limit() -> usize {
        5
    }

    pub(crate) fn default_candidate_cap() -> usize {
        10
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.version == 0 {
            return Err(ResolveError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        for (name, value) in [
            (
                "behavioral_similarity_threshold",
                self.behavioral_similarity_threshold,
            ),
            (
                "cross_device_similarity_threshold",
                self.cross_device_similarity_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ResolveError::InvalidConfig(format!(
                    "{name} must be in [0.0, 1.0] (got {value})"
                )));
            }
        }
        if self.bucket_limit == 0 {
            return Err(ResolveError::InvalidConfig(
                "bucket_limit must be greater than zero".into(),
            ));
        }
        if self.candidate_cap == 0 {
            return Err(ResolveError::InvalidConfig(
                "candidate_cap must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            version: 1,
            behavioral_similarity_threshold: Self::default_behavioral_threshold(),
            cross_device_similarity_threshold: Self::default_cross_device_threshold(),
            bucket_limit: Self::default_bucket_limit(),
            candidate_cap: Self::default_candidate_cap(),
        }
    }
}

/// Errors surfaced by the resolution layer.
///
/// Store failures during the read phase are fatal for the call and appear
/// here; store failures during the write phase never do — the decision is
/// still returned and the failed write is logged for later reconciliation.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid resolver config: {0}")]
    InvalidConfig(String),
    #[error("ingest failure: {0}")]
    Ingest(#[from] IngestError),
    #[error("canonicalization failure: {0}")]
    Canonical(#[from] CanonicalError),
    #[error("bucket generation failure: {0}")]
    Lsh(#[from] LshError),
    #[error("behavioral engine failure: {0}")]
    Behavior(#[from] BehaviorError),
    #[error("store read failure: {0}")]
    StoreRead(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ResolverConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.behavioral_similarity_threshold, 0.7);
        assert_eq!(cfg.cross_device_similarity_threshold, 0.8);
        assert_eq!(cfg.bucket_limit, 5);
        assert_eq!(cfg.candidate_cap, 10);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let cfg = ResolverConfig {
            cross_device_similarity_threshold: 1.2,
            ..Default::default()
        };
        let err = cfg.validate().expect_err("config should be invalid");
        match err {
            ResolveError::InvalidConfig(msg) => {
                assert!(msg.contains("cross_device_similarity_threshold"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_caps_rejected() {
        let cfg = ResolverConfig {
            bucket_limit: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = ResolverConfig {
            candidate_cap: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
