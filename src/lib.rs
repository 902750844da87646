//! Workspace umbrella crate for visitor fingerprint identity resolution.
//!
//! Stitches the stage crates together so callers can go from a raw browser
//! payload to a resolved visitor identity with a single API entry point. The
//! pipeline is: raw payload → feature canonicalization → {exact hash, LSH
//! buckets} → store matching → behavioral scoring → resolution decision.

pub use vfp_behavior::{
    behavioral_similarity, cross_device_similarity, extract, merge, BehaviorError,
    BehavioralSignature, MergeConfig,
};
pub use vfp_canonical::{
    bucket_screen, canonicalize, primary_subtag, CanonicalConfig, CanonicalError,
    CanonicalFeatureSet,
};
pub use vfp_ingest::{
    ingest, AdvancedSignals, BehavioralTelemetry, CoreSignals, IngestConfig, IngestError,
    RawFingerprintPayload, RequestContext, ResolutionRequest,
};
pub use vfp_lsh::{
    fuzzy_similarity, generate_buckets, generate_exact_hash, FuzzyHashSet, LshConfig, LshError,
    LshMeta, MAX_BUCKETS,
};
pub use vfp_resolve::{
    set_resolve_metrics, IdentityResolver, MatchKind, ResolutionResult, ResolveError,
    ResolveMetrics, ResolverConfig,
};
pub use vfp_store::{
    FingerprintRecord, InMemoryStore, SessionRecord, StoreError, VisitorIdentity, VisitorStore,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Aggregated configuration for every pipeline stage.
///
/// Each stage keeps its own config type; this bundle exists so services can
/// deserialize one document and hand it to [`build_resolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub canonical: CanonicalConfig,
    pub lsh: LshConfig,
    pub merge: MergeConfig,
    pub resolver: ResolverConfig,
}

/// Build a resolver over the given store with explicit stage configuration.
pub fn build_resolver<S: VisitorStore>(
    store: Arc<S>,
    cfg: PipelineConfig,
) -> Result<IdentityResolver<S>, ResolveError> {
    IdentityResolver::new(
        store,
        cfg.resolver,
        cfg.ingest,
        cfg.canonical,
        cfg.lsh,
        cfg.merge,
    )
}

/// Build a resolver with default configuration for every stage.
pub fn build_default_resolver<S: VisitorStore>(
    store: Arc<S>,
) -> Result<IdentityResolver<S>, ResolveError> {
    build_resolver(store, PipelineConfig::default())
}

/// One-shot resolution helper for callers that do not hold a resolver.
pub fn resolve_visitor<S: VisitorStore>(
    store: Arc<S>,
    payload: RawFingerprintPayload,
    telemetry: Option<BehavioralTelemetry>,
    context: RequestContext,
) -> Result<ResolutionResult, ResolveError> {
    build_default_resolver(store)?.resolve(payload, telemetry, context)
}
