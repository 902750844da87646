//! The identity resolution state machine.
//!
//! `START → EXACT_MATCH_CHECK → BEHAVIORAL_CHECK | FUZZY_SEARCH →
//! CROSS_DEVICE_CHECK → ASSOCIATE | CREATE_NEW`, terminating in exactly one
//! of {merge-and-associate, create-new}. Store reads are fatal for the call;
//! store writes are logged-but-non-fatal so the decision always reaches the
//! caller even when persistence is degraded.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

use vfp_behavior::{
    behavioral_similarity, cross_device_similarity, extract, merge, BehavioralSignature,
    MergeConfig,
};
use vfp_canonical::{canonicalize, CanonicalConfig};
use vfp_ingest::{
    ingest, BehavioralTelemetry, IngestConfig, RawFingerprintPayload, RequestContext,
    ResolutionRequest,
};
use vfp_lsh::{generate_buckets, generate_exact_hash, FuzzyHashSet, LshConfig};
use vfp_store::{FingerprintRecord, SessionRecord, StoreError, VisitorIdentity, VisitorStore};

use crate::matcher::collect_candidates;
use crate::metrics::metrics_recorder;
use crate::types::{MatchKind, ResolutionResult, ResolveError, ResolverConfig};

/// Single-owner resolver instance holding the store handle and every stage
/// configuration explicitly. Stateless between calls; safe to share behind
/// an `Arc` across request handlers.
pub struct IdentityResolver<S: VisitorStore> {
    store: Arc<S>,
    cfg: ResolverConfig,
    ingest_cfg: IngestConfig,
    canonical_cfg: CanonicalConfig,
    lsh_cfg: LshConfig,
    merge_cfg: MergeConfig,
}

impl<S: VisitorStore> IdentityResolver<S> {
    /// Construct a resolver from a shared store handle and explicit configs.
    /// All configurations are validated up front.
    pub fn new(
        store: Arc<S>,
        cfg: ResolverConfig,
        ingest_cfg: IngestConfig,
        canonical_cfg: CanonicalConfig,
        lsh_cfg: LshConfig,
        merge_cfg: MergeConfig,
    ) -> Result<Self, ResolveError> {
        cfg.validate()?;
        ingest_cfg.validate()?;
        canonical_cfg.validate()?;
        lsh_cfg.validate()?;
        merge_cfg.validate()?;
        Ok(Self {
            store,
            cfg,
            ingest_cfg,
            canonical_cfg,
            lsh_cfg,
            merge_cfg,
        })
    }

    /// Resolver with default configuration for every stage.
    pub fn with_defaults(store: Arc<S>) -> Result<Self, ResolveError> {
        Self::new(
            store,
            ResolverConfig::default(),
            IngestConfig::default(),
            CanonicalConfig::default(),
            LshConfig::default(),
            MergeConfig::default(),
        )
    }

    /// Resolve a visitor identity for one page load.
    pub fn resolve(
        &self,
        payload: RawFingerprintPayload,
        telemetry: Option<BehavioralTelemetry>,
        context: RequestContext,
    ) -> Result<ResolutionResult, ResolveError> {
        let request = ingest(payload, telemetry, context, None, &self.ingest_cfg)?;
        self.resolve_request(request)
    }

    /// Like [`resolve`](Self::resolve) but with an explicit timestamp, for
    /// deterministic tests and replay.
    pub fn resolve_at(
        &self,
        payload: RawFingerprintPayload,
        telemetry: Option<BehavioralTelemetry>,
        context: RequestContext,
        received_at: DateTime<Utc>,
    ) -> Result<ResolutionResult, ResolveError> {
        let request = ingest(payload, telemetry, context, Some(received_at), &self.ingest_cfg)?;
        self.resolve_request(request)
    }

    /// Run the decision protocol over an already-ingested request.
    pub fn resolve_request(
        &self,
        request: ResolutionRequest,
    ) -> Result<ResolutionResult, ResolveError> {
        let start = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "vfp_resolve.resolve",
            session_id = %request.session_id
        );
        let _guard = span.enter();

        let at = request.received_at;
        let features = canonicalize(&request.payload, &self.canonical_cfg)?;
        let exact_hash = generate_exact_hash(&features, &self.lsh_cfg)?;
        let observed = match request.telemetry.as_ref() {
            Some(telemetry) => extract(telemetry, at),
            None => BehavioralSignature::empty(at),
        };

        // EXACT_MATCH_CHECK then BEHAVIORAL_CHECK. An exact hit below the
        // behavioral threshold means a different user on a shared device:
        // that visitor is not reused, and is excluded from the fuzzy pass.
        let mut excluded_visitor: Option<String> = None;
        if let Some(visitor) = self
            .store
            .find_by_exact_hash(&exact_hash)
            .map_err(ResolveError::StoreRead)?
        {
            let score = behavioral_similarity(&visitor.signature, &observed);
            if score >= self.cfg.behavioral_similarity_threshold {
                let result = self.finish_returning(
                    &visitor,
                    &observed,
                    &exact_hash,
                    None,
                    &request,
                    score,
                    MatchKind::ExactReturning,
                )?;
                self.report(&result, 0, start);
                return Ok(result);
            }
            debug!(
                visitor_id = %visitor.visitor_id,
                score,
                "exact_hit_below_behavioral_threshold"
            );
            excluded_visitor = Some(visitor.visitor_id);
        }

        // FUZZY_SEARCH. Candidates arrive in first-seen-in-bucket-order and
        // the first one clearing the cross-device threshold wins; there is
        // no global re-ranking.
        let fuzzy = generate_buckets(&features, &self.lsh_cfg)?;
        let candidates = collect_candidates(self.store.as_ref(), &fuzzy, &self.cfg)
            .map_err(ResolveError::StoreRead)?;
        let candidate_count = candidates.len();

        let mut seen_visitors: HashSet<&str> = HashSet::new();
        for record in &candidates {
            if excluded_visitor.as_deref() == Some(record.visitor_id.as_str()) {
                continue;
            }
            if !seen_visitors.insert(record.visitor_id.as_str()) {
                continue;
            }
            let Some(visitor) = self
                .store
                .get_visitor(&record.visitor_id)
                .map_err(ResolveError::StoreRead)?
            else {
                continue;
            };
            let score = cross_device_similarity(&visitor.signature, &observed);
            if score >= self.cfg.cross_device_similarity_threshold {
                let result = self.finish_returning(
                    &visitor,
                    &observed,
                    &exact_hash,
                    Some(&fuzzy),
                    &request,
                    score,
                    MatchKind::CrossDeviceReturning,
                )?;
                self.report(&result, candidate_count, start);
                return Ok(result);
            }
            debug!(
                candidate_visitor = %visitor.visitor_id,
                score,
                "candidate_below_cross_device_threshold"
            );
        }

        // CREATE_NEW.
        let result = self.finish_new(&observed, &exact_hash, &fuzzy, &request);
        self.report(&result, candidate_count, start);
        Ok(result)
    }

    /// Terminal RETURNING: merge the behavioral signature, associate the new
    /// fingerprint on cross-device hits, record the session, bump statistics.
    fn finish_returning(
        &self,
        visitor: &VisitorIdentity,
        observed: &BehavioralSignature,
        exact_hash: &str,
        associate: Option<&FuzzyHashSet>,
        request: &ResolutionRequest,
        score: f64,
        kind: MatchKind,
    ) -> Result<ResolutionResult, ResolveError> {
        let at = request.received_at;
        let merged = merge(&visitor.signature, observed, &self.merge_cfg)?;

        if let Some(fuzzy) = associate {
            let fingerprint = FingerprintRecord {
                fingerprint_id: Uuid::new_v4().to_string(),
                visitor_id: visitor.visitor_id.clone(),
                exact_hash: exact_hash.to_string(),
                fuzzy_hashes: fuzzy.hashes.clone(),
                first_seen: at,
            };
            self.write(
                "associate_fingerprint",
                request,
                self.store
                    .associate_fingerprint(&visitor.visitor_id, &fingerprint),
            );
        }
        self.write(
            "update_behavioral_signature",
            request,
            self.store
                .update_behavioral_signature(&visitor.visitor_id, &merged, at),
        );
        self.persist_session_and_stats(&visitor.visitor_id, observed, exact_hash, request);

        info!(
            visitor_id = %visitor.visitor_id,
            confidence = score,
            kind = ?kind,
            "visitor_returning"
        );
        Ok(ResolutionResult {
            visitor_id: visitor.visitor_id.clone(),
            session_id: request.session_id.clone(),
            is_new_visitor: false,
            confidence: score,
            kind,
        })
    }

    /// Terminal NEW: allocate a fresh identity. The identifier is minted here
    /// so a failed create write still leaves the caller with a usable result.
    fn finish_new(
        &self,
        observed: &BehavioralSignature,
        exact_hash: &str,
        fuzzy: &FuzzyHashSet,
        request: &ResolutionRequest,
    ) -> ResolutionResult {
        let at = request.received_at;
        let visitor_id = Uuid::new_v4().to_string();
        let fingerprint = FingerprintRecord {
            fingerprint_id: Uuid::new_v4().to_string(),
            visitor_id: visitor_id.clone(),
            exact_hash: exact_hash.to_string(),
            fuzzy_hashes: fuzzy.hashes.clone(),
            first_seen: at,
        };
        let identity = VisitorIdentity {
            visitor_id: visitor_id.clone(),
            primary_hash: exact_hash.to_string(),
            fingerprint_hashes: vec![exact_hash.to_string()],
            signature: observed.clone(),
            visit_count: 0,
            hourly_visits: BTreeMap::new(),
            daily_visits: BTreeMap::new(),
            first_seen: at,
            last_seen: at,
        };

        self.write(
            "create_visitor",
            request,
            self.store.create_visitor(&identity, &fingerprint),
        );
        self.persist_session_and_stats(&visitor_id, observed, exact_hash, request);

        info!(visitor_id = %visitor_id, "visitor_created");
        ResolutionResult {
            visitor_id,
            session_id: request.session_id.clone(),
            is_new_visitor: true,
            confidence: 1.0,
            kind: MatchKind::New,
        }
    }

    fn persist_session_and_stats(
        &self,
        visitor_id: &str,
        observed: &BehavioralSignature,
        exact_hash: &str,
        request: &ResolutionRequest,
    ) {
        let at = request.received_at;
        let session = SessionRecord {
            session_id: request.session_id.clone(),
            visitor_id: visitor_id.to_string(),
            fingerprint_hash: exact_hash.to_string(),
            session_behavior: observed.clone(),
            context: request.context.clone(),
            started_at: at,
        };
        self.write("record_session", request, self.store.record_session(&session));
        self.write(
            "update_visit_statistics",
            request,
            self.store.update_visit_statistics(
                visitor_id,
                at.hour() as u8,
                at.weekday().num_days_from_monday() as u8,
                at,
            ),
        );
    }

    /// Write-phase failures are logged for later reconciliation, never
    /// retried inline, and never surfaced to the caller.
    fn write(&self, operation: &str, request: &ResolutionRequest, result: Result<(), StoreError>) {
        if let Err(err) = result {
            warn!(
                operation,
                session_id = %request.session_id,
                error = %err,
                "store_write_failed"
            );
        }
    }

    fn report(&self, result: &ResolutionResult, candidate_count: usize, start: Instant) {
        if let Some(recorder) = metrics_recorder() {
            recorder.record_resolution(
                &result.kind,
                result.confidence,
                candidate_count,
                start.elapsed(),
            );
        }
    }
}
