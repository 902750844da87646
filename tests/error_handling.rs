//! Failure-injection coverage for the resolution core: read failures are
//! fatal, write failures are logged and absorbed, and malformed requests are
//! rejected before any store traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vfp::{
    build_default_resolver, BehavioralSignature, BehavioralTelemetry, CoreSignals,
    FingerprintRecord, InMemoryStore, IngestError, RawFingerprintPayload, RequestContext,
    ResolveError, SessionRecord, StoreError, VisitorIdentity, VisitorStore,
};

/// Store wrapper that can be switched into read-failure or write-failure
/// mode mid-test, delegating to an in-memory store otherwise.
struct FlakyStore {
    inner: InMemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn read_gate(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected read failure"));
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected write failure"));
        }
        Ok(())
    }
}

impl VisitorStore for FlakyStore {
    fn find_by_exact_hash(&self, exact_hash: &str) -> Result<Option<VisitorIdentity>, StoreError> {
        self.read_gate()?;
        self.inner.find_by_exact_hash(exact_hash)
    }

    fn find_by_fuzzy_bucket(
        &self,
        position: usize,
        bucket_hash: &str,
        limit: usize,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        self.read_gate()?;
        self.inner.find_by_fuzzy_bucket(position, bucket_hash, limit)
    }

    fn get_visitor(&self, visitor_id: &str) -> Result<Option<VisitorIdentity>, StoreError> {
        self.read_gate()?;
        self.inner.get_visitor(visitor_id)
    }

    fn create_visitor(
        &self,
        identity: &VisitorIdentity,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.create_visitor(identity, fingerprint)
    }

    fn associate_fingerprint(
        &self,
        visitor_id: &str,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.associate_fingerprint(visitor_id, fingerprint)
    }

    fn update_behavioral_signature(
        &self,
        visitor_id: &str,
        signature: &BehavioralSignature,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner
            .update_behavioral_signature(visitor_id, signature, at)
    }

    fn record_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner.record_session(session)
    }

    fn update_visit_statistics(
        &self,
        visitor_id: &str,
        hour_bucket: u8,
        day_bucket: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.write_gate()?;
        self.inner
            .update_visit_statistics(visitor_id, hour_bucket, day_bucket, at)
    }
}

fn payload() -> RawFingerprintPayload {
    RawFingerprintPayload {
        core: Some(CoreSignals {
            canvas: Some("feedface00c0ffee1122334455667788".into()),
            webgl_vendor: Some("Mesa".into()),
            webgl_renderer: Some("llvmpipe".into()),
            screen_width: Some(1920),
            screen_height: Some(1080),
            timezone: Some("Europe/Berlin".into()),
            language: Some("de-DE".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn telemetry() -> BehavioralTelemetry {
    BehavioralTelemetry {
        typing_wpm: Some(48.0),
        typing_rhythm: Some(0.5),
        keyboard_language: Some("de".into()),
        timezone: Some("Europe/Berlin".into()),
        ..Default::default()
    }
}

fn context() -> RequestContext {
    RequestContext::new("Mozilla/5.0", "203.0.113.7")
}

#[test]
fn read_failure_is_fatal() {
    let store = Arc::new(FlakyStore::new());
    let resolver = build_default_resolver(store.clone()).expect("resolver");

    store.fail_reads.store(true, Ordering::SeqCst);
    let err = resolver
        .resolve(payload(), Some(telemetry()), context())
        .expect_err("read failure must surface");
    assert!(matches!(err, ResolveError::StoreRead(_)));
}

#[test]
fn write_failure_still_yields_a_result() {
    let store = Arc::new(FlakyStore::new());
    let resolver = build_default_resolver(store.clone()).expect("resolver");

    store.fail_writes.store(true, Ordering::SeqCst);
    let result = resolver
        .resolve(payload(), Some(telemetry()), context())
        .expect("write failures are absorbed");
    assert!(result.is_new_visitor);
    assert_eq!(result.confidence, 1.0);
    assert!(!result.visitor_id.is_empty());

    // Nothing was persisted, so the same device shows up as new again.
    let again = resolver
        .resolve(payload(), Some(telemetry()), context())
        .expect("still resolvable");
    assert!(again.is_new_visitor);
    assert_ne!(again.visitor_id, result.visitor_id);
    assert_eq!(store.inner.visitor_count(), 0);
}

#[test]
fn write_failure_on_return_visit_keeps_the_match() {
    let store = Arc::new(FlakyStore::new());
    let resolver = build_default_resolver(store.clone()).expect("resolver");

    let first = resolver
        .resolve(payload(), Some(telemetry()), context())
        .expect("seed visit");

    // Signature, session, and statistics writes all fail; the lookup and
    // scoring path is untouched.
    store.fail_writes.store(true, Ordering::SeqCst);
    let second = resolver
        .resolve(payload(), Some(telemetry()), context())
        .expect("degraded return visit");
    assert!(!second.is_new_visitor);
    assert_eq!(second.visitor_id, first.visitor_id);
    assert_eq!(store.inner.sessions().len(), 1);
}

#[test]
fn empty_payload_rejected_before_store_access() {
    let store = Arc::new(FlakyStore::new());
    let resolver = build_default_resolver(store.clone()).expect("resolver");

    // Even a fully failing store is never consulted for an empty payload.
    store.fail_reads.store(true, Ordering::SeqCst);
    store.fail_writes.store(true, Ordering::SeqCst);

    let err = resolver
        .resolve(RawFingerprintPayload::default(), None, context())
        .expect_err("empty payload");
    assert!(matches!(
        err,
        ResolveError::Ingest(IngestError::MissingSignalSections)
    ));
}

#[test]
fn blank_ip_address_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let resolver = build_default_resolver(store).expect("resolver");
    let err = resolver
        .resolve(payload(), None, RequestContext::new("Mozilla/5.0", "  "))
        .expect_err("blank ip");
    assert!(matches!(err, ResolveError::Ingest(IngestError::InvalidContext(_))));
}
