//! Store contract for visitor identity resolution.
//!
//! The resolver is stateless between calls; every piece of durable state
//! lives behind [`VisitorStore`]. The contract assumes nothing stronger than
//! an eventually-consistent backing store: no read-your-writes, no
//! serializable isolation. Each verb must be individually retryable.

use chrono::{DateTime, Utc};
use thiserror::Error;
use vfp_behavior::BehavioralSignature;

mod memory;
mod records;

pub use memory::InMemoryStore;
pub use records::{FingerprintRecord, SessionRecord, VisitorIdentity};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unavailable or I/O failure. Retryable by the caller.
    #[error("store backend failure: {0}")]
    Backend(String),
    /// Write referenced a visitor the store has never seen.
    #[error("unknown visitor: {0}")]
    UnknownVisitor(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// The eight verbs the resolution core consumes.
///
/// `create_visitor` provides no distributed at-most-one-creation guarantee:
/// two racing first sightings of one device can both create an identity.
/// Callers needing that guarantee should key creation on a client-supplied
/// idempotency token at the store layer.
pub trait VisitorStore: Send + Sync {
    /// Exact-hash lookup: a single candidate or none.
    fn find_by_exact_hash(&self, exact_hash: &str) -> Result<Option<VisitorIdentity>, StoreError>;

    /// All fingerprints whose bucket at `position` equals `bucket_hash`, in
    /// first-seen order, truncated to `limit`.
    fn find_by_fuzzy_bucket(
        &self,
        position: usize,
        bucket_hash: &str,
        limit: usize,
    ) -> Result<Vec<FingerprintRecord>, StoreError>;

    fn get_visitor(&self, visitor_id: &str) -> Result<Option<VisitorIdentity>, StoreError>;

    /// Persist a freshly allocated identity together with its first
    /// fingerprint. The caller allocates both identifiers.
    fn create_visitor(
        &self,
        identity: &VisitorIdentity,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError>;

    /// Attach an additional fingerprint to an existing visitor.
    fn associate_fingerprint(
        &self,
        visitor_id: &str,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError>;

    fn update_behavioral_signature(
        &self,
        visitor_id: &str,
        signature: &BehavioralSignature,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn record_session(&self, session: &SessionRecord) -> Result<(), StoreError>;

    /// Bump visit count and the hour/weekday histograms.
    fn update_visit_statistics(
        &self,
        visitor_id: &str,
        hour_bucket: u8,
        day_bucket: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
