//! Persistent record shapes owned by the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vfp_behavior::BehavioralSignature;
use vfp_ingest::RequestContext;

/// One stored fingerprint: the exact hash plus its positional bucket hashes,
/// owned by exactly one visitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintRecord {
    pub fingerprint_id: String,
    pub visitor_id: String,
    pub exact_hash: String,
    /// Bucket hashes in generation order; position is meaningful.
    pub fuzzy_hashes: Vec<String>,
    pub first_seen: DateTime<Utc>,
}

/// A resolved visitor identity. Conceptually owned by the store; the resolver
/// only references it for the duration of one resolution call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitorIdentity {
    pub visitor_id: String,
    /// Exact hash of the fingerprint the identity was created from.
    pub primary_hash: String,
    /// Every exact hash confirmed to belong to this visitor; grows as
    /// cross-device matches are accepted.
    pub fingerprint_hashes: Vec<String>,
    pub signature: BehavioralSignature,
    pub visit_count: u64,
    /// Visits per hour of day (0-23).
    pub hourly_visits: BTreeMap<u8, u32>,
    /// Visits per weekday (0 = Monday).
    pub daily_visits: BTreeMap<u8, u32>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One resolved session, persisted for later reconciliation and analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub visitor_id: String,
    pub fingerprint_hash: String,
    /// Behavioral signature observed during this session, pre-merge.
    pub session_behavior: BehavioralSignature,
    pub context: RequestContext,
    pub started_at: DateTime<Utc>,
}
