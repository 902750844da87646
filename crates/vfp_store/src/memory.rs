//! In-memory store backend for tests and embedded use.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use vfp_behavior::BehavioralSignature;

use crate::records::{FingerprintRecord, SessionRecord, VisitorIdentity};
use crate::{StoreError, VisitorStore};

#[derive(Default)]
struct Inner {
    visitors: HashMap<String, VisitorIdentity>,
    fingerprints: HashMap<String, FingerprintRecord>,
    /// exact hash -> visitor id
    by_exact: HashMap<String, String>,
    /// (bucket position, bucket hash) -> fingerprint ids in insertion order
    by_bucket: HashMap<(usize, String), Vec<String>>,
    sessions: Vec<SessionRecord>,
}

/// RwLock-guarded map store. Individual verbs are atomic with respect to one
/// another, but the resolver's read-then-write sequence is not; concurrent
/// first sightings can still create duplicate identities (see the trait docs).
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of stored visitor identities. Test/diagnostic helper.
    pub fn visitor_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.visitors.len())
            .unwrap_or(0)
    }

    /// Recorded sessions, oldest first. Test/diagnostic helper.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.inner
            .read()
            .map(|inner| inner.sessions.clone())
            .unwrap_or_default()
    }

    fn index_fingerprint(inner: &mut Inner, fingerprint: &FingerprintRecord) {
        inner
            .by_exact
            .insert(fingerprint.exact_hash.clone(), fingerprint.visitor_id.clone());
        // An already-indexed fingerprint keeps its bucket entries; a retried
        // write must not grow the index.
        if !inner.fingerprints.contains_key(&fingerprint.fingerprint_id) {
            for (position, hash) in fingerprint.fuzzy_hashes.iter().enumerate() {
                inner
                    .by_bucket
                    .entry((position, hash.clone()))
                    .or_default()
                    .push(fingerprint.fingerprint_id.clone());
            }
        }
        inner
            .fingerprints
            .insert(fingerprint.fingerprint_id.clone(), fingerprint.clone());
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitorStore for InMemoryStore {
    fn find_by_exact_hash(&self, exact_hash: &str) -> Result<Option<VisitorIdentity>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(inner
            .by_exact
            .get(exact_hash)
            .and_then(|visitor_id| inner.visitors.get(visitor_id))
            .cloned())
    }

    fn find_by_fuzzy_bucket(
        &self,
        position: usize,
        bucket_hash: &str,
        limit: usize,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let Some(ids) = inner.by_bucket.get(&(position, bucket_hash.to_string())) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .take(limit)
            .filter_map(|id| inner.fingerprints.get(id))
            .cloned()
            .collect())
    }

    fn get_visitor(&self, visitor_id: &str) -> Result<Option<VisitorIdentity>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(inner.visitors.get(visitor_id).cloned())
    }

    fn create_visitor(
        &self,
        identity: &VisitorIdentity,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        inner
            .visitors
            .insert(identity.visitor_id.clone(), identity.clone());
        Self::index_fingerprint(&mut inner, fingerprint);
        Ok(())
    }

    fn associate_fingerprint(
        &self,
        visitor_id: &str,
        fingerprint: &FingerprintRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let visitor = inner
            .visitors
            .get_mut(visitor_id)
            .ok_or_else(|| StoreError::UnknownVisitor(visitor_id.to_string()))?;
        if !visitor
            .fingerprint_hashes
            .contains(&fingerprint.exact_hash)
        {
            visitor.fingerprint_hashes.push(fingerprint.exact_hash.clone());
        }
        Self::index_fingerprint(&mut inner, fingerprint);
        Ok(())
    }

    fn update_behavioral_signature(
        &self,
        visitor_id: &str,
        signature: &BehavioralSignature,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let visitor = inner
            .visitors
            .get_mut(visitor_id)
            .ok_or_else(|| StoreError::UnknownVisitor(visitor_id.to_string()))?;
        visitor.signature = signature.clone();
        visitor.last_seen = at;
        Ok(())
    }

    fn record_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        inner.sessions.push(session.clone());
        Ok(())
    }

    fn update_visit_statistics(
        &self,
        visitor_id: &str,
        hour_bucket: u8,
        day_bucket: u8,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let visitor = inner
            .visitors
            .get_mut(visitor_id)
            .ok_or_else(|| StoreError::UnknownVisitor(visitor_id.to_string()))?;
        visitor.visit_count += 1;
        *visitor.hourly_visits.entry(hour_bucket).or_insert(0) += 1;
        *visitor.daily_visits.entry(day_bucket).or_insert(0) += 1;
        visitor.last_seen = at;
        Ok(())
    }
}
