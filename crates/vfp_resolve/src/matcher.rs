//! Fuzzy candidate retrieval.
//!
//! Read-only: one store query per bucket, union de-duplicated by fingerprint
//! id, capped, in first-seen-in-bucket-order. No re-ranking happens here —
//! ranking is the scorer's job.

use vfp_lsh::FuzzyHashSet;
use vfp_store::{FingerprintRecord, StoreError, VisitorStore};

use crate::types::ResolverConfig;

pub(crate) fn collect_candidates<S: VisitorStore + ?Sized>(
    store: &S,
    fuzzy: &FuzzyHashSet,
    cfg: &ResolverConfig,
) -> Result<Vec<FingerprintRecord>, StoreError> {
    let mut candidates: Vec<FingerprintRecord> = Vec::new();
    for (position, bucket_hash) in fuzzy.hashes.iter().enumerate() {
        let hits = store.find_by_fuzzy_bucket(position, bucket_hash, cfg.bucket_limit)?;
        for record in hits {
            if candidates
                .iter()
                .any(|c| c.fingerprint_id == record.fingerprint_id)
            {
                continue;
            }
            candidates.push(record);
            if candidates.len() >= cfg.candidate_cap {
                return Ok(candidates);
            }
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use uuid::Uuid;
    use vfp_behavior::BehavioralSignature;
    use vfp_lsh::LshMeta;
    use vfp_store::{InMemoryStore, VisitorIdentity};

    fn seed_fingerprint(store: &InMemoryStore, fuzzy: Vec<String>) -> FingerprintRecord {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).single().unwrap();
        let visitor_id = Uuid::new_v4().to_string();
        let exact = Uuid::new_v4().to_string();
        let fingerprint = FingerprintRecord {
            fingerprint_id: Uuid::new_v4().to_string(),
            visitor_id: visitor_id.clone(),
            exact_hash: exact.clone(),
            fuzzy_hashes: fuzzy,
            first_seen: at,
        };
        let identity = VisitorIdentity {
            visitor_id,
            primary_hash: exact.clone(),
            fingerprint_hashes: vec![exact],
            signature: BehavioralSignature::empty(at),
            visit_count: 0,
            hourly_visits: BTreeMap::new(),
            daily_visits: BTreeMap::new(),
            first_seen: at,
            last_seen: at,
        };
        store.create_visitor(&identity, &fingerprint).expect("seed");
        fingerprint
    }

    fn query(hashes: &[&str]) -> FuzzyHashSet {
        FuzzyHashSet {
            hashes: hashes.iter().map(|h| h.to_string()).collect(),
            meta: LshMeta {
                version: 1,
                bucket_count: hashes.len(),
                bucket_hash_len: 16,
            },
        }
    }

    #[test]
    fn deduplicates_across_buckets_preserving_order() {
        let store = InMemoryStore::new();
        // Collides on buckets 0 and 2.
        let shared = seed_fingerprint(
            &store,
            vec!["q0".into(), "x1".into(), "q2".into(), "x3".into()],
        );
        // Collides on bucket 2 only.
        let late = seed_fingerprint(
            &store,
            vec!["y0".into(), "y1".into(), "q2".into(), "y3".into()],
        );

        let candidates = collect_candidates(
            &store,
            &query(&["q0", "q1", "q2", "q3"]),
            &ResolverConfig::default(),
        )
        .expect("candidates");

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].fingerprint_id, shared.fingerprint_id);
        assert_eq!(candidates[1].fingerprint_id, late.fingerprint_id);
    }

    #[test]
    fn combined_candidate_list_capped() {
        let store = InMemoryStore::new();
        for _ in 0..6 {
            seed_fingerprint(
                &store,
                vec!["q0".into(), "z1".into(), "z2".into(), "z3".into()],
            );
        }
        let cfg = ResolverConfig {
            bucket_limit: 10,
            candidate_cap: 4,
            ..Default::default()
        };
        let candidates =
            collect_candidates(&store, &query(&["q0", "q1", "q2", "q3"]), &cfg).expect("candidates");
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn no_collisions_yields_empty_list() {
        let store = InMemoryStore::new();
        seed_fingerprint(
            &store,
            vec!["a0".into(), "a1".into(), "a2".into(), "a3".into()],
        );
        let candidates = collect_candidates(
            &store,
            &query(&["b0", "b1", "b2", "b3"]),
            &ResolverConfig::default(),
        )
        .expect("candidates");
        assert!(candidates.is_empty());
    }
}
