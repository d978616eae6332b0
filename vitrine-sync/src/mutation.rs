//! Optimistic mutation coordination.
//!
//! Every side-effecting action against a cached resource goes through
//! [`MutationCoordinator::mutate`], which owns the snapshot/patch/
//! reconcile-or-rollback cycle so call sites cannot reinvent it
//! inconsistently. One attempt per user gesture; a repeated gesture is a
//! new mutation, never a retry.

use crate::cache::{CacheEntry, Payload, QueryCache};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use vitrine_core::{Fingerprint, NetworkError, SyncError};

/// How a successful mutation settled in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server returned an updated view of the resource and it
    /// replaced the optimistic patch.
    ReplacedByServer,
    /// The server acknowledged without a resource view; the optimistic
    /// patch stands as final.
    KeptOptimistic,
}

/// Serializes mutations per fingerprint and applies the optimistic cycle.
///
/// Mutations on the same fingerprint queue in arrival order behind a fair
/// async lock; mutations on different fingerprints proceed fully in
/// parallel. Cheap to clone; clones share the queue map and cache.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
    gates: Arc<Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>>,
}

impl MutationCoordinator {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Whether a mutation is currently holding this fingerprint's gate.
    pub fn is_pending(&self, fingerprint: &Fingerprint) -> bool {
        let gates = self.gates.lock().expect("mutation gate map lock poisoned");
        gates
            .get(fingerprint)
            .is_some_and(|gate| gate.try_lock().is_err())
    }

    fn gate_for(&self, fingerprint: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().expect("mutation gate map lock poisoned");
        gates
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run one optimistic mutation cycle against a fingerprint.
    ///
    /// 1. Queue behind any mutation already running on this fingerprint.
    /// 2. Snapshot the current cache entry.
    /// 3. Apply the optimistic patch (a `None` patch result skips the
    ///    optimistic write entirely).
    /// 4. Invoke the loader. `Ok(Some(payload))` replaces the optimistic
    ///    value with the authoritative one; `Ok(None)` keeps the patch.
    /// 5. On failure, restore the snapshot exactly and re-throw.
    pub async fn mutate<P, F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        patch: P,
        loader: F,
    ) -> Result<MutationOutcome, SyncError>
    where
        P: FnOnce(Option<&Payload>) -> Option<Payload>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Payload>, NetworkError>>,
    {
        let gate = self.gate_for(fingerprint);
        let _guard = gate.lock().await;

        let snapshot: CacheEntry = self.cache.get(fingerprint);
        if let Some(patched) = patch(snapshot.payload.as_ref()) {
            self.cache.set(fingerprint, patched);
        }

        match loader().await {
            Ok(Some(authoritative)) => {
                self.cache.set(fingerprint, authoritative);
                Ok(MutationOutcome::ReplacedByServer)
            }
            Ok(None) => Ok(MutationOutcome::KeptOptimistic),
            Err(err) => {
                self.cache.restore(fingerprint, snapshot);
                Err(SyncError::Network(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vitrine_core::StalenessPolicy;
    use vitrine_test_utils::MutationProbe;

    fn recs_fp() -> Fingerprint {
        Fingerprint::Recommendations {
            product_id: 42,
            user_id: "u1".to_string(),
            limit: 5,
        }
    }

    fn coordinator() -> MutationCoordinator {
        MutationCoordinator::new(QueryCache::new(StalenessPolicy::default()))
    }

    #[tokio::test]
    async fn test_authoritative_response_replaces_patch() {
        let coordinator = coordinator();
        coordinator.cache().set(&recs_fp(), serde_json::json!({"score": 1.0}));

        let outcome = coordinator
            .mutate(
                &recs_fp(),
                |_| Some(serde_json::json!({"score": 1.2})),
                || async { Ok(Some(serde_json::json!({"score": 1.07}))) },
            )
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::ReplacedByServer);
        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!({"score": 1.07}))
        );
    }

    #[tokio::test]
    async fn test_ack_without_body_keeps_optimistic_patch() {
        let coordinator = coordinator();
        coordinator.cache().set(&recs_fp(), serde_json::json!({"score": 1.0}));
        let probe = MutationProbe::new();

        let outcome = coordinator
            .mutate(
                &recs_fp(),
                |_| Some(serde_json::json!({"score": 1.2})),
                probe.respond(Ok(None)),
            )
            .await
            .unwrap();
        assert_eq!(probe.calls(), 1);

        assert_eq!(outcome, MutationOutcome::KeptOptimistic);
        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!({"score": 1.2}))
        );
    }

    #[tokio::test]
    async fn test_failed_loader_rolls_back_exactly() {
        let coordinator = coordinator();
        coordinator.cache().set(&recs_fp(), serde_json::json!({"score": 1.0}));
        let before = coordinator.cache().get(&recs_fp());

        let err = coordinator
            .mutate(
                &recs_fp(),
                |_| Some(serde_json::json!({"score": 1.2})),
                || async {
                    Err(NetworkError::Timeout {
                        path: "/interactions".to_string(),
                    })
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Network(NetworkError::Timeout { .. })));
        // Byte-for-byte: the whole entry equals the pre-mutation snapshot.
        assert_eq!(coordinator.cache().get(&recs_fp()), before);
    }

    #[tokio::test]
    async fn test_rollback_restores_absent_entry() {
        let coordinator = coordinator();
        let before = coordinator.cache().get(&recs_fp());

        let _ = coordinator
            .mutate(
                &recs_fp(),
                |_| Some(serde_json::json!({"guessed": true})),
                || async {
                    Err(NetworkError::Timeout {
                        path: "/interactions".to_string(),
                    })
                },
            )
            .await;

        assert_eq!(coordinator.cache().get(&recs_fp()), before);
    }

    #[tokio::test]
    async fn test_same_fingerprint_mutations_serialize_in_order() {
        let coordinator = coordinator();
        coordinator.cache().set(&recs_fp(), serde_json::json!("initial"));
        let probe = MutationProbe::new();
        let (loader_one, gate_one) = probe.gated(Ok(None));

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .mutate(&recs_fp(), |_| Some(serde_json::json!("m1")), loader_one)
                    .await
            })
        };
        tokio::task::yield_now().await;
        // M1's optimistic patch is visible while its loader is parked.
        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!("m1"))
        );

        let (loader_two, gate_two) = probe.gated(Ok(None));
        let second = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .mutate(&recs_fp(), |_| Some(serde_json::json!("m2")), loader_two)
                    .await
            })
        };
        tokio::task::yield_now().await;

        // M2 is queued: its patch must not land while M1 is unresolved.
        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!("m1"))
        );
        assert!(coordinator.is_pending(&recs_fp()));

        gate_one.release();
        first.await.unwrap().unwrap();
        tokio::task::yield_now().await;
        gate_two.release();
        second.await.unwrap().unwrap();

        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!("m2"))
        );
        assert!(!coordinator.is_pending(&recs_fp()));
    }

    #[tokio::test]
    async fn test_different_fingerprints_do_not_block_each_other() {
        let coordinator = coordinator();
        let cart_fp = Fingerprint::Cart {
            user_id: "u1".to_string(),
        };
        let probe = MutationProbe::new();
        let (parked_loader, gate) = probe.gated(Ok(None));

        let parked = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .mutate(&recs_fp(), |_| Some(serde_json::json!("slow")), parked_loader)
                    .await
            })
        };
        tokio::task::yield_now().await;

        // A mutation on another fingerprint completes while the first is parked.
        tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.mutate(
                &cart_fp,
                |_| Some(serde_json::json!(["item"])),
                || async { Ok(None) },
            ),
        )
        .await
        .expect("independent fingerprint should not queue")
        .unwrap();

        gate.release();
        parked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_skipped_patch_leaves_cache_untouched_until_response() {
        let coordinator = coordinator();

        let outcome = coordinator
            .mutate(
                &recs_fp(),
                |current| current.map(|_| serde_json::json!("never")),
                || async { Ok(Some(serde_json::json!("server"))) },
            )
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::ReplacedByServer);
        assert_eq!(
            coordinator.cache().get(&recs_fp()).payload,
            Some(serde_json::json!("server"))
        );
    }
}
