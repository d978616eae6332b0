//! Keyed query cache with explicit correctness contracts.
//!
//! Maps request fingerprints to cached payloads with four guarantees:
//!
//! - **Request de-duplication**: at most one in-flight request per
//!   fingerprint; concurrent callers attach to the existing request.
//! - **Stale-while-revalidate**: a stale-but-present payload is returned
//!   immediately while a background refetch runs.
//! - **Stale-response discard**: every issued request carries a
//!   per-fingerprint sequence number; a completion whose sequence is no
//!   longer the latest is dropped instead of overwriting fresher data.
//! - **Single-writer discipline**: only `ensure` completions, `set`, and
//!   `restore` write entries; views read via `get`/`subscribe`.
//!
//! Cache state lives behind one `std::sync::Mutex` that is never held
//! across an await; all suspension points are network calls.

pub mod entry;

pub use entry::{CacheEntry, CacheStatus, Payload};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use vitrine_core::{Fingerprint, NetworkError, StalenessPolicy, SyncError};

type LoadResult = Result<Payload, NetworkError>;
type SubscriberCallback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Handle returned by [`QueryCache::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Fresh entries served without a network call.
    pub hits: u64,
    /// Stale entries served immediately while a refetch ran.
    pub stale_hits: u64,
    /// Loads issued because nothing usable was cached.
    pub misses: u64,
    /// Callers attached to an already in-flight request.
    pub attached: u64,
    /// Responses dropped by the stale-response guard.
    pub discarded: u64,
    /// Entries removed by `sweep`.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.stale_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.stale_hits) as f64 / total as f64
        }
    }
}

struct Slot {
    entry: CacheEntry,
    /// Latest issued request sequence for this fingerprint.
    seq: u64,
    /// Receiver end of the in-flight request, for attaching waiters.
    inflight: Option<watch::Receiver<Option<LoadResult>>>,
    subscribers: Vec<(SubscriberId, SubscriberCallback)>,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        Self {
            entry,
            seq: 0,
            inflight: None,
            subscribers: Vec::new(),
        }
    }
}

struct CacheState {
    slots: HashMap<Fingerprint, Slot>,
    next_subscriber_id: u64,
    stats: CacheStats,
}

/// The process-wide keyed query cache.
///
/// Cheap to clone; clones share state. Constructed once per session and
/// passed into every component that needs it - never a module-level
/// singleton.
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
    policy: Arc<StalenessPolicy>,
}

enum EnsurePlan {
    /// Fresh payload, serve as-is.
    Hit(Payload),
    /// Stale payload with a refetch already in flight; serve stale.
    ServeStale(Payload),
    /// Stale payload, no refetch running: serve stale, revalidate behind.
    Revalidate {
        stale: Payload,
        seq: u64,
        tx: watch::Sender<Option<LoadResult>>,
    },
    /// Nothing cached and a request in flight: wait for it.
    Attach(watch::Receiver<Option<LoadResult>>),
    /// Nothing cached, nothing in flight: load inline.
    Load {
        seq: u64,
        tx: watch::Sender<Option<LoadResult>>,
    },
}

impl QueryCache {
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                slots: HashMap::new(),
                next_subscriber_id: 0,
                stats: CacheStats::default(),
            })),
            policy: Arc::new(policy),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().expect("cache state lock poisoned")
    }

    fn slot_entry<'a>(&self, state: &'a mut CacheState, fingerprint: &Fingerprint) -> &'a mut Slot {
        let stale_after = self.policy.stale_after(fingerprint.kind());
        state
            .slots
            .entry(fingerprint.clone())
            .or_insert_with(|| Slot::new(CacheEntry::absent(fingerprint.clone(), stale_after)))
    }

    /// Current entry for a fingerprint, synchronously.
    ///
    /// Never triggers a network call; absent fingerprints return an
    /// `Absent` entry.
    pub fn get(&self, fingerprint: &Fingerprint) -> CacheEntry {
        let state = self.state();
        match state.slots.get(fingerprint) {
            Some(slot) => slot.entry.clone(),
            None => CacheEntry::absent(
                fingerprint.clone(),
                self.policy.stale_after(fingerprint.kind()),
            ),
        }
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.state().stats.clone()
    }

    /// Ensure a fingerprint is populated, loading it if necessary.
    ///
    /// Fresh entries return immediately. If a request is already in
    /// flight the caller attaches to it rather than issuing a duplicate.
    /// Stale-but-present entries are returned immediately while a
    /// background refetch is spawned (stale-while-revalidate).
    pub async fn ensure<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        loader: F,
    ) -> Result<Payload, SyncError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let plan = self.plan_ensure(fingerprint);
        match plan {
            EnsurePlan::Hit(payload) | EnsurePlan::ServeStale(payload) => Ok(payload),
            EnsurePlan::Revalidate { stale, seq, tx } => {
                let cache = self.clone();
                let fingerprint = fingerprint.clone();
                tokio::spawn(async move {
                    let _ = cache.run_load(&fingerprint, seq, tx, loader).await;
                });
                Ok(stale)
            }
            EnsurePlan::Load { seq, tx } => self.run_load(fingerprint, seq, tx, loader).await,
            EnsurePlan::Attach(rx) => self.await_inflight(fingerprint, rx).await,
        }
    }

    fn plan_ensure(&self, fingerprint: &Fingerprint) -> EnsurePlan {
        let (plan, notify) = {
            let mut state = self.state();
            let slot = self.slot_entry(&mut state, fingerprint);
            let fresh = slot.entry.is_fresh();

            match slot.entry.payload.clone() {
                Some(payload) if fresh => {
                    state.stats.hits += 1;
                    (EnsurePlan::Hit(payload), None)
                }
                // Stale-but-present: serve it either way, refetch if nobody is.
                Some(payload) if slot.inflight.is_some() => {
                    state.stats.stale_hits += 1;
                    (EnsurePlan::ServeStale(payload), None)
                }
                Some(payload) => {
                    let (tx, rx) = watch::channel(None);
                    slot.seq += 1;
                    let seq = slot.seq;
                    slot.inflight = Some(rx);
                    slot.entry.status = CacheStatus::Loading;
                    let notify = self.transition_snapshot(slot);
                    state.stats.stale_hits += 1;
                    (
                        EnsurePlan::Revalidate {
                            stale: payload,
                            seq,
                            tx,
                        },
                        notify,
                    )
                }
                None => {
                    if let Some(rx) = slot.inflight.clone() {
                        state.stats.attached += 1;
                        (EnsurePlan::Attach(rx), None)
                    } else {
                        let (tx, rx) = watch::channel(None);
                        slot.seq += 1;
                        let seq = slot.seq;
                        slot.inflight = Some(rx);
                        slot.entry.status = CacheStatus::Loading;
                        let notify = self.transition_snapshot(slot);
                        state.stats.misses += 1;
                        (EnsurePlan::Load { seq, tx }, notify)
                    }
                }
            }
        };
        fanout(notify);
        plan
    }

    async fn run_load<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        seq: u64,
        tx: watch::Sender<Option<LoadResult>>,
        loader: F,
    ) -> Result<Payload, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult>,
    {
        let result = loader().await;
        self.complete_load(fingerprint, seq, &result);
        let _ = tx.send(Some(result.clone()));
        result.map_err(SyncError::Network)
    }

    /// Apply a finished load if its sequence is still the latest.
    fn complete_load(&self, fingerprint: &Fingerprint, seq: u64, result: &LoadResult) {
        let notify = {
            let mut state = self.state();
            let Some(slot) = state.slots.get_mut(fingerprint) else {
                return;
            };
            if slot.seq != seq {
                state.stats.discarded += 1;
                tracing::debug!(fingerprint = %fingerprint, "discarding superseded response");
                return;
            }
            slot.inflight = None;
            let now = chrono::Utc::now();
            match result {
                Ok(payload) => {
                    slot.entry.payload = Some(payload.clone());
                    slot.entry.status = CacheStatus::Ready;
                    slot.entry.error = None;
                    slot.entry.invalidated = false;
                    slot.entry.last_updated_at = now;
                }
                Err(err) => {
                    // The last good payload, if any, stays visible.
                    slot.entry.status = CacheStatus::Error;
                    slot.entry.error = Some(err.clone());
                    slot.entry.last_updated_at = now;
                }
            }
            self.transition_snapshot(slot)
        };
        fanout(notify);
    }

    async fn await_inflight(
        &self,
        fingerprint: &Fingerprint,
        mut rx: watch::Receiver<Option<LoadResult>>,
    ) -> Result<Payload, SyncError> {
        loop {
            let settled = rx.borrow().as_ref().cloned();
            if let Some(result) = settled {
                return result.map_err(SyncError::Network);
            }
            if rx.changed().await.is_err() {
                // The driving future was dropped before settling. Clear the
                // dead in-flight marker so the next ensure reissues.
                self.reap_abandoned(fingerprint);
                return Err(SyncError::InflightAbandoned {
                    fingerprint: fingerprint.to_string(),
                });
            }
        }
    }

    fn reap_abandoned(&self, fingerprint: &Fingerprint) {
        let mut state = self.state();
        let Some(slot) = state.slots.get_mut(fingerprint) else {
            return;
        };
        let dead = slot
            .inflight
            .as_ref()
            .is_some_and(|rx| rx.has_changed().is_err());
        if dead {
            slot.inflight = None;
            slot.seq += 1;
            slot.entry.status = if slot.entry.payload.is_some() {
                CacheStatus::Ready
            } else {
                CacheStatus::Absent
            };
        }
    }

    /// Direct cache write, used by optimistic patches.
    ///
    /// Supersedes any in-flight request for the fingerprint: the write
    /// wins and the late response is discarded on arrival.
    pub fn set(&self, fingerprint: &Fingerprint, payload: Payload) {
        let notify = {
            let mut state = self.state();
            let slot = self.slot_entry(&mut state, fingerprint);
            slot.seq += 1;
            slot.inflight = None;
            slot.entry.payload = Some(payload);
            slot.entry.status = CacheStatus::Ready;
            slot.entry.error = None;
            slot.entry.invalidated = false;
            slot.entry.last_updated_at = chrono::Utc::now();
            self.transition_snapshot(slot)
        };
        fanout(notify);
    }

    /// Mark an entry stale so the next `ensure` refetches.
    ///
    /// Also supersedes any in-flight request, so a response already on the
    /// wire cannot resurrect the invalidated value.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let notify = {
            let mut state = self.state();
            let Some(slot) = state.slots.get_mut(fingerprint) else {
                return;
            };
            slot.seq += 1;
            slot.inflight = None;
            slot.entry.invalidated = true;
            if slot.entry.status == CacheStatus::Loading {
                slot.entry.status = if slot.entry.payload.is_some() {
                    CacheStatus::Ready
                } else {
                    CacheStatus::Absent
                };
            }
            self.transition_snapshot(slot)
        };
        fanout(notify);
    }

    /// Restore an exact prior snapshot (mutation rollback).
    pub(crate) fn restore(&self, fingerprint: &Fingerprint, snapshot: CacheEntry) {
        let notify = {
            let mut state = self.state();
            let slot = self.slot_entry(&mut state, fingerprint);
            slot.seq += 1;
            slot.inflight = None;
            slot.entry = snapshot;
            self.transition_snapshot(slot)
        };
        fanout(notify);
    }

    /// Register a callback invoked on every state transition for a
    /// fingerprint. Multiple independent subscribers are supported.
    pub fn subscribe<F>(&self, fingerprint: &Fingerprint, callback: F) -> SubscriberId
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let mut state = self.state();
        state.next_subscriber_id += 1;
        let id = SubscriberId(state.next_subscriber_id);
        let slot = self.slot_entry(&mut state, fingerprint);
        slot.subscribers.push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, fingerprint: &Fingerprint, id: SubscriberId) {
        let mut state = self.state();
        if let Some(slot) = state.slots.get_mut(fingerprint) {
            slot.subscribers.retain(|(sid, _)| *sid != id);
        }
    }

    /// Garbage-collect entries nobody watches and nothing needs.
    ///
    /// Removes slots with no subscribers, no in-flight request, and no
    /// fresh payload. Returns how many entries were evicted. This is a
    /// policy hook for the embedder; the cache spawns no timers itself.
    pub fn sweep(&self) -> usize {
        let mut state = self.state();
        let before = state.slots.len();
        state.slots.retain(|_, slot| {
            !slot.subscribers.is_empty() || slot.inflight.is_some() || slot.entry.is_fresh()
        });
        let evicted = before - state.slots.len();
        state.stats.evictions += evicted as u64;
        evicted
    }

    /// Clone out the subscriber list plus the entry they should see.
    fn transition_snapshot(&self, slot: &Slot) -> Option<(Vec<SubscriberCallback>, CacheEntry)> {
        if slot.subscribers.is_empty() {
            return None;
        }
        let callbacks = slot.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
        Some((callbacks, slot.entry.clone()))
    }
}

/// Invoke subscriber callbacks outside the state lock.
fn fanout(notify: Option<(Vec<SubscriberCallback>, CacheEntry)>) {
    if let Some((callbacks, entry)) = notify {
        for callback in callbacks {
            callback(&entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vitrine_core::ResourceKind;
    use vitrine_test_utils::LoaderProbe;

    fn recs_fp() -> Fingerprint {
        Fingerprint::Recommendations {
            product_id: 42,
            user_id: "u1".to_string(),
            limit: 5,
        }
    }

    fn cache() -> QueryCache {
        QueryCache::new(StalenessPolicy::default())
    }

    #[tokio::test]
    async fn test_ensure_loads_on_miss_and_hits_after() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let payload = serde_json::json!({"recommendations": []});

        let loaded = cache
            .ensure(&recs_fp(), probe.ok(payload.clone()))
            .await
            .unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(probe.calls(), 1);

        // Second ensure within the staleness window never touches the loader.
        let again = cache
            .ensure(&recs_fp(), probe.ok(serde_json::json!("unused")))
            .await
            .unwrap();
        assert_eq!(again, payload);
        assert_eq!(probe.calls(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensures_deduplicate_to_one_call() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let payload = serde_json::json!([1, 2, 3]);
        let (loader, gate) = probe.gated(Ok(payload.clone()));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure(&recs_fp(), loader).await })
        };
        // Let the first caller take the in-flight slot before attaching.
        tokio::task::yield_now().await;
        let second = {
            let cache = cache.clone();
            let probe = probe.clone();
            tokio::spawn(async move {
                cache
                    .ensure(&recs_fp(), probe.ok(serde_json::json!("duplicate")))
                    .await
            })
        };
        tokio::task::yield_now().await;
        gate.release();

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!(a, payload);
        assert_eq!(b, payload);
        assert_eq!(probe.calls(), 1);
        assert_eq!(cache.stats().attached, 1);
    }

    #[tokio::test]
    async fn test_loader_error_is_cached_and_rethrown() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let err = vitrine_core::NetworkError::Timeout {
            path: "/recommendations".to_string(),
        };

        let result = cache.ensure(&recs_fp(), probe.err(err.clone())).await;
        assert_eq!(result, Err(SyncError::Network(err.clone())));

        let entry = cache.get(&recs_fp());
        assert_eq!(entry.status, CacheStatus::Error);
        assert_eq!(entry.error, Some(err));
        assert!(entry.payload.is_none());
    }

    #[tokio::test]
    async fn test_error_keeps_last_good_payload_visible() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let good = serde_json::json!({"recommendations": [1]});

        cache
            .ensure(&recs_fp(), probe.ok(good.clone()))
            .await
            .unwrap();
        cache.invalidate(&recs_fp());

        // Refetch fails; stale payload must remain.
        let _ = cache
            .ensure(
                &recs_fp(),
                probe.err(vitrine_core::NetworkError::Timeout {
                    path: "/recommendations".to_string(),
                }),
            )
            .await;
        // The invalidated entry still had a payload, so ensure served it
        // stale and revalidated in the background; wait for the refetch.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let entry = cache.get(&recs_fp());
        assert_eq!(entry.payload, Some(good));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_old_then_updates() {
        let policy = StalenessPolicy::default()
            .with_stale_after(ResourceKind::Recommendations, Duration::ZERO);
        let cache = QueryCache::new(policy);
        let probe = LoaderProbe::new();
        let v1 = serde_json::json!({"v": 1});
        let v2 = serde_json::json!({"v": 2});

        cache.ensure(&recs_fp(), probe.ok(v1.clone())).await.unwrap();

        // Entry is instantly stale; ensure must serve v1 now and refresh
        // to v2 behind the caller's back.
        let served = cache.ensure(&recs_fp(), probe.ok(v2.clone())).await.unwrap();
        assert_eq!(served, v1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&recs_fp()).payload, Some(v2));
        assert_eq!(probe.calls(), 2);
        assert_eq!(cache.stats().stale_hits, 1);
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let slow = serde_json::json!({"origin": "request-a"});
        let fast = serde_json::json!({"origin": "request-b"});
        let (loader_a, gate_a) = probe.gated(Ok(slow));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure(&recs_fp(), loader_a).await })
        };
        tokio::task::yield_now().await;

        // Selection changed: invalidate and issue a newer request B.
        cache.invalidate(&recs_fp());
        let (loader_b, gate_b) = probe.gated(Ok(fast.clone()));
        let second = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure(&recs_fp(), loader_b).await })
        };
        tokio::task::yield_now().await;

        // B settles first, then A's late response arrives.
        gate_b.release();
        let b = second.await.unwrap().unwrap();
        assert_eq!(b, fast);
        gate_a.release();
        let _ = first.await.unwrap();

        assert_eq!(cache.get(&recs_fp()).payload, Some(fast));
        assert_eq!(cache.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_set_supersedes_inflight_request() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let (loader, gate) = probe.gated(Ok(serde_json::json!("from-network")));

        let task = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure(&recs_fp(), loader).await })
        };
        tokio::task::yield_now().await;

        let patched = serde_json::json!("optimistic");
        cache.set(&recs_fp(), patched.clone());
        gate.release();
        let _ = task.await.unwrap();

        assert_eq!(cache.get(&recs_fp()).payload, Some(patched));
    }

    #[tokio::test]
    async fn test_subscribers_see_every_transition() {
        let cache = cache();
        let probe = LoaderProbe::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        cache.subscribe(&recs_fp(), move |entry| {
            sink.lock().unwrap().push(entry.status);
        });

        cache
            .ensure(&recs_fp(), probe.ok(serde_json::json!([])))
            .await
            .unwrap();

        let transitions = seen.lock().unwrap().clone();
        assert_eq!(transitions, vec![CacheStatus::Loading, CacheStatus::Ready]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let cache = cache();
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        let id = cache.subscribe(&recs_fp(), move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        cache.set(&recs_fp(), serde_json::json!(1));
        cache.unsubscribe(&recs_fp(), id);
        cache.set(&recs_fp(), serde_json::json!(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_collects_stale_unwatched_entries() {
        let policy = StalenessPolicy::default()
            .with_stale_after(ResourceKind::Recommendations, Duration::ZERO);
        let cache = QueryCache::new(policy);
        let probe = LoaderProbe::new();
        cache
            .ensure(&recs_fp(), probe.ok(serde_json::json!([])))
            .await
            .unwrap();

        // Instantly stale and nobody subscribed: collectable.
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get(&recs_fp()).status, CacheStatus::Absent);

        // Watched entries survive even when stale.
        cache
            .ensure(&recs_fp(), probe.ok(serde_json::json!([])))
            .await
            .unwrap();
        cache.subscribe(&recs_fp(), |_| {});
        assert_eq!(cache.sweep(), 0);
    }
}
