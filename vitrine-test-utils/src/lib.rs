//! Test probes and fixtures shared by the Vitrine crates' tests.
//!
//! The probes stand in for network loaders: they count invocations and,
//! when gated, park until the test decides the "response" may arrive.
//! That is how the race-ordering tests (de-duplication, stale-response
//! discard, mutation serialization) control who settles first.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use vitrine_core::{CartItem, CartItemId, NetworkError, ProductId, RecommendationItem, RecommendationSet};

/// Payload type mirrored from the sync layer's cache.
pub type Payload = serde_json::Value;

type LoadResult = Result<Payload, NetworkError>;
type MutationResult = Result<Option<Payload>, NetworkError>;

/// Releases one parked loader when dropped into [`Gate::release`].
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    /// Let the parked loader settle.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

/// Loader factory for `ensure`-style loads, with an invocation counter.
#[derive(Clone, Default)]
pub struct LoaderProbe {
    calls: Arc<AtomicUsize>,
}

impl LoaderProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many loaders this probe has actually invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A loader that resolves immediately with a payload.
    pub fn ok(
        &self,
        payload: Payload,
    ) -> impl FnOnce() -> BoxFuture<'static, LoadResult> + Send + 'static {
        let calls = self.calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(payload) }.boxed()
        }
    }

    /// A loader that fails immediately.
    pub fn err(
        &self,
        error: NetworkError,
    ) -> impl FnOnce() -> BoxFuture<'static, LoadResult> + Send + 'static {
        let calls = self.calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(error) }.boxed()
        }
    }

    /// A loader that parks until its [`Gate`] is released, then settles
    /// with the given result.
    pub fn gated(
        &self,
        result: LoadResult,
    ) -> (
        impl FnOnce() -> BoxFuture<'static, LoadResult> + Send + 'static,
        Gate,
    ) {
        let (tx, rx) = oneshot::channel::<()>();
        let calls = self.calls.clone();
        let loader = move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = rx.await;
                result
            }
            .boxed()
        };
        (loader, Gate(tx))
    }
}

/// Loader factory for mutation loads (`Ok(Some)` = authoritative
/// replacement, `Ok(None)` = keep the optimistic patch).
#[derive(Clone, Default)]
pub struct MutationProbe {
    calls: Arc<AtomicUsize>,
}

impl MutationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn respond(
        &self,
        result: MutationResult,
    ) -> impl FnOnce() -> BoxFuture<'static, MutationResult> + Send + 'static {
        let calls = self.calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { result }.boxed()
        }
    }

    pub fn gated(
        &self,
        result: MutationResult,
    ) -> (
        impl FnOnce() -> BoxFuture<'static, MutationResult> + Send + 'static,
        Gate,
    ) {
        let (tx, rx) = oneshot::channel::<()>();
        let calls = self.calls.clone();
        let loader = move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = rx.await;
                result
            }
            .boxed()
        };
        (loader, Gate(tx))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A cart line item with a realistic price snapshot.
pub fn cart_item(id: CartItemId, product_id: ProductId, quantity: u32) -> CartItem {
    CartItem {
        id,
        product_id,
        quantity,
        price_snapshot: 19.99,
    }
}

/// A recommendation set from (product, score) pairs.
pub fn recommendation_set(items: &[(ProductId, f64)]) -> RecommendationSet {
    RecommendationSet {
        recommendations: items
            .iter()
            .map(|&(product_id, score)| RecommendationItem {
                product_id,
                name: format!("product-{product_id}"),
                category: Some("fixtures".to_string()),
                price: 10.0,
                score,
                path: None,
            })
            .collect(),
        context: None,
    }
}
