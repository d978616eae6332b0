//! Background cache warming for anticipated navigation.
//!
//! Prefetching is a heuristic: a wrong prediction costs one wasted network
//! call, never correctness. The scheduler leans entirely on the query
//! cache's de-duplication, so a prefetch can never double up with a real
//! request that is already in flight or already fresh.

use crate::cache::{Payload, QueryCache};
use std::future::Future;
use vitrine_client::RemoteClient;
use vitrine_core::{Fingerprint, NetworkError, ProductId, UserId};

/// Fires `ensure` calls nobody waits on.
#[derive(Clone)]
pub struct PrefetchScheduler {
    cache: QueryCache,
    enabled: bool,
}

impl PrefetchScheduler {
    pub fn new(cache: QueryCache, enabled: bool) -> Self {
        Self { cache, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Warm a fingerprint in the background. The result is discarded and
    /// errors are logged at debug; nothing surfaces to any view.
    pub fn prefetch<F, Fut>(&self, fingerprint: &Fingerprint, loader: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Payload, NetworkError>> + Send + 'static,
    {
        if !self.enabled {
            return;
        }
        let cache = self.cache.clone();
        let fingerprint = fingerprint.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.ensure(&fingerprint, loader).await {
                tracing::debug!(fingerprint = %fingerprint, error = %err, "prefetch discarded");
            }
        });
    }

    /// Warm the recommendations a hovered/selected catalog item will need.
    ///
    /// Unauthenticated sessions have no recommendation fingerprint to
    /// warm, so they are a no-op.
    pub fn anticipate_product(
        &self,
        client: &RemoteClient,
        product_id: ProductId,
        user_id: Option<&UserId>,
        limit: u32,
    ) {
        let Some(user_id) = user_id else {
            return;
        };
        let fingerprint = Fingerprint::Recommendations {
            product_id,
            user_id: user_id.clone(),
            limit,
        };
        let client = client.clone();
        let user_id = user_id.clone();
        self.prefetch(&fingerprint, move || async move {
            let set = client
                .fetch_recommendations(product_id, &user_id, limit)
                .await?;
            Ok(serde_json::to_value(set).unwrap_or_default())
        });
    }
}
