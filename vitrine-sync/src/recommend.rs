//! Typed store for the recommendation resource.
//!
//! Centralizes the optimistic score-nudge cycle so every surface gets the
//! same rollback and serialization guarantees instead of reinventing them
//! per screen. Score deltas are tunable ranking heuristics from
//! [`InteractionWeights`]; the server replaces every nudged score on its
//! next authoritative response.

use crate::cache::Payload;
use crate::codec;
use crate::mutation::{MutationCoordinator, MutationOutcome};
use vitrine_client::{AuditEmitter, RemoteClient};
use vitrine_core::{
    AuditRecord, Fingerprint, InteractionEvent, InteractionWeights, ProductId, RecommendationSet,
    RelatedProducts, ResourceKind, SyncError, UserId, ValidationError,
};

/// Facade over cache + coordinator for graph recommendations.
#[derive(Clone)]
pub struct RecommendationStore {
    coordinator: MutationCoordinator,
    client: RemoteClient,
    audit: AuditEmitter,
    weights: InteractionWeights,
}

impl RecommendationStore {
    pub fn new(
        coordinator: MutationCoordinator,
        client: RemoteClient,
        audit: AuditEmitter,
        weights: InteractionWeights,
    ) -> Self {
        Self {
            coordinator,
            client,
            audit,
            weights,
        }
    }

    /// The shared query cache (for reads and subscriptions).
    pub fn cache(&self) -> &crate::cache::QueryCache {
        self.coordinator.cache()
    }

    /// The cache fingerprint for one (product, user, limit) list.
    pub fn fingerprint(product_id: ProductId, user_id: &UserId, limit: u32) -> Fingerprint {
        Fingerprint::Recommendations {
            product_id,
            user_id: user_id.clone(),
            limit,
        }
    }

    /// Fetch (or serve cached) recommendations for a (product, user) pair.
    pub async fn recommendations(
        &self,
        product_id: ProductId,
        user_id: &UserId,
        limit: u32,
    ) -> Result<RecommendationSet, SyncError> {
        let fingerprint = Self::fingerprint(product_id, user_id, limit);
        let client = self.client.clone();
        let user = user_id.clone();
        let payload = self
            .coordinator
            .cache()
            .ensure(&fingerprint, move || async move {
                let set = client.fetch_recommendations(product_id, &user, limit).await?;
                codec::encode("recommendations", &set)
            })
            .await?;
        codec::decode("recommendations", payload).map_err(SyncError::from)
    }

    /// Fetch (or serve cached) graph neighbors of a product.
    pub async fn related_products(
        &self,
        product_id: ProductId,
        depth: u32,
    ) -> Result<RelatedProducts, SyncError> {
        let fingerprint = Fingerprint::RelatedProducts { product_id, depth };
        let client = self.client.clone();
        let payload = self
            .coordinator
            .cache()
            .ensure(&fingerprint, move || async move {
                let related = client.fetch_related_products(product_id, depth).await?;
                codec::encode("related-products", &related)
            })
            .await?;
        codec::decode("related-products", payload).map_err(SyncError::from)
    }

    /// Record a user gesture against the displayed recommendation list.
    ///
    /// The configured score delta for the action is applied optimistically,
    /// the interaction is sent exactly once, and the server's recomputed
    /// list (when returned) replaces the nudge. Failure rolls the list
    /// back to its pre-gesture state and surfaces the error for a user
    /// notification. The gesture is mirrored to the audit channel on
    /// success; audit failures never reach this flow.
    pub async fn record_interaction(
        &self,
        fingerprint: &Fingerprint,
        event: InteractionEvent,
    ) -> Result<MutationOutcome, SyncError> {
        if fingerprint.kind() != ResourceKind::Recommendations {
            return Err(ValidationError::InvalidValue {
                field: "fingerprint".to_string(),
                reason: "interactions target a recommendations fingerprint".to_string(),
            }
            .into());
        }

        let delta = self.weights.delta(event.action);
        let product_id = event.product_id;
        let client = self.client.clone();
        let wire_event = event.clone();
        let outcome = self
            .coordinator
            .mutate(
                fingerprint,
                move |current| nudge_score(current, product_id, delta),
                move || async move {
                    let ack = client.send_interaction(&wire_event).await?;
                    match ack.next_recommendations {
                        Some(set) => Ok(Some(codec::encode("recommendations", &set)?)),
                        None => Ok(None),
                    }
                },
            )
            .await?;

        self.audit.record(AuditRecord::new(
            event.action.as_str(),
            "product",
            event.product_id.to_string(),
            Some(event.user_id.clone()),
        ));
        Ok(outcome)
    }
}

/// Apply a score delta to the matching item, if the list is cached.
///
/// Returns `None` (no optimistic write) when nothing is cached or the
/// product is not in the list; the authoritative response still lands.
fn nudge_score(current: Option<&Payload>, product_id: ProductId, delta: f64) -> Option<Payload> {
    let payload = current?;
    let mut set: RecommendationSet = serde_json::from_value(payload.clone()).ok()?;
    let mut touched = false;
    for item in &mut set.recommendations {
        if item.product_id == product_id {
            item.score += delta;
            touched = true;
        }
    }
    if !touched {
        return None;
    }
    serde_json::to_value(set).ok()
}
