//! Cart synchronization.
//!
//! The cart is the one resource where the optimistic patch is never
//! allowed to stand: price and inventory are server-authoritative, so
//! every add/remove/clear ends with a full re-fetch of the cart
//! fingerprint and the fetched cart replaces whatever was guessed.
//! Failures leave the cart exactly in its pre-mutation state.

use crate::cache::Payload;
use crate::codec;
use crate::mutation::MutationCoordinator;
use vitrine_client::RemoteClient;
use vitrine_core::{
    CartItem, CartItemId, Fingerprint, ProductId, SyncError, UserId, ValidationError,
};

/// Mutation coordinator specialization for the cart resource.
///
/// Per-cart state machine is idle -> syncing -> idle; a second mutation
/// arriving while syncing queues behind the first (the coordinator's
/// per-fingerprint gate).
#[derive(Clone)]
pub struct CartSynchronizer {
    coordinator: MutationCoordinator,
    client: RemoteClient,
}

impl CartSynchronizer {
    pub fn new(coordinator: MutationCoordinator, client: RemoteClient) -> Self {
        Self {
            coordinator,
            client,
        }
    }

    /// The shared query cache (for reads and subscriptions).
    pub fn cache(&self) -> &crate::cache::QueryCache {
        self.coordinator.cache()
    }

    /// The cache fingerprint for one user's cart.
    pub fn fingerprint(user_id: &UserId) -> Fingerprint {
        Fingerprint::Cart {
            user_id: user_id.clone(),
        }
    }

    /// Whether a cart mutation is currently in flight for this user.
    pub fn is_syncing(&self, user_id: &UserId) -> bool {
        self.coordinator.is_pending(&Self::fingerprint(user_id))
    }

    /// Hydrate or refresh the cart from the server, no optimistic step.
    pub async fn refresh(&self, user_id: &UserId) -> Result<Vec<CartItem>, SyncError> {
        let fingerprint = Self::fingerprint(user_id);
        let client = self.client.clone();
        let user = user_id.clone();
        let payload = self
            .coordinator
            .cache()
            .ensure(&fingerprint, move || async move {
                let items = client.fetch_cart(&user).await?;
                codec::encode("cart", &items)
            })
            .await?;
        codec::decode("cart", payload).map_err(SyncError::from)
    }

    /// Add a product to the cart.
    ///
    /// Optimistically bumps the quantity (price snapshot guessed as zero,
    /// never as a real number), then re-syncs against the server.
    pub async fn add_item(
        &self,
        user_id: &UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Vec<CartItem>, SyncError> {
        if quantity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "quantity".to_string(),
                reason: "must be >= 1".to_string(),
            }
            .into());
        }
        let fingerprint = Self::fingerprint(user_id);
        let client = self.client.clone();
        let user = user_id.clone();
        self.coordinator
            .mutate(
                &fingerprint,
                move |current| optimistic_add(current, product_id, quantity),
                move || async move {
                    client.add_cart_item(&user, product_id, quantity).await?;
                    let items = client.fetch_cart(&user).await?;
                    Ok(Some(codec::encode("cart", &items)?))
                },
            )
            .await?;
        self.current(user_id)
    }

    /// Remove a cart line item, then re-sync against the server.
    pub async fn remove_item(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
    ) -> Result<Vec<CartItem>, SyncError> {
        let fingerprint = Self::fingerprint(user_id);
        let client = self.client.clone();
        let user = user_id.clone();
        self.coordinator
            .mutate(
                &fingerprint,
                move |current| optimistic_remove(current, item_id),
                move || async move {
                    client.remove_cart_item(item_id).await?;
                    let items = client.fetch_cart(&user).await?;
                    Ok(Some(codec::encode("cart", &items)?))
                },
            )
            .await?;
        self.current(user_id)
    }

    /// Empty the cart: remove every line item the server currently holds,
    /// then re-sync.
    pub async fn clear(&self, user_id: &UserId) -> Result<Vec<CartItem>, SyncError> {
        let fingerprint = Self::fingerprint(user_id);
        let client = self.client.clone();
        let user = user_id.clone();
        self.coordinator
            .mutate(
                &fingerprint,
                |_| Some(Payload::Array(Vec::new())),
                move || async move {
                    let items = client.fetch_cart(&user).await?;
                    for item in items {
                        client.remove_cart_item(item.id).await?;
                    }
                    let after = client.fetch_cart(&user).await?;
                    Ok(Some(codec::encode("cart", &after)?))
                },
            )
            .await?;
        self.current(user_id)
    }

    /// Decode the cached cart, treating an absent entry as empty.
    fn current(&self, user_id: &UserId) -> Result<Vec<CartItem>, SyncError> {
        let entry = self.coordinator.cache().get(&Self::fingerprint(user_id));
        match entry.payload {
            Some(payload) => codec::decode("cart", payload).map_err(SyncError::from),
            None => Ok(Vec::new()),
        }
    }
}

fn optimistic_add(current: Option<&Payload>, product_id: ProductId, quantity: u32) -> Option<Payload> {
    let mut items: Vec<CartItem> = current
        .and_then(|payload| serde_json::from_value(payload.clone()).ok())
        .unwrap_or_default();
    match items.iter_mut().find(|item| item.product_id == product_id) {
        Some(item) => item.quantity += quantity,
        None => items.push(CartItem {
            id: 0,
            product_id,
            quantity,
            price_snapshot: 0.0,
        }),
    }
    Some(serde_json::to_value(items).unwrap_or_default())
}

fn optimistic_remove(current: Option<&Payload>, item_id: CartItemId) -> Option<Payload> {
    let mut items: Vec<CartItem> = current
        .and_then(|payload| serde_json::from_value(payload.clone()).ok())
        .unwrap_or_default();
    items.retain(|item| item.id != item_id);
    Some(serde_json::to_value(items).unwrap_or_default())
}
