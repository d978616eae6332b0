//! Vitrine Sync - the storefront's synchronization core.
//!
//! Everything with a consistency concern lives here: the keyed query
//! cache, the optimistic mutation coordinator, the prefetch scheduler,
//! the cart synchronizer, and the typed recommendation store.
//!
//! # Wiring
//!
//! The cache is an explicit object constructed once per session and
//! injected into every component - never a module-level singleton:
//!
//! ```ignore
//! let cache = QueryCache::new(config.staleness_policy());
//! let coordinator = MutationCoordinator::new(cache.clone());
//! let carts = CartSynchronizer::new(coordinator.clone(), client.clone());
//! let recommendations = RecommendationStore::new(
//!     coordinator,
//!     client.clone(),
//!     AuditEmitter::spawn(client),
//!     config.interaction_weights,
//! );
//! ```
//!
//! # Write discipline
//!
//! Only the mutation coordinator and the `ensure` path write to the
//! cache; view code reads via `get`/`subscribe`. That single-writer rule,
//! plus per-fingerprint sequencing, is what keeps the lock-free-feeling
//! design correct on a cooperative event loop.

pub mod cache;
pub mod cart;
mod codec;
pub mod mutation;
pub mod prefetch;
pub mod recommend;

pub use cache::{CacheEntry, CacheStats, CacheStatus, Payload, QueryCache, SubscriberId};
pub use cart::CartSynchronizer;
pub use mutation::{MutationCoordinator, MutationOutcome};
pub use prefetch::PrefetchScheduler;
pub use recommend::RecommendationStore;
