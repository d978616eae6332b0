//! Vitrine Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic and no I/O.

pub mod config;
pub mod entities;
pub mod error;
pub mod fingerprint;

pub use config::{InteractionWeights, StalenessConfig, StalenessPolicy, VitrineConfig};
pub use entities::{
    AuditMetadata, AuditRecord, CartItem, InteractionAck, InteractionAction, InteractionEvent,
    Product, RecommendationItem, RecommendationSet, RelatedProducts, UserSummary,
};
pub use error::{ConfigError, NetworkError, SyncError, ValidationError};
pub use fingerprint::{Fingerprint, ResourceKind};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Product identifier as assigned by the catalog service.
pub type ProductId = u64;

/// Cart line-item identifier as assigned by the cart service.
pub type CartItemId = u64;

/// Opaque user identifier supplied by the authentication collaborator.
///
/// The sync layer never inspects it; it only keys cache entries and is
/// forwarded on mutations.
pub type UserId = String;

/// Interaction event identifier using UUIDv7 for timestamp-sortable IDs.
pub type InteractionId = Uuid;

/// SHA-256 digest used for fingerprint identity in logs and compact keys.
pub type FingerprintDigest = [u8; 32];

/// Generate a new UUIDv7 interaction id (timestamp-sortable).
pub fn new_interaction_id() -> InteractionId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_digest(content: &[u8]) -> FingerprintDigest {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
