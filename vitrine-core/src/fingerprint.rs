//! Request fingerprints for cache identity.
//!
//! A fingerprint names one cacheable request: resource kind plus its ordered
//! parameters. Construction goes through the enum variants, so a fingerprint
//! cannot exist without every parameter that distinguishes it - two callers
//! asking for the same resource with the same parameters always collide on
//! the same cache entry.

use crate::{compute_digest, ProductId, UserId};
use std::fmt;

/// Resource kind discriminator, used for staleness policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Catalog,
    Users,
    Recommendations,
    RelatedProducts,
    Cart,
}

impl ResourceKind {
    /// Stable name used in digests and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Users => "users",
            Self::Recommendations => "recommendations",
            Self::RelatedProducts => "related-products",
            Self::Cart => "cart",
        }
    }
}

/// Canonical key for one cacheable request.
///
/// Equality and hashing are structural: two fingerprints are equal iff the
/// resource kind and every parameter value match. The [`digest`](Self::digest)
/// is derived from the same canonical encoding and is only a compact alias
/// for logging - identity never goes through the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Full product catalog.
    Catalog,
    /// Storefront user listing.
    Users,
    /// Graph recommendations for a (product, user) pair.
    Recommendations {
        product_id: ProductId,
        user_id: UserId,
        limit: u32,
    },
    /// Graph neighborhood walk around a product.
    RelatedProducts { product_id: ProductId, depth: u32 },
    /// One user's cart.
    Cart { user_id: UserId },
}

impl Fingerprint {
    /// The resource kind this fingerprint addresses.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Catalog => ResourceKind::Catalog,
            Self::Users => ResourceKind::Users,
            Self::Recommendations { .. } => ResourceKind::Recommendations,
            Self::RelatedProducts { .. } => ResourceKind::RelatedProducts,
            Self::Cart { .. } => ResourceKind::Cart,
        }
    }

    /// Canonical string encoding: kind followed by the ordered parameters.
    ///
    /// Parameter order is fixed per kind, so the encoding is injective and
    /// the digest below is stable across processes.
    pub fn canonical(&self) -> String {
        match self {
            Self::Catalog => "catalog".to_string(),
            Self::Users => "users".to_string(),
            Self::Recommendations {
                product_id,
                user_id,
                limit,
            } => format!("recommendations:{product_id}:{user_id}:{limit}"),
            Self::RelatedProducts { product_id, depth } => {
                format!("related-products:{product_id}:{depth}")
            }
            Self::Cart { user_id } => format!("cart:{user_id}"),
        }
    }

    /// SHA-256 digest of the canonical encoding, hex-encoded.
    pub fn digest(&self) -> String {
        hex::encode(compute_digest(self.canonical().as_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
