//! Core entity structures
//!
//! Wire-facing records for the storefront service. Recommendation data is
//! produced by the server; the client only displays it and optimistically
//! nudges scores between round trips.

use crate::error::ValidationError;
use crate::{CartItemId, InteractionId, ProductId, Timestamp, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Catalog product as returned by `GET /catalog`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub inventory: i64,
}

/// Storefront user as listed by the users endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

/// One server-scored recommendation.
///
/// `path` carries the graph edge trail the recommender walked to reach this
/// product, when the server chooses to expose it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub product_id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<ProductId>>,
}

/// Response shape of the recommendations endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub recommendations: Vec<RecommendationItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Response shape of the related-products graph walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedProducts {
    pub product_id: ProductId,
    pub related: Vec<ProductId>,
}

/// User gesture kinds that produce interaction events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    View,
    Like,
    AddToCart,
    Review,
}

impl InteractionAction {
    /// Stable wire name, also used for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Like => "like",
            Self::AddToCart => "add_to_cart",
            Self::Review => "review",
        }
    }
}

/// A single user gesture against a product.
///
/// Constructed only through [`InteractionEvent::new`], which validates and
/// normalizes input once at ingress. Sent exactly once per gesture; a
/// repeated gesture creates a new event, never a retry of the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub action: InteractionAction,
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl InteractionEvent {
    /// Validate and normalize a gesture into an event.
    ///
    /// Unauthenticated users cannot mutate, so a missing user id fails fast
    /// here and the event is never sent over the network.
    pub fn new(
        product_id: ProductId,
        user_id: Option<UserId>,
        action: InteractionAction,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.ok_or(ValidationError::MutationRequiresUser)?;
        if user_id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "user_id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if product_id == 0 {
            return Err(ValidationError::RequiredFieldMissing {
                field: "product_id".to_string(),
            });
        }
        Ok(Self {
            product_id,
            user_id,
            action,
            rating: 1,
            metadata: None,
        })
    }

    /// Override the implicit positive rating (e.g. an explicit review star).
    pub fn with_rating(mut self, rating: i32) -> Self {
        self.rating = rating;
        self
    }

    /// Attach free-form gesture metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Server acknowledgement of a posted interaction.
///
/// `next_recommendations` is the server-recomputed list, present when the
/// interaction changed the graph enough to re-rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionAck {
    pub status: String,
    pub interaction_id: InteractionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_recommendations: Option<RecommendationSet>,
}

/// One cart line item.
///
/// `price_snapshot` is server-authoritative and never optimistically
/// guessed; after any cart mutation the whole cart is re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_snapshot: f64,
}

/// Best-effort audit mirror of a state-changing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_state: Option<serde_json::Value>,
    pub metadata: AuditMetadata,
}

/// Client-side stamp attached to every audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub client_user_id: Option<UserId>,
    pub client_timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl AuditRecord {
    /// Build an audit record for an action against a target, stamped now.
    pub fn new(
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        client_user_id: Option<UserId>,
    ) -> Self {
        Self {
            action: action.into(),
            target_type: target_type.into(),
            target_id: target_id.into(),
            target_display: None,
            before_state: None,
            after_state: None,
            metadata: AuditMetadata {
                client_user_id,
                client_timestamp: Utc::now(),
                extra: None,
            },
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.target_display = Some(display.into());
        self
    }

    pub fn with_states(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before_state = before;
        self.after_state = after;
        self
    }
}
