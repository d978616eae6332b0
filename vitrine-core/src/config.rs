//! Configuration loading for a Vitrine session.
//!
//! File-level configuration is strict: all fields required, unknown fields
//! rejected. The policy types below also carry programmatic defaults so
//! embedders and tests can build them without a file.

use crate::error::ConfigError;
use crate::fingerprint::ResourceKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for one storefront session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VitrineConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub prefetch_enabled: bool,
    pub audit_enabled: bool,
    pub staleness: StalenessConfig,
    pub interaction_weights: InteractionWeights,
}

/// Per-resource-kind staleness windows, in milliseconds.
///
/// Catalog data is long-lived; recommendations change with every
/// interaction, so their window is short.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StalenessConfig {
    pub catalog_ms: u64,
    pub users_ms: u64,
    pub recommendations_ms: u64,
    pub related_products_ms: u64,
    pub cart_ms: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            catalog_ms: 10 * 60 * 1000,
            users_ms: 10 * 60 * 1000,
            recommendations_ms: 15 * 1000,
            related_products_ms: 60 * 1000,
            cart_ms: 30 * 1000,
        }
    }
}

/// Resolved staleness policy: resource kind to stale-after duration.
#[derive(Debug, Clone)]
pub struct StalenessPolicy {
    catalog: Duration,
    users: Duration,
    recommendations: Duration,
    related_products: Duration,
    cart: Duration,
}

impl StalenessPolicy {
    pub fn stale_after(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Catalog => self.catalog,
            ResourceKind::Users => self.users,
            ResourceKind::Recommendations => self.recommendations,
            ResourceKind::RelatedProducts => self.related_products,
            ResourceKind::Cart => self.cart,
        }
    }

    /// Override one kind's window (builder style, mostly for tests).
    pub fn with_stale_after(mut self, kind: ResourceKind, window: Duration) -> Self {
        match kind {
            ResourceKind::Catalog => self.catalog = window,
            ResourceKind::Users => self.users = window,
            ResourceKind::Recommendations => self.recommendations = window,
            ResourceKind::RelatedProducts => self.related_products = window,
            ResourceKind::Cart => self.cart = window,
        }
        self
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from(&StalenessConfig::default())
    }
}

impl From<&StalenessConfig> for StalenessPolicy {
    fn from(config: &StalenessConfig) -> Self {
        Self {
            catalog: Duration::from_millis(config.catalog_ms),
            users: Duration::from_millis(config.users_ms),
            recommendations: Duration::from_millis(config.recommendations_ms),
            related_products: Duration::from_millis(config.related_products_ms),
            cart: Duration::from_millis(config.cart_ms),
        }
    }
}

/// Optimistic score deltas per interaction action.
///
/// Tunable ranking heuristics, not semantics: the server replaces every
/// nudged score on the next authoritative response.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractionWeights {
    pub view: f64,
    pub like: f64,
    pub add_to_cart: f64,
    pub review: f64,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        Self {
            view: 0.05,
            like: 0.1,
            add_to_cart: 0.2,
            review: 0.15,
        }
    }
}

impl InteractionWeights {
    pub fn delta(&self, action: crate::entities::InteractionAction) -> f64 {
        use crate::entities::InteractionAction::*;
        match action {
            View => self.view,
            Like => self.like,
            AddToCart => self.add_to_cart,
            Review => self.review,
        }
    }
}

impl VitrineConfig {
    /// Load from `--config <path>` or the `VITRINE_CONFIG` environment
    /// variable, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: VitrineConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.staleness.recommendations_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "staleness.recommendations_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.staleness.cart_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "staleness.cart_ms",
                reason: "must be > 0".to_string(),
            });
        }
        for (field, delta) in [
            ("interaction_weights.view", self.interaction_weights.view),
            ("interaction_weights.like", self.interaction_weights.like),
            (
                "interaction_weights.add_to_cart",
                self.interaction_weights.add_to_cart,
            ),
            (
                "interaction_weights.review",
                self.interaction_weights.review,
            ),
        ] {
            if !delta.is_finite() || delta < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a finite non-negative number".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::from(&self.staleness)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("VITRINE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
