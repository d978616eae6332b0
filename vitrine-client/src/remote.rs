//! HTTP client for the storefront service.

use crate::token::TokenProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::{
    AuditRecord, CartItem, CartItemId, InteractionAck, InteractionEvent, NetworkError, Product,
    ProductId, RecommendationSet, RelatedProducts, UserId, UserSummary, VitrineConfig,
};

/// Remote resource client.
///
/// Issues GET/POST/DELETE against the storefront service, attaching the
/// current bearer credential when the provider yields one. Non-2xx
/// responses and transport failures both surface as [`NetworkError`];
/// retry policy belongs to callers.
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationQuery<'a> {
    product_id: ProductId,
    user_id: &'a str,
    limit: u32,
}

#[derive(Serialize)]
struct CartAddBody<'a> {
    user_id: &'a str,
    product_id: ProductId,
    quantity: u32,
}

impl RemoteClient {
    pub fn new(
        config: &VitrineConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, NetworkError> {
        Self::with_timeout(&config.api_base_url, config.request_timeout(), tokens)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::InvalidRequest {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    // ------------------------------------------------------------------------
    // Catalog and browse endpoints (GET, unauthenticated allowed)
    // ------------------------------------------------------------------------

    pub async fn fetch_catalog(&self) -> Result<Vec<Product>, NetworkError> {
        self.get_json::<Vec<Product>, ()>("/catalog", None).await
    }

    pub async fn fetch_users(&self) -> Result<Vec<UserSummary>, NetworkError> {
        self.get_json::<Vec<UserSummary>, ()>("/users", None).await
    }

    pub async fn fetch_recommendations(
        &self,
        product_id: ProductId,
        user_id: &UserId,
        limit: u32,
    ) -> Result<RecommendationSet, NetworkError> {
        let query = RecommendationQuery {
            product_id,
            user_id,
            limit,
        };
        self.get_json("/recommendations", Some(&query)).await
    }

    pub async fn fetch_related_products(
        &self,
        product_id: ProductId,
        depth: u32,
    ) -> Result<RelatedProducts, NetworkError> {
        let path = format!("/related_products/{product_id}");
        self.get_json(&path, Some(&[("depth", depth)])).await
    }

    // ------------------------------------------------------------------------
    // Mutation endpoints
    // ------------------------------------------------------------------------

    pub async fn send_interaction(
        &self,
        event: &InteractionEvent,
    ) -> Result<InteractionAck, NetworkError> {
        self.post_json("/interactions", event).await
    }

    pub async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, NetworkError> {
        let path = format!("/cart/{user_id}");
        self.get_json::<Vec<CartItem>, ()>(&path, None).await
    }

    pub async fn add_cart_item(
        &self,
        user_id: &UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Vec<CartItem>, NetworkError> {
        let body = CartAddBody {
            user_id,
            product_id,
            quantity,
        };
        self.post_json("/cart", &body).await
    }

    pub async fn remove_cart_item(
        &self,
        item_id: CartItemId,
    ) -> Result<Vec<CartItem>, NetworkError> {
        let path = format!("/cart/{item_id}");
        let request = self.client.delete(format!("{}{}", self.base_url, path));
        let request = self.attach_token(request);
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(&path, e))?;
        self.parse_response(&path, response).await
    }

    /// Best-effort audit mirror. Callers treat the ack as ignorable.
    pub async fn send_audit(&self, record: &AuditRecord) -> Result<(), NetworkError> {
        let _ack: serde_json::Value = self.post_json("/audit", record).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------------

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, NetworkError>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url);
        request = self.attach_token(request);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(path, e))?;
        self.parse_response(path, response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, NetworkError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let request = self.attach_token(self.client.post(url)).json(body);
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(path, e))?;
        self.parse_response(path, response).await
    }

    fn attach_token(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.current_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, NetworkError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(path, e))?;
            serde_json::from_slice(&bytes).map_err(|e| NetworkError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NetworkError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn map_reqwest_error(path: &str, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            path: path.to_string(),
        }
    } else {
        NetworkError::Transport {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }
}
