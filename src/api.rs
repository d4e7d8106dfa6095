//! Storefront server API client.
//!
//! Provides authenticated HTTP communication with the storefront server:
//! cart and quotation lifecycle calls, order and payment reads/writes,
//! and chat history fetches. The server is an external collaborator —
//! this module only speaks its REST surface.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::CommerceError;
use crate::model::{ChatMessage, Order, Quotation};
use crate::quotation::{QuoteDecision, QuoteRequest};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the storefront server URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach storefront server at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid storefront server URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Customer session not authorized".to_string(),
        404 => "Storefront endpoint not found".to_string(),
        s if s >= 500 => format!("Storefront server error (HTTP {s})"),
        s => format!("Unexpected response from storefront server (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for the storefront REST API.
pub struct ApiClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, CommerceError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CommerceError::Api(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.trim().to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform an authenticated request and decode the JSON body.
    ///
    /// `path` includes the leading slash, e.g. `/quotations/mine`.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, CommerceError> {
        let full_url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path = %path, "storefront API request");

        let mut req = self
            .client
            .request(method, &full_url)
            .header("X-Storefront-API-Key", &self.api_key)
            .header("Content-Type", "application/json");
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CommerceError::Api(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            // Preserve server-side validation details where available.
            let detail = match serde_json::from_str::<Value>(&body_text) {
                Ok(json) => json
                    .get("error")
                    .or_else(|| json.get("message"))
                    .and_then(Value::as_str)
                    .map(|m| format!("{m} (HTTP {})", status.as_u16()))
                    .unwrap_or_else(|| format!("{} (HTTP {})", status_error(status), status.as_u16())),
                Err(_) if !body_text.trim().is_empty() => format!(
                    "{} (HTTP {}): {}",
                    status_error(status),
                    status.as_u16(),
                    body_text.trim()
                ),
                Err(_) => format!("{} (HTTP {})", status_error(status), status.as_u16()),
            };
            return Err(CommerceError::Api(detail));
        }

        serde_json::from_str(&body_text)
            .map_err(|e| CommerceError::Api(format!("Invalid JSON from storefront server: {e}")))
    }

    // -----------------------------------------------------------------------
    // Cart & quotations
    // -----------------------------------------------------------------------

    /// Idempotently fetch-or-create the customer's active cart.
    pub async fn fetch_or_create_cart(&self) -> Result<Quotation, CommerceError> {
        self.request(Method::POST, "/quotations/cart", None).await
    }

    pub async fn add_cart_item(
        &self,
        quotation_id: &str,
        description: &str,
        quantity: u32,
    ) -> Result<Quotation, CommerceError> {
        let body = serde_json::json!({ "description": description, "quantity": quantity });
        self.request(
            Method::POST,
            &format!("/quotations/{quotation_id}/items"),
            Some(body),
        )
        .await
    }

    pub async fn update_cart_item(
        &self,
        quotation_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<Quotation, CommerceError> {
        let body = serde_json::json!({ "quantity": quantity });
        self.request(
            Method::PUT,
            &format!("/quotations/{quotation_id}/items/{item_id}"),
            Some(body),
        )
        .await
    }

    pub async fn remove_cart_item(
        &self,
        quotation_id: &str,
        item_id: &str,
    ) -> Result<Quotation, CommerceError> {
        self.request(
            Method::DELETE,
            &format!("/quotations/{quotation_id}/items/{item_id}"),
            None,
        )
        .await
    }

    /// Submit the cart for pricing (`Cart -> Requested`).
    pub async fn submit_quotation(&self, quotation_id: &str) -> Result<Quotation, CommerceError> {
        self.request(
            Method::POST,
            &format!("/quotations/{quotation_id}/submit"),
            None,
        )
        .await
    }

    /// Admin: price the quotation (`InProcess -> Quoted`).
    pub async fn send_quote(
        &self,
        quotation_id: &str,
        quote: &QuoteRequest,
    ) -> Result<Quotation, CommerceError> {
        let body = serde_json::to_value(quote)
            .map_err(|e| CommerceError::Api(format!("encode quote: {e}")))?;
        self.request(
            Method::POST,
            &format!("/quotations/{quotation_id}/quote"),
            Some(body),
        )
        .await
    }

    /// Customer decision (`Quoted -> Approved | Rejected`).
    pub async fn send_decision(
        &self,
        quotation_id: &str,
        decision: QuoteDecision,
    ) -> Result<Quotation, CommerceError> {
        let body = serde_json::json!({ "decision": decision });
        self.request(
            Method::POST,
            &format!("/quotations/{quotation_id}/decision"),
            Some(body),
        )
        .await
    }

    pub async fn my_quotations(&self) -> Result<Vec<Quotation>, CommerceError> {
        self.request(Method::GET, "/quotations/mine", None).await
    }

    // -----------------------------------------------------------------------
    // Orders & payments
    // -----------------------------------------------------------------------

    pub async fn my_orders(&self) -> Result<Vec<Order>, CommerceError> {
        self.request(Method::GET, "/orders/mine", None).await
    }

    /// Fetch one order fresh — the only source the production gate may
    /// be evaluated against.
    pub async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
        self.request(Method::GET, &format!("/orders/{order_id}"), None)
            .await
    }

    /// Record a payment against an order; returns the refreshed order
    /// with its full payment list.
    pub async fn record_order_payment(
        &self,
        order_id: &str,
        amount: f64,
        method: crate::model::PaymentMethod,
    ) -> Result<Order, CommerceError> {
        let body = serde_json::json!({ "amount": amount, "method": method });
        self.request(
            Method::POST,
            &format!("/orders/{order_id}/payments"),
            Some(body),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Chat history
    // -----------------------------------------------------------------------

    /// Persisted message history for a channel. Called on join and after
    /// every reconnect — the live stream only carries post-join messages.
    pub async fn message_history(
        &self,
        entity_id: &str,
    ) -> Result<Vec<ChatMessage>, CommerceError> {
        self.request(
            Method::GET,
            &format!("/quotations/{entity_id}/messages"),
            None,
        )
        .await
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://shop.example.com/"),
            "https://shop.example.com"
        );
        assert_eq!(
            normalize_base_url("shop.example.com/api/"),
            "https://shop.example.com"
        );
        assert_eq!(
            normalize_base_url("localhost:4000"),
            "http://localhost:4000"
        );
        assert_eq!(
            normalize_base_url("  https://shop.example.com/api  "),
            "https://shop.example.com"
        );
    }

    #[test]
    fn test_status_error_messages() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            "API key is invalid or expired"
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN),
            "Customer session not authorized"
        );
        assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR).contains("500"));
        assert!(status_error(StatusCode::IM_A_TEAPOT).contains("418"));
    }

    #[test]
    fn test_client_normalizes_on_construction() {
        let client = ApiClient::new("shop.example.com/api/", "key-1").unwrap();
        assert_eq!(client.base_url(), "https://shop.example.com");
    }
}
