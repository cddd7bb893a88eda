//! Client for the subscription (entitlement) endpoints.
//!
//! A one-shot query invoked by the UI after checkout or on launch; the
//! result is applied to the usage record by the caller.

use crate::models::EntitlementStatus;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use studio_core::error::AppError;

#[async_trait]
pub trait EntitlementService: Send + Sync {
    /// Whether a known customer has an active subscription.
    async fn check_subscription(&self, customer_id: &str) -> Result<EntitlementStatus, AppError>;

    /// Status of a completed checkout session.
    async fn verify_checkout(&self, session_id: &str) -> Result<EntitlementStatus, AppError>;
}

pub struct HttpEntitlementClient {
    base_url: String,
    client: Client,
}

impl HttpEntitlementClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Transport {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::EmptyResponse(format!("Invalid entitlement response: {}", e)))
    }
}

#[async_trait]
impl EntitlementService for HttpEntitlementClient {
    async fn check_subscription(&self, customer_id: &str) -> Result<EntitlementStatus, AppError> {
        if customer_id.trim().is_empty() {
            return Err(AppError::InvalidRequest("Customer ID required".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/api/check-subscription", self.base_url))
            .json(&CheckRequest { customer_id })
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        let body: CheckResponse = self.read(response).await?;
        tracing::info!(entitled = body.is_pro, "Checked subscription");

        let subscription = body.subscription.unwrap_or_default();
        Ok(EntitlementStatus {
            is_entitled: body.is_pro,
            subscription_status: subscription.status,
            customer_id: Some(customer_id.to_string()),
            subscription_id: subscription.id,
            email: None,
        })
    }

    async fn verify_checkout(&self, session_id: &str) -> Result<EntitlementStatus, AppError> {
        if session_id.trim().is_empty() {
            return Err(AppError::InvalidRequest("Session ID required".to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/verify-subscription", self.base_url))
            .query(&[("session_id", session_id)])
            .send()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        let body: VerifyResponse = self.read(response).await?;
        tracing::info!(
            entitled = body.is_pro,
            status = body.status.as_deref().unwrap_or("unknown"),
            "Verified checkout session"
        );

        Ok(EntitlementStatus {
            is_entitled: body.is_pro,
            subscription_status: body.status,
            customer_id: body.customer_id,
            subscription_id: body.subscription_id,
            email: body.email,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    customer_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    #[serde(default)]
    is_pro: bool,
    #[serde(default)]
    subscription: Option<Subscription>,
}

#[derive(Deserialize, Default)]
struct Subscription {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    #[serde(default)]
    is_pro: bool,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    email: Option<String>,
}
