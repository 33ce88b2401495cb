//! Stripe payment intents over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{PaymentError, PaymentIntent, PaymentIntentRequest, PaymentProvider};
use crate::config::PaymentConfig;

/// Request timeout for provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The fields of a Stripe refund object checkout cares about.
#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    status: String,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let mut auth_value =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, PaymentError> {
        let url = format!("{}{path}", self.api_base);
        let response = self.client.post(&url).form(form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount.to_string()),
            ("currency", request.currency.code().to_ascii_lowercase()),
            ("payment_method", request.payment_method_id.clone()),
            ("confirm", "true".to_owned()),
            ("automatic_payment_methods[enabled]", "true".to_owned()),
            ("automatic_payment_methods[allow_redirects]", "never".to_owned()),
        ];
        let intent: PaymentIntent = self.post_form("/v1/payment_intents", &form).await?;
        tracing::debug!(intent_id = %intent.id, status = ?intent.status, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let _: PaymentIntent = self
            .post_form(&format!("/v1/payment_intents/{intent_id}/cancel"), &[])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn refund_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let form = [("payment_intent", intent_id.to_owned())];
        let refund: Refund = self.post_form("/v1/refunds", &form).await?;
        tracing::debug!(refund_id = %refund.id, status = %refund.status, "Refund created");
        Ok(())
    }
}
