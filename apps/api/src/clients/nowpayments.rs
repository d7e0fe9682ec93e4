/// NowPayments client — payment creation and status polling.
/// Webhook (IPN) signature verification lives in `payments::webhook`,
/// which shares the same response shapes.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const NOWPAYMENTS_API_URL: &str = "https://api.nowpayments.io/v1";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum NowPaymentsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentRequest<'a> {
    pub price_amount: f64,
    pub price_currency: &'a str,
    pub pay_currency: &'a str,
    pub order_id: &'a str,
    pub order_description: &'a str,
    pub ipn_callback_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment_id: i64,
    pub payment_status: String,
    pub pay_address: String,
    pub pay_amount: f64,
    pub pay_currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentStatusResponse {
    pub payment_status: String,
    #[serde(default)]
    pub pay_amount: f64,
    #[serde(default)]
    pub actually_paid: f64,
}

#[derive(Clone)]
pub struct NowPaymentsClient {
    client: reqwest::Client,
    api_key: String,
}

impl NowPaymentsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// POST /payment — creates an upstream payment and returns the deposit
    /// address the user must pay to.
    pub async fn create_payment(
        &self,
        request: &CreatePaymentRequest<'_>,
    ) -> Result<CreatePaymentResponse, NowPaymentsError> {
        let url = format!("{NOWPAYMENTS_API_URL}/payment");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let response = Self::check(response).await?;
        let parsed: CreatePaymentResponse = response.json().await?;
        debug!(
            "NowPayments payment {} created for order {}",
            parsed.payment_id, request.order_id
        );
        Ok(parsed)
    }

    /// GET /payment/{id} — current upstream status.
    pub async fn payment_status(
        &self,
        payment_id: &str,
    ) -> Result<PaymentStatusResponse, NowPaymentsError> {
        let url = format!("{NOWPAYMENTS_API_URL}/payment/{payment_id}");
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, NowPaymentsError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NowPaymentsError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}
