use crate::api::PaymentApi;
use crate::error::SdkError;
use crate::models::{
    BalancesRequest, BalancesResponse, Config, ConfirmPaymentRequest, ConfirmPaymentResponse,
    ConfirmWithdrawRequest, ConfirmWithdrawResponse, GetQuotesRequest, PaymentHistory,
    PaymentStatusResponse, QuoteBatch, QuoteRequestBody, WithdrawRequest,
};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// HTTP implementation of [PaymentApi]
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    configured: bool,
}

impl RestClient {
    pub fn new(config: &Config) -> Result<Self, SdkError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| SdkError::GenericError(format!("Invalid API key header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            configured: config.is_configured(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SdkError> {
        debug!("GET {path}");
        let response = self.client.get(self.url(path)).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode(status, &body)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SdkError> {
        debug!("POST {path}");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode(status, &body)
    }
}

/// Turns a response into either the expected body or an [SdkError::ApiError]
pub(crate) fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, SdkError> {
    if !status.is_success() {
        return Err(SdkError::api(status.as_u16(), body));
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl PaymentApi for RestClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn get_quotes(&self, request: &GetQuotesRequest) -> Result<QuoteBatch, SdkError> {
        self.post("/payments/quotes", &QuoteRequestBody::from(request))
            .await
    }

    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        self.post("/payments/confirm", request).await
    }

    async fn get_payment_status(
        &self,
        payment_id: &str,
    ) -> Result<PaymentStatusResponse, SdkError> {
        self.get(&format!("/payments/{payment_id}"), &[]).await
    }

    async fn get_payment_history(&self, owner_address: &str) -> Result<PaymentHistory, SdkError> {
        self.get(
            "/payments/history",
            &[("category", "ALL"), ("owner_address", owner_address)],
        )
        .await
    }

    async fn get_balances(&self, payment_id: &str) -> Result<BalancesResponse, SdkError> {
        let request = BalancesRequest {
            payment_id: payment_id.to_string(),
        };
        self.post("/payments/balances", &request).await
    }

    async fn get_withdraw_typed_data(&self, request: &WithdrawRequest) -> Result<Value, SdkError> {
        self.post("/payments/withdraw", request).await
    }

    async fn confirm_withdraw(
        &self,
        request: &ConfirmWithdrawRequest,
    ) -> Result<ConfirmWithdrawResponse, SdkError> {
        self.post("/payments/withdraw/confirm", request).await
    }
}
