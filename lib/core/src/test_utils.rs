use crate::api::PaymentApi;
use crate::error::SdkError;
use crate::models::{
    AssetAmount, BalancesResponse, ConfirmPaymentRequest, ConfirmPaymentResponse,
    ConfirmWithdrawRequest, ConfirmWithdrawResponse, GetQuotesRequest, PaymentHistory,
    PaymentStatusResponse, Quote, QuoteBatch, QuoteFees, QuoteRequestBody, WithdrawRequest,
    DEFAULT_OUTPUT_ASSET,
};
use crate::platform::ExternalBrowser;
use crate::wallet::WalletSigner;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const QUOTES: &str = "POST /payments/quotes";
pub(crate) const CONFIRM: &str = "POST /payments/confirm";
pub(crate) const HISTORY: &str = "GET /payments/history";
pub(crate) const WITHDRAW: &str = "POST /payments/withdraw";
pub(crate) const WITHDRAW_CONFIRM: &str = "POST /payments/withdraw/confirm";

pub(crate) fn status_route(payment_id: &str) -> String {
    format!("GET /payments/{payment_id}")
}

pub(crate) fn balances_route(payment_id: &str) -> String {
    format!("POST /payments/balances {payment_id}")
}

/// Scripted reply of the mock payment service
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    Ok(Value),
    Api(u16, String),
    Network,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub(crate) fn api(status: u16, body: &str) -> Self {
        Reply::Api(status, body.to_string())
    }

    pub(crate) fn after(self, millis: u64) -> Self {
        Reply::Delayed(Duration::from_millis(millis), Box::new(self))
    }
}

/// In-memory [PaymentApi] with per-route scripted replies.
///
/// Queued replies are used first, then the route's sticky reply.
pub(crate) struct MockPaymentApi {
    configured: bool,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockPaymentApi {
    pub(crate) fn new() -> Self {
        Self {
            configured: true,
            queued: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub(crate) fn on(&self, route: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn always(&self, route: &str, reply: Reply) -> &Self {
        self.sticky.lock().unwrap().insert(route.to_string(), reply);
        self
    }

    pub(crate) fn count(&self, route: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn bodies(&self, route: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, body)| body.clone())
            .collect()
    }

    async fn respond<B: Serialize, T: DeserializeOwned>(
        &self,
        route: String,
        body: &B,
    ) -> Result<T, SdkError> {
        self.calls
            .lock()
            .unwrap()
            .push((route.clone(), serde_json::to_value(body).unwrap()));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(|queue| queue.pop_front());
        let reply = queued.or_else(|| self.sticky.lock().unwrap().get(&route).cloned());

        let mut reply = reply.unwrap_or(Reply::Network);
        loop {
            match reply {
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Ok(value) => return Ok(serde_json::from_value(value)?),
                Reply::Api(status, body) => return Err(SdkError::api(status, &body)),
                Reply::Network => {
                    return Err(SdkError::NetworkError("connection refused".to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl PaymentApi for MockPaymentApi {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn get_quotes(&self, request: &GetQuotesRequest) -> Result<QuoteBatch, SdkError> {
        self.respond(QUOTES.to_string(), &QuoteRequestBody::from(request))
            .await
    }

    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        self.respond(CONFIRM.to_string(), request).await
    }

    async fn get_payment_status(
        &self,
        payment_id: &str,
    ) -> Result<PaymentStatusResponse, SdkError> {
        self.respond(status_route(payment_id), &Value::Null).await
    }

    async fn get_payment_history(&self, owner_address: &str) -> Result<PaymentHistory, SdkError> {
        self.respond(
            HISTORY.to_string(),
            &json!({ "category": "ALL", "owner_address": owner_address }),
        )
        .await
    }

    async fn get_balances(&self, payment_id: &str) -> Result<BalancesResponse, SdkError> {
        self.respond(
            balances_route(payment_id),
            &json!({ "payment_id": payment_id }),
        )
        .await
    }

    async fn get_withdraw_typed_data(&self, request: &WithdrawRequest) -> Result<Value, SdkError> {
        self.respond(WITHDRAW.to_string(), request).await
    }

    async fn confirm_withdraw(
        &self,
        request: &ConfirmWithdrawRequest,
    ) -> Result<ConfirmWithdrawResponse, SdkError> {
        self.respond(WITHDRAW_CONFIRM.to_string(), request).await
    }
}

/// Browser that records what it was asked to do
#[derive(Default)]
pub(crate) struct RecordingBrowser {
    pub(crate) opened: Mutex<Vec<String>>,
    pub(crate) dismissed: AtomicUsize,
    fail_open: AtomicBool,
}

impl RecordingBrowser {
    /// Records the URL but reports that nothing could be shown
    pub(crate) fn failing() -> Self {
        let browser = Self::default();
        browser.fail_open.store(true, Ordering::SeqCst);
        browser
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn dismiss_count(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalBrowser for RecordingBrowser {
    async fn open(&self, url: &str) -> Result<(), SdkError> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SdkError::BrowserError("no browser available".to_string()));
        }
        Ok(())
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FixedSigner {
    pub(crate) signed: Mutex<Vec<Value>>,
    refuse: bool,
}

impl FixedSigner {
    pub(crate) fn new() -> Self {
        Self {
            signed: Mutex::new(Vec::new()),
            refuse: false,
        }
    }

    /// Signer whose user declines every request
    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl WalletSigner for FixedSigner {
    fn address(&self) -> String {
        "0xrecipient".to_string()
    }

    async fn sign_typed_data(&self, typed_data: &Value) -> Result<String, SdkError> {
        self.signed.lock().unwrap().push(typed_data.clone());
        if self.refuse {
            return Err(SdkError::GenericError("user rejected the request".to_string()));
        }
        Ok("0xsig".to_string())
    }
}

pub(crate) fn quote(payment_id: &str, onramp: &str) -> Quote {
    Quote {
        payment_id: payment_id.to_string(),
        onramp: onramp.to_string(),
        onramp_method: "debit_card".to_string(),
        output_amount: AssetAmount::new(DEFAULT_OUTPUT_ASSET, "97.5"),
        fees: QuoteFees {
            total_fees: "2.5".to_string(),
            conversion_fees: "1".to_string(),
            network_fees: "0.5".to_string(),
            business_fees: "1".to_string(),
            currency_symbol: "usd".to_string(),
        },
    }
}

pub(crate) fn batch_json(state_token: &str, quotes: &[Quote]) -> Value {
    json!({
        "quotes": quotes,
        "current_prices": { "USD": "1" },
        "price_currency": "USD",
        "state_token": state_token,
        "quoted_at": "2026-10-16T10:00:00Z",
        "accept_by": "2999-01-01T00:00:00Z",
    })
}

pub(crate) fn batch(state_token: &str, quotes: &[Quote]) -> QuoteBatch {
    serde_json::from_value(batch_json(state_token, quotes)).unwrap()
}

pub(crate) fn status_json(status: &str, funded: bool) -> Value {
    json!({ "status": status, "funded": funded })
}
