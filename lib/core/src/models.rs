use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SdkError;

pub const DEFAULT_BASE_URL: &str = "https://v2.prod.halliday.xyz";
pub const DEFAULT_CLIENT_REDIRECT_URL: &str = "https://google.com";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_PRICE_CURRENCY: &str = "USD";
pub const DEFAULT_OUTPUT_ASSET: &str = "stable:0x779ded0c9e1022225f8e0630b35a9b54be713736";

/// Payment status the service reports once a payment has fully settled
pub const COMPLETE_STATUS: &str = "COMPLETE";

pub struct ConnectRequest {
    /// The SDK [Config]
    pub config: Config,
}

/// Configuration for the SDK
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Bearer credential for the payment service. Quote requests are disabled without it.
    pub api_key: Option<String>,
    /// Base URL of the payment service
    pub base_url: String,
    /// Where the funding page sends the user once funding is done
    pub client_redirect_url: String,
    /// Interval between funding-status checks
    pub poll_interval_secs: u64,
    /// Currency quotes are priced in
    pub price_currency: String,
}

impl Config {
    /// Creates the production configuration
    ///
    /// # Arguments
    ///
    /// * `api_key` - The payment service credential, if one is available
    pub fn default_config(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            client_redirect_url: DEFAULT_CLIENT_REDIRECT_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            price_currency: DEFAULT_PRICE_CURRENCY.to_string(),
        }
    }

    /// Builds the configuration from `HALLIDAY_API_KEY` and, optionally, `HALLIDAY_BASE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default_config(std::env::var("HALLIDAY_API_KEY").ok());
        if let Ok(base_url) = std::env::var("HALLIDAY_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }
        config
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// An asset together with a decimal-string amount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssetAmount {
    pub asset: String,
    pub amount: String,
}

impl AssetAmount {
    pub fn new(asset: &str, amount: &str) -> Self {
        Self {
            asset: asset.to_string(),
            amount: amount.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuoteFees {
    pub total_fees: String,
    pub conversion_fees: String,
    pub network_fees: String,
    pub business_fees: String,
    pub currency_symbol: String,
}

/// An offer to convert a fixed input amount through one on-ramp method
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub payment_id: String,
    pub onramp: String,
    pub onramp_method: String,
    pub output_amount: AssetAmount,
    pub fees: QuoteFees,
}

impl Quote {
    /// Group key used for presentation
    pub fn onramp_key(&self) -> String {
        self.onramp.to_uppercase()
    }

    /// `debit_card` becomes `debit card`
    pub fn method_label(&self) -> String {
        self.onramp_method.replace('_', " ")
    }
}

/// Result of a quote request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuoteBatch {
    pub quotes: Vec<Quote>,
    #[serde(default)]
    pub current_prices: HashMap<String, String>,
    pub price_currency: String,
    pub state_token: String,
    pub quoted_at: String,
    pub accept_by: String,
}

/// Quotes sharing one upper-cased on-ramp name
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuoteGroup {
    pub onramp: String,
    pub quotes: Vec<Quote>,
}

impl QuoteBatch {
    /// Partitions the quotes by upper-cased on-ramp, in order of first appearance
    pub fn grouped_by_onramp(&self) -> Vec<QuoteGroup> {
        let mut groups: Vec<QuoteGroup> = Vec::new();
        for quote in &self.quotes {
            let key = quote.onramp_key();
            match groups.iter_mut().find(|group| group.onramp == key) {
                Some(group) => group.quotes.push(quote.clone()),
                None => groups.push(QuoteGroup {
                    onramp: key,
                    quotes: vec![quote.clone()],
                }),
            }
        }
        groups
    }

    pub fn find_quote(&self, payment_id: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.payment_id == payment_id)
    }

    /// The `accept_by` deadline, if the service sent a parseable RFC 3339 timestamp
    pub fn accept_by_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.accept_by)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.accept_by_time()
            .map(|deadline| now > deadline)
            .unwrap_or(false)
    }
}

/// Parameters of a fixed-input quote request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GetQuotesRequest {
    pub input_asset: String,
    pub input_amount: String,
    pub output_asset: String,
    pub price_currency: String,
    /// Set when quoting the stranded balance of an earlier payment
    pub parent_payment_id: Option<String>,
}

impl Default for GetQuotesRequest {
    fn default() -> Self {
        Self {
            input_asset: "USD".to_string(),
            input_amount: "100".to_string(),
            output_asset: DEFAULT_OUTPUT_ASSET.to_string(),
            price_currency: DEFAULT_PRICE_CURRENCY.to_string(),
            parent_payment_id: None,
        }
    }
}

// Wire formats for the payment service

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum QuoteKind {
    #[serde(rename = "FIXED_INPUT")]
    FixedInput,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuoteSpec {
    pub kind: QuoteKind,
    pub fixed_input_amount: AssetAmount,
    pub output_asset: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuoteRequestBody {
    pub request: QuoteSpec,
    pub price_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_payment_id: Option<String>,
}

impl From<&GetQuotesRequest> for QuoteRequestBody {
    fn from(req: &GetQuotesRequest) -> Self {
        Self {
            request: QuoteSpec {
                kind: QuoteKind::FixedInput,
                fixed_input_amount: AssetAmount::new(&req.input_asset, &req.input_amount),
                output_asset: req.output_asset.clone(),
            },
            price_currency: req.price_currency.clone(),
            parent_payment_id: req.parent_payment_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
    pub state_token: String,
    pub owner_address: String,
    pub destination_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_redirect_url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NextInstruction {
    pub funding_page_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Confirm response. Unknown fields are kept so the payload can be shown verbatim.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfirmPaymentResponse {
    pub payment_id: Option<String>,
    pub next_instruction: Option<NextInstruction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfirmPaymentResponse {
    pub fn funding_page_url(&self) -> Option<&str> {
        self.next_instruction
            .as_ref()
            .and_then(|next| next.funding_page_url.as_deref())
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaymentStatusResponse {
    pub status: String,
    #[serde(default)]
    pub funded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuotedSummary {
    pub output_amount: AssetAmount,
}

/// One entry of the owner's payment history
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub status: String,
    pub created_at: String,
    pub quoted: QuotedSummary,
}

impl PaymentRecord {
    pub fn is_complete(&self) -> bool {
        self.status == COMPLETE_STATUS
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentHistory {
    #[serde(default)]
    pub payment_statuses: Vec<PaymentRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BalanceValue {
    pub amount: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BalanceResult {
    pub token: String,
    pub value: BalanceValue,
}

impl BalanceResult {
    /// Unparseable amounts count as non-zero so they stay visible to the user
    pub fn is_zero(&self) -> bool {
        Decimal::from_str(self.value.amount.trim())
            .map(|amount| amount.is_zero())
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BalancesResponse {
    #[serde(default)]
    pub balance_results: Vec<BalanceResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BalancesRequest {
    pub payment_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenAmount {
    pub token: String,
    pub amount: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WithdrawRequest {
    pub payment_id: String,
    pub token_amounts: Vec<TokenAmount>,
    pub recipient_address: String,
}

impl WithdrawRequest {
    pub fn single(payment_id: &str, token: &str, amount: &str, recipient_address: &str) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            token_amounts: vec![TokenAmount {
                token: token.to_string(),
                amount: amount.to_string(),
            }],
            recipient_address: recipient_address.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfirmWithdrawRequest {
    #[serde(flatten)]
    pub withdraw: WithdrawRequest,
    pub owner_signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfirmWithdrawResponse {
    pub transaction_hash: String,
}

/// A past payment holding a non-zero balance of one token
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecoverablePayment {
    pub payment_id: String,
    pub created_at: String,
    pub status: String,
    pub token: String,
    pub amount: String,
    pub output_asset: String,
}

impl RecoverablePayment {
    pub fn from_record(record: &PaymentRecord, balance: &BalanceResult) -> Self {
        Self {
            payment_id: record.payment_id.clone(),
            created_at: record.created_at.clone(),
            status: record.status.clone(),
            token: balance.token.clone(),
            amount: balance.value.amount.clone(),
            output_asset: record.quoted.output_amount.asset.clone(),
        }
    }
}

/// Outcome of a recovery scan
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RecoveryScan {
    pub payments: Vec<RecoverablePayment>,
    /// Non-terminal payments whose balance lookup failed and were left out
    pub skipped: usize,
}

/// Foreground/background state reported by the host application
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Active => write!(f, "Active"),
            AppState::Inactive => write!(f, "Inactive"),
            AppState::Background => write!(f, "Background"),
        }
    }
}

/// Phase of the local payment session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Confirming,
    ConfirmFailed,
    AwaitingFunding,
    Funded,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::Confirming => write!(f, "Confirming"),
            SessionPhase::ConfirmFailed => write!(f, "ConfirmFailed"),
            SessionPhase::AwaitingFunding => write!(f, "AwaitingFunding"),
            SessionPhase::Funded => write!(f, "Funded"),
        }
    }
}

/// Client-held state of one confirmation attempt
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentSession {
    pub phase: SessionPhase,
    pub selected_quote: Option<Quote>,
    /// Payment whose funding status is being tracked
    pub payment_id: Option<String>,
    pub funding_page_url: Option<String>,
    pub confirm_result: Option<ConfirmPaymentResponse>,
    /// Literal error text of the last failed confirm
    pub confirm_error: Option<String>,
    pub status: Option<String>,
    pub funded: bool,
}

/// Formats a decimal string with two fractional digits, leaving unparseable input untouched
pub fn format_amount(amount: &str) -> String {
    match Decimal::from_str(amount.trim()) {
        Ok(value) => format!("{:.2}", value.round_dp(2)),
        Err(_) => amount.to_string(),
    }
}

/// Checks a decimal-string amount before sending it to the service
pub fn parse_amount(amount: &str) -> Result<Decimal, SdkError> {
    Decimal::from_str(amount.trim())
        .map_err(|e| SdkError::GenericError(format!("Invalid amount '{amount}': {e}")))
}
