pub(crate) mod rest;

pub use rest::RestClient;

use crate::error::SdkError;
use crate::models::{
    BalancesResponse, ConfirmPaymentRequest, ConfirmPaymentResponse, ConfirmWithdrawRequest,
    ConfirmWithdrawResponse, GetQuotesRequest, PaymentHistory, PaymentStatusResponse, QuoteBatch,
    WithdrawRequest,
};
use async_trait::async_trait;
use serde_json::Value;

/// Trait for the remote payment service
#[async_trait]
pub trait PaymentApi: Send + Sync {
    /// Whether a credential is available. Quote requests are never issued without one.
    fn is_configured(&self) -> bool;

    /// Request a batch of fixed-input quotes
    async fn get_quotes(&self, request: &GetQuotesRequest) -> Result<QuoteBatch, SdkError>;

    /// Confirm a quoted payment
    async fn confirm_payment(
        &self,
        request: &ConfirmPaymentRequest,
    ) -> Result<ConfirmPaymentResponse, SdkError>;

    /// Get the current status of a payment
    async fn get_payment_status(&self, payment_id: &str)
        -> Result<PaymentStatusResponse, SdkError>;

    /// Get every payment made by the owner
    async fn get_payment_history(&self, owner_address: &str) -> Result<PaymentHistory, SdkError>;

    /// Get the balances held by a payment
    async fn get_balances(&self, payment_id: &str) -> Result<BalancesResponse, SdkError>;

    /// Get the payload the owner must sign to withdraw
    async fn get_withdraw_typed_data(&self, request: &WithdrawRequest) -> Result<Value, SdkError>;

    /// Submit a signed withdrawal
    async fn confirm_withdraw(
        &self,
        request: &ConfirmWithdrawRequest,
    ) -> Result<ConfirmWithdrawResponse, SdkError>;
}
