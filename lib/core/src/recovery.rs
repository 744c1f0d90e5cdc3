use crate::api::PaymentApi;
use crate::error::SdkError;
use crate::events::{EventEmitter, SdkEvent};
use crate::models::{
    ConfirmPaymentRequest, ConfirmPaymentResponse, ConfirmWithdrawRequest, GetQuotesRequest,
    Config, PaymentHistory, PaymentStatusResponse, QuoteBatch, RecoverablePayment, RecoveryScan,
    WithdrawRequest,
};
use crate::wallet::WalletSigner;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the caller currently sees of the recovery scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecoveryState {
    pub loading: bool,
    pub error: Option<String>,
    pub payments: Vec<RecoverablePayment>,
    /// Balance lookups discarded during the last successful scan
    pub skipped: usize,
}

#[derive(Default)]
struct RecoverySlot {
    state: RecoveryState,
    /// Bumped on every scan so that only the newest one writes its outcome
    generation: u64,
}

/// Finds payments with stranded balances and resolves them by withdrawal or retry
pub struct RecoveryEngine {
    api: Arc<dyn PaymentApi>,
    event_emitter: Arc<EventEmitter>,
    price_currency: String,
    slot: Mutex<RecoverySlot>,
}

impl RecoveryEngine {
    pub fn new(
        api: Arc<dyn PaymentApi>,
        event_emitter: Arc<EventEmitter>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            event_emitter,
            price_currency: config.price_currency.clone(),
            slot: Mutex::new(RecoverySlot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, RecoverySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RecoveryState {
        self.slot().state.clone()
    }

    /// Scans the owner's history for payments that still hold funds.
    ///
    /// A failing history request fails the scan and keeps the previous list.
    /// A failing balance lookup only drops that payment. When scans overlap,
    /// only the newest one updates the state; older ones still return their
    /// own outcome to their caller.
    pub async fn load_payments(&self, owner_address: &str) -> Result<RecoveryScan, SdkError> {
        let generation = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.state.loading = true;
            slot.state.error = None;
            slot.generation
        };

        info!("Scanning payment history of {owner_address}");
        let scan = match self.api.get_payment_history(owner_address).await {
            Ok(history) => Ok(scan_history(self.api.as_ref(), &history).await),
            Err(e) => Err(e),
        };

        {
            let mut slot = self.slot();
            if slot.generation != generation {
                debug!("Discarding recovery scan of {owner_address} superseded by a newer scan");
                return scan;
            }
            slot.state.loading = false;
            match &scan {
                Ok(scan) => {
                    slot.state.payments = scan.payments.clone();
                    slot.state.skipped = scan.skipped;
                }
                Err(e) => slot.state.error = Some(e.to_string()),
            }
        }

        match &scan {
            Ok(scan) => {
                info!(
                    "Found {} recoverable balances, skipped {} payments",
                    scan.payments.len(),
                    scan.skipped
                );
                self.event_emitter.emit(&SdkEvent::RecoveryScanCompleted {
                    recoverable: scan.payments.len(),
                    skipped: scan.skipped,
                });
            }
            Err(e) => warn!("Recovery scan failed: {e}"),
        }
        scan
    }

    /// Gets the typed data the owner signs to withdraw `amount` of `token`
    pub async fn get_withdraw_typed_data(
        &self,
        payment_id: &str,
        token: &str,
        amount: &str,
        recipient_address: &str,
    ) -> Result<Value, SdkError> {
        let request = WithdrawRequest::single(payment_id, token, amount, recipient_address);
        self.api.get_withdraw_typed_data(&request).await
    }

    /// Submits a signed withdrawal and returns its transaction hash
    pub async fn submit_withdraw(
        &self,
        payment_id: &str,
        token: &str,
        amount: &str,
        recipient_address: &str,
        signature: &str,
    ) -> Result<String, SdkError> {
        let request = ConfirmWithdrawRequest {
            withdraw: WithdrawRequest::single(payment_id, token, amount, recipient_address),
            owner_signature: signature.to_string(),
        };
        let response = self.api.confirm_withdraw(&request).await?;
        if response.transaction_hash.trim().is_empty() {
            return Err(SdkError::InvalidResponse(
                "withdraw confirmation carried no transaction hash".to_string(),
            ));
        }

        info!(
            "Withdrawal of {amount} {token} from {payment_id} sent: {}",
            response.transaction_hash
        );
        Ok(response.transaction_hash)
    }

    /// Withdraws the whole stranded balance back to the signing wallet
    pub async fn withdraw(
        &self,
        payment: &RecoverablePayment,
        signer: &dyn WalletSigner,
    ) -> Result<String, SdkError> {
        let recipient_address = signer.address();
        let recipient_address = recipient_address.as_str();
        let typed_data = self
            .get_withdraw_typed_data(
                &payment.payment_id,
                &payment.token,
                &payment.amount,
                recipient_address,
            )
            .await?;
        let signature = signer
            .sign_typed_data(&typed_data)
            .await
            .map_err(|e| match e {
                SdkError::SigningError(_) => e,
                other => SdkError::SigningError(other.to_string()),
            })?;
        self.submit_withdraw(
            &payment.payment_id,
            &payment.token,
            &payment.amount,
            recipient_address,
            &signature,
        )
        .await
    }

    /// Quotes the stranded balance as the input of a new payment
    pub async fn fetch_retry_quotes(
        &self,
        parent_payment_id: &str,
        token: &str,
        amount: &str,
        output_asset: &str,
    ) -> Result<QuoteBatch, SdkError> {
        let request = GetQuotesRequest {
            input_asset: token.to_string(),
            input_amount: amount.to_string(),
            output_asset: output_asset.to_string(),
            price_currency: self.price_currency.clone(),
            parent_payment_id: Some(parent_payment_id.to_string()),
        };
        self.api.get_quotes(&request).await
    }

    /// Confirms a retry quote. The caller decides whether to track its funding.
    pub async fn confirm_retry_payment(
        &self,
        payment_id: &str,
        state_token: &str,
        owner_address: &str,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        let request = ConfirmPaymentRequest {
            payment_id: payment_id.to_string(),
            state_token: state_token.to_string(),
            owner_address: owner_address.to_string(),
            destination_address: owner_address.to_string(),
            client_redirect_url: None,
        };
        self.api.confirm_payment(&request).await
    }

    pub async fn fetch_payment_status(
        &self,
        payment_id: &str,
    ) -> Result<PaymentStatusResponse, SdkError> {
        self.api.get_payment_status(payment_id).await
    }
}

/// Folds the history into recoverable balances plus a count of failed lookups
async fn scan_history(api: &dyn PaymentApi, history: &PaymentHistory) -> RecoveryScan {
    let mut scan = RecoveryScan::default();
    for record in &history.payment_statuses {
        if record.is_complete() {
            continue;
        }

        let balances = match api.get_balances(&record.payment_id).await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(
                    "Skipping payment {}: balance lookup failed: {e}",
                    record.payment_id
                );
                scan.skipped += 1;
                continue;
            }
        };

        for balance in balances.balance_results.iter().filter(|b| !b.is_zero()) {
            debug!(
                "Payment {} holds {} {}",
                record.payment_id, balance.value.amount, balance.token
            );
            scan.payments
                .push(RecoverablePayment::from_record(record, balance));
        }
    }
    scan
}
