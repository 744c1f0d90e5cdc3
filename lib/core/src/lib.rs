pub mod api;
pub mod error;
pub mod events;
mod logger;
pub mod models;
pub mod monitor;
pub mod platform;
pub mod quote;
pub mod recovery;
pub mod sdk_builder;
#[cfg(test)]
mod test_utils;
pub mod wallet;

use api::PaymentApi;
use error::SdkError;
use log::info;
use models::{
    parse_amount, AppState, Config, ConfirmPaymentResponse, ConnectRequest, GetQuotesRequest,
    PaymentSession, PaymentStatusResponse, Quote, QuoteBatch, QuoteGroup, RecoverablePayment,
    RecoveryScan,
};
use monitor::FundingMonitor;
use platform::{ExternalBrowser, LifecycleNotifier};
use quote::{QuoteAcquisition, QuoteState};
use recovery::{RecoveryEngine, RecoveryState};
use serde_json::Value;
use std::sync::Arc;
use wallet::WalletSigner;

pub use api::RestClient;
pub use events::{EventEmitter, EventListener, SdkEvent};
pub use platform::LogOnlyBrowser;
pub use sdk_builder::SdkBuilder;

#[derive(Clone)]
pub struct OnrampSdk {
    config: Config,
    quotes: Arc<QuoteAcquisition>,
    monitor: FundingMonitor,
    recovery: Arc<RecoveryEngine>,
    event_emitter: Arc<EventEmitter>,
    lifecycle_notifier: LifecycleNotifier,
}

/// Builds the SDK from `request.config` with the default REST client and starts it
pub async fn connect(request: ConnectRequest) -> Result<OnrampSdk, SdkError> {
    let sdk = SdkBuilder::new(request.config).build().await?;
    sdk.start()?;
    Ok(sdk)
}

impl OnrampSdk {
    /// Creates a new instance of the `OnrampSdk`
    ///
    /// # Arguments
    ///
    /// * `config` - The Sdk configuration object
    /// * `payment_api` - Client of the payments service
    /// * `browser` - Surface that opens funding pages
    /// * `lifecycle_notifier` - Source of foreground/background transitions
    pub(crate) fn new(
        config: Config,
        payment_api: Arc<dyn PaymentApi>,
        browser: Arc<dyn ExternalBrowser>,
        lifecycle_notifier: LifecycleNotifier,
    ) -> Self {
        let event_emitter = Arc::new(EventEmitter::new());
        Self {
            quotes: Arc::new(QuoteAcquisition::new(
                payment_api.clone(),
                event_emitter.clone(),
            )),
            monitor: FundingMonitor::new(
                payment_api.clone(),
                browser,
                event_emitter.clone(),
                &config,
            ),
            recovery: Arc::new(RecoveryEngine::new(
                payment_api,
                event_emitter.clone(),
                &config,
            )),
            config,
            event_emitter,
            lifecycle_notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a listener to receive SDK events
    ///
    /// # Returns
    ///
    /// A unique identifier for the listener, which can be used to remove it later
    pub fn add_event_listener(&self, listener: Box<dyn EventListener>) -> String {
        self.event_emitter.add_listener(listener)
    }

    /// Removes a previously registered event listener
    ///
    /// # Returns
    ///
    /// `true` if the listener was found and removed, `false` otherwise
    pub fn remove_event_listener(&self, id: &str) -> bool {
        self.event_emitter.remove_listener(id)
    }

    /// Starts the SDK's background tasks
    ///
    /// The funding monitor starts listening to the lifecycle notifier, so a
    /// tracked payment is re-checked whenever the app becomes active.
    pub fn start(&self) -> Result<(), SdkError> {
        self.monitor.subscribe(&self.lifecycle_notifier);
        Ok(())
    }

    /// Stops the SDK's background tasks
    ///
    /// The polling loop and the lifecycle listener are released. Confirming a
    /// payment afterwards fails with [SdkError::ShutDown].
    pub fn disconnect(&self) -> Result<(), SdkError> {
        self.monitor.teardown();
        Ok(())
    }

    /// Notifier the host application reports foreground/background transitions to
    pub fn lifecycle_notifier(&self) -> LifecycleNotifier {
        self.lifecycle_notifier.clone()
    }

    /// Reports an app state transition
    ///
    /// # Returns
    ///
    /// The number of listeners that received it
    pub fn notify_app_state(&self, state: AppState) -> usize {
        self.lifecycle_notifier.notify(state)
    }

    /// Requests fixed-input quotes
    ///
    /// A selected quote that is not part of the new batch is deselected.
    ///
    /// # Arguments
    ///
    /// * `request` - Input asset and amount, output asset and price currency
    ///
    /// # Returns
    ///
    /// The resulting quote state. Without a credential this is always
    /// [QuoteState::NotConfigured]. Service failures are reported through
    /// [QuoteState::Failed], malformed amounts through an `SdkError`.
    pub async fn fetch_quotes(&self, request: GetQuotesRequest) -> Result<QuoteState, SdkError> {
        if self.quotes.is_configured() {
            parse_amount(&request.input_amount)?;
        }
        let state = self.quotes.fetch(request).await;
        self.drop_stale_selection(&state);
        Ok(state)
    }

    /// Repeats the last quote request, or the default one when nothing was fetched yet
    pub async fn refetch_quotes(&self) -> QuoteState {
        let state = self.quotes.refetch().await;
        self.drop_stale_selection(&state);
        state
    }

    fn drop_stale_selection(&self, state: &QuoteState) {
        let Some(batch) = state.batch() else {
            return;
        };
        let selected = self.monitor.session().selected_quote;
        if let Some(quote) = selected {
            if batch.find_quote(&quote.payment_id).is_none() {
                info!("Selected quote {} is no longer offered", quote.payment_id);
                self.monitor.select_quote(None);
            }
        }
    }

    pub fn quote_state(&self) -> QuoteState {
        self.quotes.state()
    }

    /// Quotes of the current batch grouped by on-ramp, in order of first appearance
    pub fn quote_groups(&self) -> Vec<QuoteGroup> {
        self.quotes.groups()
    }

    /// Selects the quote with `payment_id` from the current batch
    ///
    /// Selecting the quote that is already selected deselects it.
    ///
    /// # Returns
    ///
    /// The selected quote, or `None` after a deselect
    pub fn select_quote(&self, payment_id: &str) -> Result<Option<Quote>, SdkError> {
        let batch = self.quotes.batch().ok_or(SdkError::NoQuoteBatch)?;
        let quote = batch.find_quote(payment_id).cloned().ok_or_else(|| {
            SdkError::GenericError(format!("Quote {payment_id} is not in the current batch"))
        })?;

        let already_selected = self
            .monitor
            .session()
            .selected_quote
            .is_some_and(|selected| selected.payment_id == quote.payment_id);
        if already_selected {
            self.monitor.select_quote(None);
            return Ok(None);
        }

        self.monitor.select_quote(Some(quote.clone()));
        Ok(Some(quote))
    }

    pub fn clear_selection(&self) {
        self.monitor.select_quote(None);
    }

    /// Confirms the selected quote and starts tracking its funding
    ///
    /// # Arguments
    ///
    /// * `owner_address` - Wallet address that owns the payment and receives the output
    ///
    /// # Returns
    ///
    /// The raw confirm payload. On failure the session keeps the error text.
    pub async fn confirm_payment(
        &self,
        owner_address: &str,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        let batch = self.quotes.batch();
        self.monitor.confirm(batch.as_ref(), owner_address).await
    }

    pub fn payment_session(&self) -> PaymentSession {
        self.monitor.session()
    }

    /// Checks the tracked payment now. Does nothing when no payment is tracked.
    pub async fn check_payment_status(&self) {
        self.monitor.check_status().await
    }

    /// Tracks funding of a payment confirmed through [Self::confirm_retry_payment]
    pub async fn track_payment(&self, response: &ConfirmPaymentResponse) -> Result<(), SdkError> {
        self.monitor.track(response).await
    }

    /// Lists past payments of `owner_address` that still hold funds
    ///
    /// # Returns
    ///
    /// One entry per payment and token with a non-zero balance, plus the number
    /// of payments whose balance could not be read
    pub async fn load_recoverable_payments(
        &self,
        owner_address: &str,
    ) -> Result<RecoveryScan, SdkError> {
        self.recovery.load_payments(owner_address).await
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    pub async fn get_withdraw_typed_data(
        &self,
        payment_id: &str,
        token: &str,
        amount: &str,
        recipient_address: &str,
    ) -> Result<Value, SdkError> {
        self.recovery
            .get_withdraw_typed_data(payment_id, token, amount, recipient_address)
            .await
    }

    /// Submits a withdrawal signed by the owner
    ///
    /// # Returns
    ///
    /// The transaction hash
    pub async fn submit_withdraw(
        &self,
        payment_id: &str,
        token: &str,
        amount: &str,
        recipient_address: &str,
        signature: &str,
    ) -> Result<String, SdkError> {
        self.recovery
            .submit_withdraw(payment_id, token, amount, recipient_address, signature)
            .await
    }

    /// Withdraws a stranded balance to the signer's address
    ///
    /// Signer failures are reported as [SdkError::SigningError].
    pub async fn withdraw(
        &self,
        payment: &RecoverablePayment,
        signer: &dyn WalletSigner,
    ) -> Result<String, SdkError> {
        self.recovery.withdraw(payment, signer).await
    }

    /// Quotes a stranded balance as the input of a new payment
    pub async fn fetch_retry_quotes(
        &self,
        parent_payment_id: &str,
        token: &str,
        amount: &str,
        output_asset: &str,
    ) -> Result<QuoteBatch, SdkError> {
        parse_amount(amount)?;
        self.recovery
            .fetch_retry_quotes(parent_payment_id, token, amount, output_asset)
            .await
    }

    pub async fn confirm_retry_payment(
        &self,
        payment_id: &str,
        state_token: &str,
        owner_address: &str,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        self.recovery
            .confirm_retry_payment(payment_id, state_token, owner_address)
            .await
    }

    pub async fn fetch_payment_status(
        &self,
        payment_id: &str,
    ) -> Result<PaymentStatusResponse, SdkError> {
        self.recovery.fetch_payment_status(payment_id).await
    }

    /// Configures a global SDK logger that will log to file and will forward log events to
    /// an optional application-specific logger.
    ///
    /// If called, it should be called before any SDK methods (for example, before `connect`).
    /// It must be called only once in the application lifecycle. Applications that already
    /// register a global logger should not call it at all.
    ///
    /// ### Arguments
    ///
    /// - `log_dir`: Directory of the `onramp-sdk.log` file, created when missing.
    /// - `app_logger`: Optional application logger.
    ///
    /// ### Errors
    ///
    /// Fails when the log file cannot be opened or a global logger is already configured.
    pub fn init_logging(
        log_dir: &str,
        app_logger: Option<Box<dyn log::Log>>,
    ) -> anyhow::Result<()> {
        logger::SdkLogger::init(log_dir, app_logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        balances_route, batch_json, quote, status_json, status_route, MockPaymentApi,
        RecordingBrowser, Reply, CONFIRM, HISTORY, QUOTES,
    };
    use crate::models::SessionPhase;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixture {
        sdk: OnrampSdk,
        api: Arc<MockPaymentApi>,
        browser: Arc<RecordingBrowser>,
    }

    async fn fixture(api: MockPaymentApi) -> Fixture {
        let api = Arc::new(api);
        let browser = Arc::new(RecordingBrowser::default());
        let sdk = SdkBuilder::new(Config::default_config(Some("key".to_string())))
            .payment_api(api.clone())
            .browser(browser.clone())
            .build()
            .await
            .unwrap();
        sdk.start().unwrap();
        Fixture { sdk, api, browser }
    }

    struct Collect(Arc<Mutex<Vec<SdkEvent>>>);

    impl EventListener for Collect {
        fn on_event(&self, e: &SdkEvent) {
            self.0.lock().unwrap().push(e.clone());
        }
    }

    #[tokio::test]
    async fn test_select_toggles_and_requires_batch() {
        let api = MockPaymentApi::new();
        api.on(
            QUOTES,
            Reply::Ok(batch_json("t1", &[quote("p1", "moonpay"), quote("p2", "stripe")])),
        );
        let fx = fixture(api).await;

        assert!(matches!(
            fx.sdk.select_quote("p1"),
            Err(SdkError::NoQuoteBatch)
        ));

        fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();
        assert_eq!(fx.sdk.quote_groups().len(), 2);

        let selected = fx.sdk.select_quote("p1").unwrap();
        assert_eq!(selected.unwrap().payment_id, "p1");
        assert_eq!(fx.sdk.select_quote("p1").unwrap(), None);
        assert!(fx.sdk.payment_session().selected_quote.is_none());

        fx.sdk.select_quote("p2").unwrap();
        assert!(fx.sdk.select_quote("missing").is_err());
        assert_eq!(
            fx.sdk.payment_session().selected_quote.unwrap().payment_id,
            "p2"
        );
    }

    #[tokio::test]
    async fn test_invalid_amount_is_rejected_before_request() {
        let fx = fixture(MockPaymentApi::new()).await;

        let request = GetQuotesRequest {
            input_amount: "one hundred".to_string(),
            ..Default::default()
        };
        assert!(fx.sdk.fetch_quotes(request).await.is_err());
        assert_eq!(fx.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_new_batch_drops_stale_selection() {
        let api = MockPaymentApi::new();
        api.on(QUOTES, Reply::Ok(batch_json("t1", &[quote("p1", "moonpay")])));
        api.on(QUOTES, Reply::Ok(batch_json("t2", &[quote("p9", "moonpay")])));
        let fx = fixture(api).await;

        fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();
        fx.sdk.select_quote("p1").unwrap();
        fx.sdk.refetch_quotes().await;

        assert!(fx.sdk.payment_session().selected_quote.is_none());
        assert_eq!(fx.api.count(QUOTES), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_to_funded_flow() {
        let api = MockPaymentApi::new();
        api.on(QUOTES, Reply::Ok(batch_json("t1", &[quote("p1", "moonpay")])));
        api.on(
            CONFIRM,
            Reply::Ok(json!({
                "payment_id": "p1",
                "next_instruction": { "funding_page_url": "https://fund.example/p1" },
            })),
        );
        api.on(&status_route("p1"), Reply::Ok(status_json("PENDING", false)));
        api.always(&status_route("p1"), Reply::Ok(status_json("COMPLETE", true)));
        let fx = fixture(api).await;
        let events = Arc::new(Mutex::new(Vec::new()));
        fx.sdk
            .add_event_listener(Box::new(Collect(events.clone())));

        fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();
        fx.sdk.select_quote("p1").unwrap();
        let response = fx.sdk.confirm_payment("0xowner").await.unwrap();

        assert_eq!(response.funding_page_url(), Some("https://fund.example/p1"));
        assert_eq!(fx.browser.opened(), vec!["https://fund.example/p1"]);
        assert_eq!(
            fx.sdk.payment_session().phase,
            SessionPhase::AwaitingFunding
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        let session = fx.sdk.payment_session();
        assert!(session.funded);
        assert_eq!(session.phase, SessionPhase::Funded);
        assert!(events
            .lock()
            .unwrap()
            .contains(&SdkEvent::PaymentFunded {
                payment_id: "p1".to_string()
            }));

        let body = &fx.api.bodies(CONFIRM)[0];
        assert_eq!(body["owner_address"], "0xowner");
        assert_eq!(body["destination_address"], "0xowner");
        assert_eq!(body["client_redirect_url"], "https://google.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_notification_rechecks_status() {
        let api = MockPaymentApi::new();
        api.on(QUOTES, Reply::Ok(batch_json("t1", &[quote("p1", "moonpay")])));
        api.on(
            CONFIRM,
            Reply::Ok(json!({
                "payment_id": "p1",
                "next_instruction": { "funding_page_url": "https://fund.example/p1" },
            })),
        );
        api.always(&status_route("p1"), Reply::Ok(status_json("PENDING", false)));
        let fx = fixture(api).await;

        fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();
        fx.sdk.select_quote("p1").unwrap();
        fx.sdk.confirm_payment("0xowner").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let before = fx.api.count(&status_route("p1"));

        assert_eq!(fx.sdk.notify_app_state(AppState::Active), 1);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(fx.api.count(&status_route("p1")), before + 1);
    }

    #[tokio::test]
    async fn test_disconnect_stops_confirming() {
        let api = MockPaymentApi::new();
        api.on(QUOTES, Reply::Ok(batch_json("t1", &[quote("p1", "moonpay")])));
        let fx = fixture(api).await;

        fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();
        fx.sdk.select_quote("p1").unwrap();
        fx.sdk.disconnect().unwrap();

        assert!(matches!(
            fx.sdk.confirm_payment("0xowner").await,
            Err(SdkError::ShutDown)
        ));
        assert_eq!(fx.api.count(CONFIRM), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_and_retry_payment() {
        let api = MockPaymentApi::new();
        api.on(
            HISTORY,
            Reply::Ok(json!({ "payment_statuses": [{
                "payment_id": "old-1",
                "status": "PENDING",
                "created_at": "2026-10-01T12:00:00Z",
                "quoted": { "output_amount": { "asset": "stable:0x779d", "amount": "97.5" } },
            }] })),
        );
        api.on(
            &balances_route("old-1"),
            Reply::Ok(json!({ "balance_results": [
                { "token": "USDC", "value": { "amount": "20" } },
            ] })),
        );
        api.on(QUOTES, Reply::Ok(batch_json("t7", &[quote("retry-1", "moonpay")])));
        api.on(
            CONFIRM,
            Reply::Ok(json!({
                "payment_id": "retry-1",
                "next_instruction": { "funding_page_url": "https://fund.example/retry-1" },
            })),
        );
        api.always(&status_route("retry-1"), Reply::Ok(status_json("PENDING", false)));
        let fx = fixture(api).await;

        let scan = fx.sdk.load_recoverable_payments("0xowner").await.unwrap();
        assert_eq!(scan.payments.len(), 1);
        assert_eq!(fx.sdk.recovery_state().payments, scan.payments);
        let stranded = &scan.payments[0];

        let batch = fx
            .sdk
            .fetch_retry_quotes(
                &stranded.payment_id,
                &stranded.token,
                &stranded.amount,
                &stranded.output_asset,
            )
            .await
            .unwrap();
        let response = fx
            .sdk
            .confirm_retry_payment(&batch.quotes[0].payment_id, &batch.state_token, "0xowner")
            .await
            .unwrap();
        fx.sdk.track_payment(&response).await.unwrap();

        let session = fx.sdk.payment_session();
        assert_eq!(session.payment_id.as_deref(), Some("retry-1"));
        assert_eq!(session.phase, SessionPhase::AwaitingFunding);
        assert_eq!(fx.browser.opened(), vec!["https://fund.example/retry-1"]);
        assert_eq!(fx.api.count(&status_route("retry-1")), 1);
        fx.sdk.disconnect().unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_sdk_issues_no_quote_request() {
        let fx = fixture(MockPaymentApi::unconfigured()).await;

        let state = fx.sdk.fetch_quotes(GetQuotesRequest::default()).await.unwrap();

        assert_eq!(state, QuoteState::NotConfigured);
        assert_eq!(fx.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_sdk_ignores_malformed_amount() {
        let fx = fixture(MockPaymentApi::unconfigured()).await;
        let request = GetQuotesRequest {
            input_amount: "abc".to_string(),
            ..Default::default()
        };

        let state = fx.sdk.fetch_quotes(request).await.unwrap();

        assert_eq!(state, QuoteState::NotConfigured);
        assert_eq!(fx.api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_configured_sdk_rejects_malformed_amount() {
        let fx = fixture(MockPaymentApi::new()).await;
        let request = GetQuotesRequest {
            input_amount: "abc".to_string(),
            ..Default::default()
        };

        assert!(fx.sdk.fetch_quotes(request).await.is_err());
        assert_eq!(fx.api.total_calls(), 0);
    }
}
