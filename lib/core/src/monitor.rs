use crate::api::PaymentApi;
use crate::error::SdkError;
use crate::events::{EventEmitter, SdkEvent};
use crate::models::{
    AppState, Config, ConfirmPaymentRequest, ConfirmPaymentResponse, PaymentSession,
    PaymentStatusResponse, Quote, QuoteBatch, SessionPhase,
};
use crate::platform::{ExternalBrowser, LifecycleNotifier};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The running funding-status loop of a session
struct PollTask {
    payment_id: String,
    shutdown_sender: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl PollTask {
    fn stop(self) {
        debug!("Stopping funding poll for {}", self.payment_id);
        let _ = self.shutdown_sender.send(());
        self.handle.abort();
    }
}

#[derive(Default)]
struct MonitorState {
    session: PaymentSession,
    /// Bumped whenever a session is superseded. Status updates carry the
    /// generation they were issued under and are dropped once it moves on.
    generation: u64,
    poller: Option<PollTask>,
    /// Sequence of the last status request issued
    status_seq: u64,
    /// Sequence of the newest status response written to the session
    applied_seq: u64,
    torn_down: bool,
}

struct MonitorInner {
    api: Arc<dyn PaymentApi>,
    browser: Arc<dyn ExternalBrowser>,
    event_emitter: Arc<EventEmitter>,
    poll_interval: Duration,
    client_redirect_url: String,
    state: Mutex<MonitorState>,
    lifecycle_task: Mutex<Option<JoinHandle<()>>>,
}

/// Confirms a selected quote and follows the payment until it is funded
#[derive(Clone)]
pub struct FundingMonitor {
    inner: Arc<MonitorInner>,
}

impl FundingMonitor {
    pub fn new(
        api: Arc<dyn PaymentApi>,
        browser: Arc<dyn ExternalBrowser>,
        event_emitter: Arc<EventEmitter>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                api,
                browser,
                event_emitter,
                poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
                client_redirect_url: config.client_redirect_url.clone(),
                state: Mutex::new(MonitorState::default()),
                lifecycle_task: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current session
    pub fn session(&self) -> PaymentSession {
        self.state().session.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.state().poller.is_some()
    }

    /// Sets or clears the selected quote.
    ///
    /// A session that failed to confirm goes back to idle so it can be retried.
    pub fn select_quote(&self, quote: Option<Quote>) {
        let mut state = self.state();
        state.session.selected_quote = quote;
        if state.session.phase == SessionPhase::ConfirmFailed {
            state.session.phase = SessionPhase::Idle;
            state.session.confirm_error = None;
        }
    }

    /// Confirms the selected quote against `batch` for `owner_address`.
    ///
    /// Any previous session is stopped before the request is sent. On success
    /// the funding page is opened and the payment is polled until funded.
    pub async fn confirm(
        &self,
        batch: Option<&QuoteBatch>,
        owner_address: &str,
    ) -> Result<ConfirmPaymentResponse, SdkError> {
        let (request, generation) = {
            let mut state = self.state();
            if state.torn_down {
                return Err(SdkError::ShutDown);
            }
            let quote = state
                .session
                .selected_quote
                .clone()
                .ok_or(SdkError::NoQuoteSelected)?;
            let batch = batch.ok_or(SdkError::NoQuoteBatch)?;
            if batch.is_expired_at(Utc::now()) {
                return Err(SdkError::QuoteExpired(batch.accept_by.clone()));
            }

            Self::supersede(&mut state);
            state.session.phase = SessionPhase::Confirming;

            let request = ConfirmPaymentRequest {
                payment_id: quote.payment_id,
                state_token: batch.state_token.clone(),
                owner_address: owner_address.to_string(),
                destination_address: owner_address.to_string(),
                client_redirect_url: Some(self.inner.client_redirect_url.clone()),
            };
            (request, state.generation)
        };

        info!("Confirming payment {}", request.payment_id);
        let response = match self.inner.api.confirm_payment(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.fail_confirm(generation, None, &e);
                return Err(e);
            }
        };

        let (payment_id, funding_page_url) = match funding_target(&response) {
            Ok(target) => target,
            Err(e) => {
                self.fail_confirm(generation, Some(response), &e);
                return Err(e);
            }
        };

        self.begin_funding(generation, &response, payment_id, funding_page_url)
            .await;
        Ok(response)
    }

    /// Follows a payment confirmed outside the quote flow, such as a retry of a
    /// stranded payment. The current session is replaced by a fresh one.
    pub async fn track(&self, response: &ConfirmPaymentResponse) -> Result<(), SdkError> {
        let (payment_id, funding_page_url) = funding_target(response)?;
        let generation = {
            let mut state = self.state();
            if state.torn_down {
                return Err(SdkError::ShutDown);
            }
            Self::supersede(&mut state);
            state.session.selected_quote = None;
            state.generation
        };

        self.begin_funding(generation, response, payment_id, funding_page_url)
            .await;
        Ok(())
    }

    /// Checks the tracked payment right away instead of waiting for the next tick.
    ///
    /// Does nothing when no payment is tracked or it is already funded.
    pub async fn check_status(&self) {
        let target = {
            let state = self.state();
            if state.torn_down || state.session.funded {
                None
            } else {
                state
                    .session
                    .payment_id
                    .clone()
                    .map(|payment_id| (state.generation, payment_id))
            }
        };

        match target {
            Some((generation, payment_id)) => {
                self.poll_once(generation, &payment_id).await;
            }
            None => debug!("No unfunded payment tracked, skipping status check"),
        }
    }

    /// Re-checks the tracked payment whenever the app comes back to the foreground.
    ///
    /// Replaces any earlier subscription. The listener lives until [Self::teardown].
    pub fn subscribe(&self, notifier: &LifecycleNotifier) {
        if self.state().torn_down {
            warn!("Monitor already torn down, not subscribing to lifecycle events");
            return;
        }

        let mut receiver = notifier.subscribe();
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(AppState::Active) => {
                        debug!("App became active");
                        monitor.check_status().await;
                    }
                    Ok(state) => debug!("App state changed to {state}"),
                    Err(RecvError::Lagged(missed)) => {
                        debug!("Missed {missed} lifecycle events");
                        monitor.check_status().await;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        let previous = self
            .inner
            .lifecycle_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Releases the lifecycle listener and the polling loop.
    ///
    /// No network call is made by this monitor afterwards.
    pub fn teardown(&self) {
        let lifecycle_task = self
            .inner
            .lifecycle_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = lifecycle_task {
            handle.abort();
        }

        let mut state = self.state();
        state.torn_down = true;
        if let Some(poller) = state.poller.take() {
            poller.stop();
        }
        info!("Funding monitor torn down");
    }

    /// Stops the current session's loop and starts a new, empty session that
    /// keeps only the selected quote.
    fn supersede(state: &mut MonitorState) {
        if let Some(poller) = state.poller.take() {
            poller.stop();
        }
        state.generation += 1;
        let selected_quote = state.session.selected_quote.take();
        state.session = PaymentSession {
            selected_quote,
            ..Default::default()
        };
    }

    fn fail_confirm(
        &self,
        generation: u64,
        response: Option<ConfirmPaymentResponse>,
        e: &SdkError,
    ) {
        error!("Payment confirmation failed: {e}");
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.session.phase = SessionPhase::ConfirmFailed;
            state.session.confirm_result = response;
            state.session.confirm_error = Some(e.to_string());
        }
        self.inner.event_emitter.emit(&SdkEvent::ConfirmFailed {
            error: e.to_string(),
        });
    }

    async fn begin_funding(
        &self,
        generation: u64,
        response: &ConfirmPaymentResponse,
        payment_id: String,
        funding_page_url: String,
    ) {
        {
            let mut state = self.state();
            if state.torn_down || state.generation != generation {
                warn!("Session was superseded while confirming {payment_id}, not tracking it");
                return;
            }
            state.session.phase = SessionPhase::AwaitingFunding;
            state.session.confirm_result = Some(response.clone());
            state.session.confirm_error = None;
            state.session.payment_id = Some(payment_id.clone());
            state.session.funding_page_url = Some(funding_page_url.clone());
            self.start_polling(&mut state, payment_id.clone());
        }

        info!("Payment {payment_id} confirmed, awaiting funding");
        self.inner.event_emitter.emit(&SdkEvent::PaymentConfirmed {
            payment_id,
            funding_page_url: funding_page_url.clone(),
        });

        if let Err(e) = self.inner.browser.open(&funding_page_url).await {
            error!("Failed to open funding page: {e}");
        }
        // The browser may have been closed after funding completed
        self.check_status().await;
    }

    fn start_polling(&self, state: &mut MonitorState, payment_id: String) {
        if let Some(poller) = state.poller.take() {
            poller.stop();
        }

        let generation = state.generation;
        let (shutdown_sender, mut shutdown_receiver) = watch::channel(());
        let monitor = self.clone();
        let polled_id = payment_id.clone();
        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_receiver.changed() => {
                        info!("Funding poll for {polled_id} shutdown signal received");
                        return;
                    }
                    _ = interval.tick() => {
                        if monitor.poll_once(generation, &polled_id).await {
                            return;
                        }
                    }
                }
            }
        });

        state.poller = Some(PollTask {
            payment_id,
            shutdown_sender,
            handle,
        });
    }

    /// Fetches the status once. Failures are logged and leave the session as is.
    ///
    /// Returns whether the session is funded.
    async fn poll_once(&self, generation: u64, payment_id: &str) -> bool {
        let seq = {
            let mut state = self.state();
            state.status_seq += 1;
            state.status_seq
        };
        match self.inner.api.get_payment_status(payment_id).await {
            Ok(status) => self.apply_status(generation, payment_id, seq, status),
            Err(e) if e.is_transport() => {
                warn!("Funding status of {payment_id} unreachable, retrying next tick: {e}");
                false
            }
            Err(e) => {
                warn!("Funding status check for {payment_id} rejected: {e}");
                false
            }
        }
    }

    /// Writes a status response into the session.
    ///
    /// Responses overtaken by a newer request only count towards funding, so
    /// racing checks converge on the newest observed status.
    fn apply_status(
        &self,
        generation: u64,
        payment_id: &str,
        seq: u64,
        response: PaymentStatusResponse,
    ) -> bool {
        let mut events = Vec::new();
        let (funded, newly_funded) = {
            let mut state = self.state();
            if state.torn_down
                || state.generation != generation
                || state.session.payment_id.as_deref() != Some(payment_id)
            {
                debug!("Ignoring status of superseded payment {payment_id}");
                return false;
            }

            if seq < state.applied_seq {
                debug!("Ignoring out-of-order status of {payment_id}");
            } else {
                state.applied_seq = seq;
                if state.session.status.as_deref() != Some(response.status.as_str()) {
                    events.push(SdkEvent::PaymentStatusChanged {
                        payment_id: payment_id.to_string(),
                        status: response.status.clone(),
                    });
                }
                state.session.status = Some(response.status);
            }

            let newly_funded = response.funded && !state.session.funded;
            if newly_funded {
                state.session.funded = true;
                state.session.phase = SessionPhase::Funded;
                if let Some(poller) = state.poller.take() {
                    poller.stop();
                }
                events.push(SdkEvent::PaymentFunded {
                    payment_id: payment_id.to_string(),
                });
            }
            (state.session.funded, newly_funded)
        };

        if newly_funded {
            info!("Payment {payment_id} funded");
            self.inner.browser.dismiss();
        }
        for event in &events {
            self.inner.event_emitter.emit(event);
        }
        funded
    }
}

/// Payment id and funding page a successful confirm must carry
fn funding_target(response: &ConfirmPaymentResponse) -> Result<(String, String), SdkError> {
    match (response.payment_id.as_deref(), response.funding_page_url()) {
        (Some(payment_id), Some(url)) if !payment_id.is_empty() && !url.is_empty() => {
            Ok((payment_id.to_string(), url.to_string()))
        }
        _ => Err(SdkError::InvalidResponse(format!(
            "confirm response lacks payment_id or funding page: {}",
            response.to_pretty_json()
        ))),
    }
}
