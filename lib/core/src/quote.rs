use crate::api::PaymentApi;
use crate::events::{EventEmitter, SdkEvent};
use crate::models::{GetQuotesRequest, QuoteBatch, QuoteGroup};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the caller currently sees of the quote request
#[derive(Clone, Debug, PartialEq, Default)]
pub enum QuoteState {
    /// No credential is configured, so quotes are never requested
    NotConfigured,
    /// Nothing fetched yet
    #[default]
    Idle,
    /// A request is in flight
    Busy,
    /// The last request failed. Kept until the next fetch.
    Failed(String),
    /// The newest batch
    Ready(QuoteBatch),
}

impl QuoteState {
    pub fn is_busy(&self) -> bool {
        matches!(self, QuoteState::Busy)
    }

    pub fn batch(&self) -> Option<&QuoteBatch> {
        match self {
            QuoteState::Ready(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QuoteState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Default)]
struct QuoteSlot {
    state: QuoteState,
    /// Bumped on every fetch so that only the newest response is kept
    generation: u64,
    last_request: Option<GetQuotesRequest>,
    /// Newest batch received, kept while a later fetch is busy or failed
    last_batch: Option<QuoteBatch>,
}

/// Fetches fixed-input quotes and holds the newest result
pub struct QuoteAcquisition {
    api: Arc<dyn PaymentApi>,
    event_emitter: Arc<EventEmitter>,
    slot: Mutex<QuoteSlot>,
}

impl QuoteAcquisition {
    pub fn new(api: Arc<dyn PaymentApi>, event_emitter: Arc<EventEmitter>) -> Self {
        let state = if api.is_configured() {
            QuoteState::Idle
        } else {
            QuoteState::NotConfigured
        };
        Self {
            api,
            event_emitter,
            slot: Mutex::new(QuoteSlot {
                state,
                ..Default::default()
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, QuoteSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> QuoteState {
        self.slot().state.clone()
    }

    pub fn is_configured(&self) -> bool {
        self.api.is_configured()
    }

    /// The newest batch received, even while a later fetch is busy or has failed
    pub fn batch(&self) -> Option<QuoteBatch> {
        self.slot().last_batch.clone()
    }

    /// Quotes of the newest batch grouped by on-ramp
    pub fn groups(&self) -> Vec<QuoteGroup> {
        self.slot()
            .last_batch
            .as_ref()
            .map(QuoteBatch::grouped_by_onramp)
            .unwrap_or_default()
    }

    /// Requests a new batch and returns the resulting state.
    ///
    /// Without a credential no request is made and [QuoteState::NotConfigured]
    /// is returned. When fetches overlap, only the newest one updates the state.
    pub async fn fetch(&self, request: GetQuotesRequest) -> QuoteState {
        if !self.api.is_configured() {
            let mut slot = self.slot();
            slot.state = QuoteState::NotConfigured;
            return slot.state.clone();
        }

        let generation = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.state = QuoteState::Busy;
            slot.last_request = Some(request.clone());
            slot.generation
        };

        info!(
            "Requesting quotes for {} {} -> {}",
            request.input_amount, request.input_asset, request.output_asset
        );
        let result = self.api.get_quotes(&request).await;

        let state = {
            let mut slot = self.slot();
            if slot.generation != generation {
                debug!("Discarding quote response superseded by a newer fetch");
                return slot.state.clone();
            }
            slot.state = match result {
                Ok(batch) => {
                    info!("Received {} quotes", batch.quotes.len());
                    slot.last_batch = Some(batch.clone());
                    QuoteState::Ready(batch)
                }
                Err(e) => {
                    warn!("Quote request failed: {e}");
                    QuoteState::Failed(e.to_string())
                }
            };
            slot.state.clone()
        };

        if let QuoteState::Ready(batch) = &state {
            self.event_emitter.emit(&SdkEvent::QuotesUpdated {
                quote_count: batch.quotes.len(),
            });
        }
        state
    }

    /// Repeats the last request, or the default request if nothing was fetched yet
    pub async fn refetch(&self) -> QuoteState {
        let request = self.slot().last_request.clone().unwrap_or_default();
        self.fetch(request).await
    }
}
