use crate::error::SdkError;
use crate::models::AppState;
use async_trait::async_trait;
use log::info;
use tokio::sync::broadcast;

/// Surface that shows the funding page outside the app
#[async_trait]
pub trait ExternalBrowser: Send + Sync {
    /// Opens `url`.
    ///
    /// On platforms where the browser is an overlay this resolves once the user
    /// closes it. Elsewhere it may resolve right away.
    async fn open(&self, url: &str) -> Result<(), SdkError>;

    /// Closes the overlay. A no-op where the browser cannot be dismissed.
    fn dismiss(&self) {}
}

/// Browser that only logs the funding page URL
#[derive(Default)]
pub struct LogOnlyBrowser;

#[async_trait]
impl ExternalBrowser for LogOnlyBrowser {
    async fn open(&self, url: &str) -> Result<(), SdkError> {
        info!("Funding page ready: {url}");
        Ok(())
    }
}

/// Publishes the host application's foreground/background transitions
#[derive(Clone)]
pub struct LifecycleNotifier {
    sender: broadcast::Sender<AppState>,
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Reports a transition. Returns the number of subscribers that will see it.
    pub fn notify(&self, state: AppState) -> usize {
        self.sender.send(state).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppState> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
