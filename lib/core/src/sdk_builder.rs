use crate::api::{PaymentApi, RestClient};
use crate::error::SdkError;
use crate::models::Config;
use crate::platform::{ExternalBrowser, LifecycleNotifier, LogOnlyBrowser};
use crate::OnrampSdk;
use std::sync::Arc;

/// Builder for creating and configuring an OnrampSdk instance
pub struct SdkBuilder {
    config: Config,
    payment_api: Option<Arc<dyn PaymentApi>>,
    browser: Option<Arc<dyn ExternalBrowser>>,
    lifecycle_notifier: Option<LifecycleNotifier>,
}

impl SdkBuilder {
    /// Creates a new SdkBuilder with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            payment_api: None,
            browser: None,
            lifecycle_notifier: None,
        }
    }

    /// Sets a custom payment API. Defaults to the REST client for `config.base_url`.
    ///
    /// # Arguments
    ///
    /// * `payment_api` - The payment API implementation
    ///
    /// # Returns
    ///
    /// The updated SdkBuilder instance
    pub fn payment_api(mut self, payment_api: Arc<dyn PaymentApi>) -> Self {
        self.payment_api = Some(payment_api);
        self
    }

    /// Sets the surface that opens funding pages. Defaults to [LogOnlyBrowser].
    pub fn browser(mut self, browser: Arc<dyn ExternalBrowser>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Shares a lifecycle notifier owned by the host application
    pub fn lifecycle_notifier(mut self, notifier: LifecycleNotifier) -> Self {
        self.lifecycle_notifier = Some(notifier);
        self
    }

    /// Builds the OnrampSdk instance
    ///
    /// # Returns
    ///
    /// A Result containing either the OnrampSdk or an SdkError
    pub async fn build(self) -> Result<OnrampSdk, SdkError> {
        let payment_api = match self.payment_api {
            Some(payment_api) => payment_api,
            None => Arc::new(RestClient::new(&self.config)?),
        };
        let browser = self
            .browser
            .unwrap_or_else(|| Arc::new(LogOnlyBrowser));
        let lifecycle_notifier = self.lifecycle_notifier.unwrap_or_default();

        Ok(OnrampSdk::new(
            self.config,
            payment_api,
            browser,
            lifecycle_notifier,
        ))
    }
}
