use crate::error::SdkError;
use async_trait::async_trait;
use serde_json::Value;

/// Wallet capability the SDK relies on for withdrawals.
///
/// Key management and the signing scheme stay inside the wallet provider.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address the wallet signs for
    fn address(&self) -> String;

    /// Signs the typed data returned by the withdraw endpoint
    async fn sign_typed_data(&self, typed_data: &Value) -> Result<String, SdkError>;
}
