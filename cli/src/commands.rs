use crate::persist::{CliPersistence, CliSettings};
use anyhow::anyhow;
use clap::arg;
use onramp_sdk::models::{
    format_amount, AppState, GetQuotesRequest, DEFAULT_OUTPUT_ASSET, DEFAULT_PRICE_CURRENCY,
};
use onramp_sdk::quote::QuoteState;
use onramp_sdk::OnrampSdk;
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::{Completer, Helper, Hinter, Validator};
use serde::Serialize;
use serde_json::to_string_pretty;
use std::borrow::Cow;
use std::borrow::Cow::Owned;

#[derive(Clone, clap::clap_derive::Parser)]
pub(crate) enum Commands {
    /// Request quotes for a fixed input amount
    Quotes {
        /// The input amount
        #[arg(short = 'm', long, default_value = "100")]
        amount: String,

        /// The input asset
        #[arg(short, long, default_value = DEFAULT_PRICE_CURRENCY)]
        input_asset: String,

        /// The output asset
        #[arg(short, long, default_value = DEFAULT_OUTPUT_ASSET)]
        output_asset: String,
    },

    /// Select a quote of the current batch, selecting it again deselects it
    Select {
        /// The quote's payment id
        payment_id: String,
    },

    /// Confirm the selected quote and open its funding page
    Confirm {
        /// The owner wallet address, defaults to the saved one
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Show the current payment session
    Session {},

    /// Report that the app came back to the foreground
    Foreground {},

    /// List past payments that still hold funds
    Recover {
        /// The owner wallet address, defaults to the saved one
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Get the status of a payment
    PaymentStatus {
        /// The payment id
        payment_id: String,
    },

    /// Get the typed data to sign for a withdrawal
    WithdrawData {
        #[arg(short, long)]
        payment_id: String,

        #[arg(short, long)]
        token: String,

        #[arg(short = 'm', long)]
        amount: String,

        /// The recipient address, defaults to the saved owner address
        #[arg(short, long)]
        recipient: Option<String>,
    },

    /// Submit a signed withdrawal
    WithdrawSubmit {
        #[arg(short, long)]
        payment_id: String,

        #[arg(short, long)]
        token: String,

        #[arg(short = 'm', long)]
        amount: String,

        /// The recipient address, defaults to the saved owner address
        #[arg(short, long)]
        recipient: Option<String>,

        /// The owner's signature over the withdraw typed data
        #[arg(short, long)]
        signature: String,
    },

    /// Request quotes that spend a stranded balance
    RetryQuotes {
        /// The payment holding the balance
        #[arg(short, long)]
        parent_payment_id: String,

        #[arg(short, long)]
        token: String,

        #[arg(short = 'm', long)]
        amount: String,

        #[arg(short, long, default_value = DEFAULT_OUTPUT_ASSET)]
        output_asset: String,
    },

    /// Confirm a retry quote and track its funding
    RetryConfirm {
        #[arg(short, long)]
        payment_id: String,

        /// The state token of the retry quote batch
        #[arg(short, long)]
        state_token: String,

        /// The owner wallet address, defaults to the saved one
        #[arg(short, long)]
        owner: Option<String>,

        /// Only confirm, do not follow the funding
        #[arg(long)]
        no_track: bool,
    },

    /// Save the owner wallet address
    SetOwner {
        address: String,
    },

    /// Save the payment service API key, used from the next start
    SetApiKey {
        api_key: String,
    },

    /// Exit the interactive shell (interactive mode only)
    #[command(hide = true)]
    Exit {},
}

#[derive(Helper, Completer, Hinter, Validator)]
pub(crate) struct CliHelper {
    #[rustyline(Hinter)]
    pub(crate) hinter: HistoryHinter,
}

impl Highlighter for CliHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }
}

#[derive(Serialize)]
pub(crate) struct CommandResult<T: Serialize> {
    pub success: bool,
    pub message: T,
}

macro_rules! command_result {
    ($expr:expr) => {{
        to_string_pretty(&CommandResult {
            success: true,
            message: $expr,
        })?
    }};
}

/// State the shell keeps next to the SDK
pub(crate) struct CliContext {
    pub(crate) persistence: CliPersistence,
    pub(crate) settings: CliSettings,
}

impl CliContext {
    fn owner(&self, owner: Option<String>) -> Result<String, anyhow::Error> {
        owner
            .or_else(|| self.settings.owner_address.clone())
            .ok_or_else(|| anyhow!("No owner address given, use --owner or set-owner"))
    }

    fn save(&self) -> Result<(), anyhow::Error> {
        self.persistence.save_settings(&self.settings)
    }
}

fn print_quotes(sdk: &OnrampSdk) {
    println!(
        "{:<38} {:<16} {:>14} {:>10}",
        "Payment ID", "Method", "You get", "Fees"
    );
    println!("{}", "-".repeat(82));
    for group in sdk.quote_groups() {
        println!("{}", group.onramp);
        for quote in group.quotes {
            println!(
                "{:<38} {:<16} {:>14} {:>10}",
                quote.payment_id,
                quote.method_label(),
                format_amount(&quote.output_amount.amount),
                format!(
                    "{} {}",
                    format_amount(&quote.fees.total_fees),
                    quote.fees.currency_symbol.to_uppercase()
                ),
            );
        }
    }
}

pub(crate) async fn execute_command(
    command: Commands,
    sdk: &OnrampSdk,
    context: &mut CliContext,
) -> Result<String, anyhow::Error> {
    Ok(match command {
        Commands::Quotes {
            amount,
            input_asset,
            output_asset,
        } => {
            let request = GetQuotesRequest {
                input_asset,
                input_amount: amount,
                output_asset,
                price_currency: sdk.config().price_currency.clone(),
                parent_payment_id: None,
            };
            match sdk.fetch_quotes(request).await? {
                QuoteState::NotConfigured => {
                    return Err(anyhow!(
                        "No API key configured, use set-api-key and restart"
                    ))
                }
                QuoteState::Failed(error) => return Err(anyhow!(error)),
                QuoteState::Ready(batch) => {
                    print_quotes(sdk);
                    command_result!(format!(
                        "{} quotes, valid until {}",
                        batch.quotes.len(),
                        batch.accept_by
                    ))
                }
                QuoteState::Idle | QuoteState::Busy => command_result!("No quotes received"),
            }
        }
        Commands::Select { payment_id } => match sdk.select_quote(&payment_id)? {
            Some(quote) => command_result!(quote),
            None => command_result!(format!("Quote {payment_id} deselected")),
        },
        Commands::Confirm { owner } => {
            let owner = context.owner(owner)?;
            let response = sdk.confirm_payment(&owner).await?;
            println!("{}", response.to_pretty_json());
            command_result!("Waiting for funding, use 'session' to follow it")
        }
        Commands::Session {} => command_result!(sdk.payment_session()),
        Commands::Foreground {} => {
            sdk.notify_app_state(AppState::Active);
            command_result!("Foreground reported")
        }
        Commands::Recover { owner } => {
            let owner = context.owner(owner)?;
            let scan = sdk.load_recoverable_payments(&owner).await?;
            command_result!(scan)
        }
        Commands::PaymentStatus { payment_id } => {
            let status = sdk.fetch_payment_status(&payment_id).await?;
            command_result!(status)
        }
        Commands::WithdrawData {
            payment_id,
            token,
            amount,
            recipient,
        } => {
            let recipient = context.owner(recipient)?;
            let typed_data = sdk
                .get_withdraw_typed_data(&payment_id, &token, &amount, &recipient)
                .await?;
            command_result!(typed_data)
        }
        Commands::WithdrawSubmit {
            payment_id,
            token,
            amount,
            recipient,
            signature,
        } => {
            let recipient = context.owner(recipient)?;
            let tx_hash = sdk
                .submit_withdraw(&payment_id, &token, &amount, &recipient, &signature)
                .await?;
            command_result!(tx_hash)
        }
        Commands::RetryQuotes {
            parent_payment_id,
            token,
            amount,
            output_asset,
        } => {
            let batch = sdk
                .fetch_retry_quotes(&parent_payment_id, &token, &amount, &output_asset)
                .await?;
            command_result!(batch)
        }
        Commands::RetryConfirm {
            payment_id,
            state_token,
            owner,
            no_track,
        } => {
            let owner = context.owner(owner)?;
            let response = sdk
                .confirm_retry_payment(&payment_id, &state_token, &owner)
                .await?;
            if !no_track {
                sdk.track_payment(&response).await?;
            }
            command_result!(response)
        }
        Commands::SetOwner { address } => {
            context.settings.owner_address = Some(address);
            context.save()?;
            command_result!("Owner address saved")
        }
        Commands::SetApiKey { api_key } => {
            context.settings.api_key = Some(api_key);
            context.save()?;
            command_result!("API key saved, restart the CLI to use it")
        }
        Commands::Exit {} => {
            command_result!("Exiting...")
        }
    })
}
