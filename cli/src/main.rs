mod commands;
mod persist;

use crate::commands::{CliContext, CliHelper};
use crate::persist::CliPersistence;
use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use commands::CommandResult;
use commands::{execute_command, Commands};
use log::{error, info};
use onramp_sdk::error::SdkError;
use onramp_sdk::models::Config;
use onramp_sdk::{EventListener, OnrampSdk, SdkBuilder, SdkEvent};
use onramp_sdk::platform::ExternalBrowser;
use rustyline::error::ReadlineError;
use rustyline::hint::HistoryHinter;
use rustyline::Editor;
use std::io::Write;
use std::sync::Arc;
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(version, about = "CLI client for the Halliday on-ramp SDK", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./.data")]
    data_dir: String,

    /// Payment service API key, overrides HALLIDAY_API_KEY and the saved key
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of the payment service
    #[arg(long)]
    base_url: Option<String>,
}

fn expand_path(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir()
            .map(|home| home.join(stripped))
            .ok_or_else(|| anyhow!("Could not find home directory")),
        None => Ok(PathBuf::from(path)),
    }
}

/// Parse a command string into a Commands enum using clap
fn parse_command(input: &str) -> Result<Commands> {
    // Handle exit command specially since it's not exposed in non-interactive mode
    if input.trim() == "exit" || input.trim() == "quit" {
        return Ok(Commands::Exit {});
    }

    let mut args = vec!["onramp-cli".to_string()];
    args.extend(shlex::split(input).ok_or_else(|| anyhow!("Failed to parse command"))?);

    let cmd = Commands::try_parse_from(&args)?;
    Ok(cmd)
}

struct CliEventListener {}

impl EventListener for CliEventListener {
    fn on_event(&self, event: &SdkEvent) {
        info!("Event received: {:?}", event);
        match event {
            SdkEvent::PaymentStatusChanged { payment_id, status } => {
                println!("\nPayment {payment_id} status: {status}");
            }
            SdkEvent::PaymentFunded { payment_id } => {
                println!("\nPayment {payment_id} is funded");
            }
            _ => {}
        }
    }
}

/// Terminal stand-in for the in-app browser
struct CliBrowser {}

#[async_trait]
impl ExternalBrowser for CliBrowser {
    async fn open(&self, url: &str) -> Result<(), SdkError> {
        writeln!(std::io::stdout(), "Open the funding page to pay: {url}")
            .map_err(|e| SdkError::BrowserError(e.to_string()))
    }
}

fn build_config(cli: &Cli, saved_api_key: Option<String>) -> Config {
    let mut config = Config::from_env();
    if let Some(api_key) = cli.api_key.clone().or(saved_api_key) {
        config.api_key = Config::default_config(Some(api_key)).api_key;
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    config
}

async fn run_interactive_mode(cli: Cli, data_dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&data_dir)?;

    let persistence = CliPersistence {
        data_dir: data_dir.clone(),
    };
    let settings = persistence.load_settings()?;

    let config = build_config(&cli, settings.api_key.clone());
    if !config.is_configured() {
        println!("No API key configured, quotes are disabled. Use set-api-key and restart.");
    }

    OnrampSdk::init_logging(&data_dir.to_string_lossy(), None)?;

    let sdk = SdkBuilder::new(config)
        .browser(Arc::new(CliBrowser {}))
        .build()
        .await?;
    sdk.start()?;

    let _listener_id = sdk.add_event_listener(Box::new(CliEventListener {}));

    let helper = CliHelper {
        hinter: HistoryHinter {},
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    let history_file = persistence.history_file();
    if rl.load_history(&history_file).is_err() {
        error!("Failed to load history");
    }

    let mut context = CliContext {
        persistence,
        settings,
    };

    println!("Welcome to the Halliday on-ramp CLI!");
    println!("Type 'help' to see available commands or 'exit' to quit.");

    loop {
        let readline = rl.readline("onramp> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match parse_command(line) {
                    Ok(cmd) => {
                        if let Commands::Exit {} = cmd {
                            break;
                        }

                        let res = execute_command(cmd, &sdk, &mut context).await;
                        show_results(res)?;
                    }
                    Err(e) => println!("Error parsing command: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(&history_file) {
        error!("Failed to save history: {}", err);
    }

    sdk.disconnect()?;

    Ok(())
}

fn show_results(result: Result<String>) -> Result<()> {
    let result_str = match result {
        Ok(r) => r,
        Err(err) => serde_json::to_string_pretty(&CommandResult {
            success: false,
            message: err.to_string(),
        })?,
    };

    println!("{result_str}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let data_dir = expand_path(&cli.data_dir)?;
    run_interactive_mode(cli, data_dir).await
}
