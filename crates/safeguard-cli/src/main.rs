//! SafeGuard CLI - submit text to the SafeGuard AI scoring service from a terminal.
//!
//! The CLI is a plain consumer of `safeguard-core`: it logs in and out,
//! shows the session, and sends scans through the authenticated pipeline.
//! Token refresh and retry happen underneath it.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use safeguard_core::models::{
    FraudReport, PredictionResponse, SmsScanRequest, TransactionScanRequest, UrlScanRequest,
    WebsiteScanRequest, DEFAULT_REGISTRY_LIMIT,
};
use safeguard_core::{ApiError, AuthError, Config, RequestPipeline};

/// Set to a directory to also write a daily rolling log file there.
const ENV_LOG_DIR: &str = "SAFEGUARD_LOG_DIR";

const USAGE: &str = "\
Usage: safeguard <command> [args]

Commands:
  login [username]                          Log in (password is prompted)
  logout                                    Log out and forget stored credentials
  whoami                                    Show the current session
  health                                    Check the scoring service
  scan-sms <message> [sender]               Score an SMS body
  scan-url <url> [context]                  Score a URL
  scan-transaction <amount> <merchant> [location]
                                            Score a card transaction
  scan-website <url> [content]              Score a website
  verify <hash>                             Look up a prediction in the fraud registry
  report-fraud <type> <description>         Add a case to the fraud registry
  registry [limit] [offset]                 List reported cases
  chain-status                              Show fraud registry status and totals

Environment:
  SAFEGUARD_API_URL, SAFEGUARD_TIMEOUT_SECS, SAFEGUARD_CREDENTIAL_BACKEND,
  SAFEGUARD_LOG_DIR, RUST_LOG";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "safeguard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env_overrides()?;

    let pipeline = RequestPipeline::from_config(&config).context("Failed to set up API client")?;
    if let Err(e) = pipeline.session().restore() {
        warn!(error = %e, "Could not read stored credentials");
        eprintln!("Warning: could not read stored credentials: {}", e);
    }
    info!(api = config.api_base_url(), command, "SafeGuard CLI starting");

    let rest = &args[1..];
    match command {
        "login" => login(&pipeline, &mut config, rest.first().cloned()).await,
        "logout" => {
            pipeline.session().logout().await;
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&pipeline),
        "health" => {
            let health = pipeline.health().await.map_err(present)?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(())
        }
        "scan-sms" => {
            let Some(message) = rest.first() else {
                bail!("scan-sms needs a message");
            };
            let request = SmsScanRequest {
                sender: rest.get(1).cloned(),
                ..SmsScanRequest::new(message.as_str())
            };
            show(pipeline.predict_sms(&request).await)
        }
        "scan-url" => {
            let Some(url) = rest.first() else {
                bail!("scan-url needs a URL");
            };
            let request = UrlScanRequest {
                context: rest.get(1).cloned(),
                ..UrlScanRequest::new(url.as_str())
            };
            show(pipeline.predict_url(&request).await)
        }
        "scan-transaction" => {
            let (Some(amount), Some(merchant)) = (rest.first(), rest.get(1)) else {
                bail!("scan-transaction needs an amount and a merchant");
            };
            let amount: f64 = amount
                .parse()
                .with_context(|| format!("Invalid amount: {}", amount))?;
            let request = TransactionScanRequest {
                amount,
                merchant: merchant.clone(),
                location: rest.get(2).cloned(),
                user_id: pipeline
                    .session()
                    .get_session()
                    .session
                    .map(|s| s.user_id.to_string()),
            };
            show(pipeline.predict_transaction(&request).await)
        }
        "scan-website" => {
            let Some(url) = rest.first() else {
                bail!("scan-website needs a URL");
            };
            let request = WebsiteScanRequest {
                url: url.clone(),
                content: rest.get(1).cloned(),
                metadata: None,
            };
            show(pipeline.predict_website(&request).await)
        }
        "verify" => {
            let Some(hash) = rest.first() else {
                bail!("verify needs a prediction hash");
            };
            let result = pipeline.verify_prediction(hash).await.map_err(present)?;
            match (result.found, result.block_index) {
                (true, Some(block)) => println!("Recorded in block {} (verified: {})", block, result.verified),
                _ => println!("{}", result.message.as_deref().unwrap_or("Not found in the registry")),
            }
            Ok(())
        }
        "report-fraud" => {
            let (Some(fraud_type), Some(description)) = (rest.first(), rest.get(1)) else {
                bail!("report-fraud needs a type and a description");
            };
            let report = FraudReport {
                reporter_id: pipeline
                    .session()
                    .get_session()
                    .session
                    .map(|s| s.user_id.to_string()),
                ..FraudReport::new(fraud_type.as_str(), description.as_str())
            };
            let receipt = pipeline.report_fraud(&report).await.map_err(present)?;
            println!("{}", receipt.message);
            if let Some(hash) = receipt.hash {
                println!("  case: {}", hash);
            }
            Ok(())
        }
        "registry" => {
            let limit = match rest.first() {
                Some(raw) => raw.parse().with_context(|| format!("Invalid limit: {}", raw))?,
                None => DEFAULT_REGISTRY_LIMIT,
            };
            let offset = match rest.get(1) {
                Some(raw) => raw.parse().with_context(|| format!("Invalid offset: {}", raw))?,
                None => 0,
            };
            let entries = pipeline.fraud_registry(limit, offset).await.map_err(present)?;
            if entries.is_empty() {
                println!("No reported cases.");
            }
            for entry in entries {
                println!("#{} [{}] {} {}", entry.block_index, entry.fraud_type, entry.id, entry.description);
            }
            Ok(())
        }
        "chain-status" => {
            let status = pipeline.blockchain_status().await.map_err(present)?;
            let stats = pipeline.blockchain_stats().await.map_err(present)?;
            println!("status: {}", status.status);
            if let Some(health) = status.network_health {
                println!("health: {}", health);
            }
            println!(
                "blocks: {}  transactions: {}  reports: {}  predictions: {}  pending: {}",
                stats.total_blocks,
                stats.total_transactions,
                stats.fraud_reports,
                stats.predictions,
                stats.pending_transactions
            );
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

async fn login(pipeline: &RequestPipeline, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Email: ")?,
    };
    if username.is_empty() {
        bail!("A username is required");
    }
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;

    match pipeline.session().login(&username, &password).await {
        Ok(session) => {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Logged in as {} (user {})", session.email, session.user_id);
            Ok(())
        }
        Err(AuthError::Authentication(message)) => bail!("{}", message),
        Err(AuthError::Transport(e)) => bail!("{}", e.user_message()),
        Err(e) => Err(e.into()),
    }
}

fn whoami(pipeline: &RequestPipeline) -> Result<()> {
    let snapshot = pipeline.session().get_session();
    match snapshot.session {
        Some(session) if snapshot.is_authenticated() => {
            println!("{} (user {})", session.email, session.user_id);
            println!("token age: {}m", session.token_age_minutes());
        }
        _ => println!("Not logged in ({})", snapshot.state),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn show(result: Result<PredictionResponse, ApiError>) -> Result<()> {
    let prediction = result.map_err(present)?;
    let verdict = if prediction.is_fraud { "LIKELY FRAUD" } else { "looks safe" };
    println!("{}", verdict);
    println!("  risk score: {:.2}", prediction.risk_score);
    println!("  confidence: {:.0}%", prediction.confidence * 100.0);
    println!("  {}", prediction.explanation);
    if let Some(hash) = prediction.blockchain_hash {
        println!("  record: {}", hash);
    }
    Ok(())
}

/// Turn a pipeline error into what the user should read.
fn present(err: ApiError) -> anyhow::Error {
    warn!(error = %err, "Request failed");
    anyhow::anyhow!(err.user_message())
}
