use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use windowgate::config::WindowgateConfig;
use windowgate::{FixedWindow, RateLimitInfo, RedisStore, WindowError};

/// Exit code reported when an increment was refused by the limiter.
const LIMITED_EXIT_CODE: u8 = 2;

/// Inspect and drive fixed window rate limits stored in Redis.
#[derive(Debug, Parser)]
#[command(name = "windowgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print window state as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current state of a window
    Info {
        /// Resource identifier
        resource: String,
    },
    /// Add units to a window
    Increment {
        /// Resource identifier
        resource: String,
        /// Units to add
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,
    },
    /// Close a window, restoring its full limit
    Clear {
        /// Resource identifier
        resource: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = WindowgateConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    let limits = config
        .limits
        .to_limit_config()
        .context("invalid limit configuration")?;
    debug!(
        key_prefix = %config.store.key_prefix,
        limit = limits.limit(),
        duration = ?limits.duration(),
        "Configuration loaded"
    );

    let store = RedisStore::connect(&config.store.url)
        .await
        .with_context(|| format!("failed to connect to {}", config.store.url))?;
    let store = Arc::new(store);

    let resource = match &cli.command {
        Command::Info { resource }
        | Command::Increment { resource, .. }
        | Command::Clear { resource } => resource,
    };
    let limiter = FixedWindow::with_prefix(&config.store.key_prefix, resource, limits, store);

    match cli.command {
        Command::Info { .. } => {
            let info = limiter.info().await?;
            print_info(&info, cli.json)?;
        }
        Command::Increment { count, .. } => match limiter.increment(count).await {
            Ok(info) => print_info(&info, cli.json)?,
            Err(WindowError::Limited(limited)) => {
                info!(key = %limiter.key(), reason = ?limited.reason, "Increment refused");
                eprintln!("limited: {}", limited);
                print_info(&limited.info, cli.json)?;
                return Ok(ExitCode::from(LIMITED_EXIT_CODE));
            }
            Err(e) => return Err(e.into()),
        },
        Command::Clear { .. } => {
            limiter.reset().await?;
            info!(key = %limiter.key(), "Window cleared");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_info(info: &RateLimitInfo, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }

    println!("limit:       {}", info.limit);
    println!("remaining:   {}", info.remaining);
    println!("reset_after: {}", describe(info.reset_after)?);
    println!("retry_after: {}", describe(info.retry_after)?);
    Ok(())
}

/// Render a duration along with the wall-clock instant it ends.
fn describe(after: Option<std::time::Duration>) -> anyhow::Result<String> {
    let Some(after) = after else {
        return Ok("-".to_string());
    };
    let at = chrono::Utc::now() + chrono::Duration::from_std(after)?;
    Ok(format!("{:.3}s (at {})", after.as_secs_f64(), at.to_rfc3339()))
}
