//! llm-ws-relay: relay entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config
//!   4. Resolve effective log level (CLI `-v` flags > env > config)
//!   5. Init logger once
//!   6. Build the dispatcher and the push sink
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Start the comms subsystem and wait for it to exit

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use llm_ws_relay::config;
use llm_ws_relay::error::AppError;
use llm_ws_relay::logger;
use llm_ws_relay::relay::{DeliverySink, Dispatcher, HttpPushSink};
use llm_ws_relay::subsystems::comms;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args(std::env::args().skip(1)).map_err(AppError::Config)?;
    if args.help {
        print_help();
        return Ok(());
    }

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.server.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bind = %config.server.bind,
        provider = %config.upstream.provider,
        model = %config.upstream.model,
        default_model = %config.upstream.default_model,
        push_endpoint = %config.push.endpoint,
        prompts = config.prompts.len(),
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let dispatcher = Dispatcher::from_config(&config)?;
    let push_sink: Arc<dyn DeliverySink> = Arc::new(
        HttpPushSink::new(config.push.timeout_seconds)
            .map_err(|e| AppError::Config(e.to_string()))?,
    );

    // Ctrl-C cancels the token; the axum channel and open sockets watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let handle = comms::start(&config, dispatcher, push_sink, shutdown.clone());
    let result = handle.join().await;

    shutdown.cancel();
    info!("relay stopped");
    result
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    help: bool,
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli = CliArgs::default();
    let mut verbosity = 0u8;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => cli.help = true,
            "-f" | "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "-f/--config requires a path argument".to_string())?;
                cli.config_path = Some(path);
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    cli.log_level = logger::level_for_verbosity(verbosity);
    Ok(cli)
}

fn print_help() {
    println!("Usage: llm-ws-relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
    println!();
    println!("Environment:");
    println!("  OPENAI_API_KEY             Upstream credential (required)");
    println!("  API_GW_ENDPOINT            Connection push endpoint (required)");
    println!("  OPENAI_MODEL               Requested model");
    println!("  RELAY_BIND, RELAY_LOG_LEVEL, PROMPT_*");
}
