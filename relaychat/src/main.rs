//! `relaychat` terminal chat client.
//!
//! Connects to a chat server over WebSocket, registers an identity, and
//! runs the console loop. Private messages are encrypted by the crypto
//! provider before they leave the process. Configuration via CLI flags,
//! environment variables, or config file
//! (`~/.config/relaychat/config.toml`).
//!
//! ```bash
//! cargo run --bin relaychat -- -s 127.0.0.1 -p 8886 -u alice
//!
//! # Or via environment variables
//! RELAYCHAT_SERVER=127.0.0.1 RELAYCHAT_PORT=8886 RELAYCHAT_USERNAME=alice cargo run
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use tracing_appender::non_blocking::WorkerGuard;

use relaychat::chat::Pipeline;
use relaychat::config::{CliArgs, ClientConfig, SessionTarget};
use relaychat::console::Console;
use relaychat::crypto::CryptoProvider;
use relaychat::crypto::stub::StubProvider;
use relaychat::net;
use relaychat::transport::websocket::{WebSocketTransport, actions_url};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let target = match config.session_target() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        server = %target.server,
        port = target.port,
        user = %target.username,
        "relaychat starting"
    );

    let code = run(&config, &target).await;
    tracing::info!("relaychat exiting");
    code
}

/// Initialize file-based logging.
///
/// Logs go to a file; the terminal belongs to the chat feed. The returned
/// [`WorkerGuard`] must live until shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("relaychat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Provider login, transport connect, then the console loop.
async fn run(config: &ClientConfig, target: &SessionTarget) -> ExitCode {
    let crypto = Arc::new(StubProvider::new());
    if let Err(step) = start_provider(&crypto, config, &target.username).await {
        eprintln!("Error: crypto provider {step} failed");
        return ExitCode::FAILURE;
    }

    let url = match actions_url(&target.server, target.port) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let transport = match WebSocketTransport::connect(url, config.connect_options()).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("Error: could not connect to chat server: {e}");
            crypto.disconnect();
            crypto.shutdown();
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::new(
        target.username.clone(),
        crypto,
        transport,
        Console::stdout(),
        config.pipeline_options(),
    );

    if let Err(e) = pipeline.shared_dir().ensure().await {
        tracing::warn!(error = %e, "could not create shared directory");
    }
    if let Err(e) = pipeline.register().await {
        eprintln!("Error: could not register with chat server: {e}");
        pipeline.shutdown().await;
        return ExitCode::FAILURE;
    }

    let receiver = net::spawn_receive_loop(&pipeline);
    let lines = net::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let end = net::run_input_loop(&pipeline, lines).await;
    tracing::info!(?end, "session ended");

    pipeline.shutdown().await;
    let _ = receiver.await;
    println!("Goodbye!");

    if end.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Bring the provider up. Returns the name of the failed step.
async fn start_provider(
    crypto: &Arc<StubProvider>,
    config: &ClientConfig,
    identity: &str,
) -> Result<(), &'static str> {
    let crypto = Arc::clone(crypto);
    let password = config.crypto.password.clone();
    let identity = identity.to_string();
    tracing::debug!(
        server = %config.crypto.server,
        port = config.crypto.port,
        device = ?config.crypto.device,
        "starting crypto provider"
    );
    tokio::task::spawn_blocking(move || {
        if !crypto.initialize() {
            return Err("initialize");
        }
        if !crypto.login(&identity, &password) {
            return Err("login");
        }
        if !crypto.connect() {
            return Err("connect");
        }
        Ok(())
    })
    .await
    .map_err(|_| "startup")?
}
