//! mailconsole - command-line client for the mail and organization console.

#![deny(clippy::all)]

mod cli;

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use mailconsole::notify::{NoticeLevel, Notifier};
use mailconsole::{settings, Config};

fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only complain if it exists but is unreadable
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            eprintln!("\nCheck MAILCONSOLE_API_URL, MAILCONSOLE_STORE and MAILCONSOLE_HTTP_TIMEOUT.");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);
    info!("Starting mailconsole v{}", env!("CARGO_PKG_VERSION"));
    debug!("API base URL: {}", config.api.base_url);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: Config) -> ExitCode {
    let (notifier, mut notices) = Notifier::channel();

    // Notices go to stderr so stdout stays machine-readable.
    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Info => eprintln!("{}", notice.message),
                NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            }
        }
    });

    let result = tokio::select! {
        result = cli::run(cli.command, &config, notifier) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            eprintln!("Interrupted");
            return ExitCode::from(130);
        }
    };

    // Every sender is gone once the command finished, so this drains and ends.
    let _ = printer.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {}", e.user_message());
            if e.requires_sign_out() {
                eprintln!("Run `mailconsole login <username>` to sign in.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing/logging into the log directory, falling back to stderr.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match open_log_file(&config.logging.log_dir) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .init(),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {:#}", e);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
}

fn open_log_file(log_dir: &str) -> Result<std::fs::File> {
    let dir = settings::init_log_directory(log_dir).context("Could not create log directory")?;
    let path = dir.join("mailconsole.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Could not open {:?}", path))
}
