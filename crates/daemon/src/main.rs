// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `substrated`: the reference host binary wiring the process-fleet
//! controller (substrate-core/adapters/engine/provisioner/router) into a
//! runnable HTTP front end (SPEC_FULL.md §2). Not the host reverse-proxy
//! server from spec.md's Non-goals — a minimal stand-in that terminates
//! HTTP and resolves script paths the way a host file matcher would.

mod config;
mod lifecycle;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use substrate_router::Router;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: substrated [--config <path>]\n\n\
    --config <path>  Load configuration from this TOML file\n\
                      (default: $SUBSTRATE_STATE_DIR/substrate.toml,\n\
                      following the same XDG fallback as the state dir)\n\
    --version        Print the version and exit\n\
    --help           Print this message and exit";

#[derive(Debug)]
enum Args {
    Run { config_path: Option<std::path::PathBuf> },
    Help,
    Version,
}

fn parse_args() -> Result<Args, String> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Args::Help),
            "--version" | "-V" => return Ok(Args::Version),
            "--config" => {
                let path = args.next().ok_or_else(|| "--config requires a path argument".to_string())?;
                config_path = Some(std::path::PathBuf::from(path));
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }
    Ok(Args::Run { config_path })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("substrated: {message}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config_path = match args {
        Args::Help => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Args::Version => {
            println!("substrated {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Args::Run { config_path } => config_path,
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let state_dir = config::resolve_state_dir();
    let config_path = config_path.unwrap_or_else(|| config::Config::default_path(&state_dir));

    let cfg = match config::Config::load(&config_path, state_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("substrated: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let startup = match lifecycle::startup(&cfg).await {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("substrated: startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            eprintln!("substrated: failed to install SIGTERM handler: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(e) => {
            eprintln!("substrated: failed to install SIGINT handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let router = Arc::new(Router::new(Arc::clone(&startup.fleet), cfg.root_dir.clone()));
    let shutdown = CancellationToken::new();

    let serve_handle = tokio::spawn(server::serve(startup.listener, router, shutdown.clone()));

    tracing::info!(addr = %cfg.listen_addr, "substrated listening");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }

    shutdown.cancel();
    let _ = serve_handle.await;
    lifecycle::shutdown(&startup.fleet).await;

    ExitCode::SUCCESS
}
