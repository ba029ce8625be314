// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixture interpreter (spec §6 Worker contract) used by the root
//! integration suite. Invoked as `substrate-test-worker <script_path>
//! <socket_path>`, exactly the way a real interpreter is invoked by
//! `substrate-adapters::worker::RealProcessAdapter`.
//!
//! `script_path`'s content selects the fixture's behavior rather than
//! being executed as code — one directive per first line:
//!
//! - `echo <text>` — respond `<text>` to every request.
//! - `counter` — maintain an in-process `count`, respond `Request #<n>`.
//! - `crash <exit_code>` — exit with the given code before binding.
//! - `slow <millis>` — sleep before binding, then behave like `echo ok`.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Clone)]
enum Directive {
    Echo(String),
    Counter,
    Crash(i32),
    Slow(u64),
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let (Some(script_path), Some(socket_path)) = (args.next(), args.next()) else {
        eprintln!("usage: substrate-test-worker <script_path> <socket_path>");
        return std::process::ExitCode::FAILURE;
    };
    let script_path = PathBuf::from(script_path);
    let socket_path = PathBuf::from(socket_path);

    let directive = parse_directive(&script_path);

    if let Directive::Crash(code) = directive {
        eprintln!("substrate-test-worker: simulated startup failure (exit code {code})");
        tracing::warn!(code, "test worker crashing before bind, as directed");
        return std::process::ExitCode::from(code as u8);
    }

    if let Directive::Slow(millis) = &directive {
        tokio::time::sleep(std::time::Duration::from_millis(*millis)).await;
    }

    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("substrate-test-worker: failed to bind {}: {e}", socket_path.display());
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(socket = %socket_path.display(), "test worker listening");

    let counter = Arc::new(AtomicU64::new(0));
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            eprintln!("substrate-test-worker: failed to install SIGTERM handler: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, exiting");
                break;
            }
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { break };
                let directive = directive.clone();
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| handle(req, directive.clone(), Arc::clone(&counter)));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(error = %e, "connection closed");
                    }
                });
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    std::process::ExitCode::SUCCESS
}

async fn handle(
    _req: Request<Incoming>,
    directive: Directive,
    counter: Arc<AtomicU64>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = match directive {
        Directive::Echo(text) => text,
        Directive::Counter => {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("Request #{n}")
        }
        // `main` exits before the serve loop starts for a crash directive.
        Directive::Slow(_) | Directive::Crash(_) => "ok".to_string(),
    };
    Ok(Response::new(Full::new(Bytes::from(body))))
}

fn parse_directive(script_path: &std::path::Path) -> Directive {
    let content = std::fs::read_to_string(script_path).unwrap_or_default();
    let first_line = content.lines().next().unwrap_or("").trim();
    let mut parts = first_line.splitn(2, ' ');
    match parts.next().unwrap_or("") {
        "echo" => Directive::Echo(parts.next().unwrap_or("").to_string()),
        "counter" => Directive::Counter,
        "crash" => Directive::Crash(parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(1)),
        "slow" => Directive::Slow(parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(500)),
        _ => Directive::Echo("Hello!".to_string()),
    }
}
