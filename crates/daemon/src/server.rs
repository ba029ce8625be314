// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP front end standing in for the host reverse-proxy server (spec
//! §1 Non-goals, SPEC_FULL.md §2): terminates HTTP/1.1 on a TCP socket,
//! hands every request to [`Router::round_trip`], and preserves
//! `Upgrade` passthrough by serving each inbound connection
//! `with_upgrades()` — the caller-side counterpart of the upgrade
//! handling `substrate-router` already does on the worker-socket side.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use substrate_adapters::RealProcessAdapter;
use substrate_router::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Accept connections until `shutdown` is cancelled, proxying each
/// request through `router`. Returns once the listener is done and every
/// spawned connection task has been asked to stop (in-flight requests
/// are not forcibly cut short; the caller is expected to additionally
/// drain the Fleet via `lifecycle::shutdown`).
pub async fn serve(listener: TcpListener, router: Arc<Router<RealProcessAdapter>>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("listener shutting down");
                return;
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |request| {
                        let router = Arc::clone(&router);
                        async move { Ok::<_, std::convert::Infallible>(router.round_trip(request, peer_addr.ip()).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).with_upgrades().await {
                        tracing::debug!(error = %e, peer = %peer_addr, "connection closed");
                    }
                });
            }
        }
    }
}
