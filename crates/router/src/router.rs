// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request Router (spec §4.7): resolves a script path from the inbound
//! request, gets-or-starts its worker via the Fleet, and proxies the
//! request to it over a UNIX socket as a real HTTP/1.1 round trip,
//! preserving `Upgrade` semantics.
//!
//! Framing follows the teacher's hand-rolled UNIX-socket HTTP client
//! (`crates/daemon/src/adapters/agent/coop/http.rs`): connect, send,
//! read a framed response. Here the connect/send/read is delegated to
//! `hyper`'s HTTP/1 client machinery over a `tokio::net::UnixStream`
//! instead of hand-parsed status lines, since the Router must proxy
//! arbitrary methods/headers/bodies byte-for-byte rather than a fixed
//! internal API shape.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use substrate_adapters::{ProcessAdapter, RealProcessAdapter};
use substrate_core::RoundTripError;
use substrate_engine::Fleet;

use crate::format::{format_failure, Failure};

/// Request header carrying the host server's resolved absolute script
/// path (spec §4.7 step 1). Falls back to joining the URL path under
/// `root_dir` when absent.
pub const SCRIPT_PATH_HEADER: &str = "x-substrate-script-path";

pub type BoxedBody = BoxBody<Bytes, hyper::Error>;

/// Implements the controller's single entry point, `round_trip` (spec
/// §6 Host-server boundary).
pub struct Router<P: ProcessAdapter = RealProcessAdapter> {
    fleet: Arc<Fleet<P>>,
    root_dir: Option<PathBuf>,
}

impl<P: ProcessAdapter> Router<P> {
    pub fn new(fleet: Arc<Fleet<P>>, root_dir: Option<PathBuf>) -> Self {
        Self { fleet, root_dir }
    }

    /// spec §4.7: derive `script_key`, obtain a socket, proxy the
    /// request, bump `last_used` or tear down on one-shot success.
    pub async fn round_trip(
        &self,
        request: Request<Incoming>,
        caller_addr: IpAddr,
    ) -> Response<BoxedBody> {
        let script_path = match self.resolve_script_path(&request) {
            Some(path) => path,
            None => return text_response(StatusCode::NOT_FOUND, "no script matched this request\n"),
        };

        let socket_path = match self.fleet.get_socket(&script_path).await {
            Ok(socket) => socket,
            Err(err) => {
                let failure: Failure = err.into();
                return error_response(&failure, caller_addr);
            }
        };

        match proxy_over_socket(&socket_path, request).await {
            Ok(response) => {
                self.fleet.note_used(&script_path);
                if matches!(self.fleet.idle_timeout(), substrate_core::IdleTimeout::OneShot) {
                    let fleet = Arc::clone(&self.fleet);
                    let script_path = script_path.clone();
                    tokio::spawn(async move {
                        fleet.stop_and_remove(&script_path);
                    });
                }
                response
            }
            Err(err) => {
                tracing::warn!(script = %script_path.display(), error = %err, "round trip to worker failed");
                let failure: Failure = err.into();
                error_response(&failure, caller_addr)
            }
        }
    }

    /// spec §4.7 step 1: prefer the host-supplied script path header,
    /// else join the request's URL path under a configured root.
    fn resolve_script_path(&self, request: &Request<Incoming>) -> Option<PathBuf> {
        if let Some(header) = request.headers().get(SCRIPT_PATH_HEADER) {
            let value = header.to_str().ok()?;
            return Some(PathBuf::from(value));
        }

        let root = self.root_dir.as_ref()?;
        let url_path = request.uri().path().trim_start_matches('/');
        Some(root.join(url_path))
    }
}

/// Dial `socket_path`, perform one HTTP/1 round trip, and splice the
/// connection through on an `Upgrade` response so WebSocket frames flow
/// bidirectionally after the handshake (spec §4.7 step 3, §8 "WebSocket
/// upgrade").
async fn proxy_over_socket(
    socket_path: &Path,
    mut request: Request<Incoming>,
) -> Result<Response<BoxedBody>, RoundTripError> {
    let stream = tokio::net::UnixStream::connect(socket_path)
        .await
        .map_err(|e| RoundTripError(format!("connect failed: {e}")))?;
    let io = TokioIo::new(stream);

    let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| RoundTripError(format!("handshake failed: {e}")))?;

    let wants_upgrade = request.headers().contains_key(http::header::UPGRADE);
    let caller_upgrade = if wants_upgrade { Some(hyper::upgrade::on(&mut request)) } else { None };

    let conn_task = tokio::spawn(connection.with_upgrades());

    let mut response = sender
        .send_request(request)
        .await
        .map_err(|e| RoundTripError(format!("request failed: {e}")))?;

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(caller_upgrade) = caller_upgrade {
            let worker_upgrade = hyper::upgrade::on(&mut response);
            tokio::spawn(async move {
                match tokio::try_join!(caller_upgrade, worker_upgrade) {
                    Ok((caller_io, worker_io)) => {
                        let mut caller_io = TokioIo::new(caller_io);
                        let mut worker_io = TokioIo::new(worker_io);
                        if let Err(e) =
                            tokio::io::copy_bidirectional(&mut caller_io, &mut worker_io).await
                        {
                            tracing::debug!(error = %e, "upgraded connection closed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to complete protocol upgrade"),
                }
            });
            let (parts, _incoming) = response.into_parts();
            return Ok(Response::from_parts(parts, empty_body()));
        }
    }

    let (parts, body) = response.into_parts();
    let collected = body.collect().await.map_err(|e| RoundTripError(format!("failed to read response body: {e}")))?;
    let bytes = collected.to_bytes();
    conn_task.abort();
    Ok(Response::from_parts(parts, full_body(bytes)))
}

fn error_response(failure: &Failure, caller_addr: IpAddr) -> Response<BoxedBody> {
    let (status, content_type, body) = format_failure(failure, caller_addr);
    let mut response = Response::new(full_body(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(content_type),
    );
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<BoxedBody> {
    let mut response = Response::new(full_body(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn full_body(bytes: Bytes) -> BoxedBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

fn empty_body() -> BoxedBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
