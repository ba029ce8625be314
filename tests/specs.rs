// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage of spec.md §8's six concrete scenarios, driving a
//! real `Fleet` + `Router` against `substrate-test-worker` fixture
//! processes. No real TCP listener is needed: `Router::round_trip`
//! already accepts an arbitrary caller address, so the trusted/untrusted
//! diagnostics scenario is exercised directly rather than by spoofing a
//! socket peer address.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::server::conn::http1 as server_http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use substrate_adapters::RealProcessAdapter;
use substrate_core::{ControllerConfig, IdleTimeout};
use substrate_engine::Fleet;
use substrate_router::Router;
use tempfile::tempdir;

fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn public() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))
}

fn interpreter_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_substrate-test-worker"))
}

fn write_script(dir: &Path, name: &str, directive: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, directive).expect("write fixture script");
    path
}

fn fleet_with(config: ControllerConfig, runtime_dir: PathBuf) -> Arc<Fleet<RealProcessAdapter>> {
    let adapter = Arc::new(RealProcessAdapter);
    let clock = Arc::new(substrate_core::SystemClock);
    Fleet::new(config, runtime_dir, interpreter_path(), adapter, clock)
}

/// Build a real `Request<Incoming>` the same way `substrate-router`'s own
/// unit tests do: run a throwaway HTTP/1 server over an in-memory duplex
/// stream and capture the request it parses, since `hyper::body::Incoming`
/// has no public constructor.
async fn incoming_request(method: &str, uri: &str) -> Request<Incoming> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));

    tokio::spawn(async move {
        let io = TokioIo::new(server_io);
        let service = service_fn(move |req: Request<Incoming>| {
            if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = tx.send(req);
            }
            async { Ok::<_, Infallible>(Response::new(Empty::<Bytes>::new())) }
        });
        let _ = server_http1::Builder::new().serve_connection(io, service).await;
    });

    let (mut sender, conn) =
        hyper::client::conn::http1::handshake(TokioIo::new(client_io)).await.expect("client handshake");
    tokio::spawn(conn);

    let request = Request::builder().method(method).uri(uri).body(Empty::<Bytes>::new()).expect("build request");
    let _ = sender.send_request(request).await;

    rx.await.expect("server captured the forwarded request")
}

async fn body_text(response: Response<substrate_router::router::BoxedBody>) -> (StatusCode, String) {
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("collect response body").to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn get(router: &Router<RealProcessAdapter>, script_path: &Path, caller: IpAddr) -> (StatusCode, String) {
    let request = incoming_request(
        "GET",
        &format!("/{}", script_path.file_name().expect("file name").to_string_lossy()),
    )
    .await;
    let request = {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            substrate_router::SCRIPT_PATH_HEADER,
            script_path.to_str().expect("utf8 script path").parse().expect("header value"),
        );
        Request::from_parts(parts, body)
    };
    body_text(router.round_trip(request, caller).await).await
}

#[tokio::test]
async fn scenario_1_hello() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "hello.js", "echo Hello!");
    let fleet = fleet_with(ControllerConfig { idle_timeout: IdleTimeout::Never, ..ControllerConfig::default() }, dir.path().to_path_buf());
    let router = Router::new(fleet, None);

    let (status, body) = get(&router, &script, loopback()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello!");
}

#[tokio::test]
async fn scenario_2_process_reuse() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "counter.js", "counter");
    let fleet = fleet_with(ControllerConfig { idle_timeout: IdleTimeout::Never, ..ControllerConfig::default() }, dir.path().to_path_buf());
    let router = Router::new(fleet, None);

    for expected in 1..=4 {
        let (status, body) = get(&router, &script, loopback()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("Request #{expected}"));
    }
}

#[tokio::test]
async fn scenario_3_one_shot_resets_per_process_state() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "counter.js", "counter");
    let fleet = fleet_with(ControllerConfig { idle_timeout: IdleTimeout::OneShot, ..ControllerConfig::default() }, dir.path().to_path_buf());
    let router = Router::new(fleet, None);

    let (status_a, body_a) = get(&router, &script, loopback()).await;
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(body_a, "Request #1");

    // Give the post-response `stop_and_remove` (spawned, non-blocking per
    // spec §4.7 step 5) time to tear the worker down before the next
    // request cold-starts a fresh one.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status_b, body_b) = get(&router, &script, loopback()).await;
    assert_eq!(status_b, StatusCode::OK);
    // A reused process would answer "Request #2"; one-shot mode must
    // always hand the next request a fresh counter.
    assert_eq!(body_b, "Request #1");
}

#[tokio::test]
async fn scenario_4_startup_timeout() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "slow.js", "slow 500");
    let config = ControllerConfig {
        idle_timeout: IdleTimeout::Never,
        startup_timeout: Duration::from_millis(200),
        max_start_attempts: 1,
        ..ControllerConfig::default()
    };
    let fleet = fleet_with(config, dir.path().to_path_buf());
    let router = Router::new(fleet, None);

    let (status, body) = get(&router, &script, loopback()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Process startup failed"), "body was: {body}");
    assert!(body.contains("timeout"), "body was: {body}");
}

#[tokio::test]
async fn scenario_5_crash_on_startup_trusted_vs_untrusted() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "crash.js", "crash 1");
    let config = ControllerConfig { idle_timeout: IdleTimeout::Never, max_start_attempts: 1, ..ControllerConfig::default() };
    let fleet = fleet_with(config, dir.path().to_path_buf());
    let router = Router::new(fleet, None);

    let (status, body) = get(&router, &script, loopback()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Exit code: 1"), "body was: {body}");
    assert!(body.contains("simulated startup failure"), "body was: {body}");

    let (status, body) = get(&router, &script, public()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.contains("Exit code"), "body leaked diagnostics: {body}");
    assert!(!body.contains("simulated startup failure"), "body leaked diagnostics: {body}");
}

#[tokio::test]
async fn scenario_6_concurrent_requests_to_same_script() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "counter.js", "counter");
    let fleet = fleet_with(ControllerConfig { idle_timeout: IdleTimeout::Never, ..ControllerConfig::default() }, dir.path().to_path_buf());
    let router = Arc::new(Router::new(fleet, None));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = Arc::clone(&router);
        let script = script.clone();
        handles.push(tokio::spawn(async move { get(&router, &script, loopback()).await }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.expect("task panicked");
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }
    bodies.sort();

    let expected: Vec<String> = (1..=8).map(|n| format!("Request #{n}")).collect();
    assert_eq!(bodies, expected);
}
