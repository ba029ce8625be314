// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error Formatter (spec §4.8): renders a controller failure as a 502
//! response, attaching diagnostics only for trusted (loopback/private)
//! callers.

use std::fmt;
use std::net::IpAddr;

use http::StatusCode;
use substrate_core::{FleetError, Phase, RoundTripError};

/// Unifies every failure kind the Router can observe (spec §4.8):
/// everything `Fleet::get_socket` can return, plus a failed in-flight
/// round trip to an already-Ready worker.
#[derive(Debug, Clone)]
pub enum Failure {
    Fleet(FleetError),
    RoundTrip(RoundTripError),
}

impl From<FleetError> for Failure {
    fn from(err: FleetError) -> Self {
        Failure::Fleet(err)
    }
}

impl From<RoundTripError> for Failure {
    fn from(err: RoundTripError) -> Self {
        Failure::RoundTrip(err)
    }
}

impl Failure {
    pub fn phase(&self) -> Phase {
        match self {
            Failure::Fleet(e) => e.phase(),
            Failure::RoundTrip(_) => Phase::Running,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Failure::Fleet(e) => e.exit_code(),
            Failure::RoundTrip(_) => None,
        }
    }

    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Failure::Fleet(e) => e.stderr_tail(),
            Failure::RoundTrip(_) => None,
        }
    }

    fn is_startup_timeout(&self) -> bool {
        matches!(self, Failure::Fleet(FleetError::StartupTimeout(_)))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Fleet(e) => write!(f, "{e}"),
            Failure::RoundTrip(e) => write!(f, "{e}"),
        }
    }
}

/// The private/loopback CIDR allowlist from spec §4.8.
fn is_trusted(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
                || (octets[0] == 169 && octets[1] == 254)
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || (segments[0] & 0xffc0) == 0xfe80 // fe80::/10
                || (segments[0] & 0xfe00) == 0xfc00 // fc00::/7
        }
    }
}

/// Render `failure` as the (status, content-type, body) the Router
/// should return (spec §4.8). Diagnostics (exit code, stderr tail) are
/// included only when `caller_addr` is trusted.
pub fn format_failure(failure: &Failure, caller_addr: IpAddr) -> (StatusCode, &'static str, String) {
    let body = if is_trusted(caller_addr) { render_trusted(failure) } else { render_untrusted() };
    (StatusCode::BAD_GATEWAY, "text/plain; charset=utf-8", body)
}

fn render_trusted(failure: &Failure) -> String {
    let mut body = format!("Process startup failed: {failure}\n");
    if failure.is_startup_timeout() {
        body.push_str("Reason: timeout\n");
    }
    if let Some(code) = failure.exit_code() {
        body.push_str(&format!("Exit code: {code}\n"));
    }
    if let Some(tail) = failure.stderr_tail() {
        if !tail.is_empty() {
            body.push_str(tail);
            if !tail.ends_with('\n') {
                body.push('\n');
            }
        }
    }
    body
}

fn render_untrusted() -> String {
    "Bad Gateway\n".to_string()
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
