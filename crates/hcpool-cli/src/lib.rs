//! # hcpool CLI
//!
//! Helpers behind the `hcpool` binary:
//!
//! - **Request building**: turns `--method`, `--header name:value` and
//!   `--body` flags into a [`Request`]
//! - **Bench runs**: fires a spaced series of timed requests at a pool and
//!   tallies the outcomes through future listeners into a [`BenchReport`]

use anyhow::{anyhow, bail, Result};
use hcpool_client::{ClientPool, PoolStatsSnapshot};
use hcpool_common::{Method, PoolError, Request};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Splits a `name:value` header flag.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header '{}': expected name:value", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Builds a request from command-line flags.
pub fn build_request(method: &str, path: &str, headers: &[String], body: Option<&str>) -> Result<Request> {
    let method: Method = method.parse()?;
    if method == Method::Get && body.is_some() {
        bail!("--body is only allowed with POST");
    }

    let mut request = Request::new(method, path);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(body) = body {
        request = request.with_body(body.to_string());
    }
    Ok(request)
}

/// Short snake_case name for an error, used as a report key.
pub fn error_kind(error: &PoolError) -> &'static str {
    match error {
        PoolError::ConnectFailure(_) => "connect_failure",
        PoolError::TransportDisconnect => "transport_disconnect",
        PoolError::TransportError(_) => "transport_error",
        PoolError::RequestTimeout(_) => "request_timeout",
        PoolError::ClientProtocolViolation(_) => "client_protocol_violation",
        PoolError::PoolExhausted => "pool_exhausted",
        PoolError::PoolStopped => "pool_stopped",
        PoolError::Cancelled => "cancelled",
        PoolError::InvalidRequest(_) => "invalid_request",
        PoolError::InvalidConfig(_) => "invalid_config",
        PoolError::InvalidState(_) => "invalid_state",
    }
}

/// What a bench run sends.
#[derive(Debug, Clone)]
pub struct BenchPlan {
    pub count: usize,
    pub interval: Duration,
    pub timeout_ms: u64,
    pub path: String,
}

/// Outcome of a bench run, printed as JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchReport {
    pub requests: u64,
    pub succeeded: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<&'static str, u64>,
    pub elapsed_ms: u64,
    pub stats: PoolStatsSnapshot,
}

/// Sends `plan.count` requests spaced by `plan.interval` and waits for all
/// of them to resolve.
pub async fn run_bench(pool: &ClientPool, plan: &BenchPlan) -> BenchReport {
    let tally = Arc::new(Mutex::new(BenchReport::default()));
    let start = Instant::now();
    let mut pending = Vec::with_capacity(plan.count);

    for i in 0..plan.count {
        if i > 0 {
            tokio::time::sleep(plan.interval).await;
        }
        let future = pool.request_with_timeout(Request::get(plan.path.clone()), plan.timeout_ms);

        let on_response = tally.clone();
        let on_error = tally.clone();
        future.add_listener(
            move |response| {
                tracing::debug!(request = i, status = response.status(), "Response");
                let mut tally = on_response.lock().unwrap_or_else(PoisonError::into_inner);
                tally.succeeded += 1;
                *tally.status_codes.entry(response.status()).or_default() += 1;
            },
            move |error| {
                tracing::debug!(request = i, "Request failed: {}", error);
                let mut tally = on_error.lock().unwrap_or_else(PoisonError::into_inner);
                *tally.errors.entry(error_kind(error)).or_default() += 1;
            },
        );
        pending.push(future);
    }

    for future in pending {
        let _ = future.await;
    }

    let mut report = tally.lock().unwrap_or_else(PoisonError::into_inner).clone();
    report.requests = plan.count as u64;
    report.elapsed_ms = start.elapsed().as_millis() as u64;
    report.stats = pool.stats();
    report
}
