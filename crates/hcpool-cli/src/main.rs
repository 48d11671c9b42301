//! # hcpool CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # One request through a pool of one connection (prints the body)
//! hcpool call 127.0.0.1:8080 --path /health
//!
//! # POST with headers
//! hcpool call 127.0.0.1:8080 --method POST --path /submit \
//!   --header content-type:application/json --body '{"n": 1}'
//!
//! # 500 requests, one every 5ms, over 8 connections; prints stats as JSON
//! hcpool bench 127.0.0.1:8080 --pool-size 8 --count 500 --interval-ms 5
//! ```
//!
//! Hosts are `name` or `name:port`; port 80 is assumed when none is given.

use anyhow::{bail, Result};
use argh::FromArgs;
use hcpool_cli::{build_request, run_bench, BenchPlan};
use hcpool_client::{ClientPool, ExhaustionPolicy, PoolConfig};
use std::time::Duration;

#[derive(FromArgs)]
/// hcpool - persistent HTTP/1.1 connection pool
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Bench(BenchArgs),
}

/// Arguments for a single request.
///
/// Output is the raw response body on stdout. A non-2xx status or any pool
/// error exits non-zero.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// send one request and print the response body
struct CallArgs {
    /// host to connect to (name or name:port)
    #[argh(positional)]
    host: String,

    /// request path
    #[argh(option, short = 'p', default = "\"/\".into()")]
    path: String,

    /// request method, GET or POST
    #[argh(option, short = 'm', default = "\"GET\".into()")]
    method: String,

    /// request header as name:value; may be repeated
    #[argh(option, long = "header")]
    headers: Vec<String>,

    /// request body (POST only)
    #[argh(option, short = 'd')]
    body: Option<String>,

    /// time allowed for connecting and for the request, in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

/// Arguments for a load run against one host.
///
/// Requests are GETs on `--path`, each with its own timeout. Outcomes are
/// collected through future listeners and printed with the pool's counters
/// as one JSON object.
#[derive(FromArgs)]
#[argh(subcommand, name = "bench")]
/// send a series of requests and print pool statistics as JSON
struct BenchArgs {
    /// host to connect to (name or name:port)
    #[argh(positional)]
    host: String,

    /// request path
    #[argh(option, short = 'p', default = "\"/\".into()")]
    path: String,

    /// number of persistent connections
    #[argh(option, long = "pool-size", default = "2")]
    pool_size: usize,

    /// number of requests to send
    #[argh(option, short = 'n', long = "count", default = "100")]
    count: usize,

    /// delay between requests in milliseconds
    #[argh(option, long = "interval-ms", default = "10")]
    interval_ms: u64,

    /// per-request timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "1000")]
    timeout_ms: u64,

    /// delay between reconnect attempts in milliseconds
    #[argh(option, long = "reconnect-delay-ms", default = "2000")]
    reconnect_delay_ms: u64,

    /// failed connect attempts tolerated per connection
    #[argh(option, long = "max-connect-failures", default = "10")]
    max_connect_failures: u32,

    /// what to stop when a connection gives up: stop-pool or stop-client
    #[argh(option, long = "exhaustion", default = "ExhaustionPolicy::StopPool", from_str_fn(parse_policy))]
    exhaustion: ExhaustionPolicy,

    /// time to wait for the first ready connection, in milliseconds
    #[argh(option, long = "ready-timeout-ms", default = "30000")]
    ready_timeout_ms: u64,
}

fn parse_policy(value: &str) -> std::result::Result<ExhaustionPolicy, String> {
    value.parse().map_err(|e: hcpool_common::PoolError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep stdout clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Bench(args) => run_bench_command(args).await,
    }
}

/// Executes the `call` subcommand.
async fn run_call(args: CallArgs) -> Result<()> {
    let request = build_request(&args.method, &args.path, &args.headers, args.body.as_deref())?;
    let config = PoolConfig {
        pool_size: 1,
        connect_timeout_ms: args.timeout_ms,
        max_connect_failures: 1,
        ..Default::default()
    };

    let pool = ClientPool::new(args.host, config)?;
    pool.start()?;
    let outcome = async {
        pool.wait_ready(Duration::from_millis(args.timeout_ms)).await?;
        pool.request_with_timeout(request, args.timeout_ms).await
    }
    .await;
    pool.stop();

    let response = outcome?;
    print!("{}", String::from_utf8_lossy(response.body()));
    if !response.is_success() {
        bail!("Server responded with status {}", response.status());
    }
    Ok(())
}

/// Executes the `bench` subcommand.
async fn run_bench_command(args: BenchArgs) -> Result<()> {
    let config = PoolConfig {
        pool_size: args.pool_size,
        reconnect_delay_ms: args.reconnect_delay_ms,
        max_connect_failures: args.max_connect_failures,
        exhaustion_policy: args.exhaustion,
        ..Default::default()
    };

    let pool = ClientPool::new(args.host, config)?;
    pool.start()?;
    pool.wait_ready(Duration::from_millis(args.ready_timeout_ms)).await?;
    tracing::info!(
        host = pool.host(),
        "{} of {} connections ready, sending {} requests",
        pool.ready_count(),
        args.pool_size,
        args.count
    );

    let plan = BenchPlan {
        count: args.count,
        interval: Duration::from_millis(args.interval_ms),
        timeout_ms: args.timeout_ms,
        path: args.path,
    };
    let report = run_bench(&pool, &plan).await;
    pool.stop();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
