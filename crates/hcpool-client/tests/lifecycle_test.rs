//! Client Lifecycle Tests
//!
//! These tests drive a pool through a scripted transport with tokio's clock
//! paused, so reconnect backoff and request timeouts are checked against
//! exact instants:
//! - Bounded connect retries with a fixed delay
//! - Retry exhaustion stopping the pool (or only the client)
//! - One request in flight per client and round-robin dispatch
//! - Responses, disconnects, transport errors, cancellation and timeouts

mod support;

use hcpool_client::{ClientPool, ClientStatus, ExhaustionPolicy, PoolConfig};
use hcpool_common::{PoolError, Request};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{settle, Mode, ScriptedConnector};
use tokio::time::Instant;

const SECOND: Duration = Duration::from_secs(1);

fn config(pool_size: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        ..Default::default()
    }
}

fn started(pool_size: usize, connector: &ScriptedConnector) -> ClientPool {
    started_with(config(pool_size), connector)
}

fn started_with(config: PoolConfig, connector: &ScriptedConnector) -> ClientPool {
    let pool = ClientPool::with_connector("backend.test:8080", config, connector.clone()).unwrap();
    pool.start().unwrap();
    pool
}

#[tokio::test(start_paused = true)]
async fn test_connects_after_bounded_retries() {
    let connector = ScriptedConnector::failing_first(3);
    let pool = started(1, &connector);

    pool.wait_ready(60 * SECOND).await.unwrap();

    assert_eq!(connector.attempts().len(), 4);
    assert!(connector
        .attempt_gaps()
        .iter()
        .all(|gap| *gap == Duration::from_millis(2000)));
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Ready]);
    assert_eq!(pool.clients()[0].connect_failures(), 0);

    let stats = pool.stats();
    assert_eq!(stats.connect_failures, 3);
    assert_eq!(stats.pool_stops, 0);
    assert_eq!(stats.reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_exactly_cap_failures_stop_pool_once() {
    let connector = ScriptedConnector::refusing();
    let pool = started(1, &connector);
    let start = Instant::now();

    let result = pool.wait_ready(60 * SECOND).await;
    assert_eq!(result, Err(PoolError::PoolStopped));
    assert_eq!(Instant::now() - start, 18 * SECOND);

    // Let any stray timers fire; nothing should retry after the stop.
    tokio::time::sleep(60 * SECOND).await;

    assert_eq!(connector.attempts().len(), 10);
    assert!(!pool.is_running());

    let stats = pool.stats();
    assert_eq!(stats.connect_failures, 10);
    assert_eq!(stats.pool_stops, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_with_two_clients() {
    let connector = ScriptedConnector::refusing();
    let pool = started(2, &connector);
    let start = Instant::now();

    assert_eq!(
        pool.wait_ready(60 * SECOND).await,
        Err(PoolError::PoolStopped)
    );
    assert_eq!(Instant::now() - start, 18 * SECOND);

    tokio::time::sleep(60 * SECOND).await;
    assert_eq!(pool.stats().pool_stops, 1);
    assert!(connector.attempts().len() <= 20);
    assert!(pool.client_statuses().is_empty());

    let future = pool.request(Request::get("/"));
    assert_eq!(future.await, Err(PoolError::PoolStopped));
    assert_eq!(pool.stats().rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_response_returns_client_to_registry_once() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request(Request::get("/a"));
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Working]);
    assert_eq!(pool.ready_count(), 0);

    let channel = connector.latest();
    assert_eq!(channel.writes(), vec!["GET /a".to_string()]);
    assert!(channel.respond(200, "ok"));

    let response = future.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().unwrap(), "ok");

    settle().await;
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Ready]);
    assert_eq!(pool.ready_count(), 1);

    // Same connection serves the next request.
    let future = pool.request(Request::post("/b", "x"));
    channel.respond(201, "");
    assert_eq!(future.await.unwrap().status(), 201);
    assert_eq!(connector.channels().len(), 1);
    assert_eq!(channel.writes().len(), 2);

    let stats = pool.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_request_in_flight_per_client() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let first = pool.request(Request::get("/first"));
    let second = pool.request(Request::get("/second"));

    assert_eq!(second.await, Err(PoolError::PoolExhausted));
    assert!(!first.is_resolved());
    assert_eq!(connector.latest().writes(), vec!["GET /first".to_string()]);
    assert_eq!(pool.stats().rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_over_ready_clients() {
    let connector = ScriptedConnector::accepting();
    let pool = started(2, &connector);
    pool.wait_ready(SECOND).await.unwrap();
    while pool.ready_count() < 2 {
        settle().await;
    }

    let a = pool.request(Request::get("/a"));
    let b = pool.request(Request::get("/b"));
    assert!(!a.is_resolved());
    assert!(!b.is_resolved());
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Working; 2]);

    let channels = connector.channels();
    assert_eq!(channels.len(), 2);
    for channel in &channels {
        assert_eq!(channel.writes().len(), 1);
        channel.respond(200, "");
    }
    assert!(a.await.is_ok());
    assert!(b.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_working_fails_request_and_recovers() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request(Request::get("/slow"));
    let first = connector.latest();
    assert!(first.disconnect());

    assert_eq!(future.await, Err(PoolError::TransportDisconnect));
    pool.wait_ready(SECOND).await.unwrap();

    assert!(first.is_closed());
    assert_eq!(connector.attempts().len(), 2);
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Ready]);

    let stats = pool.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.reconnects, 1);

    // The fresh channel serves requests.
    let future = pool.request(Request::get("/again"));
    connector.latest().respond(200, "back");
    assert_eq!(future.await.unwrap().text().unwrap(), "back");
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_carries_message() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request(Request::get("/"));
    connector.latest().fail("connection reset by peer");

    assert_eq!(
        future.await,
        Err(PoolError::TransportError("connection reset by peer".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_idle_is_recovered_silently() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    connector.latest().disconnect();
    settle().await;
    pool.wait_ready(SECOND).await.unwrap();

    assert_eq!(connector.channels().len(), 2);
    assert_eq!(pool.ready_count(), 1);
    assert_eq!(pool.stats().failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_wins_over_late_response() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();
    let start = Instant::now();

    let future = pool.request_with_timeout(Request::get("/slow"), 500);
    let first = connector.latest();

    assert_eq!(future.clone().await, Err(PoolError::RequestTimeout(500)));
    assert_eq!(Instant::now() - start, Duration::from_millis(500));

    // The serving client was cancelled, so its channel is gone.
    assert!(first.is_closed());
    assert!(!first.respond(200, "late"));

    pool.wait_ready(SECOND).await.unwrap();
    assert_eq!(future.outcome(), Some(Err(PoolError::RequestTimeout(500))));

    let stats = pool.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.cancelled, 0);
    assert_eq!(stats.completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_without_cancel_keeps_client_working() {
    let connector = ScriptedConnector::accepting();
    let config = PoolConfig {
        pool_size: 1,
        cancel_on_timeout: false,
        ..Default::default()
    };
    let pool = started_with(config, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request_with_timeout(Request::get("/slow"), 500);
    assert_eq!(future.clone().await, Err(PoolError::RequestTimeout(500)));
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Working]);

    // The late response frees the client but cannot change the outcome.
    assert!(connector.latest().respond(200, "late"));
    settle().await;
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Ready]);
    assert_eq!(future.outcome(), Some(Err(PoolError::RequestTimeout(500))));
    assert_eq!(pool.stats().completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_response_before_timeout_wins() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request_with_timeout(Request::get("/fast"), 500);
    connector.latest().respond(200, "fast");
    assert!(future.clone().await.is_ok());

    tokio::time::sleep(SECOND).await;
    assert!(future.outcome().unwrap().is_ok());
    assert_eq!(pool.stats().timed_out, 0);
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Ready]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_fails_request_and_reconnects() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request(Request::get("/"));
    let client = pool.clients()[0].clone();
    assert!(client.cancel());

    assert_eq!(future.await, Err(PoolError::Cancelled));
    pool.wait_ready(SECOND).await.unwrap();
    assert!(connector.channel(0).is_closed());
    assert_eq!(connector.channels().len(), 2);

    // Nothing in flight now.
    assert!(!client.cancel());
    assert_eq!(pool.stats().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_response_restarts_channel() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let first = connector.latest();
    first.respond(200, "nobody asked");
    settle().await;

    assert!(first.is_closed());
    pool.wait_ready(SECOND).await.unwrap();
    assert_eq!(connector.channels().len(), 2);
    assert_eq!(pool.ready_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listener_sees_response() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let seen = Arc::new(Mutex::new(None));
    let future = pool.request(Request::get("/listen"));
    let sink = seen.clone();
    future.add_listener(
        move |response| *sink.lock().unwrap() = Some(response.status()),
        |e| panic!("unexpected error: {}", e),
    );

    connector.latest().respond(204, "");
    future.await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(204));
}

#[tokio::test(start_paused = true)]
async fn test_stop_fails_in_flight_request() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    pool.wait_ready(SECOND).await.unwrap();

    let future = pool.request(Request::get("/"));
    pool.stop();
    pool.stop();

    assert_eq!(future.await, Err(PoolError::PoolStopped));
    assert!(connector.latest().is_closed());
    assert!(pool.client_statuses().is_empty());
    assert_eq!(pool.ready_count(), 0);
    assert_eq!(pool.stats().pool_stops, 1);

    assert_eq!(pool.request(Request::get("/")).await, Err(PoolError::PoolStopped));
    assert!(matches!(pool.start(), Err(PoolError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_stops_pool_with_healthy_client_working() {
    let connector = ScriptedConnector::accepting_only(1);
    let config = PoolConfig {
        pool_size: 2,
        max_connect_failures: 3,
        ..Default::default()
    };
    let pool = started_with(config, &connector);
    let start = Instant::now();

    pool.wait_ready(SECOND).await.unwrap();
    assert_eq!(pool.ready_count(), 1);

    let in_flight = pool.request(Request::get("/busy"));
    assert!(!in_flight.is_resolved());
    assert_eq!(connector.channel(0).writes(), vec!["GET /busy".to_string()]);

    // The other client fails at 0s, 2s and 4s; the third failure stops the pool.
    assert_eq!(in_flight.await, Err(PoolError::PoolStopped));
    assert_eq!(Instant::now() - start, 4 * SECOND);
    assert!(connector.channel(0).is_closed());

    tokio::time::sleep(60 * SECOND).await;
    assert!(!pool.is_running());
    assert_eq!(connector.attempts().len(), 4);

    let stats = pool.stats();
    assert_eq!(stats.pool_stops, 1);
    assert_eq!(stats.connect_failures, 3);

    let future = pool.request(Request::get("/"));
    assert!(future.is_resolved());
    assert_eq!(future.await, Err(PoolError::PoolStopped));
}

#[tokio::test(start_paused = true)]
async fn test_stop_client_policy_keeps_pool_running() {
    let connector = ScriptedConnector::refusing();
    let config = PoolConfig {
        pool_size: 2,
        max_connect_failures: 3,
        exhaustion_policy: ExhaustionPolicy::StopClient,
        ..Default::default()
    };
    let pool = started_with(config, &connector);

    tokio::time::sleep(60 * SECOND).await;

    assert!(pool.is_running());
    assert!(pool.client_statuses().is_empty());
    assert_eq!(connector.attempts().len(), 6);

    let stats = pool.stats();
    assert_eq!(stats.pool_stops, 0);
    assert_eq!(stats.connect_failures, 6);

    assert_eq!(pool.request(Request::get("/")).await, Err(PoolError::PoolExhausted));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_counts_as_failure() {
    let connector = ScriptedConnector::new(Mode::Hang);
    let config = PoolConfig {
        pool_size: 1,
        connect_timeout_ms: 1000,
        max_connect_failures: 2,
        ..Default::default()
    };
    let pool = started_with(config, &connector);
    let start = Instant::now();

    assert_eq!(
        pool.wait_ready(60 * SECOND).await,
        Err(PoolError::PoolStopped)
    );
    // attempt, 1s timeout, 2s backoff, attempt, 1s timeout
    assert_eq!(Instant::now() - start, 4 * SECOND);
    assert_eq!(connector.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_when_host_comes_back() {
    let connector = ScriptedConnector::refusing();
    let pool = started(1, &connector);

    tokio::time::sleep(5 * SECOND).await;
    assert_eq!(pool.client_statuses(), vec![ClientStatus::Starting]);
    assert_eq!(pool.clients()[0].connect_failures(), 3);

    connector.set_mode(Mode::Accept);
    pool.wait_ready(5 * SECOND).await.unwrap();
    assert_eq!(pool.clients()[0].connect_failures(), 0);
    assert!(pool.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_times_out() {
    let connector = ScriptedConnector::refusing();
    let config = PoolConfig {
        pool_size: 1,
        max_connect_failures: 100,
        ..Default::default()
    };
    let pool = started_with(config, &connector);

    assert_eq!(
        pool.wait_ready(5 * SECOND).await,
        Err(PoolError::RequestTimeout(5000))
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_fails_once_every_client_stopped() {
    let connector = ScriptedConnector::refusing();
    let config = PoolConfig {
        pool_size: 2,
        max_connect_failures: 3,
        exhaustion_policy: ExhaustionPolicy::StopClient,
        ..Default::default()
    };
    let pool = started_with(config, &connector);
    let start = Instant::now();

    assert_eq!(
        pool.wait_ready(60 * SECOND).await,
        Err(PoolError::PoolExhausted)
    );
    assert_eq!(Instant::now() - start, 4 * SECOND);
    assert!(pool.is_running());

    // Already exhausted: no waiting at all.
    assert_eq!(pool.wait_ready(60 * SECOND).await, Err(PoolError::PoolExhausted));
    assert_eq!(Instant::now() - start, 4 * SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_timeout_saturates() {
    let connector = ScriptedConnector::new(Mode::Hang);
    let config = PoolConfig {
        pool_size: 1,
        max_connect_failures: 100,
        ..Default::default()
    };
    let pool = started_with(config, &connector);

    let wait = pool.wait_ready(Duration::MAX);
    let outcome = tokio::time::timeout(60 * SECOND, wait).await;
    assert!(outcome.is_err(), "a saturated deadline never fires early");
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    assert!(matches!(pool.start(), Err(PoolError::InvalidState(_))));
    assert_eq!(pool.clients().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_task_runs_after_delay() {
    let connector = ScriptedConnector::accepting();
    let pool = started(1, &connector);
    let fired = Arc::new(Mutex::new(None));
    let start = Instant::now();

    let slot = fired.clone();
    let task = pool.schedule(Duration::from_millis(750), move || {
        *slot.lock().unwrap() = Some(Instant::now());
    });
    assert!(task.is_some());

    tokio::time::sleep(SECOND).await;
    let fired = fired.lock().unwrap().expect("task should have run");
    assert_eq!(fired - start, Duration::from_millis(750));

    pool.stop();
    assert!(pool.schedule(Duration::from_millis(1), || {}).is_none());
}
