//! Prometheus metrics for the graphrag CLI and query server.
//!
//! Exposes:
//! - `graphrag_command_duration_seconds` (histogram)
//! - `graphrag_command_total` (counter with status)
//! - `graphrag_command_inflight` (gauge)
//! - `graphrag_external_calls_total` (counter by service and status)
//! - `graphrag_query_duration_seconds` (histogram)
//! - `graphrag_last_build_triples` (gauge)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_histogram_vec, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Encoder, Histogram, HistogramVec, IntCounterVec,
    IntGauge, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "graphrag_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "graphrag_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static EXTERNAL_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_external_calls_total",
        "Calls to completion, embedding and graph store services by outcome",
        &["service", "status"]
    )
    .expect("failed to register external call counter")
});

static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    // 5ms up to ~40s
    let buckets =
        prometheus::exponential_buckets(0.005, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram!(
        "graphrag_query_duration_seconds",
        "Retrieval query latency in seconds",
        buckets
    )
    .expect("failed to register query duration histogram")
});

static LAST_BUILD_TRIPLES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "graphrag_last_build_triples",
        "Triples produced by the most recent build"
    )
    .expect("failed to register build gauge")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&EXTERNAL_CALLS);
    Lazy::force(&QUERY_DURATION);
    Lazy::force(&LAST_BUILD_TRIPLES);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

/// Count one call to an external service (`ok`, `error` or `timeout`).
pub fn record_external_call(service: &str, status: &str) {
    EXTERNAL_CALLS.with_label_values(&[service, status]).inc();
}

pub fn record_query_duration(duration: Duration) {
    QUERY_DURATION.observe(duration.as_secs_f64());
}

pub fn set_last_build_triples(count: usize) {
    LAST_BUILD_TRIPLES.set(count as i64);
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Current registry in the Prometheus text format.
pub async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    init_collectors();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(respond(StatusCode::INTERNAL_SERVER_ERROR, "encode error"));
    }

    let mut response = respond(StatusCode::OK, buffer);
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(respond(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
