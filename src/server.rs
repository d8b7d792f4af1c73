//! HTTP query server.
//!
//! - `POST /graphrag` `{question, entities?, top_n?}` → `{"llm_prompt": ...}`
//! - `GET /health` → `ok`
//! - `GET /metrics` → Prometheus text

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::graphrag::retrieval::{QueryRequest, RetrievalIndex};
use crate::metrics;

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: impl Display) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message.to_string() }))
}

fn text_response(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response
}

async fn handle_query<B>(index: &RetrievalIndex, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err),
    };
    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid request: {}", err))
        }
    };
    if request.question.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    debug!("Query: {:?}", request.question);
    let response = index.answer(&request).await;
    json_response(StatusCode::OK, &response)
}

/// Route one request.
pub async fn handle<B>(
    index: Arc<RetrievalIndex>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphrag") => handle_query(&index, req).await,
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => return metrics::metrics_response().await,
        (_, "/graphrag" | "/health" | "/metrics") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

/// Serve queries until the listener fails.
pub async fn serve(addr: SocketAddr, index: Arc<RetrievalIndex>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "GraphRAG query server started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let index = index.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(index.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Connection error: {}", err);
            }
        });
    }
}
