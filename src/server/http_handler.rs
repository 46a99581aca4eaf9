use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, Response};
use thiserror::Error;
use tracing::debug;

use crate::models::request::GatewayRequest;
use crate::models::response::GatewayResponse;
use crate::models::threat::Outcome;

use super::dispatcher::Dispatcher;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request body could not be read.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read body: {0}")]
    Read(BoxError),
}

/// Adapts hyper requests into the [`Dispatcher`] and back.
pub struct HttpHandler {
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
}

impl HttpHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, max_body_size: usize) -> Self {
        Self {
            dispatcher,
            max_body_size,
        }
    }

    /// Process a single inbound HTTP request end-to-end.
    ///
    /// Admission runs on the head. The body is only read for admitted
    /// requests, and never past `max_body_size`.
    pub async fn handle<B>(&self, req: Request<B>, peer_addr: SocketAddr) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let mut gateway_req = request_head(parts, peer_addr);

        let admitted = match self.dispatcher.admit(&gateway_req) {
            Ok(a) => a,
            Err(rejection) => return rejection.into_hyper(),
        };

        match read_body(body, self.max_body_size).await {
            Ok(bytes) => {
                gateway_req.body = bytes;
                self.dispatcher.serve(gateway_req, admitted).await.into_hyper()
            }
            Err(e) => {
                let (response, outcome) = match &e {
                    BodyError::TooLarge(_) => (GatewayResponse::payload_too_large(), Outcome::BodyTooLarge),
                    BodyError::Read(_) => (GatewayResponse::bad_request(), Outcome::BadBody),
                };
                debug!(peer = %peer_addr, client = %admitted.client(), error = %e, "Request body rejected");
                self.dispatcher
                    .finish(&gateway_req, admitted, response, outcome)
                    .into_hyper()
            }
        }
    }
}

/// Copy method, target and headers. The body is left empty.
fn request_head(parts: Parts, peer_addr: SocketAddr) -> GatewayRequest {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut head = GatewayRequest::new(parts.method, target).with_remote_addr(peer_addr.to_string());
    head.headers = parts.headers;
    head
}

/// Collect at most `limit` bytes. A declared length over the limit fails
/// before anything is read.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge(limit));
    }
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge(limit)),
        Err(e) => Err(BodyError::Read(e)),
    }
}

/// Collect the whole body and copy method, target and headers.
pub async fn into_gateway_request<B>(
    req: Request<B>,
    peer_addr: SocketAddr,
    max_body_size: usize,
) -> Result<GatewayRequest, BodyError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    let mut gateway_req = request_head(parts, peer_addr);
    gateway_req.body = read_body(body, max_body_size).await?;
    Ok(gateway_req)
}
