//! DSNT endpoint wire protocol
//!
//! Two HTTP round trips per endpoint:
//! - QUERY  `GET  /dsnt/1/query/<txid>`
//! - SUBMIT `POST /dsnt/1/submit?txid=&n=&ctxid=&cn=` with the serialized
//!   conflicting transaction as an octet-stream body
//!
//! Both responses carry the `x-bsv-dsnt` header: `1` when the endpoint wants
//! the proof, `0` when it does not.

use crate::core::TxId;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Interest header name
pub const DSNT_HEADER: &str = "x-bsv-dsnt";

pub const QUERY_PATH: &str = "/dsnt/1/query";
pub const SUBMIT_PATH: &str = "/dsnt/1/submit";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

// =============================================================================
// Types
// =============================================================================

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

/// Parsed endpoint response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    /// `None` when the interest header is absent or unrecognised
    pub wants_proof: Option<bool>,
}

impl EndpointResponse {
    pub fn new(status: u16, wants_proof: Option<bool>) -> Self {
        Self {
            status,
            wants_proof,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn is_bad_request(&self) -> bool {
        self.status == STATUS_BAD_REQUEST
    }
}

/// Interpret an interest header value
pub fn parse_interest_header(value: Option<&str>) -> Option<bool> {
    match value.map(str::trim) {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

/// Fields of a SUBMIT request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Double-spend-enabled transaction
    pub txid: TxId,
    pub input: u32,
    /// Transaction sent as proof
    pub conflicting_txid: TxId,
    pub conflicting_input: u32,
}

impl SubmitRequest {
    pub fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("txid", self.txid.to_hex()),
            ("n", self.input.to_string()),
            ("ctxid", self.conflicting_txid.to_hex()),
            ("cn", self.conflicting_input.to_string()),
        ]
    }
}

/// Carries QUERY and SUBMIT requests to an endpoint
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn query(
        &self,
        endpoint: SocketAddr,
        txid: &TxId,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError>;

    async fn submit(
        &self,
        endpoint: SocketAddr,
        request: &SubmitRequest,
        proof: Bytes,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// [`NotificationTransport`] over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Redirects are returned as-is so the caller sees the 3xx status
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dsnt-node/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    fn parse(response: &reqwest::Response) -> EndpointResponse {
        let header = response
            .headers()
            .get(DSNT_HEADER)
            .and_then(|v| v.to_str().ok());
        EndpointResponse::new(response.status().as_u16(), parse_interest_header(header))
    }
}

pub fn query_url(endpoint: SocketAddr, txid: &TxId) -> String {
    format!("http://{}{}/{}", endpoint, QUERY_PATH, txid)
}

pub fn submit_url(endpoint: SocketAddr) -> String {
    format!("http://{}{}", endpoint, SUBMIT_PATH)
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn query(
        &self,
        endpoint: SocketAddr,
        txid: &TxId,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError> {
        let response = self
            .client
            .get(query_url(endpoint, txid))
            .timeout(timeout)
            .send()
            .await?;
        Ok(Self::parse(&response))
    }

    async fn submit(
        &self,
        endpoint: SocketAddr,
        request: &SubmitRequest,
        proof: Bytes,
        timeout: Duration,
    ) -> Result<EndpointResponse, TransportError> {
        let response = self
            .client
            .post(submit_url(endpoint))
            .query(&request.query_pairs())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(proof)
            .timeout(timeout)
            .send()
            .await?;
        Ok(Self::parse(&response))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes as Body;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::Router;
    use std::collections::HashMap;

    async fn query_handler(Path(txid): Path<String>) -> Response {
        match txid.chars().next() {
            Some('0') => (StatusCode::OK, [(DSNT_HEADER, "0")]).into_response(),
            Some('1') => (StatusCode::OK, [(DSNT_HEADER, "1")]).into_response(),
            Some('b') => (StatusCode::BAD_REQUEST, [(DSNT_HEADER, "0")]).into_response(),
            Some('c') => moved(StatusCode::FOUND),
            _ => (StatusCode::OK, [("x-other", "1")]).into_response(),
        }
    }

    // Points at a route that answers 200 with interest
    fn moved(status: StatusCode) -> Response {
        let target = format!("{}/{}", QUERY_PATH, txid(0x10));
        (status, [("location", target.as_str()), (DSNT_HEADER, "1")]).into_response()
    }

    async fn submit_handler(Query(params): Query<HashMap<String, String>>, body: Body) -> Response {
        let complete = ["txid", "n", "ctxid", "cn"]
            .iter()
            .all(|k| params.contains_key(*k));
        let input = params.get("n").map(String::as_str);
        if input == Some("3") {
            return moved(StatusCode::SEE_OTHER);
        }
        if complete && input == Some("2") && body.as_ref() == b"proof" {
            (StatusCode::OK, [(DSNT_HEADER, "1")]).into_response()
        } else {
            (StatusCode::BAD_REQUEST, [(DSNT_HEADER, "1")]).into_response()
        }
    }

    async fn slow_handler() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn spawn_endpoint() -> SocketAddr {
        let app = Router::new()
            .route("/dsnt/1/query/{txid}", get(query_handler))
            .route("/dsnt/1/submit", post(submit_handler))
            .route("/slow/dsnt/1/query/{txid}", get(slow_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn txid(first: u8) -> TxId {
        // Displayed hex is byte-reversed, so the last byte leads
        let mut bytes = [0u8; 32];
        bytes[31] = first;
        TxId::from_bytes(bytes)
    }

    #[test]
    fn test_parse_interest_header() {
        assert_eq!(parse_interest_header(Some("1")), Some(true));
        assert_eq!(parse_interest_header(Some("0")), Some(false));
        assert_eq!(parse_interest_header(Some("yes")), None);
        assert_eq!(parse_interest_header(None), None);
    }

    #[test]
    fn test_urls() {
        let endpoint: SocketAddr = "10.0.0.1:8080".parse().unwrap();
        let id = txid(0xab);
        assert_eq!(
            query_url(endpoint, &id),
            format!("http://10.0.0.1:8080/dsnt/1/query/{}", id.to_hex())
        );
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        assert_eq!(submit_url(v6), "http://[::1]:80/dsnt/1/submit");
    }

    #[tokio::test]
    async fn test_query_over_http() {
        let endpoint = spawn_endpoint().await;
        let transport = HttpTransport::new().unwrap();
        let timeout = Duration::from_secs(5);

        let wants = transport.query(endpoint, &txid(0x10), timeout).await.unwrap();
        assert_eq!(wants, EndpointResponse::new(200, Some(true)));

        let declines = transport.query(endpoint, &txid(0x00), timeout).await.unwrap();
        assert_eq!(declines, EndpointResponse::new(200, Some(false)));

        let bad = transport.query(endpoint, &txid(0xb0), timeout).await.unwrap();
        assert!(bad.is_bad_request());

        let missing = transport.query(endpoint, &txid(0xf0), timeout).await.unwrap();
        assert_eq!(missing.wants_proof, None);
    }

    #[tokio::test]
    async fn test_submit_over_http() {
        let endpoint = spawn_endpoint().await;
        let transport = HttpTransport::new().unwrap();
        let request = SubmitRequest {
            txid: txid(1),
            input: 2,
            conflicting_txid: txid(3),
            conflicting_input: 0,
        };

        let timeout = Duration::from_secs(5);

        let response = transport
            .submit(endpoint, &request, Bytes::from_static(b"proof"), timeout)
            .await
            .unwrap();
        assert!(response.is_ok());

        let response = transport
            .submit(endpoint, &request, Bytes::from_static(b"other"), timeout)
            .await
            .unwrap();
        assert!(response.is_bad_request());
    }

    #[tokio::test]
    async fn test_redirects_not_followed() {
        let endpoint = spawn_endpoint().await;
        let transport = HttpTransport::new().unwrap();
        let timeout = Duration::from_secs(5);

        let response = transport.query(endpoint, &txid(0xc0), timeout).await.unwrap();
        assert_eq!(response, EndpointResponse::new(302, Some(true)));
        assert!(!response.is_ok());

        let request = SubmitRequest {
            txid: txid(1),
            input: 3,
            conflicting_txid: txid(3),
            conflicting_input: 0,
        };
        let response = transport
            .submit(endpoint, &request, Bytes::from_static(b"proof"), timeout)
            .await
            .unwrap();
        assert_eq!(response.status, 303);
    }

    #[tokio::test]
    async fn test_timeout_and_refused() {
        let endpoint = spawn_endpoint().await;
        let transport = HttpTransport::new().unwrap();

        let url = format!("http://{}/slow/dsnt/1/query/{}", endpoint, txid(1));
        let err: TransportError = transport
            .client
            .get(url)
            .timeout(Duration::from_millis(50))
            .send()
            .await
            .unwrap_err()
            .into();
        assert!(err.is_timeout());

        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = transport
            .query(closed, &txid(1), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
    }
}
