//! HTTP plumbing: the collected request snapshot handed to the dispatcher,
//! JSON response helpers, and an embedded hyper server for serving one built
//! route handler.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::dispatch::{ContextHandler, RouteHandler};
use crate::schema::Validator;
use crate::{BoxError, Error};

/// Response type produced by handlers and by the dispatcher itself.
pub type Response = hyper::Response<Full<Bytes>>;

/// One incoming request with the body already collected. Cloning is cheap
/// (`Bytes` is reference-counted), so the dispatcher hands a copy to the
/// downstream handler without touching the caller's original.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: &str, path: &str, query_string: &str, body: impl Into<Bytes>) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_owned(),
            query_string: query_string.trim_start_matches('?').to_owned(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Collect a hyper request into a snapshot the dispatcher can work with.
    pub async fn from_hyper(req: hyper::Request<hyper::body::Incoming>) -> Result<Self, Error> {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query_string = req.uri().query().unwrap_or("").to_string();
        let headers = req
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Read(e.to_string()))?
            .to_bytes();
        Ok(Self {
            method,
            path,
            query_string,
            headers,
            body,
        })
    }

    /// Flatten the query string into a JSON object of string values.
    /// Percent-decoding and duplicate keys follow `form_urlencoded`: the last
    /// occurrence of a key wins.
    pub fn query_params(&self) -> Value {
        let mut params = serde_json::Map::new();
        for (key, value) in url::form_urlencoded::parse(self.query_string.as_bytes()) {
            params.insert(key.into_owned(), Value::String(value.into_owned()));
        }
        Value::Object(params)
    }

    /// Parse the body as JSON. Empty or malformed bodies fail, so this is
    /// called only when a body validator is configured.
    pub fn json_body(&self) -> Result<Value, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// JSON response with the given status and `Content-Type: application/json`.
pub fn json_response(status: StatusCode, payload: &Value) -> Response {
    hyper::Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(payload.to_string())))
        .unwrap()
}

/// Serve one route handler at every path on `host:port` until ctrl-c.
/// Routing across multiple handlers belongs to the host application; this is
/// the single-handler convenience for demos and smoke tests.
pub async fn serve<Q, B, H>(
    handler: Arc<RouteHandler<Q, B, H>>,
    host: &str,
    port: u16,
) -> Result<(), BoxError>
where
    Q: Validator + 'static,
    B: Validator + 'static,
    H: ContextHandler<Q::Output, B::Output> + 'static,
    Q::Output: Send + 'static,
    B::Output: Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(x) => x,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept error");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let handler = Arc::clone(&handler);
                tokio::task::spawn(async move {
                    let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                        let handler = Arc::clone(&handler);
                        async move {
                            let response = match HttpRequest::from_hyper(req).await {
                                Ok(request) => handler.call(request).await,
                                Err(e) => json_response(
                                    StatusCode::BAD_REQUEST,
                                    &serde_json::json!({ "error": e.to_string() }),
                                ),
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::warn!(error = %e, "serve_connection error");
                    }
                });
            }
        }
    }
    Ok(())
}
