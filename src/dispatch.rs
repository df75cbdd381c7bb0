//! The validating dispatcher: wraps an async handler so the request's query
//! parameters and JSON body are checked against configured validators before
//! it runs.
//!
//! Validation failures become a 400 with the ordered list of rejected parts;
//! anything the downstream handler fails with becomes a 500. Every path from
//! request to response terminates in a response value.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::{json_response, HttpRequest, Response};
use crate::schema::{Issue, Unvalidated, Validator};
use crate::{BoxError, Error};

/// Used for the 500 payload when the handler's error has no printable message.
const FALLBACK_ERROR_TEXT: &str = "An unexpected error occurred";

/// Which part of the request a validator rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Query,
    Body,
}

/// One rejected request part with the issues its validator reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub errors: Vec<Issue>,
}

/// Validators for the two request parts. A `None` slot means that part is
/// passed through unvalidated and stays absent from the handler context.
pub struct RequestValidation<Q = Unvalidated, B = Unvalidated> {
    pub query: Option<Q>,
    pub body: Option<B>,
}

impl RequestValidation {
    pub fn new() -> Self {
        Self {
            query: None,
            body: None,
        }
    }
}

impl Default for RequestValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, B> RequestValidation<Q, B> {
    pub fn query<Q2>(self, validator: Q2) -> RequestValidation<Q2, B> {
        RequestValidation {
            query: Some(validator),
            body: self.body,
        }
    }

    pub fn body<B2>(self, validator: B2) -> RequestValidation<Q, B2> {
        RequestValidation {
            query: self.query,
            body: Some(validator),
        }
    }
}

/// Response override consulted when the downstream handler fails.
pub type OnError = Arc<dyn Fn(&BoxError) -> Response + Send + Sync>;

/// Per-route configuration: the two validator slots plus an optional override
/// for turning handler failures into responses. Built once at registration,
/// immutable afterwards.
pub struct HandlerOptions<Q = Unvalidated, B = Unvalidated> {
    pub validation: RequestValidation<Q, B>,
    pub on_error: Option<OnError>,
}

impl<Q, B> HandlerOptions<Q, B> {
    pub fn new(validation: RequestValidation<Q, B>) -> Self {
        Self {
            validation,
            on_error: None,
        }
    }

    pub fn on_error(mut self, hook: impl Fn(&BoxError) -> Response + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

/// Validated data handed to the downstream handler. A field is `None` exactly
/// when no validator was configured for that part.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext<Q, B> {
    pub query: Option<Q>,
    pub body: Option<B>,
}

/// Outcome of checking one request against the configured validators.
#[derive(Debug)]
pub enum Validated<Q, B> {
    Valid(RequestContext<Q, B>),
    Invalid(Vec<ErrorItem>),
}

/// Downstream handler, invoked once validation succeeds. May fail; the
/// dispatcher converts the failure into a 500 response.
#[async_trait]
pub trait ContextHandler<Q, B>: Send + Sync {
    async fn handle(
        &self,
        request: HttpRequest,
        ctx: RequestContext<Q, B>,
    ) -> Result<Response, BoxError>;
}

#[async_trait]
impl<F, Fut, Q, B> ContextHandler<Q, B> for F
where
    F: Fn(HttpRequest, RequestContext<Q, B>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
    Q: Send + 'static,
    B: Send + 'static,
{
    async fn handle(
        &self,
        request: HttpRequest,
        ctx: RequestContext<Q, B>,
    ) -> Result<Response, BoxError> {
        self(request, ctx).await
    }
}

/// Check query and body against the configured validators. Both parts are
/// evaluated before the outcome is decided, so a request with a bad query and
/// a bad body reports both; errors come in declaration order, query first.
///
/// The body is parsed as JSON only when a body validator is configured, so
/// bodiless routes never fail on parsing. Malformed JSON is not a validation
/// failure: it surfaces as [`Error::Json`] and is handled at the dispatcher
/// boundary.
pub fn validate_request<Q, B>(
    request: &HttpRequest,
    validation: &RequestValidation<Q, B>,
) -> Result<Validated<Q::Output, B::Output>, Error>
where
    Q: Validator,
    B: Validator,
{
    let mut errors = Vec::new();
    let mut query = None;
    let mut body = None;

    if let Some(validator) = &validation.query {
        match validator.validate(&request.query_params()) {
            Ok(data) => query = Some(data),
            Err(issues) => errors.push(ErrorItem {
                kind: ErrorKind::Query,
                errors: issues,
            }),
        }
    }
    if let Some(validator) = &validation.body {
        match validator.validate(&request.json_body()?) {
            Ok(data) => body = Some(data),
            Err(issues) => errors.push(ErrorItem {
                kind: ErrorKind::Body,
                errors: issues,
            }),
        }
    }
    if !errors.is_empty() {
        return Ok(Validated::Invalid(errors));
    }
    Ok(Validated::Valid(RequestContext { query, body }))
}

/// A route handler with its validators attached. Immutable after
/// construction; safe to share across concurrently executing requests.
pub struct RouteHandler<Q, B, H> {
    options: HandlerOptions<Q, B>,
    handler: H,
}

impl<Q, B, H> RouteHandler<Q, B, H>
where
    Q: Validator,
    B: Validator,
    H: ContextHandler<Q::Output, B::Output>,
{
    /// Run one request through validation and the downstream handler.
    ///
    /// Never fails: validation rejections become a 400 carrying the ordered
    /// [`ErrorItem`] list, and anything the handler (or body parsing) fails
    /// with becomes a 500 via the `on_error` override or the default
    /// formatter.
    pub async fn call(&self, request: HttpRequest) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "handler failed");
                match &self.options.on_error {
                    Some(hook) => hook(&err),
                    None => failure_response(&err),
                }
            }
        }
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<Response, BoxError> {
        match validate_request(&request, &self.options.validation)? {
            Validated::Invalid(errors) => {
                tracing::debug!(parts = errors.len(), "request validation rejected");
                Ok(validation_failure_response(&errors))
            }
            Validated::Valid(ctx) => self.handler.handle(request, ctx).await,
        }
    }
}

/// Wrap `handler` so query and body are validated per `options` before it
/// runs. The result is ready for registration with whatever routing layer the
/// host application uses; see [`RouteHandler::call`].
pub fn with_request_context<Q, B, H>(
    options: HandlerOptions<Q, B>,
    handler: H,
) -> RouteHandler<Q, B, H>
where
    Q: Validator,
    B: Validator,
    H: ContextHandler<Q::Output, B::Output>,
{
    RouteHandler { options, handler }
}

fn validation_failure_response(errors: &[ErrorItem]) -> Response {
    let payload = serde_json::to_value(errors).unwrap_or_default();
    json_response(StatusCode::BAD_REQUEST, &payload)
}

fn failure_response(err: &BoxError) -> Response {
    let message = err.to_string();
    let message = if message.is_empty() {
        FALLBACK_ERROR_TEXT
    } else {
        message.as_str()
    };
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({ "error": message }),
    )
}
