//! Validating request dispatch: query parameters and JSON body are checked
//! against configured validators before the downstream handler runs.

pub mod dispatch;
pub mod http;
pub mod schema;

pub use dispatch::{
    validate_request, with_request_context, ContextHandler, ErrorItem, ErrorKind, HandlerOptions,
    OnError, RequestContext, RequestValidation, RouteHandler, Validated,
};
pub use http::{serve, HttpRequest, Response};
pub use schema::{Issue, SchemaValidator, TypedValidator, Unvalidated, Validator};

use thiserror::Error;

/// Error type downstream handlers may fail with; the dispatcher converts it
/// into a 500 response at the boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("failed to read request: {0}")]
    Read(String),
}
