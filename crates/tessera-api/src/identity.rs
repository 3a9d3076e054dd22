//! Caller identity taken from request headers.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tessera_core::context::{ExecutionContext, Identity};
use uuid::Uuid;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity of the caller. A request id is generated when the header is
/// missing, so every flow is correlatable.
#[derive(Debug, Clone)]
pub struct RequestIdentity(pub Identity);

impl RequestIdentity {
    /// Execution context for dispatching on behalf of this caller.
    #[must_use]
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.0.clone())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

impl<S: Send + Sync> FromRequestParts<S> for RequestIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        Ok(Self(Identity::new(
            header(headers, TENANT_ID_HEADER),
            header(headers, USER_ID_HEADER),
            header(headers, REQUEST_ID_HEADER).or_else(|| Some(Uuid::new_v4().to_string())),
        )))
    }
}
