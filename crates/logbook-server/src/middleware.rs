//! Logbook Middleware
//!
//! Request correlation for the HTTP surface.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Request ID Middleware
// =============================================================================

/// Tag each request and its response with an id. A caller-supplied id is
/// kept; otherwise a new one is generated.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
