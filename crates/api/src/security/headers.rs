//! Security headers for API responses
//!
//! The API only ever returns JSON, so the policy is maximally restrictive.

use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};

const HEADERS: &[(&str, &str)] = &[
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=63072000; includeSubDomains"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("cache-control", "no-store"),
];

/// Add security headers to every response
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }

    response
}
