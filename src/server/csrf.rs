//! Origin guard for state-changing requests
//!
//! A mutating request whose `Origin` (or, failing that, `Referer`) names a
//! host other than the request's own `Host` is rejected with 403. Requests
//! carrying neither header are admitted so non-browser callers still work.

use axum::extract::Request;
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use url::Url;

use super::error::ApiError;
use super::headers::{client_identifier, header_value};

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRejection {
    /// The header value is not an absolute URL.
    Unparseable { header: &'static str },
    /// The header names a different host.
    Mismatch {
        header: &'static str,
        claimed: String,
        host: Option<String>,
    },
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// `host[:port]` of a URL, port omitted when it is the scheme default.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Compare the request's claimed origin with its `Host` header.
pub fn check_origin(headers: &HeaderMap) -> Result<(), OriginRejection> {
    let (name, claimed) = match header_value(headers, header::ORIGIN.as_str()) {
        Some(origin) => ("origin", origin),
        None => match header_value(headers, header::REFERER.as_str()) {
            Some(referer) => ("referer", referer),
            None => return Ok(()),
        },
    };

    let claimed_host = Url::parse(&claimed)
        .ok()
        .as_ref()
        .and_then(authority)
        .ok_or(OriginRejection::Unparseable { header: name })?;

    let host = header_value(headers, header::HOST.as_str()).map(|h| h.to_ascii_lowercase());
    if host.as_deref() == Some(claimed_host.as_str()) {
        Ok(())
    } else {
        Err(OriginRejection::Mismatch {
            header: name,
            claimed: claimed_host,
            host,
        })
    }
}

/// Middleware applied to every `/api/*` route.
pub async fn origin_guard(request: Request, next: Next) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    if let Err(rejection) = check_origin(request.headers()) {
        tracing::info!(
            path = %request.uri().path(),
            client = %client_identifier(request.headers()),
            ?rejection,
            "cross-origin request rejected"
        );
        return ApiError::Forbidden.into_response();
    }

    next.run(request).await
}
