//! Response policy.
//!
//! # Responsibilities
//! - Turn an action result into an HTTP response following the route:
//!   content type, language, cache policy, download disposition
//! - Pretty-print JSON bodies when the route asks for it
//! - Build redirects and bodiless answers (HEAD, 204, 304)
//!
//! # Design Decisions
//! - Headers set by the action win over headers derived from the route
//! - Text mimetypes always carry `charset=utf-8`

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::Value;

use crate::routing::mime::is_textual;
use crate::routing::RouteRecord;

/// Payload produced by an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    Empty,
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

/// What an action hands back to the engine.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ActionBody,
}

impl ActionResult {
    pub fn new(status: StatusCode, body: ActionBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Text or markup rendered by the action.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, ActionBody::Text(body.into()))
    }

    pub fn json(value: Value) -> Self {
        Self::new(StatusCode::OK, ActionBody::Json(value))
    }

    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, ActionBody::Bytes(body.into()))
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, ActionBody::Empty)
    }

    /// 303 See Other to `location`.
    pub fn redirect(location: &str) -> Self {
        let mut result = Self::empty(StatusCode::SEE_OTHER);
        if let Ok(value) = HeaderValue::from_str(location) {
            result.headers.insert(header::LOCATION, value);
        }
        result
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// `Content-Type` value for a mimetype.
pub fn content_type_for(mimetype: &str) -> String {
    if is_textual(mimetype) {
        format!("{mimetype}; charset=utf-8")
    } else {
        mimetype.to_string()
    }
}

/// `Cache-Control` value for a route.
pub fn cache_control_for(route: &RouteRecord) -> String {
    if route.is_use_cache() {
        format!("public, max-age={}", route.cache_timeout())
    } else if route.is_secure() {
        "no-store".to_string()
    } else {
        "no-cache".to_string()
    }
}

fn body_bytes(route: &RouteRecord, body: ActionBody) -> Bytes {
    match body {
        ActionBody::Empty => Bytes::new(),
        ActionBody::Text(text) => Bytes::from(text),
        ActionBody::Bytes(bytes) => bytes,
        ActionBody::Json(value) => {
            let encoded = if route.response_is_pretty_print() {
                serde_json::to_vec_pretty(&value)
            } else {
                serde_json::to_vec(&value)
            };
            // Serializing a `Value` cannot fail.
            Bytes::from(encoded.unwrap_or_default())
        }
    }
}

/// Apply the route's response policy to an action result.
///
/// With `head_only` the headers are kept and the body dropped.
pub fn render(route: &RouteRecord, result: ActionResult, head_only: bool) -> Response {
    let ActionResult {
        status,
        headers: action_headers,
        body,
    } = result;
    let has_body = !matches!(body, ActionBody::Empty);
    let bytes = body_bytes(route, body);

    let mut headers = HeaderMap::new();
    if has_body && !route.response_mime_type().is_empty() {
        set(&mut headers, header::CONTENT_TYPE, &content_type_for(route.response_mime_type()));
    }
    if !route.response_locale().is_empty() {
        set(&mut headers, header::CONTENT_LANGUAGE, route.response_locale());
    }
    set(&mut headers, header::CACHE_CONTROL, &cache_control_for(route));
    if route.response_is_download() {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            route.response_download_file_name().replace('"', "")
        );
        set(&mut headers, header::CONTENT_DISPOSITION, &disposition);
    }
    for (name, value) in route.response_headers() {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            set(&mut headers, name, value);
        }
    }
    for (name, value) in action_headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    if has_body {
        set(&mut headers, header::CONTENT_LENGTH, &bytes.len().to_string());
    }

    let body = if head_only || !status_has_body(status) {
        Body::empty()
    } else {
        Body::from(bytes)
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn status_has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Redirect response with `Cache-Control: no-store`.
pub fn redirect(status: StatusCode, location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    set(response.headers_mut(), header::LOCATION, location);
    set(response.headers_mut(), header::CACHE_CONTROL, "no-store");
    response
}

/// Attach `Set-Cookie` values to a response.
pub fn append_cookies(response: &mut Response, cookies: &[String]) {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}
