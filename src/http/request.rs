//! Per-request server data.
//!
//! # Responsibilities
//! - Capture everything an action may ask about the request (method, URI,
//!   headers, client address, cookies, posted data)
//! - Resolve the client address, optionally from `X-Forwarded-For`
//! - Provide the request id header used by the tower-http layers
//!
//! # Design Decisions
//! - Built once per request and read-only afterwards
//! - Body is buffered up to the domain body limit before dispatch

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, HeaderName, Method, Request, Uri, Version};
use chrono::{DateTime, Utc};

use crate::error::EngineError;

/// Header carrying the request id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// How the client address is determined.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddressPolicy {
    pub trust_forwarded_for: bool,
}

/// Read-only view of one HTTP request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    client_ip: IpAddr,
    is_https: bool,
    domain_name: String,
    port: u16,
    root_path: PathBuf,
    now: DateTime<Utc>,
}

impl RequestContext {
    /// Buffer the body of `request` and build the context.
    pub async fn from_request(
        request: Request<Body>,
        peer: Option<SocketAddr>,
        policy: ClientAddressPolicy,
        root_path: &Path,
        body_limit: usize,
    ) -> Result<Self, EngineError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(|e| EngineError::InvalidRequest(format!("unreadable body: {e}")))?;
        Ok(Self::from_parts(parts, body, peer, policy, root_path))
    }

    pub fn from_parts(
        parts: Parts,
        body: Bytes,
        peer: Option<SocketAddr>,
        policy: ClientAddressPolicy,
        root_path: &Path,
    ) -> Self {
        let headers = parts.headers;
        let forwarded_proto = policy
            .trust_forwarded_for
            .then(|| header_str(&headers, "x-forwarded-proto"))
            .flatten()
            .map(|p| p.eq_ignore_ascii_case("https"));
        let is_https = parts.uri.scheme_str() == Some("https") || forwarded_proto == Some(true);

        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| header_str(&headers, header::HOST.as_str()).map(str::to_string))
            .unwrap_or_default();
        let (domain_name, port) = split_host(&authority, is_https);

        let forwarded_ip = policy
            .trust_forwarded_for
            .then(|| header_str(&headers, "x-forwarded-for"))
            .flatten()
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        let client_ip = forwarded_ip
            .or_else(|| peer.map(|p| p.ip()))
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers,
            body,
            client_ip,
            is_https,
            domain_name,
            port,
            root_path: root_path.to_path_buf(),
            now: Utc::now(),
        }
    }

    /// Arrival time of the request.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client_ip
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// `1.0`, `1.1`, `2.0` or `3.0`; `1.1` for anything else.
    pub fn http_version(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "0.9",
            Version::HTTP_10 => "1.0",
            Version::HTTP_2 => "2.0",
            Version::HTTP_3 => "3.0",
            _ => "1.1",
        }
    }

    pub fn is_use_https(&self) -> bool {
        self.is_https
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn protocol(&self) -> &'static str {
        if self.is_https {
            "https"
        } else {
            "http"
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_raw(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT.as_str()).unwrap_or_default()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID.as_str())
    }

    /// Raw `Cookie` header.
    pub fn cookies_raw(&self) -> &str {
        self.header(header::COOKIE.as_str()).unwrap_or_default()
    }

    /// Value of cookie `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
    }

    /// `scheme://authority/path?query`, without fragment.
    pub fn current_uri(&self) -> String {
        let default_port = if self.is_https { 443 } else { 80 };
        let authority = if self.port == default_port {
            self.domain_name.clone()
        } else {
            format!("{}:{}", self.domain_name, self.port)
        };
        let mut uri = format!("{}://{}{}", self.protocol(), authority, self.path());
        if let Some(query) = self.uri.query() {
            uri.push('?');
            uri.push_str(query);
        }
        uri
    }

    /// Decoded query string parameters.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(self.query_raw().as_bytes())
            .into_owned()
            .collect()
    }

    /// Query parameters plus an urlencoded form body. Body values win.
    pub fn posted_data(&self) -> BTreeMap<String, String> {
        let mut data = self.query_params();
        let is_form = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            data.extend(url::form_urlencoded::parse(&self.body).into_owned());
        }
        data
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Server variables in CGI naming.
    pub fn server_variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("REQUEST_METHOD".into(), self.method.to_string());
        vars.insert("REQUEST_URI".into(), self.uri.to_string());
        vars.insert("QUERY_STRING".into(), self.query_raw().to_string());
        vars.insert("SERVER_NAME".into(), self.domain_name.clone());
        vars.insert("SERVER_PORT".into(), self.port.to_string());
        vars.insert(
            "SERVER_PROTOCOL".into(),
            format!("HTTP/{}", self.http_version()),
        );
        vars.insert("REMOTE_ADDR".into(), self.client_ip.to_string());
        vars.insert("DOCUMENT_ROOT".into(), self.root_path.display().to_string());
        if self.is_https {
            vars.insert("HTTPS".into(), "on".into());
        }
        for (name, value) in &self.headers {
            if let Ok(value) = value.to_str() {
                let key = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
                vars.insert(key, value.to_string());
            }
        }
        vars
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn split_host(authority: &str, is_https: bool) -> (String, u16) {
    let default_port = if is_https { 443 } else { 80 };
    if authority.starts_with('[') {
        // IPv6 literal
        if let Some(end) = authority.find(']') {
            let host = authority[..=end].to_string();
            let port = authority[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return (host, port);
        }
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (authority.to_string(), default_port),
        },
        None => (authority.to_string(), default_port),
    }
}
