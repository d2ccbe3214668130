//! Request and response rewriting.
//!
//! # Responsibilities
//! - Point the outbound request at the upstream (scheme, authority, version)
//! - Strip client-identifying headers and pin `Host` on proxied paths
//! - Add the permissive CORS header to successful proxied responses
//! - Remove hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - Rewriters are total: they report what they did as a value instead of
//!   failing, so a response always reaches the client
//! - Only headers are touched; bodies stream through untouched

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, StatusCode, Uri, Version};

use crate::proxy::error::ForwardError;
use crate::proxy::path_filter::PathFilter;
use crate::proxy::Exchange;

/// Header carrying the originating client IP chain.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header carrying the real client IP hint.
pub const X_REAL_IP: &str = "x-real-ip";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// One request on its way upstream: the inbound identity and the outbound copy.
#[derive(Debug)]
pub struct ProxyRequest {
    pub inbound: Exchange,
    pub outbound: Request<Body>,
}

/// Turn the inbound request into the outbound one aimed at the upstream.
///
/// Method, path, query, headers and the body stream are carried over; the
/// URI gains the upstream scheme and authority and the protocol version is
/// left for the connection to negotiate.
pub fn direct(
    inbound: Request<Body>,
    scheme: &Scheme,
    authority: &Authority,
) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = inbound.into_parts();

    let mut uri = parts.uri.into_parts();
    uri.scheme = Some(scheme.clone());
    uri.authority = Some(authority.clone());
    if uri.path_and_query.is_none() {
        uri.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = Uri::from_parts(uri).map_err(axum::http::Error::from)?;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);

    Ok(Request::from_parts(parts, body))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// What the request rewriter did to an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRewrite {
    /// Path outside the proxied namespace; forwarded as-is.
    Passthrough,
    /// Forwarding headers stripped and `Host` pinned to the upstream.
    Rewritten,
}

/// Mutates outbound requests on proxied paths.
///
/// Policy: `X-Forwarded-For` and `X-Real-IP` are always stripped, never
/// passed through, so client addresses do not reach the upstream.
#[derive(Debug, Clone)]
pub struct RequestRewriter {
    filter: PathFilter,
    upstream_host: HeaderValue,
}

impl RequestRewriter {
    pub fn new(filter: PathFilter, upstream_host: HeaderValue) -> Self {
        Self {
            filter,
            upstream_host,
        }
    }

    pub fn rewrite(&self, request: &mut ProxyRequest) -> RequestRewrite {
        let outbound = &mut request.outbound;
        if !self.filter.is_proxied(outbound.uri().path()) {
            return RequestRewrite::Passthrough;
        }

        let headers = outbound.headers_mut();
        headers.remove(X_FORWARDED_FOR);
        headers.remove(X_REAL_IP);
        headers.insert(header::HOST, self.upstream_host.clone());

        outbound
            .extensions_mut()
            .remove::<ConnectInfo<SocketAddr>>();

        RequestRewrite::Rewritten
    }
}

/// What the response rewriter did to an upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRewrite {
    /// `Access-Control-Allow-Origin: *` was added.
    Applied,
    /// The upstream already set `Access-Control-Allow-Origin`.
    AlreadyPresent,
    /// Status was not 200.
    NotOk(StatusCode),
    /// The originating path is outside the proxied namespace.
    NotProxied,
}

/// Mutates response headers of successful proxied exchanges.
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
    filter: PathFilter,
}

impl ResponseRewriter {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    /// Add the CORS header when `response` answers a proxied `path` with 200.
    pub fn rewrite<B>(&self, path: &str, response: &mut Response<B>) -> ResponseRewrite {
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(code = status.as_u16(), "receive a not ok response code, ignore");
            return ResponseRewrite::NotOk(status);
        }
        if !self.filter.is_proxied(path) {
            return ResponseRewrite::NotProxied;
        }

        match response
            .headers_mut()
            .entry(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        {
            header::Entry::Occupied(_) => ResponseRewrite::AlreadyPresent,
            header::Entry::Vacant(entry) => {
                entry.insert(HeaderValue::from_static("*"));
                ResponseRewrite::Applied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> Authority {
        Authority::from_static("api.example.com")
    }

    fn upstream_host() -> HeaderValue {
        HeaderValue::from_static("api.example.com")
    }

    fn proxy_request(uri: &str) -> ProxyRequest {
        let inbound = Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", "proxy.local:6789")
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "10.0.0.1")
            .header("authorization", "Bearer sk-test")
            .header("connection", "keep-alive, x-hop")
            .header("x-hop", "1")
            .header("keep-alive", "timeout=5")
            .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5555))))
            .body(Body::empty())
            .unwrap();
        let exchange = Exchange::begin(&inbound);
        let outbound = direct(inbound, &Scheme::HTTPS, &authority()).unwrap();
        ProxyRequest {
            inbound: exchange,
            outbound,
        }
    }

    #[test]
    fn direct_targets_upstream_and_keeps_path() {
        let request = proxy_request("/v1/chat/completions?stream=true");
        let uri = request.outbound.uri();
        assert_eq!(uri.scheme_str(), Some("https"));
        assert_eq!(uri.authority().unwrap().as_str(), "api.example.com");
        assert_eq!(uri.path(), "/v1/chat/completions");
        assert_eq!(uri.query(), Some("stream=true"));
        assert_eq!(request.outbound.method(), "POST");
        assert_eq!(request.outbound.version(), Version::HTTP_11);
    }

    #[test]
    fn direct_strips_hop_by_hop_headers() {
        let request = proxy_request("/health");
        let headers = request.outbound.headers();
        assert!(headers.get("connection").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-hop").is_none());
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn proxied_request_loses_client_headers() {
        let rewriter = RequestRewriter::new(PathFilter::new("/v1"), upstream_host());
        let mut request = proxy_request("/v1/chat/completions");

        assert_eq!(rewriter.rewrite(&mut request), RequestRewrite::Rewritten);

        let headers = request.outbound.headers();
        assert!(headers.get(X_FORWARDED_FOR).is_none());
        assert!(headers.get(X_REAL_IP).is_none());
        assert_eq!(headers.get("host").unwrap(), "api.example.com");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
        assert!(request
            .outbound
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .is_none());
        assert_eq!(
            request.inbound.remote_addr,
            Some(SocketAddr::from(([10, 0, 0, 1], 5555)))
        );
    }

    #[test]
    fn non_proxied_request_is_left_alone() {
        let rewriter = RequestRewriter::new(PathFilter::new("/v1"), upstream_host());
        let mut request = proxy_request("/health");
        let before = request.outbound.headers().clone();

        assert_eq!(rewriter.rewrite(&mut request), RequestRewrite::Passthrough);
        assert_eq!(request.outbound.headers(), &before);
        assert_eq!(request.outbound.headers().get("host").unwrap(), "proxy.local:6789");
    }

    fn response(status: StatusCode) -> Response<Body> {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn ok_proxied_response_gets_cors_header() {
        let rewriter = ResponseRewriter::new(PathFilter::new("/v1"));
        let mut resp = response(StatusCode::OK);

        assert_eq!(
            rewriter.rewrite("/v1/chat/completions", &mut resp),
            ResponseRewrite::Applied
        );
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[test]
    fn error_responses_are_untouched() {
        let rewriter = ResponseRewriter::new(PathFilter::new("/v1"));
        for status in [StatusCode::UNAUTHORIZED, StatusCode::CREATED, StatusCode::BAD_GATEWAY] {
            let mut resp = response(status);
            let before = resp.headers().clone();
            assert_eq!(
                rewriter.rewrite("/v1/chat/completions", &mut resp),
                ResponseRewrite::NotOk(status)
            );
            assert_eq!(resp.headers(), &before);
        }
    }

    #[test]
    fn non_proxied_response_is_untouched() {
        let rewriter = ResponseRewriter::new(PathFilter::new("/v1"));
        let mut resp = response(StatusCode::OK);
        assert_eq!(rewriter.rewrite("/health", &mut resp), ResponseRewrite::NotProxied);
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn upstream_cors_header_is_not_duplicated() {
        let rewriter = ResponseRewriter::new(PathFilter::new("/v1"));
        let mut resp = response(StatusCode::OK);
        resp.headers_mut()
            .insert("access-control-allow-origin", HeaderValue::from_static("https://app.example"));

        assert_eq!(
            rewriter.rewrite("/v1/models", &mut resp),
            ResponseRewrite::AlreadyPresent
        );
        let values: Vec<_> = resp
            .headers()
            .get_all("access-control-allow-origin")
            .iter()
            .collect();
        assert_eq!(values, vec!["https://app.example"]);
    }
}
