//! Forwarding of admitted requests to their upstream.
//!
//! The request is replayed with the caller's method, headers and body against
//! the route's upstream URL, and the upstream response is streamed back as-is.
//! Only `Host` and the hop-by-hop headers are dropped on the way.

use std::time::Instant;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::metrics::REQUEST_LATENCY;

/// Build the client used for upstream traffic.
///
/// SECURITY: with `insecure_skip_verify` the client accepts any upstream
/// certificate, including self-signed and expired ones. A man-in-the-middle
/// between the gateway and its upstreams goes unnoticed in that mode.
pub fn build_client(insecure_skip_verify: bool) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(insecure_skip_verify)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()?;
    Ok(client)
}

pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

// Scheme, host and path come from the upstream; the query stays the caller's
pub fn target_url(upstream: &Url, query: Option<&str>) -> Url {
    let mut target = upstream.clone();
    target.set_query(query);
    target
}

fn filter_headers(headers: &HeaderMap, drop_host: bool) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop_header(name) || (drop_host && *name == header::HOST) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

pub async fn forward(
    client: &reqwest::Client,
    upstream: &Url,
    req: Request,
) -> std::result::Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let url = target_url(upstream, parts.uri.query());

    let mut outbound = client
        .request(parts.method, url.clone())
        .headers(filter_headers(&parts.headers, true));
    if !body.is_end_stream() {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let start_time = Instant::now();
    let res = outbound.send().await?;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let status = res.status();
    debug!(upstream = %url, status = status.as_u16(), "upstream responded");

    let headers = filter_headers(res.headers(), false);
    // a caller hanging up just drops this stream; an upstream abort ends the response early
    let stream = res
        .bytes_stream()
        .inspect_err(move |e| warn!(upstream = %url, error = %e, "upstream body aborted"));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_target_url_keeps_caller_query() {
        let upstream = Url::parse("https://upstream.example/file?ignored=1").unwrap();
        assert_eq!(
            target_url(&upstream, Some("v=2&x=y")).as_str(),
            "https://upstream.example/file?v=2&x=y"
        );
        assert_eq!(target_url(&upstream, None).as_str(), "https://upstream.example/file");
    }

    #[test]
    fn test_filter_headers_drops_host_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.append("x-multi", HeaderValue::from_static("a"));
        headers.append("x-multi", HeaderValue::from_static("b"));

        let forwarded = filter_headers(&headers, true);
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get("keep-alive").is_none());
        assert_eq!(forwarded.get(header::AUTHORIZATION).unwrap(), "Bearer t");
        assert_eq!(forwarded.get_all("x-multi").iter().count(), 2);

        let returned = filter_headers(&headers, false);
        assert_eq!(returned.get(header::HOST).unwrap(), "gateway.local");
    }
}
