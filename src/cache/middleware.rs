//! Response-caching middleware for the index route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::debug;

use super::store::{CachedPage, Clock, PageCache, PageKey, hash_query};

/// Largest response body the cache will hold.
const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state handed to the middleware layer.
#[derive(Clone)]
pub struct CacheState {
    pub store: Arc<PageCache>,
    pub clock: Arc<dyn Clock>,
    /// Requests carrying this cookie belong to a logged-in viewer and
    /// bypass the cache: only the anonymous rendering of the index is
    /// shared between readers.
    pub session_cookie: &'static str,
}

/// Serve GET requests from the page cache, populating it on a miss.
///
/// Expiry is the only automatic invalidation: a write landing during
/// the TTL window stays invisible here until the deadline passes or the
/// store is cleared explicitly.
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if has_session_cookie(&request, cache.session_cookie) {
        return next.run(request).await;
    }

    let key = PageKey {
        path: request.uri().path().to_string(),
        query_hash: hash_query(request.uri().query().unwrap_or("")),
    };
    let now = cache.clock.now();

    if let Some(cached) = cache.store.get(&key, now) {
        counter!("verso_page_cache_hit_total").increment(1);
        debug!(
            target: "verso::cache",
            path = %key.path,
            outcome = "hit",
            "serving cached index page"
        );
        return rebuild_response(cached);
    }

    counter!("verso_page_cache_miss_total").increment(1);
    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            // Oversized or failed body: hand back an error instead of a
            // half-read response.
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    cache
        .store
        .insert(key, parts.status.as_u16(), headers, bytes.clone(), now);

    Response::from_parts(parts, Body::from(bytes))
}

fn has_session_cookie(request: &Request<Body>, cookie_name: &str) -> bool {
    request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .any(|pair| {
            pair.trim()
                .split_once('=')
                .is_some_and(|(name, _)| name == cookie_name)
        })
}

fn rebuild_response(cached: CachedPage) -> Response {
    use axum::http::HeaderValue;

    let mut builder = Response::builder().status(cached.status);
    for (name, value) in cached.headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn detects_session_cookie_among_others() {
        let request = get_request(Some("theme=dark; verso_session=abc123"));
        assert!(has_session_cookie(&request, "verso_session"));
    }

    #[test]
    fn ignores_other_cookies() {
        let request = get_request(Some("theme=dark; tracker=1"));
        assert!(!has_session_cookie(&request, "verso_session"));
    }

    #[test]
    fn no_cookie_header_means_anonymous() {
        let request = get_request(None);
        assert!(!has_session_cookie(&request, "verso_session"));
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let request = get_request(Some("verso_session_old=zzz"));
        assert!(!has_session_cookie(&request, "verso_session"));
    }
}
