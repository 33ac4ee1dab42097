use crate::config::Upstream;
use crate::constants::CONVERSATION_LIMIT_PATH;

/// Map an inbound `/api` path and raw query onto the upstream URL.
///
/// The limit check lives under `/public-api` and always carries the `?`
/// separator, even for an empty query. Every other path is forwarded as-is
/// under `/backend-api`, with the query only when there is one.
pub fn upstream_url(upstream: &Upstream, path: &str, raw_query: Option<&str>) -> String {
    let base = format!("{}://{}", upstream.scheme, upstream.host);
    let query = raw_query.unwrap_or_default();

    if path == CONVERSATION_LIMIT_PATH {
        format!("{base}/public-api{path}?{query}")
    } else if !query.is_empty() {
        format!("{base}/backend-api{path}?{query}")
    } else {
        format!("{base}/backend-api{path}")
    }
}
