use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

pub const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const FALLBACK_ACCEPT: &str = "*/*";
pub const FALLBACK_ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.8";

/**
    Build the header set forwarded upstream for a manifest.

    Starts from the headers the browser sent, pins `Referer` and `Origin`
    to the manifest's origin, and fills `User-Agent`, `Accept` and
    `Accept-Language` with fixed values when the browser did not send them.
*/
pub fn normalize_headers(observed: &HeaderMap, manifest_url: &Url) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(observed.len() + 5);
    for (name, value) in observed {
        if !is_transport_header(name) {
            out.append(name.clone(), value.clone());
        }
    }

    let referer = origin_of(manifest_url);
    let origin = referer.trim_end_matches('/');
    if let Ok(value) = HeaderValue::from_str(&referer) {
        out.insert(header::REFERER, value);
    }
    if let Ok(value) = HeaderValue::from_str(origin) {
        out.insert(header::ORIGIN, value);
    }

    set_default(&mut out, header::USER_AGENT, FALLBACK_USER_AGENT);
    set_default(&mut out, header::ACCEPT, FALLBACK_ACCEPT);
    set_default(&mut out, header::ACCEPT_LANGUAGE, FALLBACK_ACCEPT_LANGUAGE);

    out
}

/// Observed headers owned by the upstream client rather than the request.
/// Content-coding stays with the client so manifests arrive as plain text.
fn is_transport_header(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONTENT_LENGTH
        || *name == header::CONNECTION
        || *name == header::TRANSFER_ENCODING
        || *name == header::ACCEPT_ENCODING
}

/// `scheme://host/` of a URL, without port or path.
fn origin_of(url: &Url) -> String {
    format!("{}://{}/", url.scheme(), url.host_str().unwrap_or_default())
}

fn set_default(headers: &mut HeaderMap, name: HeaderName, fallback: &'static str) {
    let present = headers
        .get(&name)
        .is_some_and(|value| !value.as_bytes().is_empty());
    if !present {
        headers.insert(name, HeaderValue::from_static(fallback));
    }
}
