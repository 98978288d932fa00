use std::sync::LazyLock;

use regex::Regex;
use url::Url;

pub const MANIFEST_EXTENSION: &str = ".m3u8";

static MANIFEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s'"<>]+?\.m3u8(?:\?[^\s'"<>]*)?"#)
        .expect("manifest URL pattern is valid")
});

/// Find the first manifest URL in `text` (usually a request URL).
pub fn find_manifest_url(text: &str) -> Option<&str> {
    MANIFEST_URL.find(text).map(|m| m.as_str())
}

/// Read the `expires` query parameter as Unix seconds.
pub fn parse_expires(url: &Url) -> Option<i64> {
    url.query_pairs()
        .find(|(key, _)| key == "expires")
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Whether the URL's path (ignoring any query) names a manifest.
pub fn is_manifest_path(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.to_ascii_lowercase().ends_with(MANIFEST_EXTENSION)
}
