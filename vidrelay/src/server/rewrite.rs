use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

/// Path (relative to the public root) that serves relayed resources.
pub const RELAY_PATH: &str = "relay";

/// Everything but RFC 3986 unreserved characters gets escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Public URL that relays `target` through this server.
pub fn relay_url(public_base: &str, target: &str) -> String {
    format!(
        "{public_base}{RELAY_PATH}?u={}",
        utf8_percent_encode(target, QUERY_VALUE)
    )
}

/// Resolve a playlist reference against the playlist's own URL.
pub fn resolve_reference(base: Option<&Url>, reference: &str) -> String {
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    match base.and_then(|base| base.join(reference).ok()) {
        Some(resolved) => resolved.to_string(),
        None => reference.to_string(),
    }
}

/**
    Rewrite every URI line of an HLS playlist to go through the relay.

    Tag/comment lines and blank lines are copied unchanged. Each other
    line is resolved against `upstream_base` and wrapped as
    `{public_base}relay?u=<encoded absolute URL>`. The output always ends
    with a single newline.
*/
pub fn rewrite_playlist(text: &str, upstream_base: &str, public_base: &str) -> String {
    let base = Url::parse(upstream_base).ok();

    let mut out = String::with_capacity(text.len() * 2);
    for line in text.lines() {
        let reference = line.trim();
        if reference.is_empty() || reference.starts_with('#') {
            out.push_str(line);
        } else {
            let absolute = resolve_reference(base.as_ref(), reference);
            out.push_str(&relay_url(public_base, &absolute));
        }
        out.push('\n');
    }

    let kept = out.trim_end_matches('\n').len();
    out.truncate(kept);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use percent_encoding::percent_decode_str;

    const BASE: &str = "https://o.example/a/index.m3u8?expires=1000";
    const PUBLIC: &str = "http://relay.local/";

    fn decoded_target(line: &str) -> String {
        let encoded = line
            .strip_prefix("http://relay.local/relay?u=")
            .expect("relay URL");
        percent_decode_str(encoded).decode_utf8().unwrap().into_owned()
    }

    #[test]
    fn test_relative_segment() {
        let out = rewrite_playlist("seg1.ts", BASE, PUBLIC);
        assert_eq!(
            out,
            "http://relay.local/relay?u=https%3A%2F%2Fo.example%2Fa%2Fseg1.ts\n"
        );
    }

    #[test]
    fn test_mixed_playlist() {
        let text = "#EXTM3U\n\
                    #EXT-X-VERSION:3\n\
                    \n\
                    #EXTINF:4.0,\n\
                    seg1.ts?part=1\n\
                    #EXTINF:4.0,\n\
                    ../b/seg2.ts\n\
                    /root/seg3.ts\n\
                    https://cdn.example/x/seg4.ts?sig=a+b\n";

        let out = rewrite_playlist(text, BASE, PUBLIC);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "#EXTINF:4.0,");
        assert_eq!(decoded_target(lines[4]), "https://o.example/a/seg1.ts?part=1");
        assert_eq!(decoded_target(lines[6]), "https://o.example/b/seg2.ts");
        assert_eq!(decoded_target(lines[7]), "https://o.example/root/seg3.ts");
        assert_eq!(decoded_target(lines[8]), "https://cdn.example/x/seg4.ts?sig=a+b");
        assert!(out.ends_with(".ts%3Fsig%3Da%2Bb\n"));
    }

    #[test]
    fn test_variant_playlist_keeps_tags() {
        let text = "#EXTM3U\r\n\
                    #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\r\n\
                    low/index.m3u8\r\n";

        let out = rewrite_playlist(text, BASE, PUBLIC);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(
            lines[1],
            "#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360"
        );
        assert_eq!(decoded_target(lines[2]), "https://o.example/a/low/index.m3u8");
    }

    #[test]
    fn test_single_trailing_newline() {
        assert_eq!(rewrite_playlist("#EXTM3U", BASE, PUBLIC), "#EXTM3U\n");
        assert_eq!(rewrite_playlist("#EXTM3U\n\n\n", BASE, PUBLIC), "#EXTM3U\n");
        assert_eq!(rewrite_playlist("", BASE, PUBLIC), "\n");
    }

    #[test]
    fn test_scheme_relative_reference() {
        let out = rewrite_playlist("//cdn.example/seg.ts", BASE, PUBLIC);
        assert_eq!(decoded_target(out.trim_end()), "https://cdn.example/seg.ts");
    }

    #[test]
    fn test_rewrite_is_stable() {
        let text = "#EXTM3U\nseg1.ts\n";
        assert_eq!(
            rewrite_playlist(text, BASE, PUBLIC),
            rewrite_playlist(text, BASE, PUBLIC)
        );
    }

    #[test]
    fn test_resolve_without_base() {
        assert_eq!(resolve_reference(None, "seg1.ts"), "seg1.ts");
        assert_eq!(
            resolve_reference(None, "https://o.example/x.ts"),
            "https://o.example/x.ts"
        );
    }
}
