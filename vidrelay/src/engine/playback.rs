use std::time::Duration;

use tracing::debug;

use super::browser::Page;

/// Common player controls, tried in order.
pub const PLAY_SELECTORS: &[&str] = &[
    "button[aria-label='Play']",
    ".jw-icon-play",
    ".vjs-big-play-button",
    "button.play",
];

/**
    Try to start playback by clicking the first matching control.

    Returns the selector that was clicked. Failures are ignored; playback
    only helps the page request its manifest sooner.
*/
pub async fn nudge<'a, P: Page>(
    page: &P,
    selectors: &[&'a str],
    per_selector: Duration,
) -> Option<&'a str> {
    for &selector in selectors {
        match tokio::time::timeout(per_selector, page.click(selector)).await {
            Ok(Ok(())) => return Some(selector),
            Ok(Err(e)) => debug!(selector, error = %e, "play control not clickable"),
            Err(_) => debug!(selector, "play control not found in time"),
        }
    }
    None
}
