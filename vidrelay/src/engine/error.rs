use std::time::Duration;

use thiserror::Error;

/**
    Failures inside the discovery loop.

    None of these reach HTTP handlers; the supervisor either logs and
    carries on, or restarts the browser session.
*/
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to launch browser: {0}")]
    Launch(#[source] anyhow::Error),

    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("navigation did not settle within {0:?}")]
    NavigationTimeout(Duration),

    #[error("reload did not settle within {0:?}")]
    ReloadTimeout(Duration),

    #[error("browser session crashed: {0}")]
    SessionCrash(String),
}
