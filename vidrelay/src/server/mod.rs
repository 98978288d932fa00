pub mod error;
pub mod rewrite;
pub mod routes;
pub mod upstream;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::stream::DescriptorStore;

pub use upstream::UpstreamClient;

/// Paths served regardless of configuration.
const BUILTIN_ROUTES: [&str; 3] = ["/health", "/manifest", "/relay"];

#[derive(Clone)]
pub struct AppState {
    pub store: DescriptorStore,
    pub upstream: UpstreamClient,
    /// Fixed public root (with trailing slash); derived per request when unset
    pub public_base_url: Option<String>,
}

/// Build the router. `manifest_alias` adds a second path serving `/manifest`.
pub fn router(state: AppState, manifest_alias: Option<&str>) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health))
        .route("/manifest", get(routes::manifest))
        .route("/relay", get(routes::relay));

    if let Some(alias) = manifest_alias.map(normalize_alias) {
        if BUILTIN_ROUTES.contains(&alias.as_str()) || alias == "/" {
            warn!(alias = %alias, "ignoring manifest alias that shadows a built-in route");
        } else {
            app = app.route(&alias, get(routes::manifest));
        }
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

fn normalize_alias(alias: &str) -> String {
    format!("/{}", alias.trim().trim_start_matches('/'))
}

/// Run the HTTP server.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    manifest_alias: Option<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state, manifest_alias.as_deref());

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
