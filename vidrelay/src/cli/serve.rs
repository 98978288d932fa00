use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::{signal, sync::watch};
use tracing::{error, info};

use crate::engine::Sniffer;
use crate::server::{AppState, UpstreamClient};
use crate::stream::DescriptorStore;

use super::DiscoveryArgs;

#[derive(Parser, Debug)]
pub struct ServeCommand {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Extra path serving the rewritten manifest (e.g. /espn.m3u8)
    #[arg(long, env = "MANIFEST_ALIAS")]
    pub manifest_alias: Option<String>,

    /// Public root used in rewritten playlists (default: from request headers)
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Upstream connect/read timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_S", default_value = "15")]
    pub upstream_timeout: u64,
}

impl Default for ServeCommand {
    /// Flags are not available here, but environment variables still apply.
    fn default() -> Self {
        Self::parse_from(["serve"])
    }
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        // Shutdown signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Core state
        let store = DescriptorStore::new();
        let upstream = UpstreamClient::new(
            Duration::from_secs(self.upstream_timeout),
            self.discovery.proxy.as_deref(),
        )?;

        // Discovery runs in the background; the server answers 503 until it finds a manifest
        let discovery = Sniffer::new(
            self.discovery.launcher(),
            store.clone(),
            self.discovery.sniffer_config(),
            shutdown_rx.clone(),
        )
        .start();

        let addr = SocketAddr::new(self.host, self.port);
        info!(%addr, start_url = %self.discovery.start_url, "HTTP relay listening");

        let state = AppState {
            store,
            upstream,
            public_base_url: self.public_base_url,
        };
        let mut server_handle = {
            let shutdown_rx = shutdown_rx.clone();
            let alias = self.manifest_alias;
            tokio::spawn(async move {
                if let Err(e) = crate::server::run_server(addr, state, alias, shutdown_rx).await {
                    error!(error = %e, "server error");
                }
            })
        };

        // Wait for Ctrl+C, or for the server to give up on its own
        let server_exited = tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                false
            }
            _ = &mut server_handle => true,
        };

        info!("shutting down");
        let _ = shutdown_tx.send(true);

        discovery.join().await;
        if !server_exited {
            let _ = server_handle.await;
        }

        info!("done");
        Ok(())
    }
}
