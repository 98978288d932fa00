use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tokio::sync::watch;

use crate::engine::Sniffer;
use crate::stream::DescriptorStore;
use crate::util::time;

use super::DiscoveryArgs;

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

impl ProbeCommand {
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = DescriptorStore::new();
        let mut updates = store.subscribe();

        println!("Probing: {}", self.discovery.start_url);

        let discovery = Sniffer::new(
            self.discovery.launcher(),
            store.clone(),
            self.discovery.sniffer_config(),
            shutdown_rx,
        )
        .start();

        let found = tokio::time::timeout(
            Duration::from_secs(self.timeout),
            updates.wait_for(|current| current.is_some()),
        )
        .await
        .is_ok_and(|result| result.is_ok());

        let _ = shutdown_tx.send(true);
        discovery.join().await;

        let Some(descriptor) = store.snapshot().filter(|_| found) else {
            bail!("No manifest found within {}s", self.timeout);
        };

        let headers: serde_json::Map<String, serde_json::Value> = descriptor
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned().into(),
                )
            })
            .collect();

        let report = serde_json::json!({
            "url": descriptor.url,
            "headers": headers,
            "expiresAt": descriptor.expires_at,
            "expiresAtUtc": descriptor.expires_at.map(time::format_unix),
            "lastSeen": descriptor.last_seen.to_rfc3339(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);

        Ok(())
    }
}
