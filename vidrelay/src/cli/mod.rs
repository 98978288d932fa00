use std::time::Duration;

use anyhow::Result;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

use crate::engine::{ChromeLauncher, SnifferConfig};

mod probe;
mod serve;

pub use probe::ProbeCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "vidrelay")]
#[command(about = "HLS relay that keeps a browser-discovered manifest URL fresh")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP relay and manifest sniffer (default)
    Serve(ServeCommand),
    /// Run discovery once, print the first manifest found and exit
    Probe(ProbeCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or_else(|| Command::Serve(ServeCommand::default()));

        match command {
            Command::Serve(cmd) => cmd.run().await,
            Command::Probe(cmd) => cmd.run().await,
        }
    }
}

/// Options shared by every command that runs the sniffer.
#[derive(ClapArgs, Debug, Clone)]
pub struct DiscoveryArgs {
    /// Page whose player requests the manifest
    #[arg(
        long,
        env = "START_URL",
        default_value = "https://www.tvplusgratis2.com/espn-en-vivo.html"
    )]
    pub start_url: String,

    /// Reload the page this many seconds before the manifest expires
    #[arg(long, env = "EXPIRY_GUARD_S", default_value = "45")]
    pub expiry_guard: u64,

    /// Log a heartbeat while no manifest has been found
    #[arg(
        long,
        env = "PRINT_HEARTBEAT",
        default_value = "1",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub heartbeat: bool,

    /// Run Chrome headless
    #[arg(
        long,
        env = "HEADLESS",
        default_value = "true",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub headless: bool,

    /// HTTP or SOCKS proxy for both the browser and upstream requests
    #[arg(long, env = "UPSTREAM_PROXY")]
    pub proxy: Option<String>,

    /// Max seconds to wait for the start page to load
    #[arg(long, env = "NAVIGATION_TIMEOUT_S", default_value = "45")]
    pub navigation_timeout: u64,

    /// Max seconds to wait for a renewal reload
    #[arg(long, env = "RELOAD_TIMEOUT_S", default_value = "15")]
    pub reload_timeout: u64,

    /// Seconds to wait before relaunching a crashed browser session
    #[arg(long, env = "RESTART_BACKOFF_S", default_value = "3")]
    pub restart_backoff: u64,
}

impl DiscoveryArgs {
    pub fn launcher(&self) -> ChromeLauncher {
        ChromeLauncher {
            headless: self.headless,
            proxy: self.proxy.clone(),
        }
    }

    pub fn sniffer_config(&self) -> SnifferConfig {
        SnifferConfig {
            start_url: self.start_url.clone(),
            expiry_guard: Duration::from_secs(self.expiry_guard),
            heartbeat: self.heartbeat,
            navigation_timeout: Duration::from_secs(self.navigation_timeout),
            reload_timeout: Duration::from_secs(self.reload_timeout),
            restart_backoff: Duration::from_secs(self.restart_backoff),
            ..SnifferConfig::default()
        }
    }
}
