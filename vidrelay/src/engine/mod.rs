pub mod browser;
pub mod error;
pub mod playback;
pub mod renewal;
pub mod sniffer;

pub use browser::ChromeLauncher;
pub use sniffer::{Sniffer, SnifferConfig};

#[cfg(test)]
pub mod fake;
