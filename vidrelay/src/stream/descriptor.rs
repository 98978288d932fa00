use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tokio::sync::watch;

/**
    The live upstream manifest, as last observed by the sniffer.

    Values are immutable once published; a renewal swaps in a whole new
    descriptor instead of patching fields.
*/
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Absolute manifest URL
    pub url: String,
    /// Headers forwarded on every upstream fetch for this manifest
    pub headers: HeaderMap,
    /// Optional expiration timestamp (Unix seconds) taken from the URL
    pub expires_at: Option<i64>,
    /// When the sniffer observed this manifest
    pub last_seen: DateTime<Utc>,
}

impl StreamDescriptor {
    /// Whether publishing `other` over `self` would change what gets served.
    pub fn differs_from(&self, other: &StreamDescriptor) -> bool {
        self.url != other.url || self.expires_at != other.expires_at
    }
}

/**
    Holder for the single current descriptor.

    Backed by a `watch` channel: the sniffer is the only writer, request
    handlers take `Arc` snapshots, so a reader always sees one complete
    descriptor.
*/
#[derive(Clone)]
pub struct DescriptorStore {
    tx: Arc<watch::Sender<Option<Arc<StreamDescriptor>>>>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Current descriptor, if one has been discovered.
    pub fn snapshot(&self) -> Option<Arc<StreamDescriptor>> {
        self.tx.borrow().clone()
    }

    /**
        Publish `candidate` if its URL or expiry differs from the current
        descriptor. Returns `true` when the descriptor was replaced.
    */
    pub fn replace_if_changed(&self, candidate: StreamDescriptor) -> bool {
        self.tx.send_if_modified(|current| {
            let changed = match current {
                Some(existing) => existing.differs_from(&candidate),
                None => true,
            };
            if changed {
                *current = Some(Arc::new(candidate));
            }
            changed
        })
    }

    /// Subscribe to descriptor replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<StreamDescriptor>>> {
        self.tx.subscribe()
    }
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}
