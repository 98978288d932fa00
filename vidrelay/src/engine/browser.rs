use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrome_browser::{ChromeBrowser, ChromeBrowserTab, ChromeLaunchOptions};
use reqwest::header::HeaderMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stream::find_manifest_url;

/// How long the network pump waits for a manifest response before moving on.
const RESPONSE_WAIT: Duration = Duration::from_secs(5);

/// A network event observed on the page.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// Outbound request, with the headers the browser sent.
    Request { url: String, headers: HeaderMap },
    /// A response arrived for `url`.
    Response { url: String },
}

impl NetworkEvent {
    pub fn url(&self) -> &str {
        match self {
            NetworkEvent::Request { url, .. } | NetworkEvent::Response { url } => url,
        }
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            NetworkEvent::Request { headers, .. } => Some(headers),
            NetworkEvent::Response { .. } => None,
        }
    }
}

/// Starts fresh browser sessions.
pub trait Launcher: Send + Sync + 'static {
    type Session: BrowserSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A running browser.
pub trait BrowserSession: Send + Sync {
    type Page: Page;

    fn new_page(&self) -> impl Future<Output = Result<Self::Page>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/**
    A page the sniffer drives.

    Timeouts are applied by the caller; implementations may wait as long
    as the underlying engine does.
*/
pub trait Page: Send + Sync {
    /// Start forwarding network events. The sender is dropped when the page dies.
    fn observe(&self, events: mpsc::Sender<NetworkEvent>);

    fn navigate(&self, url: &str) -> impl Future<Output = Result<()>> + Send;

    fn reload(&self) -> impl Future<Output = Result<()>> + Send;

    fn click(&self, selector: &str) -> impl Future<Output = Result<()>> + Send;
}

// ── Chrome ───────────────────────────────────────────────────────────────────

/**
    Launches Chrome through `chrome-browser`.
*/
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub headless: bool,
    pub proxy: Option<String>,
}

impl Launcher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession> {
        let mut options = ChromeLaunchOptions::default()
            .headless(self.headless)
            .devtools(false)
            .enable_gpu(self.headless);

        if let Some(ref proxy) = self.proxy {
            options = options.proxy_server(proxy);
        }

        let browser = ChromeBrowser::new(options).await?;
        Ok(ChromeSession { browser })
    }
}

pub struct ChromeSession {
    browser: ChromeBrowser,
}

impl BrowserSession for ChromeSession {
    type Page = ChromePage;

    async fn new_page(&self) -> Result<ChromePage> {
        let tab = self
            .browser
            .get_tab(0)
            .await
            .ok_or_else(|| anyhow!("No browser tab available"))?;
        Ok(ChromePage {
            tab,
            current_url: Mutex::new(None),
        })
    }

    async fn close(self) {
        let _ = self.browser.close().await;
    }
}

pub struct ChromePage {
    tab: ChromeBrowserTab,
    current_url: Mutex<Option<String>>,
}

impl Page for ChromePage {
    fn observe(&self, events: mpsc::Sender<NetworkEvent>) {
        let mut requests = self.tab.network().requests();
        tokio::spawn(async move {
            while let Some(request) = requests.next().await {
                let url = request.url().to_string();
                let headers = request.headers().clone();
                let is_manifest = find_manifest_url(&url).is_some();

                let event = NetworkEvent::Request {
                    url: url.clone(),
                    headers,
                };
                if events.send(event).await.is_err() {
                    break;
                }

                if is_manifest
                    && let Ok(Ok(_)) = tokio::time::timeout(RESPONSE_WAIT, request.response()).await
                    && events.send(NetworkEvent::Response { url }).await.is_err()
                {
                    break;
                }
            }
            debug!("network event stream ended");
        });
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        if let Ok(mut current) = self.current_url.lock() {
            *current = Some(url.to_string());
        }
        self.tab.navigate(url).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let url = self
            .current_url
            .lock()
            .ok()
            .and_then(|current| current.clone())
            .ok_or_else(|| anyhow!("Nothing to reload"))?;
        self.tab.navigate(&url).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.tab.wait_for_selector(selector).await?;
        element.click().await?;
        Ok(())
    }
}
