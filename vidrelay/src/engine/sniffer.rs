use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::stream::{
    DescriptorStore, StreamDescriptor, find_manifest_url, normalize_headers, parse_expires,
};
use crate::util::time::{self, Clock};

use super::browser::{BrowserSession, Launcher, NetworkEvent, Page};
use super::error::DiscoveryError;
use super::playback::{self, PLAY_SELECTORS};
use super::renewal::{RenewalScheduler, TickAction};

/// Network events buffered between the page and the sniffer.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct SnifferConfig {
    /// Page that plays the stream
    pub start_url: String,
    /// Reload this long before the manifest expires
    pub expiry_guard: Duration,
    /// Log while no manifest has been found
    pub heartbeat: bool,
    pub navigation_timeout: Duration,
    pub reload_timeout: Duration,
    /// Per play-control click attempt
    pub click_timeout: Duration,
    pub tick_interval: Duration,
    /// Pause before relaunching a crashed session
    pub restart_backoff: Duration,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            expiry_guard: Duration::from_secs(45),
            heartbeat: true,
            navigation_timeout: Duration::from_secs(45),
            reload_timeout: Duration::from_secs(15),
            click_timeout: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
            restart_backoff: Duration::from_secs(3),
        }
    }
}

/// Supervisor states, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Running,
    Crashed,
    Backoff,
}

/**
    Handle to a running sniffer task.
*/
pub struct DiscoveryHandle {
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Wait for the sniffer to stop (after shutdown has been signalled).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "discovery task panicked");
        }
    }
}

/**
    Keeps the descriptor store fed by watching a page's network traffic.

    Each session launches a browser, opens the start page, and then reacts
    to two things: network events (possible new manifests) and a fixed
    tick (renewal before expiry). A failed session is torn down and
    relaunched after a backoff; the last descriptor stays servable
    meanwhile.
*/
pub struct Sniffer<L: Launcher> {
    launcher: L,
    store: DescriptorStore,
    config: SnifferConfig,
    clock: Clock,
    shutdown_rx: watch::Receiver<bool>,
}

impl<L: Launcher> Sniffer<L> {
    pub fn new(
        launcher: L,
        store: DescriptorStore,
        config: SnifferConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            launcher,
            store,
            config,
            clock: time::system_clock(),
            shutdown_rx,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the supervisor loop.
    pub fn start(self) -> DiscoveryHandle {
        DiscoveryHandle {
            task: tokio::spawn(self.run()),
        }
    }

    pub async fn run(self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut restarts = 0u64;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            info!(
                state = ?SupervisorState::Running,
                restarts,
                url = %self.config.start_url,
                "starting browser session"
            );

            match self.run_session().await {
                Ok(()) => break,
                Err(e) => {
                    error!(
                        state = ?SupervisorState::Crashed,
                        error = %e,
                        "discovery session failed"
                    );
                    restarts += 1;
                    info!(
                        state = ?SupervisorState::Backoff,
                        backoff = ?self.config.restart_backoff,
                        "restarting discovery"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.restart_backoff) => {}
                        _ = wait_for_shutdown(&mut shutdown_rx) => break,
                    }
                }
            }
        }

        info!("discovery stopped");
    }

    async fn run_session(&self) -> Result<(), DiscoveryError> {
        let session = self
            .launcher
            .launch()
            .await
            .map_err(DiscoveryError::Launch)?;
        let mut shutdown_rx = self.shutdown_rx.clone();
        let result = tokio::select! {
            result = self.drive(&session) => result,
            _ = wait_for_shutdown(&mut shutdown_rx) => Ok(()),
        };
        session.close().await;
        result
    }

    async fn drive(&self, session: &L::Session) -> Result<(), DiscoveryError> {
        let page = session
            .new_page()
            .await
            .map_err(|e| DiscoveryError::SessionCrash(e.to_string()))?;

        // Observe before navigating so the first manifest request is not missed
        let (events_tx, mut events) = mpsc::channel(EVENT_BUFFER);
        page.observe(events_tx);

        let start_url = self.config.start_url.as_str();
        let timeout = self.config.navigation_timeout;
        let navigation = tokio::time::timeout(timeout, page.navigate(start_url));
        match self.drain_while(&mut events, navigation).await {
            Ok(Ok(())) => debug!(url = start_url, "page loaded"),
            Ok(Err(source)) => {
                return Err(DiscoveryError::Navigation {
                    url: start_url.to_string(),
                    source,
                });
            }
            Err(_) => {
                let e = DiscoveryError::NavigationTimeout(timeout);
                warn!(error = %e, "continuing with unsettled page");
            }
        }

        let nudge = playback::nudge(&page, PLAY_SELECTORS, self.config.click_timeout);
        if let Some(selector) = self.drain_while(&mut events, nudge).await {
            debug!(selector, "clicked play control");
        }

        let guard_secs = i64::try_from(self.config.expiry_guard.as_secs()).unwrap_or(i64::MAX);
        let mut scheduler =
            RenewalScheduler::new(guard_secs, self.config.heartbeat, (self.clock)());
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        return Err(DiscoveryError::SessionCrash(
                            "network event stream closed".to_string(),
                        ));
                    }
                },
                _ = ticker.tick() => {
                    let current = self.store.snapshot();
                    match scheduler.on_tick(current.as_deref(), (self.clock)()) {
                        TickAction::Reload { expires_at, first_attempt } => {
                            if first_attempt {
                                info!(
                                    expires = %time::format_unix(expires_at),
                                    "manifest about to expire, reloading page"
                                );
                            }
                            self.reload(&page, &mut events).await;
                        }
                        TickAction::Heartbeat => info!("waiting for manifest..."),
                        TickAction::Idle => {}
                    }
                }
            }
        }
    }

    async fn reload<P: Page>(&self, page: &P, events: &mut mpsc::Receiver<NetworkEvent>) {
        let timeout = self.config.reload_timeout;
        let reload = tokio::time::timeout(timeout, page.reload());
        match self.drain_while(events, reload).await {
            Ok(Ok(())) => debug!("page reloaded"),
            Ok(Err(e)) => debug!(error = %e, "reload failed, retrying next tick"),
            Err(_) => {
                let e = DiscoveryError::ReloadTimeout(timeout);
                debug!(error = %e, "retrying next tick");
            }
        }
    }

    /// Await `fut` while still consuming network events.
    async fn drain_while<F: Future>(
        &self,
        events: &mut mpsc::Receiver<NetworkEvent>,
        fut: F,
    ) -> F::Output {
        tokio::pin!(fut);
        let mut open = true;
        loop {
            tokio::select! {
                output = &mut fut => return output,
                event = events.recv(), if open => match event {
                    Some(event) => self.handle_event(&event),
                    None => open = false,
                },
            }
        }
    }

    fn handle_event(&self, event: &NetworkEvent) {
        let Some(mut candidate) = descriptor_from_event(event) else {
            return;
        };
        candidate.last_seen = time::from_unix((self.clock)()).unwrap_or_else(time::now);

        let url = candidate.url.clone();
        let expires_at = candidate.expires_at;
        if self.store.replace_if_changed(candidate) {
            match expires_at {
                Some(ts) => info!(url = %url, expires = %time::format_unix(ts), "new manifest"),
                None => info!(url = %url, "new manifest"),
            }
        }
    }
}

/**
    Build a descriptor from a network event, if its URL is a manifest.
*/
pub fn descriptor_from_event(event: &NetworkEvent) -> Option<StreamDescriptor> {
    let raw = find_manifest_url(event.url())?;
    let url = Url::parse(raw).ok()?;

    let empty = HeaderMap::new();
    let headers = normalize_headers(event.headers().unwrap_or(&empty), &url);

    Some(StreamDescriptor {
        url: raw.to_string(),
        headers,
        expires_at: parse_expires(&url),
        last_seen: time::now(),
    })
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    use reqwest::header::{self, HeaderValue};

    use crate::engine::fake::FakeBrowser;

    const START_URL: &str = "https://page.example/live.html";
    const MANIFEST: &str = "https://o.example/a/index.m3u8?expires=1000";

    struct Harness {
        browser: FakeBrowser,
        store: DescriptorStore,
        now: Arc<AtomicI64>,
        shutdown_tx: watch::Sender<bool>,
        handle: DiscoveryHandle,
    }

    fn start(browser: FakeBrowser, config: SnifferConfig) -> Harness {
        let store = DescriptorStore::new();
        let now = Arc::new(AtomicI64::new(900));
        let clock: Clock = {
            let now = Arc::clone(&now);
            Arc::new(move || now.load(Ordering::SeqCst))
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Sniffer::new(browser.clone(), store.clone(), config, shutdown_rx)
            .with_clock(clock)
            .start();
        Harness {
            browser,
            store,
            now,
            shutdown_tx,
            handle,
        }
    }

    fn fast_config() -> SnifferConfig {
        SnifferConfig {
            start_url: START_URL.to_string(),
            expiry_guard: Duration::from_secs(45),
            heartbeat: true,
            navigation_timeout: Duration::from_millis(50),
            reload_timeout: Duration::from_millis(50),
            click_timeout: Duration::from_millis(5),
            tick_interval: Duration::from_millis(10),
            restart_backoff: Duration::from_millis(10),
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..300 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn request(url: &str) -> NetworkEvent {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Chrome/Test"));
        NetworkEvent::Request {
            url: url.to_string(),
            headers,
        }
    }

    #[test]
    fn test_descriptor_from_request_event() {
        let descriptor = descriptor_from_event(&request(MANIFEST)).unwrap();
        assert_eq!(descriptor.url, MANIFEST);
        assert_eq!(descriptor.expires_at, Some(1000));
        assert_eq!(descriptor.headers[header::USER_AGENT], "Chrome/Test");
        assert_eq!(descriptor.headers[header::REFERER], "https://o.example/");
    }

    #[test]
    fn test_descriptor_from_response_event_uses_fallback_headers() {
        let event = NetworkEvent::Response {
            url: MANIFEST.to_string(),
        };
        let descriptor = descriptor_from_event(&event).unwrap();
        let user_agent = descriptor.headers[header::USER_AGENT].to_str().unwrap();
        assert!(user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_non_manifest_event_is_ignored() {
        assert!(descriptor_from_event(&request("https://o.example/a/seg1.ts")).is_none());
    }

    #[tokio::test]
    async fn test_discovers_manifest_from_page_traffic() {
        let h = start(FakeBrowser::default(), fast_config());
        eventually(|| h.browser.is_observing()).await;

        assert!(h.browser.emit(request("https://o.example/player.js")).await);
        assert!(h.browser.emit(request(MANIFEST)).await);

        eventually(|| h.store.snapshot().is_some()).await;
        let current = h.store.snapshot().unwrap();
        assert_eq!(current.url, MANIFEST);
        assert_eq!(current.expires_at, Some(1000));
        assert_eq!(h.browser.state().navigations, vec![START_URL]);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
        assert_eq!(h.browser.state().closes, 1);
    }

    #[tokio::test]
    async fn test_reloads_once_inside_expiry_guard() {
        let h = start(FakeBrowser::default(), fast_config());
        eventually(|| h.browser.is_observing()).await;
        h.browser.emit(request(MANIFEST)).await;
        eventually(|| h.store.snapshot().is_some()).await;

        // 900 is well before 1000 - 45
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.browser.state().reloads, 0);

        h.now.store(955, Ordering::SeqCst);
        eventually(|| h.browser.state().reloads >= 1).await;

        // The renewed URL pushes the deadline out again
        h.browser
            .emit(request("https://o.example/a/index.m3u8?expires=2000"))
            .await;
        eventually(|| h.store.snapshot().unwrap().expires_at == Some(2000)).await;
        let reloads = h.browser.state().reloads;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.browser.state().reloads, reloads);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
    }

    #[tokio::test]
    async fn test_restarts_after_launch_failure() {
        let browser = FakeBrowser::default();
        browser.state().fail_launches = 1;
        let h = start(browser, fast_config());

        eventually(|| {
            let state = h.browser.state();
            state.launches == 2 && state.events.is_some()
        })
        .await;
        assert_eq!(h.browser.state().navigations, vec![START_URL]);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
    }

    #[tokio::test]
    async fn test_session_crash_keeps_descriptor() {
        let h = start(FakeBrowser::default(), fast_config());
        eventually(|| h.browser.is_observing()).await;
        h.browser.emit(request(MANIFEST)).await;
        eventually(|| h.store.snapshot().is_some()).await;

        h.browser.crash();

        eventually(|| {
            let state = h.browser.state();
            state.launches == 2 && state.events.is_some()
        })
        .await;
        assert_eq!(h.store.snapshot().unwrap().url, MANIFEST);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
    }

    #[tokio::test]
    async fn test_navigation_error_restarts_session() {
        let browser = FakeBrowser::default();
        browser.state().fail_navigation = true;
        let h = start(browser, fast_config());

        eventually(|| h.browser.state().launches >= 2).await;
        assert!(h.browser.state().closes >= 1);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_not_fatal() {
        let browser = FakeBrowser::default();
        browser.state().hang_navigation = true;
        browser.state().clickable = vec![".jw-icon-play".into()];
        let h = start(browser, fast_config());

        eventually(|| h.browser.state().clicks.iter().any(|c| c == ".jw-icon-play")).await;
        h.browser.emit(request(MANIFEST)).await;
        eventually(|| h.store.snapshot().is_some()).await;
        assert_eq!(h.browser.state().launches, 1);

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
    }

    #[tokio::test]
    async fn test_events_during_navigation_are_handled() {
        let browser = FakeBrowser::default();
        browser.state().hang_navigation = true;
        let config = SnifferConfig {
            navigation_timeout: Duration::from_secs(30),
            ..fast_config()
        };
        let h = start(browser, config);

        eventually(|| h.browser.is_observing()).await;
        h.browser.emit(request(MANIFEST)).await;
        eventually(|| h.store.snapshot().is_some()).await;

        h.shutdown_tx.send(true).unwrap();
        h.handle.join().await;
        assert_eq!(h.browser.state().closes, 1);
    }
}
