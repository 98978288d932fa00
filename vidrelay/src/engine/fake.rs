//! In-memory browser used by discovery tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc;

use super::browser::{BrowserSession, Launcher, NetworkEvent, Page};

#[derive(Default)]
pub struct FakeState {
    pub launches: usize,
    pub fail_launches: usize,
    pub closes: usize,
    pub navigations: Vec<String>,
    pub reloads: usize,
    pub clicks: Vec<String>,
    pub clickable: Vec<String>,
    pub fail_navigation: bool,
    pub hang_navigation: bool,
    pub events: Option<mpsc::Sender<NetworkEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn is_observing(&self) -> bool {
        self.state().events.is_some()
    }

    /// Push a network event as if the page produced it.
    pub async fn emit(&self, event: NetworkEvent) -> bool {
        let tx = self.state().events.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the event sender, as a dying browser would.
    pub fn crash(&self) {
        self.state().events = None;
    }
}

impl Launcher for FakeBrowser {
    type Session = FakeBrowser;

    async fn launch(&self) -> Result<FakeBrowser> {
        let failed = {
            let mut state = self.state();
            state.launches += 1;
            state.launches <= state.fail_launches
        };
        if failed {
            bail!("chrome exited during startup");
        }
        Ok(self.clone())
    }
}

impl BrowserSession for FakeBrowser {
    type Page = FakeBrowser;

    async fn new_page(&self) -> Result<FakeBrowser> {
        Ok(self.clone())
    }

    async fn close(self) {
        let mut state = self.state();
        state.closes += 1;
        state.events = None;
    }
}

impl Page for FakeBrowser {
    fn observe(&self, events: mpsc::Sender<NetworkEvent>) {
        self.state().events = Some(events);
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let (fail, hang) = {
            let mut state = self.state();
            state.navigations.push(url.to_string());
            (state.fail_navigation, state.hang_navigation)
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if fail {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.state().reloads += 1;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.state();
        state.clicks.push(selector.to_string());
        if !state.clickable.iter().any(|s| s == selector) {
            bail!("no element matches {selector}");
        }
        Ok(())
    }
}
