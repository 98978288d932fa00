use crate::stream::StreamDescriptor;

/// Seconds without a manifest between "waiting" heartbeats.
pub const HEARTBEAT_INTERVAL_SECS: i64 = 5;

/// Whether a manifest expiring at `expires_at` should be renewed at `now`.
pub fn reload_due(expires_at: i64, now: i64, guard_secs: i64) -> bool {
    now >= expires_at.saturating_sub(guard_secs)
}

/// What the sniffer should do on an idle tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Reload the page to capture a fresh manifest URL.
    Reload { expires_at: i64, first_attempt: bool },
    /// Still no manifest; say so.
    Heartbeat,
    Idle,
}

/**
    Decides, once per tick, whether the page must be reloaded before the
    current manifest expires.
*/
#[derive(Debug)]
pub struct RenewalScheduler {
    guard_secs: i64,
    heartbeat: bool,
    last_heartbeat: i64,
    last_reload_for: Option<i64>,
}

impl RenewalScheduler {
    pub fn new(guard_secs: i64, heartbeat: bool, now: i64) -> Self {
        Self {
            guard_secs,
            heartbeat,
            last_heartbeat: now,
            last_reload_for: None,
        }
    }

    pub fn on_tick(&mut self, current: Option<&StreamDescriptor>, now: i64) -> TickAction {
        match current {
            Some(descriptor) => match descriptor.expires_at {
                Some(expires_at) if reload_due(expires_at, now, self.guard_secs) => {
                    let first_attempt = self.last_reload_for != Some(expires_at);
                    self.last_reload_for = Some(expires_at);
                    TickAction::Reload {
                        expires_at,
                        first_attempt,
                    }
                }
                _ => TickAction::Idle,
            },
            None if self.heartbeat && now - self.last_heartbeat > HEARTBEAT_INTERVAL_SECS => {
                self.last_heartbeat = now;
                TickAction::Heartbeat
            }
            None => TickAction::Idle,
        }
    }
}
