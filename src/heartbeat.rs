//! Heartbeat negotiation and monitoring.
//!
//! At CONNECT time the client proposes `heart-beat: cx,cy` (it can send
//! every `cx` ms, wants to receive every `cy` ms). The broker compares that
//! with its own capability `(sx, sy)` and activates at most one direction:
//!
//! 1. `cx > 0 && sy > 0` → client drives, interval `max(cx, sy)`,
//!    announced as `0,interval`
//! 2. `cy > 0 && sx > 0` → server drives, interval `max(cy, sx)`,
//!    announced as `interval,0`
//! 3. otherwise disabled, announced as `0,0`
//!
//! The per-connection [`Heartbeat`] is a state machine driven by a periodic
//! timer: each [`tick`](Heartbeat::tick) says whether to send the LF marker,
//! close the connection, or do nothing.
//!
//! # Example
//!
//! ```
//! use stomp_broker::heartbeat::{negotiate, HeartbeatMode};
//!
//! let negotiated = negotiate((5000, 5000), (0, 10000));
//! assert_eq!(negotiated.mode, HeartbeatMode::ClientDrives);
//! assert_eq!(negotiated.header_value(), "0,10000");
//! ```

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default heartbeat error margin.
pub const DEFAULT_ERROR_MARGIN: Duration = Duration::from_millis(1000);

/// Which side of the connection sends heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatMode {
    /// No heartbeating.
    Disabled,
    /// The broker sends the LF marker; the client watches for silence.
    ServerDrives,
    /// The client sends; the broker closes the connection on silence.
    ClientDrives,
}

/// Outcome of heartbeat negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Active direction.
    pub mode: HeartbeatMode,
    /// Effective interval in milliseconds (0 when disabled).
    pub interval_ms: u64,
}

impl Negotiated {
    /// Heartbeat disabled in both directions.
    pub const DISABLED: Negotiated = Negotiated {
        mode: HeartbeatMode::Disabled,
        interval_ms: 0,
    };

    /// The pair the broker announces in CONNECTED (`server-send, server-receive`).
    pub fn announced(&self) -> (u64, u64) {
        match self.mode {
            HeartbeatMode::Disabled => (0, 0),
            HeartbeatMode::ServerDrives => (self.interval_ms, 0),
            HeartbeatMode::ClientDrives => (0, self.interval_ms),
        }
    }

    /// Value of the `heart-beat` header in CONNECTED.
    pub fn header_value(&self) -> String {
        let (x, y) = self.announced();
        format!("{},{}", x, y)
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Negotiate the heartbeat for one connection.
///
/// `client` is the `(cx, cy)` pair from the CONNECT frame, `server` the
/// broker's configured `(sx, sy)` capability. The first matching rule wins.
pub fn negotiate(client: (u64, u64), server: (u64, u64)) -> Negotiated {
    let (cx, cy) = client;
    let (sx, sy) = server;

    if cx > 0 && sy > 0 {
        Negotiated {
            mode: HeartbeatMode::ClientDrives,
            interval_ms: cx.max(sy),
        }
    } else if cy > 0 && sx > 0 {
        Negotiated {
            mode: HeartbeatMode::ServerDrives,
            interval_ms: cy.max(sx),
        }
    } else {
        Negotiated::DISABLED
    }
}

/// Parse a `heart-beat` header value (`"cx,cy"`).
///
/// A missing header means `(0, 0)`. Malformed values also yield `(0, 0)`.
pub fn parse_header(value: Option<&str>) -> (u64, u64) {
    let Some(value) = value else {
        return (0, 0);
    };
    let mut parts = value.split(',').map(|p| p.trim().parse::<u64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => (x, y),
        _ => {
            tracing::warn!(value, "malformed heart-beat header, heartbeat disabled");
            (0, 0)
        }
    }
}

/// What the timer should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing to do.
    Idle,
    /// Send the heartbeat marker.
    SendPing,
    /// The client went silent; close the connection.
    Close,
}

/// Per-connection heartbeat state.
#[derive(Debug)]
pub struct Heartbeat {
    mode: HeartbeatMode,
    interval: Duration,
    error_margin: Duration,
    /// Last inbound traffic (client-drives).
    last_seen: Instant,
    timer: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// A disabled heartbeat (before CONNECT, or after `off`).
    pub fn disabled() -> Self {
        Self {
            mode: HeartbeatMode::Disabled,
            interval: Duration::ZERO,
            error_margin: DEFAULT_ERROR_MARGIN,
            last_seen: Instant::now(),
            timer: None,
        }
    }

    /// Activate a negotiated heartbeat with its baseline at `now`.
    pub fn start(negotiated: Negotiated, error_margin: Duration, now: Instant) -> Self {
        Self {
            mode: negotiated.mode,
            interval: negotiated.interval(),
            error_margin,
            last_seen: now,
            timer: None,
        }
    }

    #[inline]
    pub fn mode(&self) -> HeartbeatMode {
        self.mode
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Baseline of the last observed inbound traffic.
    #[inline]
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Check if a direction is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.mode != HeartbeatMode::Disabled
    }

    /// Check if a timer task is attached.
    #[inline]
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Record inbound traffic (heartbeat marker or any frame).
    pub fn observe(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Advance the state machine by one timer tick.
    ///
    /// In client-drives mode the silence since the last inbound traffic is
    /// compared against `interval + error_margin`. Ticks never move the
    /// baseline; only [`observe`](Self::observe) does.
    pub fn tick(&mut self, now: Instant) -> TickAction {
        match self.mode {
            HeartbeatMode::Disabled => TickAction::Idle,
            HeartbeatMode::ServerDrives => TickAction::SendPing,
            HeartbeatMode::ClientDrives => {
                let elapsed = now.saturating_duration_since(self.last_seen);
                if elapsed > self.interval + self.error_margin {
                    TickAction::Close
                } else {
                    TickAction::Idle
                }
            }
        }
    }

    /// Attach the task driving this heartbeat, replacing any previous one.
    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    /// Cancel the timer and clear state. Safe to call when inactive.
    pub fn off(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.mode = HeartbeatMode::Disabled;
        self.interval = Duration::ZERO;
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Spawn a periodic timer that calls `on_tick` every `interval`.
///
/// The first call happens one full interval after spawning. The task stops
/// when `on_tick` returns `false`. Returns `None` outside a tokio runtime.
pub fn spawn_timer<F>(interval: Duration, mut on_tick: F) -> Option<JoinHandle<()>>
where
    F: FnMut() -> bool + Send + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::warn!("no tokio runtime, heartbeat timer not started");
            return None;
        }
    };

    Some(handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !on_tick() {
                break;
            }
        }
    }))
}
