//! Connection lifecycle state machine.
//!
//! Pure transition logic for a reconnecting socket. The driver in
//! [`crate::socket`] feeds it [`Input`]s from the transport, the timer and the
//! caller, and carries out the [`Effect`]s it returns.
//!
//! ```text
//!            Connect               Opened
//!   Closed ───────────▶ Connecting ──────▶ Open
//!     ▲                   ▲   │              │
//!     │       ReconnectDue│   │ unclean close│
//!     │                   │   ▼              │
//!     │               Reconnecting ◀─────────┘
//!     │                   │
//!     └───────────────────┘ clean close, close(), attempts exhausted
//! ```

use serde::Serialize;
use std::time::Duration;

/// Backoff tuning for a reconnecting socket.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectOptions {
    /// Delay before the first reconnect.
    pub reconnect_interval: Duration,
    /// Multiplier applied per attempt.
    pub reconnect_decay: f64,
    /// Upper bound on any single delay.
    pub max_reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Give up on a connection attempt that has not opened after this long.
    pub connect_timeout: Option<Duration>,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(1000),
            reconnect_decay: 1.5,
            max_reconnect_interval: Duration::from_millis(30_000),
            max_reconnect_attempts: 5,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ReconnectOptions {
    /// `min(interval * decay^attempt, max_interval)`, in whole milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.reconnect_interval.as_millis() as f64;
        let max = self.max_reconnect_interval.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = (base * self.reconnect_decay.powi(exponent)).min(max);
        Duration::from_millis(millis.round() as u64)
    }
}

/// Coarse connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Closed,
    Connecting,
    Open,
    Reconnecting,
}

/// Standard socket ready-state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<ConnectionStatus> for ReadyState {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            // A socket waiting out its backoff is still trying to connect.
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => ReadyState::Connecting,
            ConnectionStatus::Open => ReadyState::Open,
            ConnectionStatus::Closed => ReadyState::Closed,
        }
    }
}

/// Observable state of one logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Reconnects attempted since the last successful open.
    pub attempt: u32,
    pub url: String,
    pub last_error: Option<String>,
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const ABNORMAL: u16 = 1006;

    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::NORMAL,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// The connection dropped without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }

    /// Clean closes never trigger a reconnect.
    pub fn is_clean(&self) -> bool {
        self.was_clean || matches!(self.code, Self::NORMAL | Self::GOING_AWAY)
    }
}

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Start the first connection.
    Connect,
    Opened,
    Closed(CloseEvent),
    /// The connection attempt itself failed (bad URL, refused, timed out).
    Failed(String),
    /// Transport error that does not by itself end the connection.
    Error(String),
    ReconnectDue,
    CloseRequested { code: u16, reason: String },
}

/// Work the driver must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a connection attempt to the state's URL.
    Open,
    /// Close the live transport, abandoning any attempt in flight.
    Close { code: u16, reason: String },
    /// Arm the reconnect timer, replacing any timer already armed.
    ScheduleReconnect(Duration),
    CancelReconnect,
}

/// Reconnecting socket lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    options: ReconnectOptions,
    terminal: bool,
}

impl ConnectionMachine {
    pub fn new(url: impl Into<String>, options: ReconnectOptions) -> Self {
        Self {
            state: ConnectionState {
                status: ConnectionStatus::Closed,
                attempt: 0,
                url: url.into(),
                last_error: None,
            },
            options,
            terminal: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn options(&self) -> &ReconnectOptions {
        &self.options
    }

    /// Closed for good: explicitly, cleanly, or after running out of attempts.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        use ConnectionStatus::*;

        if self.terminal {
            return Vec::new();
        }

        match (self.state.status, input) {
            (_, Input::CloseRequested { code, reason }) => {
                let effects = match self.state.status {
                    Reconnecting => vec![Effect::CancelReconnect],
                    Connecting | Open => vec![Effect::Close { code, reason }],
                    Closed => Vec::new(),
                };
                self.finish();
                effects
            }
            (_, Input::Error(err)) => {
                self.state.last_error = Some(err);
                Vec::new()
            }
            (Closed, Input::Connect) => {
                self.state.status = Connecting;
                vec![Effect::Open]
            }
            (Connecting, Input::Opened) => {
                self.state.status = Open;
                self.state.attempt = 0;
                self.state.last_error = None;
                Vec::new()
            }
            (Connecting | Open, Input::Closed(event)) => self.dropped(&event),
            (Connecting, Input::Failed(err)) => {
                let event = CloseEvent::abnormal(err.clone());
                self.state.last_error = Some(err);
                self.dropped(&event)
            }
            (Reconnecting, Input::ReconnectDue) => {
                self.state.attempt += 1;
                self.state.status = Connecting;
                vec![Effect::Open]
            }
            // Stale timer or transport notifications.
            _ => Vec::new(),
        }
    }

    fn dropped(&mut self, event: &CloseEvent) -> Vec<Effect> {
        if event.is_clean() {
            self.finish();
            return Vec::new();
        }

        if self.state.attempt < self.options.max_reconnect_attempts {
            self.state.status = ConnectionStatus::Reconnecting;
            vec![Effect::ScheduleReconnect(
                self.options.delay_for(self.state.attempt),
            )]
        } else {
            self.state.last_error = Some(format!(
                "gave up after {} reconnect attempts",
                self.state.attempt
            ));
            self.finish();
            Vec::new()
        }
    }

    fn finish(&mut self) {
        self.state.status = ConnectionStatus::Closed;
        self.terminal = true;
    }
}
