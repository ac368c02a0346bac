//! Reconnecting WebSocket.
//!
//! [`ReconnectingWebSocket`] is a handle to a driver task that owns the
//! [`ConnectionMachine`], the live [`Transport`], any in-flight connection
//! attempt and the reconnect timer. The timer lives in a single slot, so
//! arming a new one drops (cancels) the old one and two reconnects can never
//! race.

use crate::machine::{
    CloseEvent, ConnectionMachine, ConnectionState, ConnectionStatus, Effect, Input, ReadyState,
    ReconnectOptions,
};
use crate::transport::{
    ConnectError, Connector, Frame, Transport, TransportEvent, TungsteniteConnector,
};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::pending;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;

/// Events delivered to the owner of a socket, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Message(Frame),
    Close(CloseEvent),
    Error(String),
}

pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

#[derive(Debug)]
enum Command {
    Send(Frame),
    Close {
        code: u16,
        reason: String,
        done: oneshot::Sender<()>,
    },
}

/// Handle to a resilient WebSocket connection.
///
/// Dropping the handle closes the connection with code 1000.
#[derive(Debug)]
pub struct ReconnectingWebSocket {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ReconnectingWebSocket {
    /// Connect over WebSocket. Must be called from within a tokio runtime.
    pub fn connect(
        url: impl Into<String>,
        protocols: Vec<String>,
        options: ReconnectOptions,
    ) -> (Self, ConnectionEvents) {
        Self::connect_with(TungsteniteConnector, url, protocols, options)
    }

    /// Connect through a custom [`Connector`].
    pub fn connect_with<C: Connector>(
        connector: C,
        url: impl Into<String>,
        protocols: Vec<String>,
        options: ReconnectOptions,
    ) -> (Self, ConnectionEvents) {
        let mut machine = ConnectionMachine::new(url, options);
        let initial = machine.handle(Input::Connect);

        let (state_tx, state_rx) = watch::channel(machine.state().clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            connector,
            protocols,
            machine,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            connecting: None,
            transport: None,
            reconnect_timer: None,
        };
        tokio::spawn(driver.run(initial));

        (
            Self {
                commands: command_tx,
                state: state_rx,
            },
            event_rx,
        )
    }

    /// Send a frame if the socket is open. Frames sent while it is not are
    /// dropped, not queued.
    pub fn send(&self, frame: impl Into<Frame>) -> bool {
        let status = self.state.borrow().status;
        if status != ConnectionStatus::Open {
            tracing::warn!("Socket is {:?}, dropping outbound frame", status);
            return false;
        }
        self.commands.send(Command::Send(frame.into())).is_ok()
    }

    /// Close for good. Cancels any pending reconnect before returning.
    pub async fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let (done_tx, done_rx) = oneshot::channel();
        let command = Command::Close {
            code: code.unwrap_or(CloseEvent::NORMAL),
            reason: reason.unwrap_or_default().to_string(),
            done: done_tx,
        };
        if self.commands.send(command).is_ok() {
            // An error means the driver already stopped.
            let _ = done_rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.borrow().status.into()
    }

    /// Resolves once the socket is closed for good.
    pub async fn wait_closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| s.status == ConnectionStatus::Closed)
            .await;
    }
}

struct Driver<C> {
    connector: C,
    protocols: Vec<String>,
    machine: ConnectionMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    connecting: Option<BoxFuture<'static, Result<Transport, ConnectError>>>,
    transport: Option<Transport>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self, initial: Vec<Effect>) {
        self.execute(initial);

        while !self.machine.is_terminal() {
            let input = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        self.forward(frame);
                        continue;
                    }
                    Some(Command::Close { code, reason, done }) => {
                        self.apply(Input::CloseRequested { code, reason });
                        let _ = done.send(());
                        continue;
                    }
                    None => Input::CloseRequested {
                        code: CloseEvent::NORMAL,
                        reason: String::new(),
                    },
                },

                result = attempt(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(transport) => {
                            self.transport = Some(transport);
                            Input::Opened
                        }
                        Err(e) => Input::Failed(e.to_string()),
                    }
                }

                event = next_event(&mut self.transport) => match event {
                    TransportEvent::Message(frame) => {
                        self.emit(ConnectionEvent::Message(frame));
                        continue;
                    }
                    TransportEvent::Error(e) => {
                        self.emit(ConnectionEvent::Error(e.clone()));
                        Input::Error(e)
                    }
                    TransportEvent::Closed(close) => {
                        self.transport = None;
                        Input::Closed(close)
                    }
                },

                () = timer(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    Input::ReconnectDue
                }
            };

            self.apply(input);
        }

        tracing::debug!("Connection driver for {} stopped", self.machine.state().url);
    }

    fn apply(&mut self, input: Input) {
        let before = self.machine.state().status;
        let notice = match &input {
            Input::Opened => Some(ConnectionEvent::Open),
            Input::Closed(close) => Some(ConnectionEvent::Close(close.clone())),
            Input::Failed(e) => {
                self.emit(ConnectionEvent::Error(e.clone()));
                Some(ConnectionEvent::Close(CloseEvent::abnormal(e.clone())))
            }
            Input::CloseRequested { code, reason } if before != ConnectionStatus::Closed => {
                Some(ConnectionEvent::Close(CloseEvent {
                    code: *code,
                    reason: reason.clone(),
                    was_clean: true,
                }))
            }
            _ => None,
        };

        let effects = self.machine.handle(input);
        let after = self.machine.state().clone();
        if after.status != before {
            tracing::debug!(
                "Connection to {}: {:?} -> {:?} (attempt {})",
                after.url,
                before,
                after.status,
                after.attempt
            );
        }
        self.state.send_replace(after);
        self.execute(effects);

        if let Some(event) = notice {
            self.emit(event);
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open => {
                    self.transport = None;
                    self.connecting = Some(self.start_attempt());
                }
                Effect::Close { code, reason } => {
                    self.connecting = None;
                    if let Some(transport) = self.transport.take() {
                        transport.close(code, reason);
                    }
                }
                Effect::ScheduleReconnect(delay) => {
                    let state = self.machine.state();
                    tracing::info!(
                        "Reconnecting to {} in {:?} (attempt {} of {})",
                        state.url,
                        delay,
                        state.attempt + 1,
                        self.machine.options().max_reconnect_attempts
                    );
                    self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelReconnect => {
                    self.reconnect_timer = None;
                }
            }
        }
    }

    fn start_attempt(&self) -> BoxFuture<'static, Result<Transport, ConnectError>> {
        let url = &self.machine.state().url;
        let attempt = self.connector.connect(url, &self.protocols);

        match self.machine.options().connect_timeout {
            Some(limit) => async move {
                tokio::time::timeout(limit, attempt)
                    .await
                    .unwrap_or_else(|_| Err(ConnectError::Timeout(limit)))
            }
            .boxed(),
            None => attempt,
        }
    }

    fn forward(&mut self, frame: Frame) {
        match &self.transport {
            Some(transport) if self.machine.state().status == ConnectionStatus::Open => {
                if !transport.send(frame) {
                    tracing::warn!("Transport gone, dropping outbound frame");
                }
            }
            _ => tracing::warn!("Socket not open, dropping outbound frame"),
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

async fn attempt(
    slot: &mut Option<BoxFuture<'static, Result<Transport, ConnectError>>>,
) -> Result<Transport, ConnectError> {
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_event(slot: &mut Option<Transport>) -> TransportEvent {
    match slot {
        Some(transport) => transport
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed(CloseEvent::abnormal("transport dropped"))),
        None => pending().await,
    }
}

async fn timer(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
