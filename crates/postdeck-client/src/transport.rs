//! Socket transports.
//!
//! A [`Transport`] is one live connection seen as a pair of channels: frames
//! and close requests go out, [`TransportEvent`]s come back. [`Connector`]s
//! produce transports; [`TungsteniteConnector`] is the WebSocket one.

use crate::machine::CloseEvent;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

/// A data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<String> for Frame {
    fn from(s: String) -> Self {
        Frame::Text(s)
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Frame::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Frame::Binary(data)
    }
}

/// Requests to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Close { code: u16, reason: String },
}

/// What the transport reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(Frame),
    Error(String),
    /// Always the last event of a transport.
    Closed(CloseEvent),
}

/// The client end of one live connection.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// The far end of a [`Transport`], held by whatever moves the bytes.
#[derive(Debug)]
pub struct TransportPeer {
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl Transport {
    /// A connected transport and its peer.
    pub fn pair() -> (Transport, TransportPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Transport {
                outbound: outbound_tx,
                events: inbound_rx,
            },
            TransportPeer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    /// Queue a frame. Returns false if the peer is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    /// Ask the peer to close, consuming the transport.
    pub fn close(self, code: u16, reason: String) {
        let _ = self.outbound.send(Outbound::Close { code, reason });
    }

    /// Next event; `None` once the peer has gone away.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Opens transports.
pub trait Connector: Send + 'static {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
    ) -> BoxFuture<'static, Result<Transport, ConnectError>>;
}

/// Error opening a transport.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
    #[error("invalid subprotocol list: {0}")]
    InvalidProtocol(String),
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
    ) -> BoxFuture<'static, Result<Transport, ConnectError>> {
        let url = url.to_string();
        let protocols = protocols.join(", ");

        async move {
            let mut request = url.as_str().into_client_request()?;
            if !protocols.is_empty() {
                let value = HeaderValue::from_str(&protocols)
                    .map_err(|e| ConnectError::InvalidProtocol(e.to_string()))?;
                request.headers_mut().insert("Sec-WebSocket-Protocol", value);
            }

            let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
            tracing::debug!("Connected to {}", url);
            Ok::<_, ConnectError>(spawn_pump(ws))
        }
        .boxed()
    }
}

/// Bridge a WebSocket stream onto a [`Transport`].
pub fn spawn_pump<S>(ws: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (transport, peer) = Transport::pair();
    tokio::spawn(pump(ws, peer));
    transport
}

async fn pump<S>(ws: WebSocketStream<S>, peer: TransportPeer)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let TransportPeer {
        inbound,
        mut outbound,
    } = peer;
    let (mut sink, mut stream) = ws.split();
    let mut close_frame: Option<CloseEvent> = None;
    let mut outbound_open = true;

    let closed = loop {
        tokio::select! {
            request = outbound.recv(), if outbound_open => match request {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = sink.send(frame.into()).await {
                        let _ = inbound.send(TransportEvent::Error(e.to_string()));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!("Close frame not sent: {}", e);
                    }
                }
                // Client side dropped the transport: finish the close handshake quietly.
                None => {
                    outbound_open = false;
                    let _ = sink.close().await;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(TransportEvent::Message(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = inbound.send(TransportEvent::Message(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    close_frame = Some(match frame {
                        Some(f) => CloseEvent {
                            code: u16::from(f.code),
                            reason: f.reason.as_str().to_owned(),
                            was_clean: true,
                        },
                        None => CloseEvent {
                            code: 1005,
                            reason: String::new(),
                            was_clean: true,
                        },
                    });
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break match close_frame.take() {
                        Some(event) => event,
                        None => {
                            let _ = inbound.send(TransportEvent::Error(e.to_string()));
                            CloseEvent::abnormal(e.to_string())
                        }
                    };
                }
                None => {
                    break close_frame
                        .take()
                        .unwrap_or_else(|| CloseEvent::abnormal("connection closed without close frame"));
                }
            },
        }
    };

    tracing::debug!("Transport closed: {} {}", closed.code, closed.reason);
    let _ = inbound.send(TransportEvent::Closed(closed));
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn relays_frames_and_close() {
        let url = serve_once(|mut ws| async move {
            let echo = ws.next().await.unwrap().unwrap();
            ws.send(echo).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        })
        .await;

        let mut transport = TungsteniteConnector.connect(&url, &[]).await.unwrap();
        assert!(transport.send(Frame::from("ping")));

        assert_eq!(
            transport.recv().await,
            Some(TransportEvent::Message(Frame::Text("ping".into())))
        );
        assert_eq!(
            transport.recv().await,
            Some(TransportEvent::Closed(CloseEvent {
                code: 1000,
                reason: "done".into(),
                was_clean: true,
            }))
        );
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TungsteniteConnector.connect(&format!("ws://{addr}"), &[]).await;
        assert!(matches!(result, Err(ConnectError::Handshake(_))));
    }
}
