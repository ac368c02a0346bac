//! Chat feed over a reconnecting socket.

use crate::machine::{CloseEvent, ReconnectOptions};
use crate::socket::{ConnectionEvent, ConnectionEvents, ReconnectingWebSocket};
use crate::transport::Frame;
use postdeck_core::{ChatCommand, FeedEvent};
use reqwest::Url;

/// What a chat consumer sees.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFeedEvent {
    Connected,
    Event(FeedEvent),
    Disconnected(CloseEvent),
}

/// Decoded, normalized view of the backend's chat socket.
#[derive(Debug)]
pub struct ChatFeed {
    socket: ReconnectingWebSocket,
    events: ConnectionEvents,
}

impl ChatFeed {
    /// Chat endpoint for `token`, carried in the `token` query parameter.
    pub fn endpoint(base: &str, token: Option<&str>) -> Result<String, InvalidEndpoint> {
        let mut url = Url::parse(base).map_err(|e| InvalidEndpoint {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.into())
    }

    pub fn connect(
        url: impl Into<String>,
        protocols: Vec<String>,
        options: ReconnectOptions,
    ) -> Self {
        let (socket, events) = ReconnectingWebSocket::connect(url, protocols, options);
        Self::from_socket(socket, events)
    }

    pub fn from_socket(socket: ReconnectingWebSocket, events: ConnectionEvents) -> Self {
        Self { socket, events }
    }

    /// Next event. Frames that do not decode are logged and skipped.
    /// Returns `None` once the socket is closed for good.
    pub async fn next(&mut self) -> Option<ChatFeedEvent> {
        loop {
            match self.events.recv().await? {
                ConnectionEvent::Open => return Some(ChatFeedEvent::Connected),
                ConnectionEvent::Close(close) => return Some(ChatFeedEvent::Disconnected(close)),
                ConnectionEvent::Error(e) => tracing::debug!("Chat socket error: {}", e),
                ConnectionEvent::Message(Frame::Text(text)) => match FeedEvent::decode(&text) {
                    Ok(event) => return Some(ChatFeedEvent::Event(event)),
                    Err(e) => tracing::warn!("Skipping chat frame: {}", e),
                },
                ConnectionEvent::Message(Frame::Binary(data)) => {
                    tracing::warn!("Skipping {} byte binary chat frame", data.len());
                }
            }
        }
    }

    /// Send a command if connected.
    pub fn send(&self, command: &ChatCommand) -> bool {
        match serde_json::to_string(command) {
            Ok(text) => self.socket.send(text),
            Err(e) => {
                tracing::warn!("Could not encode chat command: {}", e);
                false
            }
        }
    }

    pub fn socket(&self) -> &ReconnectingWebSocket {
        &self.socket
    }

    pub async fn close(&self) {
        self.socket.close(None, Some("chat closed")).await;
    }
}

/// A chat socket URL that does not parse.
#[derive(Debug, thiserror::Error)]
#[error("invalid chat url {url:?}: {reason}")]
pub struct InvalidEndpoint {
    pub url: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{
        ConnectError, Connector, Outbound, Transport, TransportEvent, TransportPeer,
    };
    use futures_util::FutureExt;
    use futures_util::future::{self, BoxFuture};
    use postdeck_core::Id;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Loopback(mpsc::UnboundedSender<TransportPeer>);

    impl Connector for Loopback {
        fn connect(
            &self,
            _url: &str,
            _protocols: &[String],
        ) -> BoxFuture<'static, Result<Transport, ConnectError>> {
            let (transport, peer) = Transport::pair();
            let _ = self.0.send(peer);
            future::ready(Ok(transport)).boxed()
        }
    }

    fn feed() -> (ChatFeed, mpsc::UnboundedReceiver<TransportPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (socket, events) = ReconnectingWebSocket::connect_with(
            Loopback(tx),
            "ws://chat.test/ws/chat/",
            vec![],
            ReconnectOptions::default(),
        );
        (ChatFeed::from_socket(socket, events), rx)
    }

    #[test]
    fn endpoint_carries_token() {
        let url = ChatFeed::endpoint("wss://api.example.com/ws/chat/", Some("a b")).unwrap();
        assert_eq!(url, "wss://api.example.com/ws/chat/?token=a+b");
        let err = ChatFeed::endpoint("not a url", None).unwrap_err();
        assert_eq!(err.url, "not a url");
        assert!(err.to_string().starts_with("invalid chat url"));
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_and_garbage_frames() {
        let (mut feed, mut peers) = feed();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(feed.next().await, Some(ChatFeedEvent::Connected));

        for text in [
            "not json".to_string(),
            json!({"type": "message", "message": {"id": 1, "text": "hi", "sender": 2, "room": 9}})
                .to_string(),
        ] {
            peer.inbound
                .send(TransportEvent::Message(Frame::Text(text)))
                .unwrap();
        }

        let Some(ChatFeedEvent::Event(event)) = feed.next().await else {
            panic!("expected a feed event");
        };
        assert_eq!(event.room_id(), Some(&Id::Int(9)));

        let command = ChatCommand::Typing {
            room_id: Id::Int(9),
            is_typing: true,
        };
        assert!(feed.send(&command));
        let Some(Outbound::Frame(Frame::Text(sent))) = peer.outbound.recv().await else {
            panic!("expected a text frame");
        };
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&sent).unwrap(),
            json!({"type": "typing", "room_id": 9, "is_typing": true})
        );

        feed.close().await;
        assert!(matches!(feed.next().await, Some(ChatFeedEvent::Disconnected(_))));
        assert_eq!(feed.next().await, None);
    }
}
