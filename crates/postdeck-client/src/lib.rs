//! Network side of the postdeck dashboard client.
//!
//! - [`ReconnectingWebSocket`]: a socket handle that survives drops, driven
//!   by the pure [`ConnectionMachine`] with exponential backoff.
//! - [`ChatFeed`]: the chat socket decoded into [`postdeck_core::FeedEvent`]s.
//! - [`TokenValidator`]: bearer token validation behind a
//!   [`TokenValidationCache`].

pub mod cache;
pub mod chat;
pub mod config;
pub mod machine;
pub mod socket;
pub mod transport;
pub mod validator;

pub use cache::TokenValidationCache;
pub use chat::{ChatFeed, ChatFeedEvent, InvalidEndpoint};
pub use config::{AuthConfig, ClientConfig, ConfigError, ConnectionConfig};
pub use machine::{
    CloseEvent, ConnectionMachine, ConnectionState, ConnectionStatus, ReadyState, ReconnectOptions,
};
pub use socket::{ConnectionEvent, ConnectionEvents, ReconnectingWebSocket};
pub use transport::{ConnectError, Connector, Frame, Transport, TungsteniteConnector};
pub use validator::{TokenValidator, ValidateError};
