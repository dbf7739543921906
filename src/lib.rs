#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use protocol::client_events::ClientEvent;
pub use protocol::models::{
    ContentPart, Item, Response, ResponseStatus, Role, SessionConfig, SessionInfo, Tool,
    TranscriptionConfig, TurnDetection,
};
pub use protocol::server_events::ServerEvent;
pub use relay::{AppState, ClientFrame, RESPONSE_DONE_MARKER, ServerFrame, router};
pub use session::{RelayEvent, Session, SessionOptions};
pub use tools::ToolDispatcher;
