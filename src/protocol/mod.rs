pub mod client_events;
pub mod models;
pub mod server_events;

pub use client_events::ClientEvent;
pub use server_events::ServerEvent;
