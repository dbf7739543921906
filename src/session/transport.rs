use std::future::Future;
use std::pin::Pin;

use crate::Result;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;
use crate::transport::ws::UpstreamClient;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection seam for the session actor. Production sessions run over a
/// WebSocket; tests drive the actor through in-memory channels.
pub trait Transport: Send {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>>;
    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>>;
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

impl Transport for UpstreamClient {
    fn send(&mut self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.send(event))
    }

    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
        Box::pin(self.next_event())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.close())
    }
}
