pub mod frames;

pub use frames::{ClientFrame, RESPONSE_DONE_MARKER, ServerFrame};

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::session::{RelayEvent, Session, SessionOptions};
use crate::tools::ToolDispatcher;

const RELAY_EVENT_BUFFER: usize = 64;

// Generous enough for multi-second base64 PCM16 chunks.
const MAX_CLIENT_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// State shared by every accepted connection. The dispatcher carries the
/// process-wide circuit breaker, so it must be built once and cloned by
/// reference.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dispatcher: Arc<ToolDispatcher>,
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/realtime", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_CLIENT_MESSAGE_BYTES)
        .max_frame_size(MAX_CLIENT_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// One browser connection: open the upstream session, then pump frames both
/// ways until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    tracing::info!("Client {client_id} connected");

    let (mut sink, mut stream) = socket.split();
    let (events_tx, mut events) = mpsc::channel(RELAY_EVENT_BUFFER);

    let options = session_options(&state);
    let session = match Session::connect(options, Arc::clone(&state.dispatcher), events_tx).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("Client {client_id}: upstream connect failed: {err}");
            let frame = ServerFrame::Error {
                error: err.to_string(),
            };
            let _ = send_frame(&mut sink, &frame).await;
            return;
        }
    };

    if send_frame(&mut sink, &ServerFrame::Ready).await.is_err() {
        session.close().await;
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                // None means the session actor has stopped.
                let Some(event) = event else { break };
                if send_frame(&mut sink, &ServerFrame::from(event)).await.is_err() {
                    tracing::debug!("Client {client_id} sink closed");
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = handle_client_frame(&session, text.as_str()).await {
                            tracing::warn!("Client {client_id}: bad frame: {err}");
                            let frame = ServerFrame::Error {
                                error: err.to_string(),
                            };
                            if send_frame(&mut sink, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Client {client_id} disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!("Client {client_id} socket error: {err}");
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    tracing::info!("Client {client_id} session closed");
}

/// A bad frame is reported back as an error frame; it never tears the
/// connection down.
async fn handle_client_frame(session: &Session, text: &str) -> Result<()> {
    let frame: ClientFrame =
        serde_json::from_str(text).map_err(|err| Error::InvalidClientEvent(err.to_string()))?;
    match frame {
        ClientFrame::Audio { audio } => {
            let pcm = general_purpose::STANDARD.decode(&audio).map_err(|err| {
                Error::InvalidClientEvent(format!("Audio is not valid base64: {err}"))
            })?;
            session.send_audio(&pcm).await
        }
    }
}

async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|_| Error::ConnectionClosed)
}

fn session_options(state: &AppState) -> SessionOptions {
    let upstream = &state.config.upstream;
    SessionOptions {
        api_key: upstream.api_key.clone(),
        base_url: upstream.realtime_url.clone(),
        model: upstream.model.clone(),
        voice: upstream.voice.clone(),
        // Resolved per connection, so prompt file edits apply to the next
        // session without a restart.
        instructions: state.config.resolve_instructions(),
        transcription_model: upstream.transcription_model.clone(),
        turn_detection: upstream.turn_detection.clone(),
        temperature: upstream.temperature,
        max_response_output_tokens: upstream.max_response_output_tokens,
        tools: state.dispatcher.advertised(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResilienceConfig, ToolConfig, ToolKind};

    #[test]
    fn session_options_mirror_config_and_advertised_tools() {
        let mut config = AppConfig::default();
        config.upstream.voice = "verse".to_string();
        config.upstream.instructions = Some("Be brief.".to_string());

        let tools = [ToolConfig {
            name: "get_time".to_string(),
            kind: ToolKind::Builtin,
            ..ToolConfig::default()
        }];
        let dispatcher =
            ToolDispatcher::from_config(&tools, &ResilienceConfig::default(), true).unwrap();
        let state = AppState {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        };

        let options = session_options(&state);
        assert_eq!(options.voice, "verse");
        assert_eq!(options.instructions, "Be brief.");
        assert_eq!(options.tools.len(), 1);
    }
}
