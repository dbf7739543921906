mod events;
mod transport;

pub use events::RelayEvent;
pub use transport::{BoxFuture, Transport};

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose;
use tokio::sync::{mpsc, oneshot};

use crate::config::PLACEHOLDER_API_KEY;
use crate::error::{Error, Result};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, Role, SessionConfig, Tool, TranscriptionConfig, TurnDetection};
use crate::protocol::server_events::ServerEvent;
use crate::tools::ToolDispatcher;
use crate::transport::ws::UpstreamClient;

const COMMAND_BUFFER: usize = 64;
const TOOL_RESULT_BUFFER: usize = 16;

/// Everything needed to open and configure one upstream session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub transcription_model: String,
    pub turn_detection: TurnDetection,
    pub temperature: f32,
    pub max_response_output_tokens: Option<u32>,
    pub tools: Vec<Tool>,
}

impl SessionOptions {
    fn session_config(&self) -> SessionConfig {
        let tool_choice = if self.tools.is_empty() {
            None
        } else {
            Some("auto".to_string())
        };
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.instructions.clone()),
            voice: Some(self.voice.clone()),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            input_audio_transcription: Some(TranscriptionConfig {
                model: self.transcription_model.clone(),
            }),
            turn_detection: Some(self.turn_detection.clone()),
            temperature: Some(self.temperature),
            max_response_output_tokens: self.max_response_output_tokens,
            // An empty list still goes out so the upstream drops any tools
            // remembered from a previous update.
            tools: Some(self.tools.clone()),
            tool_choice,
        }
    }
}

enum Command {
    Send {
        event: ClientEvent,
        respond: oneshot::Sender<Result<()>>,
    },
    Close {
        respond: oneshot::Sender<()>,
    },
}

struct ToolOutcome {
    call_id: String,
    output: String,
}

/// Handle to a running upstream session actor. All operations route through
/// the actor mailbox, so concurrent callers never interleave partial writes.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
}

impl Session {
    /// Connect to the upstream, emit the initial status, and send the
    /// configuring `session.update` before anything else goes out.
    ///
    /// # Errors
    /// Returns an error if the API key is missing, the connection fails, or
    /// the initial `session.update` cannot be sent.
    pub async fn connect(
        options: SessionOptions,
        dispatcher: Arc<ToolDispatcher>,
        events: mpsc::Sender<RelayEvent>,
    ) -> Result<Self> {
        if options.api_key.is_empty() || options.api_key == PLACEHOLDER_API_KEY {
            return Err(Error::Configuration(
                "OpenAI API key is not set; put it in the config file or export OPENAI_API_KEY"
                    .to_string(),
            ));
        }

        let client =
            UpstreamClient::connect(&options.base_url, &options.api_key, &options.model).await?;
        let _ = events
            .send(RelayEvent::Status("Connected to OpenAI".to_string()))
            .await;

        let config = options.session_config();
        let session = Self::from_transport(Box::new(client), dispatcher, events);
        session
            .send_checked(ClientEvent::SessionUpdate {
                event_id: None,
                session: Box::new(config),
            })
            .await?;
        Ok(session)
    }

    fn from_transport(
        transport: Box<dyn Transport>,
        dispatcher: Arc<ToolDispatcher>,
        events: mpsc::Sender<RelayEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (tool_tx, tool_rx) = mpsc::channel(TOOL_RESULT_BUFFER);

        let runner = SessionRunner {
            transport,
            dispatcher,
            events,
            commands: cmd_rx,
            tool_results: tool_rx,
            tool_tx,
        };
        tokio::spawn(runner.run());

        Self { commands: cmd_tx }
    }

    /// Append raw PCM16 bytes to the upstream input audio buffer. Empty
    /// chunks are skipped.
    ///
    /// # Errors
    /// Returns an error if the chunk fails validation or the send fails.
    pub async fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let audio = general_purpose::STANDARD.encode(pcm);
        self.send(ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio,
        })
        .await
    }

    /// Commit the input audio buffer. Not needed under server VAD, where the
    /// upstream commits on detected end of speech.
    ///
    /// # Errors
    /// Returns an error if the send fails.
    pub async fn commit_audio(&self) -> Result<()> {
        self.send(ClientEvent::InputAudioBufferCommit { event_id: None })
            .await
    }

    /// Ask the upstream to generate a response.
    ///
    /// # Errors
    /// Returns an error if the send fails.
    pub async fn request_response(&self) -> Result<()> {
        self.send(ClientEvent::ResponseCreate { event_id: None })
            .await
    }

    /// Cancel the in-flight response, if any.
    ///
    /// # Errors
    /// Returns an error if the send fails.
    pub async fn cancel_response(&self) -> Result<()> {
        self.send(ClientEvent::ResponseCancel {
            event_id: None,
            response_id: None,
        })
        .await
    }

    /// Close the upstream connection and stop the actor. Idempotent.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Close { respond: tx })
            .await
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Send an event, treating an already-stopped session as a no-op.
    async fn send(&self, event: ClientEvent) -> Result<()> {
        match self.send_checked(event).await {
            Ok(()) | Err(Error::ConnectionClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn send_checked(&self, event: ClientEvent) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Send { event, respond: tx })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

struct SessionRunner {
    transport: Box<dyn Transport>,
    dispatcher: Arc<ToolDispatcher>,
    events: mpsc::Sender<RelayEvent>,
    commands: mpsc::Receiver<Command>,
    tool_results: mpsc::Receiver<ToolOutcome>,
    // Held open so `tool_results.recv()` never yields `None` while the actor
    // is alive; spawned tool tasks clone it.
    tool_tx: mpsc::Sender<ToolOutcome>,
}

impl SessionRunner {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Send { event, respond }) => {
                            let result = self.transport.send(event).await;
                            let _ = respond.send(result);
                        }
                        Some(Command::Close { respond }) => {
                            if let Err(err) = self.transport.close().await {
                                tracing::warn!("Error closing upstream connection: {err}");
                            }
                            let _ = respond.send(());
                            break;
                        }
                        None => break,
                    }
                }
                Some(outcome) = self.tool_results.recv() => {
                    self.deliver_tool_output(outcome).await;
                }
                event = self.transport.next_event() => {
                    match event {
                        Ok(Some(event)) => self.handle_event(event).await,
                        Ok(None) => {
                            self.emit(RelayEvent::Status("Disconnected from OpenAI".to_string())).await;
                            break;
                        }
                        Err(Error::Decode(err)) => {
                            tracing::warn!("Skipping malformed upstream message: {err}");
                        }
                        Err(err) => {
                            tracing::error!("Upstream connection error: {err}");
                            self.emit(RelayEvent::Error(err.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ServerEvent) {
        if let Some(event_id) = event.event_id() {
            tracing::trace!("Upstream event {event_id}");
        }

        match event {
            ServerEvent::SessionCreated { session, .. } => {
                tracing::info!(
                    "Upstream session created: {}",
                    session.id.as_deref().unwrap_or("unknown")
                );
                self.emit(RelayEvent::Status("Session ready".to_string()))
                    .await;
            }
            ServerEvent::SessionUpdated { .. } => {
                self.emit(RelayEvent::Status("Session ready".to_string()))
                    .await;
            }
            ServerEvent::InputAudioBufferSpeechStarted { .. } => {
                self.emit(RelayEvent::Status("User speaking...".to_string()))
                    .await;
            }
            ServerEvent::InputAudioBufferSpeechStopped { .. } => {
                self.emit(RelayEvent::Status("Processing...".to_string()))
                    .await;
            }
            ServerEvent::InputAudioBufferCommitted { item_id, .. } => {
                tracing::debug!(
                    "Input audio committed as item {}",
                    item_id.as_deref().unwrap_or("unknown")
                );
            }
            ServerEvent::ConversationItemCreated { item, .. } => {
                if item.role() == Some(Role::User) {
                    if let Some(transcript) = item.transcript() {
                        self.emit(RelayEvent::Transcript {
                            role: Role::User,
                            text: transcript.to_string(),
                        })
                        .await;
                    }
                }
            }
            ServerEvent::InputAudioTranscriptionCompleted { transcript, .. } => {
                if !transcript.is_empty() {
                    self.emit(RelayEvent::Transcript {
                        role: Role::User,
                        text: transcript,
                    })
                    .await;
                }
            }
            ServerEvent::InputAudioTranscriptionFailed { error, .. } => {
                tracing::warn!("Input transcription failed: {error}");
            }
            ServerEvent::ResponseAudioDelta { delta, .. } => {
                if !delta.is_empty() {
                    self.emit(RelayEvent::Audio(delta)).await;
                }
            }
            ServerEvent::ResponseAudioTranscriptDelta { delta, .. } => {
                self.emit(RelayEvent::Transcript {
                    role: Role::Assistant,
                    text: delta,
                })
                .await;
            }
            ServerEvent::ResponseAudioTranscriptDone { transcript, .. } => {
                tracing::debug!("Assistant transcript complete: {transcript}");
            }
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                self.handle_function_call(call_id, name, arguments);
            }
            ServerEvent::ResponseDone { response, .. } => {
                tracing::debug!(
                    "Response {} finished",
                    response.id.as_deref().unwrap_or("unknown")
                );
                self.emit(RelayEvent::Status("Ready".to_string())).await;
                self.emit(RelayEvent::ResponseComplete).await;
            }
            ServerEvent::Error { error, .. } => {
                tracing::error!("Upstream error: {error}");
                self.emit(RelayEvent::Error(error.to_string())).await;
            }
            ServerEvent::Unknown(value) => {
                tracing::debug!(
                    "Ignoring unhandled upstream event: {}",
                    value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown")
                );
            }
        }
    }

    /// Launch the tool on a detached task. The session stays responsive while
    /// the tool runs; the result comes back through `tool_results`.
    fn handle_function_call(
        &self,
        call_id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        let (Some(call_id), Some(name)) = (call_id, name) else {
            tracing::warn!("Dropping function call without call_id or name");
            return;
        };
        let arguments = arguments.unwrap_or_else(|| "{}".to_string());
        tracing::info!("Tool call requested: {name} ({call_id})");

        let dispatcher = Arc::clone(&self.dispatcher);
        let results = self.tool_tx.clone();
        tokio::spawn(async move {
            let output = match dispatcher.execute(&name, &arguments).await {
                Ok(value) => value.to_string(),
                Err(err) => {
                    tracing::warn!("Tool {name} failed: {err}");
                    serde_json::json!({
                        "error": true,
                        "message": err.to_string(),
                        "type": err.kind(),
                    })
                    .to_string()
                }
            };
            if results.send(ToolOutcome { call_id, output }).await.is_err() {
                tracing::debug!("Session closed before tool {name} finished");
            }
        });
    }

    /// Exactly one `conversation.item.create` followed by exactly one
    /// `response.create` per completed tool call.
    async fn deliver_tool_output(&mut self, outcome: ToolOutcome) {
        let item = Item::function_call_output(outcome.call_id, outcome.output);
        let create = ClientEvent::ConversationItemCreate {
            event_id: None,
            previous_item_id: None,
            item: Box::new(item),
        };
        if let Err(err) = self.transport.send(create).await {
            tracing::warn!("Failed to send tool output: {err}");
            return;
        }
        if let Err(err) = self
            .transport
            .send(ClientEvent::ResponseCreate { event_id: None })
            .await
        {
            tracing::warn!("Failed to request response after tool output: {err}");
        }
    }

    async fn emit(&self, event: RelayEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Relay event channel closed, dropping event");
        }
    }
}
