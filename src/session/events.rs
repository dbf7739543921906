use crate::protocol::models::Role;

/// Events a session surfaces to the downstream client connection, already
/// reduced to what the browser protocol can express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Human-readable connection state change.
    Status(String),
    /// Base64-encoded PCM16 audio chunk from the assistant.
    Audio(String),
    /// Transcript fragment attributed to one side of the conversation.
    Transcript { role: Role, text: String },
    /// The upstream finished generating a response.
    ResponseComplete,
    /// Terminal or upstream-reported failure, as display text.
    Error(String),
}
