use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::models::{ArbitraryJson, Item, Response, SessionInfo};
use crate::error::UpstreamError;

/// Events received from the upstream. Anything the relay does not recognize
/// lands in `Unknown` with the raw payload intact, so a new upstream event
/// type never breaks an active session.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Error {
        event_id: Option<String>,
        error: UpstreamError,
    },
    SessionCreated {
        event_id: Option<String>,
        session: SessionInfo,
    },
    SessionUpdated {
        event_id: Option<String>,
        session: SessionInfo,
    },
    ConversationItemCreated {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item: Item,
    },
    InputAudioBufferCommitted {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item_id: Option<String>,
    },
    InputAudioBufferSpeechStarted {
        event_id: Option<String>,
        audio_start_ms: Option<u32>,
        item_id: Option<String>,
    },
    InputAudioBufferSpeechStopped {
        event_id: Option<String>,
        audio_end_ms: Option<u32>,
        item_id: Option<String>,
    },
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: Option<String>,
        content_index: Option<u32>,
        transcript: String,
    },
    InputAudioTranscriptionFailed {
        event_id: Option<String>,
        item_id: Option<String>,
        content_index: Option<u32>,
        error: UpstreamError,
    },
    ResponseAudioDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        delta: String,
    },
    ResponseAudioTranscriptDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        delta: String,
    },
    ResponseAudioTranscriptDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        transcript: String,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        call_id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    ResponseDone {
        event_id: Option<String>,
        response: Response,
    },
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        error: UpstreamError,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionInfo,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionInfo,
    },
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: Item,
    },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_start_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_end_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_index: Option<u32>,
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    InputAudioTranscriptionFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_index: Option<u32>,
        error: UpstreamError,
    },
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_index: Option<u32>,
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_index: Option<u32>,
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_index: Option<u32>,
        transcript: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        response: Response,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => Self::SessionCreated { event_id, session },
            ServerEventRepr::SessionUpdated { event_id, session } => Self::SessionUpdated { event_id, session },
            ServerEventRepr::ConversationItemCreated { event_id, previous_item_id, item } => Self::ConversationItemCreated { event_id, previous_item_id, item },
            ServerEventRepr::InputAudioBufferCommitted { event_id, previous_item_id, item_id } => Self::InputAudioBufferCommitted { event_id, previous_item_id, item_id },
            ServerEventRepr::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id },
            ServerEventRepr::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id },
            ServerEventRepr::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript } => Self::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript },
            ServerEventRepr::InputAudioTranscriptionFailed { event_id, item_id, content_index, error } => Self::InputAudioTranscriptionFailed { event_id, item_id, content_index, error },
            ServerEventRepr::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta } => Self::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta },
            ServerEventRepr::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta } => Self::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta },
            ServerEventRepr::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript } => Self::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript },
            ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments },
            ServerEventRepr::ResponseDone { event_id, response } => Self::ResponseDone { event_id, response },
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let Self::Unknown(value) = self {
            value.serialize(serializer)
        } else {
            let repr = match self {
                Self::Error { event_id, error } => ServerEventRepr::Error { event_id: event_id.clone(), error: error.clone() },
                Self::SessionCreated { event_id, session } => ServerEventRepr::SessionCreated { event_id: event_id.clone(), session: session.clone() },
                Self::SessionUpdated { event_id, session } => ServerEventRepr::SessionUpdated { event_id: event_id.clone(), session: session.clone() },
                Self::ConversationItemCreated { event_id, previous_item_id, item } => ServerEventRepr::ConversationItemCreated { event_id: event_id.clone(), previous_item_id: previous_item_id.clone(), item: item.clone() },
                Self::InputAudioBufferCommitted { event_id, previous_item_id, item_id } => ServerEventRepr::InputAudioBufferCommitted { event_id: event_id.clone(), previous_item_id: previous_item_id.clone(), item_id: item_id.clone() },
                Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStarted { event_id: event_id.clone(), audio_start_ms: *audio_start_ms, item_id: item_id.clone() },
                Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStopped { event_id: event_id.clone(), audio_end_ms: *audio_end_ms, item_id: item_id.clone() },
                Self::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript } => ServerEventRepr::InputAudioTranscriptionCompleted { event_id: event_id.clone(), item_id: item_id.clone(), content_index: *content_index, transcript: transcript.clone() },
                Self::InputAudioTranscriptionFailed { event_id, item_id, content_index, error } => ServerEventRepr::InputAudioTranscriptionFailed { event_id: event_id.clone(), item_id: item_id.clone(), content_index: *content_index, error: error.clone() },
                Self::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta } => ServerEventRepr::ResponseAudioDelta { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), output_index: *output_index, content_index: *content_index, delta: delta.clone() },
                Self::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta } => ServerEventRepr::ResponseAudioTranscriptDelta { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), output_index: *output_index, content_index: *content_index, delta: delta.clone() },
                Self::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript } => ServerEventRepr::ResponseAudioTranscriptDone { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), output_index: *output_index, content_index: *content_index, transcript: transcript.clone() },
                Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id: event_id.clone(), response_id: response_id.clone(), item_id: item_id.clone(), output_index: *output_index, call_id: call_id.clone(), name: name.clone(), arguments: arguments.clone() },
                Self::ResponseDone { event_id, response } => ServerEventRepr::ResponseDone { event_id: event_id.clone(), response: response.clone() },
                Self::Unknown(_) => unreachable!("handled above"),
            };
            repr.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ServerEvent: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerEvent {
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        macro_rules! extract {
            ($($variant:ident),*) => {
                match self {
                    $(Self::$variant { event_id, .. } => event_id.as_deref(),)*
                    Self::Unknown(value) => value.get("event_id").and_then(|v| v.as_str()),
                }
            };
        }
        extract!(
            Error, SessionCreated, SessionUpdated, ConversationItemCreated,
            InputAudioBufferCommitted, InputAudioBufferSpeechStarted,
            InputAudioBufferSpeechStopped, InputAudioTranscriptionCompleted,
            InputAudioTranscriptionFailed, ResponseAudioDelta,
            ResponseAudioTranscriptDelta, ResponseAudioTranscriptDone,
            ResponseFunctionCallArgumentsDone, ResponseDone
        )
    }
}
