use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ArbitraryJson, Role};

/// Manual (de)serialization preserves unknown variants as raw JSON while keeping
/// strong typing for known items.
#[derive(Debug, Clone)]
pub enum Item {
    Message {
        id: Option<String>,
        role: Role,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        id: Option<String>,
        call_id: String,
        output: String,
    },
    Unknown(ArbitraryJson),
}

impl Item {
    /// Builds the `function_call_output` item echoing a tool result back to
    /// the upstream under the originating `call_id`.
    #[must_use]
    pub const fn function_call_output(call_id: String, output: String) -> Self {
        Self::FunctionCallOutput {
            id: None,
            call_id,
            output,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// First transcript or text carried in message content, if any.
    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::Message { content, .. } => content.iter().find_map(ContentPart::transcript),
            _ => None,
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Message { .. } => "message",
            Self::FunctionCall { .. } => "function_call",
            Self::FunctionCallOutput { .. } => "function_call_output",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ItemRepr {
    Message {
        id: Option<String>,
        role: Role,
        content: Vec<ContentPart>,
    },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        id: Option<String>,
        call_id: String,
        output: String,
    },
}

impl From<ItemRepr> for Item {
    fn from(repr: ItemRepr) -> Self {
        match repr {
            ItemRepr::Message { id, role, content } => Self::Message { id, role, content },
            ItemRepr::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => Self::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            },
            ItemRepr::FunctionCallOutput {
                id,
                call_id,
                output,
            } => Self::FunctionCallOutput {
                id,
                call_id,
                output,
            },
        }
    }
}

impl Serialize for Item {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::Message { id, role, content } => {
                let mut state = serializer.serialize_struct("Item", 4)?;
                state.serialize_field("type", "message")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                state.serialize_field("role", role)?;
                state.serialize_field("content", content)?;
                state.end()
            }
            Self::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => {
                let mut state = serializer.serialize_struct("Item", 5)?;
                state.serialize_field("type", "function_call")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                state.serialize_field("call_id", call_id)?;
                state.serialize_field("name", name)?;
                state.serialize_field("arguments", arguments)?;
                state.end()
            }
            Self::FunctionCallOutput {
                id,
                call_id,
                output,
            } => {
                let mut state = serializer.serialize_struct("Item", 4)?;
                state.serialize_field("type", "function_call_output")?;
                if let Some(value) = id {
                    state.serialize_field("id", value)?;
                }
                state.serialize_field("call_id", call_id)?;
                state.serialize_field("output", output)?;
                state.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ItemRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse Item: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

/// Manual (de)serialization preserves unknown variants as raw JSON while keeping
/// strong typing for known parts.
#[derive(Debug, Clone)]
pub enum ContentPart {
    InputText {
        text: String,
    },
    InputAudio {
        audio: Option<String>,
        transcript: Option<String>,
    },
    Text {
        text: String,
    },
    Audio {
        audio: Option<String>,
        transcript: Option<String>,
    },
    Unknown(ArbitraryJson),
}

impl ContentPart {
    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::InputAudio { transcript, .. } | Self::Audio { transcript, .. } => {
                transcript.as_deref()
            }
            Self::InputText { text } | Self::Text { text } => Some(text),
            Self::Unknown(_) => None,
        }
    }
}

impl std::fmt::Display for ContentPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::InputText { .. } => "input_text",
            Self::InputAudio { .. } => "input_audio",
            Self::Text { .. } => "text",
            Self::Audio { .. } => "audio",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPartRepr {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "input_audio")]
    InputAudio {
        audio: Option<String>,
        transcript: Option<String>,
    },
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "audio")]
    Audio {
        audio: Option<String>,
        transcript: Option<String>,
    },
}

impl From<ContentPartRepr> for ContentPart {
    fn from(repr: ContentPartRepr) -> Self {
        match repr {
            ContentPartRepr::InputText { text } => Self::InputText { text },
            ContentPartRepr::InputAudio { audio, transcript } => {
                Self::InputAudio { audio, transcript }
            }
            ContentPartRepr::Text { text } => Self::Text { text },
            ContentPartRepr::Audio { audio, transcript } => Self::Audio { audio, transcript },
        }
    }
}

impl Serialize for ContentPart {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::InputText { text } => {
                let mut state = serializer.serialize_struct("ContentPart", 2)?;
                state.serialize_field("type", "input_text")?;
                state.serialize_field("text", text)?;
                state.end()
            }
            Self::InputAudio { audio, transcript } => {
                let mut state = serializer.serialize_struct("ContentPart", 3)?;
                state.serialize_field("type", "input_audio")?;
                if let Some(value) = audio {
                    state.serialize_field("audio", value)?;
                }
                if let Some(value) = transcript {
                    state.serialize_field("transcript", value)?;
                }
                state.end()
            }
            Self::Text { text } => {
                let mut state = serializer.serialize_struct("ContentPart", 2)?;
                state.serialize_field("type", "text")?;
                state.serialize_field("text", text)?;
                state.end()
            }
            Self::Audio { audio, transcript } => {
                let mut state = serializer.serialize_struct("ContentPart", 3)?;
                state.serialize_field("type", "audio")?;
                if let Some(value) = audio {
                    state.serialize_field("audio", value)?;
                }
                if let Some(value) = transcript {
                    state.serialize_field("transcript", value)?;
                }
                state.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ContentPartRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ContentPart: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}
