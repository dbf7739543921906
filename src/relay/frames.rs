use serde::{Deserialize, Serialize};

use crate::protocol::models::Role;
use crate::session::RelayEvent;

/// Literal transcript text marking end-of-response. Sent with role `system`
/// so clients can tell it apart from spoken content.
pub const RESPONSE_DONE_MARKER: &str = "__RESPONSE_DONE__";

/// Frames accepted from browser clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Audio { audio: String },
}

/// Frames sent to browser clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Sent once, after the upstream session is configured.
    Ready,
    Status { status: String },
    Audio { audio: String },
    Transcript { role: Role, transcript: String },
    Error { error: String },
}

impl From<RelayEvent> for ServerFrame {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Status(status) => Self::Status { status },
            RelayEvent::Audio(audio) => Self::Audio { audio },
            RelayEvent::Transcript { role, text } => Self::Transcript {
                role,
                transcript: text,
            },
            RelayEvent::ResponseComplete => Self::Transcript {
                role: Role::System,
                transcript: RESPONSE_DONE_MARKER.to_string(),
            },
            RelayEvent::Error(error) => Self::Error { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_frames_match_the_wire_shapes() {
        let ready = serde_json::to_value(ServerFrame::Ready).unwrap();
        assert_eq!(ready, json!({"type": "ready"}));

        let status = serde_json::to_value(ServerFrame::Status {
            status: "Processing...".to_string(),
        })
        .unwrap();
        assert_eq!(status, json!({"type": "status", "status": "Processing..."}));

        let error = serde_json::to_value(ServerFrame::Error {
            error: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(error, json!({"type": "error", "error": "nope"}));
    }

    #[test]
    fn transcript_frame_carries_role_and_text() {
        let frame = serde_json::to_value(ServerFrame::Transcript {
            role: Role::Assistant,
            transcript: "bonjour".to_string(),
        })
        .unwrap();
        assert_eq!(
            frame,
            json!({"type": "transcript", "role": "assistant", "transcript": "bonjour"})
        );
    }

    #[test]
    fn response_complete_becomes_the_system_marker() {
        let frame = ServerFrame::from(RelayEvent::ResponseComplete);
        assert_eq!(
            frame,
            ServerFrame::Transcript {
                role: Role::System,
                transcript: RESPONSE_DONE_MARKER.to_string(),
            }
        );
    }

    #[test]
    fn client_audio_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"audio","audio":"QUJD"}"#).unwrap();
        let ClientFrame::Audio { audio } = frame;
        assert_eq!(audio, "QUJD");

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"bogus"}"#).is_err());
    }
}
