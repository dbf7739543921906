pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use common::{ArbitraryJson, DEFAULT_MODEL, JsonSchema, Role};
pub use items::{ContentPart, Item};
pub use response::{Response, ResponseStatus};
pub use session::{SessionConfig, SessionInfo, TranscriptionConfig, TurnDetection};
pub use tools::Tool;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_item_round_trips_as_raw_json() {
        let raw = serde_json::json!({"type": "reasoning", "summary": []});
        let item: Item = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(item, Item::Unknown(_)));
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_message_transcript_prefers_audio_transcript() {
        let item: Item = serde_json::from_value(serde_json::json!({
            "type": "message",
            "role": "user",
            "content": [
                {"type": "input_audio", "transcript": "hello there"}
            ]
        }))
        .unwrap();
        assert_eq!(item.role(), Some(Role::User));
        assert_eq!(item.transcript(), Some("hello there"));
    }

    #[test]
    fn test_turn_detection_defaults_to_server_vad() {
        let detection = TurnDetection::default();
        let value = serde_json::to_value(&detection).unwrap();
        assert_eq!(value["type"], "server_vad");
        assert_eq!(value["silence_duration_ms"], 500);
    }
}
