use serde_json::json;

use voxgate::error::UpstreamErrorType;
use voxgate::protocol::client_events::ClientEvent;
use voxgate::protocol::models::{ContentPart, Item, ResponseStatus, Role, SessionConfig, Tool};
use voxgate::protocol::server_events::ServerEvent;

#[test]
fn test_session_update_serialization_skips_unset_fields() {
    let event = ClientEvent::SessionUpdate {
        event_id: None,
        session: Box::new(SessionConfig {
            voice: Some("alloy".to_string()),
            ..SessionConfig::default()
        }),
    };

    let value = serde_json::to_value(&event).expect("Failed to serialize session.update");
    assert_eq!(value["type"], "session.update");
    assert_eq!(value["session"], json!({"voice": "alloy"}));
    assert!(value.get("event_id").is_none());
}

#[test]
fn test_audio_append_serialization() {
    let event = ClientEvent::InputAudioBufferAppend {
        event_id: Some("evt_1".to_string()),
        audio: "QUJD".to_string(),
    };
    let value = serde_json::to_value(&event).expect("Failed to serialize append");
    assert_eq!(
        value,
        json!({"type": "input_audio_buffer.append", "event_id": "evt_1", "audio": "QUJD"})
    );
}

#[test]
fn test_conversation_item_create_roundtrip() {
    let original = json!({
        "type": "conversation.item.create",
        "item": {
            "type": "function_call_output",
            "call_id": "call_7",
            "output": "{\"ok\":true}"
        }
    });

    let event: ClientEvent =
        serde_json::from_value(original.clone()).expect("Failed to deserialize item.create");
    match &event {
        ClientEvent::ConversationItemCreate { item, .. } => match item.as_ref() {
            Item::FunctionCallOutput { call_id, output, .. } => {
                assert_eq!(call_id, "call_7");
                assert_eq!(output, "{\"ok\":true}");
            }
            other => panic!("Wrong item type: {other:?}"),
        },
        other => panic!("Wrong event type: {other:?}"),
    }

    let serialized = serde_json::to_value(&event).expect("Failed to serialize item.create");
    assert_eq!(serialized, original);
}

#[test]
fn test_server_event_flat_deserialization() {
    let json = json!({
        "type": "response.audio_transcript.delta",
        "event_id": "evt_5",
        "response_id": "resp_1",
        "item_id": "item_1",
        "output_index": 0,
        "content_index": 0,
        "delta": "bonjour"
    });

    let event: ServerEvent = serde_json::from_value(json).expect("Failed to deserialize delta");
    assert_eq!(event.event_id(), Some("evt_5"));
    match event {
        ServerEvent::ResponseAudioTranscriptDelta { delta, .. } => assert_eq!(delta, "bonjour"),
        other => panic!("Wrong variant: {other:?}"),
    }
}

#[test]
fn test_function_call_arguments_done_tolerates_missing_fields() {
    let json = json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_1"
    });

    let event: ServerEvent = serde_json::from_value(json).expect("Failed to deserialize done");
    match event {
        ServerEvent::ResponseFunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
            ..
        } => {
            assert_eq!(call_id.as_deref(), Some("call_1"));
            assert_eq!(name, None);
            assert_eq!(arguments, None);
        }
        other => panic!("Wrong variant: {other:?}"),
    }
}

#[test]
fn test_unknown_server_event_preserves_payload() {
    let original = json!({
        "type": "rate_limits.updated",
        "event_id": "evt_9",
        "rate_limits": [{"name": "requests", "remaining": 99}]
    });

    let event: ServerEvent =
        serde_json::from_value(original.clone()).expect("Failed to deserialize unknown event");
    assert_eq!(event.event_id(), Some("evt_9"));
    assert!(matches!(event, ServerEvent::Unknown(_)));

    let serialized = serde_json::to_value(&event).expect("Failed to serialize unknown event");
    assert_eq!(serialized, original);
}

#[test]
fn test_upstream_error_event_types() {
    let json = json!({
        "type": "error",
        "event_id": "evt_3",
        "error": {
            "type": "invalid_request_error",
            "code": "invalid_value",
            "message": "Bad voice"
        }
    });

    let event: ServerEvent = serde_json::from_value(json).expect("Failed to deserialize error");
    match event {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.error_type, Some(UpstreamErrorType::InvalidRequestError));
            assert_eq!(error.to_string(), "Bad voice (code: invalid_value)");
        }
        other => panic!("Wrong variant: {other:?}"),
    }

    let unrecognized = json!({
        "type": "error",
        "error": {"type": "brand_new_error", "message": "hm"}
    });
    let event: ServerEvent =
        serde_json::from_value(unrecognized).expect("Failed to deserialize error");
    match event {
        ServerEvent::Error { error, .. } => {
            assert_eq!(error.error_type, Some(UpstreamErrorType::Unknown));
        }
        other => panic!("Wrong variant: {other:?}"),
    }
}

#[test]
fn test_message_item_transcript_lookup() {
    let json = json!({
        "type": "message",
        "role": "user",
        "content": [
            {"type": "input_audio", "transcript": "quelle heure est-il"}
        ]
    });
    let item: Item = serde_json::from_value(json).expect("Failed to deserialize item");
    assert_eq!(item.role(), Some(Role::User));
    assert_eq!(item.transcript(), Some("quelle heure est-il"));

    let text_part: ContentPart =
        serde_json::from_value(json!({"type": "text", "text": "salut"})).expect("content part");
    assert_eq!(text_part.transcript(), Some("salut"));
}

#[test]
fn test_response_status_enum() {
    let status: ResponseStatus = serde_json::from_value(json!("cancelled")).unwrap();
    assert_eq!(status, ResponseStatus::Cancelled);

    let status: ResponseStatus = serde_json::from_value(json!("brand_new_status")).unwrap();
    assert_eq!(status, ResponseStatus::Unknown);
}

#[test]
fn test_tool_definition_shape() {
    let tool = Tool::Function {
        name: "get_weather".to_string(),
        description: Some("Weather lookup".to_string()),
        parameters: json!({"type": "object", "properties": {"location": {"type": "string"}}}),
    };
    let value = serde_json::to_value(&tool).expect("Failed to serialize tool");
    assert_eq!(value["type"], "function");
    assert_eq!(value["name"], "get_weather");
    assert_eq!(value["parameters"]["type"], "object");
}
