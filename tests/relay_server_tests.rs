use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;

use voxgate::config::AppConfig;
use voxgate::relay::{self, AppState};
use voxgate::tools::ToolDispatcher;

async fn serve(config: AppConfig) -> String {
    let dispatcher =
        ToolDispatcher::from_config(&config.tools, &config.resilience, false).unwrap();
    let state = AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
    };
    let app = relay::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws/realtime")
}

#[tokio::test]
async fn test_missing_api_key_yields_error_frame_and_close() {
    // The default config still carries the placeholder key.
    let url = serve(AppConfig::default()).await;

    let (mut socket, _) = connect_async(url).await.expect("Failed to connect");
    let message = socket
        .next()
        .await
        .expect("Expected a frame")
        .expect("Socket error");

    let text = message.into_text().expect("Expected a text frame");
    let frame: Value = serde_json::from_str(text.as_str()).expect("Frame is not JSON");
    assert_eq!(frame["type"], "error");
    assert!(frame["error"].as_str().unwrap().contains("API key"));

    // The server closes its side after a fatal connect error.
    while let Some(message) = socket.next().await {
        if message.is_err() || message.unwrap().is_close() {
            break;
        }
    }
}
