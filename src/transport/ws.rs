use futures::{SinkExt, StreamExt};
use reqwest::header::HeaderValue;
use serde_json::from_str;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::ServerEvent;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";
const MAX_INPUT_AUDIO_CHUNK_BYTES: usize = 15 * 1024 * 1024;
const CLOSE_REASON: &str = "Client disconnecting";

#[derive(Debug)]
pub struct WsStream(WebSocketStream<MaybeTlsStream<TcpStream>>);

impl WsStream {
    pub(crate) const fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self(stream)
    }
}

impl futures::Stream for WsStream {
    type Item = std::result::Result<Message, tungstenite::Error>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl futures::Sink<Message> for WsStream {
    type Error = tungstenite::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_ready(cx)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: Message,
    ) -> std::result::Result<(), Self::Error> {
        std::pin::Pin::new(&mut self.0).start_send(item)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}

/// Establish a WebSocket connection to the Realtime API.
///
/// # Errors
/// Returns an error if the URL is invalid or the handshake fails.
pub async fn connect(base_url: &str, api_key: &str, model: &str) -> Result<WsStream> {
    let mut url = Url::parse(base_url)?;
    url.query_pairs_mut().append_pair("model", model);

    let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

    let mut req = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
        url.as_str(),
    )?;
    let headers = req.headers_mut();
    headers.insert(reqwest::header::AUTHORIZATION, auth_header);
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
    let (ws_stream, _) = connect_async(req).await?;

    tracing::info!("Connected to OpenAI Realtime ({model})");

    Ok(WsStream::new(ws_stream))
}

/// Owned upstream connection. Each session actor holds exactly one
/// `UpstreamClient`, so outbound events are serialized by construction.
pub struct UpstreamClient {
    stream: WsStream,
}

impl UpstreamClient {
    /// Connect and authenticate against the Realtime API.
    ///
    /// # Errors
    /// Returns an error if the connection fails or if the URL is invalid.
    pub async fn connect(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let stream = connect(base_url, api_key, model).await?;
        Ok(Self { stream })
    }

    /// Send a client event to the upstream.
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails, or if the
    /// WebSocket send fails.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        validate_client_event(&event)?;
        let json = serde_json::to_string(&event)?;
        tracing::trace!("Sending event: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next upstream event. `Ok(None)` means the upstream closed
    /// the connection.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails or a text frame is not valid
    /// JSON.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!("Received event: {}", safe_truncate(&text, TRACE_LOG_MAX_BYTES));
                    return Ok(Some(from_str::<ServerEvent>(&text)?));
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket connection closed by server");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }

    /// Send a normal close frame upstream. Calling on an already-closed
    /// stream is not an error.
    ///
    /// # Errors
    /// Returns an error if the close frame cannot be written for any other
    /// reason.
    pub async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: CLOSE_REASON.into(),
        };
        match self.stream.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

#[allow(clippy::result_large_err)]
fn validate_client_event(event: &ClientEvent) -> Result<()> {
    if let ClientEvent::InputAudioBufferAppend { audio, .. } = event {
        let size = estimate_base64_decoded_len(audio)?;
        if size > MAX_INPUT_AUDIO_CHUNK_BYTES {
            return Err(Error::InvalidClientEvent(format!(
                "input_audio_buffer.append exceeds 15MB ({size} bytes)",
            )));
        }
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn estimate_base64_decoded_len(s: &str) -> Result<usize> {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 length".to_string(),
        ));
    }

    let mut padding = 0;
    let mut seen_padding = false;
    for &b in bytes {
        if b == b'=' {
            seen_padding = true;
            padding += 1;
            continue;
        }
        if seen_padding {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 padding".to_string(),
            ));
        }
        let is_valid = matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/'
        );
        if !is_valid {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 character".to_string(),
            ));
        }
    }

    if padding > 2 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 padding length".to_string(),
        ));
    }

    Ok(bytes.len() / 4 * 3 - padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_respects_char_boundaries() {
        let text = "héllo wörld ".repeat(200);
        let truncated = safe_truncate(&text, 100);
        assert!(truncated.contains(TRACE_TRUNCATE_SUFFIX));
        assert!(truncated.starts_with("héllo"));
    }

    #[test]
    fn test_validate_rejects_oversized_audio_append() {
        let audio = "A".repeat(21 * 1024 * 1024);
        let event = ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio,
        };
        let err = validate_client_event(&event).unwrap_err();
        assert!(matches!(err, Error::InvalidClientEvent(_)));
    }

    #[test]
    fn test_validate_rejects_invalid_base64() {
        let event = ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio: "not base64!!".to_string(),
        };
        assert!(validate_client_event(&event).is_err());
    }

    #[test]
    fn test_estimate_decoded_len_accounts_for_padding() {
        assert_eq!(estimate_base64_decoded_len("AAAA").unwrap(), 3);
        assert_eq!(estimate_base64_decoded_len("AAA=").unwrap(), 2);
        assert_eq!(estimate_base64_decoded_len("AA==").unwrap(), 1);
    }
}
