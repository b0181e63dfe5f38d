//! HTTP gateway client

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::discovery::{read_core_props, resolve_core_props_path};
use super::payload::{BindGameEvent, EventData, GameEvent, GameOnly, MultipleGameEvents};
use super::{GameMetadata, Gateway, GatewayError};
use crate::bitmap::FrameMap;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// `reqwest`-backed [`Gateway`]
///
/// Cheap to clone; clones share one connection pool. Connections are opened
/// lazily on the first request.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    /// `http://HOST:PORT`
    base_url: String,
    /// Game id every request is sent under
    game: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GatewayClient {
    /// Create a client for the gateway at `address` (`HOST:PORT`)
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] if the HTTP client cannot be
    /// built.
    pub fn new(address: &str, game: impl Into<String>) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: format!("http://{}", address.trim()),
            game: game.into(),
            http_client,
        })
    }

    /// Locate the gateway through `coreProps.json` and create a client
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unavailable`] when no `coreProps.json` can be
    /// found or read.
    pub async fn discover(core_props: Option<&Path>, game: impl Into<String>) -> Result<Self, GatewayError> {
        let path = resolve_core_props_path(core_props).ok_or_else(|| {
            GatewayError::Unavailable(
                "no coreProps.json location known for this platform".to_string(),
            )
        })?;
        let props = read_core_props(&path).await?;
        tracing::info!(
            path = %path.display(),
            address = %props.address,
            "Discovered device gateway"
        );
        Self::new(&props.address, game)
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &'static str,
        body: &T,
    ) -> Result<(), GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| GatewayError::Transport { endpoint, source })?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(endpoint, status = status.as_u16(), "Gateway request ok");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            endpoint,
            status: status.as_u16(),
            reason: error_reason(&text),
        })
    }
}

/// Gateway reason text: the JSON `error` field, else the trimmed body
fn error_reason(body: &str) -> Option<String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        if let Some(serde_json::Value::String(reason)) = map.get("error") {
            return Some(reason.clone());
        }
    }
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl Gateway for GatewayClient {
    fn game(&self) -> &str {
        &self.game
    }

    async fn register_game(&self, metadata: &GameMetadata) -> Result<(), GatewayError> {
        self.post("/game_metadata", metadata).await
    }

    async fn bind_screen_event(
        &self,
        event: &str,
        resolution_token: &str,
        frame_len: usize,
    ) -> Result<(), GatewayError> {
        let body = BindGameEvent::screen(&self.game, event, resolution_token, frame_len);
        self.post("/bind_game_event", &body).await
    }

    async fn send_screen_data(&self, event: &str, frames: &FrameMap) -> Result<(), GatewayError> {
        let body = GameEvent {
            game: &self.game,
            event,
            data: EventData { frame: frames },
        };
        self.post("/game_event", &body).await
    }

    async fn send_multiple_screen_data(
        &self,
        event: &str,
        frames: &[FrameMap],
    ) -> Result<(), GatewayError> {
        let body = MultipleGameEvents::new(&self.game, event, frames);
        self.post("/multiple_game_events", &body).await
    }

    async fn send_heartbeat(&self) -> Result<(), GatewayError> {
        self.post("/game_heartbeat", &GameOnly { game: &self.game })
            .await
    }

    async fn remove_game(&self) -> Result<(), GatewayError> {
        self.post("/remove_game", &GameOnly { game: &self.game }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::frame_map;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Request seen by the fake gateway
    #[derive(Debug)]
    struct Captured {
        path: String,
        body: serde_json::Value,
    }

    /// Minimal HTTP/1.1 server answering every request with `status`/`body`
    async fn fake_gateway(status: u16, body: &'static str) -> (String, mpsc::UnboundedReceiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0_u8; 4096];
                    let header_end = loop {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                    let content_length = head
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    while buf.len() < header_end + content_length {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    let request_body =
                        serde_json::from_slice(&buf[header_end..]).unwrap_or(json!(null));
                    tx.send(Captured {
                        path,
                        body: request_body,
                    })
                    .unwrap();

                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                });
            }
        });
        (address, rx)
    }

    #[test]
    fn test_error_reason() {
        assert_eq!(error_reason(r#"{"error": "bad game"}"#).as_deref(), Some("bad game"));
        assert_eq!(error_reason("  plain text \n").as_deref(), Some("plain text"));
        assert_eq!(error_reason(""), None);
        assert_eq!(error_reason(r#"{"other": 1}"#).as_deref(), Some(r#"{"other": 1}"#));
    }

    #[test]
    fn test_base_url() {
        let client = GatewayClient::new("127.0.0.1:51234", "STEELCLOCK").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:51234");
        assert_eq!(client.game(), "STEELCLOCK");
    }

    #[tokio::test]
    async fn test_requests_hit_endpoints_with_envelopes() {
        let (address, mut rx) = fake_gateway(200, "{}").await;
        let client = GatewayClient::new(&address, "STEELCLOCK").unwrap();
        let frames = frame_map("image-data-8x1", vec![0xAA]);

        client
            .register_game(&GameMetadata {
                game: "STEELCLOCK".to_string(),
                game_display_name: "SteelClock".to_string(),
                developer: "SteelClock".to_string(),
                deinitialize_timer_length_ms: None,
            })
            .await
            .unwrap();
        client
            .bind_screen_event("EV", "screened-8x1", 1)
            .await
            .unwrap();
        client.send_screen_data("EV", &frames).await.unwrap();
        client
            .send_multiple_screen_data("EV", &[frames.clone(), frames.clone()])
            .await
            .unwrap();
        client.send_heartbeat().await.unwrap();
        client.remove_game().await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(rx.recv().await.unwrap());
        }
        let paths: Vec<&str> = seen.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/game_metadata",
                "/bind_game_event",
                "/game_event",
                "/multiple_game_events",
                "/game_heartbeat",
                "/remove_game"
            ]
        );
        assert_eq!(
            seen[0].body,
            json!({"game": "STEELCLOCK", "game_display_name": "SteelClock", "developer": "SteelClock"})
        );
        assert_eq!(
            seen[2].body,
            json!({"game": "STEELCLOCK", "event": "EV", "data": {"frame": {"image-data-8x1": [170]}}})
        );
        assert_eq!(seen[3].body["events"].as_array().unwrap().len(), 2);
        assert_eq!(seen[4].body, json!({"game": "STEELCLOCK"}));
    }

    #[tokio::test]
    async fn test_non_2xx_carries_status_and_reason() {
        let (address, _rx) = fake_gateway(400, r#"{"error": "unknown game"}"#).await;
        let client = GatewayClient::new(&address, "STEELCLOCK").unwrap();

        let err = client.send_heartbeat().await.unwrap_err();
        match err {
            GatewayError::Status {
                endpoint,
                status,
                reason,
            } => {
                assert_eq!(endpoint, "/game_heartbeat");
                assert_eq!(status, 400);
                assert_eq!(reason.as_deref(), Some("unknown game"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = GatewayClient::new(&address, "STEELCLOCK").unwrap();
        let err = client.send_heartbeat().await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_discover_from_core_props() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreProps.json");
        tokio::fs::write(&path, r#"{"address": "127.0.0.1:40000"}"#)
            .await
            .unwrap();

        let client = GatewayClient::discover(Some(&path), "STEELCLOCK").await.unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:40000");
    }
}
