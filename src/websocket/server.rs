use super::hub::{ConnectionInfo, WsHub};
use super::messages::{ClientMessage, ServerMessage};
use crate::error::{AppError, AppResult};
use crate::models::{NewSecurityEvent, SecurityEventType};
use crate::security::SecurityMonitor;
use crate::services::SessionService;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Session token from `Authorization: Bearer` or the `token` query parameter
pub fn handshake_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    from_header.or_else(|| {
        request.uri().query().and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, value)| *key == "token" && !value.is_empty())
                .map(|(_, value)| value.to_string())
        })
    })
}

/// Accepts sockets, authenticates them and bridges them to the hub
pub struct WebSocketServer {
    hub: Arc<WsHub>,
    sessions: Arc<SessionService>,
    security: Arc<SecurityMonitor>,
}

impl WebSocketServer {
    pub fn new(hub: Arc<WsHub>, sessions: Arc<SessionService>, security: Arc<SecurityMonitor>) -> Self {
        Self {
            hub,
            sessions,
            security,
        }
    }

    /// Accept loop; runs until the listener fails permanently
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New WebSocket connection from {}", addr);
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!("WebSocket connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("WebSocket accept error: {}", e);
                }
            }
        }
    }

    fn auth_failed(&self, addr: SocketAddr, reason: &str) {
        self.security.record_detached(
            NewSecurityEvent::new(SecurityEventType::WebSocketAuthFailed)
                .ip(addr.ip().to_string())
                .details(serde_json::json!({ "reason": reason })),
        );
    }

    /// Handle one socket from handshake to disconnect
    pub async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> AppResult<()> {
        let mut token: Option<String> = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            token = handshake_token(request);
            if token.is_none() {
                let mut rejection = ErrorResponse::new(Some("Missing session token".to_string()));
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                return Err(rejection);
            }
            Ok(response)
        };

        let handshake = accept_hdr_async(stream, callback).await;
        let ws_stream = match handshake {
            Ok(ws) => ws,
            Err(e) => {
                if token.is_none() {
                    self.auth_failed(addr, "missing token");
                }
                return Err(AppError::Message(format!("WebSocket handshake failed: {}", e)));
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let token = token.unwrap_or_default();
        let ctx = match self.sessions.authenticate_any(&token).await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.auth_failed(addr, "invalid session");
                let rejection = ServerMessage::error("Authentication failed");
                if let Ok(json) = serde_json::to_string(&rejection) {
                    let _ = ws_sender.send(Message::Text(json)).await;
                }
                let _ = ws_sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Policy,
                        reason: Cow::Borrowed("authentication failed"),
                    })))
                    .await;
                return Err(e);
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let conn_id = self
            .hub
            .register(
                ConnectionInfo {
                    user_id: ctx.user.id,
                    display_name: ctx.user.display_name.clone(),
                    is_admin: ctx.is_admin,
                },
                tx,
            )
            .await;
        info!(
            "WebSocket {} authenticated as {} (admin: {})",
            conn_id, ctx.user.email, ctx.is_admin
        );

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    debug!("Failed to send to {}: {}", conn_id, e);
                    break;
                }
            }
        });

        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => self.hub.handle_client_message(conn_id, message).await,
                    Err(e) => {
                        warn!("Invalid message from {}: {}", conn_id, e);
                        self.hub
                            .send_to(conn_id, ServerMessage::error("Invalid message format"))
                            .await;
                    }
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!("WebSocket {} read error: {}", conn_id, e);
                    break;
                }
                _ => {}
            }
        }

        self.hub.unregister(conn_id).await;
        writer.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_handshake_token_sources() {
        assert_eq!(
            handshake_token(&request("/ws", Some("Bearer abc"))).as_deref(),
            Some("abc")
        );
        assert_eq!(
            handshake_token(&request("/ws?channel=x&token=xyz", None)).as_deref(),
            Some("xyz")
        );
        assert_eq!(handshake_token(&request("/ws?token=", None)), None);
        assert_eq!(handshake_token(&request("/ws", Some("Basic abc"))), None);
    }
}
