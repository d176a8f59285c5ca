//! Realtime chat over WebSocket, one room per garden.

use axum::{
    Router,
    extract::{Query, State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    routing::get,
};
use db::models::chat_message::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{authenticate, token_from_headers},
    error::ApiError,
};

mod hub;
mod session;

pub use hub::ChatHub;

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Frames sent by clients.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    JoinRoom { room: Uuid },
    LeaveRoom { room: Uuid },
    Message { room: Uuid, content: String },
}

/// Frames sent to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame<'a> {
    Joined { room: Uuid },
    Message { message: &'a ChatMessage },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", get(upgrade))
}

/// Authenticate before upgrading; browsers cannot set headers on WebSocket
/// requests, so `?token=` is accepted too.
async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = token_from_headers(&headers)
        .or(query.token.filter(|token| !token.is_empty()))
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
    let user = authenticate(&state, &token).await?;

    Ok(ws.on_upgrade(move |socket| session::handle(socket, state, user)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_client_frames() {
        let room = Uuid::new_v4();
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "message",
            "room": room,
            "content": "hello"
        }))
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Message {
                room,
                content: "hello".to_string()
            }
        );

        let join: ClientFrame =
            serde_json::from_value(json!({ "type": "join-room", "room": room })).unwrap();
        assert_eq!(join, ClientFrame::JoinRoom { room });
    }

    #[test]
    fn server_frames_are_tagged() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            garden_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(ServerFrame::Message { message: &message }).unwrap();
        assert_eq!(value["type"], json!("message"));
        assert_eq!(value["message"]["content"], json!("hi"));

        let value = serde_json::to_value(ServerFrame::Error {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "error", "message": "nope" }));
    }
}
