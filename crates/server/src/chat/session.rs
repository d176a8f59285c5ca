//! One chat connection: room membership, message fan-out and keep-alive.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use db::models::{chat_message::ChatMessage, garden::Garden, user::User};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_stream::{
    StreamMap,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::instrument;
use utils::sanitize::escape_html;
use uuid::Uuid;

use super::{ClientFrame, MAX_MESSAGE_CHARS, ServerFrame};
use crate::{AppState, routes::access::ensure_garden_reader};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(90);

type Rooms = StreamMap<Uuid, BroadcastStream<Arc<ChatMessage>>>;

#[instrument(name = "chat.session", skip_all, fields(user_id = %user.id))]
pub async fn handle(socket: WebSocket, state: AppState, user: User) {
    let (mut sender, mut receiver) = socket.split();
    let mut rooms: Rooms = StreamMap::new();

    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_pong = Instant::now();

    tracing::info!("chat session started");

    loop {
        tokio::select! {
            Some((room, item)) = rooms.next(), if !rooms.is_empty() => {
                match item {
                    Ok(message) => {
                        let frame = ServerFrame::Message { message: message.as_ref() };
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::debug!(%room, skipped, "chat subscriber lagged");
                    }
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_pong = Instant::now();
                        let reply = handle_text(&state, &user, &mut rooms, text.as_str()).await;
                        if let Some(reply) = reply {
                            if send_frame(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(error)) => {
                        tracing::debug!(?error, "chat receive error");
                        break;
                    }
                }
            }

            _ = ping.tick() => {
                if last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::info!("chat client stopped answering pings");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let joined: Vec<Uuid> = rooms.keys().copied().collect();
    drop(rooms);
    for room in joined {
        state.chat().release(room);
    }
    let _ = sender.close().await;

    tracing::info!("chat session ended");
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame<'_>,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(error) => {
            tracing::error!(?error, "failed to serialize chat frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

fn error_frame(message: impl Into<String>) -> Option<ServerFrame<'static>> {
    Some(ServerFrame::Error {
        message: message.into(),
    })
}

async fn handle_text(
    state: &AppState,
    user: &User,
    rooms: &mut Rooms,
    text: &str,
) -> Option<ServerFrame<'static>> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::debug!(?error, "invalid chat frame");
            return error_frame("Invalid message format");
        }
    };

    match frame {
        ClientFrame::JoinRoom { room } => join(state, user, rooms, room).await,
        ClientFrame::LeaveRoom { room } => {
            if rooms.remove(&room).is_some() {
                state.chat().release(room);
                tracing::debug!(%room, "left chat room");
            }
            None
        }
        ClientFrame::Message { room, content } => post(state, user, rooms, room, &content).await,
    }
}

/// Whether `user` may take part in the room for garden `room`; the error is
/// the message to send back.
async fn check_room_access(state: &AppState, user: &User, room: Uuid) -> Result<(), String> {
    let garden = match Garden::find_by_id(state.pool(), room).await {
        Ok(Some(garden)) => garden,
        Ok(None) => return Err("Room not found".to_string()),
        Err(error) => {
            tracing::error!(?error, %room, "failed to load chat room");
            return Err("Could not load room".to_string());
        }
    };

    ensure_garden_reader(state.pool(), &garden, user)
        .await
        .map_err(|error| error.to_string())
}

async fn join(
    state: &AppState,
    user: &User,
    rooms: &mut Rooms,
    room: Uuid,
) -> Option<ServerFrame<'static>> {
    if rooms.contains_key(&room) {
        return Some(ServerFrame::Joined { room });
    }

    if let Err(message) = check_room_access(state, user, room).await {
        return error_frame(message);
    }

    rooms.insert(room, BroadcastStream::new(state.chat().subscribe(room)));
    tracing::debug!(%room, "joined chat room");
    Some(ServerFrame::Joined { room })
}

async fn post(
    state: &AppState,
    user: &User,
    rooms: &mut Rooms,
    room: Uuid,
    content: &str,
) -> Option<ServerFrame<'static>> {
    if !rooms.contains_key(&room) {
        return error_frame("Join the room before sending messages");
    }

    let trimmed = content.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > MAX_MESSAGE_CHARS {
        return error_frame(format!(
            "Message must be between 1 and {MAX_MESSAGE_CHARS} characters"
        ));
    }

    // Membership can change while the socket stays open.
    if let Err(message) = check_room_access(state, user, room).await {
        rooms.remove(&room);
        state.chat().release(room);
        tracing::debug!(%room, "dropped chat room after access was revoked");
        return error_frame(message);
    }

    let content = escape_html(trimmed);

    match ChatMessage::create(state.pool(), room, user.id, &content).await {
        Ok(message) => {
            let delivered = state.chat().publish(message);
            tracing::debug!(%room, delivered, "chat message published");
            None
        }
        Err(error) => {
            tracing::error!(?error, %room, "failed to store chat message");
            error_frame("Message could not be saved")
        }
    }
}

#[cfg(test)]
mod tests {
    use db::{
        models::{
            garden::{Garden, GardenMember, GardenRole, UpdateGarden},
            user::UserRole,
        },
        test_utils::{create_test_pool, seed_garden, seed_user},
    };
    use tempfile::TempDir;
    use utils::pagination::Pagination;

    use super::*;
    use crate::config::ServerConfig;

    async fn test_state() -> (AppState, TempDir) {
        let (pool, temp_dir) = create_test_pool().await;
        let config = ServerConfig::from_lookup(|_| None).expect("default config is valid");
        (AppState::new(pool, config), temp_dir)
    }

    async fn private_garden(state: &AppState, owner: &User) -> Garden {
        let garden = seed_garden(state.pool(), owner.id, "Walled garden").await;
        let update = UpdateGarden {
            is_public: Some(false),
            ..Default::default()
        };
        Garden::update(state.pool(), garden.id, &update).await.unwrap()
    }

    fn error_message(frame: Option<ServerFrame<'_>>) -> String {
        match frame {
            Some(ServerFrame::Error { message }) => message,
            other => panic!("expected an error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn private_rooms_need_membership() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(state.pool(), "Owner", UserRole::User).await;
        let outsider = seed_user(state.pool(), "Outsider", UserRole::User).await;
        let garden = private_garden(&state, &owner).await;

        let mut rooms = Rooms::new();
        let reply = join(&state, &outsider, &mut rooms, garden.id).await;
        assert_eq!(error_message(reply), "This garden is private");
        assert!(rooms.is_empty());

        let reply = join(&state, &owner, &mut rooms, garden.id).await;
        assert!(matches!(reply, Some(ServerFrame::Joined { room }) if room == garden.id));
        assert!(rooms.contains_key(&garden.id));
    }

    #[tokio::test]
    async fn public_rooms_are_open_and_unknown_rooms_are_not() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(state.pool(), "Owner", UserRole::User).await;
        let visitor = seed_user(state.pool(), "Visitor", UserRole::User).await;
        let garden = seed_garden(state.pool(), owner.id, "Commons").await;

        let mut rooms = Rooms::new();
        let reply = join(&state, &visitor, &mut rooms, garden.id).await;
        assert!(matches!(reply, Some(ServerFrame::Joined { .. })));

        let reply = join(&state, &visitor, &mut rooms, Uuid::new_v4()).await;
        assert_eq!(error_message(reply), "Room not found");
    }

    #[tokio::test]
    async fn messages_need_a_joined_room_and_a_sane_length() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(state.pool(), "Owner", UserRole::User).await;
        let garden = seed_garden(state.pool(), owner.id, "Commons").await;
        let mut rooms = Rooms::new();

        let reply = post(&state, &owner, &mut rooms, garden.id, "hello").await;
        assert_eq!(error_message(reply), "Join the room before sending messages");

        join(&state, &owner, &mut rooms, garden.id).await;

        let reply = post(&state, &owner, &mut rooms, garden.id, "   ").await;
        assert!(error_message(reply).starts_with("Message must be between 1 and"));

        let too_long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let reply = post(&state, &owner, &mut rooms, garden.id, &too_long).await;
        assert!(error_message(reply).starts_with("Message must be between 1 and"));

        let longest = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(post(&state, &owner, &mut rooms, garden.id, &longest).await.is_none());
    }

    #[tokio::test]
    async fn messages_are_stored_then_broadcast() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(state.pool(), "Owner", UserRole::User).await;
        let garden = seed_garden(state.pool(), owner.id, "Commons").await;
        let mut listener = state.chat().subscribe(garden.id);
        let mut rooms = Rooms::new();
        join(&state, &owner, &mut rooms, garden.id).await;

        let content = " <b>Tomatoes are in</b> ";
        assert!(post(&state, &owner, &mut rooms, garden.id, content).await.is_none());

        let delivered = listener.recv().await.unwrap();
        assert_eq!(delivered.content, "&lt;b&gt;Tomatoes are in&lt;/b&gt;");
        assert_eq!(delivered.sender_id, owner.id);

        let history =
            ChatMessage::list_for_garden(state.pool(), garden.id, &Pagination::default())
                .await
                .unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.items[0].id, delivered.id);
    }

    #[tokio::test]
    async fn removed_members_stop_posting() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(state.pool(), "Owner", UserRole::User).await;
        let member = seed_user(state.pool(), "Member", UserRole::User).await;
        let garden = private_garden(&state, &owner).await;
        GardenMember::add(state.pool(), garden.id, member.id, GardenRole::Member)
            .await
            .unwrap();

        let mut rooms = Rooms::new();
        join(&state, &member, &mut rooms, garden.id).await;
        assert!(post(&state, &member, &mut rooms, garden.id, "hi all").await.is_none());

        GardenMember::remove(state.pool(), garden.id, member.id)
            .await
            .unwrap();

        let reply = post(&state, &member, &mut rooms, garden.id, "still here?").await;
        assert_eq!(error_message(reply), "This garden is private");
        assert!(!rooms.contains_key(&garden.id));

        let history =
            ChatMessage::list_for_garden(state.pool(), garden.id, &Pagination::default())
                .await
                .unwrap();
        assert_eq!(history.total, 1);
    }
}
