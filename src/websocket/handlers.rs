//! Per-connection protocol loop and the event dispatch table.
//!
//! Every connection runs a reader loop plus a writer task bridged by an
//! unbounded channel of typed server events. Handlers validate, call the
//! services, and fan out through the registry; the writer serializes and
//! pushes frames so a slow recipient socket never blocks a sender.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::services::{conversation_service, message_service, reaction_service};
use crate::state::AppState;
use crate::websocket::message_types::{ClientEvent, ServerEvent};
use crate::websocket::ConnectionId;

/// Mutable per-connection state. `user_id` stays `None` until an
/// `authenticate` event succeeds.
struct Session {
    conn_id: ConnectionId,
    user_id: Option<Uuid>,
    sender: UnboundedSender<ServerEvent>,
}

impl Session {
    fn send(&self, event: ServerEvent) {
        // A send failure means the writer is gone and the reader loop is
        // about to observe the close; nothing to do here.
        let _ = self.sender.send(event);
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<ServerEvent>();

    metrics::CONNECTED_CLIENTS.inc();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "failed to serialize server event");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        conn_id: ConnectionId::new(),
        user_id: None,
        sender: tx,
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&state, &mut session, &text).await,
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by the transport; binary frames have no
            // meaning in this protocol.
            Ok(_) => {}
        }
    }

    // Unbind before tearing down the writer so the offline path runs while
    // the registry still knows this connection.
    if let Some(user_id) = session.user_id.take() {
        unbind(&state, user_id, session.conn_id).await;
    }
    writer.abort();
    metrics::CONNECTED_CLIENTS.dec();
}

/// Strict boundary: a frame either parses into a known event or is answered
/// on the operation's error channel, chosen by its `type` field.
async fn handle_frame(state: &AppState, session: &mut Session, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => dispatch(state, session, event).await,
        Err(parse_err) => {
            let event_type = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_owned)));
            match event_type.as_deref() {
                Some("authenticate") => session.send(ServerEvent::AuthenticationError {
                    message: "invalid authenticate payload".into(),
                }),
                Some("private_message") => session.send(ServerEvent::MessageError {
                    message: "invalid private_message payload".into(),
                }),
                Some("react_to_message") => session.send(ServerEvent::ReactionError {
                    message: "invalid react_to_message payload".into(),
                }),
                Some("mark_as_read") => session.send(ServerEvent::ReadError {
                    message: "invalid mark_as_read payload".into(),
                }),
                Some("typing") | Some("stop_typing") => {
                    debug!(error = %parse_err, "dropping malformed typing frame");
                }
                other => {
                    warn!(event_type = ?other, "dropping frame with unknown event type");
                }
            }
        }
    }
}

async fn dispatch(state: &AppState, session: &mut Session, event: ClientEvent) {
    metrics::WS_EVENTS_TOTAL
        .with_label_values(&[event.name()])
        .inc();
    match event {
        ClientEvent::Authenticate { token } => {
            handle_authenticate(state, session, &token).await
        }
        ClientEvent::PrivateMessage { to, message, media } => {
            handle_private_message(state, session, to, &message, &media).await
        }
        ClientEvent::Typing { conversation_id } => {
            handle_typing(state, session, conversation_id).await
        }
        ClientEvent::StopTyping { conversation_id } => {
            handle_stop_typing(state, session, conversation_id).await
        }
        ClientEvent::ReactToMessage {
            conversation_id,
            message_id,
            reaction,
        } => handle_react(state, session, conversation_id, message_id, &reaction).await,
        ClientEvent::MarkAsRead { conversation_id } => {
            handle_mark_as_read(state, session, conversation_id).await
        }
    }
}

async fn handle_authenticate(state: &AppState, session: &mut Session, token: &str) {
    let user_id = match state.tokens.validate(token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!(error = %e, "authentication failed");
            session.send(ServerEvent::AuthenticationError {
                message: "invalid or expired credential".into(),
            });
            return;
        }
    };

    match session.user_id {
        // Re-authenticating as the same identity is idempotent.
        Some(current) if current == user_id => {}
        // A different identity unbinds the old one with full disconnect
        // semantics, then registers fresh.
        Some(previous) => {
            unbind(state, previous, session.conn_id).await;
            session.user_id = None;
            bind(state, session, user_id).await;
        }
        None => bind(state, session, user_id).await,
    }

    session.send(ServerEvent::Authenticated { user_id });
    // Badge restore for this device only; other devices already track it.
    match state.store.unread_count(user_id).await {
        Ok(count) => session.send(ServerEvent::UnreadMessagesCount { count }),
        Err(e) => error!(error = %e, %user_id, "failed to compute unread count"),
    }
}

async fn bind(state: &AppState, session: &mut Session, user_id: Uuid) {
    let first = state
        .registry
        .register(user_id, session.conn_id, session.sender.clone())
        .await;
    session.user_id = Some(user_id);
    if first {
        state
            .registry
            .broadcast_to_others(user_id, &ServerEvent::UserOnline { user_id })
            .await;
    }
}

async fn unbind(state: &AppState, user_id: Uuid, conn_id: ConnectionId) {
    let last = state.registry.unregister(user_id, conn_id).await;
    if last {
        // Cancel the user's typing timers before anyone learns they left;
        // the offline event already communicates unavailability.
        state.typing.clear_user(user_id).await;
        state
            .registry
            .broadcast_to_others(user_id, &ServerEvent::UserOffline { user_id })
            .await;
    }
}

async fn handle_private_message(
    state: &AppState,
    session: &mut Session,
    to: Uuid,
    body: &str,
    media: &[String],
) {
    let Some(sender_id) = session.user_id else {
        session.send(ServerEvent::MessageError {
            message: AppError::Unauthenticated.client_message(),
        });
        return;
    };

    match message_service::send_private_message(
        &*state.store,
        &*state.media,
        sender_id,
        to,
        body,
        media,
    )
    .await
    {
        Ok(message) => {
            let conversation_id = message.conversation_id;
            state
                .registry
                .send_to_user(
                    sender_id,
                    &ServerEvent::MessageSent {
                        message: message.clone(),
                    },
                )
                .await;
            state
                .registry
                .send_to_user(
                    to,
                    &ServerEvent::NewMessage {
                        sender_id,
                        conversation_id,
                        message,
                    },
                )
                .await;
            push_unread(state, to).await;
            metrics::MESSAGES_DELIVERED_TOTAL.inc();
        }
        Err(e) => {
            report(&e, "private_message");
            session.send(ServerEvent::MessageError {
                message: e.client_message(),
            });
        }
    }
}

async fn handle_typing(state: &AppState, session: &mut Session, conversation_id: Uuid) {
    // Typing signals are ephemeral best-effort: misuse is dropped, not
    // answered, since the catalog defines no typing error event.
    let Some(user_id) = session.user_id else {
        debug!("ignoring typing from unauthenticated connection");
        return;
    };
    let conversation = match conversation_service::member_conversation(
        &*state.store,
        conversation_id,
        user_id,
    )
    .await
    {
        Ok(conversation) => conversation,
        Err(e) => {
            report(&e, "typing");
            return;
        }
    };
    let Some(peer) = conversation.peer_of(user_id) else {
        return;
    };

    let registry = state.registry.clone();
    let stop_event = ServerEvent::UserStopTyping {
        user_id,
        conversation_id,
    };
    let newly_typing = state
        .typing
        .start(conversation_id, user_id, async move {
            registry.send_to_user(peer, &stop_event).await;
        })
        .await;

    if newly_typing {
        state
            .registry
            .send_to_user(
                peer,
                &ServerEvent::UserTyping {
                    user_id,
                    conversation_id,
                },
            )
            .await;
    }
}

async fn handle_stop_typing(state: &AppState, session: &mut Session, conversation_id: Uuid) {
    let Some(user_id) = session.user_id else {
        debug!("ignoring stop_typing from unauthenticated connection");
        return;
    };
    let conversation = match conversation_service::member_conversation(
        &*state.store,
        conversation_id,
        user_id,
    )
    .await
    {
        Ok(conversation) => conversation,
        Err(e) => {
            report(&e, "stop_typing");
            return;
        }
    };
    let Some(peer) = conversation.peer_of(user_id) else {
        return;
    };

    if state.typing.stop(conversation_id, user_id).await {
        state
            .registry
            .send_to_user(
                peer,
                &ServerEvent::UserStopTyping {
                    user_id,
                    conversation_id,
                },
            )
            .await;
    }
}

async fn handle_react(
    state: &AppState,
    session: &mut Session,
    conversation_id: Uuid,
    message_id: Uuid,
    reaction: &str,
) {
    let Some(user_id) = session.user_id else {
        session.send(ServerEvent::ReactionError {
            message: AppError::Unauthenticated.client_message(),
        });
        return;
    };

    match reaction_service::react(&*state.store, user_id, conversation_id, message_id, reaction)
        .await
    {
        Ok(peer) => {
            state
                .registry
                .send_to_user(
                    peer,
                    &ServerEvent::MessageReacted {
                        conversation_id,
                        message_id,
                        reacted_by: user_id,
                        reaction: reaction.to_string(),
                    },
                )
                .await;
        }
        Err(e) => {
            report(&e, "react_to_message");
            session.send(ServerEvent::ReactionError {
                message: e.client_message(),
            });
        }
    }
}

async fn handle_mark_as_read(state: &AppState, session: &mut Session, conversation_id: Uuid) {
    let Some(user_id) = session.user_id else {
        session.send(ServerEvent::ReadError {
            message: AppError::Unauthenticated.client_message(),
        });
        return;
    };

    match reaction_service::mark_read(&*state.store, user_id, conversation_id).await {
        Ok((peer, _marked)) => {
            state
                .registry
                .send_to_user(
                    peer,
                    &ServerEvent::MessagesRead {
                        conversation_id,
                        read_by: user_id,
                    },
                )
                .await;
            push_unread(state, user_id).await;
        }
        Err(e) => {
            report(&e, "mark_as_read");
            session.send(ServerEvent::ReadError {
                message: e.client_message(),
            });
        }
    }
}

/// Push the user's aggregate unread total to every device they hold.
async fn push_unread(state: &AppState, user_id: Uuid) {
    match state.store.unread_count(user_id).await {
        Ok(count) => {
            state
                .registry
                .send_to_user(user_id, &ServerEvent::UnreadMessagesCount { count })
                .await;
        }
        Err(e) => error!(error = %e, %user_id, "failed to compute unread count"),
    }
}

fn report(e: &AppError, op: &str) {
    if e.is_internal() {
        error!(error = %e, op, "operation failed");
    } else {
        debug!(error = %e, op, "operation rejected");
    }
}
