use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{api::AppState, bus::Event, chat::ChatMessage};

/// Frames a client may send. `send-message` relays a record the REST path
/// already persisted; the socket never writes to the store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
    SendMessage(ChatMessage),
    Typing {
        conversation_id: String,
        sender_id: String,
        active: bool,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

/// One task per connection: client frames mutate the joined-room set or
/// publish to the bus; bus events are forwarded only for joined rooms.
/// Delivery is fire-and-forget - a lagged or closed receiver just misses
/// events and catches up on its next history fetch.
async fn client_loop(socket: WebSocket, state: Arc<AppState>) {
    info!("New realtime connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut bus_rx = state.bus.subscribe();
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => handle_client_event(event, &state, &mut rooms),
                        Err(e) => debug!("Ignoring unparseable client frame: {}", e),
                    },
                    Message::Close(_) => break,
                    // Pings are answered by axum itself.
                    _ => {}
                }
            }
            event = bus_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !should_forward(&rooms, &event) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to encode realtime event: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // No redelivery; the REST path is the source of truth.
                        debug!(skipped, "Realtime receiver lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Realtime connection closed");
}

fn handle_client_event(event: ClientEvent, state: &AppState, rooms: &mut HashSet<String>) {
    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            debug!(room = %conversation_id, "join");
            rooms.insert(conversation_id);
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            debug!(room = %conversation_id, "leave");
            rooms.remove(&conversation_id);
        }
        ClientEvent::SendMessage(msg) => {
            state.bus.publish(Event::ConversationMessage(msg));
        }
        ClientEvent::Typing {
            conversation_id,
            sender_id,
            active,
        } => {
            state.bus.publish(Event::Typing {
                conversation_id,
                sender_id,
                active,
            });
        }
    }
}

fn should_forward(rooms: &HashSet<String>, event: &Event) -> bool {
    rooms.contains(event.room())
}
