use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    bus::EventBus,
    chat::{ChatMessage, ConversationKey},
    config::Config,
    context::{AdRequest, Connection, Participant, Quotation, Role},
    error::{ApiResult, AppError},
    resolver::{self, ConversationInfo},
    store::{ConversationSummary, Store},
};

pub struct AppState {
    pub store: Store,
    pub bus: Arc<EventBus>,
    pub config: Config,
}

/// REST surface. Persistence here is the source of truth; the realtime
/// relay in `ws` only ever re-broadcasts records these handlers stored.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/messages/quotation", post(send_quotation_message))
        .route("/api/messages/ad-request", post(send_ad_request_message))
        .route("/api/messages/connection", post(send_connection_message))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/messages", get(get_messages))
        .route("/api/conversations/:id/read", put(mark_read))
        .route("/api/participants", post(upsert_participant))
        .route(
            "/api/participants/:id/conversations",
            get(list_conversations),
        )
        .route("/api/quotations", post(create_quotation))
        .route("/api/quotations/:id", get(get_quotation))
        .route("/api/ad-requests", post(create_ad_request))
        .route("/api/ad-requests/:id", get(get_ad_request))
        .route("/api/connections", post(create_connection))
        .route("/api/connections/:id", get(get_connection))
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// -----------------------------------------------------------------------------
// Message sending (three context variants)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendQuotationMessage {
    pub quotation_id: String,
    pub sender_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendAdRequestMessage {
    pub ad_request_id: String,
    pub sender_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendConnectionMessage {
    pub connection_id: String,
    pub sender_id: String,
    pub content: String,
}

pub async fn send_quotation_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendQuotationMessage>,
) -> ApiResult<Json<ChatMessage>> {
    let content = non_empty(&req.content)?;
    let quotation = state
        .store
        .get_quotation(&req.quotation_id)
        .await?
        .ok_or_else(|| AppError::not_found("quotation"))?;
    let receiver = quotation
        .other_party(&req.sender_id)
        .ok_or_else(|| AppError::validation("sender is not a party to this quotation"))?;

    let key = ConversationKey::for_quotation(
        &quotation.customer_id,
        &quotation.vendor_id,
        &quotation.id,
    )?;
    let msg = ChatMessage::new(&key, &req.sender_id, receiver, content);
    state.store.save_message(&msg).await?;

    tracing::info!(conversation = %msg.conversation_id, message = %msg.id, "quotation message stored");
    Ok(Json(msg))
}

pub async fn send_ad_request_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendAdRequestMessage>,
) -> ApiResult<Json<ChatMessage>> {
    let content = non_empty(&req.content)?;
    let ad_request = state
        .store
        .get_ad_request(&req.ad_request_id)
        .await?
        .ok_or_else(|| AppError::not_found("ad request"))?;
    let receiver = ad_request
        .other_party(&req.sender_id)
        .ok_or_else(|| AppError::validation("sender is not a party to this ad request"))?;

    let key = ConversationKey::for_ad_request(
        &ad_request.customer_id,
        &ad_request.vendor_id,
        &ad_request.id,
    )?;
    let msg = ChatMessage::new(&key, &req.sender_id, receiver, content);
    state.store.save_message(&msg).await?;

    tracing::info!(conversation = %msg.conversation_id, message = %msg.id, "ad-request message stored");
    Ok(Json(msg))
}

pub async fn send_connection_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendConnectionMessage>,
) -> ApiResult<Json<ChatMessage>> {
    let content = non_empty(&req.content)?;
    let connection = state
        .store
        .get_connection(&req.connection_id)
        .await?
        .ok_or_else(|| AppError::not_found("connection"))?;
    let receiver = connection
        .other_party(&req.sender_id)
        .ok_or_else(|| AppError::validation("sender is not a party to this connection"))?;

    let key = ConversationKey::for_connection(&connection.vendor_a, &connection.vendor_b)?;
    let msg = ChatMessage::new(&key, &req.sender_id, receiver, content);
    state.store.save_message(&msg).await?;

    tracing::info!(conversation = %msg.conversation_id, message = %msg.id, "connection message stored");
    Ok(Json(msg))
}

// -----------------------------------------------------------------------------
// Conversation reads
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ViewerParams {
    pub viewer: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub reader_id: String,
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    // Parsing validates the identifier and normalizes participant order.
    let key = ConversationKey::parse(&id)?;
    let limit = params.limit.unwrap_or(state.config.history_limit);
    let messages = state.store.get_history(&key.canonical(), limit).await?;
    Ok(Json(messages))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ViewerParams>,
) -> ApiResult<Json<ConversationInfo>> {
    let info = resolver::resolve(&state.store, &id, &params.viewer).await?;
    Ok(Json(info))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<Json<MarkReadResponse>> {
    let key = ConversationKey::parse(&id)?;
    if !key.involves(&req.reader_id) {
        return Err(AppError::validation(
            "reader is not a participant of this conversation",
        ));
    }
    let updated = state.store.mark_read(&key.canonical(), &req.reader_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let summaries = state.store.conversation_summaries(&id).await?;
    Ok(Json(summaries))
}

// -----------------------------------------------------------------------------
// Collaborator records (create/fetch only; the owning subsystems live
// elsewhere)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewParticipant {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct NewQuotation {
    pub id: Option<String>,
    pub customer_id: String,
    pub vendor_id: String,
    pub title: String,
    pub amount: f64,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAdRequest {
    pub id: Option<String>,
    pub advertisement_id: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct NewConnection {
    pub id: Option<String>,
    pub vendor_a: String,
    pub vendor_b: String,
}

pub async fn upsert_participant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewParticipant>,
) -> ApiResult<Json<Participant>> {
    let participant = Participant {
        id: req.id,
        name: req.name,
        role: req.role,
        created_at: Utc::now(),
    };
    state.store.upsert_participant(&participant).await?;
    Ok(Json(participant))
}

pub async fn create_quotation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewQuotation>,
) -> ApiResult<Json<Quotation>> {
    let quotation = Quotation {
        id: req.id.unwrap_or_else(fresh_id),
        customer_id: req.customer_id,
        vendor_id: req.vendor_id,
        title: req.title,
        amount: req.amount,
        status: req.status.unwrap_or_else(|| "sent".to_string()),
        created_at: Utc::now(),
    };
    // Fail early if the ids could never form a conversation key.
    ConversationKey::for_quotation(&quotation.customer_id, &quotation.vendor_id, &quotation.id)?;
    state.store.insert_quotation(&quotation).await?;
    Ok(Json(quotation))
}

pub async fn get_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Quotation>> {
    let quotation = state
        .store
        .get_quotation(&id)
        .await?
        .ok_or_else(|| AppError::not_found("quotation"))?;
    Ok(Json(quotation))
}

pub async fn create_ad_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewAdRequest>,
) -> ApiResult<Json<AdRequest>> {
    let ad_request = AdRequest {
        id: req.id.unwrap_or_else(fresh_id),
        advertisement_id: req.advertisement_id,
        customer_id: req.customer_id,
        vendor_id: req.vendor_id,
        subject: req.subject,
        created_at: Utc::now(),
    };
    ConversationKey::for_ad_request(
        &ad_request.customer_id,
        &ad_request.vendor_id,
        &ad_request.id,
    )?;
    state.store.insert_ad_request(&ad_request).await?;
    Ok(Json(ad_request))
}

pub async fn get_ad_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AdRequest>> {
    let ad_request = state
        .store
        .get_ad_request(&id)
        .await?
        .ok_or_else(|| AppError::not_found("ad request"))?;
    Ok(Json(ad_request))
}

pub async fn create_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewConnection>,
) -> ApiResult<Json<Connection>> {
    if req.vendor_a == req.vendor_b {
        return Err(AppError::validation("a vendor cannot connect to itself"));
    }
    if state
        .store
        .find_connection_between(&req.vendor_a, &req.vendor_b)
        .await?
        .is_some()
    {
        return Err(AppError::validation(
            "a connection between these vendors already exists",
        ));
    }
    let connection = Connection {
        id: req.id.unwrap_or_else(fresh_id),
        vendor_a: req.vendor_a,
        vendor_b: req.vendor_b,
        created_at: Utc::now(),
    };
    ConversationKey::for_connection(&connection.vendor_a, &connection.vendor_b)?;
    state.store.insert_connection(&connection).await?;
    Ok(Json(connection))
}

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Connection>> {
    let connection = state
        .store
        .get_connection(&id)
        .await?
        .ok_or_else(|| AppError::not_found("connection"))?;
    Ok(Json(connection))
}

fn non_empty(content: &str) -> Result<&str, AppError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("message content must not be empty"));
    }
    Ok(trimmed)
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_state() -> Arc<AppState> {
        let store = Store::in_memory().await.unwrap();
        Arc::new(AppState {
            store,
            bus: Arc::new(EventBus::new()),
            config: Config {
                port: 0,
                db_path: std::path::PathBuf::new(),
                history_limit: 50,
            },
        })
    }

    async fn seed_quotation(state: &Arc<AppState>) {
        state
            .store
            .insert_quotation(&Quotation {
                id: "q123".into(),
                customer_id: "u1".into(),
                vendor_id: "u2".into(),
                title: "Kitchen remodel".into(),
                amount: 1200.0,
                status: "sent".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn quotation_send_then_history_has_it_exactly_once() {
        let state = test_state().await;
        seed_quotation(&state).await;

        let Json(stored) = send_quotation_message(
            State(state.clone()),
            Json(SendQuotationMessage {
                quotation_id: "q123".into(),
                sender_id: "u2".into(),
                content: "Happy to start Monday".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(stored.conversation_id, "u1_u2_q123");
        assert_eq!(stored.receiver_id, "u1");

        let Json(history) = get_messages(
            State(state),
            Path("u1_u2_q123".into()),
            Query(HistoryParams { limit: None }),
        )
        .await
        .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, stored.id);
    }

    #[tokio::test]
    async fn ad_request_send_uses_the_infixed_key() {
        let state = test_state().await;
        state
            .store
            .insert_ad_request(&AdRequest {
                id: "a55".into(),
                advertisement_id: "ad9".into(),
                customer_id: "u1".into(),
                vendor_id: "u2".into(),
                subject: "Weekend availability?".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let Json(stored) = send_ad_request_message(
            State(state.clone()),
            Json(SendAdRequestMessage {
                ad_request_id: "a55".into(),
                sender_id: "u1".into(),
                content: "Are you free Saturday?".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(stored.conversation_id, "u1_u2_ad_a55");

        let Json(history) = get_messages(
            State(state),
            Path("u1_u2_ad_a55".into()),
            Query(HistoryParams { limit: None }),
        )
        .await
        .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn connection_send_uses_the_bare_pair_key() {
        let state = test_state().await;
        state
            .store
            .insert_connection(&Connection {
                id: "conn1".into(),
                vendor_a: "v2".into(),
                vendor_b: "v1".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let Json(stored) = send_connection_message(
            State(state.clone()),
            Json(SendConnectionMessage {
                connection_id: "conn1".into(),
                sender_id: "v1".into(),
                content: "Got a referral for you".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(stored.conversation_id, "v1_v2");
        assert_eq!(stored.receiver_id, "v2");

        let Json(history) = get_messages(
            State(state),
            Path("v1_v2".into()),
            Query(HistoryParams { limit: None }),
        )
        .await
        .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, stored.id);
    }

    #[tokio::test]
    async fn sender_outside_the_context_is_rejected() {
        let state = test_state().await;
        seed_quotation(&state).await;

        let err = send_quotation_message(
            State(state),
            Json(SendQuotationMessage {
                quotation_id: "q123".into(),
                sender_id: "intruder".into(),
                content: "hi".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn read_receipts_flow() {
        let state = test_state().await;
        seed_quotation(&state).await;

        send_quotation_message(
            State(state.clone()),
            Json(SendQuotationMessage {
                quotation_id: "q123".into(),
                sender_id: "u2".into(),
                content: "ping".into(),
            }),
        )
        .await
        .unwrap();

        let Json(resp) = mark_read(
            State(state.clone()),
            Path("u1_u2_q123".into()),
            Json(MarkReadRequest {
                reader_id: "u1".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.updated, 1);

        let Json(history) = get_messages(
            State(state),
            Path("u1_u2_q123".into()),
            Query(HistoryParams { limit: None }),
        )
        .await
        .unwrap();
        assert!(history[0].read_at.is_some());
    }

    #[tokio::test]
    async fn malformed_identifier_is_rejected_not_crashed() {
        let state = test_state().await;
        let err = get_messages(
            State(state),
            Path("not-a-key".into()),
            Query(HistoryParams { limit: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Key(_)));
    }

    #[tokio::test]
    async fn duplicate_connection_pair_is_rejected() {
        let state = test_state().await;
        create_connection(
            State(state.clone()),
            Json(NewConnection {
                id: Some("conn1".into()),
                vendor_a: "v1".into(),
                vendor_b: "v2".into(),
            }),
        )
        .await
        .unwrap();

        let err = create_connection(
            State(state),
            Json(NewConnection {
                id: Some("conn2".into()),
                vendor_a: "v2".into(),
                vendor_b: "v1".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
