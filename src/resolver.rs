use serde::Serialize;

use crate::{
    chat::{ContextKind, ConversationKey},
    context::Role,
    error::AppError,
    store::Store,
};

/// What the chat view needs to open a thread: the kind tag, the backing
/// context, and who is on the other side.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationInfo {
    pub conversation_id: String,
    pub kind: &'static str,
    pub participants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub title: String,
    pub counterpart: Counterpart,
}

#[derive(Debug, Clone, Serialize)]
pub struct Counterpart {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Resolve a conversation identifier into its display metadata.
///
/// The identifier is parsed back into participants and context, then the
/// backing record is fetched and cross-checked against the participant
/// pair. A missing or mismatched record is a lookup error; nothing is
/// retried.
pub async fn resolve(
    store: &Store,
    raw_id: &str,
    viewer: &str,
) -> Result<ConversationInfo, AppError> {
    let key = ConversationKey::parse(raw_id)?;
    let counterpart_id = key
        .counterpart_of(viewer)
        .ok_or_else(|| AppError::validation("viewer is not a participant of this conversation"))?
        .to_string();

    let (participant_a, participant_b) = key.participants();

    let title = match key.kind() {
        ContextKind::Quotation { quotation_id } => {
            let quotation = store
                .get_quotation(quotation_id)
                .await?
                .ok_or_else(|| AppError::not_found("quotation"))?;
            if quotation.other_party(participant_a) != Some(participant_b) {
                return Err(AppError::validation(
                    "conversation participants do not match the quotation",
                ));
            }
            quotation.title
        }
        ContextKind::AdRequest { ad_request_id } => {
            let ad_request = store
                .get_ad_request(ad_request_id)
                .await?
                .ok_or_else(|| AppError::not_found("ad request"))?;
            if ad_request.other_party(participant_a) != Some(participant_b) {
                return Err(AppError::validation(
                    "conversation participants do not match the ad request",
                ));
            }
            ad_request.subject
        }
        ContextKind::Connection => {
            // The pair itself is the context; the record is found by it.
            store
                .find_connection_between(participant_a, participant_b)
                .await?
                .ok_or_else(|| AppError::not_found("connection"))?;
            String::new()
        }
    };

    let counterpart_record = store.get_participant(&counterpart_id).await?;
    let counterpart = Counterpart {
        id: counterpart_id.clone(),
        name: counterpart_record.as_ref().map(|p| p.name.clone()),
        role: counterpart_record.as_ref().map(|p| p.role),
    };

    // Connection chats have no context title of their own; show who the
    // thread is with instead.
    let title = if title.is_empty() {
        counterpart
            .name
            .clone()
            .unwrap_or_else(|| counterpart_id.clone())
    } else {
        title
    };

    Ok(ConversationInfo {
        conversation_id: key.canonical(),
        kind: key.kind().label(),
        participants: vec![participant_a.to_string(), participant_b.to_string()],
        context_id: key.kind().context_id().map(str::to_string),
        title,
        counterpart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AdRequest, Connection, Participant, Quotation};
    use chrono::Utc;

    async fn seeded_store() -> Store {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_participant(&Participant {
                id: "u1".into(),
                name: "Ada".into(),
                role: Role::Customer,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .upsert_participant(&Participant {
                id: "u2".into(),
                name: "Grace".into(),
                role: Role::Vendor,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
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
        store
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
        store
    }

    #[tokio::test]
    async fn resolves_quotation_identifier() {
        let store = seeded_store().await;
        let info = resolve(&store, "u1_u2_q123", "u1").await.unwrap();
        assert_eq!(info.kind, "quotation");
        assert_eq!(info.context_id.as_deref(), Some("q123"));
        assert_eq!(info.participants, vec!["u1", "u2"]);
        assert_eq!(info.title, "Kitchen remodel");
        assert_eq!(info.counterpart.id, "u2");
        assert_eq!(info.counterpart.name.as_deref(), Some("Grace"));
    }

    #[tokio::test]
    async fn resolves_ad_request_identifier() {
        let store = seeded_store().await;
        let info = resolve(&store, "u1_u2_ad_a55", "u2").await.unwrap();
        assert_eq!(info.kind, "ad_request");
        assert_eq!(info.context_id.as_deref(), Some("a55"));
        assert_eq!(info.counterpart.id, "u1");
        assert_eq!(info.title, "Weekend availability?");
    }

    #[tokio::test]
    async fn resolves_connection_by_pair() {
        let store = seeded_store().await;
        store
            .insert_connection(&Connection {
                id: "conn1".into(),
                vendor_a: "u1".into(),
                vendor_b: "u2".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let info = resolve(&store, "u1_u2", "u1").await.unwrap();
        assert_eq!(info.kind, "connection");
        assert_eq!(info.context_id, None);
        // Falls back to the counterpart's display name.
        assert_eq!(info.title, "Grace");
    }

    #[tokio::test]
    async fn deleted_context_cannot_be_opened() {
        let store = seeded_store().await;
        let err = resolve(&store, "u1_u2_gone", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = resolve(&store, "u1_u2_ad_gone", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // No connection record exists for the pair.
        let err = resolve(&store, "u3_u4", "u3").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_identifier_is_a_key_error() {
        let store = seeded_store().await;
        let err = resolve(&store, "justonesegment", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Key(_)));
    }

    #[tokio::test]
    async fn viewer_outside_the_pair_is_rejected() {
        let store = seeded_store().await;
        let err = resolve(&store, "u1_u2_q123", "intruder").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn participants_must_match_the_context_record() {
        let store = seeded_store().await;
        // q123 belongs to u1/u2, not u1/u9.
        let err = resolve(&store, "u1_u9_q123", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
