use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Infix that marks the ad-request variant inside a canonical identifier.
const AD_INFIX: &str = "ad";

/// The business object a conversation is scoped by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Quotation { quotation_id: String },
    AdRequest { ad_request_id: String },
    /// Vendor-to-vendor chat; the participant pair itself is the scope.
    Connection,
}

impl ContextKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContextKind::Quotation { .. } => "quotation",
            ContextKind::AdRequest { .. } => "ad_request",
            ContextKind::Connection => "connection",
        }
    }

    pub fn context_id(&self) -> Option<&str> {
        match self {
            ContextKind::Quotation { quotation_id } => Some(quotation_id),
            ContextKind::AdRequest { ad_request_id } => Some(ad_request_id),
            ContextKind::Connection => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("conversation identifier has an empty segment")]
    EmptySegment,

    #[error("identifier `{0}` contains `_`, which is reserved as the key separator")]
    ReservedSeparator(String),

    #[error("unrecognized conversation identifier `{0}`")]
    Unrecognized(String),
}

/// Canonical identity of one chat thread.
///
/// Participants are stored sorted, so both sides derive the identical key
/// no matter which of them is the customer and which the vendor. The
/// canonical string form is what routes history lookups and room
/// membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    kind: ContextKind,
    participant_a: String,
    participant_b: String,
}

impl ConversationKey {
    pub fn for_quotation(first: &str, second: &str, quotation_id: &str) -> Result<Self, KeyError> {
        Self::build(
            first,
            second,
            ContextKind::Quotation {
                quotation_id: segment(quotation_id)?,
            },
        )
    }

    pub fn for_ad_request(
        first: &str,
        second: &str,
        ad_request_id: &str,
    ) -> Result<Self, KeyError> {
        Self::build(
            first,
            second,
            ContextKind::AdRequest {
                ad_request_id: segment(ad_request_id)?,
            },
        )
    }

    pub fn for_connection(first: &str, second: &str) -> Result<Self, KeyError> {
        Self::build(first, second, ContextKind::Connection)
    }

    fn build(first: &str, second: &str, kind: ContextKind) -> Result<Self, KeyError> {
        let first = segment(first)?;
        let second = segment(second)?;
        let (participant_a, participant_b) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };
        Ok(Self {
            kind,
            participant_a,
            participant_b,
        })
    }

    /// Render the key in the wire format shared with the legacy scheme:
    /// `a_b_<quotationId>`, `a_b_ad_<adRequestId>` or bare `a_b`.
    pub fn canonical(&self) -> String {
        match &self.kind {
            ContextKind::Quotation { quotation_id } => {
                format!(
                    "{}_{}_{}",
                    self.participant_a, self.participant_b, quotation_id
                )
            }
            ContextKind::AdRequest { ad_request_id } => format!(
                "{}_{}_{}_{}",
                self.participant_a, self.participant_b, AD_INFIX, ad_request_id
            ),
            ContextKind::Connection => {
                format!("{}_{}", self.participant_a, self.participant_b)
            }
        }
    }

    /// Reverse of [`canonical`](Self::canonical). Segment validation at
    /// construction guarantees no segment contains `_`, so the split is
    /// unambiguous: two segments is a connection, three a quotation, four
    /// an ad request (with the literal infix in third position).
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = raw.split('_').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(KeyError::EmptySegment);
        }
        match parts.as_slice() {
            [a, b] => Self::build(a, b, ContextKind::Connection),
            [a, b, quotation_id] => Self::build(
                a,
                b,
                ContextKind::Quotation {
                    quotation_id: (*quotation_id).to_string(),
                },
            ),
            [a, b, infix, ad_request_id] if *infix == AD_INFIX => Self::build(
                a,
                b,
                ContextKind::AdRequest {
                    ad_request_id: (*ad_request_id).to_string(),
                },
            ),
            _ => Err(KeyError::Unrecognized(raw.to_string())),
        }
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.participant_a, &self.participant_b)
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        self.participant_a == participant_id || self.participant_b == participant_id
    }

    /// The other side of the pair, from `viewer`'s perspective.
    pub fn counterpart_of(&self, viewer: &str) -> Option<&str> {
        if viewer == self.participant_a {
            Some(&self.participant_b)
        } else if viewer == self.participant_b {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

fn segment(raw: &str) -> Result<String, KeyError> {
    if raw.is_empty() {
        return Err(KeyError::EmptySegment);
    }
    if raw.contains('_') {
        return Err(KeyError::ReservedSeparator(raw.to_string()));
    }
    Ok(raw.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(
        key: &ConversationKey,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: key.canonical(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            created_at: Utc::now(),
            read_at: None,
        }
    }
}
