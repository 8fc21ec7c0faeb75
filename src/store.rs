use crate::{
    chat::ChatMessage,
    context::{AdRequest, Connection, Participant, Quotation, Role},
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{path::Path, str::FromStr};

/// One entry in a participant's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_message: ChatMessage,
    pub unread_count: i64,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A pooled :memory: database is per-connection; keep a single one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                read_at DATETIME
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
                ON messages(conversation_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS participants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS quotations (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                vendor_id TEXT NOT NULL,
                title TEXT NOT NULL,
                amount REAL NOT NULL,
                status TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ad_requests (
                id TEXT PRIMARY KEY,
                advertisement_id TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                vendor_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                vendor_a TEXT NOT NULL,
                vendor_b TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                UNIQUE(vendor_a, vendor_b)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Save a chat message to the store.
    pub async fn save_message(&self, msg: &ChatMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, created_at, read_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.conversation_id)
        .bind(&msg.sender_id)
        .bind(&msg.receiver_id)
        .bind(&msg.content)
        .bind(msg.created_at)
        .bind(msg.read_at)
        .execute(&self.pool)
        .await
        .context("Failed to save message")?;

        Ok(())
    }

    /// Retrieve message history for a conversation.
    /// Returns messages ordered by creation time ascending (oldest to newest).
    pub async fn get_history(&self, conversation_id: &str, limit: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, created_at, read_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch message history")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(message_from_row(&row)?);
        }

        // Return in chronological order (oldest -> newest)
        messages.reverse();

        Ok(messages)
    }

    /// Mark every unread message addressed to `reader_id` in the
    /// conversation as read. Returns how many rows were updated.
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read_at = ?
            WHERE conversation_id = ? AND receiver_id = ? AND read_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark messages as read")?;

        Ok(result.rows_affected())
    }

    /// Conversation list for one participant: newest-first, one entry per
    /// conversation id, with the last message and the unread count.
    pub async fn conversation_summaries(
        &self,
        participant_id: &str,
    ) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, MAX(created_at) AS last_at
            FROM messages
            WHERE sender_id = ? OR receiver_id = ?
            GROUP BY conversation_id
            ORDER BY last_at DESC
            "#,
        )
        .bind(participant_id)
        .bind(participant_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conversations")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let conversation_id: String = row.try_get("conversation_id")?;

            let last = sqlx::query(
                r#"
                SELECT id, conversation_id, sender_id, receiver_id, content, created_at, read_at
                FROM messages
                WHERE conversation_id = ?
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(&conversation_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to fetch last message")?;

            let unread = sqlx::query(
                r#"
                SELECT COUNT(*) AS unread
                FROM messages
                WHERE conversation_id = ? AND receiver_id = ? AND read_at IS NULL
                "#,
            )
            .bind(&conversation_id)
            .bind(participant_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count unread messages")?;

            summaries.push(ConversationSummary {
                conversation_id,
                last_message: message_from_row(&last)?,
                unread_count: unread.try_get("unread")?,
            });
        }

        Ok(summaries)
    }

    /// Save or update a participant's display identity.
    pub async fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO participants (id, name, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role
            "#,
        )
        .bind(&participant.id)
        .bind(&participant.name)
        .bind(participant.role.as_str())
        .bind(participant.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save participant")?;

        Ok(())
    }

    pub async fn get_participant(&self, id: &str) -> Result<Option<Participant>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, role, created_at
            FROM participants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch participant")?;

        row.map(|row| {
            let role_str: String = row.try_get("role")?;
            let role = Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("unknown participant role `{}`", role_str))?;
            Ok(Participant {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                role,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn insert_quotation(&self, quotation: &Quotation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quotations (id, customer_id, vendor_id, title, amount, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quotation.id)
        .bind(&quotation.customer_id)
        .bind(&quotation.vendor_id)
        .bind(&quotation.title)
        .bind(quotation.amount)
        .bind(&quotation.status)
        .bind(quotation.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save quotation")?;

        Ok(())
    }

    pub async fn get_quotation(&self, id: &str) -> Result<Option<Quotation>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, vendor_id, title, amount, status, created_at
            FROM quotations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch quotation")?;

        row.map(|row| {
            Ok(Quotation {
                id: row.try_get("id")?,
                customer_id: row.try_get("customer_id")?,
                vendor_id: row.try_get("vendor_id")?,
                title: row.try_get("title")?,
                amount: row.try_get("amount")?,
                status: row.try_get("status")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn insert_ad_request(&self, ad_request: &AdRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ad_requests (id, advertisement_id, customer_id, vendor_id, subject, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ad_request.id)
        .bind(&ad_request.advertisement_id)
        .bind(&ad_request.customer_id)
        .bind(&ad_request.vendor_id)
        .bind(&ad_request.subject)
        .bind(ad_request.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save ad request")?;

        Ok(())
    }

    pub async fn get_ad_request(&self, id: &str) -> Result<Option<AdRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, advertisement_id, customer_id, vendor_id, subject, created_at
            FROM ad_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch ad request")?;

        row.map(|row| {
            Ok(AdRequest {
                id: row.try_get("id")?,
                advertisement_id: row.try_get("advertisement_id")?,
                customer_id: row.try_get("customer_id")?,
                vendor_id: row.try_get("vendor_id")?,
                subject: row.try_get("subject")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    /// Vendor pairs are stored sorted so the UNIQUE constraint holds for
    /// either insertion order.
    pub async fn insert_connection(&self, connection: &Connection) -> Result<()> {
        let (a, b) = sorted_pair(&connection.vendor_a, &connection.vendor_b);
        sqlx::query(
            r#"
            INSERT INTO connections (id, vendor_a, vendor_b, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&connection.id)
        .bind(a)
        .bind(b)
        .bind(connection.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save connection")?;

        Ok(())
    }

    pub async fn get_connection(&self, id: &str) -> Result<Option<Connection>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_a, vendor_b, created_at
            FROM connections
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch connection")?;

        row.map(|row| connection_from_row(&row)).transpose()
    }

    pub async fn find_connection_between(
        &self,
        vendor_a: &str,
        vendor_b: &str,
    ) -> Result<Option<Connection>> {
        let (a, b) = sorted_pair(vendor_a, vendor_b);
        let row = sqlx::query(
            r#"
            SELECT id, vendor_a, vendor_b, created_at
            FROM connections
            WHERE vendor_a = ? AND vendor_b = ?
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch connection by pair")?;

        row.map(|row| connection_from_row(&row)).transpose()
    }
}

fn sorted_pair<'a>(left: &'a str, right: &'a str) -> (&'a str, &'a str) {
    if left <= right {
        (left, right)
    } else {
        (right, left)
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage> {
    let read_at: Option<DateTime<Utc>> = row.try_get("read_at")?;
    Ok(ChatMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        read_at,
    })
}

fn connection_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Connection> {
    Ok(Connection {
        id: row.try_get("id")?,
        vendor_a: row.try_get("vendor_a")?,
        vendor_b: row.try_get("vendor_b")?,
        created_at: row.try_get("created_at")?,
    })
}
