use crate::domain::{Message, MessageDraft, NotificationDraft, Profile, Role};
use crate::error::{Result, SyncError};
use crate::storage::{ChangeEvent, ChangeFeed, MessageStore, NotificationSink, ProfileStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notification channel carrying message change events.
const FEED_CHANNEL: &str = "internlink_message_changes";

pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .map_err(|e| SyncError::Backend(format!("migration failed: {e}")))
}

#[derive(sqlx::FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    created_at: OffsetDateTime,
    read_at: Option<OffsetDateTime>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content,
            created_at: record.created_at,
            read_at: record.read_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRecord {
    id: Uuid,
    display_name: String,
    role: String,
    contact_number: Option<String>,
}

impl ProfileRecord {
    fn into_domain(self) -> Result<Profile> {
        let role = Role::try_from(self.role.as_str()).map_err(SyncError::Backend)?;
        Ok(Profile {
            id: self.id,
            display_name: self.display_name,
            role,
            contact_number: self.contact_number,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FeedOp {
    Insert,
    Update,
}

/// JSON payload published through `pg_notify` alongside each commit.
///
/// Carries only the operation and the row id: NOTIFY payloads are capped
/// at 8000 bytes, so message content must never ride the channel. The
/// listener task re-fetches the row before fanning the event out.
#[derive(Debug, Serialize, Deserialize)]
struct FeedPayload {
    op: FeedOp,
    id: Uuid,
}

async fn fetch_message(pool: &PgPool, id: Uuid) -> Result<Option<Message>> {
    let record = sqlx::query_as::<_, MessageRecord>(
        r"
        SELECT id, sender_id, receiver_id, content, created_at, read_at
        FROM messages
        WHERE id = $1
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record.map(Message::from))
}

/// Aborts the change-feed listener task when the backend is dropped, so a
/// discarded backend does not keep a listening connection alive.
#[derive(Debug)]
struct ListenerGuard(tokio::task::JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Postgres-backed implementation of the storage traits.
///
/// Writes publish an id-only JSON payload through `pg_notify` in the same
/// transaction as the row change; a background `LISTEN` task re-fetches
/// each row and fans the event out to every subscribed [`ChangeFeed`]. If
/// the listener connection drops, live feeds simply stop receiving; the
/// hosting lifecycle is expected to rebuild the backend, matching the
/// subscribe-on-entry/unsubscribe-on-exit contract.
#[derive(Debug)]
pub struct PgBackend {
    pool: PgPool,
    feed_tx: broadcast::Sender<ChangeEvent>,
    _listener: ListenerGuard,
}

impl PgBackend {
    pub async fn connect(pool: PgPool, feed_capacity: usize) -> Result<Self> {
        let (feed_tx, _) = broadcast::channel(feed_capacity);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(FEED_CHANNEL).await?;

        let tx = feed_tx.clone();
        let fetch_pool = pool.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => match serde_json::from_str::<FeedPayload>(notification.payload()) {
                        Ok(payload) => match fetch_message(&fetch_pool, payload.id).await {
                            Ok(Some(message)) => {
                                let event = match payload.op {
                                    FeedOp::Insert => ChangeEvent::Inserted(message),
                                    FeedOp::Update => ChangeEvent::Updated(message),
                                };
                                let _ = tx.send(event);
                            }
                            Ok(None) => {
                                tracing::warn!(id = %payload.id, "Change-feed row vanished before fetch");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, id = %payload.id, "Failed to fetch change-feed row");
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "Discarding undecodable change-feed payload");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "Change-feed listener lost its connection");
                        break;
                    }
                }
            }
        });

        Ok(Self { pool, feed_tx, _listener: ListenerGuard(handle) })
    }

    async fn publish(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        op: FeedOp,
        id: Uuid,
    ) -> Result<()> {
        let payload = serde_json::to_string(&FeedPayload { op, id })
            .map_err(|e| SyncError::Backend(format!("feed payload encoding failed: {e}")))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(FEED_CHANNEL)
            .bind(payload)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgBackend {
    async fn history_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r"
            SELECT id, sender_id, receiver_id, content, created_at, read_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn latest_between(&self, a: Uuid, b: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r"
            SELECT id, sender_id, receiver_id, content, created_at, read_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Message::from))
    }

    async fn unread_count(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM messages
            WHERE sender_id = $1 AND receiver_id = $2 AND read_at IS NULL
            ",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert(&self, draft: MessageDraft) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, MessageRecord>(
            r"
            INSERT INTO messages (id, sender_id, receiver_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, receiver_id, content, created_at, read_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(draft.sender_id)
        .bind(draft.receiver_id)
        .bind(&draft.content)
        .fetch_one(&mut *tx)
        .await?;

        let message = Message::from(record);
        Self::publish(&mut tx, FeedOp::Insert, message.id).await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid, read_at: OffsetDateTime) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Only unread rows are touched, so a read timestamp never regresses.
        let records = sqlx::query_as::<_, MessageRecord>(
            r"
            UPDATE messages
            SET read_at = $3
            WHERE sender_id = $1 AND receiver_id = $2 AND read_at IS NULL
            RETURNING id, sender_id, receiver_id, content, created_at, read_at
            ",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(read_at)
        .fetch_all(&mut *tx)
        .await?;

        let count = records.len() as u64;
        for record in records {
            Self::publish(&mut tx, FeedOp::Update, record.id).await?;
        }
        tx.commit().await?;

        Ok(count)
    }

    fn subscribe(&self) -> ChangeFeed {
        ChangeFeed::new(self.feed_tx.subscribe())
    }
}

#[async_trait]
impl ProfileStore for PgBackend {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r"
            SELECT id, display_name, role, contact_number
            FROM profiles
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(ProfileRecord::into_domain).transpose()
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            r"
            SELECT id, display_name, role, contact_number
            FROM profiles
            WHERE role = $1
            ORDER BY display_name ASC, id ASC
            ",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(ProfileRecord::into_domain).collect()
    }
}

#[async_trait]
impl NotificationSink for PgBackend {
    async fn deliver(&self, notification: NotificationDraft) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO notifications (id, recipient_id, title, body, category)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.category.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
