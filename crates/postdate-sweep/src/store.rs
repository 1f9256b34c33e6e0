//! Item store boundary for the sweep engine.
//!
//! Trait-based abstraction over the persisted collection of delivery items,
//! so delivery logic is testable without a database. Production uses the
//! Postgres implementation; tests use the in-memory store, which also backs
//! single-process deployments that do not need durability.
//!
//! The `try_claim` operation is the concurrency contract of the whole
//! system: it must be a single conditional update against the backing store,
//! never a read-then-write pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postdate_core::{error::Result, DeliveryItem, ItemId, ItemPatch, OwnerId};

/// Store operations required by the sweep engine and the owner surface.
#[async_trait]
pub trait ItemStore: Send + Sync + 'static {
    /// Persists a newly created item.
    async fn insert(&self, item: &DeliveryItem) -> Result<()>;

    /// Fetches one item by ID.
    async fn find(&self, id: ItemId) -> Result<Option<DeliveryItem>>;

    /// Lists all items belonging to an owner, newest schedule first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<DeliveryItem>>;

    /// Lists items due at `now`: pending with `scheduled_at <= now`, ordered
    /// by `scheduled_at` ascending for fairness. The boundary is inclusive.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryItem>>;

    /// Atomically transitions one item from pending to processing, provided
    /// it is still due at `now`.
    ///
    /// Returns the freshly claimed row on success. Implemented as a
    /// compare-and-swap on status so that concurrent sweeps observing the
    /// same due item agree on exactly one winner. The due-ness guard and the
    /// returned row close the window between listing and claiming: an owner
    /// edit landing in that window either defeats the claim (rescheduled to
    /// the future) or is reflected in the row the caller delivers from.
    async fn try_claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<Option<DeliveryItem>>;

    /// Terminal write after the notifier accepted the message.
    ///
    /// Callers must hold a successful claim.
    async fn mark_sent(
        &self,
        id: ItemId,
        sent_at: DateTime<Utc>,
        email_id: Option<String>,
    ) -> Result<()>;

    /// Terminal write after delivery could not be completed.
    ///
    /// Callers must hold a successful claim.
    async fn mark_failed(&self, id: ItemId, reason: &str, now: DateTime<Utc>) -> Result<()>;

    /// Owner edit, permitted only while the item is still pending.
    ///
    /// Returns whether the guarded update applied.
    async fn update(&self, id: ItemId, patch: &ItemPatch, now: DateTime<Utc>) -> Result<bool>;

    /// Deletes the item. Idempotent; removing a missing item is not an error.
    async fn remove(&self, id: ItemId) -> Result<()>;

    /// Lightweight connectivity check for health probes.
    async fn ping(&self) -> Result<()>;
}

/// Production store backed by Postgres.
///
/// All writes are single statements; `try_claim` relies on the row-level
/// atomicity of a status-guarded `UPDATE`, which also makes claims safe
/// across independent processes sharing the database.
#[derive(Debug, Clone)]
pub struct PostgresItemStore {
    pool: sqlx::PgPool,
}

impl PostgresItemStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

const ITEM_COLUMNS: &str = "id, owner_id, file_name, storage_key, recipient, scheduled_at, \
                            access_token, status, error_message, sent_at, email_id, created_at, \
                            updated_at";

#[async_trait]
impl ItemStore for PostgresItemStore {
    async fn insert(&self, item: &DeliveryItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO delivery_items (id, owner_id, file_name, storage_key, recipient, \
             scheduled_at, access_token, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(item.id)
        .bind(item.owner_id)
        .bind(&item.file_name)
        .bind(&item.storage_key)
        .bind(&item.recipient)
        .bind(item.scheduled_at)
        .bind(&item.access_token)
        .bind(item.status)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: ItemId) -> Result<Option<DeliveryItem>> {
        let item = sqlx::query_as::<_, DeliveryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<DeliveryItem>> {
        let items = sqlx::query_as::<_, DeliveryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items WHERE owner_id = $1 \
             ORDER BY scheduled_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryItem>> {
        let items = sqlx::query_as::<_, DeliveryItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM delivery_items \
             WHERE status = 'pending' AND scheduled_at <= $1 \
             ORDER BY scheduled_at ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn try_claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<Option<DeliveryItem>> {
        let item = sqlx::query_as::<_, DeliveryItem>(&format!(
            "UPDATE delivery_items SET status = 'processing', updated_at = $2 \
             WHERE id = $1 AND status = 'pending' AND scheduled_at <= $2 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn mark_sent(
        &self,
        id: ItemId,
        sent_at: DateTime<Utc>,
        email_id: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE delivery_items SET status = 'sent', sent_at = $2, email_id = $3, \
             updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(sent_at)
        .bind(email_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: ItemId, reason: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE delivery_items SET status = 'failed', error_message = $2, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, id: ItemId, patch: &ItemPatch, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE delivery_items SET recipient = COALESCE($2, recipient), \
             scheduled_at = COALESCE($3, scheduled_at), file_name = COALESCE($4, file_name), \
             updated_at = $5 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(patch.recipient.as_deref())
        .bind(patch.scheduled_at)
        .bind(patch.file_name.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, id: ItemId) -> Result<()> {
        sqlx::query("DELETE FROM delivery_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub mod memory {
    //! In-memory item store.
    //!
    //! Deterministic store for tests and for single-process deployments.
    //! The claim check-and-set happens under one write lock, giving the same
    //! exactly-one-winner guarantee the Postgres conditional update does
    //! within a process. Supports injecting failures to exercise the sweep's
    //! transient-error paths.

    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use postdate_core::{
        error::Result, CoreError, DeliveryItem, DeliveryStatus, ItemId, ItemPatch, OwnerId,
    };
    use tokio::sync::{Mutex, RwLock};

    use super::ItemStore;

    /// In-memory `ItemStore` implementation.
    #[derive(Debug, Default)]
    pub struct MemoryItemStore {
        items: RwLock<HashMap<ItemId, DeliveryItem>>,
        list_error: Mutex<Option<String>>,
        claim_error: Mutex<Option<String>>,
        mark_error: Mutex<Option<String>>,
    }

    impl MemoryItemStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Injects an error returned by the next `list_due` call.
        pub async fn inject_list_error(&self, message: impl Into<String>) {
            *self.list_error.lock().await = Some(message.into());
        }

        /// Injects an error returned by the next `try_claim` call.
        pub async fn inject_claim_error(&self, message: impl Into<String>) {
            *self.claim_error.lock().await = Some(message.into());
        }

        /// Injects an error returned by the next `mark_sent` or
        /// `mark_failed` call.
        pub async fn inject_mark_error(&self, message: impl Into<String>) {
            *self.mark_error.lock().await = Some(message.into());
        }

        /// Current status of an item, for test assertions.
        pub async fn status_of(&self, id: ItemId) -> Option<DeliveryStatus> {
            self.items.read().await.get(&id).map(|item| item.status)
        }

        /// Number of stored items.
        pub async fn len(&self) -> usize {
            self.items.read().await.len()
        }

        /// Whether the store holds no items.
        pub async fn is_empty(&self) -> bool {
            self.items.read().await.is_empty()
        }
    }

    #[async_trait]
    impl ItemStore for MemoryItemStore {
        async fn insert(&self, item: &DeliveryItem) -> Result<()> {
            let mut items = self.items.write().await;
            if items.values().any(|existing| existing.access_token == item.access_token) {
                return Err(CoreError::ConstraintViolation(format!(
                    "duplicate access token for item {}",
                    item.id
                )));
            }
            items.insert(item.id, item.clone());
            Ok(())
        }

        async fn find(&self, id: ItemId) -> Result<Option<DeliveryItem>> {
            Ok(self.items.read().await.get(&id).cloned())
        }

        async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<DeliveryItem>> {
            let mut items: Vec<DeliveryItem> = self
                .items
                .read()
                .await
                .values()
                .filter(|item| item.owner_id == owner_id)
                .cloned()
                .collect();
            items.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
            Ok(items)
        }

        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryItem>> {
            if let Some(message) = self.list_error.lock().await.take() {
                return Err(CoreError::Database(message));
            }
            let mut due: Vec<DeliveryItem> =
                self.items.read().await.values().filter(|item| item.is_due(now)).cloned().collect();
            due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
            Ok(due)
        }

        async fn try_claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<Option<DeliveryItem>> {
            if let Some(message) = self.claim_error.lock().await.take() {
                return Err(CoreError::Database(message));
            }
            // Check, set and re-read under one write lock: the in-process
            // equivalent of the conditional UPDATE ... RETURNING.
            let mut items = self.items.write().await;
            match items.get_mut(&id) {
                Some(item) if item.status == DeliveryStatus::Pending && item.scheduled_at <= now => {
                    item.status = DeliveryStatus::Processing;
                    item.updated_at = now;
                    Ok(Some(item.clone()))
                },
                _ => Ok(None),
            }
        }

        async fn mark_sent(
            &self,
            id: ItemId,
            sent_at: DateTime<Utc>,
            email_id: Option<String>,
        ) -> Result<()> {
            if let Some(message) = self.mark_error.lock().await.take() {
                return Err(CoreError::Database(message));
            }
            if let Some(item) = self.items.write().await.get_mut(&id) {
                item.status = DeliveryStatus::Sent;
                item.sent_at = Some(sent_at);
                item.email_id = email_id;
                item.updated_at = sent_at;
            }
            Ok(())
        }

        async fn mark_failed(&self, id: ItemId, reason: &str, now: DateTime<Utc>) -> Result<()> {
            if let Some(message) = self.mark_error.lock().await.take() {
                return Err(CoreError::Database(message));
            }
            if let Some(item) = self.items.write().await.get_mut(&id) {
                item.status = DeliveryStatus::Failed;
                item.error_message = Some(reason.to_string());
                item.updated_at = now;
            }
            Ok(())
        }

        async fn update(&self, id: ItemId, patch: &ItemPatch, now: DateTime<Utc>) -> Result<bool> {
            let mut items = self.items.write().await;
            match items.get_mut(&id) {
                Some(item) if item.status == DeliveryStatus::Pending => {
                    if let Some(recipient) = &patch.recipient {
                        item.recipient = recipient.clone();
                    }
                    if let Some(scheduled_at) = patch.scheduled_at {
                        item.scheduled_at = scheduled_at;
                    }
                    if let Some(file_name) = &patch.file_name {
                        item.file_name = file_name.clone();
                    }
                    item.updated_at = now;
                    Ok(true)
                },
                _ => Ok(false),
            }
        }

        async fn remove(&self, id: ItemId) -> Result<()> {
            self.items.write().await.remove(&id);
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }
}
