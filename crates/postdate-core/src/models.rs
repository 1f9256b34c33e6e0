//! Delivery item model and strongly-typed identifiers.
//!
//! Defines the unit of scheduled work, its status state machine, and the
//! newtype ID wrappers used across the service. Includes database
//! serialization traits so items round-trip through Postgres unchanged.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed delivery item identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. The ID follows an
/// item through its entire lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Creates a new random item ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ItemId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ItemId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for ItemId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed owner identifier.
///
/// Identifies the user who scheduled a delivery. Ownership checks are the
/// caller's responsibility; the scheduler itself never interprets this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    /// Creates a new random owner ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OwnerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for OwnerId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for OwnerId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for OwnerId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Unguessable token embedded in the recipient-facing access URL.
///
/// Generated once when the item is created and immutable afterwards.
/// 32 random bytes rendered as lowercase hex, so the token carries 256 bits
/// of entropy and needs no further escaping in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(64);
        for byte in bytes {
            use fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Token as its hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl sqlx::Type<PgDb> for AccessToken {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for AccessToken {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(s.to_string()))
    }
}

impl sqlx::Encode<'_, PgDb> for AccessToken {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.0.as_str(), buf)
    }
}

/// Delivery item lifecycle status.
///
/// Transitions are strictly controlled:
///
/// ```text
/// pending -> processing -> sent    (notifier accepted)
///                       -> failed  (notifier rejected / validation error)
/// ```
///
/// `sent` and `failed` are terminal; the scheduler never revisits them.
/// `processing` is the claim state that makes concurrent sweeps safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for its scheduled time; the only state a sweep may claim.
    Pending,

    /// Claimed by a worker; blocks other sweeps from double-sending.
    Processing,

    /// Notifier accepted the message. Terminal.
    Sent,

    /// Delivery could not be completed. Terminal; the owner must schedule a
    /// new item to retry.
    Failed,
}

impl DeliveryStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid delivery status: {s}")),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A scheduled file delivery: the unit of work the sweep processes.
///
/// Created by the owner's scheduling action in `pending` state. Mutated only
/// by the sweep machinery (status, timestamps, error, email id) or by the
/// owner editing recipient/schedule while still pending.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryItem {
    /// Unique identifier.
    pub id: ItemId,

    /// User who scheduled this delivery.
    pub owner_id: OwnerId,

    /// Display name of the file, used in the email subject and body.
    pub file_name: String,

    /// Opaque handle to the stored bytes. Never interpreted here.
    pub storage_key: String,

    /// Recipient email address.
    pub recipient: String,

    /// Earliest instant at which delivery may occur (UTC).
    pub scheduled_at: DateTime<Utc>,

    /// Token embedded in the recipient-facing access URL. Immutable.
    pub access_token: AccessToken,

    /// Current lifecycle status.
    pub status: DeliveryStatus,

    /// Human-readable failure reason. Set only when status is `failed`.
    pub error_message: Option<String>,

    /// When the notifier accepted the message. Present iff status is `sent`.
    pub sent_at: Option<DateTime<Utc>>,

    /// Provider-assigned message identifier, when the notifier reports one.
    pub email_id: Option<String>,

    /// When the item was created.
    pub created_at: DateTime<Utc>,

    /// When the item was last modified.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryItem {
    /// Creates a pending item with a freshly generated access token.
    pub fn new(
        owner_id: OwnerId,
        file_name: String,
        storage_key: String,
        recipient: String,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            owner_id,
            file_name,
            storage_key,
            recipient,
            scheduled_at,
            access_token: AccessToken::generate(),
            status: DeliveryStatus::Pending,
            error_message: None,
            sent_at: None,
            email_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this item is due at `now`: pending and scheduled at or before
    /// the given instant. The boundary is inclusive.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending && self.scheduled_at <= now
    }
}

/// Owner-initiated edit of a still-pending item.
///
/// Absent fields are left unchanged. The access token is deliberately not
/// editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    /// New recipient address.
    pub recipient: Option<String>,

    /// New delivery time.
    pub scheduled_at: Option<DateTime<Utc>>,

    /// New display name.
    pub file_name: Option<String>,
}

impl ItemPatch {
    /// True when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.recipient.is_none() && self.scheduled_at.is_none() && self.file_name.is_none()
    }
}
