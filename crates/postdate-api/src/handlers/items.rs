//! Owner-facing CRUD over scheduled deliveries.
//!
//! Items are editable only while pending; once the sweep machinery has
//! claimed one, edits are refused with a conflict. Deletion is always
//! allowed and idempotent.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use postdate_core::{DeliveryItem, ItemId, ItemPatch, OwnerId};
use serde::Deserialize;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::error_response;
use crate::AppState;

/// Request body for scheduling a new delivery.
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    /// Owner scheduling the delivery.
    pub owner_id: Uuid,
    /// Display name of the file.
    pub file_name: String,
    /// Opaque reference to the stored file contents.
    pub storage_key: String,
    /// Recipient email address.
    pub recipient: String,
    /// When the delivery becomes due.
    pub scheduled_at: DateTime<Utc>,
}

/// Query parameters for listing items.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Owner whose items to list.
    pub owner_id: Uuid,
}

/// Schedules a new delivery.
///
/// # Errors
///
/// - 422: recipient or file name fails validation
/// - 500: store errors
#[instrument(name = "create_item", skip(state, request))]
pub async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<CreateItemRequest>,
) -> Response {
    if let Err(message) = validate_request(&request) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", message);
    }

    let now = state.clock.now_utc();
    let item = DeliveryItem::new(
        OwnerId(request.owner_id),
        request.file_name,
        request.storage_key,
        request.recipient,
        request.scheduled_at,
        now,
    );

    match state.store.insert(&item).await {
        Ok(()) => {
            debug!(item_id = %item.id, scheduled_at = %item.scheduled_at, "Item scheduled");
            (StatusCode::CREATED, Json(item)).into_response()
        },
        Err(e) => {
            error!(error = %e, "Failed to persist item");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        },
    }
}

/// Lists an owner's items, newest schedule first.
#[instrument(name = "list_items", skip(state))]
pub async fn list_items(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    match state.store.list_for_owner(OwnerId(query.owner_id)).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list items");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        },
    }
}

/// Fetches one item by ID.
#[instrument(name = "get_item", skip(state))]
pub async fn get_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.find(ItemId(id)).await {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", format!("no item {id}")),
        Err(e) => {
            error!(error = %e, "Failed to fetch item");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        },
    }
}

/// Edits a still-pending item.
///
/// # Errors
///
/// - 404: item does not exist
/// - 409: item is no longer pending
/// - 422: the patch is empty or the patched recipient fails validation
#[instrument(name = "patch_item", skip(state, patch))]
pub async fn patch_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ItemPatch>,
) -> Response {
    if patch.is_empty() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_input",
            "patch contains no fields to change",
        );
    }
    if let Some(recipient) = &patch.recipient {
        if !recipient.contains('@') {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_input",
                format!("recipient address is not deliverable: {recipient}"),
            );
        }
    }

    let id = ItemId(id);
    match state.store.update(id, &patch, state.clock.now_utc()).await {
        Ok(true) => match state.store.find(id).await {
            Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
            Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", format!("no item {id}")),
            Err(e) => {
                error!(error = %e, "Failed to fetch item after update");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            },
        },
        // The guarded update did not apply: either the item is gone or it
        // has left the pending state.
        Ok(false) => match state.store.find(id).await {
            Ok(Some(item)) => error_response(
                StatusCode::CONFLICT,
                "conflict",
                format!("item {id} is {} and can no longer be edited", item.status),
            ),
            Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", format!("no item {id}")),
            Err(e) => {
                error!(error = %e, "Failed to inspect item after refused update");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            },
        },
        Err(e) => {
            error!(error = %e, "Failed to update item");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        },
    }
}

/// Deletes an item. Idempotent.
#[instrument(name = "delete_item", skip(state))]
pub async fn delete_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.remove(ItemId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to delete item");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        },
    }
}

fn validate_request(request: &CreateItemRequest) -> Result<(), String> {
    if request.file_name.trim().is_empty() {
        return Err("file_name must not be empty".to_string());
    }
    if request.storage_key.trim().is_empty() {
        return Err("storage_key must not be empty".to_string());
    }
    let recipient = request.recipient.trim();
    if recipient.is_empty() || !recipient.contains('@') {
        return Err(format!("recipient address is not deliverable: {recipient}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateItemRequest {
        CreateItemRequest {
            owner_id: Uuid::new_v4(),
            file_name: "notes.txt".to_string(),
            storage_key: "files/notes.txt".to_string(),
            recipient: "dest@example.com".to_string(),
            scheduled_at: Utc::now(),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_request(&request()).is_ok());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut bad = request();
        bad.file_name = "  ".to_string();
        assert!(validate_request(&bad).is_err());

        let mut bad = request();
        bad.storage_key = String::new();
        assert!(validate_request(&bad).is_err());

        let mut bad = request();
        bad.recipient = "not-an-address".to_string();
        assert!(validate_request(&bad).is_err());
    }
}
