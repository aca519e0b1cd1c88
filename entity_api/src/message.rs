//! Entity API for the messages table.
//!
//! Status, edit and deletion writes are all conditional on the row's current
//! state. A write that matches no row is reported to the caller (as `false`
//! or `RecordNotUpdated`) instead of being applied blindly.

use super::error::{EntityApiErrorKind, Error};
use chrono::{DateTime, Duration, Utc};
use entity::deletion_reason::DeletionReason;
use entity::message_status::MessageStatus;
use entity::messages::{ActiveModel, Column, Entity, Model};
use entity::{Id, TOMBSTONE};
use sea_orm::{
    entity::prelude::*, ActiveValue::Set, ConnectionTrait, PaginatorTrait, QueryOrder,
    QuerySelect, TryIntoModel,
};

use log::*;

/// Computes the fixed end of an ephemeral message's visibility window.
pub fn ephemeral_expiry(
    created_at: DateTime<Utc>,
    ephemeral_seconds: Option<i32>,
) -> Option<DateTime<Utc>> {
    ephemeral_seconds.map(|seconds| created_at + Duration::seconds(i64::from(seconds)))
}

/// Caller-supplied fields of a new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub conversation_id: Id,
    pub sender_id: Id,
    pub content: String,
    pub reply_to_id: Option<Id>,
    pub ephemeral_seconds: Option<i32>,
}

/// Persists a new message with status `sent`.
///
/// Every server-managed field is initialised here so the expiry is pinned to
/// the creation time.
pub async fn create(db: &impl ConnectionTrait, draft: MessageDraft) -> Result<Model, Error> {
    debug!(
        "New message to be inserted into conversation {}",
        draft.conversation_id
    );

    let now = Utc::now();
    let expires_at = ephemeral_expiry(now, draft.ephemeral_seconds);

    let active_model = ActiveModel {
        id: Set(Id::new_v4()),
        conversation_id: Set(draft.conversation_id),
        sender_id: Set(draft.sender_id),
        content: Set(draft.content),
        status: Set(MessageStatus::Sent),
        reply_to_id: Set(draft.reply_to_id),
        is_edited: Set(false),
        edited_at: Set(None),
        delivered_at: Set(None),
        read_at: Set(None),
        ephemeral_seconds: Set(draft.ephemeral_seconds),
        ephemeral_expires_at: Set(expires_at.map(Into::into)),
        deleted_at: Set(None),
        deletion_reason: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?.try_into_model()?)
}

pub async fn find_by_id(db: &impl ConnectionTrait, id: Id) -> Result<Model, Error> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::kind(EntityApiErrorKind::RecordNotFound))
}

/// Replaces the content of a live message written by `sender_id`.
///
/// Status and the ephemeral expiry are left untouched.
pub async fn update_content(
    db: &impl ConnectionTrait,
    id: Id,
    sender_id: Id,
    content: String,
) -> Result<Model, Error> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    let result = Entity::update_many()
        .set(ActiveModel {
            content: Set(content),
            is_edited: Set(true),
            edited_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::SenderId.eq(sender_id))
        .filter(Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        debug!("Message {id} not updated: missing, deleted or not owned by {sender_id}");
        return Err(Error::kind(EntityApiErrorKind::RecordNotUpdated));
    }

    find_by_id(db, id).await
}

/// Tombstones a message on behalf of its sender. Returns whether the row changed.
pub async fn soft_delete(db: &impl ConnectionTrait, id: Id, sender_id: Id) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    let result = Entity::update_many()
        .set(tombstone(DeletionReason::Sender, now))
        .filter(Column::Id.eq(id))
        .filter(Column::SenderId.eq(sender_id))
        .filter(Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Hides an ephemeral message whose window has elapsed. Returns whether the row changed.
pub async fn hide_expired(
    db: &impl ConnectionTrait,
    id: Id,
    now: DateTime<Utc>,
) -> Result<bool, Error> {
    let now: DateTimeWithTimeZone = now.into();

    let result = Entity::update_many()
        .set(tombstone(DeletionReason::Expired, now))
        .filter(Column::Id.eq(id))
        .filter(Column::DeletedAt.is_null())
        .filter(Column::EphemeralExpiresAt.lte(now))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

fn tombstone(reason: DeletionReason, now: DateTimeWithTimeZone) -> ActiveModel {
    ActiveModel {
        content: Set(TOMBSTONE.to_owned()),
        deleted_at: Set(Some(now)),
        deletion_reason: Set(Some(reason)),
        updated_at: Set(now),
        ..Default::default()
    }
}

/// Loads up to `limit` live messages whose ephemeral window ended at or before `now`.
pub async fn find_expired(
    db: &impl ConnectionTrait,
    now: DateTime<Utc>,
    limit: u64,
) -> Result<Vec<Model>, Error> {
    let now: DateTimeWithTimeZone = now.into();

    Ok(Entity::find()
        .filter(Column::DeletedAt.is_null())
        .filter(Column::EphemeralExpiresAt.lte(now))
        .order_by_asc(Column::EphemeralExpiresAt)
        .limit(limit)
        .all(db)
        .await?)
}

/// Moves a message from `sent` to `delivered` on behalf of a recipient.
///
/// Matches only live messages still in `sent` that were not written by
/// `recipient_id`; a late acknowledgement for a `delivered` or `read`
/// message therefore changes nothing. Returns whether the row changed.
pub async fn mark_delivered(
    db: &impl ConnectionTrait,
    id: Id,
    recipient_id: Id,
    now: DateTime<Utc>,
) -> Result<bool, Error> {
    let result = Entity::update_many()
        .set(ActiveModel {
            status: Set(MessageStatus::Delivered),
            delivered_at: Set(Some(now.into())),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(MessageStatus::Sent))
        .filter(Column::DeletedAt.is_null())
        .filter(Column::SenderId.ne(recipient_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Marks every live message of the conversation written by someone other
/// than `reader_id` and created at or before `watermark` as `read`.
///
/// Runs as one conditional `UPDATE .. RETURNING`; only rows currently in
/// `sent` or `delivered` match, so nothing ever regresses. Returns the
/// transitioned messages in creation order.
pub async fn mark_read_through(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    reader_id: Id,
    watermark: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<Model>, Error> {
    let watermark: DateTimeWithTimeZone = watermark.into();

    let mut transitioned = Entity::update_many()
        .set(ActiveModel {
            status: Set(MessageStatus::Read),
            read_at: Set(Some(now.into())),
            ..Default::default()
        })
        .filter(Column::ConversationId.eq(conversation_id))
        .filter(Column::SenderId.ne(reader_id))
        .filter(Column::CreatedAt.lte(watermark))
        .filter(Column::DeletedAt.is_null())
        .filter(Column::Status.is_in([MessageStatus::Sent, MessageStatus::Delivered]))
        .exec_with_returning(db)
        .await?;

    transitioned.sort_by_key(|m| m.created_at);

    debug!(
        "Marked {} message(s) read in conversation {conversation_id} for {reader_id}",
        transitioned.len()
    );

    Ok(transitioned)
}

/// Counts live messages from other users newer than `since` (all of them when `None`).
pub async fn count_unread(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
    since: Option<DateTimeWithTimeZone>,
) -> Result<u64, Error> {
    let mut query = Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .filter(Column::SenderId.ne(user_id))
        .filter(Column::DeletedAt.is_null());

    if let Some(since) = since {
        query = query.filter(Column::CreatedAt.gt(since));
    }

    Ok(query.count(db).await?)
}
