//! Entity API for the participants table.
//!
//! Participant rows are the authoritative membership data used to resolve
//! broadcast recipients and to compute unread counts.

use super::error::{EntityApiErrorKind, Error};
use entity::participant_role::ParticipantRole;
use entity::participants::{ActiveModel, Column, Entity, Model};
use entity::Id;
use sea_orm::{entity::prelude::*, ActiveValue::Set, Condition, ConnectionTrait, TryIntoModel};
use std::collections::BTreeSet;

use log::*;

/// Adds `user_id` to a conversation.
///
/// # Errors
///
/// Returns `RecordConflict` if the user already participates in the conversation.
pub async fn create(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
    role: ParticipantRole,
) -> Result<Model, Error> {
    debug!("Adding participant: conversation_id={conversation_id}, user_id={user_id}, role={role}");

    let active_model = ActiveModel {
        id: Set(Id::new_v4()),
        conversation_id: Set(conversation_id),
        user_id: Set(user_id),
        role: Set(role),
        joined_at: Set(chrono::Utc::now().into()),
        last_read_at: Set(None),
        is_muted: Set(false),
        is_pinned: Set(false),
        is_archived: Set(false),
    };

    Ok(active_model.insert(db).await?.try_into_model()?)
}

/// Removes a participant. Returns whether a row was actually deleted.
pub async fn delete(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
) -> Result<bool, Error> {
    debug!("Removing participant: conversation_id={conversation_id}, user_id={user_id}");

    let result = Entity::delete_many()
        .filter(
            Condition::all()
                .add(Column::ConversationId.eq(conversation_id))
                .add(Column::UserId.eq(user_id)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

pub async fn find(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .filter(Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

pub async fn find_by_conversation_id(
    db: &impl ConnectionTrait,
    conversation_id: Id,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ConversationId.eq(conversation_id))
        .all(db)
        .await?)
}

/// Returns just the user IDs participating in a conversation.
pub async fn find_user_ids_by_conversation_id(
    db: &impl ConnectionTrait,
    conversation_id: Id,
) -> Result<Vec<Id>, Error> {
    let participants = find_by_conversation_id(db, conversation_id).await?;
    Ok(participants.into_iter().map(|p| p.user_id).collect())
}

/// Returns every user who shares at least one conversation with `user_id`,
/// excluding `user_id` itself. Used to scope presence fan-out.
pub async fn find_contact_ids(db: &impl ConnectionTrait, user_id: Id) -> Result<Vec<Id>, Error> {
    let conversation_ids: Vec<Id> = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.conversation_id)
        .collect();

    if conversation_ids.is_empty() {
        return Ok(Vec::new());
    }

    let contacts = Entity::find()
        .filter(Column::ConversationId.is_in(conversation_ids))
        .filter(Column::UserId.ne(user_id))
        .all(db)
        .await?;

    Ok(contacts
        .into_iter()
        .map(|p| p.user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

/// Moves a participant's read watermark forward to `watermark`.
///
/// The update only matches when the stored watermark is absent or earlier,
/// so concurrent calls can never move it backwards. Returns whether the
/// watermark advanced.
pub async fn advance_last_read(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
    watermark: DateTimeWithTimeZone,
) -> Result<bool, Error> {
    let result = Entity::update_many()
        .set(ActiveModel {
            last_read_at: Set(Some(watermark)),
            ..Default::default()
        })
        .filter(Column::ConversationId.eq(conversation_id))
        .filter(Column::UserId.eq(user_id))
        .filter(
            Condition::any()
                .add(Column::LastReadAt.is_null())
                .add(Column::LastReadAt.lt(watermark)),
        )
        .exec(db)
        .await?;

    trace!(
        "Advanced last_read_at for user {user_id} in conversation {conversation_id}: {} row(s)",
        result.rows_affected
    );

    Ok(result.rows_affected > 0)
}

/// Per-user conversation flags. `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantFlags {
    pub muted: Option<bool>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
}

pub async fn update_flags(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
    flags: ParticipantFlags,
) -> Result<Model, Error> {
    let existing = find(db, conversation_id, user_id)
        .await?
        .ok_or_else(|| Error::kind(EntityApiErrorKind::RecordNotFound))?;

    let mut active_model: ActiveModel = existing.into();
    if let Some(muted) = flags.muted {
        active_model.is_muted = Set(muted);
    }
    if let Some(pinned) = flags.pinned {
        active_model.is_pinned = Set(pinned);
    }
    if let Some(archived) = flags.archived {
        active_model.is_archived = Set(archived);
    }

    Ok(active_model.update(db).await?)
}
