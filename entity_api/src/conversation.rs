use super::error::{EntityApiErrorKind, Error};
use entity::conversation_type::ConversationType;
use entity::conversations::{ActiveModel, Column, Entity, Model};
use entity::participant_role::ParticipantRole;
use entity::{participants, Id};
use sea_orm::{
    entity::prelude::*, ActiveValue::Set, ConnectionTrait, DatabaseConnection, QueryOrder, TransactionTrait,
};

use log::*;

/// Canonical key of an unordered user pair, identical for `(a, b)` and `(b, a)`.
pub fn direct_key(a: Id, b: Id) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

/// Inserts a conversation together with its initial participants in one transaction.
pub async fn create_with_participants(
    db: &DatabaseConnection,
    conversation_model: Model,
    members: Vec<(Id, ParticipantRole)>,
) -> Result<(Model, Vec<participants::Model>), Error> {
    debug!(
        "New {} conversation to be inserted with {} participant(s)",
        conversation_model.conversation_type,
        members.len()
    );

    let now = chrono::Utc::now();
    let txn = db.begin().await?;

    let conversation = ActiveModel {
        id: Set(Id::new_v4()),
        tenant_id: Set(conversation_model.tenant_id),
        conversation_type: Set(conversation_model.conversation_type),
        name: Set(conversation_model.name),
        description: Set(conversation_model.description),
        direct_key: Set(conversation_model.direct_key),
        created_by: Set(conversation_model.created_by),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut created = Vec::with_capacity(members.len());
    for (user_id, role) in members {
        let participant = participants::ActiveModel {
            id: Set(Id::new_v4()),
            conversation_id: Set(conversation.id),
            user_id: Set(user_id),
            role: Set(role),
            joined_at: Set(now.into()),
            last_read_at: Set(None),
            is_muted: Set(false),
            is_pinned: Set(false),
            is_archived: Set(false),
        }
        .insert(&txn)
        .await?;
        created.push(participant);
    }

    txn.commit().await?;

    Ok((conversation, created))
}

pub async fn find_by_id(db: &impl ConnectionTrait, id: Id) -> Result<Model, Error> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::kind(EntityApiErrorKind::RecordNotFound))
}

/// Looks up the direct conversation of a user pair within a tenant.
pub async fn find_direct(
    db: &impl ConnectionTrait,
    tenant_id: Id,
    direct_key: &str,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::ConversationType.eq(ConversationType::Direct))
        .filter(Column::DirectKey.eq(direct_key))
        .one(db)
        .await?)
}

/// Returns every conversation of the tenant that `user_id` participates in,
/// paired with that user's participant record.
pub async fn find_by_user(
    db: &impl ConnectionTrait,
    tenant_id: Id,
    user_id: Id,
) -> Result<Vec<(Model, participants::Model)>, Error> {
    let rows = participants::Entity::find()
        .filter(participants::Column::UserId.eq(user_id))
        .find_also_related(Entity)
        .filter(Column::TenantId.eq(tenant_id))
        .order_by_desc(Column::UpdatedAt)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(participant, conversation)| conversation.map(|c| (c, participant)))
        .collect())
}

pub async fn update_details(
    db: &impl ConnectionTrait,
    id: Id,
    name: Option<String>,
    description: Option<String>,
) -> Result<Model, Error> {
    let existing = find_by_id(db, id).await?;
    debug!("Existing conversation to be updated: {:?}", existing.id);

    let mut active_model: ActiveModel = existing.into();
    if let Some(name) = name {
        active_model.name = Set(Some(name));
    }
    if let Some(description) = description {
        active_model.description = Set(Some(description));
    }
    active_model.updated_at = Set(chrono::Utc::now().into());

    Ok(active_model.update(db).await?)
}

/// Bumps `updated_at` so conversation lists can sort by recent activity.
pub async fn touch(db: &impl ConnectionTrait, id: Id) -> Result<(), Error> {
    Entity::update_many()
        .set(ActiveModel {
            updated_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        })
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}
