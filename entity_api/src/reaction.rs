//! Entity API for the reactions table.
//!
//! The `(message_id, user_id, reaction_type)` unique index makes adding a
//! reaction idempotent: a repeated add inserts nothing.

use super::error::Error;
use entity::reactions::{ActiveModel, Column, Entity, Model};
use entity::Id;
use sea_orm::{
    entity::prelude::*, sea_query::OnConflict, ActiveValue::Set, Condition, ConnectionTrait,
};

use log::*;

/// Adds a reaction. Returns `true` when a row was inserted and `false` when
/// the same user already reacted to the message with the same type.
pub async fn add(
    db: &impl ConnectionTrait,
    message_id: Id,
    user_id: Id,
    reaction_type: &str,
) -> Result<bool, Error> {
    debug!("Adding reaction {reaction_type} by {user_id} to message {message_id}");

    let active_model = ActiveModel {
        id: Set(Id::new_v4()),
        message_id: Set(message_id),
        user_id: Set(user_id),
        reaction_type: Set(reaction_type.to_owned()),
        created_at: Set(chrono::Utc::now().into()),
    };

    let inserted = Entity::insert(active_model)
        .on_conflict(
            OnConflict::columns([Column::MessageId, Column::UserId, Column::ReactionType])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(inserted > 0)
}

/// Removes a reaction. Returns whether a row was deleted.
pub async fn remove(
    db: &impl ConnectionTrait,
    message_id: Id,
    user_id: Id,
    reaction_type: &str,
) -> Result<bool, Error> {
    debug!("Removing reaction {reaction_type} by {user_id} from message {message_id}");

    let result = Entity::delete_many()
        .filter(
            Condition::all()
                .add(Column::MessageId.eq(message_id))
                .add(Column::UserId.eq(user_id))
                .add(Column::ReactionType.eq(reaction_type)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

pub async fn find_by_message_id(
    db: &impl ConnectionTrait,
    message_id: Id,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::MessageId.eq(message_id))
        .all(db)
        .await?)
}

#[cfg(test)]
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn adding_the_same_reaction_twice_inserts_once() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        let message_id = Id::new_v4();
        let user_id = Id::new_v4();

        assert!(add(&db, message_id, user_id, "👍").await?);
        assert!(!add(&db, message_id, user_id, "👍").await?);

        Ok(())
    }

    #[tokio::test]
    async fn remove_reports_missing_reaction() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        assert!(!remove(&db, Id::new_v4(), Id::new_v4(), "👍").await?);

        Ok(())
    }
}
