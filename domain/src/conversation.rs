//! Conversation lifecycle and membership.
//!
//! Every operation is scoped to the caller's tenant: a conversation of
//! another tenant is reported as not found.

use crate::conversation_type::ConversationType;
use crate::error::Error;
use crate::identity::Identity;
use crate::participant_role::ParticipantRole;
use crate::{conversations, participants, Id};
use entity_api::error::EntityApiErrorKind;
use entity_api::{
    conversation as conversation_api, message as message_api, participant as participant_api,
};
use events::{DomainEvent, EventPublisher};
use log::*;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use entity_api::participant::ParticipantFlags;

/// Request to create a group or broadcast conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewConversation {
    pub conversation_type: ConversationType,
    pub name: String,
    pub description: Option<String>,
    /// Initial members besides the creator, who always joins as admin.
    #[serde(default)]
    pub member_ids: Vec<Id>,
}

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: conversations::Model,
    pub participant: participants::Model,
    pub unread_count: u64,
}

/// Loads a conversation of the caller's tenant.
pub(crate) async fn find_for_tenant(
    db: &impl ConnectionTrait,
    identity: &Identity,
    conversation_id: Id,
) -> Result<conversations::Model, Error> {
    let conversation = conversation_api::find_by_id(db, conversation_id).await?;
    if conversation.tenant_id != identity.tenant_id {
        warn!(
            "User {} asked for conversation {conversation_id} of another tenant",
            identity.user_id
        );
        return Err(Error::not_found());
    }
    Ok(conversation)
}

pub(crate) async fn require_participant(
    db: &impl ConnectionTrait,
    conversation_id: Id,
    user_id: Id,
) -> Result<participants::Model, Error> {
    participant_api::find(db, conversation_id, user_id)
        .await?
        .ok_or_else(|| Error::forbidden("not a participant of this conversation"))
}

fn require_admin(participant: &participants::Model) -> Result<(), Error> {
    if participant.role != ParticipantRole::Admin {
        return Err(Error::forbidden("only admins may manage this conversation"));
    }
    Ok(())
}

fn require_managed(conversation: &conversations::Model) -> Result<(), Error> {
    if conversation.conversation_type == ConversationType::Direct {
        return Err(Error::validation(
            "direct conversations have fixed membership and no details",
        ));
    }
    Ok(())
}

fn non_blank(value: &str, field: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_owned())
}

fn draft(
    identity: &Identity,
    conversation_type: ConversationType,
    name: Option<String>,
    description: Option<String>,
    direct_key: Option<String>,
) -> conversations::Model {
    let now = chrono::Utc::now();
    conversations::Model {
        id: Id::nil(),
        tenant_id: identity.tenant_id,
        conversation_type,
        name,
        description,
        direct_key,
        created_by: identity.user_id,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

/// A conversation the caller participates in.
pub async fn find_by_id(
    db: &DatabaseConnection,
    identity: Identity,
    conversation_id: Id,
) -> Result<conversations::Model, Error> {
    let conversation = find_for_tenant(db, &identity, conversation_id).await?;
    require_participant(db, conversation_id, identity.user_id).await?;
    Ok(conversation)
}

/// Returns the direct conversation between the caller and `other_user_id`,
/// creating it when the pair has none yet.
pub async fn create_direct(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    other_user_id: Id,
) -> Result<conversations::Model, Error> {
    if other_user_id == identity.user_id {
        return Err(Error::validation(
            "a direct conversation needs two different users",
        ));
    }

    let key = conversation_api::direct_key(identity.user_id, other_user_id);
    if let Some(existing) = conversation_api::find_direct(db, identity.tenant_id, &key).await? {
        debug!("Direct conversation {} already exists", existing.id);
        return Ok(existing);
    }

    let created = conversation_api::create_with_participants(
        db,
        draft(&identity, ConversationType::Direct, None, None, Some(key.clone())),
        vec![
            (identity.user_id, ParticipantRole::Member),
            (other_user_id, ParticipantRole::Member),
        ],
    )
    .await;

    let (conversation, is_new) = resolve_direct(db, &identity, &key, created).await?;
    if is_new {
        publish_created(event_publisher, &conversation).await?;
    }
    Ok(conversation)
}

/// Settles the insert of a direct pair. When a concurrent request created
/// the same pair first, its conversation is returned with `false`.
async fn resolve_direct(
    db: &impl ConnectionTrait,
    identity: &Identity,
    key: &str,
    created: Result<(conversations::Model, Vec<participants::Model>), entity_api::error::Error>,
) -> Result<(conversations::Model, bool), Error> {
    match created {
        Ok((conversation, _)) => Ok((conversation, true)),
        Err(e) if e.error_kind == EntityApiErrorKind::RecordConflict => {
            debug!("Lost the race creating direct conversation {key}, re-reading");
            let existing = conversation_api::find_direct(db, identity.tenant_id, key)
                .await?
                .ok_or_else(Error::not_found)?;
            Ok((existing, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates a group or broadcast conversation with the caller as its admin.
pub async fn create_group(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    new_conversation: NewConversation,
) -> Result<conversations::Model, Error> {
    if new_conversation.conversation_type == ConversationType::Direct {
        return Err(Error::validation(
            "use create_direct for direct conversations",
        ));
    }
    let name = non_blank(&new_conversation.name, "name")?;

    let members: BTreeSet<Id> = new_conversation
        .member_ids
        .into_iter()
        .filter(|id| *id != identity.user_id)
        .collect();
    let mut participants = vec![(identity.user_id, ParticipantRole::Admin)];
    participants.extend(members.into_iter().map(|id| (id, ParticipantRole::Member)));

    let (conversation, _) = conversation_api::create_with_participants(
        db,
        draft(
            &identity,
            new_conversation.conversation_type,
            Some(name),
            new_conversation.description,
            None,
        ),
        participants,
    )
    .await?;

    info!(
        "Created {} conversation {} in tenant {}",
        conversation.conversation_type, conversation.id, conversation.tenant_id
    );
    publish_created(event_publisher, &conversation).await?;
    Ok(conversation)
}

async fn publish_created(
    event_publisher: &EventPublisher,
    conversation: &conversations::Model,
) -> Result<(), Error> {
    event_publisher
        .publish(DomainEvent::ConversationCreated {
            conversation_id: conversation.id,
            conversation: serde_json::to_value(conversation)?,
        })
        .await;
    Ok(())
}

pub async fn update_details(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    conversation_id: Id,
    name: Option<String>,
    description: Option<String>,
) -> Result<conversations::Model, Error> {
    let conversation = find_for_tenant(db, &identity, conversation_id).await?;
    require_managed(&conversation)?;
    require_admin(&require_participant(db, conversation_id, identity.user_id).await?)?;
    let name = name.map(|name| non_blank(&name, "name")).transpose()?;

    let updated = conversation_api::update_details(db, conversation_id, name, description).await?;

    event_publisher
        .publish(DomainEvent::ConversationUpdated {
            conversation_id,
            conversation: serde_json::to_value(&updated)?,
        })
        .await;
    Ok(updated)
}

pub async fn add_participant(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    conversation_id: Id,
    user_id: Id,
    role: ParticipantRole,
) -> Result<participants::Model, Error> {
    let conversation = find_for_tenant(db, &identity, conversation_id).await?;
    require_managed(&conversation)?;
    require_admin(&require_participant(db, conversation_id, identity.user_id).await?)?;

    let participant = participant_api::create(db, conversation_id, user_id, role).await?;
    info!("User {user_id} joined conversation {conversation_id} as {role}");

    event_publisher
        .publish(DomainEvent::ParticipantJoined {
            conversation_id,
            user_id,
            role: role.to_string(),
        })
        .await;
    Ok(participant)
}

/// Removes `user_id`. Admins may remove anyone; members only themselves.
pub async fn remove_participant(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    conversation_id: Id,
    user_id: Id,
) -> Result<(), Error> {
    let conversation = find_for_tenant(db, &identity, conversation_id).await?;
    require_managed(&conversation)?;
    let actor = require_participant(db, conversation_id, identity.user_id).await?;
    if user_id != identity.user_id {
        require_admin(&actor)?;
    }

    if !participant_api::delete(db, conversation_id, user_id).await? {
        return Err(Error::not_found());
    }
    info!("User {user_id} left conversation {conversation_id}");

    event_publisher
        .publish(DomainEvent::ParticipantLeft {
            conversation_id,
            user_id,
        })
        .await;
    Ok(())
}

/// Updates the caller's own flags. Nobody else is notified.
pub async fn update_flags(
    db: &DatabaseConnection,
    identity: Identity,
    conversation_id: Id,
    flags: ParticipantFlags,
) -> Result<participants::Model, Error> {
    find_for_tenant(db, &identity, conversation_id).await?;
    require_participant(db, conversation_id, identity.user_id).await?;
    Ok(participant_api::update_flags(db, conversation_id, identity.user_id, flags).await?)
}

/// The caller's conversations, most recently active first, with unread counts.
pub async fn list_for_user(
    db: &DatabaseConnection,
    identity: Identity,
) -> Result<Vec<ConversationSummary>, Error> {
    let rows = conversation_api::find_by_user(db, identity.tenant_id, identity.user_id).await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for (conversation, participant) in rows {
        let unread_count = message_api::count_unread(
            db,
            conversation.id,
            identity.user_id,
            participant.last_read_at,
        )
        .await?;
        summaries.push(ConversationSummary {
            conversation,
            participant,
            unread_count,
        });
    }
    Ok(summaries)
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, EntityErrorKind, InternalErrorKind};
    use crate::test_support::{conversation, participant, RecordingHandler};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    #[tokio::test]
    async fn create_direct_returns_the_existing_pair_without_publishing() -> Result<(), Error> {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let existing = conversation(identity.tenant_id, ConversationType::Direct);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![existing.clone()]])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        let found = create_direct(&db, &publisher, identity, Id::new_v4()).await?;

        assert_eq!(found.id, existing.id);
        assert!(recorder.events().is_empty());
        Ok(())
    }

    fn unique_violation() -> entity_api::error::Error {
        entity_api::error::Error {
            source: None,
            error_kind: EntityApiErrorKind::RecordConflict,
        }
    }

    #[tokio::test]
    async fn losing_the_direct_creation_race_returns_the_winner() -> Result<(), Error> {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let winner = conversation(identity.tenant_id, ConversationType::Direct);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![winner.clone()]])
            .into_connection();

        let (found, is_new) =
            resolve_direct(&db, &identity, "a:b", Err(unique_violation())).await?;

        assert_eq!(found.id, winner.id);
        assert!(!is_new);
        Ok(())
    }

    #[tokio::test]
    async fn direct_creation_conflict_without_a_winner_is_not_found() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<conversations::Model>::new()])
            .into_connection();

        let err = resolve_direct(&db, &identity, "a:b", Err(unique_violation()))
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
        );
    }

    #[tokio::test]
    async fn freshly_created_direct_pair_is_new() -> Result<(), Error> {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let created = conversation(identity.tenant_id, ConversationType::Direct);
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let (found, is_new) =
            resolve_direct(&db, &identity, "a:b", Ok((created.clone(), Vec::new()))).await?;

        assert_eq!(found.id, created.id);
        assert!(is_new);
        Ok(())
    }

    #[tokio::test]
    async fn create_direct_rejects_a_self_conversation() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = create_direct(&db, &EventPublisher::default(), identity, identity.user_id)
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_group_requires_a_name() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = create_group(
            &db,
            &EventPublisher::default(),
            identity,
            NewConversation {
                conversation_type: ConversationType::Group,
                name: "  ".to_owned(),
                description: None,
                member_ids: vec![Id::new_v4()],
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Validation(_))
        ));
    }

    #[tokio::test]
    async fn conversations_of_other_tenants_are_not_found() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let foreign = conversation(Id::new_v4(), ConversationType::Group);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![foreign.clone()]])
            .into_connection();

        let err = find_by_id(&db, identity, foreign.id).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
        );
    }

    #[tokio::test]
    async fn members_cannot_add_participants() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let group = conversation(identity.tenant_id, ConversationType::Group);
        let member = participant(group.id, identity.user_id, ParticipantRole::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group.clone()]])
            .append_query_results(vec![vec![member]])
            .into_connection();

        let err = add_participant(
            &db,
            &EventPublisher::default(),
            identity,
            group.id,
            Id::new_v4(),
            ParticipantRole::Member,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn direct_conversations_have_fixed_membership() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let direct = conversation(identity.tenant_id, ConversationType::Direct);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![direct.clone()]])
            .into_connection();

        let err = remove_participant(
            &db,
            &EventPublisher::default(),
            identity,
            direct.id,
            identity.user_id,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Validation(_))
        ));
    }

    #[tokio::test]
    async fn member_leaving_publishes_participant_left() -> Result<(), Error> {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let group = conversation(identity.tenant_id, ConversationType::Group);
        let member = participant(group.id, identity.user_id, ParticipantRole::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group.clone()]])
            .append_query_results(vec![vec![member]])
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        remove_participant(&db, &publisher, identity, group.id, identity.user_id).await?;

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DomainEvent::ParticipantLeft { user_id, .. } if user_id == identity.user_id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn admin_removes_another_member() -> Result<(), Error> {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let group = conversation(identity.tenant_id, ConversationType::Group);
        let admin = participant(group.id, identity.user_id, ParticipantRole::Admin);
        let removed = Id::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group.clone()]])
            .append_query_results(vec![vec![admin]])
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        remove_participant(&db, &publisher, identity, group.id, removed).await?;

        assert!(matches!(
            recorder.events()[0],
            DomainEvent::ParticipantLeft { user_id, .. } if user_id == removed
        ));
        Ok(())
    }

    #[tokio::test]
    async fn members_cannot_remove_someone_else() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let group = conversation(identity.tenant_id, ConversationType::Group);
        let member = participant(group.id, identity.user_id, ParticipantRole::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group.clone()]])
            .append_query_results(vec![vec![member]])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        let err = remove_participant(&db, &publisher, identity, group.id, Id::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Forbidden(_))
        ));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn removing_a_non_participant_is_not_found() {
        let identity = Identity::new(Id::new_v4(), Id::new_v4());
        let group = conversation(identity.tenant_id, ConversationType::Group);
        let admin = participant(group.id, identity.user_id, ParticipantRole::Admin);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![group.clone()]])
            .append_query_results(vec![vec![admin]])
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        let err = remove_participant(&db, &publisher, identity, group.id, Id::new_v4())
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
        );
        assert!(recorder.events().is_empty());
    }
}
