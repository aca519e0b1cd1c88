use crate::conversation::{find_for_tenant, require_participant};
use crate::error::Error;
use crate::identity::Identity;
use crate::{reactions, Id};
use entity_api::{message as message_api, reaction as reaction_api};
use events::{DomainEvent, EventPublisher};
use log::*;
use sea_orm::DatabaseConnection;

pub const MAX_REACTION_CHARS: usize = 32;

fn validate_reaction_type(reaction_type: &str) -> Result<(), Error> {
    let length = reaction_type.chars().count();
    if length == 0 || length > MAX_REACTION_CHARS {
        return Err(Error::validation(format!(
            "reaction_type must be 1 to {MAX_REACTION_CHARS} characters"
        )));
    }
    if reaction_type.chars().any(char::is_whitespace) {
        return Err(Error::validation("reaction_type must not contain whitespace"));
    }
    Ok(())
}

/// Resolves the conversation of a live message the caller may react to.
async fn reactable(
    db: &DatabaseConnection,
    identity: &Identity,
    message_id: Id,
) -> Result<Id, Error> {
    let message = message_api::find_by_id(db, message_id).await?;
    let conversation = find_for_tenant(db, identity, message.conversation_id).await?;
    require_participant(db, conversation.id, identity.user_id).await?;
    if message.is_deleted() {
        return Err(Error::conflict("cannot react to a deleted message"));
    }
    Ok(conversation.id)
}

/// Adds a reaction. Repeating an existing reaction stores nothing and
/// publishes nothing; the return value tells whether a row was added.
pub async fn add(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    message_id: Id,
    reaction_type: &str,
) -> Result<bool, Error> {
    validate_reaction_type(reaction_type)?;
    let conversation_id = reactable(db, &identity, message_id).await?;

    let added = reaction_api::add(db, message_id, identity.user_id, reaction_type).await?;
    if added {
        event_publisher
            .publish(DomainEvent::ReactionAdded {
                conversation_id,
                message_id,
                user_id: identity.user_id,
                reaction_type: reaction_type.to_owned(),
            })
            .await;
    } else {
        trace!("Reaction {reaction_type} on {message_id} already present");
    }
    Ok(added)
}

/// Removes one of the caller's reactions. Returns whether a row was removed.
pub async fn remove(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    message_id: Id,
    reaction_type: &str,
) -> Result<bool, Error> {
    validate_reaction_type(reaction_type)?;
    let conversation_id = reactable(db, &identity, message_id).await?;

    let removed = reaction_api::remove(db, message_id, identity.user_id, reaction_type).await?;
    if removed {
        event_publisher
            .publish(DomainEvent::ReactionRemoved {
                conversation_id,
                message_id,
                user_id: identity.user_id,
                reaction_type: reaction_type.to_owned(),
            })
            .await;
    }
    Ok(removed)
}

/// Every reaction on a message the caller can see.
pub async fn find_by_message(
    db: &DatabaseConnection,
    identity: Identity,
    message_id: Id,
) -> Result<Vec<reactions::Model>, Error> {
    let message = message_api::find_by_id(db, message_id).await?;
    find_for_tenant(db, &identity, message.conversation_id).await?;
    require_participant(db, message.conversation_id, identity.user_id).await?;
    Ok(reaction_api::find_by_message_id(db, message_id).await?)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn reaction_types_are_short_tokens() {
        assert!(validate_reaction_type("👍").is_ok());
        assert!(validate_reaction_type(":thumbsup:").is_ok());
        assert!(validate_reaction_type(&"a".repeat(MAX_REACTION_CHARS)).is_ok());
        assert!(validate_reaction_type("").is_err());
        assert!(validate_reaction_type("thumbs up").is_err());
        assert!(validate_reaction_type(&"a".repeat(MAX_REACTION_CHARS + 1)).is_err());
    }
}
