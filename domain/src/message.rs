//! Message write paths.
//!
//! Each operation checks the caller against the delivery state machine in
//! [`crate::delivery`] and then issues the matching conditional update, so a
//! request that loses a race against a concurrent write changes nothing.

use crate::conversation::{find_for_tenant, require_participant};
use crate::conversation_type::ConversationType;
use crate::delivery::{self, Transition};
use crate::error::Error;
use crate::identity::Identity;
use crate::participant_role::ParticipantRole;
use crate::{conversations, messages, Id};
use chrono::{DateTime, Utc};
use entity_api::{
    conversation as conversation_api, message as message_api, participant as participant_api,
};
use events::{DeletionReason, DomainEvent, EventPublisher};
use log::*;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Allowed lifetime of an ephemeral message, one second up to seven days.
pub const EPHEMERAL_SECONDS: RangeInclusive<i32> = 1..=604_800;

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub conversation_id: Id,
    pub content: String,
    pub reply_to_id: Option<Id>,
    pub ephemeral_seconds: Option<i32>,
}

/// Outcome of marking a conversation read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadReceipt {
    /// Messages that moved to `read` in this call, oldest first.
    pub message_ids: Vec<Id>,
    pub last_read_at: DateTime<Utc>,
}

fn validate_content(content: &str) -> Result<(), Error> {
    if content.trim().is_empty() {
        return Err(Error::validation("content must not be blank"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(Error::validation(format!(
            "content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_ephemeral(ephemeral_seconds: Option<i32>) -> Result<(), Error> {
    match ephemeral_seconds {
        Some(seconds) if !EPHEMERAL_SECONDS.contains(&seconds) => Err(Error::validation(format!(
            "ephemeral_seconds must be between {} and {}",
            EPHEMERAL_SECONDS.start(),
            EPHEMERAL_SECONDS.end()
        ))),
        _ => Ok(()),
    }
}

/// Loads a message together with its conversation, scoped to the caller's tenant.
async fn load(
    db: &DatabaseConnection,
    identity: &Identity,
    message_id: Id,
) -> Result<(messages::Model, conversations::Model), Error> {
    let message = message_api::find_by_id(db, message_id).await?;
    let conversation = find_for_tenant(db, identity, message.conversation_id).await?;
    Ok((message, conversation))
}

/// Persists a message with status `sent` and announces it to every other participant.
///
/// The message and the conversation's activity timestamp are written in one
/// transaction; nothing is published unless both commit.
pub async fn send(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    new_message: NewMessage,
) -> Result<messages::Model, Error> {
    validate_content(&new_message.content)?;
    validate_ephemeral(new_message.ephemeral_seconds)?;

    let conversation = find_for_tenant(db, &identity, new_message.conversation_id).await?;
    let sender = require_participant(db, conversation.id, identity.user_id).await?;
    if conversation.conversation_type == ConversationType::Broadcast
        && sender.role != ParticipantRole::Admin
    {
        return Err(Error::forbidden(
            "only admins may post in a broadcast conversation",
        ));
    }

    if let Some(reply_to_id) = new_message.reply_to_id {
        let parent = message_api::find_by_id(db, reply_to_id).await?;
        if parent.conversation_id != conversation.id {
            return Err(Error::validation(
                "reply_to_id must reference a message of the same conversation",
            ));
        }
    }

    let txn = db.begin().await?;
    let message = message_api::create(
        &txn,
        message_api::MessageDraft {
            conversation_id: conversation.id,
            sender_id: identity.user_id,
            content: new_message.content,
            reply_to_id: new_message.reply_to_id,
            ephemeral_seconds: new_message.ephemeral_seconds,
        },
    )
    .await?;
    conversation_api::touch(&txn, conversation.id).await?;
    txn.commit().await?;

    debug!(
        "Message {} sent to conversation {} by {}",
        message.id, conversation.id, identity.user_id
    );

    event_publisher
        .publish(DomainEvent::MessageSent {
            conversation_id: conversation.id,
            message: serde_json::to_value(&message)?,
            exclude_user_id: Some(identity.user_id),
        })
        .await;

    Ok(message)
}

/// Replaces the content of one of the caller's live messages.
pub async fn edit(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    message_id: Id,
    content: String,
) -> Result<messages::Model, Error> {
    validate_content(&content)?;

    let (message, conversation) = load(db, &identity, message_id).await?;
    require_participant(db, conversation.id, identity.user_id).await?;
    delivery::check_edit(&message, identity.user_id)?;

    let updated = message_api::update_content(db, message_id, identity.user_id, content).await?;

    event_publisher
        .publish(DomainEvent::MessageUpdated {
            conversation_id: conversation.id,
            message: serde_json::to_value(&updated)?,
            exclude_user_id: Some(identity.user_id),
        })
        .await;

    Ok(updated)
}

/// Tombstones one of the caller's messages, whatever its delivery status.
pub async fn delete(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    message_id: Id,
) -> Result<(), Error> {
    let (message, conversation) = load(db, &identity, message_id).await?;
    delivery::check_delete(&message, identity.user_id)?;

    if !message_api::soft_delete(db, message_id, identity.user_id).await? {
        return Err(Error::conflict("message is already deleted"));
    }
    info!("Message {message_id} deleted by its sender");

    event_publisher
        .publish(DomainEvent::MessageDeleted {
            conversation_id: conversation.id,
            message_id,
            reason: DeletionReason::Sender,
        })
        .await;

    Ok(())
}

/// Records that one of the caller's devices received `message_id`.
///
/// A late acknowledgement for a message that is already `delivered` or
/// `read` returns [`Transition::Unchanged`] and publishes nothing.
pub async fn acknowledge_delivery(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    message_id: Id,
) -> Result<Transition, Error> {
    let (message, conversation) = load(db, &identity, message_id).await?;
    require_participant(db, conversation.id, identity.user_id).await?;

    let transition = delivery::deliver(&message, identity.user_id)?;
    if transition == Transition::Unchanged {
        trace!("Delivery ack for {message_id} left status {}", message.status);
        return Ok(transition);
    }

    let now = Utc::now();
    if !message_api::mark_delivered(db, message_id, identity.user_id, now).await? {
        debug!("Message {message_id} moved on before the delivery ack was applied");
        return Ok(Transition::Unchanged);
    }

    event_publisher
        .publish(DomainEvent::MessageDelivered {
            conversation_id: conversation.id,
            message_id,
            recipient_id: identity.user_id,
            delivered_at: now,
        })
        .await;

    Ok(transition)
}

/// Advances the caller's read watermark to `up_to` (now when absent) and
/// marks every earlier message from other senders `read`.
///
/// A watermark in the future is clamped to now. The read transition is
/// applied in bulk by the store, limited to live messages of other senders
/// that are not yet `read`.
pub async fn mark_conversation_read(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    identity: Identity,
    conversation_id: Id,
    up_to: Option<DateTime<Utc>>,
) -> Result<ReadReceipt, Error> {
    find_for_tenant(db, &identity, conversation_id).await?;
    require_participant(db, conversation_id, identity.user_id).await?;

    let now = Utc::now();
    let watermark = up_to.map_or(now, |up_to| up_to.min(now));

    let txn = db.begin().await?;
    let advanced =
        participant_api::advance_last_read(&txn, conversation_id, identity.user_id, watermark.into())
            .await?;
    let transitioned =
        message_api::mark_read_through(&txn, conversation_id, identity.user_id, watermark, now)
            .await?;
    txn.commit().await?;

    let receipt = ReadReceipt {
        message_ids: transitioned.into_iter().map(|m| m.id).collect(),
        last_read_at: watermark,
    };

    if advanced || !receipt.message_ids.is_empty() {
        event_publisher
            .publish(DomainEvent::MessagesRead {
                conversation_id,
                reader_id: identity.user_id,
                message_ids: receipt.message_ids.clone(),
                last_read_at: watermark,
            })
            .await;
    }

    Ok(receipt)
}
