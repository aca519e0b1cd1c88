//! Forward-only delivery state machine of a message.
//!
//! `SENT → DELIVERED → READ`, with soft deletion as a terminal state from any
//! of them. These checks decide what a single-message request may do; the
//! store repeats them as conditions on the actual `UPDATE` so a concurrent
//! write can never make a row regress. Reads are only ever applied in bulk,
//! through the conditional update behind a conversation's read watermark.

use crate::error::Error;
use crate::message_status::MessageStatus;
use crate::messages::Model;
use crate::Id;

/// What a legal request does to a message's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moves to the contained state.
    Applied(MessageStatus),
    /// The message is already at or past the requested state.
    Unchanged,
}

/// Whether `from → to` is a forward step.
pub fn can_transition(from: MessageStatus, to: MessageStatus) -> bool {
    matches!(
        (from, to),
        (MessageStatus::Sent, MessageStatus::Delivered)
            | (MessageStatus::Sent, MessageStatus::Read)
            | (MessageStatus::Delivered, MessageStatus::Read)
    )
}

/// A recipient device acknowledged receipt.
pub fn deliver(message: &Model, recipient_id: Id) -> Result<Transition, Error> {
    if message.is_deleted() {
        return Err(Error::conflict("message is deleted"));
    }
    if message.sender_id == recipient_id {
        return Err(Error::forbidden("the sender cannot acknowledge delivery"));
    }
    Ok(advance(message.status, MessageStatus::Delivered))
}

/// Content edits are open to the sender while the message is live.
pub fn check_edit(message: &Model, editor_id: Id) -> Result<(), Error> {
    if message.sender_id != editor_id {
        return Err(Error::forbidden("only the sender may edit a message"));
    }
    if message.is_deleted() {
        return Err(Error::conflict("message is deleted"));
    }
    Ok(())
}

/// Deletion is open to the sender regardless of status, once.
pub fn check_delete(message: &Model, actor_id: Id) -> Result<(), Error> {
    if message.sender_id != actor_id {
        return Err(Error::forbidden("only the sender may delete a message"));
    }
    if message.is_deleted() {
        return Err(Error::conflict("message is already deleted"));
    }
    Ok(())
}

fn advance(current: MessageStatus, target: MessageStatus) -> Transition {
    if can_transition(current, target) {
        Transition::Applied(target)
    } else {
        Transition::Unchanged
    }
}
