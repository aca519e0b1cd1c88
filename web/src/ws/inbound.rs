use crate::error::{Error, ErrorCode, Result};
use chrono::{DateTime, Utc};
use domain::identity::Identity;
use domain::{message, Id};
use hub::ConnectionId;
use log::*;
use serde::Deserialize;
use service::AppState;

/// Frames a client may send, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum InboundFrame {
    Heartbeat,
    Typing {
        conversation_id: Id,
        user_name: String,
        is_typing: bool,
    },
    /// One of the caller's devices received a message.
    Delivered { message_id: Id },
    /// Mark the conversation read up to `up_to`, or up to now.
    Read {
        conversation_id: Id,
        #[serde(default)]
        up_to: Option<DateTime<Utc>>,
    },
}

impl InboundFrame {
    fn conversation_id(&self) -> Option<Id> {
        match self {
            InboundFrame::Typing {
                conversation_id, ..
            }
            | InboundFrame::Read {
                conversation_id, ..
            } => Some(*conversation_id),
            InboundFrame::Heartbeat | InboundFrame::Delivered { .. } => None,
        }
    }
}

/// Handles one text frame. Every frame counts as activity; a rejected frame
/// is answered with an `ERROR` on this connection only.
pub(crate) async fn dispatch(
    app_state: &AppState,
    identity: Identity,
    connection_id: ConnectionId,
    text: &str,
) {
    app_state.hub.record_activity(identity.user_id).await;

    let (conversation_id, result) = match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => (frame.conversation_id(), apply(app_state, identity, frame).await),
        Err(e) => (None, Err(Error::from(e))),
    };

    if let Err(e) = result {
        match e.code() {
            ErrorCode::Internal => {
                error!("Inbound frame from connection {connection_id} failed: {e}")
            }
            _ => debug!("Rejected inbound frame from connection {connection_id}: {e}"),
        }
        app_state
            .hub
            .send_to_connection(connection_id, e.into_event(), conversation_id)
            .await;
    }
}

async fn apply(app_state: &AppState, identity: Identity, frame: InboundFrame) -> Result<()> {
    match frame {
        InboundFrame::Heartbeat => {
            trace!("Heartbeat from user {}", identity.user_id);
        }
        InboundFrame::Typing {
            conversation_id,
            user_name,
            is_typing,
        } => {
            app_state
                .hub
                .set_typing(conversation_id, identity.user_id, &user_name, is_typing)
                .await?;
        }
        InboundFrame::Delivered { message_id } => {
            message::acknowledge_delivery(
                app_state.db_conn_ref(),
                &app_state.event_publisher,
                identity,
                message_id,
            )
            .await?;
        }
        InboundFrame::Read {
            conversation_id,
            up_to,
        } => {
            message::mark_conversation_read(
                app_state.db_conn_ref(),
                &app_state.event_publisher,
                identity,
                conversation_id,
                up_to,
            )
            .await?;
        }
    }
    Ok(())
}
