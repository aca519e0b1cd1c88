//! Hides ephemeral messages once their window has elapsed.
//!
//! Expiry is driven by the server clock alone: a message is hidden at or
//! shortly after `ephemeral_expires_at` whether or not any client is online.

use crate::error::Error;
use chrono::{DateTime, Utc};
use entity_api::message as message_api;
use events::{DeletionReason, DomainEvent, EventPublisher};
use log::*;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs one sweep: hides up to `batch_size` expired messages and publishes
/// `MessageDeleted` for each one this pass actually hid.
pub async fn sweep_expired(
    db: &DatabaseConnection,
    event_publisher: &EventPublisher,
    now: DateTime<Utc>,
    batch_size: u64,
) -> Result<usize, Error> {
    let expired = message_api::find_expired(db, now, batch_size).await?;

    let mut hidden = 0;
    for message in expired {
        // Lost to a sender delete or another sweeper.
        if !message_api::hide_expired(db, message.id, now).await? {
            continue;
        }
        hidden += 1;

        event_publisher
            .publish(DomainEvent::MessageDeleted {
                conversation_id: message.conversation_id,
                message_id: message.id,
                reason: DeletionReason::Expired,
            })
            .await;
    }

    Ok(hidden)
}

/// Periodic driver of [`sweep_expired`].
pub struct ExpirySweeper {
    db: Arc<DatabaseConnection>,
    event_publisher: EventPublisher,
    interval: Duration,
    batch_size: u64,
}

impl ExpirySweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_publisher: EventPublisher,
        interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            db,
            event_publisher,
            interval,
            batch_size,
        }
    }

    /// Sweeps every `interval` until `shutdown` is cancelled. A failed pass
    /// is logged and retried on the next tick.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting ephemeral expiry sweeper every {:?} (batch size {})",
            self.interval, self.batch_size
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }

            info!("Ephemeral expiry sweeper stopped");
        })
    }

    async fn run_once(&self) {
        match sweep_expired(&self.db, &self.event_publisher, Utc::now(), self.batch_size).await {
            Ok(0) => trace!("No expired ephemeral messages"),
            Ok(hidden) => debug!("Hid {hidden} expired ephemeral message(s)"),
            Err(e) => error!("Ephemeral expiry sweep failed: {e}"),
        }
    }
}

#[cfg(test)]
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use crate::message_status::MessageStatus;
    use crate::messages;
    use crate::test_support::{exec, message, RecordingHandler};
    use crate::Id;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn expired(conversation_id: Id) -> messages::Model {
        let mut expired = message(conversation_id, Id::new_v4(), MessageStatus::Delivered);
        expired.ephemeral_seconds = Some(30);
        expired.ephemeral_expires_at = Some((Utc::now() - chrono::Duration::seconds(1)).into());
        expired
    }

    #[tokio::test]
    async fn sweep_publishes_only_messages_it_hid() -> Result<(), Error> {
        let conversation_id = Id::new_v4();
        let first = expired(conversation_id);
        let second = expired(conversation_id);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![first.clone(), second.clone()]])
            .append_exec_results(vec![exec(1), exec(0)])
            .into_connection();
        let recorder = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new().with_handler(recorder.clone());

        let hidden = sweep_expired(&db, &publisher, Utc::now(), 500).await?;

        assert_eq!(hidden, 1);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            DomainEvent::MessageDeleted { message_id, reason: DeletionReason::Expired, .. }
                if message_id == first.id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn empty_sweep_touches_nothing() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<messages::Model>::new()])
            .into_connection();

        assert_eq!(
            sweep_expired(&db, &EventPublisher::default(), Utc::now(), 500).await?,
            0
        );
        Ok(())
    }

    #[tokio::test]
    async fn sweeper_stops_when_cancelled() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<messages::Model>::new()])
            .into_connection();
        let shutdown = CancellationToken::new();

        let handle = ExpirySweeper::new(
            Arc::new(db),
            EventPublisher::default(),
            Duration::from_secs(3600),
            500,
        )
        .spawn(shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
