use crate::connection::{
    Connection, ConnectionId, ConnectionReceiver, ConnectionRegistry, ConversationId, Outbound,
    UserId,
};
use crate::directory::ParticipantDirectory;
use crate::error::{HubError, HubErrorKind};
use crate::message::{Envelope, Event, EventType};
use crate::presence::{PresenceChange, PresenceState};
use crate::typing::{TypingKey, TypingStore};
use dashmap::DashMap;
use events::Id;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames a connection may have queued before it is torn down.
    pub outbound_buffer: usize,
    /// How long a typing indicator lives without a refresh.
    pub typing_ttl: Duration,
    /// Inactivity after which an online user is shown as away.
    pub presence_away_after: Duration,
    /// How often the presence monitor looks for idle users.
    pub presence_sweep_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            typing_ttl: Duration::from_secs(5),
            presence_away_after: Duration::from_secs(300),
            presence_sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Best-effort delivery report of one broadcast, counted in connections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// The real-time hub: live connections, presence, typing indicators and
/// conversation fan-out.
///
/// Broadcasts to one conversation are serialized through a per-conversation
/// lock held from recipient resolution until every queue was written, so all
/// recipients observe that conversation's events in emission order.
/// Presence announcements of one user are serialized the same way.
pub struct Hub {
    registry: ConnectionRegistry,
    typing: TypingStore,
    directory: Arc<dyn ParticipantDirectory>,
    config: HubConfig,
    sequencers: DashMap<ConversationId, Arc<Mutex<()>>>,
    announcers: DashMap<UserId, Arc<Mutex<()>>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Hub {
    pub fn new(directory: Arc<dyn ParticipantDirectory>, config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: ConnectionRegistry::new(),
            typing: TypingStore::new(),
            directory,
            config,
            sequencers: DashMap::new(),
            announcers: DashMap::new(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Creates a connection sized by `outbound_buffer`; register it once the
    /// transport is ready to drain the receiver.
    pub fn open_connection(&self, user_id: UserId) -> (Connection, ConnectionReceiver) {
        Connection::open(user_id, self.config.outbound_buffer)
    }

    pub async fn register(
        &self,
        user_id: UserId,
        connection: Connection,
    ) -> Result<ConnectionId, HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubErrorKind::ShuttingDown.into());
        }

        let connection_id = connection.id();
        let change = self
            .registry
            .register(user_id, connection, Instant::now())?;
        info!("Registered connection {connection_id} for user {user_id}");

        if let Some(change) = change {
            self.settle(vec![change]).await;
        }
        Ok(connection_id)
    }

    /// Removes a connection. Safe to call more than once.
    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) {
        info!("Unregistering connection {connection_id} of user {user_id}");
        if let Some(change) = self.registry.unregister(user_id, connection_id) {
            self.settle(vec![change]).await;
        }
    }

    /// Sends an event to every connection of one user.
    pub async fn broadcast_to_user(
        &self,
        user_id: UserId,
        event: Event,
        conversation_id: Option<ConversationId>,
    ) -> Delivery {
        let frame = outbound(event, conversation_id);
        let (delivery, detached) = self.fan_out(vec![user_id], None, &frame);
        self.settle(detached).await;

        debug!(
            "{} sent to user {user_id}: {} delivered, {} dropped",
            frame.event_type(),
            delivery.delivered,
            delivery.dropped
        );
        delivery
    }

    /// Sends an event to every connection of every current participant,
    /// optionally skipping one user.
    pub async fn broadcast_to_conversation(
        &self,
        conversation_id: ConversationId,
        event: Event,
        exclude_user_id: Option<UserId>,
    ) -> Delivery {
        let frame = outbound(event, Some(conversation_id));
        let (delivery, detached) = self
            .sequenced_fan_out(conversation_id, exclude_user_id, &frame)
            .await;
        self.settle(detached).await;

        debug!(
            "{} sent to conversation {conversation_id}: {} delivered, {} dropped",
            frame.event_type(),
            delivery.delivered,
            delivery.dropped
        );
        delivery
    }

    /// Sends an event to a single connection. Returns whether it was queued.
    pub async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: Event,
        conversation_id: Option<ConversationId>,
    ) -> bool {
        let frame = outbound(event, conversation_id);
        match self.registry.send_to_connection(connection_id, &frame) {
            Some(true) => true,
            Some(false) => {
                if let Some(change) = self.tear_down(connection_id) {
                    self.settle(vec![change]).await;
                }
                false
            }
            None => false,
        }
    }

    pub fn current_presence(&self, user_id: UserId) -> PresenceState {
        self.registry.presence(user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.registry.connection_count(user_id)
    }

    pub fn is_typing(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.typing.is_typing(conversation_id, user_id)
    }

    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.typing.typing_users(conversation_id)
    }

    /// Any client activity brings an away user back online.
    pub async fn record_activity(&self, user_id: UserId) {
        if let Some(change) = self.registry.record_activity(user_id, Instant::now()) {
            self.settle(vec![change]).await;
        }
    }

    /// Starts, refreshes or stops a typing indicator.
    ///
    /// Only the first start and an explicit stop of a showing indicator are
    /// broadcast; a refresh just pushes the expiry out by `typing_ttl`.
    pub async fn set_typing(
        self: &Arc<Self>,
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: &str,
        is_typing: bool,
    ) -> Result<(), HubError> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(HubError::invalid("user_name must not be blank"));
        }
        if self.shutdown.is_cancelled() {
            return Err(HubErrorKind::ShuttingDown.into());
        }

        let sequencer = self.sequencer(conversation_id);
        let result = {
            let _turn = sequencer.lock().await;
            self.apply_typing(conversation_id, user_id, user_name, is_typing)
                .await
        };
        self.release_sequencer(conversation_id, sequencer);

        self.settle(result?).await;
        Ok(())
    }

    /// Moves every idle online user to away and announces it.
    pub async fn mark_idle_users_away(&self) -> usize {
        let changes = self
            .registry
            .mark_idle(Instant::now(), self.config.presence_away_after);
        let count = changes.len();
        self.settle(changes).await;
        count
    }

    /// Runs [`Hub::mark_idle_users_away`] every `presence_sweep_interval`
    /// until the hub shuts down.
    pub fn spawn_presence_monitor(self: &Arc<Self>) {
        let hub = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.presence_sweep_interval;

        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(hub) = hub.upgrade() else { break };
                        let away = hub.mark_idle_users_away().await;
                        if away > 0 {
                            debug!("Presence monitor marked {away} user(s) away");
                        }
                    }
                }
            }

            debug!("Presence monitor stopped");
        });
    }

    /// Cancels every timer and background task, waits for them, then closes
    /// all connections.
    pub async fn shutdown(&self) {
        info!("Shutting down hub");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let closed = self.registry.close_all();
        info!("Hub stopped, {closed} connection(s) closed");
    }

    async fn apply_typing(
        self: &Arc<Self>,
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: &str,
        is_typing: bool,
    ) -> Result<Vec<PresenceChange>, HubError> {
        let participants = self
            .directory
            .participant_ids(conversation_id)
            .await
            .map_err(HubError::directory)?;
        if !participants.contains(&user_id) {
            warn!("User {user_id} is not a participant of conversation {conversation_id}");
            return Err(HubErrorKind::NotParticipant.into());
        }

        let key = (conversation_id, user_id);
        let event = if is_typing {
            let started = self.typing.start(key, user_name, &self.shutdown);
            self.arm_typing_timer(key, started.generation, started.timer);
            if !started.is_new {
                trace!("Refreshed typing indicator of {user_id} in {conversation_id}");
                return Ok(Vec::new());
            }
            Event::TypingStart {
                user_id,
                user_name: user_name.to_owned(),
            }
        } else {
            match self.typing.stop(key) {
                Some(user_name) => Event::TypingStop { user_id, user_name },
                None => return Ok(Vec::new()),
            }
        };

        let (_, detached) = self.fan_out(
            participants,
            Some(user_id),
            &outbound(event, Some(conversation_id)),
        );
        Ok(detached)
    }

    fn arm_typing_timer(
        self: &Arc<Self>,
        key: TypingKey,
        generation: u64,
        timer: CancellationToken,
    ) {
        let hub = Arc::downgrade(self);
        let ttl = self.config.typing_ttl;

        self.tasks.spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    if let Some(hub) = hub.upgrade() {
                        hub.expire_typing(key, generation).await;
                    }
                }
            }
        });
    }

    async fn expire_typing(&self, key: TypingKey, generation: u64) {
        let (conversation_id, user_id) = key;
        let sequencer = self.sequencer(conversation_id);
        let detached = {
            let _turn = sequencer.lock().await;
            match self.typing.expire(key, generation) {
                Some(user_name) => {
                    debug!("Typing indicator of {user_id} in {conversation_id} expired");
                    let frame = outbound(
                        Event::TypingStop { user_id, user_name },
                        Some(conversation_id),
                    );
                    self.fan_out_to_participants(conversation_id, Some(user_id), &frame)
                        .await
                        .1
                }
                None => Vec::new(),
            }
        };
        self.release_sequencer(conversation_id, sequencer);
        self.settle(detached).await;
    }

    /// Announces presence changes, including the ones caused by tearing down
    /// connections while announcing. A user going offline also loses every
    /// typing indicator they still had showing.
    async fn settle(&self, mut pending: Vec<PresenceChange>) {
        while let Some(change) = pending.pop() {
            let user_id = change.user_id;
            info!("User {user_id} is now {} (was {})", change.to, change.from);

            if change.to == PresenceState::Offline {
                for (conversation_id, user_name) in self.typing.clear_user(user_id) {
                    let frame = outbound(
                        Event::TypingStop { user_id, user_name },
                        Some(conversation_id),
                    );
                    let (_, detached) = self
                        .sequenced_fan_out(conversation_id, Some(user_id), &frame)
                        .await;
                    pending.extend(detached);
                }
            }

            let announcer = slot(&self.announcers, user_id);
            let detached = {
                let _turn = announcer.lock().await;
                self.announce_presence(change).await
            };
            release_slot(&self.announcers, user_id, announcer);
            pending.extend(detached);
        }
    }

    /// Tells the user's contacts about `change`, unless a newer transition
    /// already superseded it while the contacts were being resolved.
    async fn announce_presence(&self, change: PresenceChange) -> Vec<PresenceChange> {
        let user_id = change.user_id;
        let contacts = match self.directory.contact_ids(user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                error!("Failed to resolve contacts of {user_id}, presence update abandoned: {e}");
                return Vec::new();
            }
        };

        let current = self.registry.presence(user_id);
        if current != change.to {
            debug!(
                "Skipping stale presence {} of user {user_id}, now {current}",
                change.to
            );
            return Vec::new();
        }

        let frame = outbound(
            Event::PresenceChanged {
                user_id,
                presence: current,
            },
            None,
        );
        self.fan_out(contacts, None, &frame).1
    }

    async fn sequenced_fan_out(
        &self,
        conversation_id: ConversationId,
        exclude_user_id: Option<UserId>,
        frame: &Outbound,
    ) -> (Delivery, Vec<PresenceChange>) {
        let sequencer = self.sequencer(conversation_id);
        let result = {
            let _turn = sequencer.lock().await;
            self.fan_out_to_participants(conversation_id, exclude_user_id, frame)
                .await
        };
        self.release_sequencer(conversation_id, sequencer);
        result
    }

    async fn fan_out_to_participants(
        &self,
        conversation_id: ConversationId,
        exclude_user_id: Option<UserId>,
        frame: &Outbound,
    ) -> (Delivery, Vec<PresenceChange>) {
        match self.directory.participant_ids(conversation_id).await {
            Ok(participants) => self.fan_out(participants, exclude_user_id, frame),
            Err(e) => {
                error!(
                    "Failed to resolve participants of {conversation_id}, {} abandoned: {e}",
                    frame.event_type()
                );
                Default::default()
            }
        }
    }

    /// Queues a frame for every connection of `recipients`. Connections that
    /// cannot take it are torn down; the resulting presence changes are
    /// returned for the caller to settle.
    fn fan_out(
        &self,
        recipients: Vec<UserId>,
        exclude_user_id: Option<UserId>,
        frame: &Outbound,
    ) -> (Delivery, Vec<PresenceChange>) {
        let mut delivery = Delivery::default();
        let mut detached = Vec::new();

        for user_id in recipients {
            if Some(user_id) == exclude_user_id {
                continue;
            }
            let fanout = self.registry.send_to_user(user_id, frame);
            delivery.delivered += fanout.delivered;
            delivery.dropped += fanout.failed.len();
            detached.extend(
                fanout
                    .failed
                    .into_iter()
                    .filter_map(|connection_id| self.tear_down(connection_id)),
            );
        }

        (delivery, detached)
    }

    fn tear_down(&self, connection_id: ConnectionId) -> Option<PresenceChange> {
        let (user_id, change) = self.registry.evict(connection_id)?;
        warn!("Tore down connection {connection_id} of user {user_id}: outbound queue unavailable");
        change
    }

    fn sequencer(&self, conversation_id: ConversationId) -> Arc<Mutex<()>> {
        slot(&self.sequencers, conversation_id)
    }

    fn release_sequencer(&self, conversation_id: ConversationId, sequencer: Arc<Mutex<()>>) {
        release_slot(&self.sequencers, conversation_id, sequencer);
    }
}

fn slot(locks: &DashMap<Id, Arc<Mutex<()>>>, key: Id) -> Arc<Mutex<()>> {
    locks.entry(key).or_default().clone()
}

/// Drops a lock handle and forgets the lock once nobody else holds or awaits it.
fn release_slot(locks: &DashMap<Id, Arc<Mutex<()>>>, key: Id, lock: Arc<Mutex<()>>) {
    drop(lock);
    locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
}

fn outbound(event: Event, conversation_id: Option<ConversationId>) -> Outbound {
    Arc::new(Envelope::new(event, conversation_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::InMemoryDirectory;
    use crate::directory::DirectoryError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use tokio::sync::mpsc::error::TryRecvError;

    struct Fixture {
        hub: Arc<Hub>,
        directory: Arc<InMemoryDirectory>,
        conversation_id: ConversationId,
        alice: UserId,
        bob: UserId,
        carol: UserId,
    }

    fn fixture(config: HubConfig) -> Fixture {
        let conversation_id = ConversationId::new_v4();
        let alice = UserId::new_v4();
        let bob = UserId::new_v4();
        let carol = UserId::new_v4();
        let directory = Arc::new(
            InMemoryDirectory::default().with_conversation(conversation_id, &[alice, bob, carol]),
        );
        Fixture {
            hub: Hub::new(directory.clone(), config),
            directory,
            conversation_id,
            alice,
            bob,
            carol,
        }
    }

    async fn connect(hub: &Hub, user_id: UserId) -> (ConnectionId, ConnectionReceiver) {
        let (connection, receiver) = hub.open_connection(user_id);
        let connection_id = hub.register(user_id, connection).await.unwrap();
        (connection_id, receiver)
    }

    fn drain(receiver: &mut ConnectionReceiver) -> Vec<&'static str> {
        let mut types = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            types.push(frame.event_type());
        }
        types
    }

    fn message(body: &str) -> Event {
        Event::MessageSent {
            message: json!({ "content": body }),
        }
    }

    #[tokio::test]
    async fn conversation_broadcast_skips_the_excluded_user() {
        let f = fixture(HubConfig::default());
        let (_, mut alice_phone) = connect(&f.hub, f.alice).await;
        let (_, mut alice_laptop) = connect(&f.hub, f.alice).await;
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        let (_, mut carol) = connect(&f.hub, f.carol).await;
        for receiver in [&mut alice_phone, &mut alice_laptop, &mut bob, &mut carol] {
            drain(receiver);
        }

        let delivery = f
            .hub
            .broadcast_to_conversation(f.conversation_id, message("hi"), Some(f.alice))
            .await;

        assert_eq!(delivery, Delivery { delivered: 2, dropped: 0 });
        assert!(drain(&mut alice_phone).is_empty());
        assert!(drain(&mut alice_laptop).is_empty());
        assert_eq!(drain(&mut bob), vec!["MESSAGE_SENT"]);
        assert_eq!(drain(&mut carol), vec!["MESSAGE_SENT"]);
    }

    #[tokio::test]
    async fn every_device_of_a_user_receives_user_scoped_events() {
        let f = fixture(HubConfig::default());
        let (_, mut phone) = connect(&f.hub, f.alice).await;
        let (_, mut laptop) = connect(&f.hub, f.alice).await;

        let delivery = f
            .hub
            .broadcast_to_user(
                f.alice,
                Event::ParticipantLeft { user_id: f.alice },
                Some(f.conversation_id),
            )
            .await;

        assert_eq!(delivery.delivered, 2);
        let frame = phone.try_recv().unwrap();
        assert_eq!(frame.conversation_id, Some(f.conversation_id));
        assert_eq!(drain(&mut laptop), vec!["PARTICIPANT_LEFT"]);
    }

    #[tokio::test]
    async fn removed_participant_stops_receiving_conversation_events() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        let (_, mut carol) = connect(&f.hub, f.carol).await;
        drain(&mut bob);
        drain(&mut carol);

        f.directory.remove(f.conversation_id, f.carol);
        f.hub
            .broadcast_to_conversation(f.conversation_id, message("after"), None)
            .await;

        assert_eq!(drain(&mut bob), vec!["MESSAGE_SENT"]);
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test]
    async fn events_of_a_conversation_arrive_in_emission_order() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;

        for body in ["one", "two", "three"] {
            f.hub
                .broadcast_to_conversation(f.conversation_id, message(body), Some(f.alice))
                .await;
        }

        let bodies: Vec<Value> = std::iter::from_fn(|| bob.try_recv().ok())
            .filter_map(|frame| match &frame.event {
                Event::MessageSent { message } => Some(message["content"].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec![json!("one"), json!("two"), json!("three")]);
    }

    #[tokio::test]
    async fn presence_follows_the_connection_set() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Offline);

        let (phone, _phone_rx) = connect(&f.hub, f.alice).await;
        let (laptop, _laptop_rx) = connect(&f.hub, f.alice).await;
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Online);
        assert_eq!(drain(&mut bob), vec!["PRESENCE_CHANGED"]);

        f.hub.unregister(f.alice, phone).await;
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Online);
        assert!(drain(&mut bob).is_empty());

        f.hub.unregister(f.alice, laptop).await;
        f.hub.unregister(f.alice, laptop).await;
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Offline);
        assert_eq!(f.hub.connection_count(f.alice), 0);

        let frame = bob.try_recv().unwrap();
        assert_eq!(
            frame.event,
            Event::PresenceChanged {
                user_id: f.alice,
                presence: PresenceState::Offline
            }
        );
        assert!(drain(&mut bob).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_users_go_away_until_they_act_again() {
        let f = fixture(HubConfig::default());
        let (_, _alice_rx) = connect(&f.hub, f.alice).await;
        let (_, mut bob) = connect(&f.hub, f.bob).await;

        tokio::time::sleep(Duration::from_secs(299)).await;
        f.hub.record_activity(f.bob).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(f.hub.mark_idle_users_away().await, 1);
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Away);
        assert_eq!(f.hub.current_presence(f.bob), PresenceState::Online);
        assert_eq!(drain(&mut bob), vec!["PRESENCE_CHANGED"]);

        f.hub.record_activity(f.alice).await;
        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Online);
        assert_eq!(drain(&mut bob), vec!["PRESENCE_CHANGED"]);
    }

    /// Delays the next contact lookup once armed, signalling when it started.
    struct SlowContacts {
        inner: InMemoryDirectory,
        armed: AtomicBool,
        entered: Notify,
    }

    #[async_trait::async_trait]
    impl ParticipantDirectory for SlowContacts {
        async fn participant_ids(
            &self,
            conversation_id: ConversationId,
        ) -> Result<Vec<UserId>, DirectoryError> {
            self.inner.participant_ids(conversation_id).await
        }

        async fn contact_ids(&self, user_id: UserId) -> Result<Vec<UserId>, DirectoryError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.contact_ids(user_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_presence_changes_leave_contacts_with_the_latest_state() {
        let conversation_id = ConversationId::new_v4();
        let alice = UserId::new_v4();
        let bob = UserId::new_v4();
        let directory = Arc::new(SlowContacts {
            inner: InMemoryDirectory::default().with_conversation(conversation_id, &[alice, bob]),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
        });
        let hub = Hub::new(directory.clone(), HubConfig::default());
        let (_, _alice_rx) = connect(&hub, alice).await;
        let (_, mut bob_rx) = connect(&hub, bob).await;

        tokio::time::sleep(Duration::from_secs(299)).await;
        hub.record_activity(bob).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        drain(&mut bob_rx);

        directory.armed.store(true, Ordering::SeqCst);
        let monitor = tokio::spawn({
            let hub = hub.clone();
            async move { hub.mark_idle_users_away().await }
        });
        directory.entered.notified().await;
        hub.record_activity(alice).await;
        assert_eq!(monitor.await.unwrap(), 1);

        assert_eq!(hub.current_presence(alice), PresenceState::Online);
        let announced: Vec<PresenceState> = std::iter::from_fn(|| bob_rx.try_recv().ok())
            .filter_map(|frame| match &frame.event {
                Event::PresenceChanged { presence, .. } => Some(*presence),
                _ => None,
            })
            .collect();
        assert_eq!(announced.last(), Some(&PresenceState::Online));
        assert!(!announced.contains(&PresenceState::Away));
    }

    #[tokio::test(start_paused = true)]
    async fn presence_monitor_marks_idle_users_away() {
        let f = fixture(HubConfig::default());
        let (_, _alice_rx) = connect(&f.hub, f.alice).await;
        f.hub.spawn_presence_monitor();

        tokio::time::sleep(Duration::from_secs(331)).await;

        assert_eq!(f.hub.current_presence(f.alice), PresenceState::Away);
        f.hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn typing_indicator_expires_after_the_ttl() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;

        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", true)
            .await
            .unwrap();
        assert_eq!(drain(&mut bob), vec!["TYPING_START"]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", true)
            .await
            .unwrap();
        assert!(drain(&mut bob).is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(f.hub.is_typing(f.conversation_id, f.alice));
        assert!(drain(&mut bob).is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!f.hub.is_typing(f.conversation_id, f.alice));
        assert_eq!(drain(&mut bob), vec!["TYPING_STOP"]);
    }

    #[tokio::test]
    async fn explicit_stop_is_broadcast_once() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;

        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", true)
            .await
            .unwrap();
        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", false)
            .await
            .unwrap();
        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", false)
            .await
            .unwrap();

        assert_eq!(drain(&mut bob), vec!["TYPING_START", "TYPING_STOP"]);
        assert!(f.hub.typing_users(f.conversation_id).is_empty());
    }

    #[tokio::test]
    async fn typing_is_rejected_for_outsiders_and_blank_names() {
        let f = fixture(HubConfig::default());

        let outsider = f
            .hub
            .set_typing(f.conversation_id, UserId::new_v4(), "Eve", true)
            .await
            .unwrap_err();
        assert_eq!(outsider.error_kind, HubErrorKind::NotParticipant);

        let blank = f
            .hub
            .set_typing(f.conversation_id, f.alice, "   ", true)
            .await
            .unwrap_err();
        assert!(matches!(blank.error_kind, HubErrorKind::Invalid(_)));
    }

    #[tokio::test]
    async fn last_disconnect_clears_typing_indicators() {
        let f = fixture(HubConfig::default());
        let (alice_connection, _alice_rx) = connect(&f.hub, f.alice).await;
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        f.hub
            .set_typing(f.conversation_id, f.alice, "Alice", true)
            .await
            .unwrap();
        drain(&mut bob);

        f.hub.unregister(f.alice, alice_connection).await;

        assert!(!f.hub.is_typing(f.conversation_id, f.alice));
        assert_eq!(drain(&mut bob), vec!["TYPING_STOP", "PRESENCE_CHANGED"]);
    }

    #[tokio::test]
    async fn connection_that_cannot_keep_up_is_torn_down() {
        let f = fixture(HubConfig {
            outbound_buffer: 2,
            ..HubConfig::default()
        });
        let (_, mut alice) = connect(&f.hub, f.alice).await;
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        drain(&mut alice);

        for body in ["one", "two"] {
            let delivery = f
                .hub
                .broadcast_to_conversation(f.conversation_id, message(body), Some(f.alice))
                .await;
            assert_eq!(delivery.dropped, 0);
        }
        let delivery = f
            .hub
            .broadcast_to_conversation(f.conversation_id, message("three"), Some(f.alice))
            .await;

        assert_eq!(delivery, Delivery { delivered: 0, dropped: 1 });
        assert_eq!(f.hub.connection_count(f.bob), 0);
        assert_eq!(f.hub.current_presence(f.bob), PresenceState::Offline);
        assert_eq!(drain(&mut alice), vec!["PRESENCE_CHANGED"]);

        assert_eq!(drain(&mut bob), vec!["MESSAGE_SENT", "MESSAGE_SENT"]);
        assert_eq!(bob.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn register_rejects_a_foreign_connection() {
        let f = fixture(HubConfig::default());
        let (connection, _rx) = f.hub.open_connection(f.alice);

        let error = f.hub.register(f.bob, connection).await.unwrap_err();

        assert_eq!(error.error_kind, HubErrorKind::OwnerMismatch);
        assert_eq!(f.hub.current_presence(f.bob), PresenceState::Offline);
    }

    #[tokio::test]
    async fn shutdown_closes_connections_and_refuses_new_ones() {
        let f = fixture(HubConfig::default());
        let (_, mut bob) = connect(&f.hub, f.bob).await;
        f.hub
            .set_typing(f.conversation_id, f.bob, "Bob", true)
            .await
            .unwrap();

        f.hub.shutdown().await;

        assert!(bob.recv().await.is_none());
        let (connection, _rx) = f.hub.open_connection(f.alice);
        let error = f.hub.register(f.alice, connection).await.unwrap_err();
        assert_eq!(error.error_kind, HubErrorKind::ShuttingDown);
    }
}
