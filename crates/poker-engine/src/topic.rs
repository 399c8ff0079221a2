use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use poker_core::auth::Principal;
use poker_core::errors::SessionError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::Session;
use crate::snapshot::SessionSnapshot;

/// Anything the topic can fan out to subscribers.
///
/// Rendering is deferred to delivery time so one broadcast serves every
/// viewer with its own masked projection.
pub trait ViewMessage: Send + Sync {
    fn render(&self, principal: &Principal) -> serde_json::Value;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn generate() -> Self {
        Self(format!("sub_{}", Uuid::now_v7().simple()))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-connection fan-out endpoint held by a broadcast loop.
pub(crate) struct Subscriber {
    pub(crate) id: SubscriberId,
    pub(crate) name: String,
    pub(crate) tx: mpsc::Sender<Arc<dyn ViewMessage>>,
}

impl Subscriber {
    /// Queue a message without waiting. A full queue drops the message
    /// (the next broadcast carries newer state anyway); a closed queue
    /// means the connection is gone.
    pub(crate) fn deliver(&self, message: Arc<dyn ViewMessage>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = %self.id, name = %self.name, "send queue full, dropping update");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

pub(crate) enum TopicEvent {
    Notify(Arc<dyn ViewMessage>),
    Join(Subscriber),
    Leave(SubscriberId),
}

/// A live subscription handed to one connection.
///
/// Must be torn down with [`Subscription::leave`] so queued messages are
/// drained and the broadcaster forgets the endpoint.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<dyn ViewMessage>>,
    intake: mpsc::Sender<TopicEvent>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Arc<dyn ViewMessage>>,
        intake: mpsc::Sender<TopicEvent>,
    ) -> Self {
        Self { id, rx, intake }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Next broadcast message, `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<Arc<dyn ViewMessage>> {
        self.rx.recv().await
    }

    /// Deregister and drain whatever was queued before the broadcaster
    /// processed the leave.
    pub async fn leave(mut self) {
        if self.intake.send(TopicEvent::Leave(self.id.clone())).await.is_err() {
            return;
        }
        while self.rx.recv().await.is_some() {}
    }
}

/// Knobs a write transaction may set on the snapshot it produces.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotOptions {
    /// Lift masking on the snapshot broadcast and returned by this write.
    /// Applies to that snapshot only; the flag is never stored.
    pub revealed: bool,
}

/// Serialized access to one [`Session`] plus broadcast of its changes.
///
/// All mutation goes through [`SessionTopic::write`]; a change is detected
/// by comparing the session version around the transaction, so no-op writes
/// stay silent. Fan-out runs on a dedicated task that owns the subscriber
/// map and never touches the session lock.
pub struct SessionTopic {
    session: tokio::sync::RwLock<Session>,
    intake: mpsc::Sender<TopicEvent>,
    send_queue: usize,
}

impl SessionTopic {
    pub fn new(session: Session, notify_buffer: usize, send_queue: usize) -> Self {
        let (intake, rx) = mpsc::channel(notify_buffer.max(1));
        tokio::spawn(broadcast_loop(rx));
        Self {
            session: tokio::sync::RwLock::new(session),
            intake,
            send_queue: send_queue.max(1),
        }
    }

    /// Run a read-only inspection under the shared lock.
    pub async fn read<R>(&self, inspect: impl FnOnce(&Session) -> R) -> R {
        inspect(&*self.session.read().await)
    }

    /// Run a transaction under the exclusive lock.
    ///
    /// Returns the snapshot captured right after the transaction. If the
    /// transaction bumped the session version the same snapshot is also
    /// broadcast to every subscriber.
    pub async fn write<F>(&self, transact: F) -> Result<Arc<SessionSnapshot>, SessionError>
    where
        F: FnOnce(&mut Session, &mut SnapshotOptions) -> Result<(), SessionError>,
    {
        let mut session = self.session.write().await;
        let before = session.version();
        let mut options = SnapshotOptions::default();
        transact(&mut session, &mut options)?;
        let snapshot = Arc::new(SessionSnapshot::capture(&session, options.revealed));
        if session.version() != before {
            debug!(version = snapshot.version, "session changed, broadcasting");
            if self
                .intake
                .send(TopicEvent::Notify(snapshot.clone()))
                .await
                .is_err()
            {
                warn!("broadcast loop is gone, update not delivered");
            }
        }
        Ok(snapshot)
    }

    /// Broadcast the current state unconditionally.
    pub async fn sync(&self) {
        let snapshot = {
            let session = self.session.read().await;
            Arc::new(SessionSnapshot::capture(&session, false))
        };
        if self.intake.send(TopicEvent::Notify(snapshot)).await.is_err() {
            warn!("broadcast loop is gone, sync not delivered");
        }
    }

    /// Register a connection for change broadcasts.
    pub async fn subscribe(&self, identity: &Principal) -> Result<Subscription, SessionError> {
        let id = SubscriberId::generate();
        let (tx, rx) = mpsc::channel(self.send_queue);
        let subscriber = Subscriber {
            id: id.clone(),
            name: identity.name().to_owned(),
            tx,
        };
        self.intake
            .send(TopicEvent::Join(subscriber))
            .await
            .map_err(|_| SessionError::System("broadcast loop is gone".into()))?;
        debug!(subscriber = %id, name = identity.name(), "subscribed");
        Ok(Subscription {
            id,
            rx,
            intake: self.intake.clone(),
        })
    }
}

/// Single consumer of topic events; sole owner of the subscriber map.
async fn broadcast_loop(mut rx: mpsc::Receiver<TopicEvent>) {
    let mut subscribers: HashMap<SubscriberId, Subscriber> = HashMap::new();
    while let Some(event) = rx.recv().await {
        match event {
            TopicEvent::Notify(message) => {
                subscribers.retain(|_, sub| sub.deliver(message.clone()));
            }
            TopicEvent::Join(subscriber) => {
                subscribers.insert(subscriber.id.clone(), subscriber);
            }
            TopicEvent::Leave(id) => {
                if subscribers.remove(&id).is_some() {
                    debug!(subscriber = %id, "unsubscribed");
                }
            }
        }
    }
}
