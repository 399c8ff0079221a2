use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use poker_core::auth::Principal;
use poker_core::errors::SessionError;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::topic::{Subscriber, SubscriberId, Subscription, TopicEvent, ViewMessage};

/// Who is connected right now. The same payload goes to every viewer;
/// presence is not masked.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub users: Vec<String>,
}

impl ViewMessage for PresenceUpdate {
    fn render(&self, _principal: &Principal) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

type Refs = Arc<RwLock<HashMap<String, usize>>>;

fn users_of(refs: &Refs) -> Vec<String> {
    let mut users: Vec<String> = refs.read().keys().cloned().collect();
    users.sort_unstable();
    users
}

/// Connection-counted presence roster with debounced broadcast.
///
/// Every subscription counts one connection for its user; a user is
/// present while at least one connection remains. Changes set a dirty
/// flag that the tick loop turns into at most one broadcast per tick,
/// so reconnect storms collapse into a single update.
pub struct PresenceTracker {
    intake: mpsc::Sender<TopicEvent>,
    refs: Refs,
    send_queue: usize,
}

impl PresenceTracker {
    pub fn new(notify_buffer: usize, send_queue: usize, tick: Duration) -> Self {
        let (intake, rx) = mpsc::channel(notify_buffer.max(1));
        let refs: Refs = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(presence_loop(rx, refs.clone(), tick));
        Self {
            intake,
            refs,
            send_queue: send_queue.max(1),
        }
    }

    /// The roster as of now, for the initial frame of a new connection.
    pub fn current(&self) -> PresenceUpdate {
        PresenceUpdate {
            users: users_of(&self.refs),
        }
    }

    /// Register a connection; the user shows up on the next dirty tick.
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
            .map_err(|_| SessionError::System("presence loop is gone".into()))?;
        Ok(Subscription::new(id, rx, self.intake.clone()))
    }
}

async fn presence_loop(mut rx: mpsc::Receiver<TopicEvent>, refs: Refs, tick: Duration) {
    let mut subscribers: HashMap<SubscriberId, Subscriber> = HashMap::new();
    let mut dirty = false;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    TopicEvent::Join(subscriber) => {
                        let count = {
                            let mut refs = refs.write();
                            let count = refs.entry(subscriber.name.clone()).or_insert(0);
                            *count += 1;
                            *count
                        };
                        if count == 1 {
                            debug!(name = %subscriber.name, "user appeared");
                            dirty = true;
                        }
                        subscribers.insert(subscriber.id.clone(), subscriber);
                    }
                    TopicEvent::Leave(id) => {
                        let Some(subscriber) = subscribers.remove(&id) else { continue };
                        let gone = {
                            let mut refs = refs.write();
                            match refs.get_mut(&subscriber.name) {
                                Some(count) if *count > 1 => {
                                    *count -= 1;
                                    false
                                }
                                Some(_) => {
                                    refs.remove(&subscriber.name);
                                    true
                                }
                                None => false,
                            }
                        };
                        if gone {
                            debug!(name = %subscriber.name, "user vanished");
                            dirty = true;
                        }
                    }
                    TopicEvent::Notify(message) => {
                        subscribers.retain(|_, sub| sub.deliver(message.clone()));
                    }
                }
            }
            _ = ticker.tick() => {
                if dirty {
                    dirty = false;
                    let update: Arc<dyn ViewMessage> = Arc::new(PresenceUpdate {
                        users: users_of(&refs),
                    });
                    subscribers.retain(|_, sub| sub.deliver(update.clone()));
                }
            }
        }
    }
}
