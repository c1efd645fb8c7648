//! Bridges inbound calls to the subscribed store.
//!
//! Each instance has one [`SubscriberSlot`]. The gRPC handler holds the slot
//! directly, so delivering a message never touches the registry lock. A
//! store installs its action sender with [`subscribe`]; the returned
//! [`Subscription`] removes it again when cancelled or dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use simple_core::{InstanceId, ServerAction};
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

use crate::proto::{Empty, SimpleMessage, simple_server::Simple};
use crate::registry::Registry;

/// Where a subscribed store receives its actions.
pub type ActionSender = mpsc::UnboundedSender<ServerAction>;

#[derive(Debug)]
struct Subscriber {
    token: u64,
    actions: ActionSender,
}

/// The single listener slot of one instance. Last writer wins.
#[derive(Debug)]
pub struct SubscriberSlot {
    current: Mutex<Option<Subscriber>>,
    next_token: AtomicU64,
}

impl SubscriberSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Subscriber>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `actions` as the sole listener, replacing any previous one.
    pub fn subscribe(self: &Arc<Self>, actions: ActionSender) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        *self.current() = Some(Subscriber { token, actions });
        Subscription {
            slot: Arc::downgrade(self),
            token,
        }
    }

    fn clear(&self, token: u64) {
        let mut current = self.current();
        if current.as_ref().is_some_and(|s| s.token == token) {
            *current = None;
        }
    }

    fn holds(&self, token: u64) -> bool {
        self.current().as_ref().is_some_and(|s| s.token == token)
    }

    /// Whether a listener is installed.
    pub fn is_subscribed(&self) -> bool {
        self.current().is_some()
    }

    /// Enqueue `MessageReceived(text)` for the installed listener.
    ///
    /// Returns `false` if the message was dropped because nobody is
    /// listening. The send happens under the slot lock so that a message
    /// can never arrive after the subscription that would receive it was
    /// cancelled.
    pub fn deliver(&self, text: String) -> bool {
        let current = self.current();
        match current.as_ref() {
            Some(subscriber) => subscriber
                .actions
                .send(ServerAction::MessageReceived(text))
                .is_ok(),
            None => false,
        }
    }
}

impl Default for SubscriberSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellable listener registration.
///
/// Dropping the handle cancels it. Cancelling a handle that has since been
/// replaced by a newer subscription leaves the newer one installed.
#[derive(Debug)]
pub struct Subscription {
    slot: Weak<SubscriberSlot>,
    token: u64,
}

impl Subscription {
    /// A handle attached to nothing.
    pub fn detached() -> Self {
        Self {
            slot: Weak::new(),
            token: 0,
        }
    }

    /// Whether this registration is still the installed listener.
    pub fn is_active(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| slot.holds(self.token))
    }

    /// Remove the listener now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.clear(self.token);
        }
    }
}

/// Install `actions` as the sole listener for `id`.
///
/// Unknown instances get a detached handle; there is nothing to deliver.
pub fn subscribe(registry: &Registry, id: InstanceId, actions: ActionSender) -> Subscription {
    let Some(slot) = registry.slot(id) else {
        tracing::warn!(%id, "subscribe: no such instance");
        return Subscription::detached();
    };

    let subscription = slot.subscribe(actions);
    tracing::debug!(%id, token = subscription.token, "Subscriber installed");
    subscription
}

/// The `simple.Simple` service for one instance.
#[derive(Debug, Clone)]
pub struct SimpleService {
    slot: Arc<SubscriberSlot>,
}

impl SimpleService {
    /// Create a service delivering into `slot`.
    pub fn new(slot: Arc<SubscriberSlot>) -> Self {
        Self { slot }
    }
}

#[tonic::async_trait]
impl Simple for SimpleService {
    async fn send(&self, request: Request<SimpleMessage>) -> Result<Response<Empty>, Status> {
        let text = request.into_inner().text;
        tracing::debug!("Received SimpleMessage ({} bytes)", text.len());

        if !self.slot.deliver(text) {
            tracing::debug!("No subscriber, message dropped");
        }

        Ok(Response::new(Empty {}))
    }
}
