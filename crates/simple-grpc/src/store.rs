//! Serialized action execution.
//!
//! A [`Store`] owns one reducer state and the receiving end of its action
//! channel. Actions are applied strictly one at a time in the order they
//! were enqueued; the commands each transition returns are handed to an
//! [`Effects`] executor, which spawns any I/O and sends the completion back
//! into the same channel. Every new state is published on a `watch`
//! channel for whoever renders it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use simple_core::{
    ClientAction, ClientCommand, ClientState, InstanceId, Reducer, ServerAction, ServerCommand,
    ServerState,
};
use tokio::sync::{mpsc, watch};

use crate::bridge::Subscription;
use crate::environment::{ClientEnvironment, ServerEnvironment};

/// Runs the commands produced by reducer `R`.
pub trait Effects<R: Reducer> {
    /// Execute `command`. Completions go back through `actions`.
    fn execute(&mut self, command: R::Command, actions: &mpsc::UnboundedSender<R::Action>);
}

/// Owner of a reducer state and its action queue.
pub struct Store<R: Reducer, E> {
    state: R,
    effects: E,
    actions_tx: mpsc::UnboundedSender<R::Action>,
    actions_rx: mpsc::UnboundedReceiver<R::Action>,
    published: watch::Sender<R>,
}

impl<R: Reducer + fmt::Debug, E> fmt::Debug for Store<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<R, E> Store<R, E>
where
    R: Reducer + Clone,
    R::Action: fmt::Debug,
    E: Effects<R>,
{
    /// Create a store starting from `state`.
    pub fn new(state: R, effects: E) -> Self {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (published, _) = watch::channel(state.clone());
        Self {
            state,
            effects,
            actions_tx,
            actions_rx,
            published,
        }
    }

    /// The current state.
    pub fn state(&self) -> &R {
        &self.state
    }

    /// A handle for dispatching actions and observing state.
    pub fn handle(&self) -> StoreHandle<R> {
        StoreHandle {
            actions: self.actions_tx.clone(),
            state: self.published.subscribe(),
        }
    }

    /// Apply one action immediately and execute the resulting commands.
    pub fn apply(&mut self, action: R::Action) {
        tracing::trace!(?action, "Applying action");
        let commands = self.state.reduce(action);
        self.published.send_replace(self.state.clone());
        for command in commands {
            self.effects.execute(command, &self.actions_tx);
        }
    }

    /// Wait for the next queued action without applying it.
    pub async fn next_action(&mut self) -> Option<R::Action> {
        self.actions_rx.recv().await
    }

    /// Apply queued actions until `shutdown` resolves. Returns the final state.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> R {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                action = self.actions_rx.recv() => match action {
                    Some(action) => self.apply(action),
                    None => break,
                },
            }
        }
        self.state
    }
}

/// Cloneable access to a running store.
pub struct StoreHandle<R: Reducer> {
    actions: mpsc::UnboundedSender<R::Action>,
    state: watch::Receiver<R>,
}

impl<R: Reducer> Clone for StoreHandle<R> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            state: self.state.clone(),
        }
    }
}

impl<R: Reducer> fmt::Debug for StoreHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}

impl<R: Reducer + Clone> StoreHandle<R> {
    /// Enqueue an action. Returns `false` if the store is gone.
    pub fn dispatch(&self, action: R::Action) -> bool {
        self.actions.send(action).is_ok()
    }

    /// The most recently published state.
    pub fn state(&self) -> R {
        self.state.borrow().clone()
    }

    /// Wait for the next published state.
    pub async fn changed(&mut self) -> Option<R> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&R) -> bool) -> Option<R> {
        let state = self.state.wait_for(predicate).await.ok()?;
        Some(R::clone(&state))
    }
}

/// Executes [`ServerCommand`]s for one instance.
///
/// The instance is claimed from the moment a start is issued until a stop
/// succeeds or the start fails. `Start` is dropped while it is claimed, so
/// a second request made before the first completes does not reach the
/// registry.
pub struct ServerEffects {
    id: InstanceId,
    env: Arc<dyn ServerEnvironment>,
    subscription: Option<Subscription>,
    claimed: Arc<AtomicBool>,
}

impl fmt::Debug for ServerEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEffects")
            .field("id", &self.id)
            .field("subscription", &self.subscription)
            .field("claimed", &self.claimed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ServerEffects {
    /// Create an executor for instance `id`.
    pub fn new(id: InstanceId, env: Arc<dyn ServerEnvironment>) -> Self {
        Self {
            id,
            env,
            subscription: None,
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Effects<ServerState> for ServerEffects {
    fn execute(&mut self, command: ServerCommand, actions: &mpsc::UnboundedSender<ServerAction>) {
        let id = self.id;
        match command {
            ServerCommand::Start => {
                if self.claimed.swap(true, Ordering::SeqCst) {
                    tracing::debug!(%id, "Start already in progress");
                    return;
                }
                let env = Arc::clone(&self.env);
                let claimed = Arc::clone(&self.claimed);
                let actions = actions.clone();
                tokio::spawn(async move {
                    let result = env.start(id).await;
                    if result.is_err() {
                        claimed.store(false, Ordering::SeqCst);
                    }
                    let _ = actions.send(ServerAction::StartCompleted(result));
                });
            }
            ServerCommand::Stop => {
                let env = Arc::clone(&self.env);
                let claimed = Arc::clone(&self.claimed);
                let actions = actions.clone();
                tokio::spawn(async move {
                    let result = env.stop(id).await;
                    if result.is_ok() {
                        claimed.store(false, Ordering::SeqCst);
                    }
                    let _ = actions.send(ServerAction::StopCompleted(result));
                });
            }
            ServerCommand::Send { text } => {
                let env = Arc::clone(&self.env);
                let actions = actions.clone();
                tokio::spawn(async move {
                    let result = env.send(id, text).await;
                    let _ = actions.send(ServerAction::SendCompleted(result));
                });
            }
            ServerCommand::Subscribe => {
                let subscription = self.env.subscribe(id, actions.clone());
                if subscription.is_active() {
                    let _ = actions.send(ServerAction::SubscriptionEstablished);
                } else {
                    tracing::warn!(%id, "No listener installed");
                }
                // The new handle is installed before the old one is dropped.
                self.subscription = Some(subscription);
            }
            ServerCommand::Unsubscribe => {
                self.subscription = None;
            }
            ServerCommand::Report(kind) => {
                tracing::warn!(%id, "{}", kind);
            }
        }
    }
}

/// Executes [`ClientCommand`]s.
pub struct ClientEffects {
    env: Arc<dyn ClientEnvironment>,
}

impl fmt::Debug for ClientEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEffects").finish_non_exhaustive()
    }
}

impl ClientEffects {
    /// Create an executor over `env`.
    pub fn new(env: Arc<dyn ClientEnvironment>) -> Self {
        Self { env }
    }
}

impl Effects<ClientState> for ClientEffects {
    fn execute(&mut self, command: ClientCommand, actions: &mpsc::UnboundedSender<ClientAction>) {
        match command {
            ClientCommand::Send { port, text } => {
                let env = Arc::clone(&self.env);
                let actions = actions.clone();
                tokio::spawn(async move {
                    let result = env.send(port, text).await;
                    let _ = actions.send(ClientAction::SendCompleted(result));
                });
            }
            ClientCommand::Report(kind) => {
                tracing::warn!("{}", kind);
            }
        }
    }
}

/// Store for one server instance.
pub type ServerStore = Store<ServerState, ServerEffects>;

/// Store for a client.
pub type ClientStore = Store<ClientState, ClientEffects>;

impl Store<ServerState, ServerEffects> {
    /// A stopped server store with a fresh instance id.
    pub fn server(env: Arc<dyn ServerEnvironment>) -> Self {
        Self::server_with_id(InstanceId::new(), env)
    }

    /// A stopped server store for instance `id`.
    pub fn server_with_id(id: InstanceId, env: Arc<dyn ServerEnvironment>) -> Self {
        Self::new(ServerState::new(), ServerEffects::new(id, env))
    }

    /// The instance this store drives.
    pub fn instance_id(&self) -> InstanceId {
        self.effects.id
    }
}

impl Store<ClientState, ClientEffects> {
    /// A client store with no target.
    pub fn client(env: Arc<dyn ClientEnvironment>) -> Self {
        Self::new(ClientState::new(), ClientEffects::new(env))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use simple_core::ErrorKind;
    use tokio::time::timeout;

    use super::*;
    use crate::bridge::{ActionSender, SubscriberSlot};

    /// Replays canned results, like the mock environment a UI preview uses.
    struct MockServer {
        start: Result<String, ErrorKind>,
        stop: Result<InstanceId, ErrorKind>,
        send: Result<(), ErrorKind>,
        /// `None` behaves like an instance the registry does not know
        slot: Option<Arc<SubscriberSlot>>,
        starts: AtomicUsize,
        subscribes: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl MockServer {
        fn ok() -> Self {
            Self {
                start: Ok("mocked_address".to_string()),
                stop: Ok(InstanceId::from_raw(4711)),
                send: Ok(()),
                slot: Some(Arc::new(SubscriberSlot::new())),
                starts: AtomicUsize::new(0),
                subscribes: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ServerEnvironment for MockServer {
        async fn start(&self, _id: InstanceId) -> Result<String, ErrorKind> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.start.clone()
        }

        async fn stop(&self, _id: InstanceId) -> Result<InstanceId, ErrorKind> {
            self.stop
        }

        async fn send(&self, _id: InstanceId, text: String) -> Result<(), ErrorKind> {
            self.sent.lock().unwrap().push(text);
            self.send
        }

        fn subscribe(&self, _id: InstanceId, actions: ActionSender) -> Subscription {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            match &self.slot {
                Some(slot) => slot.subscribe(actions),
                None => Subscription::detached(),
            }
        }
    }

    struct MockClient {
        result: Result<(), ErrorKind>,
        sent: Mutex<Vec<(u16, String)>>,
    }

    #[async_trait]
    impl ClientEnvironment for MockClient {
        async fn send(&self, port: u16, text: String) -> Result<(), ErrorKind> {
            self.sent.lock().unwrap().push((port, text));
            self.result
        }
    }

    async fn receive<R, E>(store: &mut Store<R, E>) -> R::Action
    where
        R: Reducer + Clone,
        R::Action: fmt::Debug,
        E: Effects<R>,
    {
        timeout(Duration::from_secs(5), store.next_action())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_server_start() {
        let env = Arc::new(MockServer::ok());
        let mut store = ServerStore::server(env.clone());

        store.apply(ServerAction::StartRequested);
        let action = receive(&mut store).await;
        assert_eq!(
            action,
            ServerAction::StartCompleted(Ok("mocked_address".into()))
        );

        store.apply(action);
        assert!(store.state().is_running);
        assert_eq!(store.state().address.as_deref(), Some("mocked_address"));
        assert_eq!(receive(&mut store).await, ServerAction::SubscriptionEstablished);
        assert_eq!(env.subscribes.load(Ordering::SeqCst), 1);
    }

    async fn assert_idle<R, E>(store: &mut Store<R, E>)
    where
        R: Reducer + Clone,
        R::Action: fmt::Debug,
        E: Effects<R>,
    {
        let next = timeout(Duration::from_millis(200), store.next_action()).await;
        assert!(next.is_err(), "unexpected action: {:?}", next);
    }

    #[tokio::test]
    async fn test_server_start_unknown_instance_not_established() {
        let env = Arc::new(MockServer {
            slot: None,
            ..MockServer::ok()
        });
        let mut store = ServerStore::server(env.clone());

        store.apply(ServerAction::StartCompleted(Ok("a".into())));
        assert_eq!(env.subscribes.load(Ordering::SeqCst), 1);
        assert_idle(&mut store).await;
    }

    #[tokio::test]
    async fn test_server_start_while_starting_is_dropped() {
        let env = Arc::new(MockServer::ok());
        let mut store = ServerStore::server(env.clone());

        store.apply(ServerAction::StartRequested);
        store.apply(ServerAction::StartRequested);

        let action = receive(&mut store).await;
        assert_eq!(
            action,
            ServerAction::StartCompleted(Ok("mocked_address".into()))
        );
        store.apply(action);
        assert_eq!(receive(&mut store).await, ServerAction::SubscriptionEstablished);
        assert_idle(&mut store).await;

        assert_eq!(env.starts.load(Ordering::SeqCst), 1);
        assert_eq!(store.state().error, None);
    }

    #[tokio::test]
    async fn test_server_restart_after_failed_start() {
        let env = Arc::new(MockServer {
            start: Err(ErrorKind::CouldNotStart),
            ..MockServer::ok()
        });
        let mut store = ServerStore::server(env.clone());

        for _ in 0..2 {
            store.apply(ServerAction::StartRequested);
            let action = receive(&mut store).await;
            store.apply(action);
        }
        assert_eq!(env.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_restart_after_stop() {
        let env = Arc::new(MockServer::ok());
        let mut store = ServerStore::server(env.clone());

        store.apply(ServerAction::StartRequested);
        let action = receive(&mut store).await;
        store.apply(action);
        receive(&mut store).await;

        store.apply(ServerAction::StopRequested);
        let action = receive(&mut store).await;
        store.apply(action);
        assert!(!store.state().is_running);

        store.apply(ServerAction::StartRequested);
        assert_eq!(
            receive(&mut store).await,
            ServerAction::StartCompleted(Ok("mocked_address".into()))
        );
        assert_eq!(env.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_start_fail() {
        let env = Arc::new(MockServer {
            start: Err(ErrorKind::CouldNotStart),
            ..MockServer::ok()
        });
        let mut store = ServerStore::server(env.clone());

        store.apply(ServerAction::StartRequested);
        let action = receive(&mut store).await;
        assert_eq!(action, ServerAction::StartCompleted(Err(ErrorKind::CouldNotStart)));

        store.apply(action);
        assert!(!store.state().is_running);
        assert_eq!(store.state().error, Some(ErrorKind::CouldNotStart));
        assert_eq!(env.subscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_stopped() {
        let mut store = ServerStore::server(Arc::new(MockServer::ok()));
        store.apply(ServerAction::StartCompleted(Ok("a".into())));
        assert_eq!(receive(&mut store).await, ServerAction::SubscriptionEstablished);

        store.apply(ServerAction::StopRequested);
        let action = receive(&mut store).await;
        assert_eq!(
            action,
            ServerAction::StopCompleted(Ok(InstanceId::from_raw(4711)))
        );

        store.apply(action);
        assert!(!store.state().is_running);
        assert_eq!(store.state().address, None);
    }

    #[tokio::test]
    async fn test_server_stop_fail() {
        let mut store = ServerStore::server(Arc::new(MockServer {
            stop: Err(ErrorKind::CouldNotStop),
            ..MockServer::ok()
        }));
        store.apply(ServerAction::StartCompleted(Ok("a".into())));
        receive(&mut store).await;

        store.apply(ServerAction::StopRequested);
        let action = receive(&mut store).await;
        store.apply(action);

        assert!(store.state().is_running);
        assert_eq!(store.state().error, Some(ErrorKind::CouldNotStop));
    }

    #[tokio::test]
    async fn test_server_send() {
        let env = Arc::new(MockServer {
            send: Err(ErrorKind::CouldNotSend),
            ..MockServer::ok()
        });
        let mut store = ServerStore::server(env.clone());
        store.apply(ServerAction::StartCompleted(Ok("a".into())));
        receive(&mut store).await;

        store.apply(ServerAction::MessageEdited("hello".into()));
        store.apply(ServerAction::SendRequested);
        assert_eq!(store.state().outbound_message, "");

        let action = receive(&mut store).await;
        assert_eq!(action, ServerAction::SendCompleted(Err(ErrorKind::CouldNotSend)));
        store.apply(action);

        assert_eq!(store.state().error, Some(ErrorKind::CouldNotSend));
        assert_eq!(*env.sent.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_observes_run_loop() {
        let store = ServerStore::server(Arc::new(MockServer::ok()));
        let mut handle = store.handle();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(store.run(async move {
            let _ = stop_rx.await;
        }));

        assert!(handle.dispatch(ServerAction::StartRequested));
        let state = timeout(Duration::from_secs(5), handle.wait_for(|s| s.is_running))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.address.as_deref(), Some("mocked_address"));

        handle.dispatch(ServerAction::MessageReceived("hi".into()));
        let state = timeout(
            Duration::from_secs(5),
            handle.wait_for(|s| s.pending_alert.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(state.pending_alert.unwrap().body, "hi");

        stop_tx.send(()).unwrap();
        let final_state = running.await.unwrap();
        assert!(final_state.is_running);
    }

    #[tokio::test]
    async fn test_client_send() {
        let env = Arc::new(MockClient {
            result: Ok(()),
            sent: Mutex::new(Vec::new()),
        });
        let mut store = ClientStore::client(env.clone());

        store.apply(ClientAction::PortEdited("4711".into()));
        store.apply(ClientAction::MessageEdited("hello".into()));
        store.apply(ClientAction::SendRequested);

        let action = receive(&mut store).await;
        assert_eq!(action, ClientAction::SendCompleted(Ok(())));
        store.apply(action);

        assert_eq!(store.state().outbound_message, "");
        assert_eq!(store.state().error, None);
        assert_eq!(
            *env.sent.lock().unwrap(),
            vec![(4711, "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_client_without_port_never_dials() {
        let env = Arc::new(MockClient {
            result: Ok(()),
            sent: Mutex::new(Vec::new()),
        });
        let mut store = ClientStore::client(env.clone());

        store.apply(ClientAction::MessageEdited("hello".into()));
        store.apply(ClientAction::SendRequested);

        assert_eq!(store.state().error, Some(ErrorKind::CouldNotSend));
        assert!(env.sent.lock().unwrap().is_empty());
    }
}
