use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use hadron_common::H256;
use hadron_common::types::{Address, Atom, AtomAction, AtomUpdate};

use crate::config::NodeClientConfig;
use crate::errors::{NodeClientError, RpcRequestError, StreamError};
use crate::rpc_types::{
    AtomEnvelope, AtomSubscriptionUpdate, IncomingFrame, NodeInfo, RpcRequest, RpcRequestId,
    SubmissionStateNotification,
};
use crate::submission::SubmissionState;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle notifications, broadcast to whoever listens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Ready,
    Closed,
}

/// Stream of atom updates for one subscribed address. Ends with an error item
/// when the socket dies; plain channel closure means a clean unsubscribe.
pub type AtomUpdateStream = mpsc::UnboundedReceiver<Result<AtomUpdate, StreamError>>;

/// Last-value-cached submission state. `borrow()` yields the latest state
/// without waiting.
pub type SubmissionStream = watch::Receiver<Result<SubmissionState, StreamError>>;

/// One long-lived websocket JSON-RPC session to one remote node, multiplexing
/// atom subscriptions and atom submissions over subscriber ids.
///
/// The connection counts its active work (subscriptions plus in-flight
/// submissions); when the count sits at zero for the configured grace period
/// the socket is closed. Socket loss is terminal: pending streams error with
/// "Socket closed" and the connection never reconnects by itself.
pub struct NodeConnection {
    config: NodeClientConfig,
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    next_subscriber_id: AtomicU64,
    next_request_id: AtomicU64,
    refcount: watch::Sender<usize>,
    events: broadcast::Sender<ConnectionEvent>,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    open: bool,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    pending: HashMap<u64, (String, oneshot::Sender<Result<Value, RpcRequestError>>)>,
    subscriptions: HashMap<u64, mpsc::UnboundedSender<Result<AtomUpdate, StreamError>>>,
    subscribers_by_address: HashMap<String, u64>,
    submissions: HashMap<u64, watch::Sender<Result<SubmissionState, StreamError>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeConnection {
    pub fn new(config: NodeClientConfig) -> Self {
        let (refcount, _) = watch::channel(0usize);
        let (events, _) = broadcast::channel(16);
        Self {
            config,
            inner: Arc::new(ConnectionInner {
                next_subscriber_id: AtomicU64::new(0),
                next_request_id: AtomicU64::new(1),
                refcount,
                events,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Current active-work count: counted subscriptions plus settled,
    /// non-terminal submissions.
    pub fn active_count(&self) -> usize {
        *self.inner.refcount.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Initiates the socket. Resolves once the socket is ready; errors on
    /// handshake failure or after the configured open timeout, emitting a
    /// `Closed` event in both cases. On success the reader, writer, keepalive
    /// and idle-close tasks are spawned and a `Ready` event goes out.
    pub async fn open(&self) -> Result<(), NodeClientError> {
        if self.inner.lock().open {
            return Err(NodeClientError::AlreadyOpen);
        }
        let url = self.config.node_url.clone();
        let (socket, _response) =
            match timeout(self.config.open_timeout(), connect_async(&url)).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    let _ = self.inner.events.send(ConnectionEvent::Closed);
                    return Err(e.into());
                }
                Err(_elapsed) => {
                    let _ = self.inner.events.send(ConnectionEvent::Closed);
                    return Err(NodeClientError::OpenTimeout(url));
                }
            };

        let (sink, stream) = socket.split();
        let (outbound, outbound_receiver) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(write_loop(
                sink,
                outbound_receiver,
                Arc::downgrade(&self.inner),
            )),
            tokio::spawn(read_loop(stream, Arc::downgrade(&self.inner))),
            tokio::spawn(keepalive_loop(
                self.config.keepalive_interval(),
                Arc::downgrade(&self.inner),
            )),
            tokio::spawn(idle_loop(
                self.inner.refcount.subscribe(),
                self.config.idle_grace(),
                Arc::downgrade(&self.inner),
            )),
        ];
        {
            let mut state = self.inner.lock();
            state.open = true;
            state.outbound = Some(outbound);
            state.tasks = tasks;
        }
        debug!(url = %self.config.node_url, "node connection ready");
        let _ = self.inner.events.send(ConnectionEvent::Ready);
        Ok(())
    }

    /// Subscribes to atoms addressed to `address`.
    ///
    /// `first` marks the bootstrap subscription, which by convention is not
    /// counted as active work: the connection keeps a baseline of one
    /// uncounted subscription, so a lone bootstrap subscriber does not keep
    /// the socket open forever on its own.
    pub async fn subscribe(
        &self,
        address: &Address,
        first: bool,
    ) -> Result<AtomUpdateStream, NodeClientError> {
        let subscriber_id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let key = address.to_string();
        {
            let mut state = self.inner.lock();
            if !state.open {
                return Err(NodeClientError::NotConnected);
            }
            state.subscriptions.insert(subscriber_id, sender);
            state.subscribers_by_address.insert(key.clone(), subscriber_id);
        }
        let params = json!({
            "subscriberId": subscriber_id,
            "query": { "destinationAddress": &key },
        });
        match self.inner.request("Atoms.subscribe", Some(params)).await {
            Ok(_ack) => {
                if !first {
                    self.inner.increment();
                }
                debug!(%address, subscriber_id, "atom subscription installed");
                Ok(receiver)
            }
            Err(e) => {
                let mut state = self.inner.lock();
                state.subscriptions.remove(&subscriber_id);
                state.subscribers_by_address.remove(&key);
                Err(e)
            }
        }
    }

    /// Cancels the subscription bound to `address` and completes its stream.
    /// The active-work count is decremented whether or not the cancel call
    /// itself succeeded.
    pub async fn unsubscribe(&self, address: &Address) -> Result<(), NodeClientError> {
        let key = address.to_string();
        let subscriber_id = self
            .inner
            .lock()
            .subscribers_by_address
            .remove(&key)
            .ok_or(NodeClientError::UnknownSubscription(key))?;
        let result = self
            .inner
            .request("Atoms.cancel", Some(json!({ "subscriberId": subscriber_id })))
            .await;
        self.inner.lock().subscriptions.remove(&subscriber_id);
        self.inner.decrement();
        debug!(%address, subscriber_id, "atom subscription cancelled");
        result.map(|_ack| ())
    }

    /// Unsubscribes every indexed address and forces the active-work count
    /// back to zero.
    pub async fn unsubscribe_all(&self) -> Result<(), NodeClientError> {
        let addresses: Vec<String> = self
            .inner
            .lock()
            .subscribers_by_address
            .keys()
            .cloned()
            .collect();
        for address in addresses {
            let Some(subscriber_id) = self.inner.lock().subscribers_by_address.remove(&address)
            else {
                continue;
            };
            if let Err(e) = self
                .inner
                .request("Atoms.cancel", Some(json!({ "subscriberId": subscriber_id })))
                .await
            {
                debug!(%address, error = %e, "cancel failed while unsubscribing all");
            }
            self.inner.lock().subscriptions.remove(&subscriber_id);
        }
        self.inner.refcount.send_replace(0);
        Ok(())
    }

    /// Submits an atom and returns its lifecycle stream, initialized to
    /// `CREATED`. The RPC call runs in the background: on acceptance the
    /// state advances to `SUBMITTED` and later server pushes drive it to a
    /// terminal state. On call failure or timeout the stream errors and the
    /// whole socket is torn down, taking unrelated subscriptions with it.
    pub async fn submit_atom(&self, atom: &Atom) -> Result<SubmissionStream, NodeClientError> {
        let subscriber_id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(Ok(SubmissionState::Created));
        {
            let mut state = self.inner.lock();
            if !state.open {
                return Err(NodeClientError::NotConnected);
            }
            state.submissions.insert(subscriber_id, sender);
        }
        let envelope = AtomEnvelope {
            hid: atom.hid(),
            action: None,
            atom: atom.clone(),
            processed_data: None,
        };
        let params = json!({ "subscriberId": subscriber_id, "atom": envelope });
        let submit_timeout = self.config.submit_timeout();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let call = timeout(
                submit_timeout,
                inner.request("Universe.submitAtomAndSubscribe", Some(params)),
            )
            .await;
            // The call has settled, one way or the other: count the work.
            inner.increment();
            match call {
                Ok(Ok(_ack)) => {
                    let state = inner.lock();
                    if let Some(sender) = state.submissions.get(&subscriber_id) {
                        let _ = sender.send(Ok(SubmissionState::Submitted));
                    }
                }
                Ok(Err(e)) => {
                    warn!(subscriber_id, error = %e, "atom submission call failed");
                    inner.shutdown();
                }
                Err(_elapsed) => {
                    warn!(subscriber_id, "atom submission timed out");
                    if let Some(sender) = inner.lock().submissions.remove(&subscriber_id) {
                        let _ = sender.send(Err(StreamError::SubmitTimeout));
                    }
                    inner.shutdown();
                }
            }
        });
        Ok(receiver)
    }

    /// Fetches a single atom by content id.
    pub async fn get_atom(&self, id: H256) -> Result<Atom, NodeClientError> {
        let result = self
            .inner
            .request("Atoms.getAtomInfo", Some(json!({ "id": id })))
            .await?;
        let envelope: AtomEnvelope =
            serde_json::from_value(result).map_err(|e| RpcRequestError::SerdeJSONError {
                method: "Atoms.getAtomInfo".to_string(),
                source: e,
            })?;
        let computed = envelope.atom.hid();
        if computed != envelope.hid {
            warn!(claimed = ?envelope.hid, ?computed, "atom hash mismatch on fetch");
        }
        Ok(envelope.atom)
    }

    /// Metadata of the connected node. Doubles as the keepalive payload.
    pub async fn node_info(&self) -> Result<NodeInfo, NodeClientError> {
        let result = self
            .inner
            .request("Network.getSelf", Some(json!({ "id": 0 })))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| {
                RpcRequestError::SerdeJSONError {
                    method: "Network.getSelf".to_string(),
                    source: e,
                }
                .into()
            })
    }

    /// Closes the socket now. Every pending request, subscription and
    /// submission stream errors with "Socket closed" and a `Closed` event is
    /// emitted.
    pub fn close(&self) {
        self.inner.shutdown();
    }
}

impl Drop for NodeConnection {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl ConnectionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn increment(&self) {
        self.refcount.send_modify(|count| *count += 1);
    }

    fn decrement(&self) {
        self.refcount
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// One JSON-RPC round trip: queue the frame, then wait for the response
    /// routed back by the reader task.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, NodeClientError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (response_sender, response) = oneshot::channel();
        {
            let mut state = self.lock();
            if !state.open {
                return Err(NodeClientError::NotConnected);
            }
            let request = RpcRequest::new(id, method, params);
            let frame =
                serde_json::to_string(&request).map_err(|e| RpcRequestError::SerdeJSONError {
                    method: method.to_string(),
                    source: e,
                })?;
            let Some(outbound) = &state.outbound else {
                return Err(NodeClientError::NotConnected);
            };
            outbound
                .send(Message::Text(frame))
                .map_err(|_| NodeClientError::SocketClosed)?;
            state
                .pending
                .insert(id, (method.to_string(), response_sender));
        }
        trace!(method, id, "rpc request sent");
        match response.await {
            Ok(result) => Ok(result?),
            // The pending slot was dropped without an answer: socket death.
            Err(_) => Err(NodeClientError::SocketClosed),
        }
    }

    fn handle_frame(&self, text: &str) {
        let frame = match serde_json::from_str::<IncomingFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "malformed frame, tearing the connection down");
                self.shutdown();
                return;
            }
        };
        match frame {
            IncomingFrame::Success(response) => {
                if let RpcRequestId::Number(id) = response.id {
                    if let Some((_, sender)) = self.lock().pending.remove(&id) {
                        let _ = sender.send(Ok(response.result));
                    } else {
                        trace!(id, "response with no pending request");
                    }
                }
            }
            IncomingFrame::Error(response) => {
                if let RpcRequestId::Number(id) = response.id {
                    if let Some((method, sender)) = self.lock().pending.remove(&id) {
                        let _ = sender.send(Err(RpcRequestError::RPCError {
                            method,
                            message: response.error.message,
                            data: response.error.data,
                        }));
                    }
                }
            }
            IncomingFrame::Notification(notification) => match notification.method.as_str() {
                "Atoms.subscribeUpdate" => self.handle_atom_update(notification.params),
                "AtomSubmissionState.onNext" => self.handle_submission_state(notification.params),
                other => debug!(method = other, "ignoring unknown notification"),
            },
        }
    }

    fn handle_atom_update(&self, params: Value) {
        let update: AtomSubscriptionUpdate = match serde_json::from_value(params) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "malformed atom notification, tearing the connection down");
                self.shutdown();
                return;
            }
        };
        let state = self.lock();
        let Some(sender) = state.subscriptions.get(&update.subscriber_id) else {
            debug!(
                subscriber_id = update.subscriber_id,
                "atoms for an unknown subscriber dropped"
            );
            return;
        };
        for envelope in update.atoms {
            let computed = envelope.atom.hid();
            if computed != envelope.hid {
                // A warning, not a drop: the projection still wants the atom.
                warn!(claimed = ?envelope.hid, ?computed, "atom hash mismatch");
            }
            let update = AtomUpdate {
                action: envelope.action.unwrap_or(AtomAction::Store),
                atom: envelope.atom,
                processed_data: envelope.processed_data,
            };
            let _ = sender.send(Ok(update));
        }
    }

    fn handle_submission_state(&self, params: Value) {
        let notification: SubmissionStateNotification = match serde_json::from_value(params) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "malformed submission notification, tearing the connection down");
                self.shutdown();
                return;
            }
        };
        let value = notification.value;
        let mut state = self.lock();
        if value.is_terminal() {
            // Removing the entry first is what makes the decrement happen
            // exactly once, even if the node repeats the terminal push.
            let Some(sender) = state.submissions.remove(&notification.subscriber_id) else {
                return;
            };
            drop(state);
            self.decrement();
            if value.is_failure() {
                let _ = sender.send(Err(StreamError::Rejected {
                    code: value.to_string(),
                    message: notification.message.unwrap_or_default(),
                }));
            } else {
                let _ = sender.send(Ok(value));
            }
        } else if let Some(sender) = state.submissions.get(&notification.subscriber_id) {
            let _ = sender.send(Ok(value));
        }
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        if !state.open {
            return;
        }
        state.open = false;
        state.outbound = None;
        for (_, (_, sender)) in state.pending.drain() {
            // Dropping the slot resolves the caller with a socket-closed error.
            drop(sender);
        }
        for (_, sender) in state.subscriptions.drain() {
            let _ = sender.send(Err(StreamError::SocketClosed));
        }
        state.subscribers_by_address.clear();
        for (_, sender) in state.submissions.drain() {
            let _ = sender.send(Err(StreamError::SocketClosed));
        }
        let tasks = std::mem::take(&mut state.tasks);
        drop(state);
        for task in tasks {
            task.abort();
        }
        self.refcount.send_replace(0);
        let _ = self.events.send(ConnectionEvent::Closed);
        debug!("node connection closed");
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    inner: Weak<ConnectionInner>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "websocket write failed");
            if let Some(inner) = inner.upgrade() {
                inner.shutdown();
            }
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

async fn read_loop(mut stream: SplitStream<Socket>, inner: Weak<ConnectionInner>) {
    while let Some(frame) = stream.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match frame {
            Ok(Message::Text(text)) => inner.handle_frame(&text),
            Ok(Message::Close(_)) => {
                debug!("peer closed the websocket");
                inner.shutdown();
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "websocket read failed");
                inner.shutdown();
                return;
            }
        }
    }
    if let Some(inner) = inner.upgrade() {
        inner.shutdown();
    }
}

async fn keepalive_loop(interval: Duration, inner: Weak<ConnectionInner>) {
    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick is pointless right after the handshake.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match inner.request("Network.getSelf", Some(json!({ "id": 0 }))).await {
            Ok(_) => trace!("keepalive round trip ok"),
            Err(e) => {
                debug!(error = %e, "keepalive failed");
                return;
            }
        }
    }
}

/// Arms a grace timer whenever the active-work count drops to zero and closes
/// the connection if it is still zero at expiry. Any work appearing during
/// the grace window cancels the close.
async fn idle_loop(
    mut refcount: watch::Receiver<usize>,
    grace: Duration,
    inner: Weak<ConnectionInner>,
) {
    loop {
        if refcount.changed().await.is_err() {
            return;
        }
        while *refcount.borrow_and_update() == 0 {
            debug!("connection idle, arming close timer");
            tokio::select! {
                _ = sleep(grace) => {
                    if *refcount.borrow() == 0 {
                        if let Some(inner) = inner.upgrade() {
                            debug!("closing idle connection");
                            inner.shutdown();
                        }
                        return;
                    }
                }
                changed = refcount.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("idle close re-evaluated");
                    // Loop re-checks the current value: still zero re-arms,
                    // anything else waits for the next drop.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use tokio::net::TcpListener;

    use super::*;
    use hadron_common::types::{Particle, ParticleKind, SpunParticle, TokenRef};

    struct FakeNode {
        url: String,
        push: mpsc::UnboundedSender<String>,
        requests: mpsc::UnboundedReceiver<RpcRequest>,
    }

    impl FakeNode {
        /// Accepts one websocket client, acks every request with `true` and
        /// relays scripted notification frames.
        async fn spawn() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let url = format!("ws://{}", listener.local_addr().expect("addr"));
            let (push, mut push_receiver) = mpsc::unbounded_channel::<String>();
            let (request_sender, requests) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut sink, mut stream) = socket.split();
                loop {
                    tokio::select! {
                        frame = stream.next() => {
                            let Some(Ok(Message::Text(text))) = frame else { return };
                            let Ok(request) = serde_json::from_str::<RpcRequest>(&text) else {
                                continue;
                            };
                            let reply = json!({
                                "id": request.id,
                                "jsonrpc": "2.0",
                                "result": true,
                            })
                            .to_string();
                            let _ = request_sender.send(request);
                            if sink.send(Message::Text(reply)).await.is_err() {
                                return;
                            }
                        }
                        frame = push_receiver.recv() => {
                            let Some(frame) = frame else { return };
                            if sink.send(Message::Text(frame)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
            Self {
                url,
                push,
                requests,
            }
        }

        fn push_notification(&self, method: &str, params: Value) {
            let frame = json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string();
            self.push.send(frame).expect("push notification");
        }
    }

    fn test_config(url: &str) -> NodeClientConfig {
        NodeClientConfig {
            node_url: url.to_string(),
            open_timeout_ms: 1_000,
            submit_timeout_ms: 1_000,
            keepalive_interval_ms: 60_000,
            idle_grace_ms: 200,
        }
    }

    fn test_atom() -> Atom {
        Atom::new(
            7,
            vec![SpunParticle::up(Particle {
                address: Address::new(vec![0x01]),
                amount: BigUint::from(100u8),
                token: TokenRef::new(Address::new(vec![0xee]), "TST"),
                granularity: BigUint::from(1u8),
                kind: ParticleKind::Transfer,
                nonce: 1,
                planck: 0,
            })],
        )
    }

    #[tokio::test]
    async fn subscription_delivers_pushed_atoms() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");

        let address = Address::new(vec![0x01]);
        let mut updates = connection.subscribe(&address, true).await.expect("subscribe");

        let atom = test_atom();
        node.push_notification(
            "Atoms.subscribeUpdate",
            json!({ "subscriberId": 0, "atoms": [{ "hid": atom.hid(), "atom": &atom }] }),
        );

        let update = updates.recv().await.expect("stream alive").expect("no error");
        assert_eq!(update.action, AtomAction::Store);
        assert_eq!(update.atom, atom);
    }

    #[tokio::test]
    async fn hash_mismatch_still_delivers_the_atom() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");

        let address = Address::new(vec![0x01]);
        let mut updates = connection.subscribe(&address, true).await.expect("subscribe");

        let atom = test_atom();
        node.push_notification(
            "Atoms.subscribeUpdate",
            json!({ "subscriberId": 0, "atoms": [{ "hid": H256::zero(), "atom": &atom }] }),
        );

        let update = updates.recv().await.expect("stream alive").expect("no error");
        assert_eq!(update.atom, atom);
    }

    #[tokio::test]
    async fn submission_walks_the_lifecycle_and_releases_its_refcount() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");
        let baseline = connection.active_count();

        let atom = test_atom();
        let mut states = connection.submit_atom(&atom).await.expect("submit");

        states
            .wait_for(|state| *state == Ok(SubmissionState::Submitted))
            .await
            .expect("submitted");
        assert_eq!(connection.active_count(), baseline + 1);

        node.push_notification(
            "AtomSubmissionState.onNext",
            json!({ "subscriberId": 0, "value": "SUBMITTING" }),
        );
        states
            .wait_for(|state| *state == Ok(SubmissionState::Submitting))
            .await
            .expect("submitting");

        node.push_notification(
            "AtomSubmissionState.onNext",
            json!({ "subscriberId": 0, "value": "STORED" }),
        );
        states
            .wait_for(|state| *state == Ok(SubmissionState::Stored))
            .await
            .expect("stored");
        assert_eq!(connection.active_count(), baseline);
    }

    #[tokio::test]
    async fn rejected_submission_surfaces_code_and_message() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");

        let mut states = connection
            .submit_atom(&test_atom())
            .await
            .expect("submit");
        states
            .wait_for(|state| *state == Ok(SubmissionState::Submitted))
            .await
            .expect("submitted");

        node.push_notification(
            "AtomSubmissionState.onNext",
            json!({ "subscriberId": 0, "value": "COLLISION", "message": "conflicting consumable" }),
        );
        let error = states
            .wait_for(|state| state.is_err())
            .await
            .expect("terminal")
            .clone()
            .expect_err("failure");
        assert_eq!(error.to_string(), "COLLISION: conflicting consumable");
        assert_eq!(connection.active_count(), 0);
    }

    #[tokio::test]
    async fn idle_connection_closes_after_the_grace_period() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");
        let mut events = connection.subscribe_events();

        let address = Address::new(vec![0x01]);
        let _updates = connection.subscribe(&address, false).await.expect("subscribe");
        assert_eq!(connection.active_count(), 1);
        connection.unsubscribe(&address).await.expect("unsubscribe");
        assert_eq!(connection.active_count(), 0);

        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("close within the grace period")
            .expect("event");
        assert_eq!(event, ConnectionEvent::Closed);
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn new_work_during_the_grace_window_cancels_the_close() {
        let node = FakeNode::spawn().await;
        let mut config = test_config(&node.url);
        config.idle_grace_ms = 500;
        let connection = NodeConnection::new(config);
        connection.open().await.expect("open");
        let mut events = connection.subscribe_events();

        let first = Address::new(vec![0x01]);
        connection.subscribe(&first, false).await.expect("subscribe");
        connection.unsubscribe(&first).await.expect("unsubscribe");

        sleep(Duration::from_millis(100)).await;
        let second = Address::new(vec![0x02]);
        let _updates = connection.subscribe(&second, false).await.expect("resubscribe");

        sleep(Duration::from_millis(700)).await;
        assert!(connection.is_open());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_errors_every_pending_stream() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");
        let mut events = connection.subscribe_events();

        let address = Address::new(vec![0x01]);
        let mut updates = connection.subscribe(&address, true).await.expect("subscribe");
        connection.close();

        assert_eq!(
            updates.recv().await,
            Some(Err(StreamError::SocketClosed))
        );
        assert_eq!(updates.recv().await, None);
        assert_eq!(events.recv().await, Ok(ConnectionEvent::Closed));
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn open_times_out_against_a_silent_peer() {
        // A listener that never completes the websocket handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("addr"));
        let mut config = test_config(&url);
        config.open_timeout_ms = 200;

        let connection = NodeConnection::new(config);
        let mut events = connection.subscribe_events();
        let result = connection.open().await;
        assert!(matches!(result, Err(NodeClientError::OpenTimeout(_))));
        assert_eq!(events.recv().await, Ok(ConnectionEvent::Closed));
    }

    #[tokio::test]
    async fn keepalive_pings_the_node() {
        let mut node = FakeNode::spawn().await;
        let mut config = test_config(&node.url);
        config.keepalive_interval_ms = 100;
        let connection = NodeConnection::new(config);
        connection.open().await.expect("open");

        sleep(Duration::from_millis(350)).await;
        let mut seen_keepalive = false;
        while let Ok(request) = node.requests.try_recv() {
            if request.method == "Network.getSelf" {
                seen_keepalive = true;
            }
        }
        assert!(seen_keepalive);
    }

    #[tokio::test]
    async fn unsubscribe_all_forces_the_count_to_zero() {
        let node = FakeNode::spawn().await;
        let connection = NodeConnection::new(test_config(&node.url));
        connection.open().await.expect("open");

        let first = Address::new(vec![0x01]);
        let second = Address::new(vec![0x02]);
        connection.subscribe(&first, false).await.expect("subscribe");
        connection.subscribe(&second, false).await.expect("subscribe");
        assert_eq!(connection.active_count(), 2);

        connection.unsubscribe_all().await.expect("unsubscribe all");
        assert_eq!(connection.active_count(), 0);
    }
}
