//! Server-sent events push channel
//!
//! Every open `GET /sse` connection is a streaming client registered in the
//! [`NotificationHub`]. Broadcasts fan out to all registered clients; a client
//! whose connection is gone is removed on the first failed write, or as soon
//! as its stream is dropped.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{stream, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::mcp::rpc::encode_notification;
use crate::AppState;

pub type ClientId = u64;

#[derive(Default)]
pub struct NotificationHub {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Registration handle for one streaming client. Dropping it removes the
/// client from the hub.
pub struct StreamClient {
    id: ClientId,
    receiver: mpsc::UnboundedReceiver<String>,
    hub: Arc<NotificationHub>,
}

impl StreamClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next broadcast payload, or `None` once the client has been removed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if self.hub.clients.lock().remove(&self.id).is_some() {
            info!(client_id = self.id, "streaming client disconnected");
        }
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new client. After [`close_all`](Self::close_all) the
    /// returned client is already removed and yields nothing.
    pub fn subscribe(self: &Arc<Self>) -> StreamClient {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut clients = self.clients.lock();
        if !self.closed.load(Ordering::Acquire) {
            clients.insert(id, sender);
            info!(client_id = id, clients = clients.len(), "streaming client connected");
        }

        StreamClient {
            id,
            receiver,
            hub: Arc::clone(self),
        }
    }

    /// Sends a raw JSON payload to every connected client and returns how many
    /// received it.
    pub fn send_notification(&self, json: &str) -> usize {
        let mut clients = self.clients.lock();
        clients.retain(|id, sender| {
            let delivered = sender.send(json.to_string()).is_ok();
            if !delivered {
                debug!(client_id = *id, "dropping streaming client after failed write");
            }
            delivered
        });
        clients.len()
    }

    /// Broadcasts a JSON-RPC notification envelope.
    pub fn notify(&self, method: &str, params: &Value) -> usize {
        self.send_notification(&encode_notification(method, params))
    }

    /// Disconnects every client and refuses new ones.
    pub fn close_all(&self) {
        let mut clients = self.clients.lock();
        self.closed.store(true, Ordering::Release);
        let closed = clients.len();
        clients.clear();
        info!(clients = closed, "closed all streaming clients");
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

pub async fn sse_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client = state.notifications.subscribe();

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });
    let updates = stream::unfold(client, |mut client| async move {
        let payload = client.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(payload)), client))
    });

    Sse::new(connected.chain(updates))
        .keep_alive(KeepAlive::new().interval(state.sse_keepalive))
}
