//! Messaging between execution contexts.
//!
//! Two shapes: a broadcast bus for fire-and-forget notifications and a
//! request/response bus whose every call is wrapped in an independent timer.
//! Delivery is at-least-once and possibly delayed; a missing reply resolves to
//! `None` instead of hanging.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use listing_core_types::{ContextId, CoreError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no context registered as {0}")]
    NoRoute(String),

    #[error("channel to {0} closed")]
    Closed(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl From<BusError> for CoreError {
    fn from(err: BusError) -> Self {
        CoreError::new(err.to_string())
    }
}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus suitable for unit tests and single-process runs.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|err| BusError::Publish(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Awaits `fut` under an independent timer; `None` means "no response".
pub async fn with_timeout<F>(fut: F, limit: Duration) -> Option<F::Output>
where
    F: Future,
{
    tokio::time::timeout(limit, fut).await.ok()
}

/// A request delivered to a registered context, carrying its reply slot.
pub struct Envelope<Req, Resp> {
    pub from: ContextId,
    pub body: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Envelope<Req, Resp> {
    /// Sends the reply; `false` when the requester already gave up.
    pub fn reply(self, response: Resp) -> bool {
        self.reply.send(response).is_ok()
    }

    pub fn split(self) -> (ContextId, Req, Responder<Resp>) {
        (self.from, self.body, Responder { inner: self.reply })
    }
}

/// Reply half of an [`Envelope`], detached from its body.
pub struct Responder<Resp> {
    inner: oneshot::Sender<Resp>,
}

impl<Resp> Responder<Resp> {
    pub fn send(self, response: Resp) -> bool {
        self.inner.send(response).is_ok()
    }
}

/// Request/response routing keyed by context id.
pub struct RequestBus<Req, Resp> {
    routes: DashMap<ContextId, mpsc::Sender<Envelope<Req, Resp>>>,
}

impl<Req, Resp> Default for RequestBus<Req, Resp> {
    fn default() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }
}

impl<Req, Resp> RequestBus<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `context` as a responder; replaces a previous registration.
    pub fn register(&self, context: ContextId, capacity: usize) -> mpsc::Receiver<Envelope<Req, Resp>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.routes.insert(context.clone(), tx).is_some() {
            debug!(context = %context, "replaced existing bus registration");
        }
        rx
    }

    pub fn unregister(&self, context: &ContextId) {
        self.routes.remove(context);
    }

    pub fn is_registered(&self, context: &ContextId) -> bool {
        self.routes
            .get(context)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// First registered context other than `except` (discovery of a peer).
    pub fn any_peer(&self, except: &ContextId) -> Option<ContextId> {
        self.routes
            .iter()
            .filter(|entry| entry.key() != except && !entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .next()
    }

    /// Sends `body` to `to` and waits at most `limit` for the reply.
    ///
    /// `Ok(None)` is a timeout or a dropped reply; both mean "no response".
    pub async fn request(
        &self,
        from: &ContextId,
        to: &ContextId,
        body: Req,
        limit: Duration,
    ) -> Result<Option<Resp>, BusError> {
        let sender = self
            .routes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BusError::NoRoute(to.0.clone()))?;
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope {
            from: from.clone(),
            body,
            reply,
        };
        match with_timeout(sender.send(envelope), limit).await {
            Some(Ok(())) => {}
            Some(Err(_)) => {
                self.routes.remove(to);
                return Err(BusError::Closed(to.0.clone()));
            }
            None => {
                warn!(to = %to, "request not accepted before timeout");
                return Ok(None);
            }
        }
        match with_timeout(rx, limit).await {
            Some(Ok(response)) => Ok(Some(response)),
            Some(Err(_)) => {
                debug!(to = %to, "responder dropped the reply");
                Ok(None)
            }
            None => {
                warn!(to = %to, timeout_ms = limit.as_millis() as u64, "no response before timeout");
                Ok(None)
            }
        }
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription
/// so callers can await events without handling broadcast semantics directly.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            if tx.send(ev).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_gets_reply() {
        let bus: Arc<RequestBus<u32, u32>> = RequestBus::new();
        let worker = ContextId("inner".into());
        let mut inbox = bus.register(worker.clone(), 4);
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let doubled = envelope.body * 2;
                envelope.reply(doubled);
            }
        });
        let reply = bus
            .request(&ContextId("outer".into()), &worker, 21, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Some(42));
    }

    #[tokio::test]
    async fn silent_responder_resolves_to_none() {
        let bus: Arc<RequestBus<u32, u32>> = RequestBus::new();
        let worker = ContextId("inner".into());
        let mut inbox = bus.register(worker.clone(), 4);
        let hold = tokio::spawn(async move {
            let envelope = inbox.recv().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(envelope);
        });
        let reply = bus
            .request(&ContextId("outer".into()), &worker, 1, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(reply, None);
        hold.abort();
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let bus: Arc<RequestBus<u32, u32>> = RequestBus::new();
        let err = bus
            .request(
                &ContextId("outer".into()),
                &ContextId("ghost".into()),
                1,
                Duration::from_millis(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoRoute("ghost".into()));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let bus = InMemoryBus::<String>::new(8);
        let mut rx = to_mpsc(bus.clone(), 8);
        tokio::task::yield_now().await;
        bus.publish("builder.done".to_string()).await.unwrap();
        let got = with_timeout(rx.recv(), Duration::from_secs(1)).await.flatten();
        assert_eq!(got.as_deref(), Some("builder.done"));
    }
}
