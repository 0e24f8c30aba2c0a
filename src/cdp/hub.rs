//! Event broadcast hub
//!
//! Fans inbound event notifications out to any number of independent
//! subscribers. Each method name gets its own bounded broadcast channel; a
//! subscriber that falls behind loses the oldest events (logged as lag) and never
//! slows the reader task or other subscribers.

use super::types::{Event, EventEnvelope};
use futures::stream::BoxStream;
use futures::{future, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{ready, Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, instrument, warn};

/// Which sessions an event stream accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFilter {
    /// Events from every session
    Any,
    /// Only events without a `sessionId` (the top-level session)
    Root,
    /// Only events routed to this `sessionId`
    Session(String),
}

impl SessionFilter {
    fn accepts(&self, event: &EventEnvelope) -> bool {
        match self {
            SessionFilter::Any => true,
            SessionFilter::Root => event.session_id.is_none(),
            SessionFilter::Session(id) => event.session_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl From<Option<&str>> for SessionFilter {
    fn from(session_id: Option<&str>) -> Self {
        match session_id {
            Some(id) => SessionFilter::Session(id.to_string()),
            None => SessionFilter::Root,
        }
    }
}

#[derive(Debug)]
struct HubState {
    /// Per-method channels
    channels: HashMap<String, broadcast::Sender<EventEnvelope>>,
    /// Channel receiving every event; dropped on close
    all: Option<broadcast::Sender<EventEnvelope>>,
    closed: bool,
}

/// Multicast hub for inbound events
#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    state: RwLock<HubState>,
}

impl EventHub {
    /// Create a new hub buffering up to `capacity` events per subscriber and method
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);

        Self {
            capacity,
            state: RwLock::new(HubState {
                channels: HashMap::new(),
                all: Some(all),
                closed: false,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of subscribers the event was queued for. Events with no
    /// subscriber are discarded.
    #[instrument(level = "trace", skip(self, event), fields(method = %event.method))]
    pub fn publish(&self, event: EventEnvelope) -> usize {
        let mut delivered = 0;
        let mut stale = false;

        {
            let state = self.read();
            if state.closed {
                debug!("Hub closed, dropping event {}", event.method);
                return 0;
            }

            if let Some(tx) = state.channels.get(&event.method) {
                match tx.send(event.clone()) {
                    Ok(count) => delivered += count,
                    Err(_) => stale = true,
                }
            }

            if let Some(all) = &state.all {
                if let Ok(count) = all.send(event.clone()) {
                    delivered += count;
                }
            }
        }

        if stale {
            self.prune(&event.method);
        }

        if delivered == 0 {
            debug!("No subscriber for event {}", event.method);
        }
        delivered
    }

    /// Subscribe to every event named `method`, from any session
    pub fn subscribe(&self, method: &str) -> EventStream {
        self.subscribe_filtered(method, SessionFilter::Any)
    }

    /// Subscribe to events named `method` scoped to one session.
    ///
    /// `None` selects the top-level session (events without a `sessionId`).
    pub fn subscribe_session(&self, method: &str, session_id: Option<&str>) -> EventStream {
        self.subscribe_filtered(method, SessionFilter::from(session_id))
    }

    /// Subscribe to events named `method` with an explicit session filter
    pub fn subscribe_filtered(&self, method: &str, filter: SessionFilter) -> EventStream {
        let mut state = self.write();

        let receiver = if state.closed {
            closed_receiver()
        } else {
            let capacity = self.capacity;
            state
                .channels
                .entry(method.to_string())
                .or_insert_with(|| broadcast::channel(capacity).0)
                .subscribe()
        };

        debug!("New subscriber for {} ({:?})", method, filter);
        EventStream::new(receiver, method.to_string(), filter)
    }

    /// Subscribe to every event regardless of method or session
    pub fn subscribe_all(&self) -> EventStream {
        let state = self.read();
        let receiver = match &state.all {
            Some(all) if !state.closed => all.subscribe(),
            _ => closed_receiver(),
        };

        EventStream::new(receiver, "*".to_string(), SessionFilter::Any)
    }

    /// Per-subscriber buffer size
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscriptions for `method`
    pub fn subscriber_count(&self, method: &str) -> usize {
        self.read()
            .channels
            .get(method)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// End every subscription. Events already queued are still delivered.
    pub fn close(&self) {
        let mut state = self.write();
        if state.closed {
            return;
        }

        state.closed = true;
        let channels = state.channels.len();
        state.channels.clear();
        state.all = None;
        info!("Event hub closed ({} event channels)", channels);
    }

    /// Whether the hub has been closed
    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    fn prune(&self, method: &str) {
        let mut state = self.write();
        let unused = state
            .channels
            .get(method)
            .is_some_and(|tx| tx.receiver_count() == 0);
        if unused {
            state.channels.remove(method);
            debug!("Removed channel for {} (no subscribers left)", method);
        }
    }
}

fn closed_receiver() -> broadcast::Receiver<EventEnvelope> {
    let (_, receiver) = broadcast::channel(1);
    receiver
}

/// Live, independent stream of raw events for one method
pub struct EventStream {
    inner: BroadcastStream<EventEnvelope>,
    method: String,
    filter: SessionFilter,
    dropped: u64,
}

impl EventStream {
    fn new(receiver: broadcast::Receiver<EventEnvelope>, method: String, filter: SessionFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            method,
            filter,
            dropped: 0,
        }
    }

    /// Method this stream follows (`*` for all events)
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Events lost to overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Decode each event's params into `T`; undecodable events are logged and skipped
    pub fn typed<T: DeserializeOwned>(self) -> TypedEventStream<T> {
        TypedEventStream {
            inner: self,
            _marker: PhantomData,
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("method", &self.method)
            .field("filter", &self.filter)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl Stream for EventStream {
    type Item = EventEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(self.inner.poll_next_unpin(cx)) {
                None => return Poll::Ready(None),
                Some(Ok(event)) => {
                    if self.filter.accepts(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(
                        "Subscriber for {} lagged, dropped {} oldest events",
                        self.method, skipped
                    );
                    self.dropped += skipped;
                }
            }
        }
    }
}

/// Event stream decoding params into a concrete type
pub struct TypedEventStream<T> {
    inner: EventStream,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedEventStream<T> {
    /// Underlying raw stream
    pub fn into_inner(self) -> EventStream {
        self.inner
    }
}

impl<T: DeserializeOwned> Stream for TypedEventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(event) = ready!(self.inner.poll_next_unpin(cx)) else {
                return Poll::Ready(None);
            };

            match event.decode_params::<T>() {
                Ok(decoded) => return Poll::Ready(Some(decoded)),
                Err(e) => warn!("Dropping undecodable {} event: {}", event.method, e),
            }
        }
    }
}

/// A standing, typed view over one event method.
///
/// Holds exactly one hub subscription and re-broadcasts decoded events locally,
/// so any number of callers can follow the same event without adding hub
/// subscriptions. Once the view and all its streams are dropped, the hub
/// subscription is released at the next matching event. Must be created inside
/// a Tokio runtime.
pub struct EventView<E: Event> {
    template: broadcast::Receiver<E>,
}

impl<E: Event> EventView<E> {
    /// Start forwarding `source` into a local broadcast of `capacity` events
    pub fn new(source: TypedEventStream<E>, capacity: usize) -> Self {
        let (tx, template) = broadcast::channel(capacity.max(1));

        tokio::spawn(async move {
            let mut source = source;
            while let Some(event) = source.next().await {
                // The view's own receiver keeps this open; an error means the view
                // and every stream from it are gone
                if tx.send(event).is_err() {
                    debug!("Event view for {} dropped, releasing subscription", E::METHOD);
                    return;
                }
            }
            debug!("Event view for {} ended", E::METHOD);
        });

        Self { template }
    }

    /// A new independent stream of this event. Ends when the session closes.
    pub fn subscribe(&self) -> BoxStream<'static, E> {
        BroadcastStream::new(self.template.resubscribe())
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("View subscriber for {} lagged, dropped {} events", E::METHOD, skipped);
                        None
                    }
                })
            })
            .boxed()
    }
}

impl<E: Event> std::fmt::Debug for EventView<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventView").field("method", &E::METHOD).finish()
    }
}
