//! Message bus for a single deliberation
//!
//! An append-only log fronted by a Tokio broadcast channel. The log is the
//! source of truth. The channel only wakes live subscribers, which track an
//! offset cursor and refill from the log whenever they fall behind.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{FactorId, Message, MessageDraft, MessageId, MessageKind, ParticipantRole};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for bus operations
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus is closed")]
    Closed,

    #[error("Role {role} may not publish {kind}")]
    PolicyViolation {
        role: ParticipantRole,
        kind: MessageKind,
    },

    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Shared reference to MessageBus
pub type SharedMessageBus = Arc<MessageBus>;

/// Append-only, broadcast-backed message bus
pub struct MessageBus {
    /// Every message ever published, indexed by `id - 1`
    log: RwLock<Vec<Message>>,

    /// `None` once the bus is closed
    sender: Mutex<Option<broadcast::Sender<Message>>>,
}

impl MessageBus {
    /// Create a new bus with the default channel capacity
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a bus whose live channel buffers `capacity` messages per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            log: RwLock::new(Vec::new()),
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedMessageBus {
        Arc::new(self)
    }

    // Messages are immutable once appended, so a poisoned lock still
    // guards a consistent log.
    fn read_log(&self) -> RwLockReadGuard<'_, Vec<Message>> {
        self.log.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message to the log and fan it out to live subscribers.
    ///
    /// Never blocks on subscribers: a slow subscriber lags and later
    /// catches up from the log.
    pub fn publish(&self, draft: MessageDraft) -> BusResult<Message> {
        let kind = draft.kind();

        if !draft.sender.may_publish(kind) {
            return Err(BusError::PolicyViolation {
                role: draft.sender,
                kind,
            });
        }
        match (kind.is_factor_scoped(), draft.factor_id) {
            (true, None) => {
                return Err(BusError::Malformed(format!("{kind} requires a factor id")))
            }
            (false, Some(id)) => {
                return Err(BusError::Malformed(format!(
                    "{kind} must not carry a factor id (got {id})"
                )))
            }
            _ => {}
        }
        if draft.round == 0 {
            return Err(BusError::Malformed("rounds are 1-based".to_string()));
        }

        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = sender.as_ref() else {
            return Err(BusError::Closed);
        };

        let message = Message {
            id: log.len() as MessageId + 1,
            sender: draft.sender,
            factor_id: draft.factor_id,
            round: draft.round,
            is_update: draft.is_update,
            payload: draft.payload,
            created_at: Utc::now(),
        };
        log.push(message.clone());

        // Sent while the log lock is held so live delivery order matches log order
        match sender.send(message.clone()) {
            Ok(count) => {
                debug!(
                    id = message.id,
                    kind = %kind,
                    factor_id = ?message.factor_id,
                    receivers = count,
                    "Message published"
                );
            }
            Err(_) => {
                debug!(id = message.id, kind = %kind, "Message published (no receivers)");
            }
        }

        Ok(message)
    }

    /// Subscribe to messages matching `filter`.
    ///
    /// With backfill enabled the subscription first yields every matching
    /// message already in the log, then continues live with no gap and no
    /// duplicate.
    pub fn subscribe(self: &Arc<Self>, filter: MessageFilter) -> Subscription {
        let log = self.read_log();
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());

        let pending: VecDeque<Message> = if filter.backfill {
            log.iter().filter(|m| filter.matches(m)).cloned().collect()
        } else {
            VecDeque::new()
        };

        Subscription {
            bus: Arc::clone(self),
            receiver: sender.as_ref().map(|s| s.subscribe()),
            cursor: log.len() as MessageId,
            filter,
            pending,
        }
    }

    /// Run `handler` on its own task for every matching message.
    ///
    /// Handler errors are logged and never reach the publisher or other
    /// subscribers.
    pub fn attach<F, E>(
        self: &Arc<Self>,
        name: impl Into<String>,
        filter: MessageFilter,
        mut handler: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(&Message) -> Result<(), E> + Send + 'static,
        E: std::fmt::Display,
    {
        let name = name.into();
        let mut subscription = self.subscribe(filter);
        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                if let Err(e) = handler(&message) {
                    warn!(
                        subscriber = %name,
                        id = message.id,
                        error = %e,
                        "Subscriber failed on message; continuing"
                    );
                }
            }
            debug!(subscriber = %name, "Subscriber finished");
        })
    }

    /// Ordered snapshot of every logged message matching `filter`
    pub fn history(&self, filter: &MessageFilter) -> Vec<Message> {
        self.read_log()
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    /// Every message with an id greater than `offset`
    pub fn since(&self, offset: MessageId) -> Vec<Message> {
        let log = self.read_log();
        let start = (offset as usize).min(log.len());
        log[start..].to_vec()
    }

    /// Close the bus; live subscriptions end once drained
    pub fn close(&self) {
        let dropped = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if dropped {
            debug!(messages = self.len(), "Bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Number of messages in the log
    pub fn len(&self) -> usize {
        self.read_log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Message filter for selective subscription and history queries
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Only messages tagged with this factor
    pub factor_id: Option<FactorId>,
    /// Only these kinds
    pub kinds: Option<Vec<MessageKind>>,
    /// Only messages with an id greater than this offset
    pub after: Option<MessageId>,
    /// Replay matching history before going live
    pub backfill: bool,
}

impl MessageFilter {
    /// Create a new empty filter (matches all messages, no backfill)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by factor. Messages without a factor never match.
    pub fn factor(mut self, factor_id: FactorId) -> Self {
        self.factor_id = Some(factor_id);
        self
    }

    /// Filter by message kinds
    pub fn kinds(mut self, kinds: Vec<MessageKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Skip everything up to and including `offset`
    pub fn after(mut self, offset: MessageId) -> Self {
        self.after = Some(offset);
        self
    }

    /// Replay matching history on subscribe
    pub fn with_backfill(mut self) -> Self {
        self.backfill = true;
        self
    }

    /// Check if a message matches this filter
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(fid) = self.factor_id {
            if message.factor_id != Some(fid) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&message.kind()) {
                return false;
            }
        }

        if let Some(after) = self.after {
            if message.id <= after {
                return false;
            }
        }

        true
    }
}

/// Live, ordered view of the bus holding only an offset cursor
pub struct Subscription {
    bus: SharedMessageBus,
    receiver: Option<broadcast::Receiver<Message>>,
    /// Highest log offset this subscription has seen
    cursor: MessageId,
    filter: MessageFilter,
    pending: VecDeque<Message>,
}

impl Subscription {
    /// Receive the next matching message, or `None` once the bus is
    /// closed and everything has been delivered.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(message);
            }

            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(message) => {
                    if message.id <= self.cursor {
                        continue;
                    }
                    self.cursor = message.id;
                    if self.filter.matches(&message) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped,
                        cursor = self.cursor,
                        "Subscriber lagged; refilling from log"
                    );
                    self.refill();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    self.refill();
                }
            }
        }
    }

    fn refill(&mut self) {
        for message in self.bus.since(self.cursor) {
            self.cursor = message.id;
            if self.filter.matches(&message) {
                self.pending.push_back(message);
            }
        }
    }

    /// Offset of the last message this subscription has seen
    pub fn cursor(&self) -> MessageId {
        self.cursor
    }

    /// Adapt into a `Stream` that ends when the bus closes
    pub fn into_stream(self) -> impl Stream<Item = Message> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|message| (message, sub))
        })
    }
}
