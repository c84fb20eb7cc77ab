//! Channels connecting pipeline stages.
//!
//! A [`Channel`] is either an unbounded multi-producer/multi-consumer queue or
//! an endpoint that swallows writes and reads as [`Message::End`]. Endpoints
//! sit before the first and after the last stage group, so producers and sinks
//! need no special casing.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Element carried by a channel.
///
/// Every `End` equals every other `End`, and consumers have to match both
/// arms, so the end of a stream cannot be mistaken for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    /// A domain item
    Item(T),
    /// End-of-stream marker
    End,
}

impl<T> Message<T> {
    /// Whether this is the end-of-stream marker.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Unwrap the item, if any.
    #[must_use]
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            Self::End => None,
        }
    }
}

/// Unbounded FIFO channel shared by the workers on either side of a stage
/// boundary.
#[derive(Debug)]
pub enum Channel<T> {
    /// A real queue
    Queue {
        /// Sending half
        tx: Sender<Message<T>>,
        /// Receiving half
        rx: Receiver<Message<T>>,
    },
    /// No-op endpoint
    Endpoint,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Queue { tx, rx } => Self::Queue {
                tx: tx.clone(),
                rx: rx.clone(),
            },
            Self::Endpoint => Self::Endpoint,
        }
    }
}

impl<T> Channel<T> {
    /// Create an unbounded queue.
    #[must_use]
    pub fn queue() -> Self {
        let (tx, rx) = unbounded();
        Self::Queue { tx, rx }
    }

    /// Create a no-op endpoint.
    #[must_use]
    pub fn endpoint() -> Self {
        Self::Endpoint
    }

    /// Write a message. Writes to an endpoint are discarded.
    pub fn put(&self, message: Message<T>) {
        if let Self::Queue { tx, .. } = self {
            // Both halves live in `self`, so the queue cannot be disconnected.
            let _ = tx.send(message);
        }
    }

    /// Write an item.
    pub fn send(&self, item: T) {
        self.put(Message::Item(item));
    }

    /// Block until a message is available. An endpoint reads as `End`.
    #[must_use]
    pub fn get(&self) -> Message<T> {
        match self {
            Self::Queue { rx, .. } => rx.recv().unwrap_or(Message::End),
            Self::Endpoint => Message::End,
        }
    }

    /// Put the end marker back after reading it, for sibling readers.
    pub fn redeliver_end(&self) {
        self.put(Message::End);
    }

    /// Read the next item, or `None` once the stream has ended.
    ///
    /// On `End` the marker is written back onto this channel before
    /// returning, so sibling workers sharing the channel observe it too.
    pub fn recv_item(&self) -> Option<T> {
        match self.get() {
            Message::Item(item) => Some(item),
            Message::End => {
                self.redeliver_end();
                None
            }
        }
    }

    /// Iterate items until `End`, redelivering the marker.
    pub fn items(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.recv_item())
    }

    /// Consume and discard everything up to `End`.
    ///
    /// Returns how many items were thrown away.
    pub fn drain(&self) -> usize {
        self.items().count()
    }

    /// Number of queued messages (always 0 for an endpoint).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Queue { rx, .. } => rx.len(),
            Self::Endpoint => 0,
        }
    }

    /// Whether no messages are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this channel is an endpoint.
    #[must_use]
    pub fn is_endpoint(&self) -> bool {
        matches!(self, Self::Endpoint)
    }
}
