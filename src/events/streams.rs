use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

/// Broadcast stream with a bounded replay buffer
pub struct EventStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
    buffer_size: usize,
    stats: Arc<RwLock<EventStreamStats>>,
}

/// Counters for monitoring stream activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStreamStats {
    pub events_published: u64,
    /// Events published while nobody was subscribed
    pub events_unobserved: u64,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        debug!(capacity, buffer_size, "Creating event stream");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(buffer_size))),
            buffer_size,
            stats: Arc::new(RwLock::new(EventStreamStats::default())),
        }
    }

    pub fn subscribe(&self) -> Subscriber<T> {
        trace!("New subscriber registered");
        Subscriber {
            receiver: self.sender.subscribe(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers reached; zero is not an error.
    pub async fn publish(&self, event: T) -> usize {
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        self.buffer_event(event).await;

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        if receivers == 0 {
            stats.events_unobserved += 1;
        }

        trace!(receivers, "Event published");
        receivers
    }

    async fn buffer_event(&self, event: T) {
        let mut buffer = self.buffer.write().await;
        buffer.push_back(event);
        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }
    }

    pub async fn stats(&self) -> EventStreamStats {
        self.stats.read().await.clone()
    }
}

impl<T: Clone + Send + 'static> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_size: self.buffer_size,
            stats: Arc::clone(&self.stats),
        }
    }
}

/// Receiving end of an `EventStream`
pub struct Subscriber<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Receive the next event
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Result<T, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Recent events, oldest first, including ones published before this
    /// subscriber existed
    pub async fn replay_buffer(&self) -> Vec<T> {
        self.buffer.read().await.iter().cloned().collect()
    }
}
