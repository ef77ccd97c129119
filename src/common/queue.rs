//! Message queues between a session and its handles.
//!
//! Commands travel over a point-to-point [`Queue`]; events fan out to every
//! subscriber over a [`BroadcastQueue`].

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{CrewGraphError, Result};

/// Bounded MPMC (multi-producer, multi-consumer) queue.
///
/// Every command is consumed by exactly one receiver, the session loop.
/// Backed by flume.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    /// receive a message from the queue asynchronously
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }

    /// send a message to the queue asynchronously
    pub async fn send_async(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.send_async(msg).await.map_err(|e| CrewGraphError::Session(e.to_string()))
    }
}

/// Broadcast queue for one-to-many message distribution.
///
/// Every subscriber receives every event. Sending with no subscriber is not
/// an error. Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message to the queue
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender.send(msg).map_err(|e| CrewGraphError::Session(e.to_string()))?;
        Ok(())
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_fifo() {
        let queue = Queue::new(4);
        queue.send_async(1).await.unwrap();
        queue.send_async(2).await.unwrap();
        assert_eq!(queue.next_async().await, Some(1));
        assert_eq!(queue.next_async().await, Some(2));
    }

    #[tokio::test]
    async fn test_queue_send_after_receiver_dropped() {
        let (tx, rx) = flume::bounded::<u8>(1);
        drop(rx);
        let queue = Queue {
            receiver: Arc::new(flume::bounded(1).1),
            sender: Arc::new(tx),
        };
        assert!(matches!(queue.send_async(1).await, Err(CrewGraphError::Session(_))));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let queue = BroadcastQueue::new(4);
        queue.send("lost").unwrap();

        let mut rx = queue.subscribe();
        queue.send("seen").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "seen");
    }
}
