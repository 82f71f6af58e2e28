// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Request/Reply futures: a push-pull consumer wrapping a unary async function `R(U)`.
//!
//! Built directly on the `async_value` crate plus this crate's own `BoundedQueue`: the consumer
//! owns a capacity-1 queue of `(request, AsyncValueSender<reply>)` pairs, so the N-th outstanding
//! caller blocks (on `push`) until the previous caller's request has been *accepted* by the
//! consumer task, not necessarily completed. That bounds how much request backlog can build up
//! against one node.

use std::future::Future;
use std::sync::Arc;

use async_value::{AsyncValue, AsyncValueReceiver, AsyncValueSender};

use crate::queue::{BoundedQueue, ConsumerHandle};

type Request<U, R> = (U, AsyncValueSender<R>);

/// Wraps a unary function `R(U)` as a request/reply consumer: every call to `request` enqueues
/// one `U` and returns a receiver for the eventual `R`.
pub struct RequestReplyConsumer<U, R>
where
    U: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    queue: BoundedQueue<Request<U, R>>,
    // Held only to keep the consumer task alive for as long as this consumer is; dropping it
    // does not wait for in-flight work (callers that want that should hold the handle).
    _consumer: Arc<ConsumerHandle>,
}

impl<U, R> RequestReplyConsumer<U, R>
where
    U: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Spawns the consumer task. `handle` is invoked once per accepted request, in FIFO order,
    /// never concurrently with itself.
    pub fn new<F, Fut>(executor: &task_executor::Executor, mut handle: F) -> RequestReplyConsumer<U, R>
    where
        F: FnMut(U) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send,
    {
        let queue = BoundedQueue::new(1);
        let consumer = queue.spawn_consumer(executor, move |(request, sender): Request<U, R>| {
            let reply = handle(request);
            async move {
                sender.send(reply.await);
            }
        });
        RequestReplyConsumer {
            queue,
            _consumer: Arc::new(consumer),
        }
    }

    /// Submits one request and returns a receiver for its eventual reply. Suspends (does not
    /// block a worker thread) until a prior request has been accepted by the consumer, if the
    /// queue's single slot is currently occupied.
    pub async fn request(&self, item: U) -> AsyncValueReceiver<R> {
        let (value, sender, receiver) = AsyncValue::new();
        // `value` is only needed if we wanted to abort the request; this consumer never does,
        // so it is dropped immediately, which is harmless (the sender side still holds the
        // channel open).
        std::mem::drop(value);
        self.queue.push((item, sender)).await;
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_reply_round_trips() {
        let executor = task_executor::Executor::new();
        let consumer: RequestReplyConsumer<i32, i32> =
            RequestReplyConsumer::new(&executor, |n| async move { n * 2 });

        let receiver = consumer.request(21).await;
        assert_eq!(receiver.recv().await, Some(42));
    }

    #[tokio::test]
    async fn capacity_one_backpressure_preserves_fifo() {
        let executor = task_executor::Executor::new();
        let consumer: Arc<RequestReplyConsumer<i32, i32>> = Arc::new(RequestReplyConsumer::new(
            &executor,
            |n| async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                n
            },
        ));

        let mut receivers = Vec::new();
        for i in 0..4 {
            receivers.push(consumer.request(i).await);
        }
        for (i, receiver) in receivers.into_iter().enumerate() {
            assert_eq!(receiver.recv().await, Some(i as i32));
        }
    }
}
