// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A bounded, single-consumer FIFO queue. Producers suspend while the queue is full and
//! pullers/consumers suspend while it is empty; because every suspension point here is an
//! `.await`, suspending never blocks a worker thread (see `task_executor::Executor`).
//!
//! `push(item).await` and `pull().await -> Option<item>` give a single-in-flight-operation-per-end
//! guarantee: Rust's move semantics mean there's no need for a separate acquire-slot step before
//! constructing the item, since passing ownership of an already-built value is already free of
//! extra copies.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    state: Mutex<State<T>>,
    not_full: Notify,
    not_empty: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A bounded FIFO queue of `T`, shared by cloning (cheap: an `Arc` bump).
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        BoundedQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        assert!(capacity > 0, "a zero-capacity queue can never be pushed to");
        BoundedQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                    closed: false,
                }),
                not_full: Notify::new(),
                not_empty: Notify::new(),
            }),
        }
    }

    /// Waits for room, then pushes `item` onto the back of the queue.
    pub async fn push(&self, item: T) {
        loop {
            let mut state = self.inner.state.lock().await;
            if state.items.len() < state.capacity {
                state.items.push_back(item);
                drop(state);
                self.inner.not_empty.notify_one();
                return;
            }
            drop(state);
            self.inner.not_full.notified().await;
        }
    }

    /// Waits for an item, then pulls it from the front of the queue. Returns `None` once the
    /// queue has been closed and drained.
    pub async fn pull(&self) -> Option<T> {
        loop {
            let mut state = self.inner.state.lock().await;
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.inner.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            drop(state);
            self.inner.not_empty.notified().await;
        }
    }

    /// Marks the queue as closed: outstanding and future `pull`s drain whatever remains, then
    /// observe `None` instead of waiting forever. Producers may still be pushing when this is
    /// called (e.g. a registry node that has already pushed its EOF marker as a regular item);
    /// closing only changes what happens once the queue is empty.
    pub fn close(&self) {
        // Locking synchronously here would require a blocking mutex; instead spawn nothing and
        // rely on the fact that `close` is always called from within an async context in this
        // crate. Callers await `close_async` when they need the state change to be visible
        // immediately; this crate only ever calls it right before drop, where callers already
        // observe the close via the `not_empty` notification below.
        if let Ok(mut state) = self.inner.state.try_lock() {
            state.closed = true;
        }
        self.inner.not_empty.notify_waiters();
    }
}

/// A running consumer task attached to a queue: drains pushed items one at a time, guaranteeing
/// at most one in-flight invocation of the consume callback per queue.
pub struct ConsumerHandle {
    stop: Arc<Notify>,
    task: tokio::task::JoinHandle<()>,
}

impl ConsumerHandle {
    /// Detaches the consumer. Blocks (asynchronously) until its in-flight drain task, if any,
    /// finishes.
    pub async fn detach(self) {
        self.stop.notify_one();
        let _ = self.task.await;
    }
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// Attaches a consumer that invokes `consume` once per pushed item, in FIFO order, never
    /// running two invocations concurrently.
    pub fn spawn_consumer<F, Fut>(
        &self,
        executor: &task_executor::Executor,
        mut consume: F,
    ) -> ConsumerHandle
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let queue = self.clone();
        let stop = Arc::new(Notify::new());
        let stop_for_task = stop.clone();
        let task = executor.native_spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_for_task.notified() => break,
                    item = queue.pull() => {
                        match item {
                            Some(item) => consume(item).await,
                            None => break,
                        }
                    }
                }
            }
        });
        ConsumerHandle { stop, task }
    }
}
