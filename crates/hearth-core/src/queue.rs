// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;
type Lanes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

/// Serializes asynchronous tasks by session key.
///
/// For each key, at most one task is in flight and tasks run in enqueue
/// order; distinct keys run concurrently without contention.  A task's
/// failure (or panic) does not abort its lane — the next task runs
/// regardless.  When a key's queue drains, its lane is torn down.
pub struct SessionQueue {
    lanes: Lanes,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append `task` to the key's FIFO lane and return a completion handle.
    ///
    /// The receiver resolves with the task's output; if the task panicked,
    /// the sender is dropped and the receiver yields `RecvError` instead.
    pub fn enqueue<T, Fut>(
        &self,
        key: &str,
        task: impl FnOnce() -> Fut + Send + 'static,
    ) -> oneshot::Receiver<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // A panic inside the task must not kill the lane drainer.
            match std::panic::AssertUnwindSafe(task()).catch_unwind().await {
                Ok(value) => {
                    let _ = done_tx.send(value);
                }
                Err(_) => {
                    warn!("queued task panicked; lane continues");
                }
            }
        });

        // Send under the lanes lock: the drainer also holds it when it
        // decides the lane is empty and removes itself, so a job can never
        // land on a lane that is mid-teardown.
        let mut lanes = self.lock();
        if let Some(sender) = lanes.get(key) {
            match sender.send(job) {
                Ok(()) => return done_rx,
                Err(rejected) => {
                    // Lane closed under us; rebuild it with the job intact.
                    lanes.remove(key);
                    return self.start_lane(&mut lanes, key, done_rx, Some(rejected.0));
                }
            }
        }
        self.start_lane(&mut lanes, key, done_rx, Some(job))
    }

    fn start_lane<T>(
        &self,
        lanes: &mut HashMap<String, mpsc::UnboundedSender<Job>>,
        key: &str,
        done_rx: oneshot::Receiver<T>,
        first_job: Option<Job>,
    ) -> oneshot::Receiver<T> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        if let Some(job) = first_job {
            let _ = tx.send(job);
        }
        lanes.insert(key.to_string(), tx);

        let lanes_handle = Arc::clone(&self.lanes);
        let lane_key = key.to_string();
        tokio::spawn(async move {
            loop {
                let job = {
                    // Teardown check: if the lane is empty right now, remove
                    // it while still holding the lock so no enqueue can race
                    // into the dying lane.
                    let mut lanes = lanes_handle.lock().unwrap_or_else(|e| e.into_inner());
                    match rx.try_recv() {
                        Ok(job) => Some(job),
                        Err(mpsc::error::TryRecvError::Empty) => {
                            lanes.remove(&lane_key);
                            debug!(key = %lane_key, "session lane drained; torn down");
                            None
                        }
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            lanes.remove(&lane_key);
                            None
                        }
                    }
                };
                match job {
                    Some(job) => job.await,
                    None => break,
                }
            }
        });

        done_rx
    }

    /// Number of keys with a live lane (in-flight or queued work).
    pub fn active_keys(&self) -> usize {
        self.lock().len()
    }

    /// Wait up to `grace` for every lane to drain.  Returns `true` when all
    /// outstanding work completed inside the window.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.active_keys() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.active_keys() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Job>>> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
