//! Bounded-concurrency transfer queue.
//!
//! Transfers run at most `concurrency` at a time, in FIFO order. A failed
//! task retries with exponential backoff and re-enters at the *head* of the
//! queue so a retry never loses its place to work enqueued after it. Its
//! slot is released during the backoff sleep.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quillvault_common::protocol::{MAX_CONCURRENT_TRANSFERS, MAX_RETRIES, RETRY_BACKOFF_MS};
use quillvault_common::{Error, Result};

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Job {
    retries: u32,
    task: TaskFn,
    done: oneshot::Sender<Result<()>>,
}

struct Inner {
    concurrency: usize,
    queue: Mutex<VecDeque<Job>>,
    active: AtomicUsize,
    notify: Notify,
}

/// Future handle for an enqueued transfer.
pub struct TransferHandle {
    rx: oneshot::Receiver<Result<()>>,
}

impl TransferHandle {
    /// Wait for the transfer's final outcome (after any retries).
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Error::Transfer("transfer queue shut down".to_string())))
    }
}

/// FIFO executor with bounded fan-out and exponential retry.
pub struct TransferQueue {
    inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl TransferQueue {
    /// Create a queue running at most `concurrency` tasks at once.
    ///
    /// # Panics
    /// When `concurrency` is zero.
    pub fn new(concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be positive");

        let inner = Arc::new(Inner {
            concurrency,
            queue: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let dispatcher = tokio::spawn(dispatch(inner.clone()));

        Self { inner, dispatcher }
    }

    /// Enqueue a transfer. The task closure may run several times; it must
    /// be restartable from scratch.
    pub fn enqueue<F, Fut>(&self, task: F) -> TransferHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let job = Job {
            retries: 0,
            task: Arc::new(move || task().boxed()),
            done,
        };
        self.inner.queue.lock().unwrap().push_back(job);
        self.inner.notify.notify_one();
        TransferHandle { rx }
    }

    /// Number of tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT_TRANSFERS)
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(inner: Arc<Inner>) {
    loop {
        // Arm the wakeup before checking so a notify between check and await
        // is not lost.
        let notified = inner.notify.notified();

        let job = {
            let mut queue = inner.queue.lock().unwrap();
            if inner.active.load(Ordering::SeqCst) < inner.concurrency {
                queue.pop_front()
            } else {
                None
            }
        };

        match job {
            Some(job) => {
                inner.active.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(run_job(inner.clone(), job));
            }
            None => notified.await,
        }
    }
}

async fn run_job(inner: Arc<Inner>, mut job: Job) {
    let result = match AssertUnwindSafe((job.task)()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::Transfer(format!(
            "task panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    inner.active.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(()) => {
            let _ = job.done.send(Ok(()));
        }
        Err(err) if job.retries < MAX_RETRIES && err.is_transient() => {
            job.retries += 1;
            let delay = Duration::from_millis(RETRY_BACKOFF_MS * 2u64.pow(job.retries - 1));
            warn!(%err, retry = job.retries, ?delay, "transfer failed, backing off");

            let requeue = inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                requeue.queue.lock().unwrap().push_front(job);
                requeue.notify.notify_one();
            });
        }
        Err(err) => {
            debug!(%err, retries = job.retries, "transfer gave up");
            let _ = job.done.send(Err(err));
        }
    }

    inner.notify.notify_one();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
