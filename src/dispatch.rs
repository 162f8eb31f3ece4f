//! Main-thread dispatch queue
//!
//! Network tasks hand closures to the host execution context through this
//! queue. The host loop drains it once per tick on a single thread, so queued
//! closures never run concurrently with each other or with the host's own
//! per-tick work.

use std::{
    any::Any,
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        OnceLock,
    },
    thread::{self, ThreadId},
    time::Duration,
};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

type Job = Box<dyn FnOnce() + Send + 'static>;

/// What happens to a closure whose caller stopped waiting for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// The closure still runs on a later drain and its result is discarded.
    #[default]
    Abandon,
    /// The closure is skipped if it has not started when it is dequeued.
    Cancel,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub timeout: Duration,
    pub policy: TimeoutPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DISPATCH_TIMEOUT,
            policy: TimeoutPolicy::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch timed out after {0:?}")]
    TimedOut(Duration),
    #[error("dispatch queue is closed")]
    Closed,
    #[error("dispatched work was dropped before completing")]
    Dropped,
}

pub struct DispatchQueue {
    jobs: Mutex<VecDeque<Job>>,
    closed: AtomicBool,
    drainer: OnceLock<ThreadId>,
    settings: DispatchSettings,
}

impl DispatchQueue {
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            drainer: OnceLock::new(),
            settings,
        }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Appends a closure and returns immediately.
    pub fn enqueue<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut jobs = self.jobs.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }
        jobs.push_back(Box::new(job));
        Ok(())
    }

    /// Runs every closure queued so far, in enqueue order, and returns how
    /// many ran. Closures enqueued while draining wait for the next call.
    ///
    /// Only the first thread that ever drains may drain again.
    pub fn drain(&self) -> usize {
        let current = thread::current().id();
        let drainer = *self.drainer.get_or_init(|| current);
        if drainer != current {
            warn!(
                drainer = ?drainer,
                caller = ?current,
                "refusing drain from a thread other than the host thread"
            );
            return 0;
        }

        let batch = std::mem::take(&mut *self.jobs.lock());
        let count = batch.len();
        for job in batch {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "dispatched closure failed"
                );
            }
        }

        if count > 0 {
            debug!(count, "dispatch queue drained");
        }
        count
    }

    /// Runs `work` on the host thread and waits for its result.
    ///
    /// On timeout the caller gets [`DispatchError::TimedOut`]; what happens
    /// to the still-queued closure depends on the configured [`TimeoutPolicy`].
    pub async fn dispatch<F, T>(&self, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let policy = self.settings.policy;

        self.enqueue(move || {
            if policy == TimeoutPolicy::Cancel && tx.is_closed() {
                warn!("skipping cancelled dispatch");
                return;
            }

            let result = work();
            if tx.send(result).is_err() {
                warn!("dispatch result discarded, caller stopped waiting");
            }
        })?;

        match tokio::time::timeout(self.settings.timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(DispatchError::Dropped),
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.timeout.as_millis(),
                    policy = ?policy,
                    "dispatch timed out"
                );
                Err(DispatchError::TimedOut(self.settings.timeout))
            }
        }
    }

    /// Rejects new work and drops everything still queued.
    pub fn close(&self) {
        let mut jobs = self.jobs.lock();
        self.closed.store(true, Ordering::Release);
        let dropped = jobs.len();
        jobs.clear();
        if dropped > 0 {
            warn!(dropped, "dispatch queue closed with pending work");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DispatchSettings::default())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
