use frameline_sync::ConcurrentQueue;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, panic_message};

/// Work that must run on the thread owning the graphics context.
pub type GpuJob = Box<dyn FnOnce() + Send + 'static>;

/// Submit-only view of a [`RenderEngine`], safe to hand to loader threads.
#[derive(Clone)]
pub struct EngineHandle {
    queue: Arc<ConcurrentQueue<GpuJob>>,
}

impl EngineHandle {
    /// Schedule `job` for the next `run_once`. Never blocks.
    ///
    /// Jobs from one producer run in the order that producer submitted them.
    pub fn submit<F>(&self, job: F) -> EngineResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Box::new(job)).map_err(|e| {
            tracing::warn!("GPU job submitted after engine shutdown; dropped");
            drop(e.into_inner());
            EngineError::Closed
        })
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("pending", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

/// Outcome of one `run_once`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Jobs taken off the queue this frame, panicked ones included.
    pub executed: usize,
    pub panicked: usize,
    /// Jobs still queued after this frame (only non-zero when capped).
    pub pending: usize,
}

/// Records the first thread that drives the engine and rejects any other.
#[derive(Debug, Default)]
struct ContextOwner {
    owner: Mutex<Option<ThreadId>>,
}

impl ContextOwner {
    fn claim_or_check(&self) -> EngineResult<()> {
        let current = thread::current().id();
        let mut owner = self.owner.lock();
        match *owner {
            None => {
                *owner = Some(current);
                tracing::debug!(thread = ?current, "render thread claimed graphics context");
                Ok(())
            }
            Some(id) if id == current => Ok(()),
            Some(id) => {
                tracing::error!(owner = ?id, caller = ?current, "run_once from foreign thread");
                Err(EngineError::WrongThread)
            }
        }
    }
}

/// Serialization point for all graphics-context mutation.
///
/// Any thread may submit closures through an [`EngineHandle`]; exactly one
/// thread drains and runs them, once per frame, in FIFO order.
pub struct RenderEngine {
    queue: Arc<ConcurrentQueue<GpuJob>>,
    context: ContextOwner,
    max_jobs_per_frame: usize,
    frame_index: u64,
}

impl RenderEngine {
    pub fn new(config: &EngineConfig) -> Self {
        tracing::info!(max_jobs_per_frame = ?config.max_jobs_per_frame, "render engine created");
        Self {
            queue: Arc::new(ConcurrentQueue::unbounded()),
            context: ContextOwner::default(),
            max_jobs_per_frame: config.max_jobs_per_frame.unwrap_or(usize::MAX),
            frame_index: 0,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn submit<F>(&self, job: F) -> EngineResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle().submit(job)
    }

    /// Run every job queued at this point (up to the per-frame cap).
    ///
    /// Jobs submitted while this runs wait for the next frame. A panicking
    /// job is logged and counted; the remaining jobs still run.
    pub fn run_once(&mut self) -> EngineResult<FrameReport> {
        self.context.claim_or_check()?;
        let frame_index = self.frame_index;
        let _span = tracing::info_span!("run_once", frame = frame_index).entered();

        let jobs = self.queue.drain(self.max_jobs_per_frame);
        let executed = jobs.len();
        let panicked = run_jobs(jobs);

        self.frame_index = self.frame_index.wrapping_add(1);
        let report = FrameReport {
            frame_index,
            executed,
            panicked,
            pending: self.queue.len(),
        };
        if executed > 0 {
            tracing::debug!(executed, panicked, pending = report.pending, "frame jobs done");
        }
        Ok(report)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of completed `run_once` calls.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Stop accepting jobs and run everything still queued, in order.
    /// Returns how many jobs ran. Calling it again returns 0.
    pub fn shutdown(&mut self) -> EngineResult<usize> {
        self.context.claim_or_check()?;
        self.queue.close();
        let jobs = self.queue.drain(usize::MAX);
        let n = jobs.len();
        let panicked = run_jobs(jobs);
        tracing::info!(flushed = n, panicked, "render engine shut down");
        Ok(n)
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.queue.close();
        let left = self.queue.drain(usize::MAX).len();
        if left > 0 {
            tracing::warn!(dropped = left, "render engine dropped with unexecuted GPU jobs");
        }
    }
}

fn run_jobs(jobs: Vec<GpuJob>) -> usize {
    let mut panicked = 0;
    for job in jobs {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            panicked += 1;
            tracing::error!(reason = %panic_message(payload.as_ref()), "GPU job panicked");
        }
    }
    panicked
}
