//! Full erosion runs on a background worker.
//!
//! [`OffloadCoordinator::run_batch`] copies the field, moves the copy and the
//! model's parameter record to a worker thread, and returns immediately. The
//! caller then polls once per frame; progress callbacks run on the caller's
//! thread, and the finished buffer is moved back and swapped into the live
//! field. The worker and the caller never share a buffer.

mod protocol;

pub use protocol::{run_worker, BatchRequest, WorkerMessage};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use thiserror::Error;

use crate::scheduler::{Scheduler, SchedulerState};
use crate::terrain::HeightField;

/// Errors raised by the batch path.
#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("A batch run is already in progress")]
    AlreadyRunning,
    #[error("Failed to spawn batch worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Batch worker failed: {0}")]
    WorkerFailed(String),
    #[error("Batch result has {got} cells, live field has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Scheduler is {0:?}; a batch needs it Ready or Complete")]
    SchedulerBusy(SchedulerState),
}

/// Observable state of the batch path after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// No batch is running.
    Idle,
    /// The worker is still running.
    Running { done: u32, total: u32 },
    /// The result was merged and the scheduler marked complete.
    Completed,
}

type ProgressFn = Box<dyn FnMut(u32, u32)>;
type CompleteFn = Box<dyn FnOnce(&HeightField)>;

struct BatchJob {
    rx: Receiver<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: u32,
    total: u32,
    on_progress: ProgressFn,
    on_complete: Option<CompleteFn>,
}

/// Runs at most one background erosion pass at a time.
#[derive(Default)]
pub struct OffloadCoordinator {
    job: Option<BatchJob>,
}

impl OffloadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    /// Starts a full run of the scheduler's active model on a copy of `field`.
    ///
    /// The scheduler must be `Ready` or `Complete`; the incremental path and
    /// the batch path never work on the same field at once.
    ///
    /// # Arguments
    /// * `field` - Live field; copied, not borrowed past this call
    /// * `scheduler` - Owner of the model whose parameter record is sent to the worker
    /// * `on_progress` - Called from [`poll`](Self::poll) with `(done, total)`
    /// * `on_complete` - Called once with the merged field
    pub fn run_batch(
        &mut self,
        field: &HeightField,
        scheduler: &Scheduler,
        on_progress: impl FnMut(u32, u32) + 'static,
        on_complete: impl FnOnce(&HeightField) + 'static,
    ) -> Result<(), OffloadError> {
        if self.job.is_some() {
            return Err(OffloadError::AlreadyRunning);
        }
        ensure_idle(scheduler)?;
        let model = scheduler.model();

        let request = BatchRequest {
            model: model.to_serializable(),
            width: field.width(),
            height: field.height(),
            heights: field.heights().to_vec(),
        };
        let total = request.model.iterations();
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("erosion-batch".to_string())
            .spawn(move || run_worker(request, tx, worker_cancel))?;

        info!(
            "batch: started {} for {} iterations on {}x{}",
            model.name(),
            total,
            field.width(),
            field.height()
        );

        self.job = Some(BatchJob {
            rx,
            cancel,
            handle: Some(handle),
            done: 0,
            total,
            on_progress: Box::new(on_progress),
            on_complete: Some(Box::new(on_complete)),
        });
        Ok(())
    }

    /// Drains pending worker messages without blocking.
    ///
    /// On completion the result is swapped into `field` and `scheduler` is
    /// marked complete. A worker failure drops the job, leaves `field` and
    /// `scheduler` untouched, and is returned as an error.
    pub fn poll(
        &mut self,
        field: &mut HeightField,
        scheduler: &mut Scheduler,
    ) -> Result<BatchStatus, OffloadError> {
        loop {
            let msg = match self.job.as_ref() {
                None => return Ok(BatchStatus::Idle),
                Some(job) => match job.rx.try_recv() {
                    Ok(msg) => Ok(msg),
                    Err(TryRecvError::Empty) => {
                        return Ok(BatchStatus::Running {
                            done: job.done,
                            total: job.total,
                        })
                    }
                    Err(TryRecvError::Disconnected) => Err(RecvError),
                },
            };
            if let Some(status) = self.handle_message(msg, field, scheduler)? {
                return Ok(status);
            }
        }
    }

    /// Blocks until the running batch finishes. Returns `Idle` if none is running.
    pub fn wait(
        &mut self,
        field: &mut HeightField,
        scheduler: &mut Scheduler,
    ) -> Result<BatchStatus, OffloadError> {
        loop {
            let msg = match self.job.as_ref() {
                None => return Ok(BatchStatus::Idle),
                Some(job) => job.rx.recv(),
            };
            if let Some(status) = self.handle_message(msg, field, scheduler)? {
                return Ok(status);
            }
        }
    }

    /// Stops the running batch. Nothing from it will be merged.
    ///
    /// Returns false if no batch was running.
    pub fn cancel(&mut self) -> bool {
        match self.job.take() {
            Some(job) => {
                job.cancel.store(true, Ordering::Relaxed);
                warn!("batch: cancelled at {}/{}", job.done, job.total);
                // Dropping the receiver and handle detaches the worker; it
                // exits at its next chunk boundary.
                true
            }
            None => false,
        }
    }

    fn handle_message(
        &mut self,
        msg: Result<WorkerMessage, RecvError>,
        field: &mut HeightField,
        scheduler: &mut Scheduler,
    ) -> Result<Option<BatchStatus>, OffloadError> {
        match msg {
            Ok(WorkerMessage::Progress { done, total }) => {
                if let Some(job) = self.job.as_mut() {
                    job.done = done;
                    job.total = total;
                    (job.on_progress)(done, total);
                }
                Ok(None)
            }
            Ok(WorkerMessage::Complete { heights }) => {
                let Some(mut job) = self.job.take() else {
                    return Ok(Some(BatchStatus::Idle));
                };
                join_worker(&mut job);
                if let Err(e) = ensure_idle(scheduler) {
                    error!("batch: result dropped, {e}");
                    return Err(e);
                }
                if heights.len() != field.len() {
                    error!("batch: result has {} cells, expected {}", heights.len(), field.len());
                    return Err(OffloadError::DimensionMismatch {
                        expected: field.len(),
                        got: heights.len(),
                    });
                }
                field
                    .replace_heights(heights)
                    .map_err(|e| OffloadError::WorkerFailed(e.to_string()))?;
                scheduler.finish_batch();
                info!("batch: merged {} iterations", job.total);
                if let Some(on_complete) = job.on_complete.take() {
                    on_complete(field);
                }
                Ok(Some(BatchStatus::Completed))
            }
            Ok(WorkerMessage::Failed(reason)) => {
                if let Some(mut job) = self.job.take() {
                    join_worker(&mut job);
                }
                error!("batch: worker failed: {reason}");
                Err(OffloadError::WorkerFailed(reason))
            }
            Err(RecvError) => {
                let reason = match self.job.take() {
                    Some(mut job) => join_worker(&mut job)
                        .unwrap_or_else(|| "worker exited without a result".to_string()),
                    None => "worker exited without a result".to_string(),
                };
                error!("batch: worker failed: {reason}");
                Err(OffloadError::WorkerFailed(reason))
            }
        }
    }
}

impl Drop for OffloadCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn ensure_idle(scheduler: &Scheduler) -> Result<(), OffloadError> {
    match scheduler.state() {
        SchedulerState::Ready | SchedulerState::Complete => Ok(()),
        busy => Err(OffloadError::SchedulerBusy(busy)),
    }
}

/// Joins the worker thread, returning its panic message if it panicked.
fn join_worker(job: &mut BatchJob) -> Option<String> {
    let handle = job.handle.take()?;
    handle.join().err().map(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
