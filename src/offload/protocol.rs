//! Messages exchanged with the batch worker.
//!
//! Only plain data crosses the boundary: the model's tagged parameter record
//! and the height buffer, which is moved in and moved back out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::erosion::{run_batch, ErosionModel};
use crate::terrain::HeightField;

/// Everything a worker needs to run a full erosion pass.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub model: ErosionModel,
    pub width: usize,
    pub height: usize,
    pub heights: Vec<f32>,
}

/// Worker to caller messages.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Progress { done: u32, total: u32 },
    Complete { heights: Vec<f32> },
    Failed(String),
}

/// Worker body: rebuilds the model, runs every iteration, and hands the
/// buffer back. Stops at the next chunk boundary once `cancel` is set or the
/// receiver is gone, without sending a result.
pub fn run_worker(request: BatchRequest, tx: Sender<WorkerMessage>, cancel: Arc<AtomicBool>) {
    let BatchRequest {
        model,
        width,
        height,
        heights,
    } = request;

    let mut field = match HeightField::from_vec(width, height, heights) {
        Ok(field) => field,
        Err(e) => {
            let _ = tx.send(WorkerMessage::Failed(e.to_string()));
            return;
        }
    };

    let mut strategy = model.build();
    let finished = run_batch(strategy.as_mut(), &mut field, |done, total| {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        tx.send(WorkerMessage::Progress { done, total }).is_ok()
    });

    if finished && !cancel.load(Ordering::Relaxed) {
        let _ = tx.send(WorkerMessage::Complete {
            heights: field.into_heights(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::erosion::ModelKind;

    #[test]
    fn mismatched_buffer_reports_failure() {
        let (tx, rx) = mpsc::channel();
        let request = BatchRequest {
            model: ErosionModel::default_for(ModelKind::RidgeFollower),
            width: 8,
            height: 8,
            heights: vec![0.0; 10],
        };
        run_worker(request, tx, Arc::new(AtomicBool::new(false)));
        assert!(matches!(rx.recv().unwrap(), WorkerMessage::Failed(_)));
    }

    #[test]
    fn cancelled_worker_sends_no_result() {
        let (tx, rx) = mpsc::channel();
        let mut model = ErosionModel::default_for(ModelKind::RidgeFollower);
        model.set_iterations(2_000);
        let request = BatchRequest {
            model,
            width: 16,
            height: 16,
            heights: vec![0.0; 256],
        };
        run_worker(request, tx, Arc::new(AtomicBool::new(true)));
        assert!(rx.iter().all(|m| !matches!(m, WorkerMessage::Complete { .. })));
    }

    #[test]
    fn completed_worker_reports_progress_then_buffer() {
        let (tx, rx) = mpsc::channel();
        let mut model = ErosionModel::default_for(ModelKind::RidgeFollower);
        model.set_iterations(1_000);
        let request = BatchRequest {
            model,
            width: 16,
            height: 16,
            heights: vec![0.0; 256],
        };
        run_worker(request, tx, Arc::new(AtomicBool::new(false)));

        let messages: Vec<_> = rx.iter().collect();
        assert_eq!(
            messages[..2].to_vec(),
            vec![
                WorkerMessage::Progress { done: 500, total: 1_000 },
                WorkerMessage::Progress { done: 1_000, total: 1_000 },
            ]
        );
        match messages.last() {
            Some(WorkerMessage::Complete { heights }) => assert_eq!(heights.len(), 256),
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
