//! Worker Pool (spec §4.10). A bounded `crossbeam-channel` with N long-lived
//! worker threads, grounded on `other_examples/.../Blobfolio-flaca/src/
//! jobs.rs`'s `crossbeam_channel::bounded` + `thread::scope` shape, which
//! generalizes the teacher's sequential `for path in inputs` loop into
//! genuine concurrency (the teacher only parallelizes via oxipng's
//! internal rayon pool, never across files).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};

use crate::model::{FileJob, JobResult, JobStatus};

/// Shared cooperative-cancellation flag (spec §4.9/§4.10): checked at
/// stage boundaries inside the job runner, not just between jobs, so a
/// cancel request takes effect mid-file rather than only mid-queue.
pub type CancelFlag = Arc<AtomicBool>;

pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub struct PoolOutcome {
    pub results: Vec<(u64, JobStatus, JobResult)>,
}

/// Runs every job through `process` across `worker_count` threads. FIFO
/// dispatch via a bounded channel of capacity `worker_count * 2`; each
/// worker pulls the next job as soon as it's free, so slow files never
/// block unrelated fast ones behind them. Jobs move by value into workers
/// and their results come back over a second channel, so no job is ever
/// shared across threads.
pub fn run_pool<F>(jobs: Vec<FileJob>, worker_count: usize, cancel: CancelFlag, process: F) -> PoolOutcome
where
    F: Fn(&mut FileJob, &CancelFlag) -> (JobStatus, JobResult) + Sync,
{
    let worker_count = worker_count.max(1);
    let total = jobs.len();
    let (tx, rx) = bounded::<FileJob>(worker_count * 2);
    let (result_tx, result_rx) = bounded::<(u64, JobStatus, JobResult)>(total.max(1));

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let process_ref = &process;
            let cancel_ref = &cancel;
            scope.spawn(move || {
                while let Ok(mut job) = rx.recv() {
                    let outcome = if cancel_ref.load(Ordering::SeqCst) {
                        (JobStatus::Cancelled, JobResult::cancelled(0))
                    } else {
                        process_ref(&mut job, cancel_ref)
                    };
                    let _ = result_tx.send((job.id, outcome.0, outcome.1));
                }
            });
        }
        drop(result_tx);

        feed(&tx, jobs);
        drop(tx);
    });

    let results = result_rx.iter().collect();
    PoolOutcome { results }
}

fn feed(tx: &Sender<FileJob>, jobs: Vec<FileJob>) {
    for job in jobs {
        if tx.send(job).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStage;
    use std::path::PathBuf;

    #[test]
    fn all_jobs_get_processed_exactly_once() {
        let jobs: Vec<FileJob> = (0..20)
            .map(|i| FileJob::new(i, PathBuf::from(format!("/tmp/{i}.png")), "/tmp".into(), None))
            .collect();
        let cancel = new_cancel_flag();

        let outcome = run_pool(jobs, 4, cancel, |job, _cancel| {
            job.start();
            job.enter_stage(JobStage::Encoding);
            (JobStatus::Success, JobResult::success(job.input_path.clone(), 100, 50, Some(0.99)))
        });

        assert_eq!(outcome.results.len(), 20);
        assert!(outcome.results.iter().all(|(_, status, _)| *status == JobStatus::Success));
    }

    #[test]
    fn cancel_flag_short_circuits_remaining_jobs() {
        let jobs: Vec<FileJob> = (0..10)
            .map(|i| FileJob::new(i, PathBuf::from(format!("/tmp/{i}.png")), "/tmp".into(), None))
            .collect();
        let cancel = new_cancel_flag();
        cancel.store(true, Ordering::SeqCst);

        let outcome = run_pool(jobs, 2, cancel, |job, _cancel| {
            job.start();
            (JobStatus::Success, JobResult::success(job.input_path.clone(), 10, 5, None))
        });

        assert!(outcome.results.iter().all(|(_, status, _)| *status == JobStatus::Cancelled));
    }
}
