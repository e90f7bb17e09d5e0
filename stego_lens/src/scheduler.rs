// THEORY:
// The scheduler fans the transform catalogue out over a bounded pool of workers and
// streams results back in completion order. It knows nothing about sessions, only
// about an immutable source, a list of tasks and a cancellation flag.
//
// Flow per task:
//   1. A tokio task is spawned for every catalogue entry up front.
//   2. It waits for one of `worker_count` semaphore permits.
//   3. With the permit held it checks the cancel flag exactly once. A cancelled task
//      is recorded as skipped and never touches a pixel.
//   4. The transform itself runs on a blocking thread. Its completion is raced
//      against cancellation: if the caller cancels while waiting, the result is
//      discarded and the worker slot is released immediately.
//   5. Every outcome is announced on the event stream; completed results are also
//      pushed onto a shared aggregate so `await_all` works whether or not anybody
//      is reading the stream.
//
// A transform that panics only poisons its own blocking task; the panic surfaces
// here as a `JoinError` and becomes a `TaskFailure` for that label.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::cancel::{CancelSource, CancelToken};
use crate::core_modules::pixel_source::PixelSource;
use crate::error::{PreconditionViolation, TaskFailure};
use crate::logging::SessionLogger;
use crate::transforms::{TransformResult, TransformTask};

/// One outcome on the result stream.
#[derive(Debug, Clone)]
pub enum TransformEvent {
    Completed(TransformResult),
    Failed(TaskFailure),
    Skipped { label: String },
}

/// Completion-ordered receiver of `TransformEvent`s. The stream ends once every
/// submitted task has reported.
pub type TransformStream = mpsc::UnboundedReceiver<TransformEvent>;

/// Everything a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    pub results: Vec<TransformResult>,
    pub failures: Vec<TaskFailure>,
    /// Labels of tasks that never started because the run was cancelled.
    pub skipped: Vec<String>,
}

#[derive(Default)]
struct Outcomes {
    results: Vec<TransformResult>,
    failures: Vec<TaskFailure>,
    skipped: Vec<String>,
}

enum TaskOutcome {
    Finished(Result<Vec<TransformResult>, TaskFailure>),
    Skipped,
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct TransformScheduler {
    worker_count: usize,
    logger: SessionLogger,
}

impl TransformScheduler {
    pub fn new(worker_count: usize, logger: SessionLogger) -> Result<Self, PreconditionViolation> {
        if worker_count == 0 {
            return Err(PreconditionViolation::WorkerCount);
        }
        Ok(Self {
            worker_count,
            logger,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Spawns every task and returns immediately. Must be called from within a
    /// tokio runtime.
    pub fn submit_all(
        &self,
        source: Arc<PixelSource>,
        tasks: Vec<TransformTask>,
        cancel: CancelSource,
    ) -> (TransformStream, ScheduleHandle) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(self.worker_count));
        let outcomes = Arc::new(Mutex::new(Outcomes::default()));

        self.logger.debug(format_args!(
            "submitting {} transform tasks to {} workers",
            tasks.len(),
            self.worker_count
        ));

        let workers = tasks
            .into_iter()
            .map(|task| {
                let source = source.clone();
                let permits = permits.clone();
                let outcomes = outcomes.clone();
                let events = event_sender.clone();
                let token = cancel.token();
                let logger = self.logger.clone();
                tokio::spawn(async move {
                    run_task(task, source, permits, token, outcomes, events, logger).await;
                })
            })
            .collect();

        (
            event_receiver,
            ScheduleHandle {
                cancel,
                workers,
                outcomes,
                logger: self.logger.clone(),
            },
        )
    }
}

async fn run_task(
    task: TransformTask,
    source: Arc<PixelSource>,
    permits: Arc<Semaphore>,
    token: CancelToken,
    outcomes: Arc<Mutex<Outcomes>>,
    events: mpsc::UnboundedSender<TransformEvent>,
    logger: SessionLogger,
) {
    let label = task.label();
    let outcome = execute(task, &label, source, &permits, &token, &logger).await;

    let mut outcomes = outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match outcome {
        TaskOutcome::Finished(Ok(results)) => {
            for result in results {
                outcomes.results.push(result.clone());
                // A dropped receiver is fine; the aggregate still gets the result.
                let _ = events.send(TransformEvent::Completed(result));
            }
        }
        TaskOutcome::Finished(Err(failure)) => {
            logger.error(format_args!("{failure}"));
            outcomes.failures.push(failure.clone());
            let _ = events.send(TransformEvent::Failed(failure));
        }
        TaskOutcome::Skipped => {
            logger.warn(format_args!("skipped '{label}': run was cancelled"));
            outcomes.skipped.push(label.clone());
            let _ = events.send(TransformEvent::Skipped { label });
        }
        TaskOutcome::Abandoned => {
            logger.debug(format_args!("discarded '{label}': run was cancelled mid-flight"));
        }
    }
}

async fn execute(
    task: TransformTask,
    label: &str,
    source: Arc<PixelSource>,
    permits: &Semaphore,
    token: &CancelToken,
    logger: &SessionLogger,
) -> TaskOutcome {
    let _permit = tokio::select! {
        permit = permits.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskOutcome::Skipped,
        },
        _ = token.cancelled() => return TaskOutcome::Skipped,
    };
    if token.is_cancelled() {
        return TaskOutcome::Skipped;
    }

    logger.debug(format_args!("starting '{label}'"));
    let started = Instant::now();
    let compute = tokio::task::spawn_blocking(move || task.run(&source));

    let joined = tokio::select! {
        joined = compute => joined,
        _ = token.cancelled() => return TaskOutcome::Abandoned,
    };

    let outcome = match joined {
        Ok(Ok(results)) => Ok(results),
        Ok(Err(violation)) => Err(TaskFailure {
            label: label.to_string(),
            message: violation.to_string(),
        }),
        Err(error) => Err(TaskFailure {
            label: label.to_string(),
            message: panic_message(error),
        }),
    };
    logger.debug(format_args!(
        "finished '{label}' in {:.2?}",
        started.elapsed()
    ));
    TaskOutcome::Finished(outcome)
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Control side of one submission.
pub struct ScheduleHandle {
    cancel: CancelSource,
    workers: Vec<JoinHandle<()>>,
    outcomes: Arc<Mutex<Outcomes>>,
    logger: SessionLogger,
}

impl ScheduleHandle {
    /// Best effort: tasks that have not started are skipped and in-flight results
    /// are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for every task to report and returns the full breakdown.
    pub async fn join(self) -> ScheduleReport {
        for joined in join_all(self.workers).await {
            if let Err(error) = joined {
                // run_task records its own outcome; only a runtime shutdown lands here.
                self.logger.error(format_args!("transform worker lost: {error}"));
            }
        }
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ScheduleReport {
            results: std::mem::take(&mut outcomes.results),
            failures: std::mem::take(&mut outcomes.failures),
            skipped: std::mem::take(&mut outcomes.skipped),
        }
    }

    /// Completion-ordered results of every task that delivered.
    pub async fn await_all(self) -> Vec<TransformResult> {
        self.join().await.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::channel::Argb;
    use crate::core_modules::codec::BufferEncoding;
    use crate::core_modules::pixel_source::PixelAccess;
    use crate::transforms::{TransformOptions, catalogue};
    use std::collections::HashSet;
    use std::time::Duration;

    fn small_source() -> Arc<PixelSource> {
        let pixels: Vec<Argb> = (0..16u32).map(|i| Argb::from_word(i.wrapping_mul(0x0103_0507))).collect();
        Arc::new(PixelSource::from_argb(4, 4, true, BufferEncoding::Generic, &pixels).unwrap())
    }

    fn expected_images(has_alpha: bool) -> usize {
        catalogue(has_alpha, &TransformOptions::default())
            .iter()
            .map(TransformTask::output_count)
            .sum()
    }

    #[test]
    fn zero_workers_are_rejected() {
        assert_eq!(
            TransformScheduler::new(0, SessionLogger::silent()).unwrap_err(),
            PreconditionViolation::WorkerCount
        );
    }

    #[tokio::test]
    async fn every_task_delivers_when_not_cancelled() {
        let scheduler = TransformScheduler::new(3, SessionLogger::silent()).unwrap();
        let tasks = catalogue(true, &TransformOptions::default());
        let (mut stream, handle) = scheduler.submit_all(small_source(), tasks, CancelSource::new());

        let mut streamed = Vec::new();
        while let Some(event) = stream.recv().await {
            match event {
                TransformEvent::Completed(result) => streamed.push(result.label),
                other => panic!("unexpected event {other:?}"),
            }
        }

        let report = handle.join().await;
        assert_eq!(report.results.len(), expected_images(true));
        assert!(report.failures.is_empty());
        assert!(report.skipped.is_empty());

        let aggregated: Vec<String> = report.results.iter().map(|r| r.label.clone()).collect();
        assert_eq!(streamed, aggregated);
        let unique: HashSet<&String> = aggregated.iter().collect();
        assert_eq!(unique.len(), aggregated.len());
    }

    #[tokio::test]
    async fn dropping_the_stream_still_fills_the_aggregate() {
        let scheduler = TransformScheduler::new(2, SessionLogger::silent()).unwrap();
        let tasks = catalogue(false, &TransformOptions::default());
        let source = Arc::new(
            PixelSource::from_argb(2, 2, false, BufferEncoding::Generic, &[Argb::opaque(1, 2, 3); 4]).unwrap(),
        );
        let (stream, handle) = scheduler.submit_all(source, tasks, CancelSource::new());
        drop(stream);
        assert_eq!(handle.await_all().await.len(), expected_images(false));
    }

    #[tokio::test]
    async fn cancelling_before_start_skips_everything() {
        let scheduler = TransformScheduler::new(4, SessionLogger::silent()).unwrap();
        let tasks = catalogue(true, &TransformOptions::default());
        let task_count = tasks.len();
        let cancel = CancelSource::new();
        cancel.cancel();

        let (_stream, handle) = scheduler.submit_all(small_source(), tasks, cancel);
        let report = tokio::time::timeout(Duration::from_secs(5), handle.join()).await.unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.skipped.len(), task_count);
    }

    /// Accessor that takes a while per pixel so cancellation lands mid-run.
    #[derive(Debug, Clone)]
    struct SlowAccess;

    impl PixelAccess for SlowAccess {
        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }

        fn argb(&self, x: u32, y: u32) -> Argb {
            std::thread::sleep(Duration::from_millis(2));
            Argb::opaque(x as u8, y as u8, 9)
        }

        fn boxed_clone(&self) -> Box<dyn PixelAccess> {
            Box::new(self.clone())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_runs_deliver_a_subset_without_blocking() {
        let scheduler = TransformScheduler::new(2, SessionLogger::silent()).unwrap();
        let source = Arc::new(PixelSource::from_accessor(Box::new(SlowAccess), false));
        let reference = PixelSource::from_argb(1, 1, false, BufferEncoding::Generic, &[Argb::opaque(0, 0, 0)]).unwrap();
        let all_labels: HashSet<String> = catalogue(false, &TransformOptions::default())
            .iter()
            .flat_map(|task| task.run(&reference).unwrap())
            .map(|result| result.label)
            .collect();

        let tasks = catalogue(false, &TransformOptions::default());
        let task_count = tasks.len();
        let (_stream, handle) = scheduler.submit_all(source, tasks, CancelSource::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        let report = tokio::time::timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        for result in &report.results {
            assert!(all_labels.contains(&result.label));
        }
        assert!(report.results.len() < all_labels.len());
        assert!(!report.skipped.is_empty());
        assert!(report.skipped.len() <= task_count);
    }

    #[tokio::test]
    async fn a_panicking_transform_fails_alone() {
        #[derive(Debug, Clone)]
        struct ExplodingAccess;

        impl PixelAccess for ExplodingAccess {
            fn dimensions(&self) -> (u32, u32) {
                (1, 1)
            }

            fn argb(&self, _: u32, _: u32) -> Argb {
                panic!("sensor on fire")
            }

            fn boxed_clone(&self) -> Box<dyn PixelAccess> {
                Box::new(self.clone())
            }
        }

        let scheduler = TransformScheduler::new(2, SessionLogger::silent()).unwrap();
        let healthy = small_source();
        let exploding = Arc::new(PixelSource::from_accessor(Box::new(ExplodingAccess), false));
        let tasks = catalogue(false, &TransformOptions::default());
        let task_count = tasks.len();

        let (_stream, handle) = scheduler.submit_all(exploding, tasks.clone(), CancelSource::new());
        let report = handle.join().await;
        // The alpha placeholder never reads a pixel, so it is the one survivor.
        let survivors: Vec<&str> = report.results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(survivors, vec!["Alpha channel"]);
        assert_eq!(report.failures.len(), task_count - 1);
        assert!(report.failures.iter().all(|f| f.message.contains("sensor on fire")));

        // Siblings of a failing task are unaffected.
        let (_stream, handle) = scheduler.submit_all(healthy, tasks, CancelSource::new());
        let report = handle.join().await;
        assert!(report.failures.is_empty());
    }
}
