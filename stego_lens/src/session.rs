// THEORY:
// The `session` module is the top-level API of the analysis engine. One
// `AnalysisSession` analyses one image: it loads the source, fans the transform
// catalogue out over the scheduler and hands the results back, while tracking
// where it is in its life cycle so that callers (a UI, a CLI, a test) can ask.
//
//   Idle -> Loading -> Loaded -> Transforming -> Done
//   Loading | Loaded           -> Failed
//   any non-terminal stage     -> Cancelled
//
// A failing transform only fails its own task, so a run that started always
// ends in `Done` or `Cancelled`.
//
// Every method takes `&self`; the mutable bits live behind a mutex that is never
// held across an await, so a session can be shared (`Arc<AnalysisSession>`) between
// the task driving it and whoever wants to cancel it.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cancel::CancelSource;
use crate::config::SessionConfig;
use crate::core_modules::pixel_source::PixelSource;
use crate::error::{LoadError, SessionError};
use crate::loader::{self, ImageSource};
use crate::logging::SessionLogger;
use crate::scheduler::{ScheduleHandle, ScheduleReport, TransformScheduler, TransformStream};
use crate::transforms::{TransformResult, catalogue};

/// Where a session is in its life cycle.
///
/// `Failed` is entered from `Loading` (the image could not be loaded) or from
/// `Loaded` (the run could not be prepared). `Transforming` never moves to
/// `Failed`: task failures travel on the result stream instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Idle,
    Loading,
    Loaded,
    Transforming,
    Done,
    Cancelled,
    Failed(SessionError),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Loading => "loading",
            Stage::Loaded => "loaded",
            Stage::Transforming => "transforming",
            Stage::Done => "done",
            Stage::Cancelled => "cancelled",
            Stage::Failed(_) => "failed",
        }
    }

    /// Done, cancelled or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Cancelled | Stage::Failed(_))
    }
}

/// Outcome of a load that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded { width: u32, height: u32, has_alpha: bool },
    Cancelled,
}

struct SessionState {
    stage: Stage,
    source: Option<Arc<PixelSource>>,
    schedule: Option<ScheduleHandle>,
}

pub struct AnalysisSession {
    config: SessionConfig,
    logger: SessionLogger,
    cancel: CancelSource,
    state: Mutex<SessionState>,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig, logger: SessionLogger) -> Self {
        Self {
            config,
            logger,
            cancel: CancelSource::new(),
            state: Mutex::new(SessionState {
                stage: Stage::Idle,
                source: None,
                schedule: None,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, state: &mut SessionState, next: Stage) {
        self.logger
            .info(format_args!("session {} -> {}", state.stage.name(), next.name()));
        state.stage = next;
    }

    /// Records a failure unless the session was cancelled in the meantime.
    fn fail(&self, error: SessionError) -> SessionError {
        let mut state = self.state();
        self.logger.error(format_args!("session failed: {error}"));
        if !state.stage.is_terminal() {
            self.transition(&mut state, Stage::Failed(error.clone()));
        }
        error
    }

    /// Decodes `source` on a dedicated blocking task. Only valid once, from `Idle`.
    pub async fn load(&self, source: ImageSource) -> Result<LoadStatus, SessionError> {
        {
            let mut state = self.state();
            if state.stage != Stage::Idle {
                return Err(SessionError::InvalidStage {
                    operation: "load",
                    stage: state.stage.name(),
                });
            }
            self.logger.info(format_args!("loading {}", source.describe()));
            self.transition(&mut state, Stage::Loading);
        }

        let token = self.cancel.token();
        let max_decoded_pixels = self.config.max_decoded_pixels;
        let decode = tokio::task::spawn_blocking(move || loader::load(source, max_decoded_pixels));

        let joined = tokio::select! {
            joined = decode => joined,
            _ = token.cancelled() => return Ok(LoadStatus::Cancelled),
        };

        let loaded = match joined {
            Ok(Ok(pixels)) => pixels,
            Ok(Err(error)) => {
                if token.is_cancelled() {
                    return Ok(LoadStatus::Cancelled);
                }
                return Err(self.fail(error.into()));
            }
            Err(error) => {
                if token.is_cancelled() {
                    return Ok(LoadStatus::Cancelled);
                }
                return Err(self.fail(LoadError::Worker(error.to_string()).into()));
            }
        };

        let mut state = self.state();
        if state.stage != Stage::Loading {
            return Ok(LoadStatus::Cancelled);
        }
        let status = LoadStatus::Loaded {
            width: loaded.width(),
            height: loaded.height(),
            has_alpha: loaded.has_alpha(),
        };
        self.logger.info(format_args!(
            "loaded {}x{} image ({})",
            loaded.width(),
            loaded.height(),
            if loaded.has_alpha() { "with alpha" } else { "opaque" }
        ));
        state.source = Some(Arc::new(loaded));
        self.transition(&mut state, Stage::Loaded);
        Ok(status)
    }

    /// Submits the whole catalogue for the loaded image and returns the
    /// completion-ordered result stream. Only valid from `Loaded`, and must be
    /// called from within a tokio runtime.
    pub fn run_transforms(&self) -> Result<TransformStream, SessionError> {
        let mut state = self.state();
        if state.stage != Stage::Loaded {
            return Err(SessionError::InvalidStage {
                operation: "run transforms",
                stage: state.stage.name(),
            });
        }
        let Some(source) = state.source.clone() else {
            return Err(SessionError::InvalidStage {
                operation: "run transforms",
                stage: state.stage.name(),
            });
        };

        let prepared = self.config.validate().and_then(|()| {
            let options = self.config.transform_options()?;
            let scheduler = TransformScheduler::new(self.config.worker_count, self.logger.clone())?;
            Ok((options, scheduler))
        });
        let (options, scheduler) = match prepared {
            Ok(prepared) => prepared,
            Err(violation) => {
                let error = SessionError::from(violation);
                self.logger.error(format_args!("session failed: {error}"));
                self.transition(&mut state, Stage::Failed(error.clone()));
                return Err(error);
            }
        };

        let tasks = catalogue(source.has_alpha(), &options);
        self.logger.info(format_args!(
            "running {} transforms on {} workers",
            tasks.len(),
            scheduler.worker_count()
        ));
        let (stream, handle) = scheduler.submit_all(source, tasks, self.cancel.clone());
        state.schedule = Some(handle);
        self.transition(&mut state, Stage::Transforming);
        Ok(stream)
    }

    /// Waits for the run to finish. Moves the session to `Done` unless it was
    /// cancelled, in which case the results delivered before cancellation are
    /// returned.
    pub async fn join(&self) -> Result<ScheduleReport, SessionError> {
        let handle = {
            let mut state = self.state();
            match state.schedule.take() {
                Some(handle) => handle,
                None if state.stage == Stage::Cancelled => return Ok(ScheduleReport::default()),
                None => {
                    return Err(SessionError::InvalidStage {
                        operation: "join",
                        stage: state.stage.name(),
                    });
                }
            }
        };

        let report = handle.join().await;

        let mut state = self.state();
        self.logger.info(format_args!(
            "{} images, {} failed tasks, {} skipped tasks",
            report.results.len(),
            report.failures.len(),
            report.skipped.len()
        ));
        if state.stage == Stage::Transforming {
            self.transition(&mut state, Stage::Done);
        }
        Ok(report)
    }

    pub async fn await_all(&self) -> Result<Vec<TransformResult>, SessionError> {
        self.join().await.map(|report| report.results)
    }

    /// Stops loading or transforming as soon as possible. No-op once terminal.
    pub fn cancel(&self) {
        let mut state = self.state();
        if state.stage.is_terminal() {
            return;
        }
        self.transition(&mut state, Stage::Cancelled);
        self.cancel.cancel();
    }

    pub fn stage(&self) -> Stage {
        self.state().stage.clone()
    }

    pub fn is_done(&self) -> bool {
        self.state().stage == Stage::Done
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().stage == Stage::Cancelled
    }

    /// The error that failed the session, if it failed.
    pub fn last_error(&self) -> Option<SessionError> {
        match &self.state().stage {
            Stage::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Independent deep copy of the loaded image.
    pub fn original(&self) -> Option<PixelSource> {
        self.state().source.as_ref().map(|source| source.clone_canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreconditionViolation;
    use crate::logging::capture::CaptureSink;
    use crate::scheduler::TransformEvent;
    use image::{DynamicImage, Rgb, RgbImage};
    use log::Level;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 17) as u8, (y * 29) as u8, (x ^ y) as u8])
        }))
    }

    fn session(worker_count: usize) -> AnalysisSession {
        let config = SessionConfig {
            worker_count,
            ..SessionConfig::default()
        };
        AnalysisSession::new(config, SessionLogger::silent())
    }

    #[tokio::test]
    async fn full_run_reaches_done() {
        let session = session(3);
        let status = session.load(ImageSource::Decoded(gradient(6, 4))).await.unwrap();
        assert_eq!(
            status,
            LoadStatus::Loaded {
                width: 6,
                height: 4,
                has_alpha: false
            }
        );
        assert_eq!(session.stage(), Stage::Loaded);

        let mut stream = session.run_transforms().unwrap();
        assert_eq!(session.stage(), Stage::Transforming);

        let mut streamed = 0;
        while let Some(event) = stream.recv().await {
            assert!(matches!(event, TransformEvent::Completed(_)));
            streamed += 1;
        }

        let results = session.await_all().await.unwrap();
        assert_eq!(results.len(), 40);
        assert_eq!(streamed, 40);
        assert!(session.is_done());
        assert!(results.iter().all(|r| r.image.width() == 6 && r.image.height() == 4));
    }

    #[tokio::test]
    async fn operations_out_of_order_are_rejected() {
        let session = session(1);
        assert_eq!(
            session.run_transforms().unwrap_err(),
            SessionError::InvalidStage {
                operation: "run transforms",
                stage: "idle"
            }
        );
        assert!(matches!(
            session.join().await,
            Err(SessionError::InvalidStage { operation: "join", .. })
        ));

        session.load(ImageSource::Decoded(gradient(2, 2))).await.unwrap();
        assert_eq!(
            session.load(ImageSource::Decoded(gradient(2, 2))).await.unwrap_err(),
            SessionError::InvalidStage {
                operation: "load",
                stage: "loaded"
            }
        );
        // Rejected calls leave the stage alone.
        assert_eq!(session.stage(), Stage::Loaded);
    }

    #[tokio::test]
    async fn load_errors_fail_the_session() {
        let session = session(1);
        let error = session
            .load(ImageSource::Bytes(b"GIF89a but not really".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(error, SessionError::Load(_)));
        assert_eq!(session.stage().name(), "failed");
        assert_eq!(session.last_error(), Some(error));
        assert!(session.original().is_none());
    }

    #[tokio::test]
    async fn invalid_configuration_fails_before_any_work() {
        let session = session(0);
        session.load(ImageSource::Decoded(gradient(2, 2))).await.unwrap();
        let error = session.run_transforms().unwrap_err();
        assert_eq!(error, SessionError::Precondition(PreconditionViolation::WorkerCount));
        assert_eq!(session.last_error(), Some(error));
    }

    #[tokio::test]
    async fn unsupported_unedited_output_is_rejected() {
        let config = SessionConfig {
            unedited_color_type: Some(image::ColorType::Rgb16),
            ..SessionConfig::default()
        };
        let session = AnalysisSession::new(config, SessionLogger::silent());
        session.load(ImageSource::Decoded(gradient(2, 2))).await.unwrap();
        assert!(matches!(
            session.run_transforms(),
            Err(SessionError::Precondition(PreconditionViolation::UnsupportedOutput(_)))
        ));
    }

    #[tokio::test]
    async fn failing_tasks_still_finish_the_run() {
        #[derive(Debug, Clone)]
        struct BrokenAccess;

        impl crate::core_modules::pixel_source::PixelAccess for BrokenAccess {
            fn dimensions(&self) -> (u32, u32) {
                (2, 2)
            }

            fn argb(&self, _: u32, _: u32) -> crate::core_modules::channel::Argb {
                panic!("unreadable pixel")
            }

            fn boxed_clone(&self) -> Box<dyn crate::core_modules::pixel_source::PixelAccess> {
                Box::new(self.clone())
            }
        }

        let session = session(2);
        let broken = PixelSource::from_accessor(Box::new(BrokenAccess), false);
        session.load(ImageSource::Pixels(broken)).await.unwrap();
        let _stream = session.run_transforms().unwrap();
        assert_eq!(session.stage(), Stage::Transforming);

        let report = session.join().await.unwrap();
        assert!(!report.failures.is_empty());
        assert_eq!(session.stage(), Stage::Done);
        assert_eq!(session.last_error(), None);
    }

    #[tokio::test]
    async fn cancel_before_load_is_terminal() {
        let session = session(1);
        session.cancel();
        assert!(session.is_cancelled());
        assert!(matches!(
            session.load(ImageSource::Decoded(gradient(2, 2))).await,
            Err(SessionError::InvalidStage { stage: "cancelled", .. })
        ));
        // Joining a cancelled session that never ran is empty, not an error.
        assert!(session.join().await.unwrap().results.is_empty());
    }

    #[tokio::test]
    async fn cancel_during_transforms_keeps_a_subset() {
        let session = session(1);
        session.load(ImageSource::Decoded(gradient(32, 32))).await.unwrap();
        let _stream = session.run_transforms().unwrap();
        session.cancel();

        let report = session.join().await.unwrap();
        assert!(report.results.len() <= 40);
        assert!(!report.skipped.is_empty());
        assert_eq!(session.stage(), Stage::Cancelled);

        // Terminal: a second cancel changes nothing.
        session.cancel();
        assert_eq!(session.stage(), Stage::Cancelled);
    }

    #[tokio::test]
    async fn original_is_an_independent_copy() {
        let session = session(1);
        let image = gradient(3, 3);
        session.load(ImageSource::Decoded(image.clone())).await.unwrap();
        let copy = session.original().unwrap();
        let reference = PixelSource::from_dynamic(image);
        assert_eq!(copy.pixels().collect::<Vec<_>>(), reference.pixels().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stage_transitions_are_logged() {
        let sink = Arc::new(CaptureSink::default());
        let session = AnalysisSession::new(
            SessionConfig {
                worker_count: 2,
                ..SessionConfig::default()
            },
            SessionLogger::new(sink.clone(), "stego_lens::test"),
        );
        session.load(ImageSource::Decoded(gradient(2, 2))).await.unwrap();
        let _stream = session.run_transforms().unwrap();
        session.await_all().await.unwrap();

        let info = sink.messages(Level::Info);
        for transition in [
            "session idle -> loading",
            "session loading -> loaded",
            "session loaded -> transforming",
            "session transforming -> done",
        ] {
            assert!(info.iter().any(|m| m == transition), "missing '{transition}' in {info:?}");
        }
        assert!(!sink.messages(Level::Debug).is_empty());
    }
}
