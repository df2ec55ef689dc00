//! The single background unit of work behind the generate button.
//!
//! A worker owns nothing the UI thread touches. It reports back exclusively
//! through [`WorkerEvent`]s, and always ends with [`WorkerEvent::Finished`].

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc::SyncSender, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use chrono::Local;
use image::RgbImage;

use crate::{
    inference::{GenerationRequest, TextToImage},
    utils::{file_label, output_filename, preview},
    Error,
};

/// Capacity of the worker to UI channel.
pub const EVENT_CAPACITY: usize = 32;

const PROGRESS_PROMPT_READ: f32 = 0.3;
const PROGRESS_INFERRED: f32 = 0.7;
const PROGRESS_SAVED: f32 = 1.0;

/// A successfully generated image, as kept by the UI.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub image: Arc<RgbImage>,
    pub preview: Arc<RgbImage>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub text: String,
}

impl Status {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress(f32),
    ImageReady(GenerationResult),
    Status(Status),
    Finished,
}

/// Sends [`WorkerEvent::Finished`] when dropped, whatever way the worker exits.
struct FinishGuard(SyncSender<WorkerEvent>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.0.send(WorkerEvent::Finished);
    }
}

/// Starts the worker thread for `request`.
pub fn spawn_generation(
    engine: Arc<dyn TextToImage>,
    request: GenerationRequest,
    output_dir: PathBuf,
    events: SyncSender<WorkerEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("generation".to_string())
        .spawn(move || {
            let _finished = FinishGuard(events.clone());
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                generate(engine.as_ref(), &request, &output_dir, &events)
            }))
            .unwrap_or_else(|panic| Err(Error::WorkerPanicked(panic_message(panic.as_ref())).into()));

            let status = match outcome {
                Ok(result) => {
                    let file = file_label(&result.path);
                    tracing::info!(path = %result.path.display(), "image generated");
                    let _ = events.send(WorkerEvent::ImageReady(result));
                    Status::new(StatusLevel::Success, format!("Generated! Saved as {file}"))
                }
                Err(err) => {
                    tracing::error!("Error generating image: {err:#}");
                    Status::new(StatusLevel::Error, format!("Error: {err:#}"))
                }
            };
            let _ = events.send(WorkerEvent::Status(status));
        })
}

fn generate(
    engine: &dyn TextToImage,
    request: &GenerationRequest,
    output_dir: &Path,
    events: &SyncSender<WorkerEvent>,
) -> Result<GenerationResult> {
    let progress = |value: f32| {
        let _ = events.send(WorkerEvent::Progress(value));
    };
    progress(PROGRESS_PROMPT_READ);

    let image = engine.generate(request, &mut |done, total| {
        if total > 0 {
            let span = PROGRESS_INFERRED - PROGRESS_PROMPT_READ;
            progress(PROGRESS_PROMPT_READ + span * done as f32 / total as f32);
        }
    })?;
    progress(PROGRESS_INFERRED);

    let path = output_dir.join(output_filename("generated", &Local::now()));
    image
        .save(&path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    progress(PROGRESS_SAVED);

    let preview = preview(&image);
    Ok(GenerationResult {
        image: Arc::new(image),
        preview: Arc::new(preview),
        path,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::sync_channel;

    use super::*;
    use crate::state::tests::{temp_dir, FakeEngine};

    fn run(engine: FakeEngine, dir: &Path) -> Vec<WorkerEvent> {
        let (tx, rx) = sync_channel(EVENT_CAPACITY);
        let request = GenerationRequest::new("a lighthouse", 3, 0.0);
        spawn_generation(Arc::new(engine), request, dir.to_path_buf(), tx)
            .unwrap()
            .join()
            .unwrap();
        rx.try_iter().collect()
    }

    #[test]
    fn success_reports_progress_image_status_then_finished() {
        let dir = temp_dir("worker-success");
        let events = run(FakeEngine::default(), &dir);

        let progress: Vec<f32> = events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Progress(value) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(progress.first(), Some(&PROGRESS_PROMPT_READ));
        assert_eq!(progress.last(), Some(&PROGRESS_SAVED));
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1] + 1e-6));
        // one update per diffusion step between the staged values
        assert_eq!(progress.len(), 3 + 3);

        let tail = &events[events.len() - 3..];
        let WorkerEvent::ImageReady(result) = &tail[0] else {
            panic!("expected image, got {:?}", tail[0]);
        };
        assert!(result.path.exists());
        assert!(matches!(
            &tail[1],
            WorkerEvent::Status(Status { level: StatusLevel::Success, text }) if text.contains("generated_")
        ));
        assert!(matches!(tail[2], WorkerEvent::Finished));
    }

    #[test]
    fn failure_reports_error_then_finished() {
        let dir = temp_dir("worker-failure");
        let events = run(FakeEngine::failing("out of memory"), &dir);

        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::ImageReady(_))));
        let tail = &events[events.len() - 2..];
        assert!(matches!(
            &tail[0],
            WorkerEvent::Status(Status { level: StatusLevel::Error, text }) if text == "Error: out of memory"
        ));
        assert!(matches!(tail[1], WorkerEvent::Finished));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn panic_in_engine_is_contained() {
        let dir = temp_dir("worker-panic");
        let events = run(FakeEngine::panicking("tensor shape mismatch"), &dir);

        let tail = &events[events.len() - 2..];
        assert!(matches!(
            &tail[0],
            WorkerEvent::Status(Status { level: StatusLevel::Error, text })
                if text.contains("tensor shape mismatch")
        ));
        assert!(matches!(tail[1], WorkerEvent::Finished));
    }

    #[test]
    fn unwritable_output_dir_is_an_error() {
        let dir = temp_dir("worker-missing").join("does-not-exist");
        let events = run(FakeEngine::default(), &dir);

        assert!(events.iter().any(|e| matches!(
            e,
            WorkerEvent::Status(Status { level: StatusLevel::Error, text }) if text.contains("cannot write")
        )));
        assert!(matches!(events.last(), Some(WorkerEvent::Finished)));
    }
}
