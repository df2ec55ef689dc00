//! Application state owned by the UI thread.
//!
//! Widgets read from and write to [`AppState`]; the worker thread never sees
//! it and only talks back through the event channel drained by [`AppState::poll`].

use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{sync_channel, Receiver, TryRecvError},
        Arc,
    },
};

use anyhow::{Context, Result};
use chrono::Local;

use crate::{
    inference::{clamp_guidance, clamp_steps, GenerationRequest, TextToImage, STEPS_RANGE},
    utils::{file_label, output_filename},
    worker::{spawn_generation, GenerationResult, Status, StatusLevel, WorkerEvent, EVENT_CAPACITY},
    BusyPolicy,
};

pub const READY_STATUS: &str = "Ready to generate amazing images!";
pub const RUNNING_STATUS: &str = "Creating your masterpiece...";
pub const NOTHING_TO_SAVE_STATUS: &str = "No image to save yet!";
pub const BUSY_STATUS: &str = "A generation is already running";

pub const TRIGGER_IDLE_LABEL: &str = "Generate Image";
pub const TRIGGER_BUSY_LABEL: &str = "Generating...";

/// What a press of the generate button did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Started,
    /// A generation was already running and the press was dropped silently.
    Ignored,
    /// A generation was already running and the press was refused with a message.
    Rejected,
    /// The worker thread could not be created.
    Failed,
}

pub struct AppState {
    pub prompt: String,
    steps: u32,
    guidance: f32,
    generating: bool,
    progress: f32,
    status: Status,
    current: Option<GenerationResult>,
    preview_revision: u64,
    events: Option<Receiver<WorkerEvent>>,
    engine: Arc<dyn TextToImage>,
    output_dir: PathBuf,
    busy_policy: BusyPolicy,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn TextToImage>,
        prompt: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            steps: *STEPS_RANGE.start(),
            guidance: 0.0,
            generating: false,
            progress: 0.0,
            status: Status::new(StatusLevel::Info, READY_STATUS),
            current: None,
            preview_revision: 0,
            events: None,
            engine,
            output_dir: output_dir.into(),
            busy_policy,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn set_steps(&mut self, steps: u32) {
        self.steps = clamp_steps(steps);
    }

    pub fn steps_label(&self) -> String {
        format!("Steps: {}", self.steps)
    }

    pub fn guidance(&self) -> f32 {
        self.guidance
    }

    pub fn set_guidance(&mut self, guidance: f32) {
        self.guidance = clamp_guidance(guidance);
    }

    pub fn guidance_label(&self) -> String {
        format!("Guidance: {:.1}", self.guidance)
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn current(&self) -> Option<&GenerationResult> {
        self.current.as_ref()
    }

    /// Bumped every time a new preview arrives, so the view knows when to
    /// re-upload its texture.
    pub fn preview_revision(&self) -> u64 {
        self.preview_revision
    }

    pub fn trigger_label(&self) -> &'static str {
        if self.generating {
            TRIGGER_BUSY_LABEL
        } else {
            TRIGGER_IDLE_LABEL
        }
    }

    pub fn trigger_enabled(&self) -> bool {
        !self.generating
    }

    pub fn device_label(&self) -> &str {
        self.engine.device_label()
    }

    pub fn model_label(&self) -> &str {
        self.engine.model_label()
    }

    /// Generate button handler.
    pub fn generate(&mut self) -> GenerateOutcome {
        if self.generating {
            tracing::debug!("generation already running, request dropped");
            return match self.busy_policy {
                BusyPolicy::Drop => GenerateOutcome::Ignored,
                BusyPolicy::Reject => {
                    self.status = Status::new(StatusLevel::Warning, BUSY_STATUS);
                    GenerateOutcome::Rejected
                }
            };
        }

        let request = GenerationRequest::new(&self.prompt, self.steps, self.guidance);
        let (tx, rx) = sync_channel(EVENT_CAPACITY);
        match spawn_generation(self.engine.clone(), request, self.output_dir.clone(), tx) {
            Ok(_) => {
                self.generating = true;
                self.progress = 0.0;
                self.status = Status::new(StatusLevel::Info, RUNNING_STATUS);
                self.events = Some(rx);
                GenerateOutcome::Started
            }
            Err(err) => {
                tracing::error!("cannot start generation thread: {err}");
                self.status = Status::new(StatusLevel::Error, format!("Error: {err}"));
                GenerateOutcome::Failed
            }
        }
    }

    /// Applies every pending worker event. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(receiver) = &self.events {
            let event = match receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                // the worker is gone without saying so
                Err(TryRecvError::Disconnected) => WorkerEvent::Finished,
            };
            self.apply(event);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(progress) => self.progress = progress.clamp(0.0, 1.0),
            WorkerEvent::ImageReady(result) => {
                self.current = Some(result);
                self.preview_revision += 1;
            }
            WorkerEvent::Status(status) => self.status = status,
            WorkerEvent::Finished => {
                self.generating = false;
                self.progress = 0.0;
                self.events = None;
            }
        }
    }

    /// Save button handler. Returns the written path, if any.
    pub fn save(&mut self) -> Option<PathBuf> {
        let Some(current) = &self.current else {
            self.status = Status::new(StatusLevel::Warning, NOTHING_TO_SAVE_STATUS);
            return None;
        };

        match save_image(current, &self.output_dir) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "image saved");
                let file = file_label(&path);
                self.status = Status::new(StatusLevel::Success, format!("Saved as {file}"));
                Some(path)
            }
            Err(err) => {
                tracing::error!("Error saving image: {err:#}");
                self.status = Status::new(StatusLevel::Error, format!("Error: {err:#}"));
                None
            }
        }
    }
}

fn save_image(result: &GenerationResult, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(output_filename("saved", &Local::now()));
    result
        .image
        .save(&path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}
