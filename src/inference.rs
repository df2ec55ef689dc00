use std::ops::RangeInclusive;

use anyhow::Result;
use image::RgbImage;

/// Prompt used when the prompt box is empty or whitespace only.
pub const DEFAULT_PROMPT: &str = "A beautiful landscape";

pub const STEPS_RANGE: RangeInclusive<u32> = 1..=4;
pub const GUIDANCE_RANGE: RangeInclusive<f32> = 0.0..=2.0;

/// One text-to-image invocation, built from the controls at button press.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub steps: u32,
    pub guidance: f32,
}

impl GenerationRequest {
    /// Trims the prompt (falling back to [`DEFAULT_PROMPT`]) and clamps both
    /// parameters into their ranges.
    pub fn new(prompt: &str, steps: u32, guidance: f32) -> Self {
        let prompt = match prompt.trim() {
            "" => DEFAULT_PROMPT,
            trimmed => trimmed,
        };
        Self {
            prompt: prompt.to_string(),
            steps: clamp_steps(steps),
            guidance: clamp_guidance(guidance),
        }
    }
}

pub fn clamp_steps(steps: u32) -> u32 {
    steps.clamp(*STEPS_RANGE.start(), *STEPS_RANGE.end())
}

pub fn clamp_guidance(guidance: f32) -> f32 {
    if guidance.is_nan() {
        return *GUIDANCE_RANGE.start();
    }
    guidance.clamp(*GUIDANCE_RANGE.start(), *GUIDANCE_RANGE.end())
}

/// The black box turning a prompt into a picture.
///
/// Implementations are shared with the generation worker thread and run on a
/// compute device fixed when they were built. `on_step` is called with
/// `(completed, total)` as the diffusion loop advances.
pub trait TextToImage: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
        on_step: &mut dyn FnMut(usize, usize),
    ) -> Result<RgbImage>;

    /// Compute device, e.g. `CPU` or `CUDA`.
    fn device_label(&self) -> &str;

    fn model_label(&self) -> &str;
}
