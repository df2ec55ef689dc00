pub mod inference;
pub mod model;
pub mod pipeline;
pub mod state;
pub mod utils;
pub mod worker;

#[cfg(feature = "gui")]
pub mod gui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use model::StableDiffusionVersion;
use thiserror::Error;
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Prompt shown in the prompt box at start-up.
pub const INITIAL_PROMPT: &str = "A serene landscape with mountains at sunset";

#[derive(Error, Debug)]
pub enum Error {
    #[error("tokenizer has no padding token {0:?}")]
    MissingPadToken(String),
    #[error("expected an image tensor of shape (3, height, width), got {0:?}")]
    InvalidImageShape(Vec<usize>),
    #[error("image generation panicked: {0}")]
    WorkerPanicked(String),
    #[error("{name} must be a positive multiple of 8, got {value}")]
    InvalidDimension { name: &'static str, value: usize },
}

/// What to do with a generation request that arrives while another one is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BusyPolicy {
    /// Ignore the request without any feedback.
    #[default]
    Drop,
    /// Ignore the request and say so on the status line.
    Reject,
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The prompt pre-filled in the prompt box.
    #[arg(long, default_value = INITIAL_PROMPT)]
    pub prompt: String,

    /// Run on CPU rather than on GPU.
    #[arg(long)]
    pub cpu: bool,

    /// Enable tracing (generates a trace-timestamp.json file).
    #[arg(long)]
    pub tracing: bool,

    /// The height in pixels of the generated image.
    #[arg(long)]
    pub height: Option<usize>,

    /// The width in pixels of the generated image.
    #[arg(long)]
    pub width: Option<usize>,

    /// The UNet weight file, in .safetensors format.
    #[arg(long, value_name = "FILE")]
    pub unet_weights: Option<String>,

    /// The CLIP weight file, in .safetensors format.
    #[arg(long, value_name = "FILE")]
    pub clip_weights: Option<String>,

    /// The second CLIP weight file (SDXL family only), in .safetensors format.
    #[arg(long, value_name = "FILE")]
    pub clip2_weights: Option<String>,

    /// The VAE weight file, in .safetensors format.
    #[arg(long, value_name = "FILE")]
    pub vae_weights: Option<String>,

    #[arg(long, value_name = "FILE")]
    /// The file specifying the tokenizer to used for tokenization.
    pub tokenizer: Option<String>,

    #[arg(long, value_name = "FILE")]
    /// The file specifying the second tokenizer (SDXL family only).
    pub tokenizer2: Option<String>,

    /// The size of the sliced attention or 0 for automatic slicing (disabled by default)
    #[arg(long)]
    pub sliced_attention_size: Option<usize>,

    #[arg(long, value_enum, default_value = "turbo")]
    pub sd_version: StableDiffusionVersion,

    #[arg(long)]
    pub use_flash_attn: bool,

    #[arg(long)]
    pub use_f16: bool,

    /// Directory receiving generated and saved images.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// How a generate request is handled while a generation is running.
    #[arg(long, value_enum, default_value = "drop")]
    pub busy_policy: BusyPolicy,
}

impl Args {
    pub fn check(&self) -> Result<()> {
        for (name, value) in [("height", self.height), ("width", self.width)] {
            if let Some(value) = value {
                if value == 0 || value % 8 != 0 {
                    return Err(Error::InvalidDimension { name, value }.into());
                }
            }
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("cannot create output directory {}", self.output_dir.display())
        })?;

        Ok(())
    }

    /// Installs the global subscriber. The returned guard flushes the chrome
    /// trace when dropped and must outlive the application.
    pub fn init_tracing(&self) -> Option<FlushGuard> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt = tracing_subscriber::fmt::layer().with_target(false);

        if self.tracing {
            let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt)
                .with(chrome_layer)
                .init();
            Some(guard)
        } else {
            tracing_subscriber::registry().with(filter).with(fmt).init();
            None
        }
    }
}
