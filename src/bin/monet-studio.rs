use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use eframe::egui;
use monet_studio::{
    gui::{MonetApp, WINDOW_SIZE, WINDOW_TITLE},
    inference::TextToImage,
    pipeline::DiffusionPipeline,
    state::AppState,
    Args,
};

fn run(args: Args) -> Result<()> {
    let pipeline = Arc::new(DiffusionPipeline::new(&args)?);
    tracing::info!(
        model = args.sd_version.display_name(),
        device = pipeline.device_label(),
        width = WINDOW_SIZE[0],
        height = WINDOW_SIZE[1],
        output_dir = %args.output_dir.display(),
        "app started"
    );

    let state = AppState::new(pipeline, args.prompt, args.output_dir, args.busy_policy);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(WINDOW_SIZE)
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(|cc| Ok(Box::new(MonetApp::new(cc, state)))),
    )
    .map_err(|err| anyhow::anyhow!("{err}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = args.init_tracing();
    args.check()?;
    run(args)
}
