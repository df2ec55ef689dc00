pub mod app;
mod theme;

pub use app::MonetApp;

/// Initial window size.
pub const WINDOW_SIZE: [f32; 2] = [1200.0, 750.0];
pub const WINDOW_TITLE: &str = "Image Generation App";
