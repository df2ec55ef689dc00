use eframe::egui::{self, RichText};

use super::theme::{
    status_color, ACCENT_1, ACCENT_2, BG_CARD, BG_PRIMARY, BG_SECONDARY, BORDER, TEXT_PRIMARY,
    TEXT_SECONDARY,
};
use crate::{
    inference::{GUIDANCE_RANGE, STEPS_RANGE},
    state::AppState,
    utils::PREVIEW_SIZE,
};

const CONTROLS_WIDTH: f32 = 380.0;
const WIDGET_WIDTH: f32 = 340.0;
const PLACEHOLDER: &str =
    "Your generated image will appear here\n\nEnter a prompt and click 'Generate Image'";

pub struct MonetApp {
    state: AppState,
    preview: Option<egui::TextureHandle>,
    preview_revision: u64,
}

fn card() -> egui::Frame {
    egui::Frame::new()
        .fill(BG_CARD)
        .corner_radius(egui::CornerRadius::same(12))
        .inner_margin(egui::Margin::same(20))
}

fn section_label(ui: &mut egui::Ui, text: &str) {
    ui.label(RichText::new(text).size(11.0).strong().color(TEXT_SECONDARY));
}

impl MonetApp {
    pub fn new(cc: &eframe::CreationContext<'_>, state: AppState) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        Self {
            state,
            preview: None,
            preview_revision: 0,
        }
    }

    /// Uploads the latest preview bitmap as a texture when it changed.
    fn sync_preview(&mut self, ctx: &egui::Context) {
        if self.state.preview_revision() == self.preview_revision {
            return;
        }
        self.preview_revision = self.state.preview_revision();
        if let Some(current) = self.state.current() {
            let (width, height) = current.preview.dimensions();
            let image = egui::ColorImage::from_rgb(
                [width as usize, height as usize],
                current.preview.as_raw(),
            );
            self.preview = Some(ctx.load_texture("preview", image, egui::TextureOptions::LINEAR));
        }
    }

    fn render_header(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.label(
                RichText::new("Image Generation")
                    .size(32.0)
                    .strong()
                    .color(TEXT_PRIMARY),
            );
            ui.label(
                RichText::new("Lightning-fast AI image generation")
                    .size(13.0)
                    .color(TEXT_SECONDARY),
            );
        });
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.label(
            RichText::new("Create Your Image")
                .size(22.0)
                .strong()
                .color(TEXT_PRIMARY),
        );
        ui.add_space(15.0);

        section_label(ui, "Describe your image");
        ui.add(
            egui::TextEdit::multiline(&mut self.state.prompt)
                .desired_rows(4)
                .desired_width(WIDGET_WIDTH)
                .font(egui::FontId::proportional(13.0)),
        );
        ui.add_space(12.0);

        section_label(ui, "Generation Settings");
        ui.add_space(8.0);
        self.render_sliders(ui);
        ui.add_space(15.0);

        self.render_trigger(ui);
        ui.add_space(8.0);

        ui.add(
            egui::ProgressBar::new(self.state.progress())
                .desired_width(WIDGET_WIDTH)
                .desired_height(6.0)
                .fill(ACCENT_1),
        );
        ui.add_space(5.0);

        let status = self.state.status();
        ui.add(
            egui::Label::new(
                RichText::new(&status.text)
                    .size(11.0)
                    .color(status_color(status.level)),
            )
            .wrap(),
        );
    }

    fn render_sliders(&mut self, ui: &mut egui::Ui) {
        ui.spacing_mut().slider_width = WIDGET_WIDTH;

        ui.label(RichText::new(self.state.steps_label()).size(10.0).color(TEXT_SECONDARY));
        let mut steps = self.state.steps();
        if ui
            .add(egui::Slider::new(&mut steps, STEPS_RANGE).show_value(false))
            .changed()
        {
            self.state.set_steps(steps);
        }

        ui.label(RichText::new(self.state.guidance_label()).size(10.0).color(TEXT_SECONDARY));
        let mut guidance = self.state.guidance();
        if ui
            .add(egui::Slider::new(&mut guidance, GUIDANCE_RANGE).show_value(false))
            .changed()
        {
            self.state.set_guidance(guidance);
        }
    }

    fn render_trigger(&mut self, ui: &mut egui::Ui) {
        let fill = if self.state.is_generating() {
            TEXT_SECONDARY
        } else {
            ACCENT_1
        };
        let button = egui::Button::new(
            RichText::new(self.state.trigger_label())
                .size(18.0)
                .strong()
                .color(TEXT_PRIMARY),
        )
        .fill(fill)
        .stroke(egui::Stroke::new(2.0, ACCENT_2))
        .corner_radius(egui::CornerRadius::same(12))
        .min_size(egui::vec2(WIDGET_WIDTH, 55.0));

        if ui.add_enabled(self.state.trigger_enabled(), button).clicked() {
            self.state.generate();
        }
    }

    fn render_display(&mut self, ui: &mut egui::Ui) {
        ui.label(
            RichText::new("Your Creation")
                .size(22.0)
                .strong()
                .color(TEXT_PRIMARY),
        );
        ui.add_space(10.0);

        let save_height = 45.0;
        let image_height = (ui.available_height() - save_height - 20.0).max(0.0);
        egui::Frame::new()
            .fill(BG_SECONDARY)
            .corner_radius(egui::CornerRadius::same(10))
            .stroke(egui::Stroke::new(2.0, BORDER))
            .show(ui, |ui| {
                ui.set_min_size(egui::vec2(ui.available_width(), image_height));
                ui.centered_and_justified(|ui| match &self.preview {
                    Some(texture) => {
                        let size = PREVIEW_SIZE as f32;
                        ui.add(
                            egui::Image::from_texture(egui::load::SizedTexture::from_handle(
                                texture,
                            ))
                            .max_size(egui::vec2(size, size)),
                        );
                    }
                    None => {
                        ui.label(RichText::new(PLACEHOLDER).size(14.0).color(TEXT_SECONDARY));
                    }
                });
            });
        ui.add_space(15.0);

        let save = egui::Button::new(
            RichText::new("Save Image")
                .size(14.0)
                .strong()
                .color(TEXT_PRIMARY),
        )
        .fill(BG_SECONDARY)
        .stroke(egui::Stroke::new(2.0, BORDER))
        .corner_radius(egui::CornerRadius::same(10))
        .min_size(egui::vec2(ui.available_width(), save_height));
        if ui.add(save).clicked() {
            self.state.save();
        }
    }

    fn render_footer(&self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.label(
                RichText::new(format!(
                    "Running on {} • {} Model • Ultra-fast generation",
                    self.state.device_label(),
                    self.state.model_label()
                ))
                .size(9.0)
                .color(TEXT_SECONDARY),
            );
        });
    }
}

impl eframe::App for MonetApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply updates posted by the generation worker
        self.state.poll();
        self.sync_preview(ctx);

        egui::TopBottomPanel::top("header")
            .frame(
                egui::Frame::new()
                    .fill(BG_SECONDARY)
                    .corner_radius(egui::CornerRadius::same(12))
                    .inner_margin(egui::Margin::same(16))
                    .outer_margin(egui::Margin::same(20)),
            )
            .show(ctx, |ui| self.render_header(ui));

        egui::TopBottomPanel::bottom("footer")
            .frame(egui::Frame::new().fill(BG_PRIMARY).inner_margin(egui::Margin::same(6)))
            .show(ctx, |ui| self.render_footer(ui));

        egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(CONTROLS_WIDTH)
            .frame(card().outer_margin(egui::Margin {
                left: 20,
                right: 10,
                top: 0,
                bottom: 20,
            }))
            .show(ctx, |ui| self.render_controls(ui));

        egui::CentralPanel::default()
            .frame(card().outer_margin(egui::Margin {
                left: 10,
                right: 20,
                top: 0,
                bottom: 20,
            }))
            .show(ctx, |ui| self.render_display(ui));

        // Keep polling while the worker is running
        if self.state.is_generating() {
            ctx.request_repaint();
        }
    }
}
