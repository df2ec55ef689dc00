// Dark "bento grid" palette.

use eframe::egui::Color32;

use crate::worker::StatusLevel;

pub const BG_PRIMARY: Color32 = Color32::from_rgb(0x0a, 0x0a, 0x0a);
pub const BG_SECONDARY: Color32 = Color32::from_rgb(0x14, 0x14, 0x14);
pub const BG_CARD: Color32 = Color32::from_rgb(0x1a, 0x1a, 0x1a);
pub const ACCENT_1: Color32 = Color32::from_rgb(0x63, 0x66, 0xf1);
pub const ACCENT_2: Color32 = Color32::from_rgb(0x8b, 0x5c, 0xf6);
pub const TEXT_PRIMARY: Color32 = Color32::WHITE;
pub const TEXT_SECONDARY: Color32 = Color32::from_rgb(0xa1, 0xa1, 0xaa);
pub const BORDER: Color32 = Color32::from_rgb(0x27, 0x27, 0x2a);

pub fn status_color(level: StatusLevel) -> Color32 {
    match level {
        StatusLevel::Info => TEXT_SECONDARY,
        StatusLevel::Success => Color32::from_rgb(0x4a, 0xde, 0x80),
        StatusLevel::Warning => Color32::from_rgb(0xfa, 0xcc, 0x15),
        StatusLevel::Error => Color32::from_rgb(0xf8, 0x71, 0x71),
    }
}
