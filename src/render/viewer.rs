//! Stage view widget
//!
//! Displays the composited frame: uploads the engine's pixel surface as an
//! egui texture once per UI frame and draws it aspect-fit in the available
//! space.

use eframe::egui::{self, Color32, TextureHandle, TextureOptions, Vec2};

use super::compositor::PixelSurface;

pub struct StageView {
    texture: Option<TextureHandle>,
    pub background: Color32,
}

impl Default for StageView {
    fn default() -> Self {
        Self::new()
    }
}

impl StageView {
    pub fn new() -> Self {
        Self {
            texture: None,
            background: Color32::from_gray(18),
        }
    }

    /// Upload the surface and draw it, letterboxed into the available area.
    pub fn show(&mut self, ui: &mut egui::Ui, surface: &PixelSurface) -> egui::Response {
        let width = surface.width();
        let height = surface.height();

        let available = ui.available_size();
        let (response, painter) =
            ui.allocate_painter(available, egui::Sense::hover());
        painter.rect_filled(response.rect, 4.0, self.background);

        if width == 0 || height == 0 {
            return response;
        }

        let image = egui::ColorImage::from_rgba_unmultiplied(
            [width as usize, height as usize],
            surface.data(),
        );
        let texture = match self.texture.take() {
            Some(mut texture) => {
                texture.set(image, TextureOptions::LINEAR);
                texture
            }
            None => ui
                .ctx()
                .load_texture("stage", image, TextureOptions::LINEAR),
        };
        let texture_id = texture.id();
        self.texture = Some(texture);

        let scale = (available.x / width as f32)
            .min(available.y / height as f32)
            .min(4.0);
        let size = Vec2::new(width as f32 * scale, height as f32 * scale);
        let rect = egui::Rect::from_center_size(response.rect.center(), size);

        painter.image(
            texture_id,
            rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            Color32::WHITE,
        );

        response
    }

    /// Drop the uploaded texture so a reloaded bundle starts clean.
    pub fn clear(&mut self) {
        self.texture = None;
    }
}
