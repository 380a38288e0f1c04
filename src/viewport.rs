//! Zoom and pan state of the canvas.
//!
//! Screen coordinates are model coordinates scaled by `zoom` and shifted by
//! `translate`.

use crate::geometry::{Point, Rect, Size};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportOptions {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 3.0,
            zoom_step: 1.2,
            canvas_width: 1920.0,
            canvas_height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    zoom: f64,
    translate: Point,
    options: ViewportOptions,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ViewportOptions::default())
    }
}

impl Viewport {
    pub fn new(options: ViewportOptions) -> Self {
        Self {
            zoom: 1.0,
            translate: Point::default(),
            options,
        }
    }

    /// Restore a saved view. The zoom is clamped to the allowed range.
    pub fn restore(zoom: f64, translate: Point, options: ViewportOptions) -> Self {
        let mut viewport = Self::new(options);
        viewport.set_zoom(zoom);
        viewport.translate = translate;
        viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn translate(&self) -> Point {
        self.translate
    }

    pub fn canvas_size(&self) -> Size {
        Size::new(self.options.canvas_width, self.options.canvas_height)
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_finite() {
            zoom.clamp(self.options.min_zoom, self.options.max_zoom)
        } else {
            1.0
        };
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * self.options.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / self.options.zoom_step);
    }

    /// Zoom while keeping the model point under `screen` fixed.
    pub fn zoom_around(&mut self, factor: f64, screen: Point) {
        let anchor = self.to_model(screen);
        self.set_zoom(self.zoom * factor);
        self.translate = Point::new(
            screen.x - anchor.x * self.zoom,
            screen.y - anchor.y * self.zoom,
        );
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.translate.x += dx;
        self.translate.y += dy;
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.translate = Point::default();
    }

    /// Zoom and pan so `bounds` fills the canvas, leaving `padding` around it.
    pub fn fit_to(&mut self, bounds: Rect, padding: f64) {
        let available_w = (self.options.canvas_width - padding * 2.0).max(1.0);
        let available_h = (self.options.canvas_height - padding * 2.0).max(1.0);
        let zoom = if bounds.width > 0.0 && bounds.height > 0.0 {
            (available_w / bounds.width).min(available_h / bounds.height)
        } else {
            1.0
        };
        self.set_zoom(zoom);

        let center = bounds.center();
        self.translate = Point::new(
            self.options.canvas_width / 2.0 - center.x * self.zoom,
            self.options.canvas_height / 2.0 - center.y * self.zoom,
        );
    }

    pub fn to_model(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.translate.x) / self.zoom,
            (screen.y - self.translate.y) / self.zoom,
        )
    }

    pub fn to_screen(&self, model: Point) -> Point {
        Point::new(
            model.x * self.zoom + self.translate.x,
            model.y * self.zoom + self.translate.y,
        )
    }
}
