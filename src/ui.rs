// src/ui.rs - Theme, orbit camera and the skeleton viewport
use crate::skeleton::{LineColor, Point, SkeletonCache};
use eframe::egui::{self, Color32, Pos2, Rect, Stroke};
use nalgebra::{Isometry3, Perspective3, Point3, Vector3};

#[derive(Debug, Clone)]
pub struct Theme {
    pub surface: Color32,
    pub error: Color32,
    pub success: Color32,
    pub text_secondary: Color32,
    pub viewport_clear: Color32,
    pub grid: Color32,
    pub grid_axis: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            surface: Color32::from_rgb(30, 30, 35),
            error: Color32::from_rgb(244, 67, 54),
            success: Color32::from_rgb(76, 175, 80),
            text_secondary: Color32::from_rgb(200, 200, 200),
            viewport_clear: Color32::from_gray(0xcc),
            grid: Color32::from_gray(0xb0),
            grid_axis: Color32::from_gray(0x88),
        }
    }
}

pub fn line_color(color: LineColor) -> Color32 {
    let [r, g, b] = color.rgb();
    Color32::from_rgb(r, g, b)
}

const FOV_Y_DEGREES: f64 = 75.0;
const Z_NEAR: f64 = 0.001;
const Z_FAR: f64 = 100.0;
const MIN_DISTANCE: f64 = 0.05;
const MAX_DISTANCE: f64 = 50.0;
const PITCH_LIMIT: f64 = 1.5;

/// Camera orbiting a target point. Starts at `z = -2` looking at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub target: Point3<f64>,
    pub distance: f64,
    pub yaw: f64,
    pub pitch: f64,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            distance: 2.0,
            yaw: std::f64::consts::PI,
            pitch: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self) -> Point3<f64> {
        let offset = Vector3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset * self.distance
    }

    pub fn view(&self) -> Isometry3<f64> {
        Isometry3::look_at_rh(&self.eye(), &self.target, &Vector3::y())
    }

    pub fn orbit(&mut self, dx: f64, dy: f64) {
        self.yaw -= dx;
        self.pitch = (self.pitch + dy).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn zoom(&mut self, factor: f64) {
        self.distance = (self.distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Moves the target in the camera's screen plane.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let view = self.view();
        let right = view.inverse_transform_vector(&Vector3::x());
        let up = view.inverse_transform_vector(&Vector3::y());
        self.target += (right * -dx + up * dy) * self.distance;
    }

    /// Screen position of `point` inside `rect`, or `None` behind the camera.
    pub fn project(&self, point: &Point, rect: Rect) -> Option<Pos2> {
        let aspect = (rect.width() / rect.height().max(1.0)) as f64;
        let projection = Perspective3::new(aspect, FOV_Y_DEGREES.to_radians(), Z_NEAR, Z_FAR);

        let in_view = self.view().transform_point(&Point3::from(*point));
        if in_view.z > -Z_NEAR {
            return None;
        }
        let ndc = projection.project_point(&in_view);
        let center = rect.center();
        Some(Pos2::new(
            center.x + ndc.x as f32 * rect.width() * 0.5,
            center.y - ndc.y as f32 * rect.height() * 0.5,
        ))
    }
}

/// Interactive 3D view of the skeleton cache.
pub struct SkeletonView {
    pub camera: OrbitCamera,
    pub theme: Theme,
    pub line_width: f32,
}

impl SkeletonView {
    pub fn new(theme: Theme) -> Self {
        Self {
            camera: OrbitCamera::default(),
            theme,
            line_width: 2.0,
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, cache: &SkeletonCache, show_grid: bool) {
        let size = ui.available_size();
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
        let rect = response.rect;

        let delta = response.drag_delta();
        if response.dragged_by(egui::PointerButton::Primary) {
            self.camera.orbit(delta.x as f64 * 0.01, delta.y as f64 * 0.01);
        } else if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            let scale = 1.0 / rect.height().max(1.0) as f64;
            self.camera.pan(delta.x as f64 * scale, delta.y as f64 * scale);
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.scroll_delta.y) as f64;
            if scroll != 0.0 {
                self.camera.zoom((-scroll * 0.002).exp());
            }
        }
        if response.double_clicked() {
            self.camera = OrbitCamera::default();
        }

        painter.rect_filled(rect, egui::Rounding::same(4.0), self.theme.viewport_clear);
        if show_grid {
            self.draw_grid(&painter, rect);
        }

        for (_, line) in cache.iter() {
            if line.is_collapsed() {
                continue;
            }
            let stroke = Stroke::new(self.line_width, line_color(line.color()));
            self.draw_polyline(&painter, rect, line.points(), stroke);
        }

        if cache.is_empty() {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "No frame loaded",
                egui::FontId::proportional(16.0),
                self.theme.surface,
            );
        }
    }

    fn draw_polyline(&self, painter: &egui::Painter, rect: Rect, points: &[Point], stroke: Stroke) {
        for pair in points.windows(2) {
            if let (Some(a), Some(b)) = (
                self.camera.project(&pair[0], rect),
                self.camera.project(&pair[1], rect),
            ) {
                painter.line_segment([a, b], stroke);
            }
        }
    }

    /// Reference grid on the z = 0 plane over [-1, 1].
    fn draw_grid(&self, painter: &egui::Painter, rect: Rect) {
        for i in -10..=10 {
            let t = i as f64 * 0.1;
            let color = if i == 0 { self.theme.grid_axis } else { self.theme.grid };
            let stroke = Stroke::new(1.0, color);
            let vertical = [Vector3::new(t, -1.0, 0.0), Vector3::new(t, 1.0, 0.0)];
            let horizontal = [Vector3::new(-1.0, t, 0.0), Vector3::new(1.0, t, 0.0)];
            self.draw_polyline(painter, rect, &vertical, stroke);
            self.draw_polyline(painter, rect, &horizontal, stroke);
        }
    }
}

/// Pulsing status badge drawn in the top-right corner of `rect`.
pub struct StatusBadge {
    pulse: f32,
}

impl StatusBadge {
    pub fn new() -> Self {
        Self { pulse: 0.0 }
    }

    pub fn draw(&mut self, ui: &egui::Ui, rect: Rect, label: &str, color: Color32) {
        self.pulse += ui.input(|i| i.unstable_dt) * 2.0;
        let glow = (self.pulse.sin() + 1.0) * 0.5;

        let pos = Pos2::new(rect.right() - 20.0, rect.top() + 20.0);
        let painter = ui.painter();
        painter.circle_filled(pos, 6.0 + glow * 2.0, color);
        painter.text(
            Pos2::new(pos.x - 14.0, pos.y),
            egui::Align2::RIGHT_CENTER,
            label,
            egui::FontId::proportional(14.0),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::from_min_size(Pos2::ZERO, egui::vec2(800.0, 600.0))
    }

    #[test]
    fn test_default_camera_sits_behind_origin() {
        let eye = OrbitCamera::default().eye();
        assert!((eye - Point3::new(0.0, 0.0, -2.0)).norm() < 1e-9);
    }

    #[test]
    fn test_origin_projects_to_center() {
        let pos = OrbitCamera::default().project(&Vector3::zeros(), rect()).unwrap();
        assert!((pos.x - 400.0).abs() < 1e-3);
        assert!((pos.y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_screen_orientation() {
        let camera = OrbitCamera::default();
        // Looking down +z, scene -x appears on the right and +y appears up.
        let right = camera.project(&Vector3::new(-0.5, 0.0, 0.0), rect()).unwrap();
        let up = camera.project(&Vector3::new(0.0, 0.5, 0.0), rect()).unwrap();
        assert!(right.x > 400.0);
        assert!(up.y < 300.0);
    }

    #[test]
    fn test_points_behind_camera_are_skipped() {
        let camera = OrbitCamera::default();
        assert!(camera.project(&Vector3::new(0.0, 0.0, -3.0), rect()).is_none());
    }

    #[test]
    fn test_zoom_and_pitch_are_clamped() {
        let mut camera = OrbitCamera::default();
        camera.zoom(1e-6);
        assert_eq!(camera.distance, MIN_DISTANCE);
        camera.orbit(0.0, 10.0);
        assert_eq!(camera.pitch, PITCH_LIMIT);
    }

    #[test]
    fn test_line_colors() {
        assert_eq!(line_color(LineColor::Red), Color32::from_rgb(0xff, 0, 0));
        assert_eq!(line_color(LineColor::Gray), Color32::from_rgb(0x33, 0x33, 0x33));
    }
}
