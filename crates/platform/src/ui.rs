//! egui overlay: menu bar, view-controls panel, preferences, loading modal.

use std::path::PathBuf;

use egui::{Align2, Color32, Context, ProgressBar, RichText, Slider};
use glam::Vec3;

use crate::settings::{ControlScheme, UserSettings};

/// Read-only per-frame inputs for the overlay.
pub struct UiFrameInputs {
    pub busy: bool,
    pub progress: f32,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

/// View state the overlay edits in place.
pub struct UiState {
    pub light_azimuth_deg: f32,
    pub light_elevation_deg: f32,
    pub light_intensity: f32,
    pub light_color: [f32; 3],
    /// When false the light is a headlamp following the camera.
    pub static_lighting: bool,
    pub show_wireframe: bool,
    pub settings: UserSettings,
    /// Path picked from File ▸ Import this frame; consumed by the frame loop.
    pub requested_import: Option<PathBuf>,
    prefs_open: bool,
}

impl UiState {
    pub fn new(settings: UserSettings) -> Self {
        Self {
            light_azimuth_deg: 26.6,
            light_elevation_deg: 41.8,
            light_intensity: 1.0,
            light_color: [1.0, 1.0, 1.0],
            static_lighting: true,
            show_wireframe: false,
            settings,
            requested_import: None,
            prefs_open: false,
        }
    }

    /// World-space direction toward the light, from the panel's angles.
    pub fn light_dir(&self) -> Vec3 {
        let azimuth = self.light_azimuth_deg.to_radians();
        let elevation = self.light_elevation_deg.to_radians();
        Vec3::new(
            elevation.cos() * azimuth.cos(),
            elevation.sin(),
            elevation.cos() * azimuth.sin(),
        )
        .normalize_or_zero()
    }

    pub fn draw(&mut self, ctx: &Context, inputs: &UiFrameInputs) {
        self.menu_bar(ctx, inputs);
        self.view_controls(ctx, inputs);
        self.preferences_window(ctx);
        self.loading_modal(ctx, inputs);
    }

    fn menu_bar(&mut self, ctx: &Context, inputs: &UiFrameInputs) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    ui.add_enabled_ui(!inputs.busy, |ui| {
                        if ui.button("Import…").clicked() {
                            if let Some(path) = rfd::FileDialog::new()
                                .add_filter("Wavefront OBJ", &["obj", "OBJ"])
                                .pick_file()
                            {
                                self.requested_import = Some(path);
                            }
                            ui.close_menu();
                        }
                    });
                });
                ui.menu_button("View", |ui| {
                    ui.checkbox(&mut self.show_wireframe, "Wireframe");
                });
                ui.menu_button("Edit", |ui| {
                    if ui.button("Preferences…").clicked() {
                        self.prefs_open = true;
                        ui.close_menu();
                    }
                });
            });
        });
    }

    fn view_controls(&mut self, ctx: &Context, inputs: &UiFrameInputs) {
        egui::Window::new("View Controls")
            .anchor(Align2::RIGHT_TOP, [-18.0, 8.0])
            .title_bar(false)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.label(RichText::new("View Controls").strong());
                ui.separator();

                ui.horizontal(|ui| {
                    ui.label(format!("Vertices: {}", inputs.vertex_count));
                    ui.label(format!("Triangles: {}", inputs.triangle_count));
                });

                ui.add_space(6.0);
                ui.separator();
                ui.label("Lighting");
                ui.separator();

                ui.add_enabled_ui(self.static_lighting, |ui| {
                    ui.add(
                        Slider::new(&mut self.light_azimuth_deg, -180.0..=180.0).text("Azimuth"),
                    );
                    ui.add(
                        Slider::new(&mut self.light_elevation_deg, -89.0..=89.0).text("Elevation"),
                    );
                });

                ui.add(
                    Slider::new(&mut self.light_intensity, 0.0..=4.0)
                        .text("Intensity")
                        .fixed_decimals(2),
                );

                ui.horizontal(|ui| {
                    ui.color_edit_button_rgb(&mut self.light_color);
                    ui.label("Light Color");
                });

                ui.add_space(4.0);
                ui.checkbox(&mut self.static_lighting, "Static Lighting");
                if !self.static_lighting {
                    ui.label(RichText::new("Headlamp light on").weak());
                }
            });
    }

    fn preferences_window(&mut self, ctx: &Context) {
        if !self.prefs_open {
            return;
        }
        let mut open = true;
        egui::Window::new("Preferences")
            .open(&mut open)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.label(RichText::new("General").strong());
                ui.separator();
                ui.label("Control scheme");
                ui.horizontal(|ui| {
                    ui.radio_value(
                        &mut self.settings.control_scheme,
                        ControlScheme::Industry,
                        "Industry",
                    );
                    ui.radio_value(
                        &mut self.settings.control_scheme,
                        ControlScheme::Blender,
                        "Blender",
                    );
                });
                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        if let Err(err) = self.settings.save() {
                            log::error!("failed to save settings: {err}");
                        }
                        self.prefs_open = false;
                    }
                    if ui.button("Cancel").clicked() {
                        // Revert in-memory changes to whatever is on disk.
                        self.settings = UserSettings::load_or_default();
                        self.prefs_open = false;
                    }
                });
            });
        if !open {
            self.prefs_open = false;
        }
    }

    fn loading_modal(&self, ctx: &Context, inputs: &UiFrameInputs) {
        if !inputs.busy {
            return;
        }
        let width = ctx.screen_rect().width() * 0.5;
        let fraction = inputs.progress.clamp(0.0, 1.0);
        egui::Window::new("loading_modal")
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .title_bar(false)
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.set_width(width);
                ui.colored_label(Color32::from_gray(230), "Loading model...");
                ui.add_space(6.0);
                ui.add(ProgressBar::new(fraction).desired_width(width - 24.0));
                ui.add_space(6.0);
                ui.label(format!("{}%", (fraction * 100.0).round() as i32));
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_dir_is_unit_length() {
        let state = UiState::new(UserSettings::default());
        let dir = state.light_dir();
        assert!((dir.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn elevation_controls_vertical_component() {
        let mut state = UiState::new(UserSettings::default());
        state.light_elevation_deg = 89.0;
        assert!(state.light_dir().y > 0.99);
        state.light_elevation_deg = -89.0;
        assert!(state.light_dir().y < -0.99);
    }
}
