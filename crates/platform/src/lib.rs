//! Platform layer: windowing, input, and the frame loop that drives the
//! viewer. Owns the egui overlay and the load coordinator; the renderer's
//! GPU state never leaves this thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use glam::{Mat4, Vec3};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::EventLoop,
    window::WindowAttributes,
};

use asset::{LoadCoordinator, LoadPoll, texture::TextureData};
use corelib::camera::OrbitCamera;
use renderer::{FrameParams, GpuState};

pub mod settings;
pub mod ui;

use settings::{ControlScheme, UserSettings};
use ui::{UiFrameInputs, UiState};

const WINDOW_TITLE: &str = "Veles3D";
const ICON_PATH: &str = "assets/icon.png";

/// What a middle-button drag does under the active control scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DragAction {
    Orbit,
    Pan,
}

fn drag_action(scheme: ControlScheme, alt: bool, shift: bool) -> DragAction {
    match scheme {
        ControlScheme::Industry => {
            if alt {
                DragAction::Orbit
            } else {
                DragAction::Pan
            }
        }
        ControlScheme::Blender => {
            if shift {
                DragAction::Pan
            } else {
                DragAction::Orbit
            }
        }
    }
}

#[derive(Default)]
struct MouseState {
    last_pos: Option<(f64, f64)>,
    middle_down: bool,
    alt_down: bool,
    shift_down: bool,
}

/// Run the viewer until the window closes.
pub fn run(
    backends: wgpu::Backends,
    width: u32,
    height: u32,
    model_path: PathBuf,
) -> Result<()> {
    let event_loop: EventLoop<()> = EventLoop::new()
        .map_err(|e| anyhow::anyhow!("Failed to create event loop: {e:?}"))?;

    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                WindowAttributes::default()
                    .with_title(WINDOW_TITLE)
                    .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
                    .with_window_icon(load_window_icon(Path::new(ICON_PATH))),
            )
            .map_err(|e| anyhow::anyhow!("Failed to create window: {e:?}"))?,
    );

    log::info!(
        "Window created: {}x{}",
        window.inner_size().width,
        window.inner_size().height
    );

    let mut gpu = pollster::block_on(GpuState::new(window.clone(), backends));

    // egui context + winit/wgpu plumbing
    let egui_ctx = egui::Context::default();
    let mut egui_state = egui_winit::State::new(
        egui_ctx.clone(),
        egui::ViewportId::ROOT,
        &window,
        Some(window.scale_factor() as f32),
        None,
        None,
    );
    let mut egui_renderer =
        egui_wgpu::Renderer::new(gpu.device(), gpu.surface_format(), None, 1, false);

    let mut ui_state = UiState::new(UserSettings::load_or_default());
    let mut orbit = OrbitCamera::default();
    let mut mouse = MouseState::default();

    let mut coordinator = LoadCoordinator::new();
    coordinator.start_initial_load(&model_path);

    #[allow(deprecated)]
    event_loop
        .run(move |event, window_target| {
            let event = match event {
                Event::WindowEvent { event, .. } => event,
                Event::AboutToWait => {
                    window.request_redraw();
                    return;
                }
                _ => return,
            };

            let response = egui_state.on_window_event(&window, &event);
            if response.repaint {
                window.request_redraw();
            }
            // Camera input pauses while the UI owns the pointer or a load is
            // in flight (matching the greyed-out import UI).
            let camera_enabled =
                !response.consumed && !egui_ctx.wants_pointer_input() && !coordinator.is_busy();

            match event {
                WindowEvent::CloseRequested => {
                    log::info!("Close requested. Exiting event loop.");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    gpu.resize(new_size.width, new_size.height);
                }
                WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                    log::info!("Scale factor changed: {scale_factor:.3}");
                }
                WindowEvent::ModifiersChanged(modifiers) => {
                    mouse.alt_down = modifiers.state().alt_key();
                    mouse.shift_down = modifiers.state().shift_key();
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Middle,
                    ..
                } => {
                    mouse.middle_down = state == ElementState::Pressed;
                }
                WindowEvent::CursorMoved { position, .. } => {
                    let (x, y) = (position.x, position.y);
                    if let Some((last_x, last_y)) = mouse.last_pos {
                        let (dx, dy) = ((x - last_x) as f32, (y - last_y) as f32);
                        if camera_enabled && mouse.middle_down {
                            match drag_action(
                                ui_state.settings.control_scheme,
                                mouse.alt_down,
                                mouse.shift_down,
                            ) {
                                DragAction::Orbit => orbit.orbit(dx, dy),
                                DragAction::Pan => orbit.pan(dx, dy),
                            }
                        }
                    }
                    // Always update, so a drag never starts with a jump.
                    mouse.last_pos = Some((x, y));
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    if camera_enabled {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => (pos.y / 50.0) as f32,
                        };
                        orbit.dolly(scroll);
                    }
                }
                WindowEvent::RedrawRequested => {
                    // Consume a finished background load; Ready is the only
                    // trigger for a GPU-side rebuild.
                    match coordinator.poll_completion() {
                        LoadPoll::Ready => gpu.replace_model(coordinator.current()),
                        LoadPoll::Failed => {
                            log::warn!("import failed; keeping the previous model");
                        }
                        LoadPoll::Idle | LoadPoll::Pending => {}
                    }

                    let (vertex_count, triangle_count) = gpu
                        .model()
                        .map(|m| (m.vertex_count(), m.triangle_count()))
                        .unwrap_or((0, 0));
                    let frame_inputs = UiFrameInputs {
                        busy: coordinator.is_busy(),
                        progress: coordinator.progress(),
                        vertex_count,
                        triangle_count,
                    };

                    let raw_input = egui_state.take_egui_input(&window);
                    let full_output =
                        egui_ctx.run(raw_input, |ctx| ui_state.draw(ctx, &frame_inputs));
                    let egui::FullOutput {
                        platform_output,
                        textures_delta,
                        shapes,
                        pixels_per_point,
                        ..
                    } = full_output;
                    egui_state.handle_platform_output(&window, platform_output);

                    if let Some(path) = ui_state.requested_import.take() {
                        coordinator.request_import(&path);
                    }

                    let primitives = egui_ctx.tessellate(shapes, pixels_per_point);
                    let size = window.inner_size();
                    let screen = egui_wgpu::ScreenDescriptor {
                        size_in_pixels: [size.width.max(1), size.height.max(1)],
                        pixels_per_point,
                    };

                    let camera = orbit.camera(gpu.aspect());
                    let light_dir = if ui_state.static_lighting {
                        ui_state.light_dir()
                    } else {
                        // Headlamp: the light rides with the camera.
                        orbit.forward()
                    };
                    let frame = FrameParams {
                        camera,
                        model: Mat4::IDENTITY,
                        light_dir,
                        light_intensity: ui_state.light_intensity,
                        light_color: Vec3::from(ui_state.light_color),
                        wireframe: ui_state.show_wireframe,
                    };

                    let mut overlay = |device: &wgpu::Device,
                                       queue: &wgpu::Queue,
                                       encoder: &mut wgpu::CommandEncoder,
                                       view: &wgpu::TextureView| {
                        for (id, delta) in &textures_delta.set {
                            egui_renderer.update_texture(device, queue, *id, delta);
                        }
                        egui_renderer.update_buffers(device, queue, encoder, &primitives, &screen);
                        {
                            let mut rpass = encoder
                                .begin_render_pass(&wgpu::RenderPassDescriptor {
                                    label: Some("EguiPass"),
                                    color_attachments: &[Some(
                                        wgpu::RenderPassColorAttachment {
                                            view,
                                            resolve_target: None,
                                            ops: wgpu::Operations {
                                                load: wgpu::LoadOp::Load,
                                                store: wgpu::StoreOp::Store,
                                            },
                                        },
                                    )],
                                    depth_stencil_attachment: None,
                                    occlusion_query_set: None,
                                    timestamp_writes: None,
                                })
                                .forget_lifetime();
                            egui_renderer.render(&mut rpass, &primitives, &screen);
                        }
                        for id in &textures_delta.free {
                            egui_renderer.free_texture(id);
                        }
                    };

                    match gpu.render(&frame, Some(&mut overlay)) {
                        Ok(()) => {}
                        Err(err) if GpuState::is_surface_lost(&err) => {
                            log::warn!("surface lost, reconfiguring: {err:?}");
                            gpu.recreate_surface();
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            log::error!("out of GPU memory, exiting");
                            window_target.exit();
                        }
                        Err(err) => log::warn!("frame skipped: {err:?}"),
                    }
                }
                _ => {}
            }
        })
        .map_err(|e| anyhow::anyhow!("Event loop error: {e:?}"))?;

    Ok(())
}

/// Decode the application icon; absence is fine.
fn load_window_icon(path: &Path) -> Option<winit::window::Icon> {
    let tex = TextureData::load_png(path).ok()?;
    winit::window::Icon::from_rgba(tex.data, tex.width, tex.height).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn industry_scheme_orbits_with_alt() {
        assert_eq!(
            drag_action(ControlScheme::Industry, true, false),
            DragAction::Orbit
        );
        assert_eq!(
            drag_action(ControlScheme::Industry, false, false),
            DragAction::Pan
        );
    }

    #[test]
    fn blender_scheme_pans_with_shift() {
        assert_eq!(
            drag_action(ControlScheme::Blender, false, false),
            DragAction::Orbit
        );
        assert_eq!(
            drag_action(ControlScheme::Blender, false, true),
            DragAction::Pan
        );
    }
}
