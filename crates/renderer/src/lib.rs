//! Renderer: wgpu init + depth + the viewer's four passes
//! (background gradient, lit model, ground grid, wireframe overlay).
//! wgpu = 23.x, winit = 0.30.x
//!
//! Every wgpu object lives behind [`GpuState`] and is touched only on the
//! thread that owns it; background loads never reach in here.

use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::{
    util::DeviceExt,
    BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BlendState, Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites,
    CommandEncoder, CommandEncoderDescriptor, DepthBiasState, DepthStencilState, Device,
    DeviceDescriptor, Extent3d, Features, FragmentState, Instance, InstanceDescriptor, Limits,
    LoadOp, Operations, PipelineLayoutDescriptor, PowerPreference, PresentMode, PrimitiveTopology,
    Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStages,
    StoreOp, Surface, SurfaceConfiguration, SurfaceError, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsages, TextureView, TextureViewDescriptor, VertexBufferLayout,
    VertexState, VertexStepMode,
};

use winit::{dpi::PhysicalSize, window::Window};

use asset::MeshBuffers;
use corelib::camera::Camera;

pub mod mesh_gpu;
pub use mesh_gpu::{GpuMesh, ModelVertex};

/// Per-frame inputs computed by the platform layer.
#[derive(Clone, Copy, Debug)]
pub struct FrameParams {
    pub camera: Camera,
    pub model: Mat4,
    /// Direction toward the light, world space.
    pub light_dir: Vec3,
    pub light_intensity: f32,
    pub light_color: Vec3,
    pub wireframe: bool,
}

/// Hook for painting a 2D overlay (the egui layer) into the frame after the
/// 3D passes. Type-erased so this crate stays UI-toolkit-free.
pub type OverlayFn<'a> = &'a mut dyn FnMut(&Device, &Queue, &mut CommandEncoder, &TextureView);

/// Model/wireframe UBO (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Globals {
    mvp: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    /// xyz: direction toward the light, w: intensity
    light_dir: [f32; 4],
    light_color: [f32; 4],
}

/// Grid UBO: transform plus appearance constants.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GridParams {
    mvp: [[f32; 4]; 4],
    grid_color: [f32; 4],
    axis_color_x: [f32; 4],
    axis_color_y: [f32; 4],
    axis_color_z: [f32; 4],
    /// x: cell size, y: major every N, z: line thickness, w: axis factor
    params: [f32; 4],
}

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Half-extent of the ground grid quad on the XZ plane.
const GRID_RADIUS: f32 = 10.0;

const GRID_VERTICES: [[f32; 3]; 4] = [
    [-GRID_RADIUS, 0.0, -GRID_RADIUS],
    [GRID_RADIUS, 0.0, -GRID_RADIUS],
    [GRID_RADIUS, 0.0, GRID_RADIUS],
    [-GRID_RADIUS, 0.0, GRID_RADIUS],
];
const GRID_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

const GRID_VERTEX_LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
    array_stride: (3 * std::mem::size_of::<f32>()) as u64,
    step_mode: VertexStepMode::Vertex,
    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
};

pub struct GpuState {
    // Surface
    surface: Surface<'static>,
    surface_format: TextureFormat,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,

    // Pipelines
    background_pipeline: RenderPipeline,
    model_pipeline: RenderPipeline,
    grid_pipeline: RenderPipeline,
    wireframe_pipeline: RenderPipeline,

    // Uniforms
    globals_buf: Buffer,
    globals_bg: BindGroup,
    grid_buf: Buffer,
    grid_bg: BindGroup,

    // Static grid geometry
    grid_vertex_buf: Buffer,
    grid_index_buf: Buffer,

    // Current model; replaced wholesale when a load completes
    model: Option<GpuMesh>,

    // Depth
    depth_view: TextureView,

    // Size cache
    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> Self {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        // Instance & surface
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .expect("create_surface failed");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("No suitable GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Veles3D Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .expect("request_device failed");

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);

        // Configure surface
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        // Depth texture
        let depth_view = create_depth_view(&device, &surface_config);

        // ==== Shaders ====
        let background_shader = load_shader(
            &device,
            "Background WGSL",
            include_str!("shaders/background.wgsl"),
        );
        let model_shader = load_shader(&device, "Model WGSL", include_str!("shaders/model.wgsl"));
        let grid_shader = load_shader(&device, "Grid WGSL", include_str!("shaders/grid.wgsl"));
        let wireframe_shader = load_shader(
            &device,
            "Wireframe WGSL",
            include_str!("shaders/wireframe.wgsl"),
        );

        // ==== Uniform BGLs/BGs ====
        let globals_bgl = uniform_bgl(&device, "Globals BGL", std::mem::size_of::<Globals>());
        let globals_init = Globals {
            mvp: Mat4::IDENTITY.to_cols_array_2d(),
            model: Mat4::IDENTITY.to_cols_array_2d(),
            light_dir: [1.0, 1.0, 0.5, 1.0],
            light_color: [1.0, 1.0, 1.0, 0.0],
        };
        let globals_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globals UBO"),
            contents: bytemuck::bytes_of(&globals_init),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals BG"),
            layout: &globals_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });

        let grid_bgl = uniform_bgl(&device, "Grid BGL", std::mem::size_of::<GridParams>());
        let grid_init = grid_params(Mat4::IDENTITY);
        let grid_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid UBO"),
            contents: bytemuck::bytes_of(&grid_init),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let grid_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Grid BG"),
            layout: &grid_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: grid_buf.as_entire_binding(),
            }],
        });

        // ==== Pipelines ====
        let background_pipeline = build_pipeline(
            &device,
            "Background Pipeline",
            &background_shader,
            &[],
            &[],
            surface_format,
            PrimitiveTopology::TriangleList,
            None,
            // Behind everything, never writes depth.
            depth_state(wgpu::CompareFunction::Always, false),
        );
        let model_pipeline = build_pipeline(
            &device,
            "Model Pipeline",
            &model_shader,
            &[&globals_bgl],
            &[ModelVertex::LAYOUT],
            surface_format,
            PrimitiveTopology::TriangleList,
            Some(wgpu::Face::Back),
            depth_state(wgpu::CompareFunction::LessEqual, true),
        );
        let grid_pipeline = build_blended_pipeline(
            &device,
            "Grid Pipeline",
            &grid_shader,
            &[&grid_bgl],
            &[GRID_VERTEX_LAYOUT],
            surface_format,
            // Depth test on, depth writes off: the grid never occludes.
            depth_state(wgpu::CompareFunction::LessEqual, false),
        );
        let wireframe_pipeline = build_pipeline(
            &device,
            "Wireframe Pipeline",
            &wireframe_shader,
            &[&globals_bgl],
            &[ModelVertex::LAYOUT],
            surface_format,
            PrimitiveTopology::LineList,
            None,
            // LessEqual lets edges lying on the surface pass the depth test;
            // depth bias is not allowed on line topologies.
            depth_state(wgpu::CompareFunction::LessEqual, false),
        );

        // ==== Static grid geometry ====
        let grid_vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid VB"),
            contents: bytemuck::cast_slice(&GRID_VERTICES),
            usage: BufferUsages::VERTEX,
        });
        let grid_index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Grid IB"),
            contents: bytemuck::cast_slice(&GRID_INDICES),
            usage: BufferUsages::INDEX,
        });

        Self {
            surface,
            surface_format,
            surface_config,
            device,
            queue,
            background_pipeline,
            model_pipeline,
            grid_pipeline,
            wireframe_pipeline,
            globals_buf,
            globals_bg,
            grid_buf,
            grid_bg,
            grid_vertex_buf,
            grid_index_buf,
            model: None,
            depth_view,
            width,
            height,
        }
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    #[inline]
    pub fn surface_format(&self) -> TextureFormat {
        self.surface_format
    }

    #[inline]
    pub fn model(&self) -> Option<&GpuMesh> {
        self.model.as_ref()
    }

    /// Swap in freshly parsed geometry. Render thread only; the previous
    /// buffers are destroyed before the new ones are created so peak GPU
    /// memory stays at one model.
    pub fn replace_model(&mut self, mesh: &MeshBuffers) {
        if let Some(old) = self.model.take() {
            old.destroy();
        }
        let uploaded = GpuMesh::upload(&self.device, mesh);
        log::info!(
            "model uploaded: {} vertices, {} triangles, {} wireframe edges",
            uploaded.vertex_count(),
            uploaded.triangle_count(),
            uploaded.edge_index_count() / 2
        );
        self.model = Some(uploaded);
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Render one frame: background, model, grid, wireframe, then the
    /// overlay hook (if any) into the same swapchain texture.
    pub fn render(
        &mut self,
        frame: &FrameParams,
        overlay: Option<OverlayFn>,
    ) -> Result<(), SurfaceError> {
        let proj_view = frame.camera.proj_view();
        let globals = Globals {
            mvp: (proj_view * frame.model).to_cols_array_2d(),
            model: frame.model.to_cols_array_2d(),
            light_dir: [
                frame.light_dir.x,
                frame.light_dir.y,
                frame.light_dir.z,
                frame.light_intensity,
            ],
            light_color: [
                frame.light_color.x,
                frame.light_color.y,
                frame.light_color.z,
                0.0,
            ],
        };
        self.queue
            .write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&globals));

        let grid = grid_params(proj_view);
        self.queue
            .write_buffer(&self.grid_buf, 0, bytemuck::bytes_of(&grid));

        let surface_tex = self.surface.get_current_texture()?;
        let view = surface_tex.texture.create_view(&Default::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("ScenePass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.08,
                            b: 0.08,
                            a: 1.0,
                        }),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            rpass.set_pipeline(&self.background_pipeline);
            rpass.draw(0..3, 0..1);

            if let Some(mesh) = &self.model {
                if mesh.index_count() > 0 {
                    rpass.set_pipeline(&self.model_pipeline);
                    rpass.set_bind_group(0, &self.globals_bg, &[]);
                    rpass.set_vertex_buffer(0, mesh.vertex_buf().slice(..));
                    rpass.set_index_buffer(mesh.index_buf().slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..mesh.index_count(), 0, 0..1);
                }
            }

            rpass.set_pipeline(&self.grid_pipeline);
            rpass.set_bind_group(0, &self.grid_bg, &[]);
            rpass.set_vertex_buffer(0, self.grid_vertex_buf.slice(..));
            rpass.set_index_buffer(self.grid_index_buf.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..GRID_INDICES.len() as u32, 0, 0..1);

            if frame.wireframe {
                if let Some(mesh) = &self.model {
                    if mesh.edge_index_count() > 0 {
                        rpass.set_pipeline(&self.wireframe_pipeline);
                        rpass.set_bind_group(0, &self.globals_bg, &[]);
                        rpass.set_vertex_buffer(0, mesh.vertex_buf().slice(..));
                        rpass.set_index_buffer(
                            mesh.edge_buf().slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        rpass.draw_indexed(0..mesh.edge_index_count(), 0, 0..1);
                    }
                }
            }
        }

        if let Some(overlay) = overlay {
            overlay(&self.device, &self.queue, &mut encoder, &view);
        }

        self.queue.submit(Some(encoder.finish()));
        surface_tex.present();
        Ok(())
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }
}

fn load_shader(device: &Device, label: &str, source: &str) -> ShaderModule {
    device.create_shader_module(ShaderModuleDescriptor {
        label: Some(label),
        source: ShaderSource::Wgsl(source.into()),
    })
}

fn uniform_bgl(device: &Device, label: &str, size: usize) -> BindGroupLayout {
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        }],
    })
}

fn depth_state(compare: wgpu::CompareFunction, write: bool) -> DepthStencilState {
    DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: DepthBiasState::default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    device: &Device,
    label: &str,
    shader: &ShaderModule,
    bind_group_layouts: &[&BindGroupLayout],
    vertex_layouts: &[VertexBufferLayout],
    surface_format: TextureFormat,
    topology: PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    depth: DepthStencilState,
) -> RenderPipeline {
    pipeline_impl(
        device,
        label,
        shader,
        bind_group_layouts,
        vertex_layouts,
        surface_format,
        topology,
        cull_mode,
        depth,
        BlendState::REPLACE,
    )
}

fn build_blended_pipeline(
    device: &Device,
    label: &str,
    shader: &ShaderModule,
    bind_group_layouts: &[&BindGroupLayout],
    vertex_layouts: &[VertexBufferLayout],
    surface_format: TextureFormat,
    depth: DepthStencilState,
) -> RenderPipeline {
    pipeline_impl(
        device,
        label,
        shader,
        bind_group_layouts,
        vertex_layouts,
        surface_format,
        PrimitiveTopology::TriangleList,
        None,
        depth,
        BlendState::ALPHA_BLENDING,
    )
}

#[allow(clippy::too_many_arguments)]
fn pipeline_impl(
    device: &Device,
    label: &str,
    shader: &ShaderModule,
    bind_group_layouts: &[&BindGroupLayout],
    vertex_layouts: &[VertexBufferLayout],
    surface_format: TextureFormat,
    topology: PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    depth: DepthStencilState,
    blend: BlendState,
) -> RenderPipeline {
    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(blend),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(depth),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size: Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&TextureViewDescriptor::default())
}

/// Grid appearance: minor cells every unit, heavier line every 10, colored
/// X/Z axes, green origin dot.
fn grid_params(proj_view: Mat4) -> GridParams {
    GridParams {
        mvp: proj_view.to_cols_array_2d(),
        grid_color: [0.6, 0.6, 0.6, 1.0],
        axis_color_x: [0.79, 0.24, 0.28, 1.0],
        axis_color_y: [0.52, 0.84, 0.40, 1.0],
        axis_color_z: [0.47, 0.79, 0.24, 1.0],
        params: [1.0, 10.0, 0.5, 0.1],
    }
}
