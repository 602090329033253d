use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::debug;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::cloud::PointCloud;
use crate::scene::PortalScene;

/// Camera state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub view: Mat4,
    /// Vertical field of view in radians, needed to map point sizes from
    /// pixels to world units.
    pub fov_y: f32,
}

/// GPU renderer backed by wgpu drawing the assembled portal scene.
///
/// Props use an opaque flat-color pipeline; the particle cloud is drawn
/// after them as camera-facing instanced quads with alpha blending and
/// depth writes disabled, relying on the scene's back-to-front draw
/// order.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    prop_pipeline: wgpu::RenderPipeline,
    point_pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    props: Vec<PropBuffers>,
    points: Option<PointBuffers>,
}

impl Renderer {
    /// Initializes the GPU renderer and uploads the scene's geometry.
    pub async fn new(window: Arc<Window>, scene: &PortalScene) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        // The surface never outlives `window`; both live in the returned
        // struct.
        let surface = unsafe { instance.create_surface(window.as_ref()) }?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("renderer-device"),
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("renderer-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<GlobalUniform>() as u64)
                            .expect("non-zero uniform size"),
                    ),
                },
                count: None,
            }],
        });

        let prop_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prop-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<PropConstants>() as u64)
                            .expect("non-zero uniform size"),
                    ),
                },
                count: None,
            }],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let prop_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("prop-pipeline-layout"),
                bind_group_layouts: &[&global_layout, &prop_layout],
                push_constant_ranges: &[],
            });
        let prop_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("prop-pipeline"),
            layout: Some(&prop_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_prop",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_prop",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let point_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("point-pipeline-layout"),
                bind_group_layouts: &[&global_layout],
                push_constant_ranges: &[],
            });
        let point_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("point-pipeline"),
            layout: Some(&point_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_point",
                // The cloud's three parallel attribute buffers, advancing
                // per instance; the quad corners come from vertex_index.
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 1,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<f32>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32,
                            offset: 0,
                            shader_location: 2,
                        }],
                    },
                ],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                // Depth tested against the props but never written, so
                // the back-to-front blend order stays intact.
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_point",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let props = scene
            .props
            .iter()
            .map(|prop| PropBuffers::from_prop(&device, &prop_layout, prop))
            .collect();
        let points = (!scene.points.is_empty())
            .then(|| PointBuffers::from_cloud(&device, &scene.points, &scene.draw_order));
        debug!(
            "uploaded {} props and {} points to the GPU",
            scene.props.len(),
            scene.points.len()
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            prop_pipeline,
            point_pipeline,
            global_buffer,
            global_bind_group,
            props,
            points,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Updates the camera and intro-progress uniforms before rendering.
    pub fn update_globals(&self, camera: &CameraParams, intro_progress: f32) {
        // World-space camera basis from the view matrix rows.
        let right = Vec3::new(
            camera.view.x_axis.x,
            camera.view.y_axis.x,
            camera.view.z_axis.x,
        );
        let up = Vec3::new(
            camera.view.x_axis.y,
            camera.view.y_axis.y,
            camera.view.z_axis.y,
        );
        // Converts a pixel size at unit view depth into world units, the
        // same attenuation gl_PointSize pixels get.
        let pixels_to_world =
            2.0 * (camera.fov_y * 0.5).tan() / self.config.height.max(1) as f32;
        let uniform = GlobalUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_right: right.extend(0.0).into(),
            camera_up: up.extend(0.0).into(),
            params: [intro_progress, pixels_to_world, 0.0, 0.0],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws the scene, clearing to `clear_color`.
    pub fn render(&mut self, clear_color: Vec3) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear({
                        let linear = srgb_to_linear(clear_color);
                        wgpu::Color {
                            r: linear.x as f64,
                            g: linear.y as f64,
                            b: linear.z as f64,
                            a: 1.0,
                        }
                    }),
                    store: true,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: true,
                }),
                stencil_ops: None,
            }),
        });

        pass.set_pipeline(&self.prop_pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for prop in &self.props {
            pass.set_bind_group(1, &prop.bind_group, &[]);
            pass.set_vertex_buffer(0, prop.vertex.slice(..));
            pass.set_index_buffer(prop.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..prop.index_count, 0, 0..1);
        }

        if let Some(points) = &self.points {
            pass.set_pipeline(&self.point_pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            pass.set_vertex_buffer(0, points.positions.slice(..));
            pass.set_vertex_buffer(1, points.colors.slice(..));
            pass.set_vertex_buffer(2, points.sizes.slice(..));
            pass.draw(0..4, 0..points.count);
        }

        drop(pass); // explicit to satisfy lifetimes on some backends
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

struct PropBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    bind_group: wgpu::BindGroup,
}

impl PropBuffers {
    fn from_prop(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        prop: &crate::scene::Prop,
    ) -> Self {
        let positions: Vec<f32> = prop
            .mesh
            .positions
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect();
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-vertices", prop.name)),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-indices", prop.name)),
            contents: bytemuck::cast_slice(&prop.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let constants = PropConstants {
            color: srgb_to_linear(prop.color).extend(1.0).into(),
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-uniform", prop.name)),
            contents: bytes_of(&constants),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-bind-group", prop.name)),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });
        Self {
            vertex,
            index,
            index_count: prop.mesh.indices.len() as u32,
            bind_group,
        }
    }
}

struct PointBuffers {
    positions: wgpu::Buffer,
    colors: wgpu::Buffer,
    sizes: wgpu::Buffer,
    count: u32,
}

impl PointBuffers {
    /// Uploads the cloud attributes permuted into draw order, since
    /// instanced draws have no per-instance index buffer to reorder with.
    fn from_cloud(device: &wgpu::Device, cloud: &PointCloud, draw_order: &[u32]) -> Self {
        let mut positions = Vec::with_capacity(draw_order.len() * 3);
        let mut colors = Vec::with_capacity(draw_order.len() * 3);
        let mut sizes = Vec::with_capacity(draw_order.len());
        for &index in draw_order {
            let index = index as usize;
            let p = cloud.position(index);
            let c = srgb_to_linear(cloud.color(index));
            positions.extend_from_slice(&[p.x, p.y, p.z]);
            colors.extend_from_slice(&[c.x, c.y, c.z]);
            sizes.push(cloud.size(index));
        }
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("point-positions"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let colors = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("point-colors"),
            contents: bytemuck::cast_slice(&colors),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sizes = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("point-sizes"),
            contents: bytemuck::cast_slice(&sizes),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            positions,
            colors,
            sizes,
            count: draw_order.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Inverts the display encoding carried by sampled and configured colors.
/// The swapchain format is sRGB, so shader outputs must be linear or the
/// hardware encode would gamma-correct them a second time.
fn srgb_channel_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn srgb_to_linear(color: Vec3) -> Vec3 {
    Vec3::new(
        srgb_channel_to_linear(color.x),
        srgb_channel_to_linear(color.y),
        srgb_channel_to_linear(color.z),
    )
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_right: [f32; 4],
    camera_up: [f32; 4],
    /// x: intro progress, y: pixels-to-world factor at unit view depth.
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PropConstants {
    color: [f32; 4],
}

const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_right: vec4<f32>,
    camera_up: vec4<f32>,
    params: vec4<f32>,
}

struct PropConstants {
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> prop: PropConstants;

struct PropOutput {
    @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_prop(@location(0) position: vec3<f32>) -> PropOutput {
    var out: PropOutput;
    out.position = globals.view_proj * vec4<f32>(position, 1.0);
    return out;
}

@fragment
fn fs_prop() -> @location(0) vec4<f32> {
    return prop.color;
}

struct PointInput {
    @builtin(vertex_index) corner_index: u32,
    @location(0) center: vec3<f32>,
    @location(1) color: vec3<f32>,
    @location(2) size: f32,
}

struct PointOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn vs_point(input: PointInput) -> PointOutput {
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[input.corner_index];

    // clip.w is the view depth, so the quad covers the same pixel size a
    // screen-space point of `size * progress` pixels would.
    let center_clip = globals.view_proj * vec4<f32>(input.center, 1.0);
    let half_size = 0.5 * input.size * globals.params.x * globals.params.y
        * max(center_clip.w, 0.0);
    let world = input.center
        + (globals.camera_right.xyz * corner.x + globals.camera_up.xyz * corner.y) * half_size;

    var out: PointOutput;
    out.position = globals.view_proj * vec4<f32>(world, 1.0);
    out.color = input.color;
    out.uv = corner;
    return out;
}

@fragment
fn fs_point(input: PointOutput) -> @location(0) vec4<f32> {
    if (dot(input.uv, input.uv) > 1.0) {
        discard;
    }
    return vec4<f32>(input.color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_channel(value: f32) -> f32 {
        if value <= 0.0031308 {
            value * 12.92
        } else {
            1.055 * value.powf(1.0 / 2.4) - 0.055
        }
    }

    #[test]
    fn display_decode_inverts_the_encode() {
        for linear in [0.0, 0.001, 0.02, 0.18, 0.5, 0.735, 1.0] {
            let round_trip = srgb_channel_to_linear(encode_channel(linear));
            assert!(
                (round_trip - linear).abs() < 1e-5,
                "{linear} round-tripped to {round_trip}"
            );
        }
    }

    #[test]
    fn decode_maps_display_white_and_black_exactly() {
        assert_eq!(srgb_to_linear(Vec3::ZERO), Vec3::ZERO);
        assert!((srgb_to_linear(Vec3::ONE) - Vec3::ONE).length() < 1e-5);
    }
}
