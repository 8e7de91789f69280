//! wgpu backend for the overlay.
//!
//! Draws into a render pass the host owns: the host begins the pass over its
//! own color and depth targets and calls [`WgpuOverlayRenderer::encode`] at
//! the point in its frame where custom layers render.
//!
//! Geometry is uploaded once per asset URL and shared by every instance of
//! that asset. Each draw gets one slot of a dynamic-offset uniform buffer
//! holding its MVP and shading parameters.

use std::borrow::Cow;
use std::collections::BTreeMap;

use formats::{FlatMaterial, LightRig, MeshPrimitive};
use foundation::bounds::Aabb3;
use foundation::ids::AssetUrl;
use glam::{Mat4, Vec3, Vec4};
use runtime::frame::Frame;
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::target::{DrawCommand, DrawTarget, OverlayBackend};

const OVERLAY_SHADER: &str = r#"
struct Draw {
    mvp: mat4x4<f32>,
    base_color: vec4<f32>,
    ambient: vec4<f32>,
    light_dir: vec4<f32>,
    // rgb: light color * intensity, a: diffuse weight
    light: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> instance: Draw;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) normal: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> VsOut {
    return VsOut(instance.mvp * vec4<f32>(position, 1.0), normal);
}

@fragment
fn fs_main(fs_in: VsOut, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    var n = normalize(fs_in.normal);
    if (!front) {
        n = -n;
    }
    let diffuse = max(dot(n, instance.light_dir.xyz), 0.0) * instance.light.a;
    let lit = instance.ambient.rgb + instance.light.rgb * diffuse;
    return vec4<f32>(instance.base_color.rgb * lit, 1.0);
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    mvp: [[f32; 4]; 4],
    base_color: [f32; 4],
    ambient: [f32; 4],
    light_dir: [f32; 4],
    light: [f32; 4],
}

impl DrawUniforms {
    fn new(command: &DrawCommand, lights: &LightRig) -> Self {
        let material = command.asset.material();
        let [r, g, b] = material.color.0;
        let ambient = lights.ambient.color.0.map(|c| c * lights.ambient.intensity);
        let light = lights.directional.color.0.map(|c| c * lights.directional.intensity);
        let dir = lights.directional.direction();
        Self {
            mvp: command.mvp.to_cols_array_2d(),
            base_color: [r, g, b, 1.0],
            ambient: [ambient[0], ambient[1], ambient[2], 0.0],
            light_dir: [dir[0], dir[1], dir[2], 0.0],
            light: [light[0], light[1], light[2], diffuse_weight(material)],
        }
    }
}

/// Metals reflect little diffuse light.
fn diffuse_weight(material: &FlatMaterial) -> f32 {
    1.0 - material.metalness.clamp(0.0, 1.0)
}

/// Expands an indexed primitive into one vertex per triangle corner, each
/// carrying its face normal, so every face shades flat.
pub fn flat_vertices(primitive: &MeshPrimitive) -> Vec<Vertex> {
    let mut out = Vec::with_capacity(primitive.indices.len());
    for tri in primitive.indices.chunks_exact(3) {
        let corner = |i: u32| primitive.positions.get(i as usize).copied();
        let (Some(a), Some(b), Some(c)) = (corner(tri[0]), corner(tri[1]), corner(tri[2])) else {
            continue;
        };
        let (va, vb, vc) = (Vec3::from(a), Vec3::from(b), Vec3::from(c));
        let normal = (vb - va).cross(vc - va).normalize_or_zero().to_array();
        for position in [a, b, c] {
            out.push(Vertex { position, normal });
        }
    }
    out
}

/// Bounds a renderer may cull against, for primitives that allow it.
fn cull_bounds(primitive: &MeshPrimitive) -> Option<Aabb3> {
    primitive.frustum_culled.then(|| primitive.bounds())
}

/// True when every corner of `bounds` lies beyond the same clip plane.
fn outside_clip(bounds: &Aabb3, mvp: Mat4) -> bool {
    if bounds.is_empty() {
        return true;
    }
    let (lo, hi) = (bounds.min, bounds.max);
    let corners: Vec<Vec4> = (0..8u8)
        .map(|i| {
            let pick = |bit: u8, a: f32, b: f32| if i & bit == 0 { a } else { b };
            mvp * Vec4::new(pick(1, lo.x, hi.x), pick(2, lo.y, hi.y), pick(4, lo.z, hi.z), 1.0)
        })
        .collect();
    let all = |beyond: fn(&Vec4) -> bool| corners.iter().all(beyond);
    all(|c| c.x < -c.w)
        || all(|c| c.x > c.w)
        || all(|c| c.y < -c.w)
        || all(|c| c.y > c.w)
        || all(|c| c.z < 0.0)
        || all(|c| c.z > c.w)
}

#[derive(Debug, Clone)]
pub struct OverlayTargetFormat {
    pub color: wgpu::TextureFormat,
    /// Depth format of the host pass; `None` draws without depth testing.
    pub depth: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl OverlayTargetFormat {
    pub fn new(color: wgpu::TextureFormat) -> Self {
        Self {
            color,
            depth: Some(wgpu::TextureFormat::Depth24Plus),
            sample_count: 1,
        }
    }
}

/// GPU handles and the host pass layout the overlay renders with.
#[derive(Debug, Clone)]
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: OverlayTargetFormat,
}

struct GpuPrimitive {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    cull_bounds: Option<Aabb3>,
}

struct GpuMesh {
    primitives: Vec<GpuPrimitive>,
    double_sided: bool,
}

struct QueuedDraw {
    url: AssetUrl,
    uniforms: DrawUniforms,
}

pub struct WgpuOverlayRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lights: LightRig,
    double_sided_pipeline: wgpu::RenderPipeline,
    culled_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    uniform_stride: u64,
    uniform_capacity: usize,
    meshes: BTreeMap<AssetUrl, GpuMesh>,
    draws: Vec<QueuedDraw>,
    staging: Vec<u8>,
}

const INITIAL_UNIFORM_SLOTS: usize = 16;

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl WgpuOverlayRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: &OverlayTargetFormat,
        lights: LightRig,
    ) -> Self {
        let uniform_size = std::mem::size_of::<DrawUniforms>() as u64;
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_stride = align_to(uniform_size, alignment);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(OVERLAY_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-draw-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(uniform_size),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = |label: &str, cull_mode: Option<wgpu::Face>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 12,
                                shader_location: 1,
                            },
                        ],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: format.color,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: format.depth.map(|depth| wgpu::DepthStencilState {
                    format: depth,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: format.sample_count.max(1),
                    ..Default::default()
                },
                multiview_mask: None,
                cache: None,
            })
        };
        let double_sided_pipeline = pipeline("overlay-pipeline-double-sided", None);
        let culled_pipeline = pipeline("overlay-pipeline-culled", Some(wgpu::Face::Back));

        let (uniform_buffer, bind_group) = Self::create_uniforms(
            device,
            &bind_group_layout,
            uniform_stride,
            uniform_size,
            INITIAL_UNIFORM_SLOTS,
        );

        Self {
            device: device.clone(),
            queue: queue.clone(),
            lights,
            double_sided_pipeline,
            culled_pipeline,
            bind_group_layout,
            uniform_buffer,
            bind_group,
            uniform_stride,
            uniform_capacity: INITIAL_UNIFORM_SLOTS,
            meshes: BTreeMap::new(),
            draws: Vec::new(),
            staging: Vec::new(),
        }
    }

    fn create_uniforms(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        uniform_size: u64,
        slots: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-draw-uniforms"),
            size: stride * slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-draw-bg"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(uniform_size),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn ensure_capacity(&mut self, slots: usize) {
        if slots <= self.uniform_capacity {
            return;
        }
        let capacity = slots.next_power_of_two();
        let (buffer, bind_group) = Self::create_uniforms(
            &self.device,
            &self.bind_group_layout,
            self.uniform_stride,
            std::mem::size_of::<DrawUniforms>() as u64,
            capacity,
        );
        debug!(from = self.uniform_capacity, to = capacity, "grew overlay uniform buffer");
        self.uniform_buffer = buffer;
        self.bind_group = bind_group;
        self.uniform_capacity = capacity;
    }

    fn upload(&mut self, url: &AssetUrl, command: &DrawCommand) {
        if self.meshes.contains_key(url.as_str()) {
            return;
        }
        let primitives: Vec<GpuPrimitive> = command
            .asset
            .primitives()
            .iter()
            .map(|p| (flat_vertices(p), cull_bounds(p)))
            .filter(|(v, _)| !v.is_empty())
            .map(|(vertices, cull_bounds)| GpuPrimitive {
                cull_bounds,
                vertex_buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("overlay-mesh-vb"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                vertex_count: vertices.len() as u32,
            })
            .collect();
        debug!(url = %url, primitives = primitives.len(), "uploaded overlay mesh");
        self.meshes.insert(
            url.clone(),
            GpuMesh {
                primitives,
                double_sided: command.asset.material().double_sided,
            },
        );
    }

    /// Assets currently resident on the GPU.
    pub fn uploaded_assets(&self) -> usize {
        self.meshes.len()
    }

    /// Draws queued by the last composed frame.
    pub fn queued_draws(&self) -> usize {
        self.draws.len()
    }

    /// Records the last composed frame into the host's render pass.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'_>) {
        let mut bound_double_sided = None;
        for (slot, draw) in self.draws.iter().enumerate() {
            let Some(mesh) = self.meshes.get(draw.url.as_str()) else {
                continue;
            };
            if bound_double_sided != Some(mesh.double_sided) {
                pass.set_pipeline(if mesh.double_sided {
                    &self.double_sided_pipeline
                } else {
                    &self.culled_pipeline
                });
                bound_double_sided = Some(mesh.double_sided);
            }
            let offset = slot as u64 * self.uniform_stride;
            pass.set_bind_group(0, &self.bind_group, &[offset as u32]);
            let mvp = Mat4::from_cols_array_2d(&draw.uniforms.mvp);
            for primitive in &mesh.primitives {
                if primitive
                    .cull_bounds
                    .is_some_and(|bounds| outside_clip(&bounds, mvp))
                {
                    continue;
                }
                pass.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
                pass.draw(0..primitive.vertex_count, 0..1);
            }
        }
    }
}

impl OverlayBackend for WgpuOverlayRenderer {
    type Context = WgpuContext;

    fn attach(context: WgpuContext, lights: &LightRig) -> Self {
        Self::new(&context.device, &context.queue, &context.format, *lights)
    }
}

impl DrawTarget for WgpuOverlayRenderer {
    fn begin_frame(&mut self, _frame: Frame) {
        self.draws.clear();
    }

    fn draw(&mut self, command: &DrawCommand) {
        self.upload(&command.asset_url, command);
        self.draws.push(QueuedDraw {
            url: command.asset_url.clone(),
            uniforms: DrawUniforms::new(command, &self.lights),
        });
    }

    fn end_frame(&mut self) {
        if self.draws.is_empty() {
            return;
        }
        self.ensure_capacity(self.draws.len());
        let stride = self.uniform_stride as usize;
        self.staging.clear();
        self.staging.resize(stride * self.draws.len(), 0);
        for (slot, draw) in self.draws.iter().enumerate() {
            let bytes = bytemuck::bytes_of(&draw.uniforms);
            self.staging[slot * stride..slot * stride + bytes.len()].copy_from_slice(bytes);
        }
        self.queue.write_buffer(&self.uniform_buffer, 0, &self.staging);
    }

    fn release(&mut self) {
        debug!(meshes = self.meshes.len(), "releasing overlay GPU resources");
        self.draws.clear();
        self.meshes.clear();
        self.staging = Vec::new();
    }
}
