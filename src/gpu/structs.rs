use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::utils::Handle;

#[cfg(feature = "nori-serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on color attachments in a render pass.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;
/// Upper bound on simultaneously bound bind groups (root parameter slots).
pub const MAX_BIND_GROUPS: usize = 4;
/// Largest control-point count a patch-list topology may encode.
pub const MAX_PATCH_CONTROL_POINTS: u8 = 32;

// Opaque resource categories. Public handles are typed on these markers;
// each backend resolves them into its own payload pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampler;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgram;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayout;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroup;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPass;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArray;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsPipeline;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipeline;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swapchain;

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum MemoryVisibility {
    Gpu,
    CpuAndGpu,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    Indirect,
}

bitflags! {
    /// Creation-time texture flags.
    ///
    /// `DATA_CONTAINS_MIPMAPS` and `GENERATE_MIPMAPS` select competing mip
    /// strategies; when both are set the provided data wins and generation
    /// is skipped with a warning.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        const DATA_CONTAINS_MIPMAPS = 0x1;
        const GENERATE_MIPMAPS      = 0x2;
        const RENDER_TARGET         = 0x4;
        const UNORDERED_ACCESS      = 0x8;
        const SHADER_RESOURCE       = 0x10;
    }
}

bitflags! {
    /// What an indirect buffer holds. Exactly one of the two must be set.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IndirectBufferFlags: u32 {
        const DRAW_ARGUMENTS         = 0x1;
        const DRAW_INDEXED_ARGUMENTS = 0x2;
    }
}

bitflags! {
    #[repr(C)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR   = 0x1;
        const DEPTH   = 0x2;
        const STENCIL = 0x4;
    }
}

unsafe impl Pod for ClearFlags {}
unsafe impl Zeroable for ClearFlags {}

/// GPU-consumed non-indexed draw arguments. Layout is bit-exact with what
/// the native APIs read out of an indirect buffer.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArguments {
    pub vertex_count_per_instance: u32,
    pub instance_count: u32,
    pub start_vertex_location: u32,
    pub start_instance_location: u32,
}

/// GPU-consumed indexed draw arguments.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedArguments {
    pub index_count_per_instance: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum Format {
    R8Unorm,
    R8Uint,
    RG8Unorm,
    #[default]
    RGBA8Unorm,
    RGBA8Srgb,
    BGRA8Unorm,
    R16Float,
    RGBA16Float,
    R32Uint,
    R32Float,
    RG32Float,
    RGB32Float,
    RGBA32Float,
    D32Float,
    D24S8,
    Bc1Rgba,
    Bc3Rgba,
}

impl Format {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Format::Bc1Rgba | Format::Bc3Rgba)
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Format::D32Float | Format::D24S8)
    }

    /// Bytes per texel for linear formats, `None` for block-compressed ones.
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            Format::R8Unorm | Format::R8Uint => Some(1),
            Format::RG8Unorm => Some(2),
            Format::RGBA8Unorm | Format::RGBA8Srgb | Format::BGRA8Unorm => Some(4),
            Format::R16Float => Some(2),
            Format::RGBA16Float => Some(8),
            Format::R32Uint | Format::R32Float => Some(4),
            Format::RG32Float => Some(8),
            Format::RGB32Float => Some(12),
            Format::RGBA32Float => Some(16),
            Format::D32Float => Some(4),
            Format::D24S8 => Some(4),
            Format::Bc1Rgba | Format::Bc3Rgba => None,
        }
    }

    /// Bytes per 4x4 block for compressed formats.
    pub fn block_bytes(&self) -> Option<u32> {
        match self {
            Format::Bc1Rgba => Some(8),
            Format::Bc3Rgba => Some(16),
            _ => None,
        }
    }

    /// Byte size of one mip level of `width` x `height` texels.
    pub fn mip_byte_size(&self, width: u32, height: u32) -> u32 {
        match self.block_bytes() {
            Some(block) => width.div_ceil(4) * height.div_ceil(4) * block,
            None => width * height * self.bytes_per_pixel().unwrap(),
        }
    }
}

/// Extent of mip level `level`, halving per level and clamping at one texel.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Number of levels in a full mip chain for the given base extent.
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Total byte size of `levels` mips over `layers` slices, walking the chain
/// and halving dimensions each level.
pub fn mip_chain_byte_size(format: Format, dim: [u32; 3], layers: u32, levels: u32) -> u32 {
    let mut total = 0;
    for level in 0..levels {
        let (w, h) = mip_extent(dim[0], dim[1], level);
        total += format.mip_byte_size(w, h) * dim[2].max(1);
    }
    total * layers.max(1)
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Hash, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum SampleCount {
    #[default]
    S1,
    S2,
    S4,
    S8,
}

impl SampleCount {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum BorderColor {
    OpaqueBlack,
    OpaqueWhite,
    TransparentBlack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct SamplerInfo<'a> {
    pub debug_name: &'a str,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
}

impl<'a> Default for SamplerInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare: None,
            min_lod: 0.0,
            max_lod: 1000.0,
            border_color: BorderColor::OpaqueBlack,
        }
    }
}

#[derive(Debug, Hash, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1280.0,
            h: 720.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Hash, Clone, Copy, Debug)]
pub struct BufferInfo<'a> {
    pub debug_name: &'a str,
    pub byte_size: u32,
    pub visibility: MemoryVisibility,
    pub usage: BufferUsage,
    /// Only meaningful for `BufferUsage::Indirect`; exactly one flag then.
    pub indirect_flags: IndirectBufferFlags,
    pub initial_data: Option<&'a [u8]>,
}

impl<'a> Default for BufferInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            byte_size: 1024,
            visibility: MemoryVisibility::CpuAndGpu,
            usage: BufferUsage::Uniform,
            indirect_flags: IndirectBufferFlags::empty(),
            initial_data: None,
        }
    }
}

pub struct TextureInfo<'a> {
    pub debug_name: &'a str,
    pub dim: [u32; 3],
    pub layers: u32,
    pub format: Format,
    pub mip_levels: u32,
    pub sample_count: SampleCount,
    pub flags: TextureFlags,
    pub initial_data: Option<&'a [u8]>,
}

impl<'a> Default for TextureInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            dim: [1, 1, 1],
            layers: 1,
            format: Format::RGBA8Unorm,
            mip_levels: 1,
            sample_count: SampleCount::S1,
            flags: TextureFlags::SHADER_RESOURCE,
            initial_data: None,
        }
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Fragment,
    Compute,
}

#[derive(Debug, Clone, Copy)]
pub enum ShaderSource<'a> {
    /// SPIR-V words, consumed by the Vulkan backend.
    SpirV(&'a [u32]),
    /// GLSL text, consumed by the GL backends.
    Glsl(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderStageInfo<'a> {
    pub stage: ShaderStage,
    pub source: ShaderSource<'a>,
    pub entry_point: &'a str,
}

impl<'a> Default for ShaderStageInfo<'a> {
    fn default() -> Self {
        Self {
            stage: ShaderStage::Vertex,
            source: ShaderSource::SpirV(&[]),
            entry_point: "main",
        }
    }
}

pub struct ShaderProgramInfo<'a> {
    pub debug_name: &'a str,
    pub stages: &'a [ShaderStageInfo<'a>],
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum DescriptorRangeType {
    UniformBuffer,
    ShaderResource,
    UnorderedAccess,
    Sampler,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum ShaderVisibility {
    #[default]
    All,
    Vertex,
    Fragment,
    Compute,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct DescriptorRange {
    pub ty: DescriptorRangeType,
    pub binding: u32,
    pub count: u32,
    pub visibility: ShaderVisibility,
}

impl Default for DescriptorRange {
    fn default() -> Self {
        Self {
            ty: DescriptorRangeType::UniformBuffer,
            binding: 0,
            count: 1,
            visibility: ShaderVisibility::All,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupLayoutInfo<'a> {
    pub debug_name: &'a str,
    pub ranges: &'a [DescriptorRange],
}

impl<'a> Default for BindGroupLayoutInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            ranges: &[],
        }
    }
}

/// A concrete resource bound against one descriptor-range entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBinding {
    UniformBuffer(Handle<Buffer>),
    StorageBuffer(Handle<Buffer>),
    SampledTexture(Handle<Texture>),
    StorageTexture(Handle<Texture>),
    Sampler(Handle<Sampler>),
}

impl ResourceBinding {
    pub fn is_valid(&self) -> bool {
        match self {
            ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => h.is_valid(),
            ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                h.is_valid()
            }
            ResourceBinding::Sampler(h) => h.is_valid(),
        }
    }

    /// Whether this binding satisfies a range of the given type.
    pub fn matches(&self, ty: DescriptorRangeType) -> bool {
        matches!(
            (self, ty),
            (ResourceBinding::UniformBuffer(_), DescriptorRangeType::UniformBuffer)
                | (ResourceBinding::SampledTexture(_), DescriptorRangeType::ShaderResource)
                | (ResourceBinding::StorageBuffer(_), DescriptorRangeType::UnorderedAccess)
                | (ResourceBinding::StorageTexture(_), DescriptorRangeType::UnorderedAccess)
                | (ResourceBinding::Sampler(_), DescriptorRangeType::Sampler)
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupInfo<'a> {
    pub debug_name: &'a str,
    pub layout: Handle<BindGroupLayout>,
    /// Root parameter slot this group binds to (descriptor set number).
    pub parameter_index: u32,
    pub bindings: &'a [ResourceBinding],
}

impl<'a> Default for BindGroupInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            layout: Handle::INVALID,
            parameter_index: 0,
            bindings: &[],
        }
    }
}

/// Flattens the ranges of one parameter slot into per-entry uniform-block
/// binding indices.
///
/// The GL backends bind uniform blocks in a separately numbered space, so
/// only `UniformBuffer`-typed entries receive indices, assigned sequentially
/// in entry order and unaffected by the position of other range types.
pub fn uniform_block_bindings(ranges: &[DescriptorRange]) -> Vec<Option<u32>> {
    let mut next = 0;
    let mut out = Vec::new();
    for range in ranges {
        for _ in 0..range.count.max(1) {
            if range.ty == DescriptorRangeType::UniformBuffer {
                out.push(Some(next));
                next += 1;
            } else {
                out.push(None);
            }
        }
    }
    out
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum VertexFormat {
    Float,
    Float2,
    Float3,
    Float4,
    UByte4Norm,
    UInt,
}

impl VertexFormat {
    pub fn byte_size(&self) -> u32 {
        match self {
            VertexFormat::Float => 4,
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
            VertexFormat::UByte4Norm => 4,
            VertexFormat::UInt => 4,
        }
    }
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum VertexStepRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer_index: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step: VertexStepRate,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexBufferBinding {
    pub buffer: Handle<Buffer>,
    pub layout: VertexBufferLayout,
}

pub struct VertexArrayInfo<'a> {
    pub debug_name: &'a str,
    pub buffers: &'a [VertexBufferBinding],
    pub attributes: &'a [VertexAttribute],
    pub index_buffer: Option<Handle<Buffer>>,
    pub index_type: IndexType,
}

impl<'a> Default for VertexArrayInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            buffers: &[],
            attributes: &[],
            index_buffer: None,
            index_type: IndexType::U32,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassInfo<'a> {
    pub debug_name: &'a str,
    /// Up to [`MAX_COLOR_ATTACHMENTS`] color attachment formats.
    pub color_formats: &'a [Format],
    pub depth_stencil_format: Option<Format>,
    pub samples: SampleCount,
}

impl<'a> Default for RenderPassInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            color_formats: &[],
            depth_stencil_format: None,
            samples: SampleCount::S1,
        }
    }
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    /// Tessellation patches with 1..=32 control points.
    PatchList(u8),
}

impl Default for Topology {
    fn default() -> Self {
        Topology::TriangleList
    }
}

impl Topology {
    pub fn patch_control_points(&self) -> Option<u8> {
        match self {
            Topology::PatchList(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Hash, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct RasterizerState {
    pub cull: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clamp: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull: CullMode::Back,
            front_face: FrontFace::Clockwise,
            depth_bias: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clamp: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare: CompareOp::Less,
        }
    }
}

#[derive(Hash, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum BlendFactor {
    One,
    Zero,
    SrcColor,
    InvSrcColor,
    #[default]
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
}

#[derive(Hash, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    InvSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct WriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl Default for WriteMask {
    fn default() -> Self {
        Self {
            r: true,
            g: true,
            b: true,
            a: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub struct ColorBlendState {
    pub enable: bool,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub src_alpha_blend: BlendFactor,
    pub dst_alpha_blend: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub write_mask: WriteMask,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_blend: BlendFactor::SrcAlpha,
            dst_blend: BlendFactor::InvSrcAlpha,
            blend_op: BlendOp::Add,
            src_alpha_blend: BlendFactor::SrcAlpha,
            dst_alpha_blend: BlendFactor::InvSrcAlpha,
            alpha_blend_op: BlendOp::Add,
            write_mask: WriteMask::default(),
        }
    }
}

pub struct GraphicsPipelineInfo<'a> {
    pub debug_name: &'a str,
    pub program: Handle<ShaderProgram>,
    pub bind_group_layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    pub render_pass: Handle<RenderPass>,
    pub topology: Topology,
    pub vertex_buffers: &'a [VertexBufferLayout],
    pub vertex_attributes: &'a [VertexAttribute],
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    /// One entry per render-pass color attachment.
    pub blend: &'a [ColorBlendState],
}

impl<'a> Default for GraphicsPipelineInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            program: Handle::INVALID,
            bind_group_layouts: [None; MAX_BIND_GROUPS],
            render_pass: Handle::INVALID,
            topology: Topology::TriangleList,
            vertex_buffers: &[],
            vertex_attributes: &[],
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            blend: &[],
        }
    }
}

pub struct ComputePipelineInfo<'a> {
    pub debug_name: &'a str,
    pub program: Handle<ShaderProgram>,
    pub bind_group_layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum WindowBuffering {
    #[default]
    Double,
    Triple,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainInfo<'a> {
    pub debug_name: &'a str,
    pub extent: Extent,
    pub format: Format,
    pub vsync: bool,
    pub buffering: WindowBuffering,
}

impl<'a> Default for SwapchainInfo<'a> {
    fn default() -> Self {
        Self {
            debug_name: "",
            extent: Extent {
                width: 1280,
                height: 720,
            },
            format: Format::BGRA8Unorm,
            vsync: true,
            buffering: WindowBuffering::Double,
        }
    }
}

/// Device capabilities relevant to validation, cached once per context.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    pub max_color_attachments: u32,
    pub max_patch_control_points: u32,
    pub max_anisotropy: f32,
    pub timestamps_supported: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_color_attachments: MAX_COLOR_ATTACHMENTS as u32,
            max_patch_control_points: MAX_PATCH_CONTROL_POINTS as u32,
            max_anisotropy: 16.0,
            timestamps_supported: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "nori-serde", derive(Serialize, Deserialize))]
pub enum BackendKind {
    Null,
    OpenGl,
    Vulkan,
}

pub struct ContextInfo {
    pub backend: BackendKind,
    /// Request native validation layers / debug output where available.
    pub validation: bool,
    pub app_name: String,
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self {
            backend: BackendKind::Null,
            validation: cfg!(debug_assertions),
            app_name: "nori".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_mip_sizes_halve_per_level() {
        let fmt = Format::RGBA8Unorm;
        assert_eq!(fmt.mip_byte_size(256, 256), 256 * 256 * 4);
        let (w, h) = mip_extent(256, 256, 1);
        assert_eq!((w, h), (128, 128));
        let (w, h) = mip_extent(256, 256, 8);
        assert_eq!((w, h), (1, 1));
        // Clamps at one texel past the end of the chain.
        let (w, h) = mip_extent(256, 256, 12);
        assert_eq!((w, h), (1, 1));
    }

    #[test]
    fn compressed_sizes_are_block_based() {
        assert_eq!(Format::Bc1Rgba.mip_byte_size(8, 8), 4 * 8);
        // Sub-block extents round up to a whole block.
        assert_eq!(Format::Bc1Rgba.mip_byte_size(1, 1), 8);
        assert_eq!(Format::Bc3Rgba.mip_byte_size(4, 4), 16);
    }

    #[test]
    fn full_chain_byte_size_walks_every_level() {
        // 4x4 RGBA8: levels are 4x4, 2x2, 1x1.
        let total = mip_chain_byte_size(Format::RGBA8Unorm, [4, 4, 1], 1, 3);
        assert_eq!(total, (16 + 4 + 1) * 4);
        // Two layers double the chain.
        let total = mip_chain_byte_size(Format::RGBA8Unorm, [4, 4, 1], 2, 3);
        assert_eq!(total, (16 + 4 + 1) * 4 * 2);
    }

    #[test]
    fn full_mip_count_matches_extent() {
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(256, 256), 9);
        assert_eq!(full_mip_count(256, 64), 9);
    }

    #[test]
    fn uniform_blocks_number_sequentially_across_mixed_ranges() {
        let ranges = [
            DescriptorRange {
                ty: DescriptorRangeType::UniformBuffer,
                binding: 0,
                count: 1,
                visibility: ShaderVisibility::Vertex,
            },
            DescriptorRange {
                ty: DescriptorRangeType::ShaderResource,
                binding: 1,
                count: 1,
                visibility: ShaderVisibility::Fragment,
            },
            DescriptorRange {
                ty: DescriptorRangeType::UniformBuffer,
                binding: 2,
                count: 1,
                visibility: ShaderVisibility::Fragment,
            },
        ];
        let blocks = uniform_block_bindings(&ranges);
        // Only the two uniform entries get indices, in order, regardless of
        // the shader-resource entry between them.
        assert_eq!(blocks, vec![Some(0), None, Some(1)]);
    }

    #[test]
    fn multi_count_ranges_flatten_into_entries() {
        let ranges = [
            DescriptorRange {
                ty: DescriptorRangeType::Sampler,
                binding: 0,
                count: 2,
                visibility: ShaderVisibility::All,
            },
            DescriptorRange {
                ty: DescriptorRangeType::UniformBuffer,
                binding: 2,
                count: 3,
                visibility: ShaderVisibility::All,
            },
        ];
        let blocks = uniform_block_bindings(&ranges);
        assert_eq!(blocks, vec![None, None, Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn binding_type_matching() {
        let buf = ResourceBinding::UniformBuffer(Handle::new(0, 0));
        assert!(buf.matches(DescriptorRangeType::UniformBuffer));
        assert!(!buf.matches(DescriptorRangeType::ShaderResource));
        let tex = ResourceBinding::SampledTexture(Handle::new(0, 0));
        assert!(tex.matches(DescriptorRangeType::ShaderResource));
        assert!(!tex.matches(DescriptorRangeType::Sampler));
    }
}
