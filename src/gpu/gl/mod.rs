//! OpenGL / OpenGL ES 3 backend on top of `glow`.
//!
//! The windowing layer owns GL context creation; this backend wraps the
//! loaded function table, probes capabilities once at startup and translates
//! the abstract resource and command surface into GL calls. Upload strategy
//! (mutable `tex_image` per level vs immutable `tex_storage` plus
//! `tex_sub_image`) is chosen from the cached capabilities, never per call.

use glow::HasContext;
use log::{debug, error, warn};

use crate::gpu::driver::command::*;
use crate::gpu::error::{GpuError, Result};
use crate::gpu::structs::*;
use crate::gpu::validate;
use crate::utils::handle::retype;
use crate::utils::{Handle, Pool, Release};

mod conversions;
use conversions as conv;

// Extension constants glow does not expose by name.
const GL_MAX_PATCH_VERTICES: u32 = 0x8E7D;
const GL_PATCH_VERTICES: u32 = 0x8E72;
const GL_TEXTURE_MAX_ANISOTROPY: u32 = 0x84FE;
const GL_MAX_TEXTURE_MAX_ANISOTROPY: u32 = 0x84FF;

/// Uniform-block bindings and texture units are segmented per root
/// parameter slot with this stride.
const BINDINGS_PER_SET: u32 = 8;

/// Where presentation goes. The platform glue implements this for whatever
/// owns the GL surface (EGL, GLX, WGL, SDL); the backend never talks to the
/// window system directly.
pub trait GlPresentTarget {
    fn swap_buffers(&mut self) -> Result<()>;
    /// Current drawable size, straight from the window geometry.
    fn extent(&self) -> Extent;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlApi {
    Desktop,
    Embedded,
}

/// Capability snapshot taken once at context creation.
#[derive(Debug, Clone)]
pub struct GlCapabilities {
    pub api: GlApi,
    pub version: (u32, u32),
    pub immutable_storage: bool,
    pub debug_labels: bool,
    pub tessellation: bool,
    pub storage_buffers: bool,
    pub s3tc: bool,
    pub anisotropy: bool,
}

impl GlCapabilities {
    fn detect(gl: &glow::Context) -> Self {
        let version = gl.version();
        let (major, minor) = (version.major, version.minor);
        let embedded = version.is_embedded;
        let ext = gl.supported_extensions();
        let at_least = |maj: u32, min: u32| major > maj || (major == maj && minor >= min);

        let caps = Self {
            api: if embedded { GlApi::Embedded } else { GlApi::Desktop },
            version: (major, minor),
            immutable_storage: if embedded {
                // Core since ES 3.0.
                true
            } else {
                at_least(4, 2) || ext.contains("GL_ARB_texture_storage")
            },
            debug_labels: (!embedded && at_least(4, 3)) || ext.contains("GL_KHR_debug"),
            tessellation: if embedded {
                at_least(3, 2)
            } else {
                at_least(4, 0) || ext.contains("GL_ARB_tessellation_shader")
            },
            storage_buffers: if embedded { at_least(3, 1) } else { at_least(4, 3) },
            s3tc: !embedded || ext.contains("GL_EXT_texture_compression_s3tc"),
            anisotropy: ext.contains("GL_EXT_texture_filter_anisotropic")
                || ext.contains("GL_ARB_texture_filter_anisotropic"),
        };
        debug!(
            "gl backend: {:?} {}.{}, immutable storage {}, debug labels {}, tessellation {}",
            caps.api,
            major,
            minor,
            caps.immutable_storage,
            caps.debug_labels,
            caps.tessellation
        );
        caps
    }
}

pub(crate) struct GlBuffer {
    raw: glow::NativeBuffer,
    byte_size: u32,
    target: u32,
}

pub(crate) struct GlTexture {
    raw: glow::NativeTexture,
    format: Format,
    mip_levels: u32,
}

pub(crate) struct GlSampler {
    raw: glow::NativeSampler,
}

pub(crate) struct GlProgram {
    raw: glow::NativeProgram,
}

pub(crate) struct GlBindGroupLayout {
    ranges: Vec<DescriptorRange>,
    block_bindings: Vec<Option<u32>>,
}

pub(crate) struct GlBindGroup {
    layout: Handle<BindGroupLayout>,
    parameter_index: u32,
    bindings: Vec<ResourceBinding>,
}

pub(crate) struct GlRenderPass {
    color_count: u32,
    depth_format: Option<Format>,
}

pub(crate) struct GlVertexArray {
    raw: glow::NativeVertexArray,
    buffers: Vec<Handle<Buffer>>,
    index_buffer: Option<Handle<Buffer>>,
    index_type: IndexType,
}

pub(crate) struct GlGraphicsPipeline {
    program: Handle<ShaderProgram>,
    program_raw: glow::NativeProgram,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    render_pass: Handle<RenderPass>,
    primitive: u32,
    patch_control_points: Option<u8>,
    rasterizer: RasterizerState,
    depth_stencil: DepthStencilState,
    blend: Vec<ColorBlendState>,
}

pub(crate) struct GlComputePipeline {
    program: Handle<ShaderProgram>,
    program_raw: glow::NativeProgram,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
}

pub(crate) struct GlSwapchain {
    target: Box<dyn GlPresentTarget>,
    extent: Extent,
}

/// Execution-time state the command sink threads between opcodes.
#[derive(Default)]
struct ExecState {
    index_type: Option<(u32, u32)>,
    primitive: u32,
    transient_fbo: Option<glow::NativeFramebuffer>,
}

pub struct GlContext {
    gl: glow::Context,
    caps: GlCapabilities,
    limits: DeviceLimits,
    buffers: Pool<GlBuffer>,
    textures: Pool<GlTexture>,
    samplers: Pool<GlSampler>,
    programs: Pool<GlProgram>,
    bind_group_layouts: Pool<GlBindGroupLayout>,
    bind_groups: Pool<GlBindGroup>,
    render_passes: Pool<GlRenderPass>,
    vertex_arrays: Pool<GlVertexArray>,
    graphics_pipelines: Pool<GlGraphicsPipeline>,
    compute_pipelines: Pool<GlComputePipeline>,
    swapchains: Pool<GlSwapchain>,
    exec: ExecState,
}

impl GlContext {
    /// Wraps an already-loaded GL function table.
    pub fn new(gl: glow::Context, _info: &ContextInfo) -> Result<Self> {
        let caps = GlCapabilities::detect(&gl);
        let max_color = unsafe { gl.get_parameter_i32(glow::MAX_COLOR_ATTACHMENTS) } as u32;
        let max_patch = if caps.tessellation {
            (unsafe { gl.get_parameter_i32(GL_MAX_PATCH_VERTICES) }) as u32
        } else {
            0
        };
        let max_anisotropy = if caps.anisotropy {
            (unsafe { gl.get_parameter_i32(GL_MAX_TEXTURE_MAX_ANISOTROPY) }) as f32
        } else {
            1.0
        };
        let limits = DeviceLimits {
            max_color_attachments: max_color.min(MAX_COLOR_ATTACHMENTS as u32),
            max_patch_control_points: max_patch.min(MAX_PATCH_CONTROL_POINTS as u32),
            max_anisotropy,
            timestamps_supported: false,
        };
        Ok(Self {
            gl,
            caps,
            limits,
            buffers: Pool::default(),
            textures: Pool::default(),
            samplers: Pool::default(),
            programs: Pool::default(),
            bind_group_layouts: Pool::default(),
            bind_groups: Pool::default(),
            render_passes: Pool::default(),
            vertex_arrays: Pool::default(),
            graphics_pipelines: Pool::default(),
            compute_pipelines: Pool::default(),
            swapchains: Pool::default(),
            exec: ExecState::default(),
        })
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    pub fn capabilities(&self) -> &GlCapabilities {
        &self.caps
    }

    fn label(&self, identifier: u32, name: u32, debug_name: &str) {
        if cfg!(debug_assertions) && self.caps.debug_labels && !debug_name.is_empty() {
            unsafe { self.gl.object_label(identifier, name, Some(debug_name)) };
        }
    }

    //===------------------------------------------------------------------===//
    // Buffers
    //===------------------------------------------------------------------===//

    pub fn make_buffer(&mut self, info: &BufferInfo) -> Result<Handle<Buffer>> {
        validate::buffer_info(info)?;
        if info.usage == BufferUsage::Storage && !self.caps.storage_buffers {
            return Err(GpuError::MissingCapability("shader storage buffers"));
        }
        let target = conv::buffer_target(info.usage);
        let raw = unsafe { self.gl.create_buffer().map_err(GpuError::Gl)? };
        unsafe {
            self.gl.bind_buffer(target, Some(raw));
            self.gl
                .buffer_data_size(target, info.byte_size as i32, conv::buffer_usage_hint(info.visibility));
            if let Some(data) = info.initial_data {
                self.gl.buffer_sub_data_u8_slice(target, 0, data);
            }
            self.gl.bind_buffer(target, None);
        }
        self.label(glow::BUFFER, raw.0.get(), info.debug_name);

        match self.buffers.insert(GlBuffer {
            raw,
            byte_size: info.byte_size,
            target,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.gl.delete_buffer(raw) };
                Err(GpuError::Exhausted("buffer"))
            }
        }
    }

    pub fn write_buffer(&mut self, handle: Handle<Buffer>, offset: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(GpuError::InvalidInfo("zero-byte buffer write"));
        }
        let buf = self
            .buffers
            .get_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        if offset + data.len() as u32 > buf.byte_size {
            return Err(GpuError::InvalidInfo("buffer write out of bounds"));
        }
        unsafe {
            self.gl.bind_buffer(buf.target, Some(buf.raw));
            self.gl.buffer_sub_data_u8_slice(buf.target, offset as i32, data);
            self.gl.bind_buffer(buf.target, None);
        }
        Ok(())
    }

    pub fn read_buffer(&self, handle: Handle<Buffer>, offset: u32, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(GpuError::InvalidInfo("zero-byte buffer read"));
        }
        let buf = self
            .buffers
            .get_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        if offset + len > buf.byte_size {
            return Err(GpuError::InvalidInfo("buffer read out of bounds"));
        }
        let mut out = vec![0u8; len as usize];
        unsafe {
            self.gl.bind_buffer(buf.target, Some(buf.raw));
            self.gl.get_buffer_sub_data(buf.target, offset as i32, &mut out);
            self.gl.bind_buffer(buf.target, None);
        }
        Ok(out)
    }

    pub fn buffer_size(&self, handle: Handle<Buffer>) -> Result<u32> {
        self.buffers
            .get_ref(retype(handle))
            .map(|b| b.byte_size)
            .ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn add_ref_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        self.buffers
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn release_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        match self.buffers.release(retype::<Buffer, GlBuffer>(handle)) {
            None => Err(GpuError::InvalidHandle("buffer")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(buf)) => {
                unsafe { self.gl.delete_buffer(buf.raw) };
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Textures & samplers
    //===------------------------------------------------------------------===//

    pub fn make_texture(&mut self, info: &TextureInfo) -> Result<Handle<Texture>> {
        let plan = validate::texture_info(info)?;
        if info.layers > 1 || info.dim[2] > 1 {
            return Err(GpuError::MissingCapability("array/3D textures on the GL backend"));
        }
        if info.format == Format::BGRA8Unorm && self.caps.api == GlApi::Embedded {
            return Err(GpuError::MissingCapability("BGRA uploads on OpenGL ES"));
        }
        if info.format.is_compressed() && !self.caps.s3tc {
            return Err(GpuError::MissingCapability("S3TC texture compression"));
        }

        let raw = unsafe { self.gl.create_texture().map_err(GpuError::Gl)? };
        unsafe {
            self.upload_texture(raw, info, plan.upload_levels, plan.generate);
        }
        self.label(glow::TEXTURE, raw.0.get(), info.debug_name);

        match self.textures.insert(GlTexture {
            raw,
            format: info.format,
            mip_levels: info.mip_levels,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.gl.delete_texture(raw) };
                Err(GpuError::Exhausted("texture"))
            }
        }
    }

    /// Allocate storage and walk the provided mip chain. Two strategies:
    /// immutable storage (`tex_storage` + `tex_sub_image`) when the
    /// capability is present, otherwise the bind-and-`tex_image` path.
    /// Compressed data always takes the bind path.
    unsafe fn upload_texture(
        &self,
        raw: glow::NativeTexture,
        info: &TextureInfo,
        upload_levels: u32,
        generate: bool,
    ) {
        let gl = &self.gl;
        let (internal, format, ty) = conv::texture_format(info.format);
        let target = glow::TEXTURE_2D;
        let compressed = info.format.is_compressed();
        let use_storage = self.caps.immutable_storage && !compressed;

        gl.bind_texture(target, Some(raw));
        if use_storage {
            gl.tex_storage_2d(
                target,
                info.mip_levels as i32,
                internal,
                info.dim[0] as i32,
                info.dim[1] as i32,
            );
        }

        let mut offset = 0usize;
        if let Some(data) = info.initial_data {
            for level in 0..upload_levels {
                let (w, h) = mip_extent(info.dim[0], info.dim[1], level);
                let size = info.format.mip_byte_size(w, h) as usize;
                let slice = &data[offset..offset + size];
                if compressed {
                    gl.compressed_tex_image_2d(
                        target,
                        level as i32,
                        internal as i32,
                        w as i32,
                        h as i32,
                        0,
                        size as i32,
                        slice,
                    );
                } else if use_storage {
                    gl.tex_sub_image_2d(
                        target,
                        level as i32,
                        0,
                        0,
                        w as i32,
                        h as i32,
                        format,
                        ty,
                        glow::PixelUnpackData::Slice(slice),
                    );
                } else {
                    gl.tex_image_2d(
                        target,
                        level as i32,
                        internal as i32,
                        w as i32,
                        h as i32,
                        0,
                        format,
                        ty,
                        Some(slice),
                    );
                }
                offset += size;
            }
        }

        if !use_storage && !compressed {
            // The mutable path still needs every level allocated so the
            // texture is mipmap-complete.
            for level in upload_levels.max(if info.initial_data.is_some() { 1 } else { 0 })
                ..info.mip_levels
            {
                let (w, h) = mip_extent(info.dim[0], info.dim[1], level);
                gl.tex_image_2d(
                    target,
                    level as i32,
                    internal as i32,
                    w as i32,
                    h as i32,
                    0,
                    format,
                    ty,
                    None,
                );
            }
        }

        gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, info.mip_levels as i32 - 1);
        if generate {
            gl.generate_mipmap(target);
        }
        gl.bind_texture(target, None);
    }

    pub fn add_ref_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        self.textures
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("texture"))
    }

    pub fn release_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        match self.textures.release(retype::<Texture, GlTexture>(handle)) {
            None => Err(GpuError::InvalidHandle("texture")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(tex)) => {
                unsafe { self.gl.delete_texture(tex.raw) };
                Ok(())
            }
        }
    }

    pub fn make_sampler(&mut self, info: &SamplerInfo) -> Result<Handle<Sampler>> {
        if info.anisotropy_enable && info.max_anisotropy > self.limits.max_anisotropy {
            return Err(GpuError::InvalidInfo("anisotropy exceeds device limit"));
        }
        let raw = unsafe { self.gl.create_sampler().map_err(GpuError::Gl)? };
        unsafe {
            let gl = &self.gl;
            gl.sampler_parameter_i32(raw, glow::TEXTURE_MAG_FILTER, conv::filter(info.mag_filter) as i32);
            gl.sampler_parameter_i32(
                raw,
                glow::TEXTURE_MIN_FILTER,
                conv::min_filter(info.min_filter, info.mipmap_filter) as i32,
            );
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_S, conv::address_mode(info.address_mode_u) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_T, conv::address_mode(info.address_mode_v) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_R, conv::address_mode(info.address_mode_w) as i32);
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MIN_LOD, info.min_lod);
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MAX_LOD, info.max_lod);
            if let Some(compare) = info.compare {
                gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_MODE, glow::COMPARE_REF_TO_TEXTURE as i32);
                gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_FUNC, conv::compare_op(compare) as i32);
            }
            if info.anisotropy_enable && self.caps.anisotropy {
                gl.sampler_parameter_f32(raw, GL_TEXTURE_MAX_ANISOTROPY, info.max_anisotropy);
            }
        }
        self.label(glow::SAMPLER, raw.0.get(), info.debug_name);

        match self.samplers.insert(GlSampler { raw }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.gl.delete_sampler(raw) };
                Err(GpuError::Exhausted("sampler"))
            }
        }
    }

    pub fn add_ref_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        self.samplers
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("sampler"))
    }

    pub fn release_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        match self.samplers.release(retype::<Sampler, GlSampler>(handle)) {
            None => Err(GpuError::InvalidHandle("sampler")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(s)) => {
                unsafe { self.gl.delete_sampler(s.raw) };
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Shader programs
    //===------------------------------------------------------------------===//

    pub fn make_shader_program(&mut self, info: &ShaderProgramInfo) -> Result<Handle<ShaderProgram>> {
        if info.stages.is_empty() {
            return Err(GpuError::InvalidInfo("shader program needs at least one stage"));
        }
        let program = unsafe { self.gl.create_program().map_err(GpuError::Gl)? };
        let mut shaders = Vec::with_capacity(info.stages.len());

        for stage in info.stages {
            let source = match stage.source {
                ShaderSource::Glsl(src) => src,
                ShaderSource::SpirV(_) => {
                    unsafe { self.gl.delete_program(program) };
                    return Err(GpuError::MissingCapability("SPIR-V modules on the GL backend"));
                }
            };
            let shader = unsafe {
                let shader = self
                    .gl
                    .create_shader(conv::shader_stage(stage.stage))
                    .map_err(GpuError::Gl)?;
                self.gl.shader_source(shader, source);
                self.gl.compile_shader(shader);
                shader
            };
            if !unsafe { self.gl.get_shader_compile_status(shader) } {
                let log = unsafe { self.gl.get_shader_info_log(shader) };
                // One log line per driver-reported error, then abandon the
                // whole program rather than linking a partial one.
                for line in log.lines().filter(|l| !l.trim().is_empty()) {
                    error!("shader '{}' ({:?}): {}", info.debug_name, stage.stage, line);
                }
                unsafe {
                    self.gl.delete_shader(shader);
                    for s in &shaders {
                        self.gl.delete_shader(*s);
                    }
                    self.gl.delete_program(program);
                }
                return Err(GpuError::ShaderCompile(log));
            }
            unsafe { self.gl.attach_shader(program, shader) };
            shaders.push(shader);
        }

        unsafe { self.gl.link_program(program) };
        let linked = unsafe { self.gl.get_program_link_status(program) };
        for shader in shaders {
            unsafe {
                self.gl.detach_shader(program, shader);
                self.gl.delete_shader(shader);
            }
        }
        if !linked {
            let log = unsafe { self.gl.get_program_info_log(program) };
            for line in log.lines().filter(|l| !l.trim().is_empty()) {
                error!("program '{}': {}", info.debug_name, line);
            }
            unsafe { self.gl.delete_program(program) };
            return Err(GpuError::ShaderCompile(log));
        }
        self.label(glow::PROGRAM, program.0.get(), info.debug_name);

        match self.programs.insert(GlProgram { raw: program }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.gl.delete_program(program) };
                Err(GpuError::Exhausted("shader program"))
            }
        }
    }

    pub fn add_ref_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        self.programs
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("shader program"))
    }

    pub fn release_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        match self.programs.release(retype::<ShaderProgram, GlProgram>(handle)) {
            None => Err(GpuError::InvalidHandle("shader program")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(p)) => {
                unsafe { self.gl.delete_program(p.raw) };
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Binding model
    //===------------------------------------------------------------------===//

    pub fn make_bind_group_layout(
        &mut self,
        info: &BindGroupLayoutInfo,
    ) -> Result<Handle<BindGroupLayout>> {
        if info.ranges.is_empty() {
            return Err(GpuError::InvalidInfo("bind group layout needs ranges"));
        }
        let handle = self
            .bind_group_layouts
            .insert(GlBindGroupLayout {
                ranges: info.ranges.to_vec(),
                block_bindings: uniform_block_bindings(info.ranges),
            })
            .ok_or(GpuError::Exhausted("bind group layout"))?;
        Ok(retype(handle))
    }

    pub fn add_ref_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        self.bind_group_layouts
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("bind group layout"))
    }

    pub fn release_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        match self
            .bind_group_layouts
            .release(retype::<BindGroupLayout, GlBindGroupLayout>(handle))
        {
            None => Err(GpuError::InvalidHandle("bind group layout")),
            Some(_) => Ok(()),
        }
    }

    pub fn bind_group_layout_blocks(
        &self,
        handle: Handle<BindGroupLayout>,
    ) -> Result<Vec<Option<u32>>> {
        self.bind_group_layouts
            .get_ref(retype(handle))
            .map(|l| l.block_bindings.clone())
            .ok_or(GpuError::InvalidHandle("bind group layout"))
    }

    pub fn make_bind_group(&mut self, info: &BindGroupInfo) -> Result<Handle<BindGroup>> {
        if info.parameter_index >= MAX_BIND_GROUPS as u32 {
            return Err(GpuError::InvalidInfo("root parameter index out of range"));
        }
        let ranges = self
            .bind_group_layouts
            .get_ref(retype(info.layout))
            .ok_or(GpuError::InvalidHandle("bind group layout"))?
            .ranges
            .clone();
        validate::bind_group_bindings(&ranges, info.bindings)?;

        for binding in info.bindings {
            let live = match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.is_live(retype(*h))
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.is_live(retype(*h))
                }
                ResourceBinding::Sampler(h) => self.samplers.is_live(retype(*h)),
            };
            if !live {
                return Err(GpuError::InvalidHandle("bind group resource"));
            }
        }

        self.bind_group_layouts.add_ref(retype(info.layout));
        for binding in info.bindings {
            match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.add_ref(retype::<Buffer, GlBuffer>(*h));
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.add_ref(retype::<Texture, GlTexture>(*h));
                }
                ResourceBinding::Sampler(h) => {
                    self.samplers.add_ref(retype::<Sampler, GlSampler>(*h));
                }
            }
        }

        match self.bind_groups.insert(GlBindGroup {
            layout: info.layout,
            parameter_index: info.parameter_index,
            bindings: info.bindings.to_vec(),
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                self.release_bind_group_children(info.layout, info.bindings);
                Err(GpuError::Exhausted("bind group"))
            }
        }
    }

    fn release_bind_group_children(
        &mut self,
        layout: Handle<BindGroupLayout>,
        bindings: &[ResourceBinding],
    ) {
        self.bind_group_layouts
            .release(retype::<BindGroupLayout, GlBindGroupLayout>(layout));
        for binding in bindings {
            match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    if let Some(Release::Destroyed(buf)) =
                        self.buffers.release(retype::<Buffer, GlBuffer>(*h))
                    {
                        unsafe { self.gl.delete_buffer(buf.raw) };
                    }
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    if let Some(Release::Destroyed(tex)) =
                        self.textures.release(retype::<Texture, GlTexture>(*h))
                    {
                        unsafe { self.gl.delete_texture(tex.raw) };
                    }
                }
                ResourceBinding::Sampler(h) => {
                    if let Some(Release::Destroyed(s)) =
                        self.samplers.release(retype::<Sampler, GlSampler>(*h))
                    {
                        unsafe { self.gl.delete_sampler(s.raw) };
                    }
                }
            }
        }
    }

    pub fn add_ref_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        self.bind_groups
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("bind group"))
    }

    pub fn release_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        match self.bind_groups.release(retype::<BindGroup, GlBindGroup>(handle)) {
            None => Err(GpuError::InvalidHandle("bind group")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(group)) => {
                self.release_bind_group_children(group.layout, &group.bindings);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Render passes, vertex arrays, pipelines
    //===------------------------------------------------------------------===//

    pub fn make_render_pass(&mut self, info: &RenderPassInfo) -> Result<Handle<RenderPass>> {
        validate::render_pass_info(info)?;
        if info.color_formats.len() as u32 > self.limits.max_color_attachments {
            return Err(GpuError::MissingCapability("color attachment count"));
        }
        let handle = self
            .render_passes
            .insert(GlRenderPass {
                color_count: info.color_formats.len() as u32,
                depth_format: info.depth_stencil_format,
            })
            .ok_or(GpuError::Exhausted("render pass"))?;
        Ok(retype(handle))
    }

    pub fn add_ref_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        self.render_passes
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("render pass"))
    }

    pub fn release_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        match self
            .render_passes
            .release(retype::<RenderPass, GlRenderPass>(handle))
        {
            None => Err(GpuError::InvalidHandle("render pass")),
            Some(_) => Ok(()),
        }
    }

    pub fn make_vertex_array(&mut self, info: &VertexArrayInfo) -> Result<Handle<VertexArray>> {
        for binding in info.buffers {
            if !self.buffers.is_live(retype(binding.buffer)) {
                return Err(GpuError::InvalidHandle("vertex buffer"));
            }
        }
        if let Some(index) = info.index_buffer {
            if !self.buffers.is_live(retype(index)) {
                return Err(GpuError::InvalidHandle("index buffer"));
            }
        }
        for attr in info.attributes {
            if attr.buffer_index as usize >= info.buffers.len() {
                return Err(GpuError::InvalidInfo("attribute references a missing buffer"));
            }
        }

        let raw = unsafe { self.gl.create_vertex_array().map_err(GpuError::Gl)? };
        unsafe {
            let gl = &self.gl;
            gl.bind_vertex_array(Some(raw));
            for attr in info.attributes {
                let binding = &info.buffers[attr.buffer_index as usize];
                let buf = self.buffers.get_ref(retype(binding.buffer)).unwrap();
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(buf.raw));
                gl.enable_vertex_attrib_array(attr.location);
                match attr.format {
                    VertexFormat::Float => gl.vertex_attrib_pointer_f32(
                        attr.location,
                        1,
                        glow::FLOAT,
                        false,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                    VertexFormat::Float2 => gl.vertex_attrib_pointer_f32(
                        attr.location,
                        2,
                        glow::FLOAT,
                        false,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                    VertexFormat::Float3 => gl.vertex_attrib_pointer_f32(
                        attr.location,
                        3,
                        glow::FLOAT,
                        false,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                    VertexFormat::Float4 => gl.vertex_attrib_pointer_f32(
                        attr.location,
                        4,
                        glow::FLOAT,
                        false,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                    VertexFormat::UByte4Norm => gl.vertex_attrib_pointer_f32(
                        attr.location,
                        4,
                        glow::UNSIGNED_BYTE,
                        true,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                    VertexFormat::UInt => gl.vertex_attrib_pointer_i32(
                        attr.location,
                        1,
                        glow::UNSIGNED_INT,
                        binding.layout.stride as i32,
                        attr.offset as i32,
                    ),
                }
                if binding.layout.step == VertexStepRate::Instance {
                    gl.vertex_attrib_divisor(attr.location, 1);
                }
            }
            if let Some(index) = info.index_buffer {
                let buf = self.buffers.get_ref(retype(index)).unwrap();
                gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buf.raw));
            }
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
        }
        self.label(glow::VERTEX_ARRAY, raw.0.get(), info.debug_name);

        for binding in info.buffers {
            self.buffers.add_ref(retype::<Buffer, GlBuffer>(binding.buffer));
        }
        if let Some(index) = info.index_buffer {
            self.buffers.add_ref(retype::<Buffer, GlBuffer>(index));
        }

        match self.vertex_arrays.insert(GlVertexArray {
            raw,
            buffers: info.buffers.iter().map(|b| b.buffer).collect(),
            index_buffer: info.index_buffer,
            index_type: info.index_type,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.gl.delete_vertex_array(raw) };
                for binding in info.buffers {
                    self.buffers.release(retype::<Buffer, GlBuffer>(binding.buffer));
                }
                if let Some(index) = info.index_buffer {
                    self.buffers.release(retype::<Buffer, GlBuffer>(index));
                }
                Err(GpuError::Exhausted("vertex array"))
            }
        }
    }

    pub fn add_ref_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        self.vertex_arrays
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("vertex array"))
    }

    pub fn release_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        match self
            .vertex_arrays
            .release(retype::<VertexArray, GlVertexArray>(handle))
        {
            None => Err(GpuError::InvalidHandle("vertex array")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(va)) => {
                unsafe { self.gl.delete_vertex_array(va.raw) };
                for buffer in va.buffers {
                    if let Some(Release::Destroyed(buf)) =
                        self.buffers.release(retype::<Buffer, GlBuffer>(buffer))
                    {
                        unsafe { self.gl.delete_buffer(buf.raw) };
                    }
                }
                if let Some(index) = va.index_buffer {
                    if let Some(Release::Destroyed(buf)) =
                        self.buffers.release(retype::<Buffer, GlBuffer>(index))
                    {
                        unsafe { self.gl.delete_buffer(buf.raw) };
                    }
                }
                Ok(())
            }
        }
    }

    pub fn make_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<Handle<GraphicsPipeline>> {
        let patch_control_points = validate::topology(info.topology, &self.limits)?;
        if patch_control_points.is_some() && !self.caps.tessellation {
            return Err(GpuError::MissingCapability("tessellation"));
        }
        let program_raw = self
            .programs
            .get_ref(retype(info.program))
            .ok_or(GpuError::InvalidHandle("shader program"))?
            .raw;
        let pass_colors = self
            .render_passes
            .get_ref(retype(info.render_pass))
            .ok_or(GpuError::InvalidHandle("render pass"))?
            .color_count;
        if !info.blend.is_empty() && info.blend.len() as u32 != pass_colors {
            return Err(GpuError::InvalidInfo("blend state count does not match render pass"));
        }
        for layout in info.bind_group_layouts.iter().flatten() {
            if !self.bind_group_layouts.is_live(retype(*layout)) {
                return Err(GpuError::InvalidHandle("bind group layout"));
            }
        }

        // Wire the program's uniform blocks onto the per-set binding-point
        // segments, walking blocks in declaration order.
        let mut program_block = 0u32;
        for (set, layout) in info.bind_group_layouts.iter().enumerate() {
            let Some(layout) = layout else { continue };
            let blocks = self
                .bind_group_layouts
                .get_ref(retype(*layout))
                .unwrap()
                .block_bindings
                .clone();
            for block in blocks.iter().flatten() {
                let binding = set as u32 * BINDINGS_PER_SET + block;
                unsafe {
                    self.gl
                        .uniform_block_binding(program_raw, program_block, binding)
                };
                program_block += 1;
            }
        }

        self.programs.add_ref(retype::<ShaderProgram, GlProgram>(info.program));
        self.render_passes
            .add_ref(retype::<RenderPass, GlRenderPass>(info.render_pass));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, GlBindGroupLayout>(*layout));
        }

        match self.graphics_pipelines.insert(GlGraphicsPipeline {
            program: info.program,
            program_raw,
            layouts: info.bind_group_layouts,
            render_pass: info.render_pass,
            primitive: conv::primitive_mode(info.topology),
            patch_control_points,
            rasterizer: info.rasterizer,
            depth_stencil: info.depth_stencil,
            blend: info.blend.to_vec(),
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                self.release_pipeline_children(
                    info.program,
                    Some(info.render_pass),
                    &info.bind_group_layouts,
                );
                Err(GpuError::Exhausted("graphics pipeline"))
            }
        }
    }

    fn release_pipeline_children(
        &mut self,
        program: Handle<ShaderProgram>,
        render_pass: Option<Handle<RenderPass>>,
        layouts: &[Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    ) {
        if let Some(Release::Destroyed(p)) =
            self.programs.release(retype::<ShaderProgram, GlProgram>(program))
        {
            unsafe { self.gl.delete_program(p.raw) };
        }
        if let Some(rp) = render_pass {
            self.render_passes.release(retype::<RenderPass, GlRenderPass>(rp));
        }
        for layout in layouts.iter().flatten() {
            self.bind_group_layouts
                .release(retype::<BindGroupLayout, GlBindGroupLayout>(*layout));
        }
    }

    pub fn add_ref_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        self.graphics_pipelines
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("graphics pipeline"))
    }

    pub fn release_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        match self
            .graphics_pipelines
            .release(retype::<GraphicsPipeline, GlGraphicsPipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("graphics pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                self.release_pipeline_children(pso.program, Some(pso.render_pass), &pso.layouts);
                Ok(())
            }
        }
    }

    pub fn make_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<Handle<ComputePipeline>> {
        if self.caps.api == GlApi::Embedded && self.caps.version < (3, 1) {
            return Err(GpuError::MissingCapability("compute shaders"));
        }
        let program_raw = self
            .programs
            .get_ref(retype(info.program))
            .ok_or(GpuError::InvalidHandle("shader program"))?
            .raw;
        for layout in info.bind_group_layouts.iter().flatten() {
            if !self.bind_group_layouts.is_live(retype(*layout)) {
                return Err(GpuError::InvalidHandle("bind group layout"));
            }
        }

        self.programs.add_ref(retype::<ShaderProgram, GlProgram>(info.program));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, GlBindGroupLayout>(*layout));
        }

        match self.compute_pipelines.insert(GlComputePipeline {
            program: info.program,
            program_raw,
            layouts: info.bind_group_layouts,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                self.release_pipeline_children(info.program, None, &info.bind_group_layouts);
                Err(GpuError::Exhausted("compute pipeline"))
            }
        }
    }

    pub fn add_ref_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        self.compute_pipelines
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("compute pipeline"))
    }

    pub fn release_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        match self
            .compute_pipelines
            .release(retype::<ComputePipeline, GlComputePipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("compute pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                self.release_pipeline_children(pso.program, None, &pso.layouts);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Swapchain
    //===------------------------------------------------------------------===//

    pub fn make_swapchain(
        &mut self,
        info: &SwapchainInfo,
        target: Box<dyn GlPresentTarget>,
    ) -> Result<Handle<Swapchain>> {
        if info.vsync {
            // The swap interval lives with whoever created the GL surface.
            debug!("gl swapchain '{}': vsync delegated to the windowing layer", info.debug_name);
        }
        let handle = self
            .swapchains
            .insert(GlSwapchain {
                target,
                extent: info.extent,
            })
            .ok_or(GpuError::Exhausted("swapchain"))?;
        Ok(retype(handle))
    }

    pub fn present(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        sc.target.swap_buffers()
    }

    pub fn resize_swapchain(&mut self, handle: Handle<Swapchain>, extent: Extent) -> Result<()> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::InvalidInfo("swapchain extent must be non-zero"));
        }
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        sc.extent = extent;
        Ok(())
    }

    /// Stored extent, falling back to the window geometry when the caller
    /// never supplied one.
    pub fn swapchain_extent(&self, handle: Handle<Swapchain>) -> Result<Extent> {
        let sc = self
            .swapchains
            .get_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        if sc.extent.width == 0 || sc.extent.height == 0 {
            Ok(sc.target.extent())
        } else {
            Ok(sc.extent)
        }
    }

    pub fn release_swapchain(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        match self.swapchains.release(retype::<Swapchain, GlSwapchain>(handle)) {
            None => Err(GpuError::InvalidHandle("swapchain")),
            Some(_) => Ok(()),
        }
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    pub fn submit(&mut self, encoder: &CommandEncoder) -> Result<()> {
        if encoder.marker_depth() != 0 {
            return Err(GpuError::InvalidInfo("unbalanced debug marker scopes"));
        }
        encoder.submit(self);
        Ok(())
    }

    /// Delete every live native object. The function table itself belongs
    /// to the windowing layer and is dropped, not destroyed.
    pub fn destroy(mut self) {
        for handle in self.vertex_arrays.live_handles() {
            if let Some(va) = self.vertex_arrays.evict(handle) {
                unsafe { self.gl.delete_vertex_array(va.raw) };
            }
        }
        for handle in self.programs.live_handles() {
            if let Some(program) = self.programs.evict(handle) {
                unsafe { self.gl.delete_program(program.raw) };
            }
        }
        for handle in self.samplers.live_handles() {
            if let Some(sampler) = self.samplers.evict(handle) {
                unsafe { self.gl.delete_sampler(sampler.raw) };
            }
        }
        for handle in self.textures.live_handles() {
            if let Some(tex) = self.textures.evict(handle) {
                unsafe { self.gl.delete_texture(tex.raw) };
            }
        }
        for handle in self.buffers.live_handles() {
            if let Some(buf) = self.buffers.evict(handle) {
                unsafe { self.gl.delete_buffer(buf.raw) };
            }
        }
        if let Some(fbo) = self.exec.transient_fbo.take() {
            unsafe { self.gl.delete_framebuffer(fbo) };
        }
    }

    /// Push a pipeline's snapshotted program and fixed-function state into
    /// the GL context.
    fn apply_pipeline(&mut self, handle: Handle<GraphicsPipeline>) {
        let Some(pso) = self.graphics_pipelines.get_ref(retype(handle)) else {
            warn!("bind of a dead graphics pipeline, skipping");
            return;
        };
        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(pso.program_raw));

            match conv::cull_mode(pso.rasterizer.cull) {
                Some(mode) => {
                    gl.enable(glow::CULL_FACE);
                    gl.cull_face(mode);
                }
                None => gl.disable(glow::CULL_FACE),
            }
            gl.front_face(conv::front_face(pso.rasterizer.front_face));
            if pso.rasterizer.depth_bias != 0.0 || pso.rasterizer.slope_scaled_depth_bias != 0.0 {
                gl.enable(glow::POLYGON_OFFSET_FILL);
                gl.polygon_offset(
                    pso.rasterizer.slope_scaled_depth_bias,
                    pso.rasterizer.depth_bias,
                );
            } else {
                gl.disable(glow::POLYGON_OFFSET_FILL);
            }

            if pso.depth_stencil.depth_test {
                gl.enable(glow::DEPTH_TEST);
                gl.depth_func(conv::compare_op(pso.depth_stencil.compare));
            } else {
                gl.disable(glow::DEPTH_TEST);
            }
            gl.depth_mask(pso.depth_stencil.depth_write);

            // GL has no per-attachment blending pre-4.0; attachment zero's
            // state applies globally.
            match pso.blend.first() {
                Some(blend) if blend.enable => {
                    gl.enable(glow::BLEND);
                    gl.blend_func_separate(
                        conv::blend_factor(blend.src_blend),
                        conv::blend_factor(blend.dst_blend),
                        conv::blend_factor(blend.src_alpha_blend),
                        conv::blend_factor(blend.dst_alpha_blend),
                    );
                    gl.blend_equation_separate(
                        conv::blend_op(blend.blend_op),
                        conv::blend_op(blend.alpha_blend_op),
                    );
                    gl.color_mask(
                        blend.write_mask.r,
                        blend.write_mask.g,
                        blend.write_mask.b,
                        blend.write_mask.a,
                    );
                }
                _ => {
                    gl.disable(glow::BLEND);
                    gl.color_mask(true, true, true, true);
                }
            }

            if let Some(points) = pso.patch_control_points {
                gl.patch_parameter_i32(GL_PATCH_VERTICES, points as i32);
            }
        }
        self.exec.primitive = pso.primitive;
    }
}

impl CommandSink for GlContext {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPassCmd) {
        let gl = &self.gl;
        if cmd.to_backbuffer != 0 {
            unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
            return;
        }
        let fbo = match unsafe { gl.create_framebuffer() } {
            Ok(fbo) => fbo,
            Err(err) => {
                error!("framebuffer creation failed: {}", err);
                return;
            }
        };
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            let mut draw_buffers = Vec::new();
            for (i, color) in cmd.colors[..cmd.color_count as usize].iter().enumerate() {
                let Some(tex) = self.textures.get_ref(retype(*color)) else {
                    warn!("dead color attachment, skipping");
                    continue;
                };
                let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    Some(tex.raw),
                    0,
                );
                draw_buffers.push(attachment);
            }
            gl.draw_buffers(&draw_buffers);
            if cmd.has_depth != 0 {
                if let Some(tex) = self.textures.get_ref(retype(cmd.depth)) {
                    let attachment = match tex.format {
                        Format::D24S8 => glow::DEPTH_STENCIL_ATTACHMENT,
                        _ => glow::DEPTH_ATTACHMENT,
                    };
                    gl.framebuffer_texture_2d(
                        glow::FRAMEBUFFER,
                        attachment,
                        glow::TEXTURE_2D,
                        Some(tex.raw),
                        0,
                    );
                }
            }
        }
        self.exec.transient_fbo = Some(fbo);
    }

    fn end_render_pass(&mut self, _cmd: &EndRenderPassCmd) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
        if let Some(fbo) = self.exec.transient_fbo.take() {
            unsafe { self.gl.delete_framebuffer(fbo) };
        }
    }

    fn bind_pipeline(&mut self, cmd: &BindPipelineCmd) {
        self.apply_pipeline(cmd.pipeline);
    }

    fn bind_compute_pipeline(&mut self, cmd: &BindComputePipelineCmd) {
        match self.compute_pipelines.get_ref(retype(cmd.pipeline)) {
            Some(pso) => unsafe { self.gl.use_program(Some(pso.program_raw)) },
            None => warn!("bind of a dead compute pipeline, skipping"),
        }
    }

    fn bind_group(&mut self, cmd: &BindGroupCmd) {
        let Some(group) = self.bind_groups.get_ref(retype(cmd.group)) else {
            warn!("bind of a dead bind group, skipping");
            return;
        };
        let Some(layout) = self.bind_group_layouts.get_ref(retype(group.layout)) else {
            warn!("bind group layout died before its group, skipping");
            return;
        };
        let base = cmd.parameter_index * BINDINGS_PER_SET;
        let gl = &self.gl;
        let mut texture_units: Vec<u32> = Vec::new();
        let mut sampler_ordinal = 0usize;
        let mut unit_cursor = base;
        for (entry, binding) in group.bindings.iter().enumerate() {
            match binding {
                ResourceBinding::UniformBuffer(h) => {
                    let block = layout.block_bindings[entry].unwrap_or(0);
                    if let Some(buf) = self.buffers.get_ref(retype(*h)) {
                        unsafe {
                            gl.bind_buffer_base(glow::UNIFORM_BUFFER, base + block, Some(buf.raw))
                        };
                    }
                }
                ResourceBinding::StorageBuffer(h) => {
                    if let Some(buf) = self.buffers.get_ref(retype(*h)) {
                        unsafe {
                            gl.bind_buffer_base(
                                glow::SHADER_STORAGE_BUFFER,
                                unit_cursor,
                                Some(buf.raw),
                            )
                        };
                        unit_cursor += 1;
                    }
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    if let Some(tex) = self.textures.get_ref(retype(*h)) {
                        unsafe {
                            gl.active_texture(glow::TEXTURE0 + unit_cursor);
                            gl.bind_texture(glow::TEXTURE_2D, Some(tex.raw));
                        }
                        texture_units.push(unit_cursor);
                        unit_cursor += 1;
                    }
                }
                ResourceBinding::Sampler(h) => {
                    // The n-th sampler state pairs with the n-th texture of
                    // the group.
                    if let Some(sampler) = self.samplers.get_ref(retype(*h)) {
                        let unit = texture_units
                            .get(sampler_ordinal)
                            .copied()
                            .unwrap_or(base + sampler_ordinal as u32);
                        unsafe { gl.bind_sampler(unit, Some(sampler.raw)) };
                        sampler_ordinal += 1;
                    }
                }
            }
        }
    }

    fn bind_vertex_array(&mut self, cmd: &BindVertexArrayCmd) {
        match self.vertex_arrays.get_ref(retype(cmd.vertex_array)) {
            Some(va) => {
                unsafe { self.gl.bind_vertex_array(Some(va.raw)) };
                self.exec.index_type = Some(conv::index_type(va.index_type));
            }
            None => warn!("bind of a dead vertex array, skipping"),
        }
    }

    fn set_viewport(&mut self, cmd: &SetViewportCmd) {
        let vp = cmd.viewport;
        unsafe {
            self.gl
                .viewport(vp.x as i32, vp.y as i32, vp.w as i32, vp.h as i32);
            self.gl.depth_range_f32(vp.min_depth, vp.max_depth);
        }
    }

    fn set_scissor(&mut self, cmd: &SetScissorCmd) {
        unsafe {
            self.gl.enable(glow::SCISSOR_TEST);
            self.gl
                .scissor(cmd.rect.x, cmd.rect.y, cmd.rect.w as i32, cmd.rect.h as i32);
        }
    }

    fn clear_attachments(&mut self, cmd: &ClearAttachmentsCmd) {
        let gl = &self.gl;
        let mut mask = 0u32;
        unsafe {
            if cmd.flags.contains(ClearFlags::COLOR) {
                gl.clear_color(cmd.color[0], cmd.color[1], cmd.color[2], cmd.color[3]);
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if cmd.flags.contains(ClearFlags::DEPTH) {
                gl.clear_depth_f32(cmd.depth);
                gl.depth_mask(true);
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            if cmd.flags.contains(ClearFlags::STENCIL) {
                gl.clear_stencil(cmd.stencil as i32);
                mask |= glow::STENCIL_BUFFER_BIT;
            }
            if mask != 0 {
                gl.clear(mask);
            }
        }
    }

    fn draw(&mut self, cmd: &DrawCmd) {
        if cmd.first_instance != 0 {
            warn!("first_instance is unsupported on the GL backend, drawing from zero");
        }
        unsafe {
            if cmd.instance_count <= 1 {
                self.gl.draw_arrays(
                    self.exec.primitive,
                    cmd.first_vertex as i32,
                    cmd.vertex_count as i32,
                );
            } else {
                self.gl.draw_arrays_instanced(
                    self.exec.primitive,
                    cmd.first_vertex as i32,
                    cmd.vertex_count as i32,
                    cmd.instance_count as i32,
                );
            }
        }
    }

    fn draw_indexed(&mut self, cmd: &DrawIndexedCmd) {
        let Some((index_type, index_size)) = self.exec.index_type else {
            warn!("indexed draw without a bound vertex array, skipping");
            return;
        };
        if cmd.base_vertex != 0 {
            warn!("base_vertex is unsupported on the GL backend, drawing from zero");
        }
        if cmd.first_instance != 0 {
            warn!("first_instance is unsupported on the GL backend, drawing from zero");
        }
        let offset = (cmd.first_index * index_size) as i32;
        unsafe {
            if cmd.instance_count <= 1 {
                self.gl.draw_elements(
                    self.exec.primitive,
                    cmd.index_count as i32,
                    index_type,
                    offset,
                );
            } else {
                self.gl.draw_elements_instanced(
                    self.exec.primitive,
                    cmd.index_count as i32,
                    index_type,
                    offset,
                    cmd.instance_count as i32,
                );
            }
        }
    }

    fn draw_indirect(&mut self, cmd: &DrawIndirectCmd) {
        let Some(buf) = self.buffers.get_ref(retype(cmd.buffer)) else {
            warn!("indirect draw from a dead buffer, skipping");
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, Some(buf.raw));
            for i in 0..cmd.draw_count {
                let offset = cmd.offset + i * cmd.stride;
                self.gl
                    .draw_arrays_indirect_offset(self.exec.primitive, offset as i32);
            }
            self.gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, None);
        }
    }

    fn draw_indexed_indirect(&mut self, cmd: &DrawIndexedIndirectCmd) {
        let Some((index_type, _)) = self.exec.index_type else {
            warn!("indexed indirect draw without a bound vertex array, skipping");
            return;
        };
        let Some(buf) = self.buffers.get_ref(retype(cmd.buffer)) else {
            warn!("indirect draw from a dead buffer, skipping");
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, Some(buf.raw));
            for i in 0..cmd.draw_count {
                let offset = cmd.offset + i * cmd.stride;
                self.gl.draw_elements_indirect_offset(
                    self.exec.primitive,
                    index_type,
                    offset as i32,
                );
            }
            self.gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, None);
        }
    }

    fn dispatch(&mut self, cmd: &DispatchCmd) {
        unsafe { self.gl.dispatch_compute(cmd.x, cmd.y, cmd.z) };
    }

    fn copy_buffer(&mut self, cmd: &CopyBufferCmd) {
        let (Some(src), Some(dst)) = (
            self.buffers.get_ref(retype(cmd.src)),
            self.buffers.get_ref(retype(cmd.dst)),
        ) else {
            warn!("copy between dead buffers, skipping");
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, Some(src.raw));
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(dst.raw));
            self.gl.copy_buffer_sub_data(
                glow::COPY_READ_BUFFER,
                glow::COPY_WRITE_BUFFER,
                cmd.src_offset as i32,
                cmd.dst_offset as i32,
                cmd.size as i32,
            );
            self.gl.bind_buffer(glow::COPY_READ_BUFFER, None);
            self.gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
    }

    fn debug_marker_begin(&mut self, cmd: &DebugMarkerCmd) {
        if self.caps.debug_labels {
            unsafe {
                self.gl
                    .push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, cmd.text())
            };
        }
    }

    fn debug_marker_end(&mut self, _cmd: &DebugMarkerEndCmd) {
        if self.caps.debug_labels {
            unsafe { self.gl.pop_debug_group() };
        }
    }

    fn debug_marker_insert(&mut self, cmd: &DebugMarkerCmd) {
        if self.caps.debug_labels {
            unsafe {
                self.gl.debug_message_insert(
                    glow::DEBUG_SOURCE_APPLICATION,
                    glow::DEBUG_TYPE_MARKER,
                    0,
                    glow::DEBUG_SEVERITY_NOTIFICATION,
                    cmd.text(),
                )
            };
        }
    }
}
