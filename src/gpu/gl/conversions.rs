//! Stateless mapping from abstract enums to GL constants.

use crate::gpu::structs::*;

// S3TC internal formats come from an extension glow does not name.
pub(crate) const COMPRESSED_RGBA_S3TC_DXT1: u32 = 0x83F1;
pub(crate) const COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;

/// Sized internal format, upload format and component type for a texture
/// format. Compressed formats report only the internal format.
pub(crate) fn texture_format(format: Format) -> (u32, u32, u32) {
    match format {
        Format::R8Unorm => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        Format::R8Uint => (glow::R8UI, glow::RED_INTEGER, glow::UNSIGNED_BYTE),
        Format::RG8Unorm => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        Format::RGBA8Unorm => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        Format::RGBA8Srgb => (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
        // BGRA uploads re-order into RGBA8 storage; desktop-only.
        Format::BGRA8Unorm => (glow::RGBA8, glow::BGRA, glow::UNSIGNED_BYTE),
        Format::R16Float => (glow::R16F, glow::RED, glow::HALF_FLOAT),
        Format::RGBA16Float => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        Format::R32Uint => (glow::R32UI, glow::RED_INTEGER, glow::UNSIGNED_INT),
        Format::R32Float => (glow::R32F, glow::RED, glow::FLOAT),
        Format::RG32Float => (glow::RG32F, glow::RG, glow::FLOAT),
        Format::RGB32Float => (glow::RGB32F, glow::RGB, glow::FLOAT),
        Format::RGBA32Float => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        Format::D32Float => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        Format::D24S8 => (
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
        Format::Bc1Rgba => (COMPRESSED_RGBA_S3TC_DXT1, 0, 0),
        Format::Bc3Rgba => (COMPRESSED_RGBA_S3TC_DXT5, 0, 0),
    }
}

pub(crate) fn buffer_target(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Vertex => glow::ARRAY_BUFFER,
        BufferUsage::Index => glow::ELEMENT_ARRAY_BUFFER,
        BufferUsage::Uniform => glow::UNIFORM_BUFFER,
        BufferUsage::Storage => glow::SHADER_STORAGE_BUFFER,
        BufferUsage::Indirect => glow::DRAW_INDIRECT_BUFFER,
    }
}

pub(crate) fn buffer_usage_hint(visibility: MemoryVisibility) -> u32 {
    match visibility {
        MemoryVisibility::Gpu => glow::STATIC_DRAW,
        MemoryVisibility::CpuAndGpu => glow::DYNAMIC_DRAW,
    }
}

pub(crate) fn filter(filter: Filter) -> u32 {
    match filter {
        Filter::Nearest => glow::NEAREST,
        Filter::Linear => glow::LINEAR,
    }
}

pub(crate) fn min_filter(min: Filter, mip: Filter) -> u32 {
    match (min, mip) {
        (Filter::Nearest, Filter::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
        (Filter::Nearest, Filter::Linear) => glow::NEAREST_MIPMAP_LINEAR,
        (Filter::Linear, Filter::Nearest) => glow::LINEAR_MIPMAP_NEAREST,
        (Filter::Linear, Filter::Linear) => glow::LINEAR_MIPMAP_LINEAR,
    }
}

pub(crate) fn address_mode(mode: AddressMode) -> u32 {
    match mode {
        AddressMode::Repeat => glow::REPEAT,
        AddressMode::MirroredRepeat => glow::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => glow::CLAMP_TO_BORDER,
    }
}

pub(crate) fn compare_op(op: CompareOp) -> u32 {
    match op {
        CompareOp::Never => glow::NEVER,
        CompareOp::Less => glow::LESS,
        CompareOp::Equal => glow::EQUAL,
        CompareOp::LessOrEqual => glow::LEQUAL,
        CompareOp::Greater => glow::GREATER,
        CompareOp::NotEqual => glow::NOTEQUAL,
        CompareOp::GreaterOrEqual => glow::GEQUAL,
        CompareOp::Always => glow::ALWAYS,
    }
}

pub(crate) fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::One => glow::ONE,
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::InvSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::InvDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::InvDstColor => glow::ONE_MINUS_DST_COLOR,
    }
}

pub(crate) fn blend_op(op: BlendOp) -> u32 {
    match op {
        BlendOp::Add => glow::FUNC_ADD,
        BlendOp::Subtract => glow::FUNC_SUBTRACT,
        BlendOp::InvSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendOp::Min => glow::MIN,
        BlendOp::Max => glow::MAX,
    }
}

/// Primitive mode for a topology. Patch lists need tessellation support;
/// the caller validated that before the pipeline existed.
pub(crate) fn primitive_mode(topology: Topology) -> u32 {
    match topology {
        Topology::PointList => glow::POINTS,
        Topology::LineList => glow::LINES,
        Topology::LineStrip => glow::LINE_STRIP,
        Topology::TriangleList => glow::TRIANGLES,
        Topology::TriangleStrip => glow::TRIANGLE_STRIP,
        Topology::PatchList(_) => glow::PATCHES,
    }
}

pub(crate) fn index_type(ty: IndexType) -> (u32, u32) {
    match ty {
        IndexType::U16 => (glow::UNSIGNED_SHORT, 2),
        IndexType::U32 => (glow::UNSIGNED_INT, 4),
    }
}

pub(crate) fn cull_mode(cull: CullMode) -> Option<u32> {
    match cull {
        CullMode::None => None,
        CullMode::Front => Some(glow::FRONT),
        CullMode::Back => Some(glow::BACK),
    }
}

pub(crate) fn front_face(face: FrontFace) -> u32 {
    match face {
        FrontFace::CounterClockwise => glow::CCW,
        FrontFace::Clockwise => glow::CW,
    }
}

pub(crate) fn shader_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::TessellationControl => glow::TESS_CONTROL_SHADER,
        ShaderStage::TessellationEvaluation => glow::TESS_EVALUATION_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_map_to_depth_internal_formats() {
        let (internal, format, _) = texture_format(Format::D24S8);
        assert_eq!(internal, glow::DEPTH24_STENCIL8);
        assert_eq!(format, glow::DEPTH_STENCIL);
        let (internal, _, ty) = texture_format(Format::D32Float);
        assert_eq!(internal, glow::DEPTH_COMPONENT32F);
        assert_eq!(ty, glow::FLOAT);
    }

    #[test]
    fn compressed_formats_have_no_upload_format() {
        let (internal, format, ty) = texture_format(Format::Bc1Rgba);
        assert_eq!(internal, COMPRESSED_RGBA_S3TC_DXT1);
        assert_eq!((format, ty), (0, 0));
    }

    #[test]
    fn min_filter_combines_mip_mode() {
        assert_eq!(
            min_filter(Filter::Linear, Filter::Linear),
            glow::LINEAR_MIPMAP_LINEAR
        );
        assert_eq!(
            min_filter(Filter::Nearest, Filter::Linear),
            glow::NEAREST_MIPMAP_LINEAR
        );
    }

    #[test]
    fn patch_lists_use_the_patches_mode() {
        assert_eq!(primitive_mode(Topology::PatchList(3)), glow::PATCHES);
        assert_eq!(primitive_mode(Topology::TriangleList), glow::TRIANGLES);
    }
}
