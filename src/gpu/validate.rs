//! Creation-time descriptor validation shared by every backend.
//!
//! All checks fail closed: a violated precondition is logged and reported as
//! [`GpuError::InvalidInfo`] in every build profile, never silently carried
//! into a native call.

use log::warn;

use super::error::{GpuError, Result};
use super::structs::*;

fn invalid(why: &'static str) -> GpuError {
    log::error!("invalid creation info: {}", why);
    GpuError::InvalidInfo(why)
}

pub(crate) fn buffer_info(info: &BufferInfo) -> Result<()> {
    if info.byte_size == 0 {
        return Err(invalid("buffer byte size must be non-zero"));
    }
    if let Some(data) = info.initial_data {
        if data.is_empty() {
            return Err(invalid("zero-byte buffer upload"));
        }
        if data.len() as u32 > info.byte_size {
            return Err(invalid("initial data exceeds buffer size"));
        }
    }
    match info.usage {
        BufferUsage::Indirect => {
            let flags = info.indirect_flags;
            if flags.is_empty() {
                return Err(invalid("indirect buffer needs an argument-type flag"));
            }
            if flags.contains(IndirectBufferFlags::DRAW_ARGUMENTS)
                && flags.contains(IndirectBufferFlags::DRAW_INDEXED_ARGUMENTS)
            {
                return Err(invalid("indirect argument-type flags are mutually exclusive"));
            }
            let record = if flags.contains(IndirectBufferFlags::DRAW_ARGUMENTS) {
                std::mem::size_of::<DrawArguments>()
            } else {
                std::mem::size_of::<DrawIndexedArguments>()
            } as u32;
            if info.byte_size % record != 0 {
                return Err(invalid("indirect buffer size is not a multiple of its record"));
            }
        }
        _ => {
            if !info.indirect_flags.is_empty() {
                return Err(invalid("indirect flags on a non-indirect buffer"));
            }
        }
    }
    Ok(())
}

/// How a texture's mip chain gets populated, resolved from the flag pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MipPlan {
    /// Levels covered by the caller's initial data.
    pub upload_levels: u32,
    /// Whether the backend generates the remaining chain on the GPU.
    pub generate: bool,
}

pub(crate) fn texture_info(info: &TextureInfo) -> Result<MipPlan> {
    if info.dim[0] == 0 || info.dim[1] == 0 || info.dim[2] == 0 || info.layers == 0 {
        return Err(invalid("texture extent must be non-zero"));
    }
    if info.mip_levels == 0 {
        return Err(invalid("texture needs at least one mip level"));
    }
    if info.mip_levels > full_mip_count(info.dim[0], info.dim[1]) {
        return Err(invalid("mip level count exceeds the full chain"));
    }

    let has_data = info.flags.contains(TextureFlags::DATA_CONTAINS_MIPMAPS);
    let mut generate = info.flags.contains(TextureFlags::GENERATE_MIPMAPS);
    if has_data && generate {
        // Competing strategies; the provided chain wins deterministically.
        warn!(
            "texture '{}': DATA_CONTAINS_MIPMAPS and GENERATE_MIPMAPS both set, ignoring generation",
            info.debug_name
        );
        generate = false;
    }

    let upload_levels = match info.initial_data {
        Some(data) => {
            if data.is_empty() {
                return Err(invalid("zero-byte texture upload"));
            }
            let levels = if has_data { info.mip_levels } else { 1 };
            let expected = mip_chain_byte_size(info.format, info.dim, info.layers, levels);
            if data.len() as u32 != expected {
                return Err(invalid("texture data does not match the mip chain size"));
            }
            levels
        }
        None => {
            if has_data {
                return Err(invalid("DATA_CONTAINS_MIPMAPS without initial data"));
            }
            0
        }
    };

    if generate && info.mip_levels == 1 {
        warn!(
            "texture '{}': GENERATE_MIPMAPS on a single-level texture is a no-op",
            info.debug_name
        );
        generate = false;
    }

    Ok(MipPlan {
        upload_levels,
        generate,
    })
}

pub(crate) fn render_pass_info(info: &RenderPassInfo) -> Result<()> {
    if info.color_formats.len() > MAX_COLOR_ATTACHMENTS {
        return Err(invalid("too many color attachments"));
    }
    if info.color_formats.iter().any(Format::is_depth_stencil) {
        return Err(invalid("depth format in a color attachment slot"));
    }
    if let Some(ds) = info.depth_stencil_format {
        if !ds.is_depth_stencil() {
            return Err(invalid("color format in the depth-stencil slot"));
        }
    }
    Ok(())
}

/// Decodes a topology's patch-vertex count, bounds-checked against the
/// device limit.
pub(crate) fn topology(topology: Topology, limits: &DeviceLimits) -> Result<Option<u8>> {
    match topology.patch_control_points() {
        Some(n) => {
            if n == 0 || n > MAX_PATCH_CONTROL_POINTS {
                return Err(invalid("patch control point count out of range"));
            }
            if n as u32 > limits.max_patch_control_points {
                return Err(invalid("patch control point count exceeds device limit"));
            }
            Ok(Some(n))
        }
        None => Ok(None),
    }
}

pub(crate) fn bind_group_bindings(
    ranges: &[DescriptorRange],
    bindings: &[ResourceBinding],
) -> Result<()> {
    let entries: u32 = ranges.iter().map(|r| r.count.max(1)).sum();
    if bindings.len() as u32 != entries {
        return Err(invalid("binding count does not match the layout's ranges"));
    }
    let mut idx = 0;
    for range in ranges {
        for _ in 0..range.count.max(1) {
            let binding = &bindings[idx];
            if !binding.is_valid() {
                // Every slot must be populated.
                return Err(invalid("null resource in a bind group"));
            }
            if !binding.matches(range.ty) {
                return Err(invalid("resource type does not match its descriptor range"));
            }
            idx += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Handle;

    #[test]
    fn indirect_flags_are_mutually_exclusive() {
        let info = BufferInfo {
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS
                | IndirectBufferFlags::DRAW_INDEXED_ARGUMENTS,
            byte_size: 16,
            ..Default::default()
        };
        assert!(buffer_info(&info).is_err());
    }

    #[test]
    fn indirect_buffer_requires_a_flag_and_whole_records() {
        let missing = BufferInfo {
            usage: BufferUsage::Indirect,
            byte_size: 16,
            ..Default::default()
        };
        assert!(buffer_info(&missing).is_err());

        let ragged = BufferInfo {
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS,
            byte_size: 20,
            ..Default::default()
        };
        assert!(buffer_info(&ragged).is_err());

        let ok = BufferInfo {
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS,
            byte_size: 32,
            ..Default::default()
        };
        assert!(buffer_info(&ok).is_ok());
    }

    #[test]
    fn mip_flag_conflict_resolves_to_provided_data() {
        let data = vec![0u8; mip_chain_byte_size(Format::RGBA8Unorm, [4, 4, 1], 1, 3) as usize];
        let info = TextureInfo {
            dim: [4, 4, 1],
            mip_levels: 3,
            flags: TextureFlags::DATA_CONTAINS_MIPMAPS | TextureFlags::GENERATE_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        };
        let plan = texture_info(&info).unwrap();
        // Never both strategies at once.
        assert_eq!(plan.upload_levels, 3);
        assert!(!plan.generate);
    }

    #[test]
    fn mip_chain_data_must_cover_every_level() {
        let short = vec![0u8; 64];
        let info = TextureInfo {
            dim: [4, 4, 1],
            mip_levels: 3,
            flags: TextureFlags::DATA_CONTAINS_MIPMAPS,
            initial_data: Some(&short),
            ..Default::default()
        };
        assert!(texture_info(&info).is_err());
    }

    #[test]
    fn patch_counts_validate_against_the_limit() {
        let limits = DeviceLimits::default();
        assert_eq!(topology(Topology::TriangleList, &limits).unwrap(), None);
        assert_eq!(topology(Topology::PatchList(3), &limits).unwrap(), Some(3));
        assert!(topology(Topology::PatchList(0), &limits).is_err());
        assert!(topology(Topology::PatchList(33), &limits).is_err());

        let narrow = DeviceLimits {
            max_patch_control_points: 4,
            ..Default::default()
        };
        assert!(topology(Topology::PatchList(5), &narrow).is_err());
    }

    #[test]
    fn bind_groups_reject_null_and_mistyped_entries() {
        let ranges = [DescriptorRange {
            ty: DescriptorRangeType::UniformBuffer,
            binding: 0,
            count: 1,
            visibility: ShaderVisibility::All,
        }];
        let null = [ResourceBinding::UniformBuffer(Handle::INVALID)];
        assert!(bind_group_bindings(&ranges, &null).is_err());

        let mistyped = [ResourceBinding::Sampler(Handle::new(0, 0))];
        assert!(bind_group_bindings(&ranges, &mistyped).is_err());

        let ok = [ResourceBinding::UniformBuffer(Handle::new(0, 0))];
        assert!(bind_group_bindings(&ranges, &ok).is_ok());

        let wrong_count: [ResourceBinding; 0] = [];
        assert!(bind_group_bindings(&ranges, &wrong_count).is_err());
    }
}
