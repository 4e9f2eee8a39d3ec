//! Texture creation: mip strategies, chain sizing and flag conflicts.

use nori::*;

fn ctx() -> Context {
    Context::new(&ContextInfo::default()).unwrap()
}

fn chain_data(format: Format, dim: [u32; 3], levels: u32) -> Vec<u8> {
    vec![0u8; mip_chain_byte_size(format, dim, 1, levels) as usize]
}

#[test]
fn provided_mip_chain_uploads_every_level() {
    let mut ctx = ctx();
    let data = chain_data(Format::RGBA8Unorm, [16, 16, 1], 5);
    let tex = ctx
        .make_texture(&TextureInfo {
            dim: [16, 16, 1],
            mip_levels: 5,
            flags: TextureFlags::SHADER_RESOURCE | TextureFlags::DATA_CONTAINS_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        })
        .unwrap();
    let (levels, uploaded, generated) = ctx.null().unwrap().texture_mip_state(tex).unwrap();
    assert_eq!(levels, 5);
    assert_eq!(uploaded, 5);
    assert!(!generated);
}

#[test]
fn generate_mipmaps_uploads_base_level_only() {
    let mut ctx = ctx();
    let data = chain_data(Format::RGBA8Unorm, [16, 16, 1], 1);
    let tex = ctx
        .make_texture(&TextureInfo {
            dim: [16, 16, 1],
            mip_levels: 5,
            flags: TextureFlags::SHADER_RESOURCE | TextureFlags::GENERATE_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        })
        .unwrap();
    let (_, uploaded, generated) = ctx.null().unwrap().texture_mip_state(tex).unwrap();
    assert_eq!(uploaded, 1);
    assert!(generated);
}

#[test]
fn conflicting_mip_flags_never_run_both_strategies() {
    let mut ctx = ctx();
    let data = chain_data(Format::RGBA8Unorm, [8, 8, 1], 4);
    let tex = ctx
        .make_texture(&TextureInfo {
            dim: [8, 8, 1],
            mip_levels: 4,
            flags: TextureFlags::SHADER_RESOURCE
                | TextureFlags::DATA_CONTAINS_MIPMAPS
                | TextureFlags::GENERATE_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        })
        .unwrap();
    let (_, uploaded, generated) = ctx.null().unwrap().texture_mip_state(tex).unwrap();
    // Provided data wins; GPU-side generation is skipped.
    assert_eq!(uploaded, 4);
    assert!(!generated);
}

#[test]
fn short_mip_chain_data_is_rejected() {
    let mut ctx = ctx();
    // Level 0 only, but the flag promises the whole chain.
    let data = chain_data(Format::RGBA8Unorm, [8, 8, 1], 1);
    assert!(ctx
        .make_texture(&TextureInfo {
            dim: [8, 8, 1],
            mip_levels: 4,
            flags: TextureFlags::SHADER_RESOURCE | TextureFlags::DATA_CONTAINS_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        })
        .is_err());
}

#[test]
fn compressed_chains_size_by_block() {
    let mut ctx = ctx();
    // 8x8 BC1: level sizes are 32, 8 and 8 bytes (sub-block levels round
    // up to one block).
    let total = mip_chain_byte_size(Format::Bc1Rgba, [8, 8, 1], 1, 3);
    assert_eq!(total, 32 + 8 + 8);
    let data = vec![0u8; total as usize];
    let tex = ctx
        .make_texture(&TextureInfo {
            dim: [8, 8, 1],
            mip_levels: 3,
            format: Format::Bc1Rgba,
            flags: TextureFlags::SHADER_RESOURCE | TextureFlags::DATA_CONTAINS_MIPMAPS,
            initial_data: Some(&data),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ctx.null().unwrap().texture_format(tex), Some(Format::Bc1Rgba));
}

#[test]
fn mip_count_beyond_the_full_chain_is_rejected() {
    let mut ctx = ctx();
    assert!(ctx
        .make_texture(&TextureInfo {
            dim: [8, 8, 1],
            mip_levels: 5,
            ..Default::default()
        })
        .is_err());
}

#[test]
fn patch_topology_decodes_against_device_limit() {
    let mut ctx = ctx();
    let program = ctx
        .make_shader_program(&ShaderProgramInfo {
            debug_name: "tess",
            stages: &[ShaderStageInfo::default()],
        })
        .unwrap();
    let pass = ctx
        .make_render_pass(&RenderPassInfo {
            color_formats: &[Format::RGBA8Unorm],
            ..Default::default()
        })
        .unwrap();

    let pso = ctx
        .make_graphics_pipeline(&GraphicsPipelineInfo {
            program,
            render_pass: pass,
            topology: Topology::PatchList(3),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        ctx.null().unwrap().pipeline_patch_control_points(pso),
        Some(Some(3))
    );

    // Out of the encodable 1..=32 range.
    assert!(ctx
        .make_graphics_pipeline(&GraphicsPipelineInfo {
            program,
            render_pass: pass,
            topology: Topology::PatchList(0),
            ..Default::default()
        })
        .is_err());
    assert!(ctx
        .make_graphics_pipeline(&GraphicsPipelineInfo {
            program,
            render_pass: pass,
            topology: Topology::PatchList(33),
            ..Default::default()
        })
        .is_err());
}

#[test]
fn render_pass_attachment_limits_hold() {
    let mut ctx = ctx();
    let eight = [Format::RGBA8Unorm; 8];
    assert!(ctx
        .make_render_pass(&RenderPassInfo {
            color_formats: &eight,
            depth_stencil_format: Some(Format::D24S8),
            ..Default::default()
        })
        .is_ok());

    let nine = [Format::RGBA8Unorm; 9];
    assert!(ctx
        .make_render_pass(&RenderPassInfo {
            color_formats: &nine,
            ..Default::default()
        })
        .is_err());

    // A color format cannot occupy the depth-stencil slot.
    assert!(ctx
        .make_render_pass(&RenderPassInfo {
            color_formats: &[Format::RGBA8Unorm],
            depth_stencil_format: Some(Format::RGBA8Unorm),
            ..Default::default()
        })
        .is_err());
}
