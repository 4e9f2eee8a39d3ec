//! Binding-model validation: uniform-block numbering and slot population.

use nori::*;

fn ctx() -> Context {
    Context::new(&ContextInfo::default()).unwrap()
}

fn range(ty: DescriptorRangeType, binding: u32) -> DescriptorRange {
    DescriptorRange {
        ty,
        binding,
        count: 1,
        visibility: ShaderVisibility::All,
    }
}

#[test]
fn only_uniform_ranges_receive_block_indices() {
    let mut ctx = ctx();
    // Two UBV ranges with an SRV between them.
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            debug_name: "scene",
            ranges: &[
                range(DescriptorRangeType::UniformBuffer, 0),
                range(DescriptorRangeType::ShaderResource, 1),
                range(DescriptorRangeType::UniformBuffer, 2),
            ],
        })
        .unwrap();

    let blocks = ctx.bind_group_layout_blocks(layout).unwrap();
    // The SRV slot position does not perturb the sequential numbering of
    // the uniform slots.
    assert_eq!(blocks, vec![Some(0), None, Some(1)]);
}

#[test]
fn sampler_ranges_never_consume_block_indices() {
    let mut ctx = ctx();
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            ranges: &[
                range(DescriptorRangeType::Sampler, 0),
                range(DescriptorRangeType::UniformBuffer, 1),
                range(DescriptorRangeType::Sampler, 2),
                range(DescriptorRangeType::UniformBuffer, 3),
            ],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        ctx.bind_group_layout_blocks(layout).unwrap(),
        vec![None, Some(0), None, Some(1)]
    );
}

#[test]
fn every_slot_must_be_populated_with_the_right_type() {
    let mut ctx = ctx();
    let ubo = ctx.make_buffer(&BufferInfo::default()).unwrap();
    let tex = ctx.make_texture(&TextureInfo::default()).unwrap();
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            ranges: &[
                range(DescriptorRangeType::UniformBuffer, 0),
                range(DescriptorRangeType::ShaderResource, 1),
            ],
            ..Default::default()
        })
        .unwrap();

    // Invalid handle in a slot.
    assert!(ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            bindings: &[
                ResourceBinding::UniformBuffer(Handle::INVALID),
                ResourceBinding::SampledTexture(tex),
            ],
            ..Default::default()
        })
        .is_err());

    // Type mismatch between slot and resource.
    assert!(ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            bindings: &[
                ResourceBinding::SampledTexture(tex),
                ResourceBinding::UniformBuffer(ubo),
            ],
            ..Default::default()
        })
        .is_err());

    // Fully and correctly populated.
    assert!(ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            bindings: &[
                ResourceBinding::UniformBuffer(ubo),
                ResourceBinding::SampledTexture(tex),
            ],
            ..Default::default()
        })
        .is_ok());
}

#[test]
fn parameter_index_is_bounded() {
    let mut ctx = ctx();
    let ubo = ctx.make_buffer(&BufferInfo::default()).unwrap();
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            ranges: &[range(DescriptorRangeType::UniformBuffer, 0)],
            ..Default::default()
        })
        .unwrap();
    assert!(ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            parameter_index: MAX_BIND_GROUPS as u32,
            bindings: &[ResourceBinding::UniformBuffer(ubo)],
            ..Default::default()
        })
        .is_err());
}

#[test]
fn bound_groups_dispatch_with_their_parameter_slot() {
    let mut ctx = ctx();
    let ubo = ctx.make_buffer(&BufferInfo::default()).unwrap();
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            ranges: &[range(DescriptorRangeType::UniformBuffer, 0)],
            ..Default::default()
        })
        .unwrap();
    let group = ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            parameter_index: 2,
            bindings: &[ResourceBinding::UniformBuffer(ubo)],
            ..Default::default()
        })
        .unwrap();

    let mut enc = CommandEncoder::new();
    enc.bind_group(2, group);
    ctx.submit(&enc).unwrap();
    assert_eq!(
        ctx.null().unwrap().native_calls(),
        &[NativeCall::BindGroup {
            parameter_index: 2,
            group: group.slot
        }]
    );
}
