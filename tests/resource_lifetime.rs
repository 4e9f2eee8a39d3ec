//! Reference-count lifecycle across composite resources, driven through
//! the Null backend.

use nori::*;

fn ctx() -> Context {
    Context::new(&ContextInfo::default()).unwrap()
}

fn vertex_buffer(ctx: &mut Context, bytes: u32) -> Handle<Buffer> {
    ctx.make_buffer(&BufferInfo {
        byte_size: bytes,
        usage: BufferUsage::Vertex,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn add_ref_release_pairs_do_not_change_liveness() {
    let mut ctx = ctx();
    let buf = vertex_buffer(&mut ctx, 64);
    let null = ctx.null().unwrap();
    assert_eq!(null.buffer_ref_count(buf), Some(1));

    ctx.add_ref_buffer(buf).unwrap();
    ctx.release_buffer(buf).unwrap();
    let null = ctx.null().unwrap();
    assert_eq!(null.buffer_ref_count(buf), Some(1));
    assert!(null.buffer_is_live(buf));
}

#[test]
fn vertex_array_keeps_its_buffers_alive() {
    let mut ctx = ctx();
    let vbo = vertex_buffer(&mut ctx, 96);
    let ibo = ctx
        .make_buffer(&BufferInfo {
            byte_size: 24,
            usage: BufferUsage::Index,
            ..Default::default()
        })
        .unwrap();

    let va = ctx
        .make_vertex_array(&VertexArrayInfo {
            buffers: &[VertexBufferBinding {
                buffer: vbo,
                layout: VertexBufferLayout {
                    stride: 12,
                    step: VertexStepRate::Vertex,
                },
            }],
            attributes: &[VertexAttribute {
                location: 0,
                buffer_index: 0,
                format: VertexFormat::Float3,
                offset: 0,
            }],
            index_buffer: Some(ibo),
            index_type: IndexType::U32,
            ..Default::default()
        })
        .unwrap();

    // The creator drops its references; the array's references keep both
    // buffers alive.
    ctx.release_buffer(vbo).unwrap();
    ctx.release_buffer(ibo).unwrap();
    let null = ctx.null().unwrap();
    assert!(null.buffer_is_live(vbo));
    assert!(null.buffer_is_live(ibo));

    // Destroying the array releases them for real.
    ctx.release_vertex_array(va).unwrap();
    let null = ctx.null().unwrap();
    assert!(!null.buffer_is_live(vbo));
    assert!(!null.buffer_is_live(ibo));
}

#[test]
fn pipeline_keeps_program_and_render_pass_alive() {
    let mut ctx = ctx();
    let program = ctx
        .make_shader_program(&ShaderProgramInfo {
            debug_name: "flat",
            stages: &[ShaderStageInfo {
                stage: ShaderStage::Vertex,
                ..Default::default()
            }],
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
            ..Default::default()
        })
        .unwrap();

    ctx.release_shader_program(program).unwrap();
    ctx.release_render_pass(pass).unwrap();
    assert!(ctx.null().unwrap().program_is_live(program));

    ctx.release_graphics_pipeline(pso).unwrap();
    assert!(!ctx.null().unwrap().program_is_live(program));
}

#[test]
fn bind_group_roundtrips_references_on_failure() {
    let mut ctx = ctx();
    let ubo = ctx.make_buffer(&BufferInfo::default()).unwrap();
    let layout = ctx
        .make_bind_group_layout(&BindGroupLayoutInfo {
            debug_name: "material",
            ranges: &[DescriptorRange::default()],
        })
        .unwrap();

    // Wrong binding count fails validation and must leave the inputs'
    // reference counts untouched.
    let err = ctx.make_bind_group(&BindGroupInfo {
        layout,
        bindings: &[],
        ..Default::default()
    });
    assert!(err.is_err());
    assert_eq!(ctx.null().unwrap().buffer_ref_count(ubo), Some(1));

    let group = ctx
        .make_bind_group(&BindGroupInfo {
            layout,
            bindings: &[ResourceBinding::UniformBuffer(ubo)],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ctx.null().unwrap().buffer_ref_count(ubo), Some(2));

    ctx.release_bind_group(group).unwrap();
    assert_eq!(ctx.null().unwrap().buffer_ref_count(ubo), Some(1));
}

#[test]
fn stale_handles_are_rejected_after_destruction() {
    let mut ctx = ctx();
    let buf = vertex_buffer(&mut ctx, 32);
    ctx.release_buffer(buf).unwrap();
    assert!(ctx.release_buffer(buf).is_err());
    assert!(ctx.add_ref_buffer(buf).is_err());

    // The recycled slot gets a fresh generation, so the old handle stays
    // dead even though the slot is reused.
    let replacement = vertex_buffer(&mut ctx, 32);
    assert_eq!(replacement.slot, buf.slot);
    assert!(ctx.null().unwrap().buffer_ref_count(buf).is_none());
}
