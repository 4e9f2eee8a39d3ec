//! Replay determinism: a filled stream dispatches identically on every
//! submission.

use nori::*;

fn ctx() -> Context {
    Context::new(&ContextInfo::default()).unwrap()
}

#[test]
fn one_fill_two_submits_identical_call_sequences() {
    let mut ctx = ctx();
    let program = ctx
        .make_shader_program(&ShaderProgramInfo {
            debug_name: "tri",
            stages: &[ShaderStageInfo::default()],
        })
        .unwrap();
    let pass = ctx
        .make_render_pass(&RenderPassInfo {
            color_formats: &[Format::RGBA8Unorm],
            ..Default::default()
        })
        .unwrap();
    let target = ctx
        .make_texture(&TextureInfo {
            dim: [64, 64, 1],
            flags: TextureFlags::RENDER_TARGET | TextureFlags::SHADER_RESOURCE,
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

    // Fill once at initialization.
    let mut enc = CommandEncoder::new();
    enc.begin_render_pass(pass, &[target], None);
    enc.bind_graphics_pipeline(pso);
    enc.set_viewport(Viewport::default());
    enc.set_scissor(Rect2D {
        x: 0,
        y: 0,
        w: 64,
        h: 64,
    });
    enc.clear_attachments(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0, 0);
    enc.draw(3, 1, 0, 0);
    enc.end_render_pass();

    // Replay every frame.
    ctx.submit(&enc).unwrap();
    ctx.submit(&enc).unwrap();

    let calls = ctx.null().unwrap().native_calls();
    assert_eq!(calls.len() % 2, 0);
    let (first, second) = calls.split_at(calls.len() / 2);
    assert_eq!(first, second);
    assert!(matches!(first[0], NativeCall::BeginRenderPass { .. }));
    assert!(matches!(
        first[first.len() - 2],
        NativeCall::Draw {
            vertex_count: 3,
            instance_count: 1,
            ..
        }
    ));
}

#[test]
fn commands_execute_in_append_order() {
    let mut ctx = ctx();
    let mut enc = CommandEncoder::new();
    enc.dispatch(1, 1, 1);
    enc.dispatch(2, 2, 2);
    enc.dispatch(3, 3, 3);
    ctx.submit(&enc).unwrap();

    let calls = ctx.null().unwrap().native_calls();
    let xs: Vec<u32> = calls
        .iter()
        .map(|c| match c {
            NativeCall::Dispatch { x, .. } => *x,
            other => panic!("unexpected call {:?}", other),
        })
        .collect();
    assert_eq!(xs, vec![1, 2, 3]);
}

#[test]
fn cleared_encoder_submits_nothing() {
    let mut ctx = ctx();
    let mut enc = CommandEncoder::new();
    enc.draw(3, 1, 0, 0);
    enc.clear();
    assert!(enc.is_empty());
    ctx.submit(&enc).unwrap();
    assert!(ctx.null().unwrap().native_calls().is_empty());
}

#[test]
fn marker_scopes_nest_and_carry_labels() {
    let mut ctx = ctx();
    let mut enc = CommandEncoder::new();
    enc.begin_debug_marker("frame");
    enc.begin_debug_marker("shadows");
    enc.insert_debug_marker("cascade 1");
    enc.end_debug_marker();
    enc.end_debug_marker();
    ctx.submit(&enc).unwrap();

    let calls = ctx.null().unwrap().native_calls();
    assert_eq!(
        calls,
        &[
            NativeCall::MarkerBegin("frame".into()),
            NativeCall::MarkerBegin("shadows".into()),
            NativeCall::MarkerInsert("cascade 1".into()),
            NativeCall::MarkerEnd,
            NativeCall::MarkerEnd,
        ]
    );
}

#[test]
fn unbalanced_marker_scopes_are_rejected_at_submit() {
    let mut ctx = ctx();
    let mut enc = CommandEncoder::new();
    enc.begin_debug_marker("open");
    assert!(ctx.submit(&enc).is_err());
    assert!(ctx.null().unwrap().native_calls().is_empty());
}

#[test]
fn swapchain_present_counts_frames() {
    let mut ctx = ctx();
    let sc = ctx
        .make_swapchain(&SwapchainInfo::default(), SurfaceTarget::Headless)
        .unwrap();
    ctx.present(sc).unwrap();
    ctx.present(sc).unwrap();
    let calls = ctx.null().unwrap().native_calls();
    assert_eq!(
        calls,
        &[
            NativeCall::Present {
                swapchain: sc.slot,
                frame: 1
            },
            NativeCall::Present {
                swapchain: sc.slot,
                frame: 2
            },
        ]
    );

    ctx.resize_swapchain(
        sc,
        Extent {
            width: 640,
            height: 480,
        },
    )
    .unwrap();
    assert_eq!(
        ctx.swapchain_extent(sc).unwrap(),
        Extent {
            width: 640,
            height: 480
        }
    );
}
