//! Indirect draw argument layout and buffer round-trips.

use bytemuck::{bytes_of, pod_read_unaligned};
use nori::*;

fn ctx() -> Context {
    Context::new(&ContextInfo::default()).unwrap()
}

#[test]
fn draw_arguments_round_trip_bit_exact() {
    let mut ctx = ctx();
    let args = DrawArguments {
        vertex_count_per_instance: 3,
        instance_count: 1,
        start_vertex_location: 0,
        start_instance_location: 0,
    };
    let buf = ctx
        .make_buffer(&BufferInfo {
            debug_name: "indirect",
            byte_size: std::mem::size_of::<DrawArguments>() as u32,
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS,
            initial_data: Some(bytes_of(&args)),
            ..Default::default()
        })
        .unwrap();

    let bytes = ctx
        .read_buffer(buf, 0, std::mem::size_of::<DrawArguments>() as u32)
        .unwrap();
    let back: DrawArguments = pod_read_unaligned(&bytes);
    assert_eq!(back, args);
}

#[test]
fn indexed_arguments_preserve_signed_base_vertex() {
    let mut ctx = ctx();
    let args = DrawIndexedArguments {
        index_count_per_instance: 36,
        instance_count: 16,
        start_index_location: 12,
        base_vertex_location: -4,
        start_instance_location: 2,
    };
    let buf = ctx
        .make_buffer(&BufferInfo {
            byte_size: std::mem::size_of::<DrawIndexedArguments>() as u32 * 2,
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_INDEXED_ARGUMENTS,
            ..Default::default()
        })
        .unwrap();
    let record = std::mem::size_of::<DrawIndexedArguments>() as u32;
    ctx.write_buffer(buf, record, bytes_of(&args)).unwrap();

    let back: DrawIndexedArguments =
        pod_read_unaligned(&ctx.read_buffer(buf, record, record).unwrap());
    assert_eq!(back, args);
}

#[test]
fn argument_type_flags_are_mutually_exclusive_and_required() {
    let mut ctx = ctx();
    let both = ctx.make_buffer(&BufferInfo {
        byte_size: 16,
        usage: BufferUsage::Indirect,
        indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS
            | IndirectBufferFlags::DRAW_INDEXED_ARGUMENTS,
        ..Default::default()
    });
    assert!(both.is_err());

    let neither = ctx.make_buffer(&BufferInfo {
        byte_size: 16,
        usage: BufferUsage::Indirect,
        ..Default::default()
    });
    assert!(neither.is_err());

    // The failures above must not leak pool slots.
    let ok = ctx.make_buffer(&BufferInfo {
        byte_size: 16,
        usage: BufferUsage::Indirect,
        indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS,
        ..Default::default()
    });
    assert!(ok.is_ok());
}

#[test]
fn indirect_draws_dispatch_with_offsets() {
    let mut ctx = ctx();
    let record = std::mem::size_of::<DrawArguments>() as u32;
    let buf = ctx
        .make_buffer(&BufferInfo {
            byte_size: record * 4,
            usage: BufferUsage::Indirect,
            indirect_flags: IndirectBufferFlags::DRAW_ARGUMENTS,
            ..Default::default()
        })
        .unwrap();

    let mut enc = CommandEncoder::new();
    enc.draw_indirect(buf, record, 2, record);
    ctx.submit(&enc).unwrap();

    let calls = ctx.null().unwrap().native_calls();
    assert_eq!(
        calls,
        &[NativeCall::DrawIndirect {
            buffer: buf.slot,
            offset: record,
            draw_count: 2,
        }]
    );
}

#[test]
fn instanced_vertex_buffer_sizing() {
    // 1024 instances, each carrying a position+rotation quaternion+scale
    // packed as two vec4s.
    const INSTANCES: u32 = 1024;
    const FLOATS_PER_INSTANCE: u32 = 2 * 4;
    let byte_size = INSTANCES * FLOATS_PER_INSTANCE * std::mem::size_of::<f32>() as u32;
    assert_eq!(byte_size, 1024 * 2 * 4 * 4);

    let mut ctx = ctx();
    let buf = ctx
        .make_buffer(&BufferInfo {
            debug_name: "instances",
            byte_size,
            usage: BufferUsage::Vertex,
            visibility: MemoryVisibility::Gpu,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ctx.buffer_size(buf).unwrap(), byte_size);
}
