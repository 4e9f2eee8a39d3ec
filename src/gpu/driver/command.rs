use bytemuck::{bytes_of, pod_read_unaligned, Pod, Zeroable};

use crate::gpu::structs::{
    BindGroup, Buffer, ClearFlags, ComputePipeline, GraphicsPipeline, RenderPass, Rect2D,
    Swapchain, Texture, VertexArray, Viewport, MAX_COLOR_ATTACHMENTS,
};
use crate::utils::Handle;

//===----------------------------------------------------------------------===//
// Command definitions
//===----------------------------------------------------------------------===//

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    BeginRenderPass = 0,
    EndRenderPass = 1,
    BindPipeline = 2,
    BindComputePipeline = 3,
    BindGroup = 4,
    BindVertexArray = 5,
    SetViewport = 6,
    SetScissor = 7,
    ClearAttachments = 8,
    Draw = 9,
    DrawIndexed = 10,
    DrawIndirect = 11,
    DrawIndexedIndirect = 12,
    Dispatch = 13,
    CopyBuffer = 14,
    DebugMarkerBegin = 15,
    DebugMarkerEnd = 16,
    DebugMarkerInsert = 17,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct BeginRenderPassCmd {
    pub render_pass: Handle<RenderPass>,
    pub colors: [Handle<Texture>; MAX_COLOR_ATTACHMENTS],
    pub color_count: u32,
    pub depth: Handle<Texture>,
    pub has_depth: u32,
    /// Non-zero when rendering into `swapchain`'s current backbuffer
    /// instead of texture attachments.
    pub to_backbuffer: u32,
    pub swapchain: Handle<Swapchain>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct EndRenderPassCmd {}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct BindPipelineCmd {
    pub pipeline: Handle<GraphicsPipeline>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct BindComputePipelineCmd {
    pub pipeline: Handle<ComputePipeline>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct BindGroupCmd {
    pub parameter_index: u32,
    pub group: Handle<BindGroup>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct BindVertexArrayCmd {
    pub vertex_array: Handle<VertexArray>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct SetViewportCmd {
    pub viewport: Viewport,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct SetScissorCmd {
    pub rect: Rect2D,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct ClearAttachmentsCmd {
    pub flags: ClearFlags,
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawCmd {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawIndexedCmd {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawIndirectCmd {
    pub buffer: Handle<Buffer>,
    pub offset: u32,
    pub draw_count: u32,
    pub stride: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DrawIndexedIndirectCmd {
    pub buffer: Handle<Buffer>,
    pub offset: u32,
    pub draw_count: u32,
    pub stride: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DispatchCmd {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct CopyBufferCmd {
    pub src: Handle<Buffer>,
    pub dst: Handle<Buffer>,
    pub src_offset: u32,
    pub dst_offset: u32,
    pub size: u32,
}

/// Fixed-size debug label so marker commands stay plain data.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DebugMarkerCmd {
    pub label: [u8; 64],
}

impl DebugMarkerCmd {
    pub fn new(label: &str) -> Self {
        let mut bytes = [0u8; 64];
        let len = label.len().min(63);
        bytes[..len].copy_from_slice(&label.as_bytes()[..len]);
        Self { label: bytes }
    }

    pub fn text(&self) -> &str {
        let end = self.label.iter().position(|b| *b == 0).unwrap_or(64);
        std::str::from_utf8(&self.label[..end]).unwrap_or("")
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct DebugMarkerEndCmd {}

//===----------------------------------------------------------------------===//
// Command encoder & stream
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CmdHeader {
    op: u16,
    size: u16,
}

/// Records commands into a compact byte stream.
///
/// Nothing executes at append time. A filled encoder is submitted to a
/// [`CommandSink`], which walks the stream in append order; the same stream
/// may be submitted any number of times and always produces the same
/// dispatch sequence. Typical usage fills the encoder once at initialization
/// and replays it every frame.
pub struct CommandEncoder {
    data: Vec<u8>,
    marker_depth: u32,
}

impl CommandEncoder {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(1024),
            marker_depth: 0,
        }
    }

    #[inline(always)]
    fn push<T: Pod>(&mut self, op: Op, payload: &T) {
        let header = CmdHeader {
            op: op as u16,
            size: core::mem::size_of::<T>() as u16,
        };
        self.data.extend_from_slice(bytes_of(&header));
        self.data.extend_from_slice(bytes_of(payload));
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops all recorded commands so the encoder can be refilled.
    pub fn clear(&mut self) {
        self.data.clear();
        self.marker_depth = 0;
    }

    /// Begin rendering into texture attachments compatible with
    /// `render_pass`. At most [`MAX_COLOR_ATTACHMENTS`] colors.
    pub fn begin_render_pass(
        &mut self,
        render_pass: Handle<RenderPass>,
        colors: &[Handle<Texture>],
        depth: Option<Handle<Texture>>,
    ) {
        debug_assert!(colors.len() <= MAX_COLOR_ATTACHMENTS);
        let mut payload = BeginRenderPassCmd {
            render_pass,
            colors: [Handle::INVALID; MAX_COLOR_ATTACHMENTS],
            color_count: colors.len().min(MAX_COLOR_ATTACHMENTS) as u32,
            depth: depth.unwrap_or(Handle::INVALID),
            has_depth: depth.is_some() as u32,
            to_backbuffer: 0,
            swapchain: Handle::INVALID,
        };
        for (slot, color) in payload.colors.iter_mut().zip(colors.iter()) {
            *slot = *color;
        }
        self.push(Op::BeginRenderPass, &payload);
    }

    /// Begin rendering into a swapchain's current backbuffer.
    pub fn begin_render_pass_swapchain(
        &mut self,
        render_pass: Handle<RenderPass>,
        swapchain: Handle<Swapchain>,
    ) {
        let payload = BeginRenderPassCmd {
            render_pass,
            colors: [Handle::INVALID; MAX_COLOR_ATTACHMENTS],
            color_count: 0,
            depth: Handle::INVALID,
            has_depth: 0,
            to_backbuffer: 1,
            swapchain,
        };
        self.push(Op::BeginRenderPass, &payload);
    }

    pub fn end_render_pass(&mut self) {
        self.push(Op::EndRenderPass, &EndRenderPassCmd {});
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: Handle<GraphicsPipeline>) {
        self.push(Op::BindPipeline, &BindPipelineCmd { pipeline });
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) {
        self.push(Op::BindComputePipeline, &BindComputePipelineCmd { pipeline });
    }

    /// Bind a resource group to a root parameter slot.
    pub fn bind_group(&mut self, parameter_index: u32, group: Handle<BindGroup>) {
        self.push(
            Op::BindGroup,
            &BindGroupCmd {
                parameter_index,
                group,
            },
        );
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Handle<VertexArray>) {
        self.push(Op::BindVertexArray, &BindVertexArrayCmd { vertex_array });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Op::SetViewport, &SetViewportCmd { viewport });
    }

    pub fn set_scissor(&mut self, rect: Rect2D) {
        self.push(Op::SetScissor, &SetScissorCmd { rect });
    }

    pub fn clear_attachments(
        &mut self,
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    ) {
        self.push(
            Op::ClearAttachments,
            &ClearAttachmentsCmd {
                flags,
                color,
                depth,
                stencil,
            },
        );
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.push(
            Op::Draw,
            &DrawCmd {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        );
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.push(
            Op::DrawIndexed,
            &DrawIndexedCmd {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            },
        );
    }

    pub fn draw_indirect(
        &mut self,
        buffer: Handle<Buffer>,
        offset: u32,
        draw_count: u32,
        stride: u32,
    ) {
        self.push(
            Op::DrawIndirect,
            &DrawIndirectCmd {
                buffer,
                offset,
                draw_count,
                stride,
            },
        );
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: Handle<Buffer>,
        offset: u32,
        draw_count: u32,
        stride: u32,
    ) {
        self.push(
            Op::DrawIndexedIndirect,
            &DrawIndexedIndirectCmd {
                buffer,
                offset,
                draw_count,
                stride,
            },
        );
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Op::Dispatch, &DispatchCmd { x, y, z });
    }

    pub fn copy_buffer(
        &mut self,
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        src_offset: u32,
        dst_offset: u32,
        size: u32,
    ) {
        self.push(
            Op::CopyBuffer,
            &CopyBufferCmd {
                src,
                dst,
                src_offset,
                dst_offset,
                size,
            },
        );
    }

    /// Open a scoped debug event. Scopes must nest: every begin needs a
    /// matching [`CommandEncoder::end_debug_marker`].
    pub fn begin_debug_marker(&mut self, label: &str) {
        self.marker_depth += 1;
        self.push(Op::DebugMarkerBegin, &DebugMarkerCmd::new(label));
    }

    pub fn end_debug_marker(&mut self) {
        debug_assert!(self.marker_depth > 0, "unbalanced debug marker end");
        self.marker_depth = self.marker_depth.saturating_sub(1);
        self.push(Op::DebugMarkerEnd, &DebugMarkerEndCmd {});
    }

    pub fn insert_debug_marker(&mut self, label: &str) {
        self.push(Op::DebugMarkerInsert, &DebugMarkerCmd::new(label));
    }

    /// Open marker scopes at the current end of the stream.
    pub fn marker_depth(&self) -> u32 {
        self.marker_depth
    }

    /// Walk the stream in append order and dispatch each command into the
    /// sink. May be called repeatedly on the same filled stream.
    pub fn submit<S: CommandSink>(&self, sink: &mut S) {
        for cmd in self.iter() {
            dispatch_command(&cmd, sink);
        }
    }

    pub fn iter(&self) -> CommandIter {
        CommandIter { data: &self.data }
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward one decoded command into a sink. Shared by every replayer.
pub(crate) fn dispatch_command<S: CommandSink>(cmd: &Command, sink: &mut S) {
    match cmd.op {
        Op::BeginRenderPass => sink.begin_render_pass(&cmd.payload::<BeginRenderPassCmd>()),
        Op::EndRenderPass => sink.end_render_pass(&cmd.payload::<EndRenderPassCmd>()),
        Op::BindPipeline => sink.bind_pipeline(&cmd.payload::<BindPipelineCmd>()),
        Op::BindComputePipeline => {
            sink.bind_compute_pipeline(&cmd.payload::<BindComputePipelineCmd>())
        }
        Op::BindGroup => sink.bind_group(&cmd.payload::<BindGroupCmd>()),
        Op::BindVertexArray => sink.bind_vertex_array(&cmd.payload::<BindVertexArrayCmd>()),
        Op::SetViewport => sink.set_viewport(&cmd.payload::<SetViewportCmd>()),
        Op::SetScissor => sink.set_scissor(&cmd.payload::<SetScissorCmd>()),
        Op::ClearAttachments => sink.clear_attachments(&cmd.payload::<ClearAttachmentsCmd>()),
        Op::Draw => sink.draw(&cmd.payload::<DrawCmd>()),
        Op::DrawIndexed => sink.draw_indexed(&cmd.payload::<DrawIndexedCmd>()),
        Op::DrawIndirect => sink.draw_indirect(&cmd.payload::<DrawIndirectCmd>()),
        Op::DrawIndexedIndirect => {
            sink.draw_indexed_indirect(&cmd.payload::<DrawIndexedIndirectCmd>())
        }
        Op::Dispatch => sink.dispatch(&cmd.payload::<DispatchCmd>()),
        Op::CopyBuffer => sink.copy_buffer(&cmd.payload::<CopyBufferCmd>()),
        Op::DebugMarkerBegin => sink.debug_marker_begin(&cmd.payload::<DebugMarkerCmd>()),
        Op::DebugMarkerEnd => sink.debug_marker_end(&cmd.payload::<DebugMarkerEndCmd>()),
        Op::DebugMarkerInsert => sink.debug_marker_insert(&cmd.payload::<DebugMarkerCmd>()),
    }
}

//===----------------------------------------------------------------------===//
// Iteration
//===----------------------------------------------------------------------===//

pub struct Command<'a> {
    pub op: Op,
    bytes: &'a [u8],
}

impl<'a> Command<'a> {
    /// Decode the payload by value; the stream carries no alignment
    /// guarantees, so reads are unaligned.
    pub fn payload<T: Pod>(&self) -> T {
        pod_read_unaligned(self.bytes)
    }
}

pub struct CommandIter<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        use core::mem::size_of;
        if self.data.len() < size_of::<CmdHeader>() {
            return None;
        }
        let (head_bytes, rest) = self.data.split_at(size_of::<CmdHeader>());
        let header: CmdHeader = pod_read_unaligned(head_bytes);
        if rest.len() < header.size as usize {
            return None;
        }
        let (payload, remaining) = rest.split_at(header.size as usize);
        self.data = remaining;
        Some(Command {
            op: Op::from_u16(header.op)?,
            bytes: payload,
        })
    }
}

impl Op {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            x if x == Op::BeginRenderPass as u16 => Some(Op::BeginRenderPass),
            x if x == Op::EndRenderPass as u16 => Some(Op::EndRenderPass),
            x if x == Op::BindPipeline as u16 => Some(Op::BindPipeline),
            x if x == Op::BindComputePipeline as u16 => Some(Op::BindComputePipeline),
            x if x == Op::BindGroup as u16 => Some(Op::BindGroup),
            x if x == Op::BindVertexArray as u16 => Some(Op::BindVertexArray),
            x if x == Op::SetViewport as u16 => Some(Op::SetViewport),
            x if x == Op::SetScissor as u16 => Some(Op::SetScissor),
            x if x == Op::ClearAttachments as u16 => Some(Op::ClearAttachments),
            x if x == Op::Draw as u16 => Some(Op::Draw),
            x if x == Op::DrawIndexed as u16 => Some(Op::DrawIndexed),
            x if x == Op::DrawIndirect as u16 => Some(Op::DrawIndirect),
            x if x == Op::DrawIndexedIndirect as u16 => Some(Op::DrawIndexedIndirect),
            x if x == Op::Dispatch as u16 => Some(Op::Dispatch),
            x if x == Op::CopyBuffer as u16 => Some(Op::CopyBuffer),
            x if x == Op::DebugMarkerBegin as u16 => Some(Op::DebugMarkerBegin),
            x if x == Op::DebugMarkerEnd as u16 => Some(Op::DebugMarkerEnd),
            x if x == Op::DebugMarkerInsert as u16 => Some(Op::DebugMarkerInsert),
            _ => None,
        }
    }
}

/// Backend dispatch surface: one handler per opcode, invoked in stream order
/// during submission.
pub trait CommandSink {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPassCmd);
    fn end_render_pass(&mut self, cmd: &EndRenderPassCmd);
    fn bind_pipeline(&mut self, cmd: &BindPipelineCmd);
    fn bind_compute_pipeline(&mut self, cmd: &BindComputePipelineCmd);
    fn bind_group(&mut self, cmd: &BindGroupCmd);
    fn bind_vertex_array(&mut self, cmd: &BindVertexArrayCmd);
    fn set_viewport(&mut self, cmd: &SetViewportCmd);
    fn set_scissor(&mut self, cmd: &SetScissorCmd);
    fn clear_attachments(&mut self, cmd: &ClearAttachmentsCmd);
    fn draw(&mut self, cmd: &DrawCmd);
    fn draw_indexed(&mut self, cmd: &DrawIndexedCmd);
    fn draw_indirect(&mut self, cmd: &DrawIndirectCmd);
    fn draw_indexed_indirect(&mut self, cmd: &DrawIndexedIndirectCmd);
    fn dispatch(&mut self, cmd: &DispatchCmd);
    fn copy_buffer(&mut self, cmd: &CopyBufferCmd);
    fn debug_marker_begin(&mut self, cmd: &DebugMarkerCmd);
    fn debug_marker_end(&mut self, cmd: &DebugMarkerEndCmd);
    fn debug_marker_insert(&mut self, cmd: &DebugMarkerCmd);
}

//===----------------------------------------------------------------------===//
// Tests
//===----------------------------------------------------------------------===//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut enc = CommandEncoder::new();
        let pipeline = Handle::<GraphicsPipeline>::new(2, 0);
        let va = Handle::<VertexArray>::new(4, 1);
        let group = Handle::<BindGroup>::new(7, 0);
        let buf = Handle::<Buffer>::new(9, 3);

        enc.bind_graphics_pipeline(pipeline);
        enc.bind_group(1, group);
        enc.bind_vertex_array(va);
        enc.draw(3, 1, 0, 0);
        enc.draw_indexed(6, 2, 0, -1, 0);
        enc.draw_indirect(buf, 16, 1, 16);
        enc.dispatch(8, 4, 1);

        let mut iter = enc.iter();

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::BindPipeline);
        assert_eq!(cmd.payload::<BindPipelineCmd>(), BindPipelineCmd { pipeline });

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::BindGroup);
        assert_eq!(
            cmd.payload::<BindGroupCmd>(),
            BindGroupCmd {
                parameter_index: 1,
                group
            }
        );

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::BindVertexArray);
        assert_eq!(
            cmd.payload::<BindVertexArrayCmd>(),
            BindVertexArrayCmd { vertex_array: va }
        );

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::Draw);
        assert_eq!(
            cmd.payload::<DrawCmd>(),
            DrawCmd {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0
            }
        );

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::DrawIndexed);
        assert_eq!(cmd.payload::<DrawIndexedCmd>().base_vertex, -1);

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::DrawIndirect);
        assert_eq!(
            cmd.payload::<DrawIndirectCmd>(),
            DrawIndirectCmd {
                buffer: buf,
                offset: 16,
                draw_count: 1,
                stride: 16
            }
        );

        let cmd = iter.next().unwrap();
        assert_eq!(cmd.op, Op::Dispatch);
        assert_eq!(cmd.payload::<DispatchCmd>(), DispatchCmd { x: 8, y: 4, z: 1 });

        assert!(iter.next().is_none());
    }

    #[test]
    fn clear_resets_the_stream() {
        let mut enc = CommandEncoder::new();
        assert!(enc.is_empty());
        enc.draw(3, 1, 0, 0);
        assert!(!enc.is_empty());
        enc.clear();
        assert!(enc.is_empty());
        assert!(enc.iter().next().is_none());
    }

    #[test]
    fn marker_labels_survive_encoding() {
        let mut enc = CommandEncoder::new();
        enc.begin_debug_marker("shadow pass");
        enc.insert_debug_marker("cascade 0");
        enc.end_debug_marker();
        assert_eq!(enc.marker_depth(), 0);

        let cmds: Vec<_> = enc.iter().collect();
        assert_eq!(cmds[0].op, Op::DebugMarkerBegin);
        assert_eq!(cmds[0].payload::<DebugMarkerCmd>().text(), "shadow pass");
        assert_eq!(cmds[1].payload::<DebugMarkerCmd>().text(), "cascade 0");
        assert_eq!(cmds[2].op, Op::DebugMarkerEnd);
    }

    #[test]
    fn marker_scopes_nest() {
        let mut enc = CommandEncoder::new();
        enc.begin_debug_marker("frame");
        enc.begin_debug_marker("opaque");
        assert_eq!(enc.marker_depth(), 2);
        enc.end_debug_marker();
        enc.end_debug_marker();
        assert_eq!(enc.marker_depth(), 0);
    }

    #[test]
    fn long_marker_labels_truncate() {
        let long = "x".repeat(100);
        let cmd = DebugMarkerCmd::new(&long);
        assert_eq!(cmd.text().len(), 63);
    }

    #[test]
    fn render_pass_attachments_round_trip() {
        let mut enc = CommandEncoder::new();
        let rp = Handle::<RenderPass>::new(0, 0);
        let color = Handle::<Texture>::new(3, 0);
        let depth = Handle::<Texture>::new(4, 0);
        enc.begin_render_pass(rp, &[color], Some(depth));
        enc.end_render_pass();

        let cmds: Vec<_> = enc.iter().collect();
        let begin = cmds[0].payload::<BeginRenderPassCmd>();
        assert_eq!(begin.color_count, 1);
        assert_eq!(begin.colors[0], color);
        assert_eq!(begin.has_depth, 1);
        assert_eq!(begin.depth, depth);
        assert_eq!(begin.to_backbuffer, 0);
        assert_eq!(cmds[1].op, Op::EndRenderPass);
    }
}
