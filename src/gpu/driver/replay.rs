use super::command::{dispatch_command, CommandEncoder, CommandSink};

/// Trait for types that can replay a [`CommandEncoder`] on a [`CommandSink`].
pub trait Replayer<S: CommandSink> {
    /// Obtain the underlying command sink.
    fn sink(&mut self) -> &mut S;

    /// Iterate over the encoded command stream and forward each operation to
    /// the underlying sink, in append order.
    fn replay(&mut self, encoder: &CommandEncoder) {
        let sink = self.sink();
        for cmd in encoder.iter() {
            dispatch_command(&cmd, sink);
        }
    }
}

/// Generic replayer that forwards commands to any [`CommandSink`].
///
/// Useful for tests and headless runs where commands are interpreted
/// without performing real GPU work.
pub struct CommandReplayer<'a, S: CommandSink> {
    sink: &'a mut S,
}

impl<'a, S: CommandSink> CommandReplayer<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self { sink }
    }
}

impl<'a, S: CommandSink> Replayer<S> for CommandReplayer<'a, S> {
    fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::null::{NativeCall, NullContext};
    use crate::gpu::structs::ContextInfo;

    #[test]
    fn replays_match_direct_submission() {
        let mut enc = CommandEncoder::new();
        enc.dispatch(4, 2, 1);
        enc.draw(3, 1, 0, 0);

        let mut sink = NullContext::new(&ContextInfo::default());
        CommandReplayer::new(&mut sink).replay(&enc);
        CommandReplayer::new(&mut sink).replay(&enc);

        let calls = sink.native_calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], calls[2]);
        assert_eq!(calls[1], calls[3]);
        assert!(matches!(calls[0], NativeCall::Dispatch { x: 4, y: 2, z: 1 }));
        assert!(matches!(calls[1], NativeCall::Draw { vertex_count: 3, .. }));
    }
}
