pub mod command;
pub mod replay;

pub use command::{Command, CommandEncoder, CommandIter, CommandSink, Op};
pub use replay::{CommandReplayer, Replayer};
