pub mod context;
pub mod driver;
pub mod error;
pub mod null;
pub mod profiler;
pub mod structs;
pub(crate) mod validate;

#[cfg(feature = "nori-gl")]
pub mod gl;
#[cfg(feature = "nori-vulkan")]
pub mod vulkan;

pub use context::{Context, SurfaceTarget};
pub use driver::command::{CommandEncoder, CommandSink};
pub use driver::replay::{CommandReplayer, Replayer};
pub use error::{GpuError, Result};
pub use null::{NativeCall, NullContext};
pub use structs::*;
