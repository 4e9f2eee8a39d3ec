//! Multi-backend render hardware interface.
//!
//! One descriptor-driven surface of buffers, textures, pipeline state and
//! deferred command streams, translated by Null, OpenGL / OpenGL ES 3 and
//! Vulkan backends. Resources are pooled behind typed 16-bit handles with
//! intrusive reference counts; command streams record once and replay every
//! frame.

pub mod gpu;
pub mod utils;

pub use gpu::*;
pub use utils::{Handle, IdAllocator, Pool, Release};
