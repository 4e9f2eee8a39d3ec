pub mod handle;
pub mod id_allocator;

pub use handle::{Handle, Pool, Release};
pub use id_allocator::IdAllocator;
