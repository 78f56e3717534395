pub mod bindless;
pub mod buffer;

pub use bindless::{BindlessAllocator, BindlessHandle};
pub use buffer::GpuBuffer;
