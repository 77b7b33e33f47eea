pub mod buffer_pool;
pub mod device;
pub mod pipeline;

pub use buffer_pool::{read_buffer, read_buffer_u32, BufferPool, GpuBuf};
pub use device::GpuContext;
pub use pipeline::PipelineManager;
