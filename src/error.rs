use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Failed to request a compute-capable GPU adapter")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("shader compile/link error in kernel \"{0}\"")]
    ShaderCompile(String),

    #[error("buffer mapping failed for \"{0}\"")]
    BufferMap(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("{0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
