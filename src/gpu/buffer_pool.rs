use std::sync::Arc;
use wgpu::util::DeviceExt;

use crate::error::{EngineError, Result};
use crate::gpu::device::GpuContext;

pub type GpuBuf = Arc<wgpu::Buffer>;

/// wgpu requires storage-buffer sizes aligned to `COPY_BUFFER_ALIGNMENT` (4
/// bytes); kept as its own helper so every allocation site rounds the same
/// way.
pub struct BufferPool {
    device: Arc<wgpu::Device>,
    alignment: u64,
}

impl BufferPool {
    pub fn new(ctx: &GpuContext) -> Self {
        Self {
            device: ctx.device.clone(),
            alignment: wgpu::COPY_BUFFER_ALIGNMENT,
        }
    }

    pub fn align_size(&self, size: u64) -> u64 {
        let rem = size % self.alignment;
        if rem == 0 {
            size
        } else {
            size + (self.alignment - rem)
        }
    }

    pub fn acquire(&self, size: u64, usage: wgpu::BufferUsages) -> GpuBuf {
        Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: self.align_size(size),
            usage,
            mapped_at_creation: false,
        }))
    }

    pub fn upload(&self, queue: &wgpu::Queue, data: &[f32]) -> GpuBuf {
        let buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            });
        let buf = Arc::new(buf);
        let _ = queue; // upload happens at creation; queue kept for symmetry with future sharded uploads
        buf
    }
}

/// Blocking GPU-to-host read-back: maps `buffer`, polls the device until the
/// map future resolves, copies out, then unmaps. There is no async runtime
/// in this binary (§5), so every read-back in the driver loop goes through
/// this single synchronous helper rather than each call site re-deriving the
/// map/poll/copy/unmap dance.
fn read_buffer_bytes(ctx: &GpuContext, buffer: &wgpu::Buffer, len_bytes: u64) -> Result<Vec<u8>> {
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("read_buffer staging"),
        size: len_bytes,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, len_bytes);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    ctx.device.poll(wgpu::PollType::Wait).map_err(|e| EngineError::Gpu(e.to_string()))?;

    rx.recv()
        .map_err(|_| EngineError::BufferMap("map_async callback dropped".into()))?
        .map_err(|e| EngineError::BufferMap(e.to_string()))?;

    let data = slice.get_mapped_range();
    let out = data.to_vec();
    drop(data);
    staging.unmap();

    Ok(out)
}

pub fn read_buffer(ctx: &GpuContext, buffer: &wgpu::Buffer, len_bytes: u64) -> Result<Vec<f32>> {
    let bytes = read_buffer_bytes(ctx, buffer, len_bytes)?;
    Ok(bytemuck::cast_slice::<u8, f32>(&bytes).to_vec())
}

pub fn read_buffer_u32(ctx: &GpuContext, buffer: &wgpu::Buffer, len_bytes: u64) -> Result<Vec<u32>> {
    let bytes = read_buffer_bytes(ctx, buffer, len_bytes)?;
    Ok(bytemuck::cast_slice::<u8, u32>(&bytes).to_vec())
}
