//! Small helpers shared by every kernel call site: building bind group
//! entries, uploading a uniform-parameter buffer, and submitting one
//! dispatch. Each dispatch is its own queue submission, so wgpu's per-queue
//! ordering guarantees the next dispatch observes this one's writes --
//! the storage-buffer barrier the kernel contracts require (§4.3, §5).

use wgpu::util::DeviceExt;

use crate::gpu::device::GpuContext;
use crate::gpu::pipeline::PipelineEntry;

pub fn buf_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

pub fn create_uniform(ctx: &GpuContext, bytes: &[u8]) -> wgpu::Buffer {
    ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: None,
        contents: bytes,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Rounds `n` up to the next multiple of `workgroup` -- dispatch counts must
/// cover every element; kernels mask out-of-range invocations themselves.
pub fn workgroups_for(n: u32, workgroup: u32) -> u32 {
    n.div_ceil(workgroup)
}

pub fn dispatch(ctx: &GpuContext, entry: &PipelineEntry, entries: &[wgpu::BindGroupEntry], workgroups: (u32, u32, u32)) {
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: None,
        layout: &entry.bind_group_layout,
        entries,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&entry.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
    }
    ctx.queue.submit(Some(encoder.finish()));
}
