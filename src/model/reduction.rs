//! The pairwise tree-reduction driver (§4.4): sum, max, argmax and the
//! softmax chain built on top of them. Every step halves the working size
//! and ping-pongs into a freshly acquired buffer; the loop always seeds the
//! first step with the true input length, never a hard-coded zero (§9's
//! `transformer_sum` bug).

use crate::gpu::buffer_pool::read_buffer_u32;
use crate::gpu::device::GpuContext;
use crate::gpu::pipeline::PipelineManager;
use crate::gpu::{BufferPool, GpuBuf};
use crate::model::dispatch::{buf_entry, create_uniform, dispatch, workgroups_for};
use crate::shaders;

const STORAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

fn reduce_step_2arg(
    ctx: &GpuContext,
    pm: &mut PipelineManager,
    pool: &BufferPool,
    kernel: &'static str,
    wgsl: &str,
    input: &GpuBuf,
    rows: u32,
    insize: u32,
) -> (GpuBuf, u32) {
    let shape0 = insize.div_ceil(2);
    let out = pool.acquire((rows * shape0) as u64 * 4, STORAGE);

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Params {
        insize: u32,
        shape0: u32,
        rows: u32,
        _pad: u32,
    }
    let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { insize, shape0, rows, _pad: 0 }));

    let entry = pm.get_or_create(kernel, wgsl, "main");
    dispatch(
        ctx,
        &entry,
        &[buf_entry(0, input), buf_entry(1, &out), buf_entry(2, &uniform)],
        (workgroups_for(shape0, 8), workgroups_for(rows, 8), 1),
    );

    (out, shape0)
}

/// Generic pairwise reduction over an `R x S` grid along the fast axis,
/// using a kernel with the `(insize, shape0)` uniform contract (sum or max).
pub fn tree_reduce(
    ctx: &GpuContext,
    pm: &mut PipelineManager,
    pool: &BufferPool,
    kernel: &'static str,
    wgsl: &str,
    input: &GpuBuf,
    rows: u32,
    insize: u32,
) -> GpuBuf {
    let mut current = input.clone();
    let mut size = insize;
    while size > 1 {
        let (next, next_size) = reduce_step_2arg(ctx, pm, pool, kernel, wgsl, &current, rows, size);
        current = next;
        size = next_size;
    }
    current
}

pub fn reduce_sum(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, input: &GpuBuf, rows: u32, insize: u32) -> GpuBuf {
    tree_reduce(ctx, pm, pool, "sum", shaders::SUM, input, rows, insize)
}

pub fn reduce_max(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, input: &GpuBuf, rows: u32, insize: u32) -> GpuBuf {
    tree_reduce(ctx, pm, pool, "max", shaders::MAX, input, rows, insize)
}

/// Sum-of-squares reduction for RMSNorm: the squared-input kernel runs once
/// (rows = 1), then the generic `sum` kernel carries the tree to a scalar.
pub fn reduce_sum_of_squares(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, input: &GpuBuf, n: u32) -> GpuBuf {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Params {
        insize: u32,
        _pad: [u32; 3],
    }
    let shape0 = n.div_ceil(2);
    let out = pool.acquire(shape0 as u64 * 4, STORAGE);
    let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { insize: n, _pad: [0; 3] }));
    let entry = pm.get_or_create("rmsnorm_squares_and_sum", shaders::RMSNORM_SQUARES_AND_SUM, "main");
    dispatch(
        ctx,
        &entry,
        &[buf_entry(0, input), buf_entry(1, &out), buf_entry(2, &uniform)],
        (workgroups_for(shape0, 64), 1, 1),
    );

    if shape0 == 1 {
        return out;
    }
    reduce_sum(ctx, pm, pool, &out, 1, shape0)
}

/// Pairwise argmax reduction (§4.3, §4.6). Bugfix applied: uniforms for
/// every step are created and bound fresh against the argmax pipeline --
/// never reused from a different kernel's uniform buffer.
pub fn reduce_argmax(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, values: &GpuBuf, insize: u32) -> (GpuBuf, GpuBuf) {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct SeedParams {
        insize: u32,
        _pad: [u32; 3],
    }
    let index = pool.acquire(insize as u64 * 4, STORAGE);
    let seed_uniform = create_uniform(ctx, bytemuck::bytes_of(&SeedParams { insize, _pad: [0; 3] }));
    let seed_entry = pm.get_or_create("argmax_set_index", shaders::ARGMAX_SET_INDEX, "main");
    dispatch(
        ctx,
        &seed_entry,
        &[buf_entry(0, &index), buf_entry(1, &seed_uniform)],
        (workgroups_for(insize, 64), 1, 1),
    );

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct StepParams {
        insize: u32,
        shape0: u32,
    }

    let mut cur_values = values.clone();
    let mut cur_indices = index;
    let mut size = insize;
    let entry = pm.get_or_create("argmax", shaders::ARGMAX, "main");

    while size > 1 {
        let shape0 = size.div_ceil(2);
        let next_values = pool.acquire(shape0 as u64 * 4, STORAGE);
        let next_indices = pool.acquire(shape0 as u64 * 4, STORAGE);
        let uniform = create_uniform(ctx, bytemuck::bytes_of(&StepParams { insize: size, shape0 }));

        dispatch(
            ctx,
            &entry,
            &[
                buf_entry(0, &cur_values),
                buf_entry(1, &cur_indices),
                buf_entry(2, &next_values),
                buf_entry(3, &next_indices),
                buf_entry(4, &uniform),
            ],
            (workgroups_for(shape0, 64), 1, 1),
        );

        cur_values = next_values;
        cur_indices = next_indices;
        size = shape0;
    }

    (cur_values, cur_indices)
}

/// Reads back the surviving index of a fully-reduced argmax chain.
pub fn read_argmax_index(ctx: &GpuContext, indices: &GpuBuf) -> crate::error::Result<u32> {
    let index_bytes = read_buffer_u32(ctx, indices, 4)?;
    Ok(index_bytes[0])
}

/// Softmax chain (§4.4): max-reduction -> exp-and-partial-sum -> sum-reduction
/// -> normalize, over an `R x N` grid.
pub fn softmax_inplace(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, x: &GpuBuf, rows: u32, n: u32) {
    let max_val = reduce_max(ctx, pm, pool, x, rows, n);

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct ExpParams {
        insize: u32,
        shape0: u32,
        rows: u32,
        _pad: u32,
    }
    let shape0 = n.div_ceil(2);
    let partial = pool.acquire((rows * shape0) as u64 * 4, STORAGE);
    let uniform = create_uniform(ctx, bytemuck::bytes_of(&ExpParams { insize: n, shape0, rows, _pad: 0 }));
    let exp_entry = pm.get_or_create("softmax_exp_and_sum", shaders::SOFTMAX_EXP_AND_SUM, "main");
    dispatch(
        ctx,
        &exp_entry,
        &[buf_entry(0, x), buf_entry(1, &max_val), buf_entry(2, &partial), buf_entry(3, &uniform)],
        (workgroups_for(shape0, 8), workgroups_for(rows, 8), 1),
    );

    let row_sum = if shape0 == 1 {
        partial
    } else {
        reduce_sum(ctx, pm, pool, &partial, rows, shape0)
    };

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct NormParams {
        shape0: u32,
        rows: u32,
        _pad: [u32; 2],
    }
    let norm_uniform = create_uniform(ctx, bytemuck::bytes_of(&NormParams { shape0: n, rows, _pad: [0; 2] }));
    let norm_entry = pm.get_or_create("softmax_normalize", shaders::SOFTMAX_NORMALIZE, "main");
    dispatch(
        ctx,
        &norm_entry,
        &[buf_entry(0, &row_sum), buf_entry(1, &max_val), buf_entry(2, x), buf_entry(3, &norm_uniform)],
        (workgroups_for(n, 8), workgroups_for(rows, 8), 1),
    );
}
