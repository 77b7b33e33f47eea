//! Greedy, multinomial, and top-p sampling (§4.6). All three share the same
//! logits buffer; greedy never touches temperature/softmax, the other two
//! always do.

use crate::error::Result;
use crate::gpu::buffer_pool::read_buffer;
use crate::gpu::device::GpuContext;
use crate::gpu::pipeline::PipelineManager;
use crate::gpu::{BufferPool, GpuBuf};
use crate::model::dispatch::{buf_entry, create_uniform, dispatch, workgroups_for};
use crate::model::reduction::{read_argmax_index, reduce_argmax, softmax_inplace};
use crate::model::runstate::ProbIndex;
use crate::rng::Rng;
use crate::shaders;

fn apply_temperature(ctx: &GpuContext, pm: &mut PipelineManager, logits: &GpuBuf, n: u32, temperature: f32) {
    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Params {
        temperature: f32,
        n: u32,
        _pad: [u32; 2],
    }
    let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { temperature, n, _pad: [0; 2] }));
    let entry = pm.get_or_create("temperature", shaders::TEMPERATURE, "main");
    dispatch(ctx, &entry, &[buf_entry(0, logits), buf_entry(1, &uniform)], (workgroups_for(n, 64), 1, 1));
}

/// Greedy argmax over `logits`, driven entirely on the GPU; the readback is
/// the single surviving scalar index.
pub fn sample_greedy(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, logits: &GpuBuf, vocab_size: u32) -> Result<u32> {
    let (_values, indices) = reduce_argmax(ctx, pm, pool, logits, vocab_size);
    read_argmax_index(ctx, &indices)
}

/// Divides by temperature, softmaxes in place (`rows = 1`, never 0 -- the
/// source's multinomial-softmax bug), then reads back every probability.
fn softmax_logits(ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, logits: &GpuBuf, vocab_size: u32, temperature: f32) -> Result<Vec<f32>> {
    apply_temperature(ctx, pm, logits, vocab_size, temperature);
    softmax_inplace(ctx, pm, pool, logits, 1, vocab_size);
    read_buffer(ctx, logits, vocab_size as u64 * 4)
}

pub fn sample_multinomial(
    ctx: &GpuContext,
    pm: &mut PipelineManager,
    pool: &BufferPool,
    logits: &GpuBuf,
    vocab_size: u32,
    temperature: f32,
    rng: &mut Rng,
) -> Result<u32> {
    let probs = softmax_logits(ctx, pm, pool, logits, vocab_size, temperature)?;
    let r = rng.next_f32();

    let mut cdf = 0.0f32;
    for (i, &p) in probs.iter().enumerate() {
        cdf += p;
        if cdf > r {
            return Ok(i as u32);
        }
    }
    Ok(vocab_size - 1)
}

pub fn sample_top_p(
    ctx: &GpuContext,
    pm: &mut PipelineManager,
    pool: &BufferPool,
    logits: &GpuBuf,
    vocab_size: u32,
    temperature: f32,
    topp: f32,
    rng: &mut Rng,
) -> Result<u32> {
    let probs = softmax_logits(ctx, pm, pool, logits, vocab_size, temperature)?;

    let mut sorted: Vec<ProbIndex> = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| ProbIndex { prob: p, index: i as u32 })
        .collect();
    sorted.sort_by(|a, b| b.prob.partial_cmp(&a.prob).unwrap_or(std::cmp::Ordering::Equal));

    // Smallest prefix whose cumulative mass exceeds topp, boundary inclusive.
    let mut cumulative = 0.0f32;
    let mut last_idx = sorted.len() - 1;
    for (i, entry) in sorted.iter().enumerate() {
        cumulative += entry.prob;
        if cumulative > topp {
            last_idx = i;
            break;
        }
    }

    let r = rng.next_f32() * cumulative;
    let mut running = 0.0f32;
    let mut result: Option<u32> = None;
    for entry in &sorted[..=last_idx] {
        running += entry.prob;
        if running > r {
            result = Some(entry.index);
            break;
        }
    }

    // §9: preserve the CDF-scan result; only fall back to the boundary
    // element when the scan never assigned (e.g. float rounding at the tail).
    Ok(result.unwrap_or(sorted[last_idx].index))
}
