//! RunState (§3): GPU scratch buffers reallocated once per session and
//! reused across every autoregressive step.
//!
//! The four fixed `mulBuffer_1..4` ping-pong slots described in the data
//! model are superseded here: `BufferPool::acquire` hands out a fresh
//! `Arc`-counted buffer per reduction/attention-staging step and releases it
//! by drop, the same allocate-on-demand idiom the GPU layer already uses
//! for every other scratch allocation. There is no fixed slot to leak, so
//! the corresponding "free omits mulBuffer_4" bug has no counterpart here.

use crate::config::Config;
use crate::gpu::{BufferPool, GpuBuf};

const STORAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

pub struct RunState {
    pub x: GpuBuf,
    pub xb: GpuBuf,
    pub xb2: GpuBuf,
    pub hb: GpuBuf,
    pub hb2: GpuBuf,
    pub q: GpuBuf,
    pub k: GpuBuf,
    pub v: GpuBuf,
    pub att: GpuBuf,
    pub logits: GpuBuf,
    pub key_cache: GpuBuf,
    pub value_cache: GpuBuf,
}

impl RunState {
    pub fn new(cfg: &Config, pool: &BufferPool) -> Self {
        let f32_buf = |n: usize| pool.acquire((n * 4) as u64, STORAGE);

        Self {
            x: f32_buf(cfg.dim),
            xb: f32_buf(cfg.dim),
            xb2: f32_buf(cfg.dim),
            hb: f32_buf(cfg.hidden_dim),
            hb2: f32_buf(cfg.hidden_dim),
            q: f32_buf(cfg.dim),
            k: f32_buf(cfg.dim),
            v: f32_buf(cfg.dim),
            att: f32_buf(cfg.n_heads * cfg.seq_len),
            logits: f32_buf(cfg.vocab_size),
            key_cache: f32_buf(cfg.n_layers * cfg.seq_len * cfg.dim),
            value_cache: f32_buf(cfg.n_layers * cfg.seq_len * cfg.dim),
        }
    }
}

/// Host-side scratch for top-p sampling (§3, §4.6): a parallel array of
/// (probability, original vocabulary index) pairs, sorted in place.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbIndex {
    pub prob: f32,
    pub index: u32,
}
