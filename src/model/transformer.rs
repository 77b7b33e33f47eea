//! One forward pass per token (§4.5): embedding lookup, L transformer
//! blocks, final RMSNorm, logits projection.

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::gpu::device::GpuContext;
use crate::gpu::pipeline::PipelineManager;
use crate::gpu::{BufferPool, GpuBuf};
use crate::model::dispatch::{buf_entry, create_uniform, dispatch, workgroups_for};
use crate::model::reduction::{reduce_sum, reduce_sum_of_squares, softmax_inplace};
use crate::model::runstate::RunState;
use crate::model::weights::Weights;
use crate::shaders;

const STORAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

pub struct Transformer {
    pub config: Config,
    pub weights: Weights,
    pub state: RunState,
}

impl Transformer {
    pub fn new(config: Config, weights: Weights, pool: &BufferPool) -> Self {
        let state = RunState::new(&config, pool);
        Self { config, weights, state }
    }

    /// `out == x` (by buffer identity) dispatches the in-place entry point,
    /// which exposes `x` through a single `read_write` binding -- binding the
    /// same buffer as both `read` and `read_write` in one bind group is a
    /// wgpu usage-scope violation, not just a WGSL-level aliasing concern.
    fn rmsnorm(&self, ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, out: &GpuBuf, x: &GpuBuf, weight: &GpuBuf, size: u32, weight_offset: u32) {
        let ss = reduce_sum_of_squares(ctx, pm, pool, x, size);

        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            size: u32,
            weight_offset: u32,
        }
        let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { size, weight_offset }));

        if std::sync::Arc::ptr_eq(out, x) {
            let entry = pm.get_or_create("rmsnorm_normalize_and_scale_inplace", shaders::RMSNORM_NORMALIZE_AND_SCALE, "main_inplace");
            dispatch(
                ctx,
                &entry,
                &[buf_entry(0, &ss), buf_entry(1, weight), buf_entry(2, x), buf_entry(3, &uniform)],
                (workgroups_for(size, 64), 1, 1),
            );
        } else {
            let entry = pm.get_or_create("rmsnorm_normalize_and_scale", shaders::RMSNORM_NORMALIZE_AND_SCALE, "main");
            dispatch(
                ctx,
                &entry,
                &[buf_entry(0, &ss), buf_entry(1, weight), buf_entry(2, x), buf_entry(3, out), buf_entry(4, &uniform)],
                (workgroups_for(size, 64), 1, 1),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn matmul(&self, ctx: &GpuContext, pm: &mut PipelineManager, xout: &GpuBuf, x: &GpuBuf, w: &GpuBuf, n: u32, d: u32, x_offset: u32, w_offset: u32) {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            n: u32,
            x_offset: u32,
            w_offset: u32,
            d: u32,
        }
        let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { n, x_offset, w_offset, d }));
        let entry = pm.get_or_create("matmul", shaders::MATMUL, "main");
        dispatch(
            ctx,
            &entry,
            &[buf_entry(0, xout), buf_entry(1, x), buf_entry(2, w), buf_entry(3, &uniform)],
            (workgroups_for(d, 64), 1, 1),
        );
    }

    fn accum(&self, ctx: &GpuContext, pm: &mut PipelineManager, a: &GpuBuf, b: &GpuBuf, n: u32) {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            n: u32,
            _pad: [u32; 3],
        }
        let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { n, _pad: [0; 3] }));
        let entry = pm.get_or_create("accum", shaders::ACCUM, "main");
        dispatch(ctx, &entry, &[buf_entry(0, a), buf_entry(1, b), buf_entry(2, &uniform)], (workgroups_for(n, 64), 1, 1));
    }

    /// Rotates `q` and `k` in place. Q and K are bound to distinct slots (2
    /// and 3) -- the source's single-slot aliasing bug is the one thing
    /// this dispatch must not reproduce.
    fn apply_rope(&self, ctx: &GpuContext, pm: &mut PipelineManager, pos: u32) {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            pos: u32,
            dim: u32,
            freq_cis_idx_delta: u32,
            head_size: u32,
        }
        let head_size = self.config.head_size() as u32;
        let freq_cis_idx_delta = pos * (head_size / 2);
        let dim = self.config.dim as u32;
        let uniform = create_uniform(
            ctx,
            bytemuck::bytes_of(&Params {
                pos,
                dim,
                freq_cis_idx_delta,
                head_size,
            }),
        );
        let entry = pm.get_or_create("positional_encoding", shaders::POSITIONAL_ENCODING, "main");
        dispatch(
            ctx,
            &entry,
            &[
                buf_entry(0, &self.weights.freq_cis_real),
                buf_entry(1, &self.weights.freq_cis_imag),
                buf_entry(2, &self.state.q),
                buf_entry(3, &self.state.k),
                buf_entry(4, &uniform),
            ],
            (workgroups_for(dim / 2, 64), 1, 1),
        );
    }

    fn write_kv_cache(&self, ctx: &GpuContext, layer: usize, pos: u32) {
        let dim = self.config.dim as u64;
        let seq_len = self.config.seq_len as u64;
        let layer_off = layer as u64 * seq_len * dim;
        let dst_off = (layer_off + pos as u64 * dim) * 4;
        let len = dim * 4;

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(&self.state.k, 0, &self.state.key_cache, dst_off, len);
        encoder.copy_buffer_to_buffer(&self.state.v, 0, &self.state.value_cache, dst_off, len);
        ctx.queue.submit(Some(encoder.finish()));
    }

    fn attention_scores(&self, ctx: &GpuContext, pm: &mut PipelineManager, layer: u32, pos: u32) {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            seq_len: u32,
            pos: u32,
            head_size: u32,
            dim: u32,
            layer_idx: u32,
            n_heads: u32,
            _pad: [u32; 2],
        }
        let n_heads = self.config.n_heads as u32;
        let uniform = create_uniform(
            ctx,
            bytemuck::bytes_of(&Params {
                seq_len: self.config.seq_len as u32,
                pos,
                head_size: self.config.head_size() as u32,
                dim: self.config.dim as u32,
                layer_idx: layer,
                n_heads,
                _pad: [0; 2],
            }),
        );
        let entry = pm.get_or_create("transformer_get_query_vector", shaders::TRANSFORMER_GET_QUERY_VECTOR, "main");
        dispatch(
            ctx,
            &entry,
            &[buf_entry(0, &self.state.q), buf_entry(1, &self.state.key_cache), buf_entry(2, &self.state.att), buf_entry(3, &uniform)],
            (workgroups_for(n_heads, 8), workgroups_for(pos + 1, 8), 1),
        );
    }

    fn softmax_attention(&self, ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, pos: u32) {
        let n_heads = self.config.n_heads as u32;
        let seq_len = self.config.seq_len as u32;
        let width = pos + 1;

        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct RepackParams {
            seq_len: u32,
            pos: u32,
            n_heads: u32,
            _pad: u32,
        }
        let params = RepackParams { seq_len, pos, n_heads, _pad: 0 };

        let packed = pool.acquire((n_heads * width) as u64 * 4, STORAGE);
        let in_uniform = create_uniform(ctx, bytemuck::bytes_of(&params));
        let in_entry = pm.get_or_create("transformer_softmax_input", shaders::TRANSFORMER_SOFTMAX_INPUT, "main");
        dispatch(
            ctx,
            &in_entry,
            &[buf_entry(0, &self.state.att), buf_entry(1, &packed), buf_entry(2, &in_uniform)],
            (workgroups_for(n_heads, 8), workgroups_for(width, 8), 1),
        );

        softmax_inplace(ctx, pm, pool, &packed, n_heads, width);

        let out_uniform = create_uniform(ctx, bytemuck::bytes_of(&params));
        let out_entry = pm.get_or_create("transformer_softmax_output", shaders::TRANSFORMER_SOFTMAX_OUTPUT, "main");
        dispatch(
            ctx,
            &out_entry,
            &[buf_entry(0, &packed), buf_entry(1, &self.state.att), buf_entry(2, &out_uniform)],
            (workgroups_for(n_heads, 8), workgroups_for(width, 8), 1),
        );
    }

    fn attention_weighted_values(&self, ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, layer: u32, pos: u32) -> GpuBuf {
        let n_heads = self.config.n_heads as u32;
        let head_size = self.config.head_size() as u32;
        let width = pos + 1;

        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            seq_len: u32,
            pos: u32,
            head_size: u32,
            dim: u32,
            layer_idx: u32,
            n_heads: u32,
            _pad: [u32; 2],
        }
        let uniform = create_uniform(
            ctx,
            bytemuck::bytes_of(&Params {
                seq_len: self.config.seq_len as u32,
                pos,
                head_size,
                dim: self.config.dim as u32,
                layer_idx: layer,
                n_heads,
                _pad: [0; 2],
            }),
        );

        let att_mat = pool.acquire((n_heads * head_size * width) as u64 * 4, STORAGE);
        let entry = pm.get_or_create("transformer_build_att_mat", shaders::TRANSFORMER_BUILD_ATT_MAT, "main");
        dispatch(
            ctx,
            &entry,
            &[
                buf_entry(0, &self.state.value_cache),
                buf_entry(1, &self.state.att),
                buf_entry(2, &att_mat),
                buf_entry(3, &uniform),
            ],
            (workgroups_for(n_heads, 4), workgroups_for(head_size, 4), workgroups_for(width, 4)),
        );

        // Sum-reduce along the contiguous time axis: rows = n_heads*head_size.
        reduce_sum(ctx, pm, pool, &att_mat, n_heads * head_size, width)
    }

    /// Runs one full forward step for `token` at `pos`, leaving the result
    /// in `state.logits`.
    pub fn step(&mut self, ctx: &GpuContext, pm: &mut PipelineManager, pool: &BufferPool, ckpt: &Checkpoint, token: u32, pos: u32) {
        let dim = self.config.dim as u32;
        let hidden_dim = self.config.hidden_dim as u32;
        let row = ckpt.embedding_row(token);
        ctx.queue.write_buffer(&self.state.x, 0, bytemuck::cast_slice(row));

        for l in 0..self.config.n_layers as u32 {
            let dim_dim = dim as u64 * dim as u64;
            let w_off_attn = (l as u64 * dim_dim) as u32;

            self.rmsnorm(ctx, pm, pool, &self.state.xb.clone(), &self.state.x, &self.weights.rms_att_weight, dim, l * dim);
            self.matmul(ctx, pm, &self.state.q.clone(), &self.state.xb, &self.weights.wq, dim, dim, 0, w_off_attn);
            self.matmul(ctx, pm, &self.state.k.clone(), &self.state.xb, &self.weights.wk, dim, dim, 0, w_off_attn);
            self.matmul(ctx, pm, &self.state.v.clone(), &self.state.xb, &self.weights.wv, dim, dim, 0, w_off_attn);

            self.apply_rope(ctx, pm, pos);
            self.write_kv_cache(ctx, l as usize, pos);

            self.attention_scores(ctx, pm, l, pos);
            self.softmax_attention(ctx, pm, pool, pos);
            let xb = self.attention_weighted_values(ctx, pm, pool, l, pos);
            self.state.xb = xb;

            self.matmul(ctx, pm, &self.state.xb2.clone(), &self.state.xb, &self.weights.wo, dim, dim, 0, w_off_attn);
            self.accum(ctx, pm, &self.state.x.clone(), &self.state.xb2, dim);

            let w_off_ffn1 = (l as u64 * dim as u64 * hidden_dim as u64) as u32;
            self.rmsnorm(ctx, pm, pool, &self.state.xb.clone(), &self.state.x, &self.weights.rms_ffn_weight, dim, l * dim);
            self.matmul(ctx, pm, &self.state.hb.clone(), &self.state.xb, &self.weights.w1, dim, hidden_dim, 0, w_off_ffn1);
            self.matmul(ctx, pm, &self.state.hb2.clone(), &self.state.xb, &self.weights.w3, dim, hidden_dim, 0, w_off_ffn1);

            self.silu_and_mul(ctx, pm, hidden_dim);

            self.matmul(ctx, pm, &self.state.xb.clone(), &self.state.hb, &self.weights.w2, hidden_dim, dim, 0, w_off_ffn1);
            self.accum(ctx, pm, &self.state.x.clone(), &self.state.xb, dim);
        }

        self.rmsnorm(ctx, pm, pool, &self.state.x.clone(), &self.state.x, &self.weights.rms_final_weight, dim, 0);
        self.matmul(
            ctx,
            pm,
            &self.state.logits.clone(),
            &self.state.x,
            &self.weights.wcls,
            dim,
            self.config.vocab_size as u32,
            0,
            0,
        );
    }

    /// `hb[i] = (hb[i] * sigma(hb[i])) * hb2[i]`, the two inputs bound at
    /// distinct slots (0 and 1) -- the source aliases both to slot 0.
    fn silu_and_mul(&self, ctx: &GpuContext, pm: &mut PipelineManager, n: u32) {
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Params {
            n: u32,
            _pad: [u32; 3],
        }
        let uniform = create_uniform(ctx, bytemuck::bytes_of(&Params { n, _pad: [0; 3] }));
        let entry = pm.get_or_create("silu_and_mul_w3", shaders::SILU_AND_MUL_W3, "main");
        dispatch(
            ctx,
            &entry,
            &[buf_entry(0, &self.state.hb), buf_entry(1, &self.state.hb2), buf_entry(2, &uniform)],
            (workgroups_for(n, 64), 1, 1),
        );
    }
}
