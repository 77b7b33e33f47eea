//! GPU-resident weight tensors (§3). Uploaded once at load time into
//! immutable storage buffers; `token_embedding_table` is deliberately absent
//! here, it stays host-resident inside `Checkpoint`.

use crate::checkpoint::Checkpoint;
use crate::error::{EngineError, Result};
use crate::gpu::{BufferPool, GpuBuf};

pub struct Weights {
    pub rms_att_weight: GpuBuf,
    pub wq: GpuBuf,
    pub wk: GpuBuf,
    pub wv: GpuBuf,
    pub wo: GpuBuf,
    pub rms_ffn_weight: GpuBuf,
    pub w1: GpuBuf,
    pub w3: GpuBuf,
    pub w2: GpuBuf,
    pub rms_final_weight: GpuBuf,
    pub freq_cis_real: GpuBuf,
    pub freq_cis_imag: GpuBuf,
    /// Aliased to an uploaded copy of the embedding table when
    /// `shared_weights` is set; otherwise the checkpoint's own `wcls`.
    pub wcls: GpuBuf,
}

impl Weights {
    pub fn load(ckpt: &Checkpoint, queue: &wgpu::Queue, pool: &BufferPool) -> Result<Self> {
        let mut slots: [Option<GpuBuf>; 12] = Default::default();
        let names = [
            "rms_att_weight",
            "wq",
            "wk",
            "wv",
            "wo",
            "rms_ffn_weight",
            "w1",
            "w3",
            "w2",
            "rms_final_weight",
            "freq_cis_real",
            "freq_cis_imag",
        ];

        let mut idx = 0usize;
        let next_offset = ckpt.read_layer_tensors(&mut |name, data| {
            let expected = names.get(idx).copied().unwrap_or("");
            debug_assert_eq!(name, expected, "tensor order drifted from §3's fixed layout");
            slots[idx] = Some(pool.upload(queue, data));
            idx += 1;
            Ok(())
        })?;

        let mut take = |i: usize| -> Result<GpuBuf> {
            slots[i]
                .take()
                .ok_or_else(|| EngineError::Checkpoint("missing weight tensor".into()))
        };

        let rms_att_weight = take(0)?;
        let wq = take(1)?;
        let wk = take(2)?;
        let wv = take(3)?;
        let wo = take(4)?;
        let rms_ffn_weight = take(5)?;
        let w1 = take(6)?;
        let w3 = take(7)?;
        let w2 = take(8)?;
        let rms_final_weight = take(9)?;
        let freq_cis_real = take(10)?;
        let freq_cis_imag = take(11)?;

        let wcls = if ckpt.config.shared_weights {
            let dim = ckpt.config.dim;
            let vocab = ckpt.config.vocab_size;
            let mut rows = Vec::with_capacity(vocab * dim);
            for t in 0..vocab as u32 {
                rows.extend_from_slice(ckpt.embedding_row(t));
            }
            pool.upload(queue, &rows)
        } else {
            let data = ckpt.read_wcls(next_offset)?;
            pool.upload(queue, data)
        };

        tracing::info!(shared_weights = ckpt.config.shared_weights, "weights uploaded to GPU");

        Ok(Self {
            rms_att_weight,
            wq,
            wk,
            wv,
            wo,
            rms_ffn_weight,
            w1,
            w3,
            w2,
            rms_final_weight,
            freq_cis_real,
            freq_cis_imag,
            wcls,
        })
    }
}
