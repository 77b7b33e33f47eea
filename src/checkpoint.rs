//! Memory-mapped checkpoint parsing (§3, §6). Weight tensors are read
//! directly out of the mapped file in the fixed order the format defines;
//! only `token_embedding_table` stays host-resident past upload (cheap
//! per-token row lookup at embedding time), everything else is uploaded to
//! GPU storage buffers once during initialization.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use crate::config::Config;
use crate::error::{EngineError, Result};

pub struct Checkpoint {
    mmap: Mmap,
    pub config: Config,
    embedding_offset: usize,
    rest_offset: usize,
}

impl Checkpoint {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the file is opened read-only and is never truncated or
        // mutated for the lifetime of this process; inference only reads.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < Config::HEADER_BYTES {
            return Err(EngineError::Checkpoint("file shorter than the header".into()));
        }
        let config = Config::read_from(&mmap[..Config::HEADER_BYTES])?;

        let embedding_offset = Config::HEADER_BYTES;
        let embedding_bytes = config.vocab_size * config.dim * 4;
        let rest_offset = embedding_offset + embedding_bytes;
        if mmap.len() < rest_offset {
            return Err(EngineError::Checkpoint(
                "file too short for the token embedding table".into(),
            ));
        }

        tracing::info!(
            dim = config.dim,
            n_layers = config.n_layers,
            n_heads = config.n_heads,
            vocab_size = config.vocab_size,
            seq_len = config.seq_len,
            "checkpoint header parsed"
        );

        Ok(Self {
            mmap,
            config,
            embedding_offset,
            rest_offset,
        })
    }

    fn f32_slice(&self, byte_offset: usize, len_elems: usize) -> Result<&[f32]> {
        let end = byte_offset + len_elems * 4;
        if end > self.mmap.len() {
            return Err(EngineError::Checkpoint("tensor extends past end of file".into()));
        }
        let bytes = &self.mmap[byte_offset..end];
        Ok(bytemuck::cast_slice(bytes))
    }

    /// Row `token` of the embedding table, `dim` floats wide.
    pub fn embedding_row(&self, token: u32) -> &[f32] {
        let dim = self.config.dim;
        let off = self.embedding_offset + token as usize * dim * 4;
        bytemuck::cast_slice(&self.mmap[off..off + dim * 4])
    }

    /// Walks every weight tensor after the embedding table, in file order,
    /// invoking `visit` with each tensor's flat contents. Returns the next
    /// tensor to read so `wcls` (present only when `!shared_weights`) can be
    /// read conditionally by the caller.
    pub fn read_layer_tensors(&self, visit: &mut dyn FnMut(&str, &[f32]) -> Result<()>) -> Result<usize> {
        let cfg = &self.config;
        let mut offset = self.rest_offset;

        let mut next = |name: &'static str, len: usize, visit: &mut dyn FnMut(&str, &[f32]) -> Result<()>| -> Result<()> {
            let slice = self.f32_slice(offset, len)?;
            visit(name, slice)?;
            offset += len * 4;
            Ok(())
        };

        next("rms_att_weight", cfg.n_layers * cfg.dim, visit)?;
        next("wq", cfg.n_layers * cfg.dim * cfg.dim, visit)?;
        next("wk", cfg.n_layers * cfg.dim * cfg.dim, visit)?;
        next("wv", cfg.n_layers * cfg.dim * cfg.dim, visit)?;
        next("wo", cfg.n_layers * cfg.dim * cfg.dim, visit)?;
        next("rms_ffn_weight", cfg.n_layers * cfg.dim, visit)?;
        next("w1", cfg.n_layers * cfg.hidden_dim * cfg.dim, visit)?;
        next("w3", cfg.n_layers * cfg.hidden_dim * cfg.dim, visit)?;
        next("w2", cfg.n_layers * cfg.dim * cfg.hidden_dim, visit)?;
        next("rms_final_weight", cfg.dim, visit)?;
        next("freq_cis_real", cfg.seq_len * cfg.head_size() / 2, visit)?;
        next("freq_cis_imag", cfg.seq_len * cfg.head_size() / 2, visit)?;

        tracing::debug!(bytes_read = offset - self.rest_offset, "layer tensors read from checkpoint");
        Ok(offset)
    }

    pub fn read_wcls(&self, offset: usize) -> Result<&[f32]> {
        self.f32_slice(offset, self.config.vocab_size * self.config.dim)
    }
}
