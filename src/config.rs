use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::error::{EngineError, Result};

/// The seven-int32 header that precedes every weight tensor in a checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub vocab_size: usize,
    pub seq_len: usize,
    /// `false` when the file's `vocab_size` header field was negative,
    /// meaning the classifier weights (`wcls`) are not tied to the
    /// token embedding table.
    pub shared_weights: bool,
}

impl Config {
    /// Head dimension; `dim` is guaranteed divisible by `n_heads`.
    pub fn head_size(&self) -> usize {
        self.dim / self.n_heads
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let dim = r.read_i32::<LittleEndian>()?;
        let hidden_dim = r.read_i32::<LittleEndian>()?;
        let n_layers = r.read_i32::<LittleEndian>()?;
        let n_heads = r.read_i32::<LittleEndian>()?;
        let n_kv_heads = r.read_i32::<LittleEndian>()?;
        let vocab_size_raw = r.read_i32::<LittleEndian>()?;
        let seq_len = r.read_i32::<LittleEndian>()?;

        let shared_weights = vocab_size_raw > 0;
        let vocab_size = vocab_size_raw.unsigned_abs() as usize;

        if dim <= 0 || hidden_dim <= 0 || n_layers <= 0 || n_heads <= 0 || n_kv_heads <= 0 || seq_len <= 0 {
            return Err(EngineError::Checkpoint(
                "checkpoint header contains a non-positive dimension".into(),
            ));
        }
        let dim = dim as usize;
        let n_heads = n_heads as usize;
        let n_kv_heads = n_kv_heads as usize;

        if dim % n_heads != 0 {
            return Err(EngineError::Checkpoint(format!(
                "dim ({dim}) is not divisible by n_heads ({n_heads})"
            )));
        }
        if n_kv_heads != n_heads {
            // §9 open question, resolved: reject rather than silently
            // mis-size the KV cache for grouped-query attention.
            return Err(EngineError::Checkpoint(format!(
                "checkpoint advertises n_kv_heads ({n_kv_heads}) != n_heads ({n_heads}); \
                 grouped-query attention checkpoints are not supported"
            )));
        }

        Ok(Self {
            dim,
            hidden_dim: hidden_dim as usize,
            n_layers: n_layers as usize,
            n_heads,
            n_kv_heads,
            vocab_size,
            seq_len: seq_len as usize,
            shared_weights,
        })
    }

    pub const HEADER_BYTES: usize = 7 * 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(dim: i32, hidden: i32, layers: i32, heads: i32, kv_heads: i32, vocab: i32, seq: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in [dim, hidden, layers, heads, kv_heads, vocab, seq] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parses_shared_weights_when_vocab_positive() {
        let buf = header(288, 768, 6, 6, 6, 32000, 256);
        let cfg = Config::read_from(&buf[..]).unwrap();
        assert!(cfg.shared_weights);
        assert_eq!(cfg.vocab_size, 32000);
        assert_eq!(cfg.head_size(), 48);
    }

    #[test]
    fn negative_vocab_size_means_unshared() {
        let buf = header(288, 768, 6, 6, 6, -32000, 256);
        let cfg = Config::read_from(&buf[..]).unwrap();
        assert!(!cfg.shared_weights);
        assert_eq!(cfg.vocab_size, 32000);
    }

    #[test]
    fn rejects_indivisible_dim() {
        let buf = header(289, 768, 6, 6, 6, 32000, 256);
        assert!(Config::read_from(&buf[..]).is_err());
    }

    #[test]
    fn rejects_grouped_query_attention() {
        let buf = header(288, 768, 6, 6, 3, 32000, 256);
        assert!(Config::read_from(&buf[..]).is_err());
    }
}
