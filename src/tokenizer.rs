//! BPE vocabulary parsing and the greedy-merge encoder (§4.7, §8).
//!
//! Pieces are kept as raw bytes rather than `String`: the vocabulary may
//! contain byte sequences that are not valid UTF-8 on their own (they only
//! compose into valid UTF-8 once merged), so `str_lookup`-style byte-exact
//! matching is what the algorithm actually needs.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Read;

use crate::error::{EngineError, Result};

pub const BOS_TOKEN: u32 = 1;

pub struct Tokenizer {
    pieces: Vec<Vec<u8>>,
    scores: Vec<f32>,
    piece_to_id: HashMap<Vec<u8>, u32>,
    #[allow(dead_code)]
    max_token_length: u32,
}

impl Tokenizer {
    pub fn read_from<R: Read>(mut r: R, vocab_size: usize) -> Result<Self> {
        let max_token_length = r.read_i32::<LittleEndian>()? as u32;

        let mut pieces = Vec::with_capacity(vocab_size);
        let mut scores = Vec::with_capacity(vocab_size);
        let mut piece_to_id = HashMap::with_capacity(vocab_size);

        for id in 0..vocab_size {
            let score = r.read_f32::<LittleEndian>()?;
            let len = r.read_i32::<LittleEndian>()?;
            if len < 0 {
                return Err(EngineError::Tokenizer(format!(
                    "negative piece length at token {id}"
                )));
            }
            let mut bytes = vec![0u8; len as usize];
            r.read_exact(&mut bytes)?;

            piece_to_id.insert(bytes.clone(), id as u32);
            pieces.push(bytes);
            scores.push(score);
        }

        tracing::debug!(vocab_size, max_token_length, "tokenizer vocabulary loaded");

        Ok(Self {
            pieces,
            scores,
            piece_to_id,
            max_token_length,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    /// Greedy-merge BPE encode: every input byte must already exist as a
    /// single-byte vocabulary entry (§4.7); no fallback/UNK handling.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let bytes = text.as_bytes();
        let mut tokens: Vec<u32> = Vec::with_capacity(bytes.len());

        for &b in bytes {
            let key = [b];
            match self.piece_to_id.get(key.as_slice()) {
                Some(&id) => tokens.push(id),
                None => {
                    return Err(EngineError::Tokenizer(format!(
                        "byte {b:#04x} has no single-byte vocabulary entry"
                    )))
                }
            }
        }

        loop {
            let mut best_score = f32::NEG_INFINITY;
            let mut best_id: Option<u32> = None;
            let mut best_idx: Option<usize> = None;

            for i in 0..tokens.len().saturating_sub(1) {
                let mut merged = self.pieces[tokens[i] as usize].clone();
                merged.extend_from_slice(&self.pieces[tokens[i + 1] as usize]);
                if let Some(&id) = self.piece_to_id.get(&merged) {
                    let score = self.scores[id as usize];
                    if score > best_score {
                        best_score = score;
                        best_id = Some(id);
                        best_idx = Some(i);
                    }
                }
            }

            let (Some(id), Some(idx)) = (best_id, best_idx) else {
                break;
            };

            tokens[idx] = id;
            tokens.remove(idx + 1);
        }

        Ok(tokens)
    }

    /// Decode one token to its raw piece bytes, applying the SentencePiece
    /// convention of stripping a single leading space right after BOS.
    pub fn decode<'a>(&'a self, prev_token: u32, token: u32) -> &'a [u8] {
        let piece = self.pieces[token as usize].as_slice();
        if prev_token == BOS_TOKEN && piece.first() == Some(&b' ') {
            &piece[1..]
        } else {
            piece
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_vocab(pieces: &[(&str, f32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&16i32.to_le_bytes()); // max_token_length
        for (piece, score) in pieces {
            buf.extend_from_slice(&score.to_le_bytes());
            buf.extend_from_slice(&(piece.len() as i32).to_le_bytes());
            buf.extend_from_slice(piece.as_bytes());
        }
        buf
    }

    fn byte_vocab() -> Vec<(&'static str, f32)> {
        // A handful of single bytes plus a couple of merges, in ascending
        // merge-priority order the way a real sentencepiece vocab would be.
        vec![
            ("\0", -1.0),
            ("h", -1.0),
            ("e", -1.0),
            ("l", -1.0),
            ("o", -1.0),
            (" ", -1.0),
            ("w", -1.0),
            ("r", -1.0),
            ("d", -1.0),
            ("he", 1.0),
            ("ll", 2.0),
            ("hell", 3.0),
            ("hello", 4.0),
            ("wor", 1.5),
            ("world", 2.5),
        ]
    }

    #[test]
    fn round_trips_via_lookup_concatenate() {
        let vocab = byte_vocab();
        let raw = build_vocab(&vocab);
        let tok = Tokenizer::read_from(&raw[..], vocab.len()).unwrap();

        let ids = tok.encode("hello world").unwrap();
        let mut out = Vec::new();
        let mut prev = BOS_TOKEN;
        for &id in &ids {
            out.extend_from_slice(tok.decode(prev, id));
            prev = id;
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn merges_highest_scoring_pair_first() {
        let vocab = byte_vocab();
        let raw = build_vocab(&vocab);
        let tok = Tokenizer::read_from(&raw[..], vocab.len()).unwrap();

        let ids = tok.encode("hello").unwrap();
        // Expect exactly one token: the fully-merged "hello" piece.
        assert_eq!(ids.len(), 1);
        assert_eq!(tok.decode(0, ids[0]), b"hello");
    }

    #[test]
    fn rejects_byte_outside_vocabulary() {
        let vocab = vec![("a", -1.0_f32)];
        let raw = build_vocab(&vocab);
        let tok = Tokenizer::read_from(&raw[..], vocab.len()).unwrap();
        assert!(tok.encode("b").is_err());
    }

    #[test]
    fn strips_leading_space_after_bos() {
        let vocab = byte_vocab();
        let raw = build_vocab(&vocab);
        let tok = Tokenizer::read_from(&raw[..], vocab.len()).unwrap();
        let space_id = vocab.iter().position(|(p, _)| *p == " ").unwrap() as u32;
        assert_eq!(tok.decode(BOS_TOKEN, space_id), b"");
        assert_eq!(tok.decode(0, space_id), b" ");
    }
}
