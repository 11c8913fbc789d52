//! The boundary to the inference engine.
//!
//! The controller only needs tokenization, batched evaluation against a
//! position, the logits of the last evaluated position and a handful of
//! vocabulary facts. Engines report failures as [`anyhow::Error`]; the
//! controller wraps them in its own error type.

use std::path::Path;

use crate::tokens::Token;

mod byte;

pub use byte::ByteEngine;

pub trait Engine {
    /// Converts text to tokens, optionally prefixed with the beginning of
    /// sequence token.
    fn tokenize(&self, text: &str, add_bos: bool) -> Vec<Token>;

    /// Evaluates `tokens` at positions `n_past..n_past + tokens.len()`,
    /// discarding any state beyond `n_past`.
    fn eval(&mut self, tokens: &[Token], n_past: usize, n_threads: usize) -> anyhow::Result<()>;

    /// Logits for the position after the last evaluated token, one per
    /// vocabulary entry.
    fn logits(&self) -> &[f32];

    fn n_vocab(&self) -> usize;

    fn n_ctx(&self) -> usize;

    fn token_bos(&self) -> Token;

    fn token_eos(&self) -> Token;

    fn token_nl(&self) -> Token;

    /// Raw bytes of a token. A token may carry only part of a multi-byte
    /// character, so callers join bytes before decoding.
    fn token_to_bytes(&self, token: Token) -> Vec<u8>;

    /// Restores a saved session, returning its tokens. `Ok(None)` means there
    /// is nothing to restore yet.
    fn load_session(&mut self, path: &Path, capacity: usize) -> anyhow::Result<Option<Vec<Token>>>;

    fn save_session(&mut self, path: &Path, tokens: &[Token]) -> anyhow::Result<()>;
}
