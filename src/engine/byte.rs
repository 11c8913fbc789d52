use std::path::Path;

use anyhow::{bail, Context};

use super::Engine;
use crate::files::{read_session_file, write_session_file};
use crate::tokens::Token;

const BOS: Token = 256;
const EOS: Token = 257;
const N_VOCAB: usize = 258;

/// A model-free engine over a byte vocabulary.
///
/// Logits favour whatever byte most often followed the last evaluated token,
/// which is enough to make generation deterministic and repetitive. Useful
/// for exercising the controller without weights.
#[derive(Clone, Debug)]
pub struct ByteEngine {
    n_ctx: usize,
    state: Vec<Token>,
    logits: Vec<f32>,
}

impl ByteEngine {
    pub fn new(n_ctx: usize) -> Self {
        Self {
            n_ctx,
            state: Vec::new(),
            logits: vec![0.0; N_VOCAB],
        }
    }

    /// Tokens currently held as evaluated context.
    pub fn state(&self) -> &[Token] {
        &self.state
    }

    fn refresh_logits(&mut self) {
        self.logits.iter_mut().for_each(|l| *l = 0.0);

        let Some(&last) = self.state.last() else {
            return;
        };

        for pair in self.state.windows(2) {
            if pair[0] == last {
                self.logits[pair[1] as usize] += 1.0;
            }
        }
        // Mild preference for printable text when nothing has been seen.
        for byte in b'a'..=b'z' {
            self.logits[byte as usize] += 0.01;
        }
    }
}

impl Engine for ByteEngine {
    fn tokenize(&self, text: &str, add_bos: bool) -> Vec<Token> {
        let bos = add_bos.then_some(BOS);
        bos.into_iter().chain(text.bytes().map(Token::from)).collect()
    }

    fn eval(&mut self, tokens: &[Token], n_past: usize, _n_threads: usize) -> anyhow::Result<()> {
        if n_past > self.state.len() {
            bail!("n_past {n_past} is beyond the {} evaluated tokens", self.state.len());
        }
        if n_past + tokens.len() > self.n_ctx {
            bail!(
                "evaluating {} tokens at {n_past} overflows the context of {}",
                tokens.len(),
                self.n_ctx
            );
        }
        if let Some(bad) = tokens.iter().find(|&&t| t as usize >= N_VOCAB) {
            bail!("token {bad} is out of vocabulary");
        }

        self.state.truncate(n_past);
        self.state.extend_from_slice(tokens);
        self.refresh_logits();
        Ok(())
    }

    fn logits(&self) -> &[f32] {
        &self.logits
    }

    fn n_vocab(&self) -> usize {
        N_VOCAB
    }

    fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    fn token_bos(&self) -> Token {
        BOS
    }

    fn token_eos(&self) -> Token {
        EOS
    }

    fn token_nl(&self) -> Token {
        Token::from(b'\n')
    }

    fn token_to_bytes(&self, token: Token) -> Vec<u8> {
        u8::try_from(token).map(|byte| vec![byte]).unwrap_or_default()
    }

    fn load_session(&mut self, path: &Path, capacity: usize) -> anyhow::Result<Option<Vec<Token>>> {
        let tokens = read_session_file(path, capacity)
            .with_context(|| format!("reading session {}", path.display()))?;
        if let Some(tokens) = &tokens {
            self.state = tokens.clone();
            self.refresh_logits();
        }
        Ok(tokens)
    }

    fn save_session(&mut self, path: &Path, tokens: &[Token]) -> anyhow::Result<()> {
        write_session_file(path, tokens).with_context(|| format!("writing session {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_bytes() {
        let engine = ByteEngine::new(16);
        assert_eq!(engine.tokenize("ab", true), vec![BOS, 97, 98]);
        assert_eq!(engine.tokenize("ab", false), vec![97, 98]);
        assert_eq!(engine.token_to_bytes(97), b"a");
        assert_eq!(engine.token_to_bytes(0xe2), vec![0xe2]);
        assert!(engine.token_to_bytes(EOS).is_empty());
    }

    #[test]
    fn logits_follow_bigrams() {
        let mut engine = ByteEngine::new(16);
        let tokens = engine.tokenize("abac", false);
        engine.eval(&tokens, 0, 1).unwrap();
        // last token 'c' has never been followed by anything
        assert!(engine.logits()[b'b' as usize] < 0.5);

        engine.eval(&[b'a' as Token], 4, 1).unwrap();
        let logits = engine.logits();
        assert!(logits[b'b' as usize] >= 1.0);
        assert!(logits[b'c' as usize] >= 1.0);
        assert!(logits[b'd' as usize] < 0.5);
    }

    #[test]
    fn eval_rewinds_to_n_past() {
        let mut engine = ByteEngine::new(8);
        engine.eval(&[1, 2, 3, 4], 0, 1).unwrap();
        engine.eval(&[9], 2, 1).unwrap();
        assert_eq!(engine.state(), &[1, 2, 9]);
    }

    #[test]
    fn eval_rejects_overflow_and_gaps() {
        let mut engine = ByteEngine::new(4);
        assert!(engine.eval(&[1, 2, 3, 4, 5], 0, 1).is_err());
        assert!(engine.eval(&[1], 2, 1).is_err());
        assert!(engine.eval(&[300], 0, 1).is_err());
    }

    #[test]
    fn session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut engine = ByteEngine::new(16);
        assert_eq!(engine.load_session(&path, 16).unwrap(), None);

        engine.eval(&[BOS, 104, 105], 0, 1).unwrap();
        engine.save_session(&path, &[BOS, 104, 105]).unwrap();

        let mut restored = ByteEngine::new(16);
        assert_eq!(restored.load_session(&path, 16).unwrap(), Some(vec![BOS, 104, 105]));
        assert_eq!(restored.state(), &[BOS, 104, 105]);
        assert!(restored.load_session(&path, 2).is_err());
    }
}
