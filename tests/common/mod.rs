#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use anyhow::bail;
use llama_interactive::files::Params;
use llama_interactive::{Engine, Interrupt, Token};

pub const BOS: Token = 256;
pub const EOS: Token = 257;
const N_VOCAB: usize = 258;

/// Byte-vocabulary engine whose next token is fixed in advance: each eval
/// makes the next scripted token the only likely one.
#[derive(Debug)]
pub struct ScriptedEngine {
    pub n_ctx: usize,
    pub script: VecDeque<Token>,
    pub fallback: Token,
    pub evals: Vec<(Vec<Token>, usize)>,
    pub session: Option<Vec<Token>>,
    pub saved: Vec<Vec<Token>>,
    pub fail_eval: bool,
    /// Forces this interrupt once the given number of evals has run.
    pub force_after_evals: Rc<RefCell<Option<(usize, Interrupt)>>>,
    logits: Vec<f32>,
}

impl ScriptedEngine {
    pub fn new(n_ctx: usize) -> Self {
        Self {
            n_ctx,
            script: VecDeque::new(),
            fallback: Token::from(b'x'),
            evals: Vec::new(),
            session: None,
            saved: Vec::new(),
            fail_eval: false,
            force_after_evals: Rc::default(),
            logits: vec![0.0; N_VOCAB],
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = Token>) -> Self {
        self.script = script.into_iter().collect();
        self
    }
}

impl Engine for ScriptedEngine {
    fn tokenize(&self, text: &str, add_bos: bool) -> Vec<Token> {
        let mut tokens = if add_bos { vec![BOS] } else { Vec::new() };
        tokens.extend(text.bytes().map(Token::from));
        tokens
    }

    fn eval(&mut self, tokens: &[Token], n_past: usize, _n_threads: usize) -> anyhow::Result<()> {
        self.evals.push((tokens.to_vec(), n_past));
        if let Some((n, interrupt)) = &*self.force_after_evals.borrow() {
            if self.evals.len() == *n {
                interrupt.force();
            }
        }
        if self.fail_eval {
            bail!("scripted failure");
        }
        if n_past + tokens.len() > self.n_ctx {
            bail!("context overflow: {n_past} + {}", tokens.len());
        }

        let next = self.script.pop_front().unwrap_or(self.fallback);
        self.logits.iter_mut().for_each(|l| *l = 0.0);
        self.logits[next as usize] = 10.0;
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

    fn load_session(&mut self, _path: &Path, _capacity: usize) -> anyhow::Result<Option<Vec<Token>>> {
        Ok(self.session.clone())
    }

    fn save_session(&mut self, _path: &Path, tokens: &[Token]) -> anyhow::Result<()> {
        self.saved.push(tokens.to_vec());
        Ok(())
    }
}

pub fn bytes(text: &str) -> Vec<Token> {
    text.bytes().map(Token::from).collect()
}

/// Greedy, fixed-seed parameters for reproducible runs.
pub fn params(prompt: &str) -> Params {
    let mut params = Params {
        prompt: prompt.to_string(),
        seed: 7,
        n_threads: 1,
        ..Params::default()
    };
    params.sampling.temp = 0.0;
    params
}
