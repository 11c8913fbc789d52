mod parse;
mod preprocess;
mod session;

pub use parse::*;
pub use preprocess::*;
pub use session::*;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::tokens::Token;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Additive bias per token id, applied to the raw logits.
    pub logit_bias: HashMap<Token, f32>,
    /// `<= 0` means the whole vocabulary.
    pub top_k: i32,
    pub top_p: f32,
    pub tfs_z: f32,
    pub typical_p: f32,
    /// `<= 0` selects greedy decoding.
    pub temp: f32,
    pub repeat_penalty: f32,
    /// `< 0` means the whole context.
    pub repeat_last_n: i32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// 0 disables, 1 and 2 pick the mirostat variant.
    pub mirostat: u8,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub penalize_nl: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            logit_bias: HashMap::new(),
            top_k: 40,
            top_p: 0.95,
            tfs_z: 1.0,
            typical_p: 1.0,
            temp: 0.8,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            penalize_nl: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Negative picks a random seed.
    pub seed: i64,
    pub n_threads: usize,
    /// Tokens to generate per run, `-1` for no limit.
    pub n_predict: i32,
    pub n_ctx: usize,
    pub n_batch: usize,
    /// Prompt tokens kept across a context swap; negative keeps the whole prompt.
    pub n_keep: i32,
    pub sampling: SamplingParams,

    pub prompt: String,
    /// Empty disables session files.
    pub path_session: String,
    pub input_prefix: String,
    pub antiprompt: Vec<String>,
    pub interactive: bool,
    pub interactive_first: bool,
    pub instruct: bool,
    pub use_color: bool,
    pub verbose_prompt: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            seed: -1,
            n_threads: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(4),
            n_predict: 80,
            n_ctx: 2048,
            n_batch: 512,
            n_keep: 0,
            sampling: SamplingParams::default(),
            prompt: "This is a test prompt.".to_string(),
            path_session: String::new(),
            input_prefix: String::new(),
            antiprompt: Vec::new(),
            interactive: false,
            interactive_first: false,
            instruct: false,
            use_color: false,
            verbose_prompt: false,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if self.n_ctx == 0 {
            return Err(Error::InvalidParams("n_ctx must be positive".to_string()));
        }
        if self.n_batch == 0 {
            return Err(Error::InvalidParams("n_batch must be positive".to_string()));
        }
        if self.sampling.mirostat > 2 {
            return Err(Error::InvalidParams(format!(
                "unknown mirostat mode {}, expected 0, 1 or 2",
                self.sampling.mirostat
            )));
        }
        Ok(())
    }

    pub fn session_path(&self) -> Option<PathBuf> {
        (!self.path_session.is_empty()).then(|| PathBuf::from(&self.path_session))
    }

    /// Resolves the configured seed, drawing a random one when negative.
    pub fn resolve_seed(&self) -> u64 {
        if self.seed < 0 {
            rand::random::<u64>() % (1 << 32)
        } else {
            self.seed as u64
        }
    }
}
