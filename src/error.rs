//! Error types for the interactive controller.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The engine failed to evaluate a batch. Never retried.
    #[error("failed to eval: {0}")]
    Eval(anyhow::Error),

    #[error("prompt is too long ({n_tokens} tokens, max {max})")]
    PromptTooLong { n_tokens: usize, max: usize },

    #[error("failed to load session file {path:?}: {reason}")]
    SessionLoad { path: PathBuf, reason: anyhow::Error },

    #[error("invalid session file: {0}")]
    SessionFormat(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("malformed prompt file: {0}")]
    PromptFile(String),

    #[error("controller is not waiting for user input")]
    NotAwaitingInput,

    #[error("engine returned no logits to sample from")]
    EmptyLogits,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("readline error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

pub type Result<T> = std::result::Result<T, Error>;
