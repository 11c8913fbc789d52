use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use crate::files::Params;

/// Interactive text generation with a llama-style model
#[derive(Debug, Default, Parser)]
#[command(name = "llama-interactive", version, about)]
pub struct App {
    /// Prompt file (with optional <|CONFIG|> block) or YAML configuration
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Initial prompt
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Tokens to generate per run, -1 for no limit
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub n_predict: Option<i32>,

    /// Context size in tokens
    #[arg(short = 'c', long)]
    pub ctx_size: Option<usize>,

    /// Tokens evaluated per engine call
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Prompt tokens kept on context swap, -1 for the whole prompt
    #[arg(long, allow_negative_numbers = true)]
    pub keep: Option<i32>,

    #[arg(long)]
    pub temp: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub top_k: Option<i32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub repeat_last_n: Option<i32>,

    /// Mirostat mode: 0 disabled, 1 or 2
    #[arg(long)]
    pub mirostat: Option<u8>,

    /// RNG seed, negative for random
    #[arg(short, long, allow_negative_numbers = true)]
    pub seed: Option<i64>,

    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Pause for user input on reverse prompts and after each budget
    #[arg(short, long)]
    pub interactive: bool,

    /// Wait for user input before generating
    #[arg(long)]
    pub interactive_first: bool,

    /// Instruction/response chat framing
    #[arg(long)]
    pub instruct: bool,

    /// Stop generating and wait for input when this text is produced
    #[arg(short = 'r', long = "reverse-prompt")]
    pub reverse_prompt: Vec<String>,

    /// Text prepended to every user turn
    #[arg(long)]
    pub in_prefix: Option<String>,

    /// Session file caching the evaluated prompt
    #[arg(long)]
    pub session: Option<String>,

    /// Colorize prompt and user input
    #[arg(long)]
    pub color: bool,

    /// Print each prompt token before generating
    #[arg(long)]
    pub verbose_prompt: bool,

    /// Verbosity level (use -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl App {
    /// Initialize tracing on stderr, from `RUST_LOG` or the verbosity flag.
    pub fn init_tracing(&self) {
        let verbose = if self.verbose_prompt { self.verbose.max(1) } else { self.verbose };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = match verbose {
                0 => "warn",
                1 => "llama_interactive=info",
                2 => "llama_interactive=debug",
                _ => "trace",
            };
            EnvFilter::new(directive)
        });

        fmt()
            .without_time()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(verbose > 1)
            .init();
    }

    /// Defaults, then the configuration file, then command-line flags.
    pub fn params(&self) -> crate::Result<Params> {
        let mut params = match &self.file {
            Some(file) => Params::load(file)?,
            None => Params::default(),
        };

        if let Some(prompt) = &self.prompt {
            params.prompt = prompt.clone();
        }
        if let Some(n) = self.n_predict {
            params.n_predict = n;
        }
        if let Some(n) = self.ctx_size {
            params.n_ctx = n;
        }
        if let Some(n) = self.batch_size {
            params.n_batch = n;
        }
        if let Some(n) = self.keep {
            params.n_keep = n;
        }
        if let Some(n) = self.threads {
            params.n_threads = n;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }

        let sampling = &mut params.sampling;
        if let Some(temp) = self.temp {
            sampling.temp = temp;
        }
        if let Some(k) = self.top_k {
            sampling.top_k = k;
        }
        if let Some(p) = self.top_p {
            sampling.top_p = p;
        }
        if let Some(penalty) = self.repeat_penalty {
            sampling.repeat_penalty = penalty;
        }
        if let Some(n) = self.repeat_last_n {
            sampling.repeat_last_n = n;
        }
        if let Some(mode) = self.mirostat {
            sampling.mirostat = mode;
        }

        params.interactive |= self.interactive;
        params.interactive_first |= self.interactive_first;
        params.instruct |= self.instruct;
        params.use_color |= self.color;
        params.verbose_prompt |= self.verbose_prompt;
        params.antiprompt.extend(self.reverse_prompt.iter().cloned());
        if let Some(prefix) = &self.in_prefix {
            params.input_prefix = prefix.clone();
        }
        if let Some(session) = &self.session {
            params.path_session = session.clone();
        }

        params.validate()?;
        Ok(params)
    }
}
