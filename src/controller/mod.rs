//! The interactive generation loop.
//!
//! A [`Controller`] owns every piece of per-session state and advances it one
//! cycle per [`Controller::step`]: evaluate what is pending, then either sample
//! a token or feed more queued input, echo, and decide whether to pause for
//! the user. Hosts drive it cooperatively and may deliver interrupts through
//! the shared [`Interrupt`] token at any time.

mod antiprompt;
mod cache;
mod context;
mod interrupt;
mod timings;

pub use antiprompt::Antiprompts;
pub use cache::{reuse_session_prefix, Similarity};
pub use context::{clamp_n_keep, ContextWindow};
pub use interrupt::{Interrupt, InterruptState};
pub use timings::Timings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::files::Params;
use crate::sampling::Sampler;
use crate::tokens::{InputSequence, PendingBatch, RecentHistory, SessionCache, Token};
use crate::ui::{read_user_text, ColorMode, InputSource, Line, Surface, Utf8Decoder};

const INSTRUCT_PREFIX: &str = "\n\n### Instruction:\n\n";
const INSTRUCT_SUFFIX: &str = "\n\n### Response:\n\n";
const INSTRUCT_ANTIPROMPT: &str = "### Instruction:\n\n";

const INTERACTIVE_BANNER: &str = "== Running in interactive mode. ==\n \
    - Press Ctrl+C to interject at any time.\n \
    - Press Return to return control to LLaMa.\n \
    - If you want to submit another line, end your input in '\\'.\n\n";

/// Result of one controller cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Waiting for [`Controller::submit_input`].
    AwaitingInput,
    Done(Outcome),
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The model produced end of sequence.
    EndOfText,
    /// The token budget ran out outside interactive mode.
    BudgetExhausted,
    /// The user closed the input stream.
    InputClosed,
    /// A forced interrupt halted generation.
    Interrupted,
}

/// Drives one generation session: feeds the prompt and user turns to the
/// engine, samples replies and echoes them to the display.
pub struct Controller<E: Engine, D: Surface> {
    engine: E,
    display: D,
    echo: Utf8Decoder,
    params: Params,
    sampler: Sampler,
    interrupt: Interrupt,
    antiprompts: Antiprompts,
    timings: Timings,

    n_ctx: usize,
    n_keep: usize,
    input: InputSequence,
    pending: PendingBatch,
    history: RecentHistory,
    session: SessionCache,
    path_session: Option<PathBuf>,
    inp_pfx: Vec<Token>,
    inp_sfx: Vec<Token>,

    n_past: usize,
    n_remain: i32,
    interactive: bool,
    is_antiprompt: bool,
    input_noecho: bool,
    need_to_save_session: bool,
    awaiting_input: bool,
    finished: Option<Outcome>,
}

/// Tokenizes the initial prompt the way the model expects it: a leading space
/// and a beginning-of-sequence token.
fn prepare_prompt(engine: &impl Engine, prompt: &str, n_ctx: usize) -> Result<Vec<Token>> {
    let tokens = engine.tokenize(&format!(" {prompt}"), true);
    let max = n_ctx.saturating_sub(4);
    if tokens.len() > max {
        return Err(Error::PromptTooLong {
            n_tokens: tokens.len(),
            max,
        });
    }
    Ok(tokens)
}

impl<E: Engine, D: Surface> Controller<E, D> {
    /// Loads the session, tokenizes the prompt and prepares the loop. Nothing
    /// is evaluated until the first [`step`](Self::step).
    pub fn new(mut params: Params, mut engine: E, mut display: D) -> Result<Self> {
        params.validate()?;
        let started = Instant::now();

        let n_ctx = engine.n_ctx();
        if n_ctx != params.n_ctx {
            warn!(requested = params.n_ctx, actual = n_ctx, "engine context size differs from configuration");
        }

        let path_session = params.session_path();
        let mut session = SessionCache::default();
        if let Some(path) = &path_session {
            info!(?path, "attempting to load saved session");
            match engine.load_session(path, n_ctx) {
                Ok(Some(tokens)) => {
                    info!(n_tokens = tokens.len(), "loaded a session");
                    session = SessionCache::new(tokens);
                }
                Ok(None) => info!("session file does not exist, will create"),
                Err(reason) => {
                    return Err(Error::SessionLoad {
                        path: path.clone(),
                        reason,
                    })
                }
            }
        }

        let prompt = prepare_prompt(&engine, &params.prompt, n_ctx)?;

        let mut n_matching = 0;
        if !session.is_empty() {
            n_matching = session.matching_prefix(&prompt);
            match Similarity::classify(n_matching, prompt.len()) {
                similarity @ Similarity::Low { .. } => warn!("{similarity}"),
                similarity => info!("{similarity}"),
            }
            // The restored logits belong to the end of the session, not the
            // prompt; re-evaluate the final prompt token to refresh them.
            if n_matching == prompt.len() && session.len() > prompt.len() {
                session.truncate(prompt.len().saturating_sub(1));
            }
        }
        let need_to_save_session = path_session.is_some() && n_matching < prompt.len() * 3 / 4;

        let n_keep = clamp_n_keep(params.n_keep, prompt.len(), params.instruct);
        if usize::try_from(params.n_keep).ok() != Some(n_keep) {
            debug!(requested = params.n_keep, n_keep, "n_keep clamped to prompt length");
        }

        let inp_pfx = engine.tokenize(INSTRUCT_PREFIX, true);
        let inp_sfx = engine.tokenize(INSTRUCT_SUFFIX, false);

        if params.instruct {
            params.interactive_first = true;
            params.antiprompt.push(INSTRUCT_ANTIPROMPT.to_string());
        }
        let interactive = params.interactive || params.interactive_first || !params.antiprompt.is_empty();

        if params.verbose_prompt {
            info!(prompt = %params.prompt, n_tokens = prompt.len(), "verbose prompt");
            for &token in &prompt {
                info!("{token:6} -> '{}'", String::from_utf8_lossy(&engine.token_to_bytes(token)));
            }
            if n_keep > 0 {
                let kept: Vec<u8> = prompt[..n_keep].iter().flat_map(|&t| engine.token_to_bytes(t)).collect();
                info!("static prompt based on n_keep: '{}'", String::from_utf8_lossy(&kept));
            }
        }

        let antiprompts = Antiprompts::new(params.antiprompt.clone());

        if interactive {
            display.append("interactive mode on.\n");
            for antiprompt in antiprompts.iter() {
                display.append(&format!("Reverse prompt: '{antiprompt}'\n"));
            }
            if !params.input_prefix.is_empty() {
                display.append(&format!("Input prefix: '{}'\n", params.input_prefix));
            }
        }

        let s = &params.sampling;
        info!(
            repeat_last_n = s.repeat_last_n,
            repeat_penalty = s.repeat_penalty,
            presence_penalty = s.presence_penalty,
            frequency_penalty = s.frequency_penalty,
            top_k = s.top_k,
            tfs_z = s.tfs_z,
            top_p = s.top_p,
            typical_p = s.typical_p,
            temp = s.temp,
            mirostat = s.mirostat,
            mirostat_eta = s.mirostat_eta,
            mirostat_tau = s.mirostat_tau,
            "sampling"
        );
        info!(n_ctx, n_batch = params.n_batch, n_predict = params.n_predict, n_keep, "generate");

        let interrupt = Interrupt::new();
        if interactive {
            display.append(INTERACTIVE_BANNER);
            if params.interactive_first {
                interrupt.arm();
            }
        }

        let seed = params.resolve_seed();
        info!(seed, "seeded sampler");

        display.set_mode(ColorMode::Prompt);

        let mut timings = Timings::new();
        timings.set_load(started.elapsed());

        Ok(Self {
            sampler: Sampler::new(seed),
            echo: Utf8Decoder::default(),
            interrupt,
            antiprompts,
            timings,
            n_ctx,
            n_keep,
            input: InputSequence::new(prompt),
            pending: PendingBatch::new(),
            history: RecentHistory::new(n_ctx),
            session,
            path_session,
            inp_pfx,
            inp_sfx,
            n_past: 0,
            n_remain: params.n_predict,
            interactive,
            is_antiprompt: false,
            input_noecho: false,
            need_to_save_session,
            awaiting_input: false,
            finished: None,
            engine,
            display,
            params,
        })
    }

    /// Runs one cycle of the loop.
    pub fn step(&mut self) -> Result<Step> {
        if let Some(outcome) = self.finished {
            return Ok(Step::Done(outcome));
        }

        match self.interrupt.state() {
            InterruptState::Forced => return Ok(self.finish(Outcome::Interrupted)),
            InterruptState::Armed if !self.interactive => return Ok(self.finish(Outcome::Interrupted)),
            _ => {}
        }

        if self.awaiting_input {
            return Ok(Step::AwaitingInput);
        }

        if !self.interactive && self.budget_exhausted() {
            return Ok(self.finish(Outcome::BudgetExhausted));
        }

        if !self.pending.is_empty() {
            if let Some(outcome) = self.evaluate_pending()? {
                return Ok(self.finish(outcome));
            }
        }
        self.pending.clear();

        if self.input.is_drained() && !self.is_interacting() {
            self.save_session_once();

            let started = Instant::now();
            let mut id = self.sampler.sample(
                self.engine.logits(),
                &mut self.history,
                &self.params.sampling,
                self.n_ctx,
                self.engine.token_nl(),
            )?;
            self.timings.record_sample(started.elapsed());

            if id == self.engine.token_eos() && self.interactive && !self.params.instruct {
                id = self.engine.token_nl();
                if let Some(first) = self.antiprompts.first() {
                    let injected = self.engine.tokenize(first, false);
                    self.input.extend(&injected);
                }
            }

            self.pending.push(id);
            self.input_noecho = false;
            if self.params.n_predict != -1 {
                self.n_remain -= 1;
            }
        } else {
            while self.pending.len() < self.params.n_batch {
                let Some(token) = self.input.next() else {
                    break;
                };
                self.pending.push(token);
                self.history.push(token);
            }
        }

        if !self.input_noecho {
            for &token in &self.pending {
                let text = self.echo.push(&self.engine.token_to_bytes(token));
                if !text.is_empty() {
                    self.display.append(&text);
                }
            }
            self.display.flush();
        }
        if !self.input_noecho && self.input.is_drained() {
            self.display.set_mode(ColorMode::Default);
        }

        if self.interactive && self.input.is_drained() {
            if !self.antiprompts.is_empty() {
                self.is_antiprompt = false;
                if self.antiprompts.match_suffix(&self.history_tail()).is_some() {
                    self.interrupt.arm();
                    self.is_antiprompt = true;
                    self.display.set_mode(ColorMode::UserInput);
                    self.display.flush();
                }
            }

            if self.n_past > 0 && self.is_interacting() {
                self.awaiting_input = true;
                return Ok(Step::AwaitingInput);
            }
            if self.n_past > 0 {
                self.interrupt.disarm();
            }
        }

        Ok(self.finish_cycle())
    }

    /// Resumes after [`Step::AwaitingInput`]. `None` means the input stream
    /// closed and ends the session.
    pub fn submit_input(&mut self, text: Option<String>) -> Result<Step> {
        if !self.awaiting_input {
            return Err(Error::NotAwaitingInput);
        }
        self.awaiting_input = false;

        let Some(text) = text else {
            return Ok(self.finish(Outcome::InputClosed));
        };

        let buffer = format!("{}{text}", self.params.input_prefix);
        self.display.set_mode(ColorMode::Default);
        self.append_user_text(&buffer);
        self.input_noecho = true;
        self.interrupt.disarm();

        Ok(self.finish_cycle())
    }

    /// Prompt shown when reading user text.
    pub fn input_prompt(&self) -> String {
        let marker = if self.params.instruct { "\n> " } else { "" };
        format!("{marker}{}", self.params.input_prefix)
    }

    /// Starts a fresh generation run with `text` as the next user turn and a
    /// full token budget.
    pub fn begin_run(&mut self, text: &str) {
        self.n_remain = self.params.n_predict;
        self.append_user_text(text);
        self.finished = None;
        self.awaiting_input = false;
        self.interrupt.disarm();
    }

    /// Replaces the initial prompt and restarts the conversation. The session
    /// cache is kept for matching only while a session path is active.
    pub fn replace_prompt(&mut self, prompt: &str) -> Result<()> {
        let tokens = prepare_prompt(&self.engine, prompt, self.n_ctx)?;

        self.params.prompt = prompt.to_string();
        self.n_keep = clamp_n_keep(self.params.n_keep, tokens.len(), self.params.instruct);
        self.input.reset(tokens);
        self.pending.clear();
        self.history.reset();
        self.echo = Utf8Decoder::default();
        self.n_past = 0;
        self.n_remain = self.params.n_predict;
        self.is_antiprompt = false;
        self.input_noecho = false;
        self.awaiting_input = false;
        self.finished = None;

        if self.path_session.is_some() {
            self.session.rewind();
        } else {
            self.session.clear();
        }

        self.interrupt.disarm();
        if self.params.interactive_first {
            self.interrupt.arm();
        }
        self.display.set_mode(ColorMode::Prompt);
        Ok(())
    }

    pub fn set_n_predict(&mut self, n_predict: i32) {
        self.params.n_predict = n_predict;
    }

    pub fn set_temperature(&mut self, temp: f32) {
        self.params.sampling.temp = temp;
    }

    /// Steps until the session ends, reading user text from `source` whenever
    /// the loop pauses for it.
    pub fn run(&mut self, source: &mut impl InputSource) -> Result<Outcome> {
        loop {
            match self.step()? {
                Step::Continue => {}
                Step::Done(outcome) => return Ok(outcome),
                Step::AwaitingInput => {
                    let text = match read_user_text(source, &self.input_prompt())? {
                        Line::Text(text) => Some(text),
                        Line::Eof => None,
                        Line::Interrupted => {
                            self.interrupt.signal();
                            continue;
                        }
                    };
                    if let Step::Done(outcome) = self.submit_input(text)? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn is_interacting(&self) -> bool {
        self.interrupt.is_armed()
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn is_antiprompt(&self) -> bool {
        self.is_antiprompt
    }

    pub fn input_noecho(&self) -> bool {
        self.input_noecho
    }

    pub fn need_to_save_session(&self) -> bool {
        self.need_to_save_session
    }

    pub fn n_past(&self) -> usize {
        self.n_past
    }

    pub fn n_remain(&self) -> i32 {
        self.n_remain
    }

    pub fn n_keep(&self) -> usize {
        self.n_keep
    }

    pub fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn input(&self) -> &InputSequence {
        &self.input
    }

    pub fn pending(&self) -> &[Token] {
        &self.pending
    }

    pub fn history(&self) -> &RecentHistory {
        &self.history
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    pub fn path_session(&self) -> Option<&Path> {
        self.path_session.as_deref()
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    fn budget_exhausted(&self) -> bool {
        self.params.n_predict != -1 && self.n_remain <= 0
    }

    fn finish(&mut self, outcome: Outcome) -> Step {
        debug!(?outcome, n_past = self.n_past, "run finished");
        self.finished = Some(outcome);
        self.flush_echo();
        self.display.set_mode(ColorMode::Default);
        self.display.flush();
        Step::Done(outcome)
    }

    /// Swaps context if needed, skips what the session already holds and
    /// evaluates the rest in batches. Returns an outcome only when a forced
    /// interrupt arrives between batches.
    fn evaluate_pending(&mut self) -> Result<Option<Outcome>> {
        let window = ContextWindow::new(self.n_ctx, self.n_keep);
        if window.would_overflow(self.n_past, self.pending.len()) {
            window.rebase(&mut self.n_past, &mut self.pending, &self.history);
            if self.path_session.take().is_some() {
                debug!("context swapped, session file will not be updated further");
            }
        }

        reuse_session_prefix(&mut self.session, &mut self.pending, &mut self.n_past);

        for batch in self.pending.chunks(self.params.n_batch) {
            if self.interrupt.is_forced() {
                return Ok(Some(Outcome::Interrupted));
            }
            let started = Instant::now();
            self.engine
                .eval(batch, self.n_past, self.params.n_threads)
                .map_err(Error::Eval)?;
            self.timings.record_eval(batch.len(), started.elapsed());
            self.n_past += batch.len();
        }

        if !self.pending.is_empty() && self.path_session.is_some() {
            self.session.extend(&self.pending);
        }
        Ok(None)
    }

    fn flush_echo(&mut self) {
        let rest = self.echo.finish();
        if !rest.is_empty() {
            self.display.append(&rest);
        }
    }

    fn save_session_once(&mut self) {
        if !self.need_to_save_session {
            return;
        }
        let Some(path) = &self.path_session else {
            return;
        };
        self.need_to_save_session = false;
        match self.engine.save_session(path, self.session.tokens()) {
            Ok(()) => info!(?path, n_tokens = self.session.len(), "saved session"),
            Err(err) => warn!(?path, "failed to save session: {err:#}"),
        }
    }

    fn append_user_text(&mut self, text: &str) {
        if text.len() <= 1 {
            return;
        }

        if self.params.instruct && !self.is_antiprompt {
            self.input.skip_to_end();
            self.input.extend(&self.inp_pfx);
        }

        let line = self.engine.tokenize(text, false);
        self.input.extend(&line);

        if self.params.instruct {
            self.input.extend(&self.inp_sfx);
        }

        if self.params.n_predict != -1 {
            self.n_remain -= i32::try_from(line.len()).unwrap_or(i32::MAX);
        }
    }

    /// Bytes of the newest history tokens, at least as many as the longest
    /// antiprompt when the history allows.
    fn history_tail(&self) -> Vec<u8> {
        let wanted = self.antiprompts.longest();
        let mut pieces = Vec::new();
        let mut len = 0;
        for token in self.history.iter().rev() {
            if len >= wanted {
                break;
            }
            let piece = self.engine.token_to_bytes(token);
            len += piece.len();
            pieces.push(piece);
        }
        pieces.into_iter().rev().flatten().collect()
    }

    fn finish_cycle(&mut self) -> Step {
        if self.pending.last() == Some(&self.engine.token_eos()) {
            if self.params.instruct {
                self.interrupt.arm();
            } else {
                self.flush_echo();
                self.display.append(" [end of text]\n");
                return self.finish(Outcome::EndOfText);
            }
        }

        if self.interactive && self.budget_exhausted() {
            self.n_remain = self.params.n_predict;
            self.interrupt.arm();
        }

        Step::Continue
    }
}
