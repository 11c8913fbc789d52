//! Per-step token selection.
//!
//! [`Sampler`] turns the engine's raw logits into exactly one token: bias,
//! penalties, the newline restore, then greedy, mirostat or the filter chain.

mod candidates;

pub use candidates::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::files::SamplingParams;
use crate::tokens::{RecentHistory, Token};

/// Candidates mirostat 1.0 uses to estimate the Zipf exponent.
const MIROSTAT_M: usize = 100;

#[derive(Clone, Debug)]
pub struct Sampler {
    rng: StdRng,
    /// Feedback state for mirostat 1.0, seeded at `2 * tau` on first use.
    mirostat_mu: Option<f32>,
    /// Feedback state for mirostat 2.0, independent of the 1.0 state.
    mirostat_v2_mu: Option<f32>,
}

impl Sampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            mirostat_mu: None,
            mirostat_v2_mu: None,
        }
    }

    pub fn mirostat_mu(&self) -> Option<f32> {
        self.mirostat_mu
    }

    pub fn mirostat_v2_mu(&self) -> Option<f32> {
        self.mirostat_v2_mu
    }

    /// Number of trailing history tokens the penalties look at.
    pub fn penalty_window(history: &RecentHistory, repeat_last_n: i32, n_ctx: usize) -> usize {
        let repeat_last_n = usize::try_from(repeat_last_n).unwrap_or(n_ctx);
        history.len().min(repeat_last_n).min(n_ctx)
    }

    /// Applies bias and penalties to `logits` and returns the resulting
    /// candidate list, before any token is selected.
    pub fn penalized_candidates(
        logits: &[f32],
        history: &RecentHistory,
        params: &SamplingParams,
        n_ctx: usize,
        newline: Token,
    ) -> Candidates {
        let mut logits = logits.to_vec();
        for (&id, &bias) in &params.logit_bias {
            match logits.get_mut(id as usize) {
                Some(logit) => *logit += bias,
                None => tracing::debug!(id, "logit bias for token outside the vocabulary ignored"),
            }
        }

        let mut candidates = Candidates::from_logits(&logits);

        let nl_logit = logits.get(newline as usize).copied();
        let n_repeat = Self::penalty_window(history, params.repeat_last_n, n_ctx);
        let last: Vec<Token> = history.window(n_repeat).collect();

        candidates.repetition_penalty(&last, params.repeat_penalty);
        candidates.frequency_and_presence(&last, params.frequency_penalty, params.presence_penalty);

        if !params.penalize_nl {
            if let Some(nl_logit) = nl_logit {
                candidates.set_logit(newline, nl_logit);
            }
        }

        candidates
    }

    /// Selects the next token and pushes it into `history`.
    pub fn sample(
        &mut self,
        logits: &[f32],
        history: &mut RecentHistory,
        params: &SamplingParams,
        n_ctx: usize,
        newline: Token,
    ) -> Result<Token> {
        if logits.is_empty() {
            return Err(Error::EmptyLogits);
        }
        let n_vocab = logits.len();
        let mut candidates = Self::penalized_candidates(logits, history, params, n_ctx, newline);

        let id = if params.temp <= 0.0 {
            candidates.greedy()
        } else if params.mirostat == 1 {
            let mu = self.mirostat_mu.get_or_insert(2.0 * params.mirostat_tau);
            candidates.temperature(params.temp);
            candidates.mirostat(
                &mut self.rng,
                params.mirostat_tau,
                params.mirostat_eta,
                MIROSTAT_M,
                mu,
            )
        } else if params.mirostat == 2 {
            let mu = self.mirostat_v2_mu.get_or_insert(2.0 * params.mirostat_tau);
            candidates.temperature(params.temp);
            candidates.mirostat_v2(&mut self.rng, params.mirostat_tau, params.mirostat_eta, mu)
        } else {
            let top_k = usize::try_from(params.top_k).ok().filter(|&k| k > 0).unwrap_or(n_vocab);
            candidates.top_k(top_k, 1);
            candidates.tail_free(params.tfs_z, 1);
            candidates.typical(params.typical_p, 1);
            candidates.top_p(params.top_p, 1);
            candidates.temperature(params.temp);
            candidates.sample(&mut self.rng)
        };

        let id = id.ok_or(Error::EmptyLogits)?;
        history.push(id);
        Ok(id)
    }
}
