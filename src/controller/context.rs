//! Infinite generation via context swapping.
//!
//! When the next evaluation would overflow the context, the first `n_keep`
//! prompt tokens are kept in place and half of the remaining window is
//! replayed from the recent history ahead of the pending batch.

use crate::tokens::{RecentHistory, Token};

/// Number of prompt tokens to keep across a swap. Negative, oversized or
/// instruct-mode requests keep the whole prompt.
pub fn clamp_n_keep(n_keep: i32, prompt_len: usize, instruct: bool) -> usize {
    match usize::try_from(n_keep) {
        Ok(n) if n <= prompt_len && !instruct => n,
        _ => prompt_len,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextWindow {
    pub n_ctx: usize,
    pub n_keep: usize,
}

impl ContextWindow {
    pub fn new(n_ctx: usize, n_keep: usize) -> Self {
        Self { n_ctx, n_keep }
    }

    pub fn would_overflow(&self, n_past: usize, n_pending: usize) -> bool {
        n_past + n_pending > self.n_ctx
    }

    /// Rewinds `n_past` to `n_keep` and prepends half of the discarded window
    /// to `pending`. Returns the number of replayed tokens.
    ///
    /// Afterwards `n_past + pending.len()` never exceeds `n_ctx`: the replay
    /// shrinks first, then the kept prefix, and a batch larger than the whole
    /// context loses its oldest tokens.
    pub fn rebase(&self, n_past: &mut usize, pending: &mut Vec<Token>, history: &RecentHistory) -> usize {
        let n_left = n_past.saturating_sub(self.n_keep);
        let end = history.len().saturating_sub(pending.len());

        if pending.len() > self.n_ctx {
            let n_dropped = pending.len() - self.n_ctx;
            pending.drain(..n_dropped);
            tracing::warn!(n_dropped, "pending batch is larger than the context, dropping its oldest tokens");
        }

        let room = self.n_ctx - pending.len();
        *n_past = (*n_past).min(self.n_keep).min(room);

        let n_replay = (n_left / 2).min(room - *n_past);
        let start = end.saturating_sub(n_replay);

        let replay: Vec<Token> = history.slice(start..end).collect();
        let n_replayed = replay.len();
        pending.splice(0..0, replay);

        tracing::debug!(n_left, n_replayed, n_past = *n_past, "context swap");
        n_replayed
    }
}
