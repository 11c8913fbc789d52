use std::collections::VecDeque;
use std::ops::Range;

/// Vocabulary index produced and consumed by the engine.
pub type Token = u32;

/// Value a fresh [`RecentHistory`] is filled with.
pub const SENTINEL: Token = 0;

/// Tokens queued for the next evaluation call.
pub type PendingBatch = Vec<Token>;

/// Fixed-capacity window over the most recently seen tokens.
///
/// The window is pre-filled with [`SENTINEL`] so its length always equals its
/// capacity; pushing evicts the oldest entry.
#[derive(Clone, Debug)]
pub struct RecentHistory {
    tokens: VecDeque<Token>,
    capacity: usize,
}

impl RecentHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: std::iter::repeat(SENTINEL).take(capacity).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn push(&mut self, token: Token) {
        if self.capacity == 0 {
            return;
        }
        if self.tokens.len() == self.capacity {
            self.tokens.pop_front();
        }
        self.tokens.push_back(token);
    }

    /// The last `k` tokens, oldest first. `k` is clamped to the current length.
    pub fn window(&self, k: usize) -> impl DoubleEndedIterator<Item = Token> + ExactSizeIterator + '_ {
        let k = k.min(self.tokens.len());
        self.tokens.range(self.tokens.len() - k..).copied()
    }

    /// Tokens at positions `range`, counted from the oldest entry.
    pub fn slice(&self, range: Range<usize>) -> impl DoubleEndedIterator<Item = Token> + '_ {
        self.tokens.range(range).copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Token> + ExactSizeIterator + '_ {
        self.tokens.iter().copied()
    }

    pub fn reset(&mut self) {
        self.tokens.clear();
        self.tokens.extend(std::iter::repeat(SENTINEL).take(self.capacity));
    }
}

/// The whole conversation fed to the engine so far, with a cursor over how
/// much of it has been handed to evaluation.
#[derive(Clone, Debug, Default)]
pub struct InputSequence {
    tokens: Vec<Token>,
    consumed: usize,
}

impl InputSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, consumed: 0 }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_drained(&self) -> bool {
        self.consumed >= self.tokens.len()
    }

    pub fn extend(&mut self, tokens: &[Token]) {
        self.tokens.extend_from_slice(tokens);
    }

    /// Marks everything currently queued as consumed.
    pub fn skip_to_end(&mut self) {
        self.consumed = self.tokens.len();
    }

    pub fn reset(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens;
        self.consumed = 0;
    }
}

impl Iterator for InputSequence {
    type Item = Token;

    /// Hands out the next unconsumed token and advances the cursor.
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.consumed).copied()?;
        self.consumed += 1;
        Some(token)
    }
}

/// A previously evaluated token prefix, loaded from or destined for a session
/// file, with a cursor over how much of it is confirmed to match the input.
#[derive(Clone, Debug, Default)]
pub struct SessionCache {
    tokens: Vec<Token>,
    consumed: usize,
}

impl SessionCache {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, consumed: 0 }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Whether cached tokens remain that have not been matched yet.
    pub fn is_pending(&self) -> bool {
        self.consumed < self.tokens.len()
    }

    pub fn next_expected(&self) -> Option<Token> {
        self.tokens.get(self.consumed).copied()
    }

    pub fn advance(&mut self) {
        if self.is_pending() {
            self.consumed += 1;
        }
    }

    /// Drops everything past the matched prefix.
    pub fn truncate_to_consumed(&mut self) {
        self.tokens.truncate(self.consumed);
    }

    /// Records freshly evaluated tokens; all of them count as matched.
    pub fn extend(&mut self, tokens: &[Token]) {
        self.tokens.extend_from_slice(tokens);
        self.consumed = self.tokens.len();
    }

    /// Keeps only the first `len` tokens.
    pub fn truncate(&mut self, len: usize) {
        self.tokens.truncate(len);
        self.consumed = self.consumed.min(len);
    }

    pub fn rewind(&mut self) {
        self.consumed = 0;
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.consumed = 0;
    }

    /// Number of leading tokens shared with `prompt`.
    pub fn matching_prefix(&self, prompt: &[Token]) -> usize {
        self.tokens
            .iter()
            .zip(prompt)
            .take_while(|(cached, fresh)| cached == fresh)
            .count()
    }
}
