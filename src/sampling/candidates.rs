//! In-place transformations over a vocabulary-wide candidate list.
//!
//! Every filter keeps at least `min_keep` candidates so that a token can
//! always be drawn afterwards.

use std::collections::{HashMap, HashSet};

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::tokens::Token;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenData {
    pub id: Token,
    pub logit: f32,
    pub p: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Candidates {
    data: Vec<TokenData>,
    sorted: bool,
}

impl Candidates {
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(id, &logit)| TokenData {
                id: id as Token,
                logit,
                p: 0.0,
            })
            .collect();

        Self {
            data,
            sorted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[TokenData] {
        &self.data
    }

    pub fn logit(&self, id: Token) -> Option<f32> {
        self.data.iter().find(|c| c.id == id).map(|c| c.logit)
    }

    pub fn set_logit(&mut self, id: Token, logit: f32) {
        if let Some(c) = self.data.iter_mut().find(|c| c.id == id) {
            c.logit = logit;
            self.sorted = false;
        }
    }

    fn sort(&mut self) {
        if !self.sorted {
            self.data.sort_by(|a, b| b.logit.total_cmp(&a.logit));
            self.sorted = true;
        }
    }

    /// Sorts by descending logit and fills in normalised probabilities.
    pub fn softmax(&mut self) {
        if self.data.is_empty() {
            return;
        }
        self.sort();

        let max = self.data[0].logit;
        let mut sum = 0.0;
        for c in &mut self.data {
            c.p = (c.logit - max).exp();
            sum += c.p;
        }
        for c in &mut self.data {
            c.p /= sum;
        }
    }

    pub fn top_k(&mut self, k: usize, min_keep: usize) {
        let k = k.max(min_keep).min(self.data.len());
        self.sort();
        self.data.truncate(k);
    }

    /// Nucleus filter: keeps the smallest prefix whose mass reaches `p`.
    pub fn top_p(&mut self, p: f32, min_keep: usize) {
        if p >= 1.0 {
            return;
        }
        self.softmax();

        let mut cum = 0.0;
        let mut last = self.data.len();
        for (i, c) in self.data.iter().enumerate() {
            cum += c.p;
            if cum >= p && i + 1 >= min_keep {
                last = i + 1;
                break;
            }
        }
        self.data.truncate(last);
    }

    /// Tail-free filter: cuts where the second derivative of the sorted
    /// distribution has accumulated `z` of its mass.
    pub fn tail_free(&mut self, z: f32, min_keep: usize) {
        if z >= 1.0 || self.data.len() <= 2 {
            return;
        }
        self.softmax();

        let first: Vec<f32> = self.data.windows(2).map(|w| w[0].p - w[1].p).collect();
        let second: Vec<f32> = first.windows(2).map(|w| (w[0] - w[1]).abs()).collect();
        let total: f32 = second.iter().sum();
        if total <= 0.0 {
            return;
        }

        let mut cum = 0.0;
        let mut last = self.data.len();
        for (i, d) in second.iter().enumerate() {
            cum += d / total;
            if cum > z && i >= min_keep {
                last = i;
                break;
            }
        }
        self.data.truncate(last);
    }

    /// Locally typical filter: keeps the tokens whose surprise is closest to
    /// the distribution's entropy until `p` of the mass is covered.
    pub fn typical(&mut self, p: f32, min_keep: usize) {
        if p >= 1.0 {
            return;
        }
        self.softmax();

        let entropy: f32 = -self
            .data
            .iter()
            .filter(|c| c.p > 0.0)
            .map(|c| c.p * c.p.ln())
            .sum::<f32>();

        let mut shifted: Vec<(f32, TokenData)> = self
            .data
            .iter()
            .map(|c| ((-c.p.ln() - entropy).abs(), *c))
            .collect();
        shifted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut cum = 0.0;
        let mut last = shifted.len();
        for (i, (_, c)) in shifted.iter().enumerate() {
            cum += c.p;
            if cum > p && i + 1 >= min_keep {
                last = i + 1;
                break;
            }
        }

        self.data = shifted.into_iter().take(last).map(|(_, c)| c).collect();
        self.sorted = false;
    }

    pub fn temperature(&mut self, temp: f32) {
        for c in &mut self.data {
            c.logit /= temp;
        }
    }

    /// Divides positive logits (and multiplies negative ones) of every token
    /// present in `last`. Each token is penalised once regardless of count.
    pub fn repetition_penalty(&mut self, last: &[Token], penalty: f32) {
        if last.is_empty() || penalty == 1.0 {
            return;
        }
        let seen: HashSet<Token> = last.iter().copied().collect();

        for c in self.data.iter_mut().filter(|c| seen.contains(&c.id)) {
            if c.logit <= 0.0 {
                c.logit *= penalty;
            } else {
                c.logit /= penalty;
            }
        }
        self.sorted = false;
    }

    pub fn frequency_and_presence(&mut self, last: &[Token], alpha_frequency: f32, alpha_presence: f32) {
        if last.is_empty() || (alpha_frequency == 0.0 && alpha_presence == 0.0) {
            return;
        }
        let mut counts: HashMap<Token, usize> = HashMap::new();
        for &token in last {
            *counts.entry(token).or_default() += 1;
        }

        for c in &mut self.data {
            if let Some(&count) = counts.get(&c.id) {
                c.logit -= count as f32 * alpha_frequency + alpha_presence;
            }
        }
        self.sorted = false;
    }

    /// Highest logit; the lowest id wins ties.
    pub fn greedy(&self) -> Option<Token> {
        let mut best: Option<&TokenData> = None;
        for c in &self.data {
            match best {
                Some(b) if b.logit > c.logit || (b.logit == c.logit && b.id < c.id) => {}
                _ => best = Some(c),
            }
        }
        best.map(|c| c.id)
    }

    fn sample_index<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        self.softmax();
        if self.data.is_empty() {
            return None;
        }
        match WeightedIndex::new(self.data.iter().map(|c| c.p)) {
            Ok(dist) => Some(dist.sample(rng)),
            // Degenerate distribution, fall back to the most likely token.
            Err(_) => Some(0),
        }
    }

    /// Draws a token from the normalised distribution.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Token> {
        let idx = self.sample_index(rng)?;
        Some(self.data[idx].id)
    }

    /// Mirostat 1.0. Estimates the Zipf exponent from the top `m`
    /// candidates, derives a top-k cut from `mu`, samples, then moves `mu`
    /// toward the target surprise `tau`.
    pub fn mirostat<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        tau: f32,
        eta: f32,
        m: usize,
        mu: &mut f32,
    ) -> Option<Token> {
        let n = self.data.len() as f32;
        self.softmax();

        let m = m.min(self.data.len());
        let mut sum_ti_bi = 0.0f32;
        let mut sum_ti_sq = 0.0f32;
        for i in 0..m.saturating_sub(1) {
            let t_i = ((i + 2) as f32 / (i + 1) as f32).ln();
            let b_i = (self.data[i].p / self.data[i + 1].p).ln();
            sum_ti_bi += t_i * b_i;
            sum_ti_sq += t_i * t_i;
        }
        let s_hat = sum_ti_bi / sum_ti_sq;

        let epsilon_hat = s_hat - 1.0;
        let k = ((epsilon_hat * 2f32.powf(*mu)) / (1.0 - n.powf(-epsilon_hat))).powf(1.0 / s_hat);
        // NaN and negative estimates saturate to zero; min_keep keeps one.
        self.top_k(k as usize, 1);

        let idx = self.sample_index(rng)?;
        let observed = -self.data[idx].p.log2();
        *mu -= eta * (observed - tau);
        Some(self.data[idx].id)
    }

    /// Mirostat 2.0. Drops candidates whose surprise exceeds `mu`, samples,
    /// then moves `mu` toward the target surprise `tau`.
    pub fn mirostat_v2<R: Rng + ?Sized>(&mut self, rng: &mut R, tau: f32, eta: f32, mu: &mut f32) -> Option<Token> {
        self.softmax();

        let keep = self
            .data
            .iter()
            .position(|c| -c.p.log2() > *mu)
            .unwrap_or(self.data.len())
            .max(1);
        self.data.truncate(keep);

        let idx = self.sample_index(rng)?;
        let observed = -self.data[idx].p.log2();
        *mu -= eta * (observed - tau);
        Some(self.data[idx].id)
    }
}
