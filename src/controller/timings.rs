use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default)]
struct Counter {
    runs: usize,
    tokens: usize,
    elapsed: Duration,
}

impl Counter {
    fn record(&mut self, tokens: usize, elapsed: Duration) {
        self.runs += 1;
        self.tokens += tokens;
        self.elapsed += elapsed;
    }

    fn write_line(&self, f: &mut fmt::Formatter<'_>, label: &str, unit: &str) -> fmt::Result {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        let per = if self.tokens > 0 { ms / self.tokens as f64 } else { 0.0 };
        writeln!(
            f,
            "{label:>16} = {ms:10.2} ms / {:5} {unit} ({per:8.2} ms per token)",
            self.tokens
        )
    }
}

/// Wall-clock accounting for one controller, reported on exit.
#[derive(Clone, Debug)]
pub struct Timings {
    started: Instant,
    load: Duration,
    sample: Counter,
    prompt_eval: Counter,
    eval: Counter,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            load: Duration::ZERO,
            sample: Counter::default(),
            prompt_eval: Counter::default(),
            eval: Counter::default(),
        }
    }
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load(&mut self, elapsed: Duration) {
        self.load = elapsed;
    }

    pub fn record_sample(&mut self, elapsed: Duration) {
        self.sample.record(1, elapsed);
    }

    /// Single-token batches count as generation, larger ones as prompt
    /// processing.
    pub fn record_eval(&mut self, n_tokens: usize, elapsed: Duration) {
        if n_tokens > 1 {
            self.prompt_eval.record(n_tokens, elapsed);
        } else {
            self.eval.record(n_tokens, elapsed);
        }
    }

    pub fn n_sampled(&self) -> usize {
        self.sample.tokens
    }

    pub fn n_evaluated(&self) -> usize {
        self.prompt_eval.tokens + self.eval.tokens
    }
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>16} = {:10.2} ms", "load time", self.load.as_secs_f64() * 1000.0)?;
        self.sample.write_line(f, "sample time", "runs  ")?;
        self.prompt_eval.write_line(f, "prompt eval time", "tokens")?;
        self.eval.write_line(f, "eval time", "runs  ")?;
        write!(
            f,
            "{:>16} = {:10.2} ms",
            "total time",
            self.started.elapsed().as_secs_f64() * 1000.0
        )
    }
}
