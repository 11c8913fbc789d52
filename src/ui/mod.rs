//! What the controller needs from a host: somewhere to write text and
//! somewhere to read user lines from.

use std::collections::VecDeque;

use crate::error::Result;

/// Color cue requested by the controller. Hosts without color ignore it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Default,
    Prompt,
    UserInput,
}

pub trait Surface {
    fn append(&mut self, text: &str);

    fn set_mode(&mut self, mode: ColorMode);

    fn flush(&mut self) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Text(String),
    Eof,
    Interrupted,
}

pub trait InputSource {
    fn read_line(&mut self, prompt: &str) -> Result<Line>;
}

/// Reads one user message. A line ending in a backslash continues onto the
/// next; the backslash becomes a newline. Every line ends in a newline.
pub fn read_user_text(source: &mut impl InputSource, prompt: &str) -> Result<Line> {
    let mut buffer = String::new();
    let mut prompt = prompt;

    loop {
        let line = match source.read_line(prompt)? {
            Line::Text(line) => line,
            other => return Ok(other),
        };

        match line.strip_suffix('\\') {
            Some(continued) => {
                buffer.push_str(continued);
                buffer.push('\n');
                prompt = "";
            }
            None => {
                buffer.push_str(&line);
                buffer.push('\n');
                return Ok(Line::Text(buffer));
            }
        }
    }
}

/// Turns a stream of token bytes into text, holding back an incomplete
/// trailing character until the rest of its bytes arrive. Invalid sequences
/// become U+FFFD.
#[derive(Clone, Debug, Default)]
pub struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.partial.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            let err = match std::str::from_utf8(&self.partial) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.partial.clear();
                    return text;
                }
                Err(err) => err,
            };

            let valid = err.valid_up_to();
            text.push_str(&String::from_utf8_lossy(&self.partial[..valid]));
            match err.error_len() {
                None => {
                    self.partial.drain(..valid);
                    return text;
                }
                Some(len) => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    self.partial.drain(..valid + len);
                }
            }
        }
    }

    /// Whatever is still held back, decoded lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        rest
    }
}

/// In-memory surface recording text and mode changes.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    text: String,
    modes: Vec<ColorMode>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn modes(&self) -> &[ColorMode] {
        &self.modes
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.modes.clear();
    }
}

impl Surface for Transcript {
    fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn set_mode(&mut self, mode: ColorMode) {
        self.modes.push(mode);
    }
}

/// Input source replaying a fixed list of lines, then end of input.
#[derive(Clone, Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<Line>,
    prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new(lines: impl IntoIterator<Item = Line>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    pub fn from_text<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|l| Line::Text(l.to_string())))
    }

    /// Prompts shown so far, one per line read.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> Result<Line> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front().unwrap_or(Line::Eof))
    }
}
