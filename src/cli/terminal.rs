use std::io::{self, Write};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::Result;
use crate::ui::{ColorMode, InputSource, Line, Surface};

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_BOLD_GREEN: &str = "\x1b[1m\x1b[32m";

/// Generated text goes straight to stdout.
#[derive(Debug, Default)]
pub struct Terminal {
    use_color: bool,
    mode: ColorMode,
}

impl Terminal {
    pub fn new(use_color: bool) -> Self {
        Self {
            use_color,
            mode: ColorMode::Default,
        }
    }
}

impl Surface for Terminal {
    fn append(&mut self, text: &str) {
        print!("{text}");
    }

    fn set_mode(&mut self, mode: ColorMode) {
        if self.use_color && mode != self.mode {
            let code = match mode {
                ColorMode::Default => ANSI_RESET,
                ColorMode::Prompt => ANSI_YELLOW,
                ColorMode::UserInput => ANSI_BOLD_GREEN,
            };
            print!("{code}");
        }
        self.mode = mode;
    }

    fn flush(&mut self) {
        let _ = io::stdout().flush();
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.use_color && self.mode != ColorMode::Default {
            print!("{ANSI_RESET}");
            let _ = io::stdout().flush();
        }
    }
}

pub struct LineEditor {
    editor: DefaultEditor,
}

impl LineEditor {
    pub fn new() -> Result<Self> {
        let config = rustyline::config::Builder::new()
            .auto_add_history(true)
            .build();

        Ok(Self {
            editor: DefaultEditor::with_config(config)?,
        })
    }
}

impl InputSource for LineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Line> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Line::Text(line)),
            Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
            Err(ReadlineError::Eof) => Ok(Line::Eof),
            Err(e) => Err(e.into()),
        }
    }
}
