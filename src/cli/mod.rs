mod args;
mod command;
mod terminal;

pub use args::App;
pub use command::*;
pub use terminal::{LineEditor, Terminal};

use crate::controller::{Controller, Outcome};
use crate::engine::Engine;
use crate::ui::{InputSource, Line, Surface};
use anyhow::{bail, Result};

/// Terminal host: runs the controller and, once a non-interactive run ends,
/// offers a command prompt for further runs.
pub struct Cli<E: Engine, D: Surface, I: InputSource> {
    controller: Controller<E, D>,
    input: I,
    last: Option<Outcome>,
}

impl<E: Engine, D: Surface, I: InputSource> Cli<E, D, I> {
    pub fn new(controller: Controller<E, D>, input: I) -> Self {
        Self {
            controller,
            input,
            last: None,
        }
    }

    pub fn controller(&self) -> &Controller<E, D> {
        &self.controller
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last
    }

    fn halted(&self) -> bool {
        self.controller.interrupt().is_forced()
    }

    pub fn generate(&mut self) -> Result<Outcome> {
        let outcome = self.controller.run(&mut self.input)?;
        self.controller.display_mut().append("\n");
        self.controller.display_mut().flush();
        self.last = Some(outcome);
        Ok(outcome)
    }

    pub fn run_command(&mut self, command: &str) -> Result<bool> {
        match command.parse()? {
            Command::Help => println!("{HELP}"),
            Command::Exit => return Ok(false),
            Command::Predict(n) => self.controller.set_n_predict(n),
            Command::Temp(temp) => self.controller.set_temperature(temp),
            Command::Prompt(prompt) => self.controller.replace_prompt(&prompt)?,
            Command::Timings => println!("{}", self.controller.timings()),
            Command::Gen => {
                if self.controller.is_interactive() {
                    bail!("Interactive session has ended!");
                }
                self.controller.begin_run("");
                self.generate()?;
            }
            Command::Submit(text) => {
                if self.controller.is_interactive() {
                    bail!("Interactive session has ended!");
                }
                self.controller.begin_run(&format!("{text}\n"));
                self.generate()?;
            }
        }

        Ok(true)
    }

    /// Generates from the initial prompt, then serves commands until exit.
    /// Returns the outcome of the last run.
    pub fn run(&mut self) -> Result<Outcome> {
        let outcome = self.generate()?;
        if self.controller.is_interactive() || self.halted() {
            return Ok(outcome);
        }

        loop {
            let line = match self.input.read_line("> ")? {
                Line::Text(l) => l,
                Line::Interrupted => {
                    println!("Use '/exit' to exit.");
                    continue;
                }
                Line::Eof => break,
            };

            match self.run_command(&line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("{e}"),
            }

            if self.halted() {
                break;
            }
        }

        Ok(self.last.unwrap_or(outcome))
    }
}
