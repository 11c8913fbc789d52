pub mod cli;
pub mod controller;
pub mod engine;
pub mod error;
pub mod files;
pub mod sampling;
pub mod tokens;
pub mod ui;

pub use controller::{Controller, Interrupt, InterruptState, Outcome, Step};
pub use engine::{ByteEngine, Engine};
pub use error::{Error, Result};
pub use files::Params;
pub use tokens::Token;
