//! On-disk session token files.
//!
//! A session file records the token prefix an engine has evaluated so a later
//! run can skip re-evaluating it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tokens::Token;

const SESSION_MAGIC: &str = "llama-session";
const SESSION_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    magic: String,
    version: u32,
    tokens: Vec<Token>,
}

/// Reads the tokens stored at `path`. A missing file is `Ok(None)`; anything
/// unreadable, of the wrong format, or longer than `capacity` is an error.
pub fn read_session_file(path: impl AsRef<Path>, capacity: usize) -> Result<Option<Vec<Token>>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let file: SessionFile = serde_json::from_str(&fs::read_to_string(path)?)?;

    if file.magic != SESSION_MAGIC || file.version != SESSION_VERSION {
        return Err(Error::SessionFormat(format!(
            "unexpected header {:?} v{} in {path:?}",
            file.magic, file.version
        )));
    }
    if file.tokens.len() > capacity {
        return Err(Error::SessionFormat(format!(
            "{} tokens stored, capacity is {capacity}",
            file.tokens.len()
        )));
    }

    Ok(Some(file.tokens))
}

pub fn write_session_file(path: impl AsRef<Path>, tokens: &[Token]) -> Result<()> {
    let file = SessionFile {
        magic: SESSION_MAGIC.to_string(),
        version: SESSION_VERSION,
        tokens: tokens.to_vec(),
    };
    fs::write(path, serde_json::to_string(&file)?)?;
    Ok(())
}
