use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const INCLUDE_TAG: &str = "<|INCLUDE";
const END_TAG: &str = "|>";

const MAX_INCLUDE_DEPTH: usize = 16;

/// Computes the path of file2 relative to the directory file1 is in.
fn join_filename(file1: impl AsRef<Path>, file2: impl AsRef<Path>) -> PathBuf {
    let mut file1 = file1.as_ref().to_path_buf();
    file1.pop();
    file1.push(file2);
    file1
}

pub(super) fn trim_newline_right(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

pub(super) fn trim_newline_left(s: &str) -> &str {
    let s = s.strip_prefix('\r').unwrap_or(s);
    s.strip_prefix('\n').unwrap_or(s)
}

pub(super) fn trim_newline_left_right(s: &str) -> &str {
    trim_newline_right(trim_newline_left(s))
}

/// Reads a file and expands `<|INCLUDE path|>` statements, resolving each path
/// relative to the including file.
pub fn preprocess_file(file: impl AsRef<Path>) -> Result<String> {
    preprocess_at_depth(file.as_ref(), 0)
}

fn preprocess_at_depth(file: &Path, depth: usize) -> Result<String> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(Error::PromptFile(format!(
            "includes nested deeper than {MAX_INCLUDE_DEPTH} levels at {file:?}"
        )));
    }

    let contents = fs::read_to_string(file)?;
    let mut out = String::with_capacity(contents.len());
    let mut rest = contents.as_str();

    while let Some(start) = rest.find(INCLUDE_TAG) {
        out.push_str(&rest[..start]);

        let args = &rest[start + INCLUDE_TAG.len()..];
        let Some(end) = args.find(END_TAG) else {
            return Err(Error::PromptFile(format!("missing end tag for include statement in {file:?}")));
        };

        let target = args[..end].trim();
        if target.is_empty() {
            return Err(Error::PromptFile(format!("include statement without a path in {file:?}")));
        }

        out.push_str(&preprocess_at_depth(&join_filename(file, target), depth + 1)?);
        rest = &args[end + END_TAG.len()..];
    }

    out.push_str(rest);
    Ok(out)
}
