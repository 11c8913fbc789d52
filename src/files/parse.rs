use super::preprocess::trim_newline_left_right;
use super::*;
use std::ffi::OsStr;
use std::path::Path;
use std::str::FromStr;

const CONFIG_TAG: &str = "<|CONFIG|>";
const ENDCONFIG_TAG: &str = "<|ENDCONFIG|>";

const PROMPT_TAG: &str = "<|PROMPT|>";

fn params_from_yaml(yaml: &str) -> Result<Params> {
    if yaml.trim().is_empty() {
        return Ok(Params::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

/// Parses a prompt file: an optional `<|CONFIG|>` YAML block closed by
/// `<|ENDCONFIG|>`, and an optional `<|PROMPT|>` section running to the end
/// of the file.
impl FromStr for Params {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut params = match s.find(CONFIG_TAG) {
            Some(i) => {
                let s = &s[i + CONFIG_TAG.len()..];

                let Some(j) = s.find(ENDCONFIG_TAG) else {
                    return Err(Error::PromptFile(format!(
                        "{CONFIG_TAG} block is not closed by {ENDCONFIG_TAG}"
                    )));
                };

                params_from_yaml(&s[..j])?
            }
            None => Params::default(),
        };

        if let Some(i) = s.find(PROMPT_TAG) {
            params.prompt = trim_newline_left_right(&s[i + PROMPT_TAG.len()..]).to_string();
        }

        Ok(params)
    }
}

pub fn parse_from_file<T: FromStr>(path: impl AsRef<Path>) -> Result<T>
where
    Error: From<T::Err>,
{
    Ok(preprocess_file(path)?.parse()?)
}

impl Params {
    /// Loads parameters from a plain YAML file (`.yaml`/`.yml`) or from a
    /// tagged prompt file. Includes are expanded first in both cases.
    pub fn load(path: impl AsRef<Path>) -> Result<Params> {
        let path = path.as_ref();

        match path.extension().and_then(OsStr::to_str) {
            Some("yaml" | "yml") => params_from_yaml(&preprocess_file(path)?),
            _ => parse_from_file(path),
        }
    }
}
