use super::*;
use std::str::FromStr;

pub const HELP: &str = "\
/help           show this message
/exit           quit
/predict N      tokens to generate per run, -1 for no limit
/temp X         sampling temperature, 0 or less for greedy
/prompt TEXT    replace the initial prompt and restart
/timings        print timing statistics
<empty line>    continue generating
<text>          submit text and generate";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Help,
    Exit,
    Predict(i32),
    Temp(f32),
    Prompt(String),
    Timings,
    Gen,
    Submit(String),
}

fn argument<'a>(s: &'a str, command: &str) -> Result<&'a str> {
    let arg = s.find(char::is_whitespace).map(|i| s[i..].trim()).unwrap_or("");
    if arg.is_empty() {
        bail!("\"/{command}\" requires an argument");
    }
    Ok(arg)
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        let Some(rest) = trimmed.strip_prefix('/') else {
            if trimmed.is_empty() {
                return Ok(Command::Gen);
            }
            return Ok(Command::Submit(s.to_string()));
        };

        let out = match rest.split_whitespace().next() {
            None => bail!("Cannot parse command from empty input"),
            Some("help") => Command::Help,
            Some("exit") => Command::Exit,
            Some("timings") => Command::Timings,
            Some("predict") => {
                let arg = argument(rest, "predict")?;
                let Ok(n) = arg.parse::<i32>() else {
                    bail!("Expected a token count for \"/predict\", got {arg:?}");
                };
                if n < -1 {
                    bail!("Token count must be -1 or more, got {n}");
                }
                Command::Predict(n)
            }
            Some("temp") => {
                let arg = argument(rest, "temp")?;
                let Ok(temp) = arg.parse::<f32>() else {
                    bail!("Expected a number for \"/temp\", got {arg:?}");
                };
                Command::Temp(temp)
            }
            Some("prompt") => Command::Prompt(argument(rest, "prompt")?.to_string()),
            Some(c) => {
                bail!("Unrecognized command: {c:?}. Type \"/help\" to view a list of commands.")
            }
        };

        Ok(out)
    }
}
