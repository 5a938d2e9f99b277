use shared::{
    domain::{InputEvent, InputOrigin},
    protocol::GateInput,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Inputs(Vec<GateInput>),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("'{0}' needs a word to submit")]
    MissingGuess(&'static str),
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
}

pub const HELP: &str = "\
keys:    up down left right a b   (several per line)
stage 2: tap | click
stage 3: guess <word> | paste <word> | drop <word>
other:   reset | status | help | quit";

/// Decodes one raw stdin line without its line ending.
pub fn decode_line(mut raw: Vec<u8>) -> Result<String, std::string::FromUtf8Error> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw)
}

/// Parses one input line. Blank lines parse to no inputs.
pub fn parse_line(line: &str) -> Result<ShellCommand, ParseError> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "" => Ok(ShellCommand::Inputs(Vec::new())),
        "tap" | "click" => Ok(ShellCommand::Inputs(vec![GateInput::ChallengeAction])),
        "guess" => submission("guess", rest, InputOrigin::Typed),
        "paste" => submission("paste", rest, InputOrigin::Pasted),
        "drop" => submission("drop", rest, InputOrigin::Dropped),
        "reset" => Ok(ShellCommand::Inputs(vec![GateInput::Reset])),
        "status" => Ok(ShellCommand::Status),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        _ => parse_keys(line),
    }
}

fn submission(
    command: &'static str,
    rest: &str,
    origin: InputOrigin,
) -> Result<ShellCommand, ParseError> {
    // An empty paste or drop still goes to the gate, which refuses it.
    if rest.is_empty() && origin == InputOrigin::Typed {
        return Err(ParseError::MissingGuess(command));
    }
    Ok(ShellCommand::Inputs(vec![GateInput::SubmitPassphrase {
        guess: rest.to_string(),
        origin,
    }]))
}

fn parse_keys(line: &str) -> Result<ShellCommand, ParseError> {
    line.split_whitespace()
        .map(|word| match InputEvent::from_key_name(word) {
            InputEvent::Other => Err(ParseError::Unknown(word.to_string())),
            event => Ok(GateInput::Key { event }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ShellCommand::Inputs)
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
