//! Command string tokenizer
//!
//! Splits free-text tool input into an argument vector. Double quotes group
//! words containing spaces and are never copied into the output. Malformed
//! quoting degrades gracefully: an unterminated quote closes at end of input.

use tracing::debug;

/// Parsed dispatch command: the route selector plus its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
}

impl Command {
    /// Build a command from tokenized input plus extra arguments
    ///
    /// Returns `None` when there is nothing to dispatch.
    pub fn parse(input: &str, extra_args: &[String]) -> Option<Self> {
        debug!(%input, extra = extra_args.len(), "Command::parse: called");
        let mut tokens = tokenize(input);
        tokens.extend(extra_args.iter().cloned());

        let mut tokens = tokens.into_iter();
        let verb = tokens.next()?;
        Some(Self {
            verb,
            args: tokens.collect(),
        })
    }
}

/// Split a command string into tokens
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => quoted = !quoted,
            ' ' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
