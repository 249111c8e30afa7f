//! Line commands for the interactive loop.
//!
//! Any line that does not start with `/` is submitted as a prompt.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Submit(String),
    New,
    Switch(u64),
    Close,
    List,
    Clear,
    Save,
    SaveDb,
    ZoomIn,
    ZoomOut,
    /// Token limit, clamped by the session
    Tokens(i64),
    /// Temperature slider position, `value / 100`
    Temperature(i64),
    History,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidNumber(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownCommand(name) => write!(f, "unknown command '/{}' (try /help)", name),
            ParseError::MissingArgument(command) => write!(f, "/{} needs a number", command),
            ParseError::InvalidNumber(value) => write!(f, "'{}' is not a number", value),
        }
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
  /new            open a new conversation
  /switch N       make conversation N active
  /close          close the active conversation
  /list           list open conversations
  /clear          clear the input and status line
  /save           save the transcript to a text file
  /savedb         save the transcript to the database
  /zoom-in        increase the font size
  /zoom-out       decrease the font size
  /tokens N       set the token limit (10-4096)
  /temp N         set the temperature slider (0-200)
  /history        list transcripts saved to the database
  /quit           exit";

fn number(command: &'static str, arg: Option<&str>) -> Result<i64, ParseError> {
    let arg = arg.ok_or(ParseError::MissingArgument(command))?;
    arg.parse().map_err(|_| ParseError::InvalidNumber(arg.to_string()))
}

pub fn parse(line: &str) -> Result<ReplCommand, ParseError> {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(ReplCommand::Submit(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let command = match name {
        "new" => ReplCommand::New,
        "switch" => {
            let id = number("switch", arg)?;
            ReplCommand::Switch(u64::try_from(id).map_err(|_| ParseError::InvalidNumber(id.to_string()))?)
        }
        "close" => ReplCommand::Close,
        "list" => ReplCommand::List,
        "clear" => ReplCommand::Clear,
        "save" => ReplCommand::Save,
        "savedb" => ReplCommand::SaveDb,
        "zoom-in" => ReplCommand::ZoomIn,
        "zoom-out" => ReplCommand::ZoomOut,
        "tokens" => ReplCommand::Tokens(number("tokens", arg)?),
        "temp" => ReplCommand::Temperature(number("temp", arg)?),
        "history" => ReplCommand::History,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_are_prompts() {
        assert_eq!(parse("Hello there"), Ok(ReplCommand::Submit("Hello there".to_string())));
        assert_eq!(parse("  keep  spacing "), Ok(ReplCommand::Submit("  keep  spacing ".to_string())));
        assert_eq!(parse(""), Ok(ReplCommand::Submit(String::new())));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse("/new"), Ok(ReplCommand::New));
        assert_eq!(parse("/switch 3"), Ok(ReplCommand::Switch(3)));
        assert_eq!(parse("/savedb"), Ok(ReplCommand::SaveDb));
        assert_eq!(parse("/tokens 1000"), Ok(ReplCommand::Tokens(1000)));
        assert_eq!(parse("/temp 150"), Ok(ReplCommand::Temperature(150)));
        assert_eq!(parse(" /exit"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(parse("/switch"), Err(ParseError::MissingArgument("switch")));
        assert_eq!(parse("/tokens lots"), Err(ParseError::InvalidNumber("lots".to_string())));
        assert_eq!(parse("/switch -1"), Err(ParseError::InvalidNumber("-1".to_string())));
        assert_eq!(parse("/frobnicate"), Err(ParseError::UnknownCommand("frobnicate".to_string())));
    }

    #[test]
    fn test_out_of_range_tokens_are_left_to_the_session() {
        assert_eq!(parse("/tokens 999999"), Ok(ReplCommand::Tokens(999999)));
    }
}
