use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Program and arguments of a single task.
///
/// Always holds at least one token: the first one is the program, the rest are its arguments.
/// Serialized as a transparent array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Command(Vec<String>);

impl Command {
    /// Build a command from its tokens, rejecting an empty list.
    pub fn new<I, S>(tokens: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(ModelError::EmptyCommand);
        }
        Ok(Self(tokens))
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    /// All tokens, program first.
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy with `extra` appended after the existing arguments.
    pub fn extended(&self, extra: &[String]) -> Command {
        let mut out = self.0.clone();
        out.extend_from_slice(extra);
        Command(out)
    }
}

impl TryFrom<Vec<String>> for Command {
    type Error = ModelError;

    fn try_from(tokens: Vec<String>) -> Result<Self, Self::Error> {
        Command::new(tokens)
    }
}

impl From<Command> for Vec<String> {
    fn from(cmd: Command) -> Self {
        cmd.0
    }
}
