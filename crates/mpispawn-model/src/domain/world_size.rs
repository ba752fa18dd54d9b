use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Primary `-nW` value: one size for every task, or one size per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorldSize {
    Single(usize),
    Tuple(Vec<usize>),
}

impl WorldSize {
    pub fn is_tuple(&self) -> bool {
        matches!(self, WorldSize::Tuple(_))
    }
}

fn parse_positive(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

impl FromStr for WorldSize {
    type Err = ModelError;

    /// Accepts `"4"` or `"1,2,3"`.
    ///
    /// A single integer is tried first, so `"4"` is always `Single`, never a one-element tuple.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.trim().parse::<usize>() {
            if n == 0 {
                return Err(ModelError::ZeroWorldSize);
            }
            return Ok(WorldSize::Single(n));
        }

        s.split(',')
            .map(parse_positive)
            .collect::<Option<Vec<_>>>()
            .map(WorldSize::Tuple)
            .ok_or_else(|| ModelError::InvalidWorldSize(s.to_string()))
    }
}

impl fmt::Display for WorldSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldSize::Single(n) => write!(f, "{n}"),
            WorldSize::Tuple(sizes) => {
                let parts: Vec<String> = sizes.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}
