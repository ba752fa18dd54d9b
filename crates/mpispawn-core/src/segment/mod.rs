//! Splitting of the raw command line into colon-delimited segments and parsing of each segment.
mod grammar;
pub use grammar::{Grammar, OptKind, OptSpec, ParsedArgs, PRIMARY, SHORT_CIRCUIT, SUBSEQUENT, parse};

mod parse;
pub use parse::{ParsedPrimary, ParsedSubsequent, parse_primary, parse_subsequent};

/// Token separating one task description from the next.
pub const DELIMITER: &str = ":";

/// Drop the invocation token and split the rest on [`DELIMITER`].
///
/// Delimiters never appear in the output. Empty input, a leading, trailing or doubled delimiter
/// each produce an empty segment so that the parser can report the missing command.
pub fn split_segments<S: AsRef<str>>(argv: &[S]) -> Vec<Vec<String>> {
    let rest = argv.get(1..).unwrap_or_default();
    rest.split(|tok| grammar::as_str(tok) == DELIMITER)
        .map(|seg| seg.iter().map(|t| grammar::as_str(t).to_string()).collect())
        .collect()
}
