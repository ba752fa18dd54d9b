use std::fmt::Write as _;

use crate::error::CoreError;

/// Whether an option stands alone or consumes the following token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptKind {
    Flag,
    Value,
}

/// Declaration of one option of a [`Grammar`].
#[derive(Debug, Clone, Copy)]
pub struct OptSpec {
    pub name: &'static str,
    pub kind: OptKind,
    pub metavar: Option<&'static str>,
    pub help: &'static str,
    pub required: bool,
}

impl OptSpec {
    const fn flag(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            kind: OptKind::Flag,
            metavar: None,
            help,
            required: false,
        }
    }

    const fn value(name: &'static str, metavar: &'static str, help: &'static str) -> Self {
        Self {
            name,
            kind: OptKind::Value,
            metavar: Some(metavar),
            help,
            required: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn invocation(&self) -> String {
        match self.metavar {
            Some(m) => format!("{} {m}", self.name),
            None => self.name.to_string(),
        }
    }
}

/// Declaration of the trailing command positional.
#[derive(Debug, Clone, Copy)]
pub struct Positional {
    pub name: &'static str,
    pub metavar: &'static str,
    pub help: &'static str,
}

/// Option schema of one kind of segment.
///
/// Grammars are plain values; [`parse`] never mutates them.
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    pub prog: &'static str,
    pub description: Option<&'static str>,
    pub options: &'static [OptSpec],
    pub positional: Option<Positional>,
}

const COMMAND: Positional = Positional {
    name: "command",
    metavar: "command :",
    help: "Command(s) to execute",
};

/// Options recognised before anything else is parsed.
pub static SHORT_CIRCUIT: Grammar = Grammar {
    prog: "mpispawn",
    description: None,
    options: &[
        OptSpec::flag("--help", "Show this help message and exit"),
        OptSpec::flag(
            "--check-spawn",
            "Verify whether it is possible to call MPI_Comm_spawn",
        ),
    ],
    positional: None,
};

/// Grammar of the first segment: global flags plus the first command.
pub static PRIMARY: Grammar = Grammar {
    prog: "mpispawn",
    description: Some("A command line tool to drive the MPI dynamic process management"),
    options: &[
        OptSpec::flag("--help", "Show this help message and exit"),
        OptSpec::value("-nU", "COMM_UNIVERSE.size", "Size of COMM_UNIVERSE"),
        OptSpec::value("-nW", "COMM_WORLD.size", "Size(s) of COMM_WORLD(s)").required(),
        OptSpec::flag("--wrapper", "Use a wrapper program around commands"),
        OptSpec::flag(
            "--propagate-errcodes",
            "Return with the highest error code from spawned processes",
        ),
        OptSpec::flag(
            "--check-spawn",
            "Verify whether it is possible to call MPI_Comm_spawn",
        ),
        OptSpec::flag(
            "--print-commands",
            "Print the spawn commands as a sequence of mpiexec commands without executing them",
        ),
    ],
    positional: Some(COMMAND),
};

/// Grammar of every segment after the first `:`.
pub static SUBSEQUENT: Grammar = Grammar {
    prog: "mpispawn additional commands",
    description: None,
    options: &[OptSpec::value("-nW", "COMM_WORLD.size", "Size of COMM_WORLD")],
    positional: Some(COMMAND),
};

/// Result of applying a [`Grammar`] to one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    flags: Vec<&'static str>,
    values: Vec<(&'static str, String)>,
    /// Tokens of the trailing positional (the command).
    pub positional: Vec<String>,
    /// Unrecognised tokens, in their original order.
    pub leftover: Vec<String>,
}

impl ParsedArgs {
    pub fn flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| *f == name)
    }

    /// Last value given for `name`; repeated options override earlier ones.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) fn as_str<S: AsRef<str>>(s: &S) -> &str {
    s.as_ref()
}

fn is_negative_number(tok: &str) -> bool {
    tok.strip_prefix('-').is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
    })
}

fn is_option_like(tok: &str) -> bool {
    tok.len() > 1 && tok.starts_with('-') && !is_negative_number(tok)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Run {
    NotStarted,
    Open,
    Closed,
}

impl Grammar {
    fn lookup(&self, name: &str) -> Option<&'static OptSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Render usage and option help in the usual `--help` layout.
    pub fn render_help(&self) -> String {
        let mut out = String::new();

        let mut usage = format!("usage: {}", self.prog);
        for opt in self.options {
            if opt.required {
                let _ = write!(usage, " {}", opt.invocation());
            } else {
                let _ = write!(usage, " [{}]", opt.invocation());
            }
        }
        if let Some(p) = &self.positional {
            let _ = write!(usage, " {m} [{m} ...]", m = p.metavar);
        }
        out.push_str(&usage);
        out.push('\n');

        if let Some(desc) = self.description {
            let _ = write!(out, "\n{desc}\n");
        }
        if let Some(p) = &self.positional {
            out.push_str("\npositional arguments:\n");
            push_help_line(&mut out, p.metavar, p.help);
        }
        if !self.options.is_empty() {
            out.push_str("\noptions:\n");
            for opt in self.options {
                push_help_line(&mut out, &opt.invocation(), opt.help);
            }
        }
        out
    }
}

const HELP_COLUMN: usize = 24;

fn push_help_line(out: &mut String, invocation: &str, help: &str) {
    let lead = format!("  {invocation}");
    if lead.len() + 2 > HELP_COLUMN {
        let _ = writeln!(out, "{lead}\n{:HELP_COLUMN$}{help}", "");
    } else {
        let _ = writeln!(out, "{lead:HELP_COLUMN$}{help}");
    }
}

/// Apply `grammar` to the tokens of one segment.
///
/// The positional takes the first uninterrupted run of non-option tokens. Unknown options and
/// positional tokens after that run are returned in [`ParsedArgs::leftover`]. Everything after
/// a literal `--` is treated as positional.
pub fn parse<S: AsRef<str>>(tokens: &[S], grammar: &Grammar) -> Result<ParsedArgs, CoreError> {
    let mut out = ParsedArgs::default();
    let mut run = Run::NotStarted;
    let mut literal = false;
    let mut iter = tokens.iter().map(as_str);

    while let Some(tok) = iter.next() {
        if !literal {
            if tok == "--" {
                literal = true;
                continue;
            }

            if let Some(spec) = grammar.lookup(tok) {
                if run == Run::Open {
                    run = Run::Closed;
                }
                match spec.kind {
                    OptKind::Flag => out.flags.push(spec.name),
                    OptKind::Value => {
                        let value = iter
                            .next()
                            .filter(|v| !is_option_like(v))
                            .ok_or(CoreError::MissingValue { arg: spec.name })?;
                        out.values.push((spec.name, value.to_string()));
                    }
                }
                continue;
            }

            if let Some((name, value)) = tok.split_once('=')
                && let Some(spec) = grammar.lookup(name)
                && spec.kind == OptKind::Value
            {
                if run == Run::Open {
                    run = Run::Closed;
                }
                out.values.push((spec.name, value.to_string()));
                continue;
            }

            if is_option_like(tok) {
                if run == Run::Open {
                    run = Run::Closed;
                }
                out.leftover.push(tok.to_string());
                continue;
            }
        }

        if grammar.positional.is_some() && run != Run::Closed {
            out.positional.push(tok.to_string());
            run = Run::Open;
        } else {
            out.leftover.push(tok.to_string());
        }
    }

    if let Some(p) = &grammar.positional
        && out.positional.is_empty()
    {
        return Err(CoreError::MissingArgument { arg: p.name });
    }
    for opt in grammar.options.iter().filter(|o| o.required) {
        if out.value(opt.name).is_none() && !out.flag(opt.name) {
            return Err(CoreError::MissingArgument { arg: opt.name });
        }
    }

    Ok(out)
}
