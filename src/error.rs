use std::error;
use std::fmt;

/// Which resource budget aborted a match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LimitKind {
    /// The match-steps budget (`PCRE2_ERROR_MATCHLIMIT`).
    Match,
    /// The backtracking-depth budget (`PCRE2_ERROR_DEPTHLIMIT`).
    Depth,
    /// The heap budget in kibibytes (`PCRE2_ERROR_HEAPLIMIT`).
    Heap,
}

/// An error that can occur while compiling a pattern or driving a matcher.
///
/// No-match is never an error: search operations report it as `Ok(false)`
/// or `Ok(None)`.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The kind of an error.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pattern failed to compile. Carries the PCRE2 message and the
    /// offset into the pattern where compilation failed.
    Compile { message: String, offset: usize },
    /// A match was aborted because a configured resource budget was
    /// exhausted. Carries the limit kind and the raw PCRE2 error code.
    Limit { limit: LimitKind, code: i32 },
    /// PCRE2 reported an error this crate does not model.
    Engine { code: i32 },
    /// A positional accessor or `append_replacement` was invoked while the
    /// matcher holds no current match.
    NoMatchAvailable,
    /// A group index was out of range or a group name is unknown.
    NoSuchGroup { group: String },
    /// A replacement template is malformed. Carries a description and the
    /// offset of the offending token within the template.
    Replacement { message: String, offset: usize },
    /// Region bounds fell outside the subject.
    Region { start: usize, end: usize, len: usize },
    /// A search offset fell outside the current region.
    Offset { offset: usize, start: usize, end: usize },
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error { kind }
    }

    pub(crate) fn compile(message: String, offset: usize) -> Error {
        Error::new(ErrorKind::Compile { message, offset })
    }

    pub(crate) fn no_match() -> Error {
        Error::new(ErrorKind::NoMatchAvailable)
    }

    pub(crate) fn no_such_group(group: impl Into<String>) -> Error {
        Error::new(ErrorKind::NoSuchGroup { group: group.into() })
    }

    pub(crate) fn replacement(message: impl Into<String>, offset: usize) -> Error {
        Error::new(ErrorKind::Replacement { message: message.into(), offset })
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns true if a resource budget aborted the match.
    pub fn is_limit(&self) -> bool {
        matches!(self.kind, ErrorKind::Limit { .. })
    }

    /// The raw PCRE2 error code behind a limit or engine error.
    pub fn limit_code(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Limit { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The pattern offset of a compile or replacement error.
    pub fn offset(&self) -> Option<usize> {
        match self.kind {
            ErrorKind::Compile { offset, .. } => Some(offset),
            ErrorKind::Replacement { offset, .. } => Some(offset),
            _ => None,
        }
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Compile { message, offset } => {
                write!(f, "pattern compilation failed at offset {}: {}", offset, message)
            }
            ErrorKind::Limit { limit, code } => {
                let what = match limit {
                    LimitKind::Match => "match limit",
                    LimitKind::Depth => "depth limit",
                    LimitKind::Heap => "heap limit",
                };
                write!(f, "{} exceeded (PCRE2 error {})", what, code)
            }
            ErrorKind::Engine { code } => {
                write!(f, "PCRE2 matching error {}", code)
            }
            ErrorKind::NoMatchAvailable => {
                write!(f, "no match available")
            }
            ErrorKind::NoSuchGroup { group } => {
                write!(f, "no group {}", group)
            }
            ErrorKind::Replacement { message, offset } => {
                write!(f, "malformed replacement at offset {}: {}", offset, message)
            }
            ErrorKind::Region { start, end, len } => {
                write!(f, "region {}..{} out of bounds for subject of length {}", start, end, len)
            }
            ErrorKind::Offset { offset, start, end } => {
                write!(f, "offset {} outside of region {}..{}", offset, start, end)
            }
        }
    }
}
