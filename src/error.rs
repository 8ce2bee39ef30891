//! Error taxonomy shared by the evaluator, the path validator, storage and the dispatcher.
//!
//! Every error carries at most the token the user typed. Absolute paths, roots and
//! internal identifiers never end up in a message, because [`user_message`] output is
//! shown verbatim to children.
//!
//! [`user_message`]: EvalError::user_message

/// Errors produced while evaluating an arithmetic expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Malformed syntax; holds the 0-based character position of the offending token.
    #[error("syntax error at position {0}")]
    SyntaxError(usize),

    /// An identifier that is neither a variable nor a member of the allowed symbol set.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("division by zero")]
    DivisionByZero,

    /// A value left the finite, bounded range of numbers the shell deals in.
    #[error("number too large")]
    Overflow,

    #[error("empty expression")]
    Empty,

    #[error("expression too long")]
    TooLong,

    #[error("expression nested too deeply")]
    TooDeep,

    #[error("{name} expects {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: String,
        found: usize,
    },

    /// A function was called outside the range of inputs it is defined for.
    #[error("{0} cannot work with that number")]
    Domain(String),
}

impl EvalError {
    /// Short, non-technical text suitable for a child.
    pub fn user_message(&self) -> String {
        match self {
            EvalError::SyntaxError(pos) => {
                format!("I couldn't read that math problem (look near spot {}).", pos + 1)
            }
            EvalError::UnknownSymbol(name) => format!("I don't know what '{}' means.", name),
            EvalError::DivisionByZero => "You can't divide by zero!".to_string(),
            EvalError::Overflow => "That number is too big for me.".to_string(),
            EvalError::Empty => "There is no math problem there.".to_string(),
            EvalError::TooLong => "That math problem is too long.".to_string(),
            EvalError::TooDeep => "That math problem has too many brackets.".to_string(),
            EvalError::WrongArity {
                name,
                expected,
                found,
            } => format!(
                "{} needs {} number(s), but I got {}.",
                name, expected, found
            ),
            EvalError::Domain(name) => format!("{} doesn't work with that number.", name),
        }
    }

    /// Stable taxonomy name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::SyntaxError(_) => "SyntaxError",
            EvalError::UnknownSymbol(_) => "UnknownSymbol",
            EvalError::DivisionByZero => "DivisionByZero",
            EvalError::Overflow => "Overflow",
            EvalError::Empty => "Empty",
            EvalError::TooLong => "TooLong",
            EvalError::TooDeep => "TooDeep",
            EvalError::WrongArity { .. } => "WrongArity",
            EvalError::Domain(_) => "Domain",
        }
    }
}

/// Errors produced by the two-layer filename validator and by storage lookups
/// that go through a validated path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty file name")]
    Empty,

    /// Rejected by the syntactic layer before any filesystem access.
    #[error("invalid file name: {0}")]
    Traversal(String),

    /// Resolved outside the sandbox root (symlinks or other resolution tricks).
    #[error("file name escapes the data folder: {0}")]
    EscapesRoot(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The sandbox root itself could not be opened.
    #[error("data folder is not available")]
    RootUnavailable,
}

impl PathError {
    pub fn user_message(&self) -> String {
        match self {
            PathError::Empty => "Please give me a file name.".to_string(),
            PathError::Traversal(name) => format!(
                "Invalid file name '{}'. Use a plain name like lesson1.json.",
                name
            ),
            PathError::EscapesRoot(name) => {
                format!("'{}' is outside your data folder.", name)
            }
            PathError::NotFound(name) => format!("I can't find '{}'.", name),
            PathError::PermissionDenied(name) => format!("I'm not allowed to open '{}'.", name),
            PathError::RootUnavailable => "Your data folder isn't available.".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PathError::Empty => "Empty",
            PathError::Traversal(_) => "Traversal",
            PathError::EscapesRoot(_) => "EscapesRoot",
            PathError::NotFound(_) => "NotFound",
            PathError::PermissionDenied(_) => "PermissionDenied",
            PathError::RootUnavailable => "RootUnavailable",
        }
    }
}

/// Errors reported by the configuration/lesson storage collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Transient condition (another session holds the lock); the caller may retry later.
    #[error("storage is busy")]
    Unavailable,

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("storage i/o error: {0}")]
    Io(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("file too large")]
    TooLarge,
}

impl StoreError {
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Unavailable => {
                "Saving is busy right now. Try again in a moment.".to_string()
            }
            StoreError::Path(e) => e.user_message(),
            StoreError::Io(_) => "I couldn't read or write that file.".to_string(),
            StoreError::Malformed(_) => "That file doesn't look right inside.".to_string(),
            StoreError::TooLarge => "That file is too big.".to_string(),
        }
    }
}

/// Errors from building or running the handler table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The table was built without an always-matching fallback. Fatal at startup.
    #[error("handler table has no fallback handler")]
    MissingFallback,

    /// No handler claimed the line. Unreachable while a fallback is installed.
    #[error("no handler matched the input")]
    NoHandlerMatched,
}
