use crate::editor::Editor;
use crate::path::ValidatedPath;

/// What a handler produced for one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Text(String),
    /// A user-facing error message; never carries internal details.
    Error(String),
    Action(Action),
}

/// Side effects the shell performs on behalf of a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Edit { editor: Editor, path: ValidatedPath },
    Exit,
}

impl Response {
    pub fn text(s: impl Into<String>) -> Self {
        Response::Text(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Response::Error(s.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// The message of a `Text` or `Error` response.
    pub fn message(&self) -> Option<&str> {
        match self {
            Response::Text(s) | Response::Error(s) => Some(s),
            Response::Action(_) => None,
        }
    }
}
