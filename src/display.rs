use crate::response::{Action, Response};
use std::io::{self, Write};

/// Renders responses for the user.
pub trait Display {
    fn show(&mut self, response: &Response) -> io::Result<()>;
}

/// Writes responses to a terminal (or any writer), one emoji-prefixed block per response.
pub struct TerminalDisplay<W: Write> {
    out: W,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn show(&mut self, response: &Response) -> io::Result<()> {
        match response {
            Response::Text(text) => writeln!(self.out, "🙌 {}", text)?,
            Response::Error(text) => writeln!(self.out, "🙈 {}", text)?,
            Response::Action(Action::Exit) => writeln!(self.out, "👋 Bye!")?,
            Response::Action(Action::Edit { editor, path }) => {
                writeln!(self.out, "✏️ Opening {} with {}...", path, editor)?
            }
        }
        self.out.flush()
    }
}
