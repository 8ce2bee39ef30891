use crate::config::DEFAULT_MAX_LINE_LEN;
use crate::display::Display;
use crate::dispatch::HandlerTable;
use crate::editor::{Launcher, ProcessLauncher};
use crate::response::{Action, Response};
use crate::session::Session;
use crate::store::load_data_folder;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether the REPL keeps going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A kid-friendly shell: one session, driven line by line through a shared handler table.
///
/// Example
/// ```
/// use kidshell::Shell;
/// use kidshell::handlers::standard_table;
/// use kidshell::path::SandboxRoot;
/// use kidshell::response::Response;
/// use kidshell::session::Session;
/// use kidshell::store::MemoryConfigStore;
/// use std::sync::Arc;
///
/// let dir = tempfile::tempdir().unwrap();
/// let root = SandboxRoot::open(dir.path()).unwrap();
/// let session = Session::new(root, Box::new(MemoryConfigStore::default()));
/// let mut sh = Shell::new(Arc::new(standard_table().unwrap()), session);
/// assert_eq!(sh.dispatch("> 2 + 2"), Response::text("2 + 2 = 4"));
/// ```
pub struct Shell {
    table: Arc<HandlerTable>,
    session: Session,
    launcher: Box<dyn Launcher>,
    max_line_len: usize,
}

impl Shell {
    pub fn new(table: Arc<HandlerTable>, session: Session) -> Self {
        Self {
            table,
            session,
            launcher: Box::new(ProcessLauncher::from_env()),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Normalize one raw line and run it through the handler table.
    pub fn dispatch(&mut self, line: &str) -> Response {
        let line = normalize(line);
        if line.chars().count() > self.max_line_len {
            warn!(len = line.len(), "line too long");
            return Response::error("That line is too long for me.");
        }
        self.table.dispatch(line, &mut self.session)
    }

    /// Greet, bring back the saved session when `restore` is set, and pick up the lessons
    /// in the data folder. Problems are shown and the shell starts anyway.
    pub fn start(&mut self, restore: bool, display: &mut dyn Display) -> anyhow::Result<()> {
        display.show(&Response::text("Hi! Type help to see what I can do."))?;
        if restore {
            if let Err(e) = self.session.restore() {
                warn!(error = %e, "saved session ignored");
                display.show(&Response::error(format!("{} Starting fresh.", e.user_message())))?;
            }
        }
        match load_data_folder(self.session.root()) {
            Ok(lesson) if !lesson.is_empty() => {
                info!(words = lesson.len(), "lessons loaded from the data folder");
                self.session.set_lesson(lesson);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "data folder not scanned"),
        }
        Ok(())
    }

    /// Dispatch a line, carry out any action it asks for and show the result.
    pub fn run_line(&mut self, line: &str, display: &mut dyn Display) -> anyhow::Result<Flow> {
        let response = self.dispatch(line);
        display.show(&response)?;
        match response {
            Response::Action(Action::Exit) => return Ok(Flow::Exit),
            Response::Action(Action::Edit { editor, path }) => {
                match self.launcher.launch(editor, &path) {
                    Ok(0) => {}
                    Ok(code) => {
                        warn!(code, %editor, "editor exited with an error");
                        display.show(&Response::error(format!("{} stopped with an error.", editor)))?;
                    }
                    Err(e) => {
                        warn!(error = %e, "editor launch failed");
                        display.show(&Response::error(format!("I couldn't open {}.", editor)))?;
                    }
                }
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }

    /// Save the session; failures are reported, never fatal.
    pub fn finish(&mut self, display: &mut dyn Display) -> anyhow::Result<()> {
        if let Err(e) = self.session.save() {
            warn!(error = %e, "session not saved");
            display.show(&Response::error(e.user_message()))?;
        }
        Ok(())
    }

    /// Interactive loop on the terminal until `bye`, Ctrl-C or Ctrl-D.
    pub fn repl(&mut self, display: &mut dyn Display) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        info!("repl started");

        loop {
            match rl.readline("> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if self.run_line(&line, display)? == Flow::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    display.show(&Response::Action(Action::Exit))?;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.finish(display)
    }
}

/// Trim a raw line and strip prompt markers pasted along with it (`> 1 + 1`).
pub fn normalize(line: &str) -> &str {
    let mut line = line.trim();
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.trim_start();
    }
    line
}
