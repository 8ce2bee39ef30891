use crate::path::ValidatedPath;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

pub type ExitCode = i32;

/// Editors the shell is allowed to start. Anything else is refused before a process exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Editor {
    Nano,
    Vim,
    Vi,
    Emacs,
    Notepad,
}

impl Editor {
    pub const ALL: [Editor; 5] = [
        Editor::Nano,
        Editor::Vim,
        Editor::Vi,
        Editor::Emacs,
        Editor::Notepad,
    ];

    pub fn from_name(name: &str) -> Option<Editor> {
        let name = name.trim();
        Editor::ALL
            .into_iter()
            .find(|e| e.program().eq_ignore_ascii_case(name))
    }

    /// Executable name looked up on `PATH`.
    pub fn program(self) -> &'static str {
        match self {
            Editor::Nano => "nano",
            Editor::Vim => "vim",
            Editor::Vi => "vi",
            Editor::Emacs => "emacs",
            Editor::Notepad => "notepad",
        }
    }

    pub fn resolve(self, search_paths: &OsStr) -> Option<PathBuf> {
        find_command_path(search_paths, OsStr::new(self.program()))
    }
}

impl Default for Editor {
    fn default() -> Self {
        if cfg!(windows) {
            Editor::Notepad
        } else {
            Editor::Nano
        }
    }
}

impl fmt::Display for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Starts an editor on a file and waits for it to finish.
pub trait Launcher {
    fn launch(&self, editor: Editor, path: &ValidatedPath) -> Result<ExitCode>;
}

/// Launches editors as child processes, found by searching `PATH`.
///
/// The file is passed as a single argument to the program itself; no shell is involved.
pub struct ProcessLauncher {
    search_paths: OsString,
}

impl ProcessLauncher {
    pub fn new(search_paths: OsString) -> Self {
        Self { search_paths }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PATH").unwrap_or_default())
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, editor: Editor, path: &ValidatedPath) -> Result<ExitCode> {
        let program = editor
            .resolve(&self.search_paths)
            .with_context(|| format!("{} is not installed", editor))?;
        let exit_status = std::process::Command::new(&program)
            .arg(path.as_path())
            .status()
            .with_context(|| format!("can't start {}", editor))?;
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Find a program by name in the directories of `search_paths` (a `PATH` value).
///
/// Only bare names are searched; anything with a separator gives `None`, so a program can
/// never be picked up from the current directory. On Windows the `.exe` suffix is tried too.
pub fn find_command_path(search_paths: &OsStr, program: &OsStr) -> Option<PathBuf> {
    let as_path = std::path::Path::new(program);
    let mut components = as_path.components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(name)), None) => find_in_path(search_paths, name),
        _ => None,
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if path.is_file() {
            return Some(path);
        }
        if cfg!(windows) {
            let exe = path.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}
