use crate::editor::Editor;
use crate::eval::DEFAULT_MAX_EXPRESSION_LEN;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
/// Environment variable naming the home folder when `--home` is not given.
pub const HOME_ENV: &str = "KIDSHELL_HOME";
pub const DEFAULT_MAX_LINE_LEN: usize = 2000;

/// Largest `max_expression_len` a config file may ask for.
const EXPRESSION_LEN_CEILING: usize = 4096;

/// Settings read from `<home>/config.json`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sandbox root; `<home>/data` when unset.
    pub data_dir: Option<PathBuf>,
    /// Default editor for `edit`; must be on the allowlist.
    pub editor: Option<String>,
    pub max_expression_len: usize,
    pub max_line_len: usize,
    /// Load the saved session at startup.
    pub restore_session: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            editor: None,
            max_expression_len: DEFAULT_MAX_EXPRESSION_LEN,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            restore_session: true,
        }
    }
}

impl Settings {
    /// Load `config.json` from `home`. A missing file gives the defaults.
    pub fn load(home: &Path) -> Result<Settings> {
        let path = home.join(CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("can't read {}", path.display()));
            }
        };
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("malformed settings in {}", path.display()))?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<()> {
        if self.max_expression_len == 0 || self.max_expression_len > EXPRESSION_LEN_CEILING {
            bail!(
                "max_expression_len must be between 1 and {}",
                EXPRESSION_LEN_CEILING
            );
        }
        if self.max_line_len == 0 {
            bail!("max_line_len must be at least 1");
        }
        self.editor()?;
        Ok(())
    }

    pub fn data_dir(&self, home: &Path) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| home.join("data"))
    }

    pub fn editor(&self) -> Result<Editor> {
        match &self.editor {
            None => Ok(Editor::default()),
            Some(name) => Editor::from_name(name)
                .with_context(|| format!("editor '{}' is not one of nano, vim, vi, emacs, notepad", name)),
        }
    }
}

/// Home folder: the `--home` flag, else `$KIDSHELL_HOME`, else `~/.kidshell`.
pub fn home_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    resolve_home(flag, std::env::var_os(HOME_ENV), dirs::home_dir())
        .context("can't find a home folder; pass --home")
}

fn resolve_home(
    flag: Option<PathBuf>,
    env: Option<OsString>,
    user_home: Option<PathBuf>,
) -> Option<PathBuf> {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or_else(|| user_home.map(|h| h.join(".kidshell")))
}
