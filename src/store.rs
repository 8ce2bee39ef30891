//! Persistent state and lesson data.
//!
//! All file access here goes through a [`ValidatedPath`]; nothing in this module accepts a
//! raw path string.

use crate::error::{PathError, StoreError};
use crate::eval::Variables;
use crate::path::{SandboxRoot, ValidatedPath, validate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const SESSION_STATE_FILE: &str = "session_state.json";
const LOCK_FILE: &str = "session_state.json.lock";

/// A lock file older than this was left by a crashed writer and is taken over.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

/// Largest lesson file accepted, in bytes.
pub const MAX_LESSON_BYTES: u64 = 1024 * 1024;
/// Deepest object/array nesting accepted in a lesson file.
pub const MAX_LESSON_DEPTH: usize = 10;

/// What survives between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub variables: Variables,
    pub last_answer: Option<f64>,
    pub problems_solved: u32,
    pub streak: u32,
}

/// Storage collaborator for [`ConfigData`].
pub trait ConfigStore {
    fn read(&self) -> Result<ConfigData, StoreError>;
    fn write(&self, data: &ConfigData) -> Result<(), StoreError>;
}

/// Keeps [`ConfigData`] as JSON in `session_state.json` inside the sandbox root.
///
/// Writes go to a temporary file that is then renamed over the real one, so a crash never
/// leaves half a file behind. A `.lock` file marks a write in progress; while it exists
/// other writers get [`StoreError::Unavailable`]. A lock older than [`STALE_LOCK_AGE`] is
/// removed and the write goes ahead; deleting `session_state.json.lock` by hand does the same.
pub struct FileConfigStore {
    state: ValidatedPath,
    lock: ValidatedPath,
}

impl FileConfigStore {
    pub fn open(root: &SandboxRoot) -> Result<Self, StoreError> {
        Ok(Self {
            state: validate(SESSION_STATE_FILE, root)?,
            lock: validate(LOCK_FILE, root)?,
        })
    }

    fn temp_path(&self) -> PathBuf {
        self.state.as_path().with_extension("json.tmp")
    }
}

impl ConfigStore for FileConfigStore {
    fn read(&self) -> Result<ConfigData, StoreError> {
        let content = match fs::read_to_string(self.state.as_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no saved session, starting fresh");
                return Ok(ConfigData::default());
            }
            Err(e) => return Err(io_error(e, &self.state)),
        };
        serde_json::from_str(&content).map_err(|e| {
            warn!(error = %e, "saved session is malformed");
            StoreError::Malformed(e.to_string())
        })
    }

    fn write(&self, data: &ConfigData) -> Result<(), StoreError> {
        let _lock = LockGuard::acquire(&self.lock)?;

        let json =
            serde_json::to_string_pretty(data).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let temp = self.temp_path();
        let result = fs::write(&temp, json).and_then(|_| fs::rename(&temp, self.state.as_path()));
        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(io_error(e, &self.state));
        }
        debug!(file = self.state.display_name(), "session saved");
        Ok(())
    }
}

/// Removes the lock file when dropped.
struct LockGuard<'a> {
    path: &'a ValidatedPath,
}

impl<'a> LockGuard<'a> {
    fn acquire(path: &'a ValidatedPath) -> Result<Self, StoreError> {
        match Self::create(path) {
            Err(StoreError::Unavailable) if is_stale(path) => {
                warn!(file = path.display_name(), "taking over a stale lock");
                let _ = fs::remove_file(path.as_path());
                Self::create(path)
            }
            other => other,
        }
    }

    fn create(path: &'a ValidatedPath) -> Result<Self, StoreError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_path())
        {
            Ok(_) => Ok(Self { path }),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::WouldBlock
                ) =>
            {
                warn!("session store is locked");
                Err(StoreError::Unavailable)
            }
            Err(e) => Err(io_error(e, path)),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path.as_path());
    }
}

fn is_stale(lock: &ValidatedPath) -> bool {
    fs::metadata(lock.as_path())
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// In-process store, for embedding the shell without touching the disk.
#[derive(Default)]
pub struct MemoryConfigStore {
    data: Mutex<ConfigData>,
}

impl MemoryConfigStore {
    pub fn new(data: ConfigData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read(&self) -> Result<ConfigData, StoreError> {
        self.data
            .lock()
            .map(|d| d.clone())
            .map_err(|_| StoreError::Unavailable)
    }

    fn write(&self, data: &ConfigData) -> Result<(), StoreError> {
        let mut guard = self.data.lock().map_err(|_| StoreError::Unavailable)?;
        *guard = data.clone();
        Ok(())
    }
}

fn io_error(err: io::Error, path: &ValidatedPath) -> StoreError {
    if err.kind() == io::ErrorKind::WouldBlock {
        return StoreError::Unavailable;
    }
    match PathError::from_io(&err, path) {
        Some(e) => StoreError::Path(e),
        None => StoreError::Io(err.kind().to_string()),
    }
}

/// Lesson data: words a child can type, mapped to what the shell answers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lesson {
    name: String,
    entries: BTreeMap<String, String>,
}

impl Lesson {
    pub fn new(name: impl Into<String>, entries: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add the entries of `other`; its values win on duplicate keys.
    pub fn merge(&mut self, other: Lesson) {
        self.entries.extend(other.entries);
    }

    /// Exact key first, then the first key that matches ignoring case.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.entries.get(key) {
            return Some(v);
        }
        let lower = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| k.to_lowercase() == lower)
            .map(|(_, v)| v.as_str())
    }
}

/// Load a lesson file: a JSON object of at most [`MAX_LESSON_BYTES`] bytes and
/// [`MAX_LESSON_DEPTH`] levels of nesting. String values are shown as they are, anything
/// else as compact JSON. Blank keys are dropped.
pub fn load_lesson(path: &ValidatedPath) -> Result<Lesson, StoreError> {
    let file = File::open(path.as_path()).map_err(|e| io_error(e, path))?;
    let size = file.metadata().map_err(|e| io_error(e, path))?.len();
    if size > MAX_LESSON_BYTES {
        return Err(StoreError::TooLarge);
    }

    let mut bytes = Vec::new();
    file.take(MAX_LESSON_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| io_error(e, path))?;
    if bytes.len() as u64 > MAX_LESSON_BYTES {
        return Err(StoreError::TooLarge);
    }

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))?;
    check_depth(&value, 0)?;
    let Value::Object(map) = value else {
        return Err(StoreError::Malformed("expected a JSON object".to_string()));
    };

    let entries = map
        .into_iter()
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect();
    debug!(file = path.display_name(), "lesson loaded");
    Ok(Lesson::new(path.display_name(), entries))
}

/// Every `*.json` lesson directly inside the sandbox root, merged in file name order.
///
/// Files that fail to load are skipped with a warning; only an unreadable folder is an
/// error.
pub fn load_data_folder(root: &SandboxRoot) -> Result<Lesson, StoreError> {
    let mut names: Vec<String> = fs::read_dir(root.path())
        .map_err(|e| StoreError::Io(e.kind().to_string()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".json") && name != SESSION_STATE_FILE)
        .collect();
    names.sort();

    let mut merged = Lesson::new("data folder", BTreeMap::new());
    for name in names {
        let lesson = validate(&name, root)
            .map_err(StoreError::from)
            .and_then(|path| load_lesson(&path));
        match lesson {
            Ok(lesson) => merged.merge(lesson),
            Err(e) => warn!(file = %name, error = %e, "lesson file skipped"),
        }
    }
    Ok(merged)
}

fn check_depth(value: &Value, depth: usize) -> Result<(), StoreError> {
    if depth > MAX_LESSON_DEPTH {
        return Err(StoreError::Malformed("nesting too deep".to_string()));
    }
    match value {
        Value::Object(map) => map.values().try_for_each(|v| check_depth(v, depth + 1)),
        Value::Array(items) => items.iter().try_for_each(|v| check_depth(v, depth + 1)),
        _ => Ok(()),
    }
}
