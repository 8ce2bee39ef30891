//! Path security validation for user-supplied file names.
//!
//! A name typed by a user only reaches storage or the editor as a [`ValidatedPath`], and
//! [`validate`] is the only function that can build one. Validation happens in two layers:
//!
//! 1. a syntactic check with no filesystem access, which rejects parent components, absolute
//!    paths, drive letters and similar (`PathError::Traversal`);
//! 2. resolution against the canonical sandbox root, which catches symlinks that lead outside
//!    of it (`PathError::EscapesRoot`).

use crate::error::PathError;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

static DRIVE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]:").unwrap());

/// A directory every validated path must stay inside.
///
/// The directory is canonicalized once when the handle is opened, so later comparisons are
/// made against the real location and not against whatever spelling the caller used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    canonical: PathBuf,
}

impl SandboxRoot {
    /// Open an existing directory as a sandbox root.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PathError> {
        let canonical = fs::canonicalize(dir.as_ref()).map_err(|_| PathError::RootUnavailable)?;
        if !canonical.is_dir() {
            return Err(PathError::RootUnavailable);
        }
        Ok(Self { canonical })
    }

    /// Create the directory (and parents) if needed, then open it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, PathError> {
        fs::create_dir_all(dir.as_ref()).map_err(|_| PathError::RootUnavailable)?;
        Self::open(dir)
    }

    pub fn path(&self) -> &Path {
        &self.canonical
    }
}

/// A file name that passed both validation layers.
///
/// There is no public constructor; holding one proves the name resolved inside its
/// [`SandboxRoot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    resolved: PathBuf,
    display: String,
}

impl ValidatedPath {
    /// Absolute location, for storage and editor collaborators only.
    pub fn as_path(&self) -> &Path {
        &self.resolved
    }

    /// The name relative to the sandbox root, safe to show to users.
    pub fn display_name(&self) -> &str {
        &self.display
    }

    pub fn exists(&self) -> bool {
        self.resolved.exists()
    }
}

impl std::fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

impl PathError {
    /// Classify an I/O failure on an already validated path. Only the user-facing name is
    /// kept; kinds without a counterpart in the taxonomy give `None`.
    pub fn from_io(err: &io::Error, path: &ValidatedPath) -> Option<PathError> {
        match err.kind() {
            io::ErrorKind::NotFound => Some(PathError::NotFound(path.display.clone())),
            io::ErrorKind::PermissionDenied => {
                Some(PathError::PermissionDenied(path.display.clone()))
            }
            _ => None,
        }
    }
}

/// Validate `name` and resolve it inside `root`.
///
/// The target does not need to exist, so the result can be used to create files. Existing
/// symlinks are followed during resolution and must still end up inside the root.
pub fn validate(name: &str, root: &SandboxRoot) -> Result<ValidatedPath, PathError> {
    let result = check_syntax(name).and_then(|components| {
        let resolved = resolve_within(name, &components, root)?;
        Ok(ValidatedPath {
            resolved,
            display: components.join("/"),
        })
    });
    if let Err(e) = &result {
        warn!(kind = e.kind(), name, "rejected file name");
    }
    result
}

/// First layer: reject anything that is not a plain relative name. Returns the normal
/// components; `\` counts as a separator on every platform.
fn check_syntax(name: &str) -> Result<Vec<&str>, PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    let traversal = || PathError::Traversal(name.to_string());

    if name.contains('\0') || name.contains("..") {
        return Err(traversal());
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(traversal());
    }
    // Drive letters, UNC/verbatim prefixes and NTFS alternate data streams all need a colon.
    if DRIVE_PREFIX.is_match(name) || name.contains(':') {
        return Err(traversal());
    }
    let as_path = Path::new(name);
    if as_path.is_absolute() || as_path.has_root() {
        return Err(traversal());
    }

    let components: Vec<&str> = name
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    if components.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(components)
}

/// Second layer: resolve against the canonical root and check containment.
fn resolve_within(name: &str, components: &[&str], root: &SandboxRoot) -> Result<PathBuf, PathError> {
    let escapes = || PathError::EscapesRoot(name.to_string());

    // Walk back from the full path to the deepest ancestor that exists, canonicalize that,
    // and re-append the parts that do not exist yet.
    let mut resolved = None;
    for existing in (0..=components.len()).rev() {
        let prefix = components[..existing]
            .iter()
            .fold(root.canonical.clone(), |acc, c| acc.join(c));
        match fs::canonicalize(&prefix) {
            Ok(canonical) => {
                resolved = Some(
                    components[existing..]
                        .iter()
                        .fold(canonical, |acc, c| acc.join(c)),
                );
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(PathError::PermissionDenied(name.to_string()));
            }
            Err(_) => {
                // The entry exists but cannot be resolved: a dangling symlink. Writing through
                // it would create its target, wherever that is.
                if fs::symlink_metadata(&prefix).is_ok() {
                    return Err(escapes());
                }
            }
        }
    }

    let resolved = resolved.ok_or(PathError::RootUnavailable)?;
    if resolved.starts_with(&root.canonical) {
        Ok(resolved)
    } else {
        Err(escapes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, SandboxRoot) {
        let temp = TempDir::new().unwrap();
        let root = SandboxRoot::open(temp.path()).unwrap();
        (temp, root)
    }

    #[test]
    fn test_plain_name_resolves_under_root() {
        let (_temp, root) = sandbox();
        let validated = validate("lesson1.json", &root).unwrap();
        assert_eq!(validated.as_path(), root.path().join("lesson1.json"));
        assert_eq!(validated.display_name(), "lesson1.json");
        assert!(!validated.exists());
    }

    #[test]
    fn test_existing_file_in_subdir() {
        let (_temp, root) = sandbox();
        fs::create_dir(root.path().join("sub")).unwrap();
        fs::write(root.path().join("sub").join("a.json"), "{}").unwrap();

        let validated = validate("sub/./a.json", &root).unwrap();
        assert_eq!(validated.as_path(), root.path().join("sub").join("a.json"));
        assert_eq!(validated.display_name(), "sub/a.json");
        assert!(validated.exists());
    }

    #[test]
    fn test_backslash_is_a_separator() {
        let (_temp, root) = sandbox();
        let validated = validate("sub\\b.json", &root).unwrap();
        assert_eq!(validated.as_path(), root.path().join("sub").join("b.json"));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_temp, root) = sandbox();
        for name in [
            "../../etc/passwd",
            "../outside.json",
            "subdir/../../escape.json",
            "normal/../../../etc/hosts",
            "a..b",
            "..",
            "/etc/passwd",
            "/root/.ssh/id_rsa",
            "\\windows\\system32\\config.sys",
            "\\\\server\\share\\x",
            "C:\\Windows\\win.ini",
            "c:relative.txt",
            "file.txt:stream",
            "bad\0name",
        ] {
            assert_eq!(
                validate(name, &root),
                Err(PathError::Traversal(name.to_string())),
                "name {:?}",
                name
            );
        }
    }

    #[test]
    fn test_empty_names() {
        let (_temp, root) = sandbox();
        assert_eq!(validate("", &root), Err(PathError::Empty));
        assert_eq!(validate(".", &root), Err(PathError::Empty));
        assert_eq!(validate("./", &root), Err(PathError::Empty));
    }

    #[test]
    fn test_traversal_never_touches_storage() {
        // The root directory is gone; syntactic rejection must still win.
        let (temp, root) = sandbox();
        drop(temp);
        assert!(matches!(
            validate("../x", &root),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn test_every_accepted_name_stays_inside_root() {
        let (_temp, root) = sandbox();
        fs::create_dir_all(root.path().join("a").join("b")).unwrap();
        for name in [
            "x",
            "a/x",
            "a/b/x.json",
            "./a/./b/",
            "a//b",
            "new/dir/file.txt",
            "~/x",
            "a b.json",
        ] {
            let validated = validate(name, &root).unwrap();
            assert!(
                validated.as_path().starts_with(root.path()),
                "{:?} resolved to {:?}",
                name,
                validated.as_path()
            );
        }
    }

    #[test]
    fn test_root_must_exist() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            SandboxRoot::open(temp.path().join("missing")),
            Err(PathError::RootUnavailable)
        );
        let created = SandboxRoot::create(temp.path().join("made").join("here")).unwrap();
        assert!(created.path().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_blocked() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let outside = temp.path().join("outside");
        fs::create_dir(&data).unwrap();
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.json"), "{}").unwrap();
        std::os::unix::fs::symlink(&outside, data.join("escape_link")).unwrap();

        let root = SandboxRoot::open(&data).unwrap();
        assert_eq!(
            validate("escape_link/secret.json", &root),
            Err(PathError::EscapesRoot("escape_link/secret.json".to_string()))
        );
        assert_eq!(
            validate("escape_link/new.json", &root),
            Err(PathError::EscapesRoot("escape_link/new.json".to_string()))
        );
        assert_eq!(
            validate("escape_link", &root),
            Err(PathError::EscapesRoot("escape_link".to_string()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_blocked() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        std::os::unix::fs::symlink(temp.path().join("nowhere.json"), data.join("link.json"))
            .unwrap();

        let root = SandboxRoot::open(&data).unwrap();
        assert_eq!(
            validate("link.json", &root),
            Err(PathError::EscapesRoot("link.json".to_string()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_allowed() {
        let (_temp, root) = sandbox();
        fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();

        let validated = validate("alias/x.json", &root).unwrap();
        assert_eq!(validated.as_path(), root.path().join("real").join("x.json"));
    }

    #[cfg(windows)]
    #[test]
    fn test_windows_prefixes_rejected() {
        let (_temp, root) = sandbox();
        for name in ["\\\\?\\C:\\x", "D:x", "\\\\.\\pipe\\x"] {
            assert!(matches!(validate(name, &root), Err(PathError::Traversal(_))));
        }
    }
}
