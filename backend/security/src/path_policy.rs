use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::PolicyViolation;

/// Directories no tool may operate on directly.
const SYSTEM_DIRECTORIES: &[&str] = &["/", "/bin", "/sbin", "/usr", "/etc", "/var", "/sys", "/proc"];

/// Expand a leading `~` to the user's home directory.
pub fn expand_user(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// Lexically normalise `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` above the root stays at the root.
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Expand `~`, anchor relative paths at `cwd`, and normalise.
pub fn resolve(path: &str, cwd: &Path) -> PathBuf {
    let expanded = expand_user(path.trim());
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    normalize(&absolute)
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

/// Decides whether a tool may touch a path.
///
/// An empty allow-list means unrestricted (system directories are still
/// refused). Allow-list matching is component-wise, so `/home/al` does not
/// admit `/home/alice`.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    allowed: Vec<PathBuf>,
}

impl PathPolicy {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cwd = current_dir();
        Self {
            allowed: allowed
                .into_iter()
                .filter(|s| !s.as_ref().trim().is_empty())
                .map(|s| resolve(s.as_ref(), &cwd))
                .collect(),
        }
    }

    pub fn allowed_directories(&self) -> &[PathBuf] {
        &self.allowed
    }

    /// Resolve `raw` and check it for any access.
    pub fn check(&self, raw: &str) -> Result<PathBuf, PolicyViolation> {
        if raw.trim().is_empty() {
            return Err(PolicyViolation::EmptyPath);
        }
        let resolved = resolve(raw, &current_dir());

        if SYSTEM_DIRECTORIES.iter().any(|d| resolved == Path::new(d)) {
            warn!(path = %resolved.display(), "Refused system directory");
            return Err(PolicyViolation::SystemDirectory(raw.to_string()));
        }

        if !self.allowed.is_empty() && !self.allowed.iter().any(|a| resolved.starts_with(a)) {
            warn!(path = %resolved.display(), "Refused path outside allow-list");
            return Err(PolicyViolation::OutsideAllowList(raw.to_string()));
        }

        Ok(resolved)
    }

    /// Like [`check`](Self::check), and additionally refuses the home
    /// directory itself.
    pub fn check_delete(&self, raw: &str) -> Result<PathBuf, PolicyViolation> {
        let resolved = self.check(raw)?;
        let home = dirs::home_dir().map(|h| normalize(&h));
        let protected = home.as_deref() == Some(resolved.as_path())
            || resolved == Path::new("/home")
            || resolved == Path::new("/Users");
        if protected {
            return Err(PolicyViolation::ProtectedPath(raw.to_string()));
        }
        Ok(resolved)
    }
}
