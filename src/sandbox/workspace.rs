use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::Utc;

use crate::error::{Result, SandboxError};

// Workspace directory permissions
#[cfg(unix)]
const WORKSPACE_PERMISSIONS: u32 = 0o700;

const WORKSPACE_PREFIX: &str = "exec_";

// Attempts before giving up on finding an unused directory name
const MAX_CREATE_ATTEMPTS: u32 = 16;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Ephemeral directory owned by exactly one evaluation
///
/// The directory and everything in it is removed when the value is dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Creates a uniquely named directory under `root`
    ///
    /// `root` itself may be shared between concurrent evaluations and is
    /// created on demand.
    pub fn create(root: &Path) -> Result<Self> {
        let workspace_error = |path: &Path, source| SandboxError::Workspace {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(root).map_err(|e| workspace_error(root, e))?;

        let mut attempts = 0;
        let dir = loop {
            let candidate = root.join(unique_name());
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e)
                    if e.kind() == std::io::ErrorKind::AlreadyExists
                        && attempts < MAX_CREATE_ATTEMPTS =>
                {
                    attempts += 1;
                }
                Err(e) => return Err(workspace_error(&candidate, e)),
            }
        };

        // From here on the directory is cleaned up by `Drop`
        let workspace = Self { dir };
        restrict_to_owner(&workspace.dir).map_err(|e| workspace_error(&workspace.dir, e))?;

        log::debug!("Created workspace {}", workspace.dir.display());
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes `contents` to `name` inside the workspace
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|source| SandboxError::SourceWrite {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("Removed workspace {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove workspace {}: {e}", self.dir.display()),
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(WORKSPACE_PERMISSIONS))
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `exec_<utc timestamp>_<pid>_<sequence>`
fn unique_name() -> String {
    format!(
        "{WORKSPACE_PREFIX}{}_{}_{}",
        Utc::now().format("%Y%m%dT%H%M%S%.9f"),
        std::process::id(),
        NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Removes workspace directories under `root` last modified at least
/// `max_age` ago, returning how many were removed
///
/// Entries that do not look like workspaces are left alone.
pub fn sweep_stale(root: &Path, max_age: Duration) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let is_workspace = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(WORKSPACE_PREFIX));
        if !is_workspace || !entry.file_type()?.is_dir() {
            continue;
        }

        let age = entry
            .metadata()?
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove stale workspace {}: {e}", path.display()),
        }
    }

    if removed > 0 {
        log::info!("Swept {removed} stale workspaces from {}", root.display());
    }
    Ok(removed)
}
