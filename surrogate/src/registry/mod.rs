//! Task Registry (C1): installed-task inventory on disk, and naming policy.
//!
//! The in-memory set of installed names is authoritative for existence
//! checks; the filesystem at `<basedir>/tasks/<seg1>/<seg2>/<seg3>.py` is
//! authoritative for source text. Not concurrent-safe across daemon
//! processes — a single daemon is assumed to own `<basedir>/tasks`.

mod naming;

pub use naming::{ends_with_reserved_leaf, valid_task_name};

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use surrogate_shared::{SurrogateError, SurrogateResult};

use crate::monkey;

/// Installed-task inventory, rooted at `<basedir>/tasks`.
pub struct TaskRegistry {
    basedir: PathBuf,
    tasks: RwLock<BTreeSet<String>>,
}

impl TaskRegistry {
    /// Open (or create) the registry rooted at `basedir`, scanning
    /// `<basedir>/tasks` for already-installed task files.
    pub fn open(basedir: impl Into<PathBuf>) -> SurrogateResult<Self> {
        let basedir = basedir.into();
        let tasks_dir = basedir.join("tasks");

        if !tasks_dir.exists() {
            fs::create_dir_all(&tasks_dir).map_err(|e| {
                SurrogateError::FileAccess(format!(
                    "Error creating directory \"tasks\" for storing task code: {}",
                    e
                ))
            })?;
            write_package_marker(&tasks_dir)?;
        }

        let tasks = scan_installed(&tasks_dir)?;

        tracing::info!(
            basedir = %basedir.display(),
            installed = tasks.len(),
            "Task registry opened"
        );

        Ok(Self {
            basedir,
            tasks: RwLock::new(tasks),
        })
    }

    /// Checks whether a given task is available.
    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.read().contains(name)
    }

    /// Number of installed tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs the given task.
    ///
    /// Preconditions the caller (the Jailor) is expected to have already
    /// checked: the name is valid, not already installed, and does not end
    /// with the reserved `__init__` leaf. This method re-validates them
    /// defensively and returns the matching error if violated.
    pub fn install_task(&self, name: &str, code: &str) -> SurrogateResult<()> {
        if !valid_task_name(name) {
            return Err(SurrogateError::Naming(format!(
                "invalid task name: {}",
                name
            )));
        }
        if self.has_task(name) {
            return Err(SurrogateError::AlreadyInstalled(name.to_string()));
        }

        let (seg1, seg2, seg3) = naming::split_segments(name);
        let tasks_dir = self.basedir.join("tasks");
        let dir1 = tasks_dir.join(seg1);
        let dir2 = dir1.join(seg2);

        for dir in [&dir1, &dir2] {
            if !dir.exists() {
                fs::create_dir(dir).map_err(|e| {
                    SurrogateError::FileAccess(format!(
                        "Error creating task directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                write_package_marker(dir)?;
            }
        }

        let target_file = dir2.join(format!("{}.py", seg3));
        fs::write(&target_file, code).map_err(|e| {
            SurrogateError::FileAccess(format!(
                "Error writing task code onto disk at {}: {}",
                target_file.display(),
                e
            ))
        })?;

        self.tasks.write().insert(name.to_string());

        tracing::debug!(task = %name, path = %target_file.display(), "Installed task");

        Ok(())
    }

    /// Fetches the source code of the named task, with the monkey header
    /// stripped if present.
    ///
    /// Assumes the task name is valid and installed; callers must check
    /// [`has_task`](Self::has_task) first.
    pub fn fetch_task_code(&self, name: &str) -> SurrogateResult<String> {
        if !self.has_task(name) {
            return Err(SurrogateError::NotInstalled(name.to_string()));
        }

        let path = self.task_path(name);
        let code = fs::read_to_string(&path).map_err(|e| {
            SurrogateError::FileAccess(format!("Error reading task code at {}: {}", path.display(), e))
        })?;

        Ok(monkey::strip(&code).to_string())
    }

    /// Derive the on-disk path for a (not necessarily installed) task name.
    ///
    /// Panics if `name` is not a validly-shaped three-segment name; callers
    /// must validate first.
    fn task_path(&self, name: &str) -> PathBuf {
        let (seg1, seg2, seg3) = naming::split_segments(name);
        self.basedir
            .join("tasks")
            .join(seg1)
            .join(seg2)
            .join(format!("{}.py", seg3))
    }
}

fn write_package_marker(dir: &Path) -> SurrogateResult<()> {
    let marker = dir.join("__init__.py");
    if !marker.exists() {
        fs::File::create(&marker).map_err(|e| {
            SurrogateError::FileAccess(format!(
                "Error creating package marker {}: {}",
                marker.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Walk `tasks_dir`, accepting files exactly two subdirectories deep whose
/// name ends `.py` and is not `__init__.py`, ignoring any `.svn` directory.
fn scan_installed(tasks_dir: &Path) -> SurrogateResult<BTreeSet<String>> {
    let mut tasks = BTreeSet::new();

    for entry in walkdir::WalkDir::new(tasks_dir)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".svn")
    {
        let entry = entry.map_err(|e| {
            SurrogateError::FileAccess(format!("Error scanning task directory: {}", e))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !file_name.ends_with(".py") || file_name == "__init__.py" {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(tasks_dir)
            .expect("walkdir entries are rooted at tasks_dir");
        let name = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(".");

        tasks.insert(name);
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_tasks_dir() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();
        assert!(dir.path().join("tasks").is_dir());
        assert!(registry.is_empty());
    }

    #[test]
    fn install_then_has_task() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();

        assert!(!registry.has_task("demo.math.add"));
        registry.install_task("demo.math.add", "def perform(a, b):\n    return a + b\n").unwrap();
        assert!(registry.has_task("demo.math.add"));

        let path = dir
            .path()
            .join("tasks")
            .join("demo")
            .join("math")
            .join("add.py");
        assert!(path.is_file());
    }

    #[test]
    fn install_duplicate_fails() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();
        registry.install_task("demo.math.add", "pass\n").unwrap();

        let err = registry.install_task("demo.math.add", "pass\n").unwrap_err();
        assert!(matches!(err, SurrogateError::AlreadyInstalled(_)));
    }

    #[test]
    fn install_rejects_invalid_name() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();

        let err = registry.install_task("bad.name", "pass\n").unwrap_err();
        assert!(matches!(err, SurrogateError::Naming(_)));
    }

    #[test]
    fn fetch_strips_monkey_header() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();

        let code = "def perform(a, b):\n    return a + b\n";
        let wrapped = monkey::wrap(code);
        registry.install_task("demo.math.add", &wrapped).unwrap();

        assert_eq!(registry.fetch_task_code("demo.math.add").unwrap(), code);
    }

    #[test]
    fn fetch_missing_task_fails() {
        let dir = tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path()).unwrap();

        let err = registry.fetch_task_code("nope.nope.nope").unwrap_err();
        assert!(matches!(err, SurrogateError::NotInstalled(_)));
    }

    #[test]
    fn reopen_rescans_installed_tasks() {
        let dir = tempdir().unwrap();
        {
            let registry = TaskRegistry::open(dir.path()).unwrap();
            registry.install_task("demo.math.add", "pass\n").unwrap();
            registry.install_task("demo.loop.spin", "pass\n").unwrap();
        }

        let reopened = TaskRegistry::open(dir.path()).unwrap();
        assert!(reopened.has_task("demo.math.add"));
        assert!(reopened.has_task("demo.loop.spin"));
        assert_eq!(reopened.len(), 2);
    }
}
