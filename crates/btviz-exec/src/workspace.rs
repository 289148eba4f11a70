//! Run-private scratch directory.
//!
//! A [`Workspace`] is one temporary directory plus the files the run put in
//! it. Dropping it deletes every tracked file and then the directory, each
//! attempt independent of the others; failures are logged and swallowed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const PREFIX: &str = "btviz-";

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    dir: Option<TempDir>,
    files: Vec<PathBuf>,
}

impl Workspace {
    /// Creates an empty directory under `parent`, or under the system
    /// temporary directory when `parent` is `None`.
    pub fn acquire(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(path = %dir.path().display(), "workspace acquired");
        Ok(Workspace {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            files: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the workspace.
    pub fn join(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Writes `contents` to `name` and tracks the file for removal.
    pub fn write(&mut self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.join(name);
        self.track(path.clone());
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Tracks a file created by someone else (a compiler artifact, a log).
    pub fn track(&mut self, path: PathBuf) {
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Newest first: artifacts before the sources they were built from.
        for file in self.files.drain(..).rev() {
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "failed to remove workspace file");
                }
            }
        }
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                tracing::warn!(path = %self.root.display(), error = %err, "failed to remove workspace directory");
            }
        }
    }
}
